// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Purchase order lifecycle tests for vendor performance statistics.
//!
//! Each test drives the public handlers against an in-memory SQLite database
//! and checks the vendor's performance record.

mod common;

use chrono::Duration;

use common::{TestContext, assert_rate, order_request};
use vendora_core::handlers::purchase_order::{
    ACKNOWLEDGED_MESSAGE, ALREADY_ACKNOWLEDGED_MESSAGE, ALREADY_COMPLETED_MESSAGE,
    COMPLETED_MESSAGE, CompletePurchaseOrderRequest, UpdatePurchaseOrderRequest,
    handle_acknowledge_purchase_order, handle_complete_purchase_order,
    handle_create_purchase_order, handle_delete_purchase_order, handle_get_purchase_order,
    handle_update_purchase_order,
};
use vendora_core::handlers::vendor::handle_get_vendor_performance;
use vendora_core::model::OrderStatus;

fn complete_with(rating: Option<f64>) -> CompletePurchaseOrderRequest {
    CompletePurchaseOrderRequest {
        quality_rating: rating,
    }
}

#[tokio::test]
async fn test_new_vendor_has_undefined_rates() {
    let ctx = TestContext::new().await;
    let vendor = ctx.create_vendor("ACME").await;

    let performance = handle_get_vendor_performance(&ctx.state, &vendor.vendor_id)
        .await
        .unwrap();

    assert_eq!(performance.po_issued, 0);
    assert!(performance.fulfillment_rate.is_none());
    assert!(performance.on_time_delivery_rate.is_none());
    assert!(performance.average_response_time.is_none());
    assert!(performance.quality_rating_avg.is_none());
}

#[tokio::test]
async fn test_deadline_is_ten_days_after_creation() {
    let ctx = TestContext::new().await;
    let vendor = ctx.create_vendor("ACME").await;

    let first = ctx.create_order(&vendor.vendor_id, "PO-1").await;
    ctx.advance_days(3);
    let second = ctx.create_order(&vendor.vendor_id, "PO-2").await;

    assert_eq!(first.created_at, common::t0());
    assert_eq!(first.status, OrderStatus::Pending);
    for order in [&first, &second] {
        assert_eq!(order.delivery_deadline, order.created_at + Duration::days(10));
    }
}

#[tokio::test]
async fn test_average_response_time_in_days() {
    let ctx = TestContext::new().await;
    let vendor = ctx.create_vendor("ACME").await;

    let first = ctx.create_order(&vendor.vendor_id, "PO-1").await;
    let second = ctx.create_order(&vendor.vendor_id, "PO-2").await;
    ctx.create_order(&vendor.vendor_id, "PO-3").await;

    ctx.advance_days(2);
    handle_acknowledge_purchase_order(&ctx.state, &first.po_id)
        .await
        .unwrap();
    ctx.advance_days(2);
    handle_acknowledge_purchase_order(&ctx.state, &second.po_id)
        .await
        .unwrap();

    let performance = handle_get_vendor_performance(&ctx.state, &vendor.vendor_id)
        .await
        .unwrap();

    assert_eq!(performance.response_count, 2);
    assert_eq!(performance.response_time_total_secs, 6 * 86_400);
    assert_rate(performance.average_response_time, 3.0);
}

#[tokio::test]
async fn test_acknowledge_is_idempotent() {
    let ctx = TestContext::new().await;
    let vendor = ctx.create_vendor("ACME").await;
    let order = ctx.create_order(&vendor.vendor_id, "PO-1").await;

    ctx.advance_days(1);
    let first = handle_acknowledge_purchase_order(&ctx.state, &order.po_id)
        .await
        .unwrap();
    assert!(first.acknowledged);
    assert_eq!(first.message, ACKNOWLEDGED_MESSAGE);
    let stamped = first.order.acknowledged_at.expect("acknowledged_at set");

    ctx.advance_days(1);
    let second = handle_acknowledge_purchase_order(&ctx.state, &order.po_id)
        .await
        .unwrap();
    assert!(!second.acknowledged);
    assert_eq!(second.message, ALREADY_ACKNOWLEDGED_MESSAGE);
    assert_eq!(second.order.acknowledged_at, Some(stamped));

    let performance = handle_get_vendor_performance(&ctx.state, &vendor.vendor_id)
        .await
        .unwrap();
    assert_eq!(performance.response_count, 1);
    assert_rate(performance.average_response_time, 1.0);
}

#[tokio::test]
async fn test_fulfillment_and_on_time_rates() {
    let ctx = TestContext::new().await;
    let vendor = ctx.create_vendor("ACME").await;

    let first = ctx.create_order(&vendor.vendor_id, "PO-1").await;
    let second = ctx.create_order(&vendor.vendor_id, "PO-2").await;
    ctx.create_order(&vendor.vendor_id, "PO-3").await;

    ctx.advance_days(4);
    handle_complete_purchase_order(&ctx.state, &first.po_id, complete_with(None))
        .await
        .unwrap();

    let performance = handle_get_vendor_performance(&ctx.state, &vendor.vendor_id)
        .await
        .unwrap();
    assert_rate(performance.fulfillment_rate, 1.0 / 3.0);

    ctx.advance_days(2);
    handle_complete_purchase_order(&ctx.state, &second.po_id, complete_with(None))
        .await
        .unwrap();

    let performance = handle_get_vendor_performance(&ctx.state, &vendor.vendor_id)
        .await
        .unwrap();
    assert_eq!(performance.po_issued, 3);
    assert_eq!(performance.po_delivered, 2);
    assert_eq!(performance.po_on_time, 2);
    assert_rate(performance.fulfillment_rate, 2.0 / 3.0);
    assert_rate(performance.on_time_delivery_rate, 1.0);
}

#[tokio::test]
async fn test_late_completion_is_not_on_time() {
    let ctx = TestContext::new().await;
    let vendor = ctx.create_vendor("ACME").await;

    let on_time = ctx.create_order(&vendor.vendor_id, "PO-1").await;
    let late = ctx.create_order(&vendor.vendor_id, "PO-2").await;

    ctx.advance_days(10);
    handle_complete_purchase_order(&ctx.state, &on_time.po_id, complete_with(None))
        .await
        .unwrap();

    ctx.advance_days(1);
    handle_complete_purchase_order(&ctx.state, &late.po_id, complete_with(None))
        .await
        .unwrap();

    let performance = handle_get_vendor_performance(&ctx.state, &vendor.vendor_id)
        .await
        .unwrap();
    assert_eq!(performance.po_delivered, 2);
    assert_eq!(performance.po_on_time, 1);
    assert_rate(performance.on_time_delivery_rate, 0.5);
    assert_rate(performance.fulfillment_rate, 1.0);
}

#[tokio::test]
async fn test_quality_rating_average() {
    let ctx = TestContext::new().await;
    let vendor = ctx.create_vendor("ACME").await;

    let first = ctx.create_order(&vendor.vendor_id, "PO-1").await;
    let second = ctx.create_order(&vendor.vendor_id, "PO-2").await;

    ctx.advance_days(1);
    handle_complete_purchase_order(&ctx.state, &first.po_id, complete_with(Some(8.0)))
        .await
        .unwrap();
    handle_complete_purchase_order(&ctx.state, &second.po_id, complete_with(Some(4.0)))
        .await
        .unwrap();

    let performance = handle_get_vendor_performance(&ctx.state, &vendor.vendor_id)
        .await
        .unwrap();
    assert_rate(performance.quality_rating_avg, 6.0);
}

#[tokio::test]
async fn test_complete_is_idempotent() {
    let ctx = TestContext::new().await;
    let vendor = ctx.create_vendor("ACME").await;
    let order = ctx.create_order(&vendor.vendor_id, "PO-1").await;

    ctx.advance_days(2);
    let first = handle_complete_purchase_order(&ctx.state, &order.po_id, complete_with(Some(7.0)))
        .await
        .unwrap();
    assert!(first.updated);
    assert_eq!(first.message, COMPLETED_MESSAGE);
    assert_eq!(first.order.status, OrderStatus::Completed);
    assert_eq!(
        first.order.completed_at,
        Some(common::t0() + Duration::days(2))
    );

    ctx.advance_days(20);
    let second = handle_complete_purchase_order(&ctx.state, &order.po_id, complete_with(Some(2.0)))
        .await
        .unwrap();
    assert!(!second.updated);
    assert_eq!(second.message, ALREADY_COMPLETED_MESSAGE);
    assert_eq!(second.order.completed_at, first.order.completed_at);
    assert_eq!(second.order.quality_rating, Some(7.0));

    let performance = handle_get_vendor_performance(&ctx.state, &vendor.vendor_id)
        .await
        .unwrap();
    assert_eq!(performance.po_delivered, 1);
    assert_eq!(performance.po_on_time, 1);
    assert_rate(performance.quality_rating_avg, 7.0);
}

#[tokio::test]
async fn test_status_update_to_completed_counts_delivery() {
    let ctx = TestContext::new().await;
    let vendor = ctx.create_vendor("ACME").await;
    let order = ctx.create_order(&vendor.vendor_id, "PO-1").await;

    ctx.advance_days(1);
    let shipped = handle_update_purchase_order(
        &ctx.state,
        &order.po_id,
        UpdatePurchaseOrderRequest {
            status: Some(OrderStatus::OutToDeliver),
            ..Default::default()
        },
    )
    .await
    .unwrap();
    assert_eq!(shipped.performance.po_delivered, 0);

    ctx.advance_days(1);
    let delivered = handle_update_purchase_order(
        &ctx.state,
        &order.po_id,
        UpdatePurchaseOrderRequest {
            status: Some(OrderStatus::Completed),
            quality_rating: Some(9.0),
            ..Default::default()
        },
    )
    .await
    .unwrap();

    assert_eq!(delivered.performance.po_delivered, 1);
    assert_rate(delivered.performance.fulfillment_rate, 1.0);
    assert_rate(delivered.performance.quality_rating_avg, 9.0);
    assert!(delivered.order.completed_at.is_some());
}

#[tokio::test]
async fn test_reverting_completion_withdraws_delivery() {
    let ctx = TestContext::new().await;
    let vendor = ctx.create_vendor("ACME").await;
    let order = ctx.create_order(&vendor.vendor_id, "PO-1").await;

    ctx.advance_days(1);
    handle_complete_purchase_order(&ctx.state, &order.po_id, complete_with(Some(5.0)))
        .await
        .unwrap();

    let reverted = handle_update_purchase_order(
        &ctx.state,
        &order.po_id,
        UpdatePurchaseOrderRequest {
            status: Some(OrderStatus::Pending),
            ..Default::default()
        },
    )
    .await
    .unwrap();

    assert_eq!(reverted.performance.po_delivered, 0);
    assert_eq!(reverted.performance.po_on_time, 0);
    assert_rate(reverted.performance.fulfillment_rate, 0.0);
    assert!(reverted.performance.on_time_delivery_rate.is_none());
    assert!(reverted.performance.quality_rating_avg.is_none());
}

#[tokio::test]
async fn test_rating_change_on_completed_order_recomputes_average() {
    let ctx = TestContext::new().await;
    let vendor = ctx.create_vendor("ACME").await;
    let order = ctx.create_order(&vendor.vendor_id, "PO-1").await;

    handle_complete_purchase_order(&ctx.state, &order.po_id, complete_with(Some(3.0)))
        .await
        .unwrap();

    let rerated = handle_update_purchase_order(
        &ctx.state,
        &order.po_id,
        UpdatePurchaseOrderRequest {
            quality_rating: Some(9.5),
            ..Default::default()
        },
    )
    .await
    .unwrap();

    assert_eq!(rerated.performance.po_delivered, 1);
    assert_rate(rerated.performance.quality_rating_avg, 9.5);
}

#[tokio::test]
async fn test_created_completed_and_acknowledged_at_once() {
    let ctx = TestContext::new().await;
    let vendor = ctx.create_vendor("ACME").await;

    let mut request = order_request(&vendor.vendor_id, "PO-1");
    request.status = Some(OrderStatus::Completed);
    request.quality_rating = Some(6.5);
    request.acknowledged_at = Some(common::t0());

    let response = handle_create_purchase_order(&ctx.state, request)
        .await
        .unwrap();

    assert_eq!(response.order.completed_at, Some(common::t0()));
    assert_eq!(response.performance.po_issued, 1);
    assert_eq!(response.performance.po_delivered, 1);
    assert_eq!(response.performance.po_on_time, 1);
    assert_eq!(response.performance.response_count, 1);
    assert_rate(response.performance.average_response_time, 0.0);
    assert_rate(response.performance.quality_rating_avg, 6.5);
}

#[tokio::test]
async fn test_deleting_order_rebuilds_statistics() {
    let ctx = TestContext::new().await;
    let vendor = ctx.create_vendor("ACME").await;

    let kept = ctx.create_order(&vendor.vendor_id, "PO-1").await;
    let removed = ctx.create_order(&vendor.vendor_id, "PO-2").await;

    ctx.advance_days(1);
    handle_complete_purchase_order(&ctx.state, &kept.po_id, complete_with(Some(8.0)))
        .await
        .unwrap();
    handle_complete_purchase_order(&ctx.state, &removed.po_id, complete_with(Some(2.0)))
        .await
        .unwrap();

    let performance = handle_delete_purchase_order(&ctx.state, &removed.po_id)
        .await
        .unwrap();

    assert_eq!(performance.po_issued, 1);
    assert_eq!(performance.po_delivered, 1);
    assert_rate(performance.fulfillment_rate, 1.0);
    assert_rate(performance.quality_rating_avg, 8.0);

    let err = handle_get_purchase_order(&ctx.state, &removed.po_id)
        .await
        .unwrap_err();
    assert_eq!(err.error_code(), "PURCHASE_ORDER_NOT_FOUND");

    let cached = ctx.cache.len();
    assert_eq!(cached, 1);
}
