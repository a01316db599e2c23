// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Purchase order handlers.
//!
//! All writes are validated before they reach the performance engine, which
//! persists the order and the vendor's statistics together.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};
use uuid::Uuid;

use super::{HandlerState, Page};
use crate::error::{CoreError, Result};
use crate::model::{self, ListPurchaseOrdersFilter, OrderDraft, OrderStatus, PurchaseOrder};
use crate::persistence::{PerformanceRecord, VendorRecord};

/// Message returned by the first successful acknowledgment.
pub const ACKNOWLEDGED_MESSAGE: &str = "Acknowledged successfully.";
/// Message returned when the order was already acknowledged.
pub const ALREADY_ACKNOWLEDGED_MESSAGE: &str = "Already acknowledged.";
/// Message returned by the first successful completion.
pub const COMPLETED_MESSAGE: &str = "Completed successfully.";
/// Message returned when the order was already completed.
pub const ALREADY_COMPLETED_MESSAGE: &str = "Already updated.";

/// Request to create a purchase order.
#[derive(Debug, Clone, Deserialize)]
pub struct CreatePurchaseOrderRequest {
    /// Unique business order number.
    pub po_number: String,
    /// Owning vendor.
    pub vendor_id: String,
    /// Item manifest.
    pub items: serde_json::Value,
    /// Ordered quantity.
    pub quantity: i64,
    /// Initial status (default `pending`).
    #[serde(default)]
    pub status: Option<OrderStatus>,
    /// Initial quality rating.
    #[serde(default)]
    pub quality_rating: Option<f64>,
    /// Acknowledgment timestamp, if the vendor already acknowledged.
    #[serde(default)]
    pub acknowledged_at: Option<DateTime<Utc>>,
}

/// Partial purchase order update. Absent fields are left untouched.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdatePurchaseOrderRequest {
    /// New order number.
    #[serde(default)]
    pub po_number: Option<String>,
    /// Owning vendor. Orders cannot move between vendors; only the current
    /// vendor is accepted.
    #[serde(default)]
    pub vendor_id: Option<String>,
    /// New item manifest.
    #[serde(default)]
    pub items: Option<serde_json::Value>,
    /// New quantity.
    #[serde(default)]
    pub quantity: Option<i64>,
    /// New status.
    #[serde(default)]
    pub status: Option<OrderStatus>,
    /// New quality rating.
    #[serde(default)]
    pub quality_rating: Option<f64>,
    /// Acknowledgment timestamp. Ignored once the order is acknowledged.
    #[serde(default)]
    pub acknowledged_at: Option<DateTime<Utc>>,
}

/// Filters and pagination for listing purchase orders.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListPurchaseOrdersRequest {
    /// Only orders of this vendor.
    #[serde(default)]
    pub vendor_id: Option<String>,
    /// Only orders in this status.
    #[serde(default)]
    pub status: Option<OrderStatus>,
    /// Pagination.
    #[serde(flatten)]
    pub page: Page,
}

/// Request to complete a purchase order.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CompletePurchaseOrderRequest {
    /// Quality rating for the delivery.
    #[serde(default)]
    pub quality_rating: Option<f64>,
}

/// Result of a create or update.
#[derive(Debug, Clone, Serialize)]
pub struct PurchaseOrderWriteResponse {
    /// The order as persisted.
    pub order: PurchaseOrder,
    /// The vendor's performance after the write.
    pub performance: PerformanceRecord,
}

/// One page of purchase orders.
#[derive(Debug, Clone, Serialize)]
pub struct ListPurchaseOrdersResponse {
    /// Orders on this page, newest first.
    pub orders: Vec<PurchaseOrder>,
    /// Number of orders matching the filter.
    pub total_count: i64,
    /// Applied page size.
    pub limit: i64,
    /// Applied offset.
    pub offset: i64,
}

/// Result of an acknowledgment.
#[derive(Debug, Clone, Serialize)]
pub struct AcknowledgePurchaseOrderResponse {
    /// The order after the call.
    pub order: PurchaseOrder,
    /// Whether this call set the acknowledgment.
    pub acknowledged: bool,
    /// Human-readable outcome.
    pub message: String,
}

/// Result of a completion.
#[derive(Debug, Clone, Serialize)]
pub struct CompletePurchaseOrderResponse {
    /// The order after the call.
    pub order: PurchaseOrder,
    /// Whether this call completed the order.
    pub updated: bool,
    /// Human-readable outcome.
    pub message: String,
}

async fn load_vendor(state: &HandlerState, vendor_id: &str) -> Result<VendorRecord> {
    state
        .persistence
        .get_vendor(vendor_id)
        .await?
        .ok_or_else(|| CoreError::VendorNotFound {
            vendor_id: vendor_id.to_string(),
        })
}

async fn load_order(state: &HandlerState, po_id: &str) -> Result<PurchaseOrder> {
    state
        .persistence
        .get_purchase_order(po_id)
        .await?
        .ok_or_else(|| CoreError::PurchaseOrderNotFound {
            po_id: po_id.to_string(),
        })
}

/// Reject an order number that another order already uses.
async fn ensure_po_number_free(
    state: &HandlerState,
    po_number: &str,
    own_po_id: Option<&str>,
) -> Result<()> {
    match state.persistence.get_purchase_order_by_number(po_number).await? {
        Some(other) if Some(other.po_id.as_str()) != own_po_id => {
            Err(CoreError::DuplicateOrderNumber {
                po_number: po_number.to_string(),
            })
        }
        _ => Ok(()),
    }
}

fn validate_draft(draft: &OrderDraft, created_at: DateTime<Utc>) -> Result<()> {
    model::validate_po_number(&draft.po_number)?;
    model::validate_quantity(draft.quantity)?;
    model::validate_quality_rating(draft.quality_rating)?;

    if let Some(acknowledged_at) = draft.acknowledged_at
        && acknowledged_at < created_at
    {
        return Err(CoreError::validation(
            "acknowledged_at",
            "must not be earlier than the order creation time",
        ));
    }

    Ok(())
}

/// Handle purchase order creation.
///
/// The server assigns the ID, creation time and delivery deadline.
///
/// # Errors
///
/// - `VALIDATION_ERROR` for an empty order number, negative quantity, a
///   rating outside [0, 10] or an acknowledgment before creation
/// - `VENDOR_NOT_FOUND` when the vendor does not exist
/// - `DUPLICATE_ORDER_NUMBER` when the order number is taken
#[instrument(skip(state, request), fields(po_number = %request.po_number, vendor_id = %request.vendor_id))]
pub async fn handle_create_purchase_order(
    state: &HandlerState,
    request: CreatePurchaseOrderRequest,
) -> Result<PurchaseOrderWriteResponse> {
    let now = state.clock.now();

    let draft = OrderDraft {
        po_id: Uuid::new_v4().to_string(),
        po_number: request.po_number,
        vendor_id: request.vendor_id,
        status: request.status.unwrap_or_default(),
        items: request.items,
        quantity: request.quantity,
        quality_rating: request.quality_rating,
        acknowledged_at: request.acknowledged_at,
    };
    validate_draft(&draft, now)?;

    let vendor = load_vendor(state, &draft.vendor_id).await?;
    ensure_po_number_free(state, &draft.po_number, None).await?;

    let outcome = state
        .engine
        .record_order_write(&vendor, None, draft, now)
        .await?;

    info!(po_id = %outcome.order.po_id, "Purchase order created");
    Ok(PurchaseOrderWriteResponse {
        order: outcome.order,
        performance: outcome.performance,
    })
}

/// Handle purchase order lookup.
#[instrument(skip(state))]
pub async fn handle_get_purchase_order(state: &HandlerState, po_id: &str) -> Result<PurchaseOrder> {
    load_order(state, po_id).await
}

/// Handle purchase order listing.
#[instrument(skip(state))]
pub async fn handle_list_purchase_orders(
    state: &HandlerState,
    request: ListPurchaseOrdersRequest,
) -> Result<ListPurchaseOrdersResponse> {
    let (limit, offset) = request.page.resolve()?;

    let filter = ListPurchaseOrdersFilter {
        vendor_id: request.vendor_id,
        status: request.status,
    };

    let orders = state
        .persistence
        .list_purchase_orders(&filter, limit, offset)
        .await?;
    let total_count = state.persistence.count_purchase_orders(&filter).await?;

    Ok(ListPurchaseOrdersResponse {
        orders,
        total_count,
        limit,
        offset,
    })
}

/// Handle a partial purchase order update.
///
/// Status changes drive the vendor's statistics: entering `completed`
/// counts a delivery, leaving it withdraws one.
#[instrument(skip(state, request))]
pub async fn handle_update_purchase_order(
    state: &HandlerState,
    po_id: &str,
    request: UpdatePurchaseOrderRequest,
) -> Result<PurchaseOrderWriteResponse> {
    let before = load_order(state, po_id).await?;

    if let Some(vendor_id) = &request.vendor_id
        && *vendor_id != before.vendor_id
    {
        return Err(CoreError::validation(
            "vendor_id",
            "orders cannot be moved to another vendor",
        ));
    }

    let mut draft = OrderDraft::from(&before);
    if let Some(po_number) = request.po_number {
        draft.po_number = po_number;
    }
    if let Some(items) = request.items {
        draft.items = items;
    }
    if let Some(quantity) = request.quantity {
        draft.quantity = quantity;
    }
    if let Some(status) = request.status {
        draft.status = status;
    }
    if request.quality_rating.is_some() {
        draft.quality_rating = request.quality_rating;
    }
    if before.acknowledged_at.is_none() && request.acknowledged_at.is_some() {
        draft.acknowledged_at = request.acknowledged_at;
    }
    validate_draft(&draft, before.created_at)?;

    if draft.po_number != before.po_number {
        ensure_po_number_free(state, &draft.po_number, Some(&before.po_id)).await?;
    }

    let vendor = load_vendor(state, &before.vendor_id).await?;
    let outcome = state
        .engine
        .record_order_write(&vendor, Some(&before), draft, state.clock.now())
        .await?;

    debug!(status = %outcome.order.status, "Purchase order updated");
    Ok(PurchaseOrderWriteResponse {
        order: outcome.order,
        performance: outcome.performance,
    })
}

/// Handle purchase order deletion.
///
/// The vendor's statistics are rebuilt from the remaining orders.
#[instrument(skip(state))]
pub async fn handle_delete_purchase_order(
    state: &HandlerState,
    po_id: &str,
) -> Result<PerformanceRecord> {
    let order = load_order(state, po_id).await?;
    let vendor = load_vendor(state, &order.vendor_id).await?;

    let performance = state
        .engine
        .record_order_deletion(&vendor, &order, state.clock.now())
        .await?
        .ok_or_else(|| CoreError::PurchaseOrderNotFound {
            po_id: po_id.to_string(),
        })?;

    info!(vendor_code = %vendor.vendor_code, "Purchase order deleted");
    Ok(performance)
}

/// Handle vendor acknowledgment of a purchase order.
///
/// Idempotent: the first call stamps the acknowledgment time, later calls
/// leave it untouched and report [`ALREADY_ACKNOWLEDGED_MESSAGE`].
#[instrument(skip(state))]
pub async fn handle_acknowledge_purchase_order(
    state: &HandlerState,
    po_id: &str,
) -> Result<AcknowledgePurchaseOrderResponse> {
    let before = load_order(state, po_id).await?;

    if before.is_acknowledged() {
        debug!("Purchase order already acknowledged");
        return Ok(AcknowledgePurchaseOrderResponse {
            order: before,
            acknowledged: false,
            message: ALREADY_ACKNOWLEDGED_MESSAGE.to_string(),
        });
    }

    let now = state.clock.now();
    let mut draft = OrderDraft::from(&before);
    draft.acknowledged_at = Some(now.max(before.created_at));

    let vendor = load_vendor(state, &before.vendor_id).await?;
    let outcome = state
        .engine
        .record_order_write(&vendor, Some(&before), draft, now)
        .await?;

    info!("Purchase order acknowledged");
    Ok(AcknowledgePurchaseOrderResponse {
        order: outcome.order,
        acknowledged: true,
        message: ACKNOWLEDGED_MESSAGE.to_string(),
    })
}

/// Handle completion of a purchase order.
///
/// Idempotent: completing an already completed order changes nothing and
/// reports [`ALREADY_COMPLETED_MESSAGE`]. A provided rating replaces the
/// order's current one.
#[instrument(skip(state, request))]
pub async fn handle_complete_purchase_order(
    state: &HandlerState,
    po_id: &str,
    request: CompletePurchaseOrderRequest,
) -> Result<CompletePurchaseOrderResponse> {
    model::validate_quality_rating(request.quality_rating)?;

    let before = load_order(state, po_id).await?;

    if before.is_completed() {
        debug!("Purchase order already completed");
        return Ok(CompletePurchaseOrderResponse {
            order: before,
            updated: false,
            message: ALREADY_COMPLETED_MESSAGE.to_string(),
        });
    }

    let mut draft = OrderDraft::from(&before);
    draft.status = OrderStatus::Completed;
    if request.quality_rating.is_some() {
        draft.quality_rating = request.quality_rating;
    }

    let vendor = load_vendor(state, &before.vendor_id).await?;
    let outcome = state
        .engine
        .record_order_write(&vendor, Some(&before), draft, state.clock.now())
        .await?;

    info!(
        on_time = outcome.delta.po_on_time > 0,
        "Purchase order completed"
    );
    Ok(CompletePurchaseOrderResponse {
        order: outcome.order,
        updated: true,
        message: COMPLETED_MESSAGE.to_string(),
    })
}
