// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Lifecycle reconciler for vendor performance statistics.
//!
//! Every purchase order write goes through two pure phases:
//!
//! 1. [`prepare_write`] turns the client's [`OrderDraft`] into the row that
//!    will be persisted, stamping server-assigned fields and protecting the
//!    write-once timestamps.
//! 2. [`reconcile`] compares the persisted state with the prepared one and
//!    yields the [`PerformanceDelta`] the write causes for the owning vendor.
//!
//! The delta is folded into the vendor's [`VendorAggregates`] (running
//! counters) from which the published [`PerformanceMetrics`] are derived.
//!
//! ```text
//!  before ──┐
//!           ├─► prepare_write ─► after ─┐
//!  draft ───┘                           ├─► reconcile ─► delta
//!                             before ───┘                  │
//!  aggregates (cache or full recompute) ──────────► apply ◄┘
//!                                                     │
//!                                                  metrics
//! ```

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::model::{OrderDraft, OrderStatus, PurchaseOrder};

/// Days between order creation and its delivery deadline.
pub const DELIVERY_WINDOW_DAYS: i64 = 10;

const SECONDS_PER_DAY: f64 = 86_400.0;

/// Delivery deadline for an order created at `created_at`.
pub fn delivery_deadline(created_at: DateTime<Utc>) -> DateTime<Utc> {
    created_at + Duration::days(DELIVERY_WINDOW_DAYS)
}

/// Whole seconds between creation and acknowledgment, never negative.
pub fn response_time_secs(created_at: DateTime<Utc>, acknowledged_at: DateTime<Utc>) -> i64 {
    (acknowledged_at - created_at).num_seconds().max(0)
}

/// An order counts as on time when it was completed no later than its deadline.
///
/// The completion stamp is taken from the same clock reading that drives the
/// rest of the write, so this matches "deadline has not yet passed" at the
/// moment the order becomes completed.
pub fn is_on_time(delivery_deadline: DateTime<Utc>, completed_at: Option<DateTime<Utc>>) -> bool {
    completed_at.is_some_and(|completed| completed <= delivery_deadline)
}

/// Pre-write phase: build the row to persist.
///
/// - new orders get `created_at = now` and the fixed delivery deadline;
/// - existing orders keep their creation time, deadline and vendor;
/// - acknowledgment and completion timestamps are write-once;
/// - the first transition into `completed` stamps `completed_at = now`.
pub fn prepare_write(
    before: Option<&PurchaseOrder>,
    draft: OrderDraft,
    now: DateTime<Utc>,
) -> PurchaseOrder {
    let (po_id, vendor_id, created_at, deadline, acknowledged_at, completed_at) = match before {
        Some(existing) => (
            existing.po_id.clone(),
            existing.vendor_id.clone(),
            existing.created_at,
            existing.delivery_deadline,
            existing.acknowledged_at.or(draft.acknowledged_at),
            existing.completed_at,
        ),
        None => (
            draft.po_id,
            draft.vendor_id,
            now,
            delivery_deadline(now),
            draft.acknowledged_at,
            None,
        ),
    };

    let completed_at = match completed_at {
        Some(stamp) => Some(stamp),
        None if draft.status == OrderStatus::Completed => Some(now),
        None => None,
    };

    PurchaseOrder {
        po_id,
        po_number: draft.po_number,
        vendor_id,
        created_at,
        delivery_deadline: deadline,
        status: draft.status,
        items: draft.items,
        quantity: draft.quantity,
        quality_rating: draft.quality_rating,
        acknowledged_at,
        completed_at,
    }
}

/// Change in a vendor's running counters caused by one order write.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PerformanceDelta {
    /// Change in orders issued.
    pub po_issued: i64,
    /// Change in orders delivered (currently completed).
    pub po_delivered: i64,
    /// Change in orders delivered on time.
    pub po_on_time: i64,
    /// Change in accumulated response time, in seconds.
    pub response_time_secs: i64,
    /// Change in acknowledged order count.
    pub response_count: i64,
    /// Whether the quality rating average must be recomputed from the table.
    pub recompute_quality: bool,
}

impl PerformanceDelta {
    /// Whether the write leaves the vendor's performance untouched.
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// Post-write phase: derive the counter changes of a write.
///
/// `before` is the persisted state (`None` for a creation) and `after` the
/// output of [`prepare_write`].
pub fn reconcile(before: Option<&PurchaseOrder>, after: &PurchaseOrder) -> PerformanceDelta {
    let mut delta = PerformanceDelta::default();

    if before.is_none() {
        delta.po_issued = 1;
    }

    let was_acknowledged = before.is_some_and(PurchaseOrder::is_acknowledged);
    if !was_acknowledged && let Some(acknowledged_at) = after.acknowledged_at {
        delta.response_count = 1;
        delta.response_time_secs = response_time_secs(after.created_at, acknowledged_at);
    }

    let was_completed = before.is_some_and(PurchaseOrder::is_completed);
    match (was_completed, after.is_completed()) {
        (false, true) => {
            delta.po_delivered = 1;
            if is_on_time(after.delivery_deadline, after.completed_at) {
                delta.po_on_time = 1;
            }
            // The average covers every completed order, so any change to
            // the completed set re-averages, zero and unrated ones included.
            delta.recompute_quality = true;
        }
        (true, false) => {
            // Reverted out of completed: withdraw what the completion counted.
            if let Some(previous) = before {
                delta.po_delivered = -1;
                if is_on_time(previous.delivery_deadline, previous.completed_at) {
                    delta.po_on_time = -1;
                }
            }
            delta.recompute_quality = true;
        }
        (true, true) => {
            delta.recompute_quality =
                before.is_some_and(|previous| previous.quality_rating != after.quality_rating);
        }
        (false, false) => {}
    }

    delta
}

/// Running counters for one vendor.
///
/// Stored on the performance record and mirrored in the aggregate cache
/// under the vendor code.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VendorAggregates {
    /// Orders issued.
    pub po_issued: i64,
    /// Orders delivered.
    pub po_delivered: i64,
    /// Orders delivered on time.
    pub po_on_time: i64,
    /// Accumulated response time in seconds.
    pub response_time_total_secs: i64,
    /// Acknowledged orders.
    pub response_count: i64,
}

impl VendorAggregates {
    /// Fold a delta into the counters. Counters never drop below zero.
    pub fn apply(self, delta: &PerformanceDelta) -> Self {
        Self {
            po_issued: (self.po_issued + delta.po_issued).max(0),
            po_delivered: (self.po_delivered + delta.po_delivered).max(0),
            po_on_time: (self.po_on_time + delta.po_on_time).max(0),
            response_time_total_secs: (self.response_time_total_secs + delta.response_time_secs)
                .max(0),
            response_count: (self.response_count + delta.response_count).max(0),
        }
    }

    /// Derive the published rates. Zero denominators leave a rate undefined.
    pub fn metrics(&self) -> PerformanceMetrics {
        PerformanceMetrics {
            on_time_delivery_rate: ratio(self.po_on_time as f64, self.po_delivered),
            average_response_time: ratio(
                self.response_time_total_secs as f64 / SECONDS_PER_DAY,
                self.response_count,
            ),
            fulfillment_rate: ratio(self.po_delivered as f64, self.po_issued),
        }
    }
}

fn ratio(numerator: f64, denominator: i64) -> Option<f64> {
    if denominator > 0 {
        Some(numerator / denominator as f64)
    } else {
        None
    }
}

/// Published rates derived from [`VendorAggregates`].
///
/// The quality rating average is not part of this set: it is always
/// recomputed from the order table.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct PerformanceMetrics {
    /// On-time deliveries / deliveries.
    pub on_time_delivery_rate: Option<f64>,
    /// Mean response time in days.
    pub average_response_time: Option<f64>,
    /// Deliveries / orders issued.
    pub fulfillment_rate: Option<f64>,
}

/// Everything written to a performance record in one go.
#[derive(Debug, Clone, Copy)]
pub struct PerformanceUpdate {
    /// Counters after the write.
    pub aggregates: VendorAggregates,
    /// Rates derived from `aggregates`.
    pub metrics: PerformanceMetrics,
    /// Recompute the quality average from completed orders.
    pub recompute_quality: bool,
    /// Time of the update.
    pub updated_at: DateTime<Utc>,
}

impl PerformanceUpdate {
    /// Build an update whose metrics are derived from `aggregates`.
    pub fn new(
        aggregates: VendorAggregates,
        recompute_quality: bool,
        updated_at: DateTime<Utc>,
    ) -> Self {
        Self {
            aggregates,
            metrics: aggregates.metrics(),
            recompute_quality,
            updated_at,
        }
    }
}
