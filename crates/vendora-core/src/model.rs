// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Domain types for vendors and purchase orders.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Vendor codes may not start with this prefix.
pub const RESERVED_VENDOR_CODE_PREFIX: &str = "superuser";

/// Inclusive bounds of a quality rating.
pub const QUALITY_RATING_RANGE: std::ops::RangeInclusive<f64> = 0.0..=10.0;

/// Lifecycle status of a purchase order.
///
/// Transitions observed in practice are `pending → out-to-deliver → completed`
/// and `* → canceled`; none of them are enforced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OrderStatus {
    /// Issued to the vendor, not yet shipped.
    #[default]
    Pending,
    /// Shipped by the vendor.
    OutToDeliver,
    /// Delivered.
    Completed,
    /// Withdrawn.
    Canceled,
}

impl OrderStatus {
    /// Storage representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::OutToDeliver => "out-to-deliver",
            Self::Completed => "completed",
            Self::Canceled => "canceled",
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OrderStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "out-to-deliver" => Ok(Self::OutToDeliver),
            "completed" => Ok(Self::Completed),
            "canceled" => Ok(Self::Canceled),
            other => Err(CoreError::validation(
                "status",
                format!("unknown purchase order status '{}'", other),
            )),
        }
    }
}

/// A persisted purchase order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PurchaseOrder {
    /// Unique identifier.
    pub po_id: String,
    /// Business order number, unique across all vendors.
    pub po_number: String,
    /// Owning vendor.
    pub vendor_id: String,
    /// Server-assigned creation time; immutable.
    pub created_at: DateTime<Utc>,
    /// Server-assigned delivery deadline; immutable.
    pub delivery_deadline: DateTime<Utc>,
    /// Current lifecycle status.
    pub status: OrderStatus,
    /// Opaque item manifest.
    pub items: serde_json::Value,
    /// Ordered quantity.
    pub quantity: i64,
    /// Quality rating given on delivery, 0 to 10.
    pub quality_rating: Option<f64>,
    /// When the vendor acknowledged the order; set at most once.
    pub acknowledged_at: Option<DateTime<Utc>>,
    /// When the order first became completed; set at most once.
    pub completed_at: Option<DateTime<Utc>>,
}

impl PurchaseOrder {
    /// Whether the vendor has acknowledged this order.
    pub fn is_acknowledged(&self) -> bool {
        self.acknowledged_at.is_some()
    }

    /// Whether the order is currently completed.
    pub fn is_completed(&self) -> bool {
        self.status == OrderStatus::Completed
    }
}

/// Client-controlled fields of a purchase order write.
///
/// Server-assigned fields (creation time, deadline, completion time) are
/// filled in by [`crate::reconciler::prepare_write`].
#[derive(Debug, Clone, PartialEq)]
pub struct OrderDraft {
    /// Identifier of the order being written.
    pub po_id: String,
    /// Business order number.
    pub po_number: String,
    /// Owning vendor.
    pub vendor_id: String,
    /// Requested status.
    pub status: OrderStatus,
    /// Item manifest.
    pub items: serde_json::Value,
    /// Ordered quantity.
    pub quantity: i64,
    /// Quality rating.
    pub quality_rating: Option<f64>,
    /// Acknowledgment timestamp.
    pub acknowledged_at: Option<DateTime<Utc>>,
}

impl From<&PurchaseOrder> for OrderDraft {
    fn from(order: &PurchaseOrder) -> Self {
        Self {
            po_id: order.po_id.clone(),
            po_number: order.po_number.clone(),
            vendor_id: order.vendor_id.clone(),
            status: order.status,
            items: order.items.clone(),
            quantity: order.quantity,
            quality_rating: order.quality_rating,
            acknowledged_at: order.acknowledged_at,
        }
    }
}

/// Fields for inserting a vendor.
#[derive(Debug, Clone)]
pub struct NewVendor {
    /// Identifier to assign.
    pub vendor_id: String,
    /// Display name.
    pub name: String,
    /// Free-form contact details.
    pub contact_details: Option<String>,
    /// Postal address.
    pub address: Option<String>,
    /// Unique vendor code; also the aggregate cache key.
    pub vendor_code: String,
    /// Creation time.
    pub created_at: DateTime<Utc>,
}

/// Partial vendor update. `None` leaves the column untouched.
#[derive(Debug, Clone, Default)]
pub struct VendorUpdate {
    /// New display name.
    pub name: Option<String>,
    /// New contact details.
    pub contact_details: Option<String>,
    /// New address.
    pub address: Option<String>,
    /// New vendor code.
    pub vendor_code: Option<String>,
}

/// Filter options for listing purchase orders.
#[derive(Debug, Clone, Default)]
pub struct ListPurchaseOrdersFilter {
    /// Only orders of this vendor.
    pub vendor_id: Option<String>,
    /// Only orders in this status.
    pub status: Option<OrderStatus>,
}

/// Validate an order quantity.
pub fn validate_quantity(quantity: i64) -> Result<(), CoreError> {
    if quantity < 0 {
        return Err(CoreError::validation("quantity", "must not be negative"));
    }
    Ok(())
}

/// Validate an optional quality rating against [`QUALITY_RATING_RANGE`].
pub fn validate_quality_rating(rating: Option<f64>) -> Result<(), CoreError> {
    match rating {
        Some(value) if !value.is_finite() || !QUALITY_RATING_RANGE.contains(&value) => Err(
            CoreError::validation("quality_rating", "must be between 0 and 10"),
        ),
        _ => Ok(()),
    }
}

/// Validate a purchase order number.
pub fn validate_po_number(po_number: &str) -> Result<(), CoreError> {
    if po_number.trim().is_empty() {
        return Err(CoreError::validation("po_number", "must not be empty"));
    }
    if po_number.len() > 100 {
        return Err(CoreError::validation(
            "po_number",
            "must be at most 100 characters",
        ));
    }
    Ok(())
}

/// Validate a vendor code.
pub fn validate_vendor_code(vendor_code: &str) -> Result<(), CoreError> {
    if vendor_code.trim().is_empty() {
        return Err(CoreError::validation("vendor_code", "must not be empty"));
    }
    if vendor_code.len() > 50 {
        return Err(CoreError::validation(
            "vendor_code",
            "must be at most 50 characters",
        ));
    }
    if vendor_code.starts_with(RESERVED_VENDOR_CODE_PREFIX) {
        return Err(CoreError::validation(
            "vendor_code",
            format!("must not start with '{}'", RESERVED_VENDOR_CODE_PREFIX),
        ));
    }
    Ok(())
}

/// Validate a vendor name.
pub fn validate_vendor_name(name: &str) -> Result<(), CoreError> {
    if name.trim().is_empty() {
        return Err(CoreError::validation("name", "must not be empty"));
    }
    if name.len() > 150 {
        return Err(CoreError::validation("name", "must be at most 150 characters"));
    }
    Ok(())
}
