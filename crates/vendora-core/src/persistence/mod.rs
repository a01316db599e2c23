// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Persistence interfaces and backends for vendora-core.
//!
//! This module defines the persistence abstraction, its record types and the
//! SQLite and PostgreSQL implementations. The tables are the source of truth
//! for every vendor metric; the aggregate cache only memoizes what the
//! aggregate queries here would return.

pub mod postgres;
pub mod sqlite;

pub use self::postgres::PostgresPersistence;
pub use self::sqlite::SqlitePersistence;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::types::Json;

use crate::error::CoreError;
use crate::model::{ListPurchaseOrdersFilter, NewVendor, PurchaseOrder, VendorUpdate};
use crate::reconciler::{self, PerformanceDelta, PerformanceUpdate, VendorAggregates};

/// Vendor record from the persistence layer.
#[derive(Debug, Clone, PartialEq, Serialize, sqlx::FromRow)]
pub struct VendorRecord {
    /// Unique identifier for the vendor.
    pub vendor_id: String,
    /// Display name.
    pub name: String,
    /// Free-form contact details.
    pub contact_details: Option<String>,
    /// Postal address.
    pub address: Option<String>,
    /// Unique vendor code; the aggregate cache key.
    pub vendor_code: String,
    /// When the vendor was registered.
    pub created_at: DateTime<Utc>,
}

/// Performance record from the persistence layer (1:1 with a vendor).
#[derive(Debug, Clone, PartialEq, Serialize, sqlx::FromRow)]
pub struct PerformanceRecord {
    /// Vendor this record belongs to.
    pub vendor_id: String,
    /// On-time deliveries / deliveries.
    pub on_time_delivery_rate: Option<f64>,
    /// Mean quality rating over completed orders.
    pub quality_rating_avg: Option<f64>,
    /// Mean response time in days.
    pub average_response_time: Option<f64>,
    /// Deliveries / orders issued.
    pub fulfillment_rate: Option<f64>,
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
    /// When the record was last recomputed.
    pub updated_at: DateTime<Utc>,
}

impl PerformanceRecord {
    /// Running counters stored on this record.
    pub fn aggregates(&self) -> VendorAggregates {
        VendorAggregates {
            po_issued: self.po_issued,
            po_delivered: self.po_delivered,
            po_on_time: self.po_on_time,
            response_time_total_secs: self.response_time_total_secs,
            response_count: self.response_count,
        }
    }
}

/// Purchase order row as stored.
#[derive(Debug, Clone, sqlx::FromRow)]
pub(crate) struct PurchaseOrderRow {
    po_id: String,
    po_number: String,
    vendor_id: String,
    created_at: DateTime<Utc>,
    delivery_deadline: DateTime<Utc>,
    status: String,
    items: Json<serde_json::Value>,
    quantity: i64,
    quality_rating: Option<f64>,
    acknowledged_at: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,
}

impl TryFrom<PurchaseOrderRow> for PurchaseOrder {
    type Error = CoreError;

    fn try_from(row: PurchaseOrderRow) -> Result<Self, Self::Error> {
        let status = row.status.parse().map_err(|_| CoreError::DatabaseError {
            operation: "decode_purchase_order".to_string(),
            details: format!(
                "purchase order '{}' has unknown status '{}'",
                row.po_id, row.status
            ),
        })?;

        Ok(PurchaseOrder {
            po_id: row.po_id,
            po_number: row.po_number,
            vendor_id: row.vendor_id,
            created_at: row.created_at,
            delivery_deadline: row.delivery_deadline,
            status,
            items: row.items.0,
            quantity: row.quantity,
            quality_rating: row.quality_rating,
            acknowledged_at: row.acknowledged_at,
            completed_at: row.completed_at,
        })
    }
}

pub(crate) fn into_orders(rows: Vec<PurchaseOrderRow>) -> Result<Vec<PurchaseOrder>, CoreError> {
    rows.into_iter().map(PurchaseOrder::try_from).collect()
}

/// Acknowledged order timestamps, for the response-time recompute.
#[derive(Debug, Clone, sqlx::FromRow)]
pub(crate) struct ResponseFactRow {
    created_at: DateTime<Utc>,
    acknowledged_at: DateTime<Utc>,
}

/// Completed order timestamps, for the on-time recompute.
#[derive(Debug, Clone, sqlx::FromRow)]
pub(crate) struct CompletionFactRow {
    delivery_deadline: DateTime<Utc>,
    completed_at: Option<DateTime<Utc>>,
}

/// Running counters as stored on a performance record.
#[derive(Debug, Clone, Copy, sqlx::FromRow)]
pub(crate) struct StoredCountersRow {
    po_issued: i64,
    po_delivered: i64,
    po_on_time: i64,
    response_time_total_secs: i64,
    response_count: i64,
}

impl From<StoredCountersRow> for VendorAggregates {
    fn from(row: StoredCountersRow) -> Self {
        VendorAggregates {
            po_issued: row.po_issued,
            po_delivered: row.po_delivered,
            po_on_time: row.po_on_time,
            response_time_total_secs: row.response_time_total_secs,
            response_count: row.response_count,
        }
    }
}

/// Fold a write's delta into the stored counters.
pub(crate) fn apply_to_stored(
    stored: StoredCountersRow,
    delta: &PerformanceDelta,
    updated_at: DateTime<Utc>,
) -> PerformanceUpdate {
    let aggregates = VendorAggregates::from(stored).apply(delta);
    PerformanceUpdate::new(aggregates, delta.recompute_quality, updated_at)
}

/// Build vendor aggregates from the raw results of the full-table queries.
pub(crate) fn fold_aggregates(
    po_issued: i64,
    po_delivered: i64,
    responses: &[ResponseFactRow],
    completions: &[CompletionFactRow],
) -> VendorAggregates {
    VendorAggregates {
        po_issued,
        po_delivered,
        po_on_time: completions
            .iter()
            .filter(|row| reconciler::is_on_time(row.delivery_deadline, row.completed_at))
            .count() as i64,
        response_time_total_secs: responses
            .iter()
            .map(|row| reconciler::response_time_secs(row.created_at, row.acknowledged_at))
            .sum(),
        response_count: responses.len() as i64,
    }
}

/// Whether a database error is a unique-constraint violation.
pub(crate) fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.is_unique_violation())
}

/// Persistence interface used by the performance engine and handlers.
#[async_trait]
pub trait Persistence: Send + Sync {
    /// Insert a vendor together with its empty performance record.
    ///
    /// Fails with [`CoreError::VendorCodeTaken`] when the code is in use.
    async fn create_vendor(&self, vendor: &NewVendor) -> Result<VendorRecord, CoreError>;

    /// Get a vendor by ID.
    async fn get_vendor(&self, vendor_id: &str) -> Result<Option<VendorRecord>, CoreError>;

    /// Get a vendor by its vendor code.
    async fn get_vendor_by_code(
        &self,
        vendor_code: &str,
    ) -> Result<Option<VendorRecord>, CoreError>;

    /// List vendors ordered by creation time.
    async fn list_vendors(&self, limit: i64, offset: i64)
    -> Result<Vec<VendorRecord>, CoreError>;

    /// Count all vendors.
    async fn count_vendors(&self) -> Result<i64, CoreError>;

    /// Apply a partial vendor update. Returns `None` when the vendor does not exist.
    async fn update_vendor(
        &self,
        vendor_id: &str,
        update: &VendorUpdate,
    ) -> Result<Option<VendorRecord>, CoreError>;

    /// Delete a vendor; orders and the performance record go with it.
    async fn delete_vendor(&self, vendor_id: &str) -> Result<bool, CoreError>;

    /// Get a vendor's performance record.
    async fn get_performance(
        &self,
        vendor_id: &str,
    ) -> Result<Option<PerformanceRecord>, CoreError>;

    /// Overwrite a vendor's counters and rates.
    async fn save_performance(
        &self,
        vendor_id: &str,
        update: &PerformanceUpdate,
    ) -> Result<PerformanceRecord, CoreError>;

    /// Get a purchase order by ID.
    async fn get_purchase_order(&self, po_id: &str) -> Result<Option<PurchaseOrder>, CoreError>;

    /// Get a purchase order by its order number.
    async fn get_purchase_order_by_number(
        &self,
        po_number: &str,
    ) -> Result<Option<PurchaseOrder>, CoreError>;

    /// List purchase orders, newest first.
    async fn list_purchase_orders(
        &self,
        filter: &ListPurchaseOrdersFilter,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<PurchaseOrder>, CoreError>;

    /// Count purchase orders matching a filter.
    async fn count_purchase_orders(
        &self,
        filter: &ListPurchaseOrdersFilter,
    ) -> Result<i64, CoreError>;

    /// Recompute a vendor's running counters from the purchase order table.
    async fn aggregate_vendor_orders(&self, vendor_id: &str)
    -> Result<VendorAggregates, CoreError>;

    /// Mean quality rating over the vendor's completed orders.
    async fn average_quality_rating(&self, vendor_id: &str) -> Result<Option<f64>, CoreError>;

    /// Upsert a purchase order and fold `delta` into the vendor's stored
    /// counters in one transaction.
    ///
    /// The base counters are read from the performance record under the
    /// transaction's write lock, never from the aggregate cache.
    ///
    /// Fails with [`CoreError::DuplicateOrderNumber`] when the order number is
    /// used by another order.
    async fn commit_order_write(
        &self,
        order: &PurchaseOrder,
        delta: &PerformanceDelta,
        updated_at: DateTime<Utc>,
    ) -> Result<PerformanceRecord, CoreError>;

    /// Delete a purchase order. Returns false when it did not exist.
    async fn delete_purchase_order(&self, po_id: &str) -> Result<bool, CoreError>;

    /// List vendor IDs in creation order, for batch processing.
    async fn list_vendor_ids(&self, limit: i64, offset: i64) -> Result<Vec<String>, CoreError>;

    /// Check database connectivity.
    async fn health_check_db(&self) -> Result<bool, CoreError>;
}

/// Connect to the database named by `database_url`, run migrations and
/// return the matching backend.
///
/// `sqlite:` URLs select [`SqlitePersistence`]; `postgres://` and
/// `postgresql://` select [`PostgresPersistence`].
pub async fn connect(
    database_url: &str,
    max_connections: u32,
) -> Result<Arc<dyn Persistence>, CoreError> {
    if database_url.starts_with("sqlite:") {
        let persistence = SqlitePersistence::connect(database_url, max_connections).await?;
        Ok(Arc::new(persistence))
    } else if database_url.starts_with("postgres://") || database_url.starts_with("postgresql://")
    {
        let persistence = PostgresPersistence::connect(database_url, max_connections).await?;
        Ok(Arc::new(persistence))
    } else {
        Err(CoreError::validation(
            "database_url",
            "expected a sqlite: or postgres:// connection string",
        ))
    }
}
