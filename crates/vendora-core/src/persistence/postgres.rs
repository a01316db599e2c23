// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! PostgreSQL persistence operations for vendora-core.
//!
//! Every operation is a free function over a [`PgPool`] so it can be reused
//! outside the [`Persistence`] trait; [`PostgresPersistence`] only delegates.

use chrono::{DateTime, Utc};
use sqlx::postgres::PgPoolOptions;
use sqlx::types::Json;
use sqlx::{PgExecutor, PgPool};

use crate::error::CoreError;
use crate::model::{ListPurchaseOrdersFilter, NewVendor, PurchaseOrder, VendorUpdate};
use crate::reconciler::{PerformanceDelta, PerformanceUpdate, VendorAggregates};

use super::{
    CompletionFactRow, PerformanceRecord, Persistence, PurchaseOrderRow, ResponseFactRow,
    StoredCountersRow, VendorRecord, apply_to_stored, fold_aggregates, into_orders,
    is_unique_violation,
};

/// PostgreSQL-backed persistence implementation.
#[derive(Clone)]
pub struct PostgresPersistence {
    pool: PgPool,
}

impl PostgresPersistence {
    /// Create a new Postgres-backed persistence implementation from a migrated pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Connect to a PostgreSQL URL and run all migrations.
    pub async fn connect(url: &str, max_connections: u32) -> Result<Self, CoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(url)
            .await
            .map_err(|e| CoreError::DatabaseError {
                operation: "connect".to_string(),
                details: format!("Failed to connect to PostgreSQL: {}", e),
            })?;

        crate::migrations::run_postgres(&pool).await?;

        Ok(Self { pool })
    }
}

// ============================================================================
// Vendor Operations
// ============================================================================

/// Insert a vendor and its empty performance record.
pub async fn create_vendor(pool: &PgPool, vendor: &NewVendor) -> Result<VendorRecord, CoreError> {
    let mut tx = pool.begin().await?;

    let inserted = sqlx::query_as::<_, VendorRecord>(
        r#"
        INSERT INTO vendors (vendor_id, name, contact_details, address, vendor_code, created_at)
        VALUES ($1, $2, $3, $4, $5, $6)
        RETURNING vendor_id, name, contact_details, address, vendor_code, created_at
        "#,
    )
    .bind(&vendor.vendor_id)
    .bind(&vendor.name)
    .bind(&vendor.contact_details)
    .bind(&vendor.address)
    .bind(&vendor.vendor_code)
    .bind(vendor.created_at)
    .fetch_one(&mut *tx)
    .await;

    let record = match inserted {
        Ok(record) => record,
        Err(e) if is_unique_violation(&e) => {
            return Err(CoreError::VendorCodeTaken {
                vendor_code: vendor.vendor_code.clone(),
            });
        }
        Err(e) => return Err(e.into()),
    };

    sqlx::query(
        r#"
        INSERT INTO vendor_performance (vendor_id, updated_at)
        VALUES ($1, $2)
        "#,
    )
    .bind(&vendor.vendor_id)
    .bind(vendor.created_at)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;
    Ok(record)
}

/// Get a vendor by ID.
pub async fn get_vendor(pool: &PgPool, vendor_id: &str) -> Result<Option<VendorRecord>, CoreError> {
    let record = sqlx::query_as::<_, VendorRecord>(
        r#"
        SELECT vendor_id, name, contact_details, address, vendor_code, created_at
        FROM vendors
        WHERE vendor_id = $1
        "#,
    )
    .bind(vendor_id)
    .fetch_optional(pool)
    .await?;

    Ok(record)
}

/// Get a vendor by its vendor code.
pub async fn get_vendor_by_code(
    pool: &PgPool,
    vendor_code: &str,
) -> Result<Option<VendorRecord>, CoreError> {
    let record = sqlx::query_as::<_, VendorRecord>(
        r#"
        SELECT vendor_id, name, contact_details, address, vendor_code, created_at
        FROM vendors
        WHERE vendor_code = $1
        "#,
    )
    .bind(vendor_code)
    .fetch_optional(pool)
    .await?;

    Ok(record)
}

/// List vendors in creation order.
pub async fn list_vendors(
    pool: &PgPool,
    limit: i64,
    offset: i64,
) -> Result<Vec<VendorRecord>, CoreError> {
    let records = sqlx::query_as::<_, VendorRecord>(
        r#"
        SELECT vendor_id, name, contact_details, address, vendor_code, created_at
        FROM vendors
        ORDER BY created_at ASC, vendor_id ASC
        LIMIT $1 OFFSET $2
        "#,
    )
    .bind(limit)
    .bind(offset)
    .fetch_all(pool)
    .await?;

    Ok(records)
}

/// Count all vendors.
pub async fn count_vendors(pool: &PgPool) -> Result<i64, CoreError> {
    let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM vendors")
        .fetch_one(pool)
        .await?;

    Ok(row.0)
}

/// Apply a partial update to a vendor.
pub async fn update_vendor(
    pool: &PgPool,
    vendor_id: &str,
    update: &VendorUpdate,
) -> Result<Option<VendorRecord>, CoreError> {
    let result = sqlx::query_as::<_, VendorRecord>(
        r#"
        UPDATE vendors
        SET name = COALESCE($2, name),
            contact_details = COALESCE($3, contact_details),
            address = COALESCE($4, address),
            vendor_code = COALESCE($5, vendor_code)
        WHERE vendor_id = $1
        RETURNING vendor_id, name, contact_details, address, vendor_code, created_at
        "#,
    )
    .bind(vendor_id)
    .bind(&update.name)
    .bind(&update.contact_details)
    .bind(&update.address)
    .bind(&update.vendor_code)
    .fetch_optional(pool)
    .await;

    match result {
        Ok(record) => Ok(record),
        Err(e) if is_unique_violation(&e) => Err(CoreError::VendorCodeTaken {
            vendor_code: update.vendor_code.clone().unwrap_or_default(),
        }),
        Err(e) => Err(e.into()),
    }
}

/// Delete a vendor. Orders and the performance record cascade.
pub async fn delete_vendor(pool: &PgPool, vendor_id: &str) -> Result<bool, CoreError> {
    let result = sqlx::query("DELETE FROM vendors WHERE vendor_id = $1")
        .bind(vendor_id)
        .execute(pool)
        .await?;

    Ok(result.rows_affected() > 0)
}

/// List vendor IDs in creation order.
pub async fn list_vendor_ids(
    pool: &PgPool,
    limit: i64,
    offset: i64,
) -> Result<Vec<String>, CoreError> {
    let ids = sqlx::query_scalar::<_, String>(
        r#"
        SELECT vendor_id
        FROM vendors
        ORDER BY created_at ASC, vendor_id ASC
        LIMIT $1 OFFSET $2
        "#,
    )
    .bind(limit)
    .bind(offset)
    .fetch_all(pool)
    .await?;

    Ok(ids)
}

// ============================================================================
// Performance Operations
// ============================================================================

/// Get a vendor's performance record.
pub async fn get_performance(
    pool: &PgPool,
    vendor_id: &str,
) -> Result<Option<PerformanceRecord>, CoreError> {
    let record = sqlx::query_as::<_, PerformanceRecord>(
        r#"
        SELECT vendor_id, on_time_delivery_rate, quality_rating_avg,
               average_response_time, fulfillment_rate, po_issued, po_delivered,
               po_on_time, response_time_total_secs, response_count, updated_at
        FROM vendor_performance
        WHERE vendor_id = $1
        "#,
    )
    .bind(vendor_id)
    .fetch_optional(pool)
    .await?;

    Ok(record)
}

/// Write counters and rates, optionally recomputing the quality average.
async fn update_performance<'e, E>(
    executor: E,
    vendor_id: &str,
    update: &PerformanceUpdate,
) -> Result<Option<PerformanceRecord>, CoreError>
where
    E: PgExecutor<'e>,
{
    let record = sqlx::query_as::<_, PerformanceRecord>(
        r#"
        UPDATE vendor_performance
        SET po_issued = $2,
            po_delivered = $3,
            po_on_time = $4,
            response_time_total_secs = $5,
            response_count = $6,
            on_time_delivery_rate = $7,
            average_response_time = $8,
            fulfillment_rate = $9,
            quality_rating_avg = CASE
                WHEN $10 THEN (
                    SELECT AVG(quality_rating)
                    FROM purchase_orders
                    WHERE vendor_id = $1 AND status = 'completed'
                )
                ELSE quality_rating_avg
            END,
            updated_at = $11
        WHERE vendor_id = $1
        RETURNING vendor_id, on_time_delivery_rate, quality_rating_avg,
                  average_response_time, fulfillment_rate, po_issued, po_delivered,
                  po_on_time, response_time_total_secs, response_count, updated_at
        "#,
    )
    .bind(vendor_id)
    .bind(update.aggregates.po_issued)
    .bind(update.aggregates.po_delivered)
    .bind(update.aggregates.po_on_time)
    .bind(update.aggregates.response_time_total_secs)
    .bind(update.aggregates.response_count)
    .bind(update.metrics.on_time_delivery_rate)
    .bind(update.metrics.average_response_time)
    .bind(update.metrics.fulfillment_rate)
    .bind(update.recompute_quality)
    .bind(update.updated_at)
    .fetch_optional(executor)
    .await?;

    Ok(record)
}

/// Overwrite a vendor's counters and rates.
pub async fn save_performance(
    pool: &PgPool,
    vendor_id: &str,
    update: &PerformanceUpdate,
) -> Result<PerformanceRecord, CoreError> {
    update_performance(pool, vendor_id, update)
        .await?
        .ok_or_else(|| CoreError::VendorNotFound {
            vendor_id: vendor_id.to_string(),
        })
}

/// Recompute a vendor's running counters from the purchase order table.
pub async fn aggregate_vendor_orders(
    pool: &PgPool,
    vendor_id: &str,
) -> Result<VendorAggregates, CoreError> {
    let mut tx = pool.begin().await?;

    let (po_issued, po_delivered): (i64, i64) = sqlx::query_as(
        r#"
        SELECT COUNT(*),
               COUNT(*) FILTER (WHERE status = 'completed')
        FROM purchase_orders
        WHERE vendor_id = $1
        "#,
    )
    .bind(vendor_id)
    .fetch_one(&mut *tx)
    .await?;

    let responses = sqlx::query_as::<_, ResponseFactRow>(
        r#"
        SELECT created_at, acknowledged_at
        FROM purchase_orders
        WHERE vendor_id = $1 AND acknowledged_at IS NOT NULL
        "#,
    )
    .bind(vendor_id)
    .fetch_all(&mut *tx)
    .await?;

    let completions = sqlx::query_as::<_, CompletionFactRow>(
        r#"
        SELECT delivery_deadline, completed_at
        FROM purchase_orders
        WHERE vendor_id = $1 AND status = 'completed'
        "#,
    )
    .bind(vendor_id)
    .fetch_all(&mut *tx)
    .await?;

    tx.commit().await?;

    Ok(fold_aggregates(
        po_issued,
        po_delivered,
        &responses,
        &completions,
    ))
}

/// Mean quality rating over a vendor's completed orders.
pub async fn average_quality_rating(
    pool: &PgPool,
    vendor_id: &str,
) -> Result<Option<f64>, CoreError> {
    let average: Option<f64> = sqlx::query_scalar(
        r#"
        SELECT AVG(quality_rating)
        FROM purchase_orders
        WHERE vendor_id = $1 AND status = 'completed'
        "#,
    )
    .bind(vendor_id)
    .fetch_one(pool)
    .await?;

    Ok(average)
}

// ============================================================================
// Purchase Order Operations
// ============================================================================

/// Get a purchase order by ID.
pub async fn get_purchase_order(
    pool: &PgPool,
    po_id: &str,
) -> Result<Option<PurchaseOrder>, CoreError> {
    let row = sqlx::query_as::<_, PurchaseOrderRow>(
        r#"
        SELECT po_id, po_number, vendor_id, created_at, delivery_deadline, status,
               items, quantity, quality_rating, acknowledged_at, completed_at
        FROM purchase_orders
        WHERE po_id = $1
        "#,
    )
    .bind(po_id)
    .fetch_optional(pool)
    .await?;

    row.map(PurchaseOrder::try_from).transpose()
}

/// Get a purchase order by its order number.
pub async fn get_purchase_order_by_number(
    pool: &PgPool,
    po_number: &str,
) -> Result<Option<PurchaseOrder>, CoreError> {
    let row = sqlx::query_as::<_, PurchaseOrderRow>(
        r#"
        SELECT po_id, po_number, vendor_id, created_at, delivery_deadline, status,
               items, quantity, quality_rating, acknowledged_at, completed_at
        FROM purchase_orders
        WHERE po_number = $1
        "#,
    )
    .bind(po_number)
    .fetch_optional(pool)
    .await?;

    row.map(PurchaseOrder::try_from).transpose()
}

/// List purchase orders, newest first.
pub async fn list_purchase_orders(
    pool: &PgPool,
    filter: &ListPurchaseOrdersFilter,
    limit: i64,
    offset: i64,
) -> Result<Vec<PurchaseOrder>, CoreError> {
    let rows = sqlx::query_as::<_, PurchaseOrderRow>(
        r#"
        SELECT po_id, po_number, vendor_id, created_at, delivery_deadline, status,
               items, quantity, quality_rating, acknowledged_at, completed_at
        FROM purchase_orders
        WHERE ($1::TEXT IS NULL OR vendor_id = $1)
          AND ($2::TEXT IS NULL OR status = $2)
        ORDER BY created_at DESC, po_id ASC
        LIMIT $3 OFFSET $4
        "#,
    )
    .bind(filter.vendor_id.as_deref())
    .bind(filter.status.map(|s| s.as_str()))
    .bind(limit)
    .bind(offset)
    .fetch_all(pool)
    .await?;

    into_orders(rows)
}

/// Count purchase orders matching a filter.
pub async fn count_purchase_orders(
    pool: &PgPool,
    filter: &ListPurchaseOrdersFilter,
) -> Result<i64, CoreError> {
    let row: (i64,) = sqlx::query_as(
        r#"
        SELECT COUNT(*)
        FROM purchase_orders
        WHERE ($1::TEXT IS NULL OR vendor_id = $1)
          AND ($2::TEXT IS NULL OR status = $2)
        "#,
    )
    .bind(filter.vendor_id.as_deref())
    .bind(filter.status.map(|s| s.as_str()))
    .fetch_one(pool)
    .await?;

    Ok(row.0)
}

/// Upsert a purchase order and fold its delta into the locked performance
/// record atomically.
pub async fn commit_order_write(
    pool: &PgPool,
    order: &PurchaseOrder,
    delta: &PerformanceDelta,
    updated_at: DateTime<Utc>,
) -> Result<PerformanceRecord, CoreError> {
    let mut tx = pool.begin().await?;

    let upserted = sqlx::query(
        r#"
        INSERT INTO purchase_orders (
            po_id, po_number, vendor_id, created_at, delivery_deadline, status,
            items, quantity, quality_rating, acknowledged_at, completed_at
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
        ON CONFLICT (po_id) DO UPDATE
        SET po_number = EXCLUDED.po_number,
            status = EXCLUDED.status,
            items = EXCLUDED.items,
            quantity = EXCLUDED.quantity,
            quality_rating = EXCLUDED.quality_rating,
            acknowledged_at = EXCLUDED.acknowledged_at,
            completed_at = EXCLUDED.completed_at
        "#,
    )
    .bind(&order.po_id)
    .bind(&order.po_number)
    .bind(&order.vendor_id)
    .bind(order.created_at)
    .bind(order.delivery_deadline)
    .bind(order.status.as_str())
    .bind(Json(&order.items))
    .bind(order.quantity)
    .bind(order.quality_rating)
    .bind(order.acknowledged_at)
    .bind(order.completed_at)
    .execute(&mut *tx)
    .await;

    match upserted {
        Ok(_) => {}
        Err(e) if is_unique_violation(&e) => {
            return Err(CoreError::DuplicateOrderNumber {
                po_number: order.po_number.clone(),
            });
        }
        Err(e) => return Err(e.into()),
    }

    // Concurrent writers for the same vendor queue up on this row lock
    let stored = sqlx::query_as::<_, StoredCountersRow>(
        r#"
        SELECT po_issued, po_delivered, po_on_time, response_time_total_secs, response_count
        FROM vendor_performance
        WHERE vendor_id = $1
        FOR UPDATE
        "#,
    )
    .bind(&order.vendor_id)
    .fetch_optional(&mut *tx)
    .await?
    .ok_or_else(|| CoreError::VendorNotFound {
        vendor_id: order.vendor_id.clone(),
    })?;

    let update = apply_to_stored(stored, delta, updated_at);
    let performance = update_performance(&mut *tx, &order.vendor_id, &update)
        .await?
        .ok_or_else(|| CoreError::VendorNotFound {
            vendor_id: order.vendor_id.clone(),
        })?;

    tx.commit().await?;
    Ok(performance)
}

/// Delete a purchase order.
pub async fn delete_purchase_order(pool: &PgPool, po_id: &str) -> Result<bool, CoreError> {
    let result = sqlx::query("DELETE FROM purchase_orders WHERE po_id = $1")
        .bind(po_id)
        .execute(pool)
        .await?;

    Ok(result.rows_affected() > 0)
}

// ============================================================================
// Health Check
// ============================================================================

/// Check database connectivity.
pub async fn health_check_db(pool: &PgPool) -> Result<bool, CoreError> {
    let result: Result<(i32,), _> = sqlx::query_as("SELECT 1").fetch_one(pool).await;
    Ok(result.is_ok())
}

#[async_trait::async_trait]
impl Persistence for PostgresPersistence {
    async fn create_vendor(&self, vendor: &NewVendor) -> Result<VendorRecord, CoreError> {
        create_vendor(&self.pool, vendor).await
    }

    async fn get_vendor(&self, vendor_id: &str) -> Result<Option<VendorRecord>, CoreError> {
        get_vendor(&self.pool, vendor_id).await
    }

    async fn get_vendor_by_code(
        &self,
        vendor_code: &str,
    ) -> Result<Option<VendorRecord>, CoreError> {
        get_vendor_by_code(&self.pool, vendor_code).await
    }

    async fn list_vendors(
        &self,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<VendorRecord>, CoreError> {
        list_vendors(&self.pool, limit, offset).await
    }

    async fn count_vendors(&self) -> Result<i64, CoreError> {
        count_vendors(&self.pool).await
    }

    async fn update_vendor(
        &self,
        vendor_id: &str,
        update: &VendorUpdate,
    ) -> Result<Option<VendorRecord>, CoreError> {
        update_vendor(&self.pool, vendor_id, update).await
    }

    async fn delete_vendor(&self, vendor_id: &str) -> Result<bool, CoreError> {
        delete_vendor(&self.pool, vendor_id).await
    }

    async fn get_performance(
        &self,
        vendor_id: &str,
    ) -> Result<Option<PerformanceRecord>, CoreError> {
        get_performance(&self.pool, vendor_id).await
    }

    async fn save_performance(
        &self,
        vendor_id: &str,
        update: &PerformanceUpdate,
    ) -> Result<PerformanceRecord, CoreError> {
        save_performance(&self.pool, vendor_id, update).await
    }

    async fn get_purchase_order(&self, po_id: &str) -> Result<Option<PurchaseOrder>, CoreError> {
        get_purchase_order(&self.pool, po_id).await
    }

    async fn get_purchase_order_by_number(
        &self,
        po_number: &str,
    ) -> Result<Option<PurchaseOrder>, CoreError> {
        get_purchase_order_by_number(&self.pool, po_number).await
    }

    async fn list_purchase_orders(
        &self,
        filter: &ListPurchaseOrdersFilter,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<PurchaseOrder>, CoreError> {
        list_purchase_orders(&self.pool, filter, limit, offset).await
    }

    async fn count_purchase_orders(
        &self,
        filter: &ListPurchaseOrdersFilter,
    ) -> Result<i64, CoreError> {
        count_purchase_orders(&self.pool, filter).await
    }

    async fn aggregate_vendor_orders(
        &self,
        vendor_id: &str,
    ) -> Result<VendorAggregates, CoreError> {
        aggregate_vendor_orders(&self.pool, vendor_id).await
    }

    async fn average_quality_rating(&self, vendor_id: &str) -> Result<Option<f64>, CoreError> {
        average_quality_rating(&self.pool, vendor_id).await
    }

    async fn commit_order_write(
        &self,
        order: &PurchaseOrder,
        delta: &PerformanceDelta,
        updated_at: DateTime<Utc>,
    ) -> Result<PerformanceRecord, CoreError> {
        commit_order_write(&self.pool, order, delta, updated_at).await
    }

    async fn delete_purchase_order(&self, po_id: &str) -> Result<bool, CoreError> {
        delete_purchase_order(&self.pool, po_id).await
    }

    async fn list_vendor_ids(&self, limit: i64, offset: i64) -> Result<Vec<String>, CoreError> {
        list_vendor_ids(&self.pool, limit, offset).await
    }

    async fn health_check_db(&self) -> Result<bool, CoreError> {
        health_check_db(&self.pool).await
    }
}
