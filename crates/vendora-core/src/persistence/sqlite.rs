// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! SQLite-backed persistence implementation.

use std::path::Path;

use chrono::{DateTime, Utc};
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::types::Json;
use sqlx::{SqliteExecutor, SqlitePool};

use crate::error::CoreError;
use crate::model::{ListPurchaseOrdersFilter, NewVendor, PurchaseOrder, VendorUpdate};
use crate::reconciler::{PerformanceDelta, PerformanceUpdate, VendorAggregates};

use super::{
    CompletionFactRow, PerformanceRecord, Persistence, PurchaseOrderRow, ResponseFactRow,
    StoredCountersRow, VendorRecord, apply_to_stored, fold_aggregates, into_orders,
    is_unique_violation,
};

/// SQLite-backed persistence provider.
#[derive(Clone)]
pub struct SqlitePersistence {
    pool: SqlitePool,
}

impl SqlitePersistence {
    /// Create a new SQLite persistence provider from an existing, migrated pool.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Underlying connection pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Connect to a `sqlite:` URL and run all migrations.
    ///
    /// In-memory databases are private to their connection, so they are
    /// always opened with a single connection.
    pub async fn connect(url: &str, max_connections: u32) -> Result<Self, CoreError> {
        let max_connections = if url.contains(":memory:") {
            1
        } else {
            max_connections
        };

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect(url)
            .await
            .map_err(|e| CoreError::DatabaseError {
                operation: "connect".to_string(),
                details: format!("Failed to connect to SQLite at {}: {}", url, e),
            })?;

        crate::migrations::run_sqlite(&pool).await?;

        Ok(Self { pool })
    }

    /// Create and initialize a new SQLite persistence from a file path.
    ///
    /// Creates parent directories and the database file if needed, then
    /// runs all migrations.
    ///
    /// # Example
    ///
    /// ```ignore
    /// let persistence = SqlitePersistence::from_path(".data/vendora.db").await?;
    /// ```
    pub async fn from_path(path: impl AsRef<Path>) -> Result<Self, CoreError> {
        let path = path.as_ref();

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(|e| CoreError::DatabaseError {
                operation: "create_dir".to_string(),
                details: format!("Failed to create directory {:?}: {}", parent, e),
            })?;
        }

        let url = format!("sqlite:{}?mode=rwc", path.to_string_lossy());
        Self::connect(&url, 5).await
    }
}

/// Write counters and rates, optionally recomputing the quality average.
async fn update_performance<'e, E>(
    executor: E,
    vendor_id: &str,
    update: &PerformanceUpdate,
) -> Result<Option<PerformanceRecord>, CoreError>
where
    E: SqliteExecutor<'e>,
{
    let record = sqlx::query_as::<_, PerformanceRecord>(
        r#"
        UPDATE vendor_performance
        SET po_issued = ?2,
            po_delivered = ?3,
            po_on_time = ?4,
            response_time_total_secs = ?5,
            response_count = ?6,
            on_time_delivery_rate = ?7,
            average_response_time = ?8,
            fulfillment_rate = ?9,
            quality_rating_avg = CASE
                WHEN ?10 THEN (
                    SELECT AVG(quality_rating)
                    FROM purchase_orders
                    WHERE vendor_id = ?1 AND status = 'completed'
                )
                ELSE quality_rating_avg
            END,
            updated_at = ?11
        WHERE vendor_id = ?1
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

#[async_trait::async_trait]
impl Persistence for SqlitePersistence {
    async fn create_vendor(&self, vendor: &NewVendor) -> Result<VendorRecord, CoreError> {
        let mut tx = self.pool.begin().await?;

        let inserted = sqlx::query(
            r#"
            INSERT INTO vendors (vendor_id, name, contact_details, address, vendor_code, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&vendor.vendor_id)
        .bind(&vendor.name)
        .bind(&vendor.contact_details)
        .bind(&vendor.address)
        .bind(&vendor.vendor_code)
        .bind(vendor.created_at)
        .execute(&mut *tx)
        .await;

        if let Err(e) = inserted {
            if is_unique_violation(&e) {
                return Err(CoreError::VendorCodeTaken {
                    vendor_code: vendor.vendor_code.clone(),
                });
            }
            return Err(e.into());
        }

        sqlx::query(
            r#"
            INSERT INTO vendor_performance (vendor_id, updated_at)
            VALUES (?, ?)
            "#,
        )
        .bind(&vendor.vendor_id)
        .bind(vendor.created_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(VendorRecord {
            vendor_id: vendor.vendor_id.clone(),
            name: vendor.name.clone(),
            contact_details: vendor.contact_details.clone(),
            address: vendor.address.clone(),
            vendor_code: vendor.vendor_code.clone(),
            created_at: vendor.created_at,
        })
    }

    async fn get_vendor(&self, vendor_id: &str) -> Result<Option<VendorRecord>, CoreError> {
        let record = sqlx::query_as::<_, VendorRecord>(
            r#"
            SELECT vendor_id, name, contact_details, address, vendor_code, created_at
            FROM vendors
            WHERE vendor_id = ?
            "#,
        )
        .bind(vendor_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(record)
    }

    async fn get_vendor_by_code(
        &self,
        vendor_code: &str,
    ) -> Result<Option<VendorRecord>, CoreError> {
        let record = sqlx::query_as::<_, VendorRecord>(
            r#"
            SELECT vendor_id, name, contact_details, address, vendor_code, created_at
            FROM vendors
            WHERE vendor_code = ?
            "#,
        )
        .bind(vendor_code)
        .fetch_optional(&self.pool)
        .await?;

        Ok(record)
    }

    async fn list_vendors(
        &self,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<VendorRecord>, CoreError> {
        let rows = sqlx::query_as::<_, VendorRecord>(
            r#"
            SELECT vendor_id, name, contact_details, address, vendor_code, created_at
            FROM vendors
            ORDER BY created_at ASC, vendor_id ASC
            LIMIT ? OFFSET ?
            "#,
        )
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    async fn count_vendors(&self) -> Result<i64, CoreError> {
        let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM vendors")
            .fetch_one(&self.pool)
            .await?;

        Ok(row.0)
    }

    async fn update_vendor(
        &self,
        vendor_id: &str,
        update: &VendorUpdate,
    ) -> Result<Option<VendorRecord>, CoreError> {
        let result = sqlx::query_as::<_, VendorRecord>(
            r#"
            UPDATE vendors
            SET name = COALESCE(?1, name),
                contact_details = COALESCE(?2, contact_details),
                address = COALESCE(?3, address),
                vendor_code = COALESCE(?4, vendor_code)
            WHERE vendor_id = ?5
            RETURNING vendor_id, name, contact_details, address, vendor_code, created_at
            "#,
        )
        .bind(&update.name)
        .bind(&update.contact_details)
        .bind(&update.address)
        .bind(&update.vendor_code)
        .bind(vendor_id)
        .fetch_optional(&self.pool)
        .await;

        match result {
            Ok(record) => Ok(record),
            Err(e) if is_unique_violation(&e) => Err(CoreError::VendorCodeTaken {
                vendor_code: update.vendor_code.clone().unwrap_or_default(),
            }),
            Err(e) => Err(e.into()),
        }
    }

    async fn delete_vendor(&self, vendor_id: &str) -> Result<bool, CoreError> {
        let result = sqlx::query("DELETE FROM vendors WHERE vendor_id = ?")
            .bind(vendor_id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn get_performance(
        &self,
        vendor_id: &str,
    ) -> Result<Option<PerformanceRecord>, CoreError> {
        let record = sqlx::query_as::<_, PerformanceRecord>(
            r#"
            SELECT vendor_id, on_time_delivery_rate, quality_rating_avg,
                   average_response_time, fulfillment_rate, po_issued, po_delivered,
                   po_on_time, response_time_total_secs, response_count, updated_at
            FROM vendor_performance
            WHERE vendor_id = ?
            "#,
        )
        .bind(vendor_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(record)
    }

    async fn save_performance(
        &self,
        vendor_id: &str,
        update: &PerformanceUpdate,
    ) -> Result<PerformanceRecord, CoreError> {
        update_performance(&self.pool, vendor_id, update)
            .await?
            .ok_or_else(|| CoreError::VendorNotFound {
                vendor_id: vendor_id.to_string(),
            })
    }

    async fn get_purchase_order(&self, po_id: &str) -> Result<Option<PurchaseOrder>, CoreError> {
        let row = sqlx::query_as::<_, PurchaseOrderRow>(
            r#"
            SELECT po_id, po_number, vendor_id, created_at, delivery_deadline, status,
                   items, quantity, quality_rating, acknowledged_at, completed_at
            FROM purchase_orders
            WHERE po_id = ?
            "#,
        )
        .bind(po_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(PurchaseOrder::try_from).transpose()
    }

    async fn get_purchase_order_by_number(
        &self,
        po_number: &str,
    ) -> Result<Option<PurchaseOrder>, CoreError> {
        let row = sqlx::query_as::<_, PurchaseOrderRow>(
            r#"
            SELECT po_id, po_number, vendor_id, created_at, delivery_deadline, status,
                   items, quantity, quality_rating, acknowledged_at, completed_at
            FROM purchase_orders
            WHERE po_number = ?
            "#,
        )
        .bind(po_number)
        .fetch_optional(&self.pool)
        .await?;

        row.map(PurchaseOrder::try_from).transpose()
    }

    async fn list_purchase_orders(
        &self,
        filter: &ListPurchaseOrdersFilter,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<PurchaseOrder>, CoreError> {
        let rows = sqlx::query_as::<_, PurchaseOrderRow>(
            r#"
            SELECT po_id, po_number, vendor_id, created_at, delivery_deadline, status,
                   items, quantity, quality_rating, acknowledged_at, completed_at
            FROM purchase_orders
            WHERE (?1 IS NULL OR vendor_id = ?1)
              AND (?2 IS NULL OR status = ?2)
            ORDER BY created_at DESC, po_id ASC
            LIMIT ?3 OFFSET ?4
            "#,
        )
        .bind(filter.vendor_id.as_deref())
        .bind(filter.status.map(|s| s.as_str()))
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        into_orders(rows)
    }

    async fn count_purchase_orders(
        &self,
        filter: &ListPurchaseOrdersFilter,
    ) -> Result<i64, CoreError> {
        let row: (i64,) = sqlx::query_as(
            r#"
            SELECT COUNT(*)
            FROM purchase_orders
            WHERE (?1 IS NULL OR vendor_id = ?1)
              AND (?2 IS NULL OR status = ?2)
            "#,
        )
        .bind(filter.vendor_id.as_deref())
        .bind(filter.status.map(|s| s.as_str()))
        .fetch_one(&self.pool)
        .await?;

        Ok(row.0)
    }

    async fn aggregate_vendor_orders(
        &self,
        vendor_id: &str,
    ) -> Result<VendorAggregates, CoreError> {
        // One transaction so the three reads see the same snapshot
        let mut tx = self.pool.begin().await?;

        let (po_issued, po_delivered): (i64, i64) = sqlx::query_as(
            r#"
            SELECT COUNT(*),
                   COALESCE(SUM(CASE WHEN status = 'completed' THEN 1 ELSE 0 END), 0)
            FROM purchase_orders
            WHERE vendor_id = ?
            "#,
        )
        .bind(vendor_id)
        .fetch_one(&mut *tx)
        .await?;

        let responses = sqlx::query_as::<_, ResponseFactRow>(
            r#"
            SELECT created_at, acknowledged_at
            FROM purchase_orders
            WHERE vendor_id = ? AND acknowledged_at IS NOT NULL
            "#,
        )
        .bind(vendor_id)
        .fetch_all(&mut *tx)
        .await?;

        let completions = sqlx::query_as::<_, CompletionFactRow>(
            r#"
            SELECT delivery_deadline, completed_at
            FROM purchase_orders
            WHERE vendor_id = ? AND status = 'completed'
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

    async fn average_quality_rating(&self, vendor_id: &str) -> Result<Option<f64>, CoreError> {
        let average: Option<f64> = sqlx::query_scalar(
            r#"
            SELECT AVG(quality_rating)
            FROM purchase_orders
            WHERE vendor_id = ? AND status = 'completed'
            "#,
        )
        .bind(vendor_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(average)
    }

    async fn commit_order_write(
        &self,
        order: &PurchaseOrder,
        delta: &PerformanceDelta,
        updated_at: DateTime<Utc>,
    ) -> Result<PerformanceRecord, CoreError> {
        // The upsert runs first so the transaction holds the write lock
        // before the counters are read.
        let mut tx = self.pool.begin().await?;

        let upserted = sqlx::query(
            r#"
            INSERT INTO purchase_orders (
                po_id, po_number, vendor_id, created_at, delivery_deadline, status,
                items, quantity, quality_rating, acknowledged_at, completed_at
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
            ON CONFLICT (po_id) DO UPDATE
            SET po_number = excluded.po_number,
                status = excluded.status,
                items = excluded.items,
                quantity = excluded.quantity,
                quality_rating = excluded.quality_rating,
                acknowledged_at = excluded.acknowledged_at,
                completed_at = excluded.completed_at
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

        if let Err(e) = upserted {
            if is_unique_violation(&e) {
                return Err(CoreError::DuplicateOrderNumber {
                    po_number: order.po_number.clone(),
                });
            }
            return Err(e.into());
        }

        let stored = sqlx::query_as::<_, StoredCountersRow>(
            r#"
            SELECT po_issued, po_delivered, po_on_time, response_time_total_secs, response_count
            FROM vendor_performance
            WHERE vendor_id = ?
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

    async fn delete_purchase_order(&self, po_id: &str) -> Result<bool, CoreError> {
        let result = sqlx::query("DELETE FROM purchase_orders WHERE po_id = ?")
            .bind(po_id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn list_vendor_ids(&self, limit: i64, offset: i64) -> Result<Vec<String>, CoreError> {
        let ids = sqlx::query_scalar::<_, String>(
            r#"
            SELECT vendor_id
            FROM vendors
            ORDER BY created_at ASC, vendor_id ASC
            LIMIT ? OFFSET ?
            "#,
        )
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        Ok(ids)
    }

    async fn health_check_db(&self) -> Result<bool, CoreError> {
        let result: Result<(i64,), _> = sqlx::query_as("SELECT 1").fetch_one(&self.pool).await;
        Ok(result.is_ok())
    }
}
