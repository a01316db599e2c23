// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Performance engine: applies purchase order writes to vendor statistics.
//!
//! The engine owns the write path of every order mutation:
//!
//! 1. run the pure reconciler over the persisted and incoming state,
//! 2. commit the order row and fold the delta into the performance record's
//!    stored counters in one transaction,
//! 3. rewrite the cache entry with the committed counters.
//!
//! The performance record is the base of every read-modify-write. The
//! aggregate cache only memoizes it for [`PerformanceEngine::fetch_or_recompute`]
//! readers, so a stale entry can never roll stored counters back. Cache
//! failures are logged and treated as misses. They never fail a write.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{debug, info, instrument, warn};

use crate::cache::AggregateCache;
use crate::error::{CoreError, Result};
use crate::model::{OrderDraft, PurchaseOrder};
use crate::persistence::{PerformanceRecord, Persistence, VendorRecord};
use crate::reconciler::{self, PerformanceDelta, PerformanceUpdate, VendorAggregates};

/// Result of a committed order write.
#[derive(Debug, Clone)]
pub struct OrderWriteOutcome {
    /// The order as persisted.
    pub order: PurchaseOrder,
    /// The vendor's performance record after the write.
    pub performance: PerformanceRecord,
    /// Counter changes the write caused.
    pub delta: PerformanceDelta,
}

/// Coordinates the aggregate cache, the reconciler and persistence.
#[derive(Clone)]
pub struct PerformanceEngine {
    persistence: Arc<dyn Persistence>,
    cache: Arc<dyn AggregateCache>,
    cache_ttl: Duration,
}

impl PerformanceEngine {
    /// Create an engine over a persistence backend and an aggregate cache.
    pub fn new(
        persistence: Arc<dyn Persistence>,
        cache: Arc<dyn AggregateCache>,
        cache_ttl: Duration,
    ) -> Self {
        Self {
            persistence,
            cache,
            cache_ttl,
        }
    }

    /// Current aggregates for a vendor.
    ///
    /// Served from the cache when possible; otherwise recomputed from the
    /// purchase order table and written back to the cache.
    #[instrument(skip(self, vendor), fields(vendor_code = %vendor.vendor_code))]
    pub async fn fetch_or_recompute(&self, vendor: &VendorRecord) -> Result<VendorAggregates> {
        match self.cache.get(&vendor.vendor_code).await {
            Ok(Some(aggregates)) => {
                debug!("Aggregate cache hit");
                return Ok(aggregates);
            }
            Ok(None) => debug!("Aggregate cache miss"),
            Err(e) => warn!(error = %e, "Aggregate cache read failed, recomputing"),
        }

        let aggregates = self
            .persistence
            .aggregate_vendor_orders(&vendor.vendor_id)
            .await?;

        self.store(&vendor.vendor_code, &aggregates).await;
        Ok(aggregates)
    }

    /// Persist an order write and fold its effect into the vendor's statistics.
    ///
    /// `before` is the persisted order (`None` for a creation). The order row
    /// and the performance record are committed together; the cache is only
    /// rewritten after the commit succeeds, from the committed counters.
    #[instrument(skip_all, fields(vendor_code = %vendor.vendor_code, po_id = %draft.po_id))]
    pub async fn record_order_write(
        &self,
        vendor: &VendorRecord,
        before: Option<&PurchaseOrder>,
        draft: OrderDraft,
        now: DateTime<Utc>,
    ) -> Result<OrderWriteOutcome> {
        if draft.vendor_id != vendor.vendor_id {
            return Err(CoreError::validation(
                "vendor_id",
                "order does not belong to this vendor",
            ));
        }

        let order = reconciler::prepare_write(before, draft, now);
        let delta = reconciler::reconcile(before, &order);

        let performance = self
            .persistence
            .commit_order_write(&order, &delta, now)
            .await?;

        if !delta.is_empty() {
            debug!(
                po_issued = delta.po_issued,
                po_delivered = delta.po_delivered,
                po_on_time = delta.po_on_time,
                response_count = delta.response_count,
                recompute_quality = delta.recompute_quality,
                "Applied performance delta"
            );
        }

        self.store(&vendor.vendor_code, &performance.aggregates())
            .await;

        Ok(OrderWriteOutcome {
            order,
            performance,
            delta,
        })
    }

    /// Delete an order and rebuild its vendor's statistics from the tables.
    ///
    /// Returns `None` when the order did not exist.
    #[instrument(skip_all, fields(vendor_code = %vendor.vendor_code, po_id = %order.po_id))]
    pub async fn record_order_deletion(
        &self,
        vendor: &VendorRecord,
        order: &PurchaseOrder,
        now: DateTime<Utc>,
    ) -> Result<Option<PerformanceRecord>> {
        if !self.persistence.delete_purchase_order(&order.po_id).await? {
            return Ok(None);
        }

        info!("Purchase order deleted, recomputing vendor performance");
        self.recompute_vendor(vendor, now).await.map(Some)
    }

    /// Rebuild a vendor's performance record and cache entry from the tables.
    #[instrument(skip_all, fields(vendor_code = %vendor.vendor_code))]
    pub async fn recompute_vendor(
        &self,
        vendor: &VendorRecord,
        now: DateTime<Utc>,
    ) -> Result<PerformanceRecord> {
        let aggregates = self
            .persistence
            .aggregate_vendor_orders(&vendor.vendor_id)
            .await?;

        let update = PerformanceUpdate::new(aggregates, true, now);
        let performance = self
            .persistence
            .save_performance(&vendor.vendor_id, &update)
            .await?;

        self.store(&vendor.vendor_code, &aggregates).await;
        Ok(performance)
    }

    /// Drop the cache entry stored under a vendor code.
    pub async fn invalidate_vendor(&self, vendor_code: &str) {
        if let Err(e) = self.cache.invalidate(vendor_code).await {
            warn!(vendor_code, error = %e, "Failed to invalidate aggregate cache entry");
        }
    }

    async fn store(&self, vendor_code: &str, aggregates: &VendorAggregates) {
        if let Err(e) = self
            .cache
            .set(vendor_code, aggregates, self.cache_ttl)
            .await
        {
            warn!(vendor_code, error = %e, "Failed to write aggregate cache entry");
            // A stale entry would outlive the write; make the next read recompute.
            self.invalidate_vendor(vendor_code).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{CacheError, InMemoryAggregateCache};
    use crate::model::{NewVendor, OrderStatus};
    use crate::persistence::SqlitePersistence;
    use async_trait::async_trait;
    use chrono::{Duration as ChronoDuration, TimeZone};
    use sqlx::sqlite::SqlitePoolOptions;

    struct BrokenCache;

    #[async_trait]
    impl AggregateCache for BrokenCache {
        async fn get(&self, _key: &str) -> std::result::Result<Option<VendorAggregates>, CacheError> {
            Err(CacheError::Backend("connection refused".to_string()))
        }

        async fn set(
            &self,
            _key: &str,
            _aggregates: &VendorAggregates,
            _ttl: Duration,
        ) -> std::result::Result<(), CacheError> {
            Err(CacheError::Backend("connection refused".to_string()))
        }

        async fn invalidate(&self, _key: &str) -> std::result::Result<(), CacheError> {
            Err(CacheError::Backend("connection refused".to_string()))
        }
    }

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
    }

    async fn setup(cache: Arc<dyn AggregateCache>) -> (PerformanceEngine, Arc<dyn Persistence>, VendorRecord) {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .expect("Failed to create in-memory SQLite pool");
        crate::migrations::run_sqlite(&pool)
            .await
            .expect("Failed to run migrations");

        let persistence: Arc<dyn Persistence> = Arc::new(SqlitePersistence::new(pool));
        let vendor = persistence
            .create_vendor(&NewVendor {
                vendor_id: "vendor-1".to_string(),
                name: "Acme".to_string(),
                contact_details: None,
                address: None,
                vendor_code: "ACME".to_string(),
                created_at: t0(),
            })
            .await
            .unwrap();

        let engine = PerformanceEngine::new(persistence.clone(), cache, Duration::from_secs(60));
        (engine, persistence, vendor)
    }

    fn draft(po_id: &str, po_number: &str) -> OrderDraft {
        OrderDraft {
            po_id: po_id.to_string(),
            po_number: po_number.to_string(),
            vendor_id: "vendor-1".to_string(),
            status: OrderStatus::Pending,
            items: serde_json::json!([{"sku": "NUT-4", "qty": 12}]),
            quantity: 12,
            quality_rating: None,
            acknowledged_at: None,
        }
    }

    #[tokio::test]
    async fn test_creation_populates_cache_and_record() {
        let cache = Arc::new(InMemoryAggregateCache::new());
        let (engine, persistence, vendor) = setup(cache.clone()).await;

        let outcome = engine
            .record_order_write(&vendor, None, draft("po-1", "PO-1"), t0())
            .await
            .unwrap();

        assert_eq!(outcome.delta.po_issued, 1);
        assert_eq!(outcome.order.created_at, t0());
        assert_eq!(outcome.performance.po_issued, 1);
        assert_eq!(outcome.performance.fulfillment_rate, Some(0.0));

        let cached = cache.get("ACME").await.unwrap().unwrap();
        assert_eq!(cached.po_issued, 1);

        let stored = persistence.get_performance("vendor-1").await.unwrap().unwrap();
        assert_eq!(stored.aggregates(), cached);
    }

    #[tokio::test]
    async fn test_completion_counts_once() {
        let cache = Arc::new(InMemoryAggregateCache::new());
        let (engine, _persistence, vendor) = setup(cache).await;

        let created = engine
            .record_order_write(&vendor, None, draft("po-1", "PO-1"), t0())
            .await
            .unwrap()
            .order;

        let mut completion = OrderDraft::from(&created);
        completion.status = OrderStatus::Completed;
        completion.quality_rating = Some(9.0);
        let completed = engine
            .record_order_write(&vendor, Some(&created), completion, t0() + ChronoDuration::days(1))
            .await
            .unwrap();

        assert_eq!(completed.performance.po_delivered, 1);
        assert_eq!(completed.performance.po_on_time, 1);
        assert_eq!(completed.performance.quality_rating_avg, Some(9.0));

        let replay = OrderDraft::from(&completed.order);
        let again = engine
            .record_order_write(
                &vendor,
                Some(&completed.order),
                replay,
                t0() + ChronoDuration::days(2),
            )
            .await
            .unwrap();

        assert!(again.delta.is_empty());
        assert_eq!(again.performance.po_delivered, 1);
        assert_eq!(again.order.completed_at, completed.order.completed_at);
    }

    #[tokio::test]
    async fn test_stale_cache_entry_cannot_roll_back_counters() {
        let cache = Arc::new(InMemoryAggregateCache::new());
        let (engine, persistence, vendor) = setup(cache.clone()).await;

        engine
            .record_order_write(&vendor, None, draft("po-1", "PO-1"), t0())
            .await
            .unwrap();
        engine
            .record_order_write(&vendor, None, draft("po-2", "PO-2"), t0())
            .await
            .unwrap();

        // Entry left behind by a process that missed the last write
        let stale = VendorAggregates {
            po_issued: 1,
            ..Default::default()
        };
        cache
            .set("ACME", &stale, Duration::from_secs(60))
            .await
            .unwrap();

        let third = engine
            .record_order_write(&vendor, None, draft("po-3", "PO-3"), t0())
            .await
            .unwrap();

        assert_eq!(third.performance.po_issued, 3);
        assert_eq!(
            persistence
                .aggregate_vendor_orders("vendor-1")
                .await
                .unwrap()
                .po_issued,
            3
        );
        assert_eq!(cache.get("ACME").await.unwrap().unwrap().po_issued, 3);
    }

    #[tokio::test]
    async fn test_broken_cache_does_not_fail_writes() {
        let (engine, _persistence, vendor) = setup(Arc::new(BrokenCache)).await;

        let first = engine
            .record_order_write(&vendor, None, draft("po-1", "PO-1"), t0())
            .await
            .unwrap();
        let second = engine
            .record_order_write(&vendor, None, draft("po-2", "PO-2"), t0())
            .await
            .unwrap();

        assert_eq!(first.performance.po_issued, 1);
        assert_eq!(second.performance.po_issued, 2);
    }

    #[tokio::test]
    async fn test_expired_entry_is_recomputed() {
        let cache = Arc::new(InMemoryAggregateCache::new());
        let (engine, _persistence, vendor) = setup(cache.clone()).await;

        engine
            .record_order_write(&vendor, None, draft("po-1", "PO-1"), t0())
            .await
            .unwrap();
        cache.clear();

        let aggregates = engine.fetch_or_recompute(&vendor).await.unwrap();
        assert_eq!(aggregates.po_issued, 1);
        assert_eq!(cache.get("ACME").await.unwrap(), Some(aggregates));
    }

    #[tokio::test]
    async fn test_deletion_recomputes_vendor() {
        let cache = Arc::new(InMemoryAggregateCache::new());
        let (engine, persistence, vendor) = setup(cache.clone()).await;

        let mut completed = draft("po-1", "PO-1");
        completed.status = OrderStatus::Completed;
        completed.quality_rating = Some(6.0);
        let order = engine
            .record_order_write(&vendor, None, completed, t0())
            .await
            .unwrap()
            .order;
        engine
            .record_order_write(&vendor, None, draft("po-2", "PO-2"), t0())
            .await
            .unwrap();

        let performance = engine
            .record_order_deletion(&vendor, &order, t0())
            .await
            .unwrap()
            .unwrap();

        assert_eq!(performance.po_issued, 1);
        assert_eq!(performance.po_delivered, 0);
        assert_eq!(performance.fulfillment_rate, Some(0.0));
        assert_eq!(performance.quality_rating_avg, None);
        assert_eq!(cache.get("ACME").await.unwrap().unwrap().po_issued, 1);

        let missing = engine
            .record_order_deletion(&vendor, &order, t0())
            .await
            .unwrap();
        assert!(missing.is_none());
        assert_eq!(
            persistence
                .get_performance("vendor-1")
                .await
                .unwrap()
                .unwrap()
                .po_issued,
            1
        );
    }

    #[tokio::test]
    async fn test_foreign_vendor_draft_is_rejected() {
        let cache = Arc::new(InMemoryAggregateCache::new());
        let (engine, _persistence, vendor) = setup(cache).await;

        let mut foreign = draft("po-1", "PO-1");
        foreign.vendor_id = "vendor-2".to_string();

        let err = engine
            .record_order_write(&vendor, None, foreign, t0())
            .await
            .unwrap_err();
        assert_eq!(err.error_code(), "VALIDATION_ERROR");
    }
}
