// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Background worker that audits incrementally maintained vendor statistics.
//!
//! Counters on the performance record are updated write by write, and the
//! aggregate cache read-modify-write is not atomic across concurrent writers.
//! The audit pass rebuilds every vendor from the purchase order table:
//!
//! 1. Walks vendor IDs in batches of `batch_size`
//! 2. Recomputes the aggregates and quality average from the tables
//! 3. Logs any drift from the stored values or the cache entry
//! 4. Rewrites the performance record and the cache entry

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Notify;
use tracing::{debug, error, info, warn};

use crate::clock::Clock;
use crate::engine::PerformanceEngine;
use crate::error::Result;
use crate::persistence::Persistence;

const QUALITY_EPSILON: f64 = 1e-9;

/// Configuration for the audit worker.
#[derive(Debug, Clone)]
pub struct AuditWorkerConfig {
    /// Whether periodic audits run.
    pub enabled: bool,
    /// Time between audit passes.
    pub poll_interval: Duration,
    /// Vendors loaded per batch.
    pub batch_size: i64,
}

impl Default for AuditWorkerConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            poll_interval: Duration::from_secs(3600),
            batch_size: 100,
        }
    }
}

impl AuditWorkerConfig {
    /// Load configuration from environment variables.
    ///
    /// Environment variables:
    /// - `VENDORA_AUDIT_ENABLED`: "true" or "1" to enable (default: false)
    /// - `VENDORA_AUDIT_POLL_INTERVAL_SECS`: seconds between passes (default: 3600)
    /// - `VENDORA_AUDIT_BATCH_SIZE`: vendors per batch (default: 100)
    pub fn from_env() -> Self {
        let enabled = std::env::var("VENDORA_AUDIT_ENABLED")
            .map(|v| v == "true" || v == "1")
            .unwrap_or(false);

        let poll_interval_secs = std::env::var("VENDORA_AUDIT_POLL_INTERVAL_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(3600);

        let batch_size = std::env::var("VENDORA_AUDIT_BATCH_SIZE")
            .ok()
            .and_then(|v| v.parse::<i64>().ok())
            .filter(|size| *size > 0)
            .unwrap_or(100);

        Self {
            enabled,
            poll_interval: Duration::from_secs(poll_interval_secs),
            batch_size,
        }
    }
}

/// Outcome of one audit pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AuditReport {
    /// Vendors recomputed.
    pub vendors_checked: u64,
    /// Vendors whose stored statistics differed from the tables.
    pub vendors_drifted: u64,
}

/// Background worker that periodically rebuilds vendor statistics.
pub struct AuditWorker {
    persistence: Arc<dyn Persistence>,
    engine: PerformanceEngine,
    clock: Arc<dyn Clock>,
    config: AuditWorkerConfig,
    shutdown: Arc<Notify>,
}

impl AuditWorker {
    /// Create a new audit worker.
    pub fn new(
        persistence: Arc<dyn Persistence>,
        engine: PerformanceEngine,
        clock: Arc<dyn Clock>,
        config: AuditWorkerConfig,
    ) -> Self {
        Self {
            persistence,
            engine,
            clock,
            config,
            shutdown: Arc::new(Notify::new()),
        }
    }

    /// Get a handle that can be used to signal shutdown.
    pub fn shutdown_handle(&self) -> Arc<Notify> {
        self.shutdown.clone()
    }

    /// Run the audit loop until the shutdown signal is received.
    pub async fn run(&self) {
        if !self.config.enabled {
            info!("Performance audit worker disabled");
            return;
        }

        info!(
            poll_interval_secs = self.config.poll_interval.as_secs(),
            batch_size = self.config.batch_size,
            "Performance audit worker started"
        );

        loop {
            tokio::select! {
                biased;

                _ = self.shutdown.notified() => {
                    info!("Performance audit worker received shutdown signal");
                    break;
                }

                _ = tokio::time::sleep(self.config.poll_interval) => {
                    if let Err(e) = self.run_once().await {
                        error!(error = %e, "Performance audit pass failed");
                    }
                }
            }
        }

        info!("Performance audit worker stopped");
    }

    /// Audit every vendor once.
    pub async fn run_once(&self) -> Result<AuditReport> {
        let mut report = AuditReport::default();
        let mut offset = 0i64;

        loop {
            let vendor_ids = self
                .persistence
                .list_vendor_ids(self.config.batch_size, offset)
                .await?;

            if vendor_ids.is_empty() {
                break;
            }

            let batch_size = vendor_ids.len();
            for vendor_id in &vendor_ids {
                if self.audit_vendor(vendor_id).await? {
                    report.vendors_drifted += 1;
                }
                report.vendors_checked += 1;
            }

            debug!(
                batch_size = batch_size,
                checked = report.vendors_checked,
                "Audited batch of vendors"
            );

            if batch_size < self.config.batch_size as usize {
                break;
            }
            offset += self.config.batch_size;
        }

        if report.vendors_drifted > 0 {
            info!(
                checked = report.vendors_checked,
                drifted = report.vendors_drifted,
                "Performance audit pass repaired drifted vendors"
            );
        } else {
            debug!(
                checked = report.vendors_checked,
                "Performance audit pass completed, no drift found"
            );
        }

        Ok(report)
    }

    /// Rebuild one vendor. Returns whether its stored statistics had drifted.
    async fn audit_vendor(&self, vendor_id: &str) -> Result<bool> {
        // Deleted since the batch was listed
        let Some(vendor) = self.persistence.get_vendor(vendor_id).await? else {
            return Ok(false);
        };

        let expected = self.persistence.aggregate_vendor_orders(vendor_id).await?;
        let expected_quality = self.persistence.average_quality_rating(vendor_id).await?;

        let drifted = match self.persistence.get_performance(vendor_id).await? {
            Some(stored) => {
                let counters_drifted = stored.aggregates() != expected;
                let quality_drifted =
                    !quality_matches(stored.quality_rating_avg, expected_quality);

                if counters_drifted || quality_drifted {
                    warn!(
                        vendor_code = %vendor.vendor_code,
                        stored = ?stored.aggregates(),
                        expected = ?expected,
                        stored_quality = ?stored.quality_rating_avg,
                        expected_quality = ?expected_quality,
                        "Vendor performance drifted from order table"
                    );
                }
                counters_drifted || quality_drifted
            }
            None => {
                warn!(vendor_code = %vendor.vendor_code, "Vendor has no performance record");
                return Ok(false);
            }
        };

        // A missing entry is rebuilt from the tables and cannot disagree
        let cached = self.engine.fetch_or_recompute(&vendor).await?;
        let cache_drifted = cached != expected;
        if cache_drifted {
            warn!(
                vendor_code = %vendor.vendor_code,
                cached = ?cached,
                expected = ?expected,
                "Aggregate cache entry drifted from order table"
            );
        }

        self.engine
            .recompute_vendor(&vendor, self.clock.now())
            .await?;

        Ok(drifted || cache_drifted)
    }
}

fn quality_matches(stored: Option<f64>, expected: Option<f64>) -> bool {
    match (stored, expected) {
        (Some(a), Some(b)) => (a - b).abs() <= QUALITY_EPSILON,
        (None, None) => true,
        _ => false,
    }
}
