// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Request handlers for vendora-core.
//!
//! Handlers are the boundary an outer transport calls into. Each takes the
//! shared [`HandlerState`] plus a typed request and returns a typed response
//! or a [`CoreError`](crate::error::CoreError) carrying a stable error code.
//!
//! - [`vendor`]: vendor CRUD and performance lookup
//! - [`purchase_order`]: purchase order CRUD, acknowledgment and completion

pub mod purchase_order;
pub mod vendor;

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::cache::AggregateCache;
use crate::clock::{Clock, SystemClock};
use crate::engine::PerformanceEngine;
use crate::error::{CoreError, Result};
use crate::persistence::Persistence;

/// Page size used when a list request does not specify one.
pub const DEFAULT_PAGE_SIZE: i64 = 100;

/// Largest page a list request may ask for.
pub const MAX_PAGE_SIZE: i64 = 1000;

/// Shared state for all handlers.
pub struct HandlerState {
    /// Persistence implementation.
    pub persistence: Arc<dyn Persistence>,
    /// Performance engine used by every order write.
    pub engine: PerformanceEngine,
    /// Source of server-assigned timestamps.
    pub clock: Arc<dyn Clock>,
    /// When the server started (for uptime calculation).
    pub start_time: std::time::Instant,
    /// Server version string.
    pub version: String,
}

impl HandlerState {
    /// Create handler state over a persistence backend and aggregate cache.
    pub fn new(
        persistence: Arc<dyn Persistence>,
        cache: Arc<dyn AggregateCache>,
        cache_ttl: Duration,
    ) -> Self {
        Self::with_clock(persistence, cache, cache_ttl, Arc::new(SystemClock))
    }

    /// Create handler state with an explicit clock.
    pub fn with_clock(
        persistence: Arc<dyn Persistence>,
        cache: Arc<dyn AggregateCache>,
        cache_ttl: Duration,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let engine = PerformanceEngine::new(persistence.clone(), cache, cache_ttl);
        Self {
            persistence,
            engine,
            clock,
            start_time: std::time::Instant::now(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }

    /// Get the server uptime in milliseconds.
    pub fn uptime_ms(&self) -> i64 {
        self.start_time.elapsed().as_millis() as i64
    }
}

/// Pagination parameters shared by the list requests.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct Page {
    /// Maximum number of items (default [`DEFAULT_PAGE_SIZE`]).
    pub limit: Option<i64>,
    /// Number of items to skip.
    pub offset: Option<i64>,
}

impl Page {
    /// Resolve to a concrete `(limit, offset)` pair.
    pub fn resolve(&self) -> Result<(i64, i64)> {
        let limit = self.limit.unwrap_or(DEFAULT_PAGE_SIZE);
        if !(1..=MAX_PAGE_SIZE).contains(&limit) {
            return Err(CoreError::validation(
                "limit",
                format!("must be between 1 and {}", MAX_PAGE_SIZE),
            ));
        }

        let offset = self.offset.unwrap_or(0);
        if offset < 0 {
            return Err(CoreError::validation("offset", "must not be negative"));
        }

        Ok((limit, offset))
    }
}

/// Health check response.
#[derive(Debug, Clone, Serialize)]
pub struct HealthCheckResponse {
    /// Whether the database is reachable.
    pub healthy: bool,
    /// Server version.
    pub version: String,
    /// Uptime in milliseconds.
    pub uptime_ms: i64,
    /// Number of registered vendors (0 when the database is down).
    pub vendor_count: i64,
}

/// Handle health check request.
#[instrument(skip(state))]
pub async fn handle_health_check(state: &HandlerState) -> Result<HealthCheckResponse> {
    debug!("Health check requested");

    let db_healthy = state.persistence.health_check_db().await.unwrap_or(false);

    let vendor_count = if db_healthy {
        state.persistence.count_vendors().await.unwrap_or(0)
    } else {
        0
    };

    Ok(HealthCheckResponse {
        healthy: db_healthy,
        version: state.version.clone(),
        uptime_ms: state.uptime_ms(),
        vendor_count,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_defaults() {
        assert_eq!(Page::default().resolve().unwrap(), (DEFAULT_PAGE_SIZE, 0));
    }

    #[test]
    fn test_page_bounds() {
        let page = Page {
            limit: Some(0),
            offset: None,
        };
        assert!(page.resolve().is_err());

        let page = Page {
            limit: Some(MAX_PAGE_SIZE + 1),
            offset: None,
        };
        assert!(page.resolve().is_err());

        let page = Page {
            limit: Some(10),
            offset: Some(-1),
        };
        assert!(page.resolve().is_err());

        let page = Page {
            limit: Some(10),
            offset: Some(20),
        };
        assert_eq!(page.resolve().unwrap(), (10, 20));
    }
}
