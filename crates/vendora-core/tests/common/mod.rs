// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Common test infrastructure for vendora-core integration tests.
//!
//! Provides a TestContext wired to an in-memory SQLite database, the
//! in-process aggregate cache and a manually driven clock.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};

use vendora_core::cache::{AggregateCache, InMemoryAggregateCache};
use vendora_core::clock::ManualClock;
use vendora_core::handlers::HandlerState;
use vendora_core::handlers::purchase_order::{
    CreatePurchaseOrderRequest, handle_create_purchase_order,
};
use vendora_core::handlers::vendor::{CreateVendorRequest, handle_create_vendor};
use vendora_core::model::PurchaseOrder;
use vendora_core::persistence::{Persistence, SqlitePersistence, VendorRecord};

/// Fixed starting instant for every test clock.
pub fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 3, 9, 0, 0).unwrap()
}

/// Test context holding handler state and direct handles to its parts.
pub struct TestContext {
    pub state: HandlerState,
    pub persistence: Arc<dyn Persistence>,
    pub cache: Arc<InMemoryAggregateCache>,
    pub clock: Arc<ManualClock>,
}

impl TestContext {
    /// Create a context over a fresh in-memory database and empty cache.
    pub async fn new() -> Self {
        let cache = Arc::new(InMemoryAggregateCache::new());
        Self::with_cache(cache.clone(), cache).await
    }

    /// Create a context whose handlers use `cache`.
    ///
    /// `memory` is kept for inspection; pass the same cache for both when
    /// the handlers should use the in-process cache.
    pub async fn with_cache(
        cache: Arc<dyn AggregateCache>,
        memory: Arc<InMemoryAggregateCache>,
    ) -> Self {
        let persistence: Arc<dyn Persistence> = Arc::new(
            SqlitePersistence::connect("sqlite::memory:", 1)
                .await
                .expect("Failed to open in-memory SQLite"),
        );
        let clock = Arc::new(ManualClock::new(t0()));

        let state = HandlerState::with_clock(
            persistence.clone(),
            cache,
            Duration::from_secs(3600),
            clock.clone(),
        );

        Self {
            state,
            persistence,
            cache: memory,
            clock,
        }
    }

    /// Register a vendor with the given code.
    pub async fn create_vendor(&self, vendor_code: &str) -> VendorRecord {
        handle_create_vendor(
            &self.state,
            CreateVendorRequest {
                name: format!("Vendor {}", vendor_code),
                contact_details: Some("orders@example.com".to_string()),
                address: Some("12 Harbour Street".to_string()),
                vendor_code: vendor_code.to_string(),
            },
        )
        .await
        .expect("Failed to create vendor")
    }

    /// Create a pending order for a vendor at the current clock time.
    pub async fn create_order(&self, vendor_id: &str, po_number: &str) -> PurchaseOrder {
        handle_create_purchase_order(&self.state, order_request(vendor_id, po_number))
            .await
            .expect("Failed to create purchase order")
            .order
    }

    /// Advance the test clock by whole days.
    pub fn advance_days(&self, days: i64) {
        self.clock.advance(chrono::Duration::days(days));
    }
}

/// Build a create request for a pending order of ten widgets.
pub fn order_request(vendor_id: &str, po_number: &str) -> CreatePurchaseOrderRequest {
    CreatePurchaseOrderRequest {
        po_number: po_number.to_string(),
        vendor_id: vendor_id.to_string(),
        items: serde_json::json!([{"sku": "WIDGET-1", "qty": 10}]),
        quantity: 10,
        status: None,
        quality_rating: None,
        acknowledged_at: None,
    }
}

/// Compare two optional rates with a small tolerance.
pub fn assert_rate(actual: Option<f64>, expected: f64) {
    let actual = actual.expect("rate should be defined");
    assert!(
        (actual - expected).abs() < 1e-9,
        "expected rate {}, got {}",
        expected,
        actual
    );
}

/// Skip a test when the PostgreSQL test database is not configured.
#[allow(unused_macros)]
macro_rules! skip_if_no_db {
    () => {
        if std::env::var("TEST_VENDORA_DATABASE_URL").is_err() {
            eprintln!("Skipping test: TEST_VENDORA_DATABASE_URL not set");
            return;
        }
    };
}

/// Skip a test when the Redis test instance is not configured.
#[allow(unused_macros)]
macro_rules! skip_if_no_redis {
    () => {
        if std::env::var("TEST_VENDORA_REDIS_URL").is_err() {
            eprintln!("Skipping test: TEST_VENDORA_REDIS_URL not set");
            return;
        }
    };
}
