// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Vendora Core - Vendor Performance Engine
//!
//! This crate stores vendors and their purchase orders and keeps a per-vendor
//! performance record current as orders move through their lifecycle. Every
//! order write is reconciled in-line: the order row and the vendor's updated
//! statistics are committed in the same database transaction.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                     Outer transport (HTTP, CLI, ...)                     │
//! └─────────────────────────────────────────────────────────────────────────┘
//!                                    │
//!                                    ▼
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                              handlers                                    │
//! │        vendor CRUD · purchase order CRUD · acknowledge · complete        │
//! └─────────────────────────────────────────────────────────────────────────┘
//!                                    │ order writes
//!                                    ▼
//! ┌───────────────────────┐   ┌───────────────────┐   ┌─────────────────────┐
//! │   PerformanceEngine   │──►│    reconciler     │   │   AggregateCache    │
//! │ fetch_or_recompute    │   │ prepare_write     │   │ in-process / Redis  │
//! │ record_order_write    │◄──│ reconcile → delta │   │ keyed by vendor code│
//! └───────────────────────┘   └───────────────────┘   └─────────────────────┘
//!           │                                                    ▲
//!           ▼                                                    │
//! ┌───────────────────────┐        ┌─────────────────────┐       │
//! │  Persistence (sqlx)   │◄───────│    AuditWorker      │───────┘
//! │  SQLite / PostgreSQL  │        │ periodic recompute  │
//! └───────────────────────┘        └─────────────────────┘
//! ```
//!
//! # Vendor Statistics
//!
//! | Metric | Definition |
//! |--------|------------|
//! | `fulfillment_rate` | completed orders / orders issued |
//! | `on_time_delivery_rate` | orders completed by their deadline / completed orders |
//! | `average_response_time` | mean days from creation to acknowledgment |
//! | `quality_rating_avg` | mean quality rating of completed orders |
//!
//! A rate whose denominator is zero is `None`. Every order gets a delivery
//! deadline ten days after creation.
//!
//! # Configuration
//!
//! | Variable | Default | Purpose |
//! |----------|---------|---------|
//! | `VENDORA_DATABASE_URL` | required | `sqlite:` or `postgres://` URL |
//! | `VENDORA_REDIS_URL` | unset | Redis aggregate cache (in-process when unset) |
//! | `VENDORA_CACHE_TTL_SECS` | 86400 | Aggregate cache entry lifetime |
//! | `VENDORA_DB_MAX_CONNECTIONS` | 10 | Database pool size |
//! | `VENDORA_AUDIT_ENABLED` | false | Periodic statistics audit |
//! | `VENDORA_AUDIT_POLL_INTERVAL_SECS` | 3600 | Time between audit passes |
//! | `VENDORA_AUDIT_BATCH_SIZE` | 100 | Vendors per audit batch |
//!
//! # Modules
//!
//! - [`handlers`]: request handlers, the crate's public operations
//! - [`engine`]: write path tying reconciler, cache and persistence together
//! - [`reconciler`]: pure lifecycle rules and counter arithmetic
//! - [`cache`]: aggregate cache trait and backends
//! - [`persistence`]: storage trait with SQLite and PostgreSQL backends
//! - [`audit_worker`]: background recompute of stored statistics

#![warn(missing_docs)]

pub mod audit_worker;
pub mod cache;
pub mod clock;
pub mod config;
pub mod engine;
pub mod error;
pub mod handlers;
pub mod migrations;
pub mod model;
pub mod persistence;
pub mod reconciler;

pub use error::{CoreError, ErrorResponse, Result};
