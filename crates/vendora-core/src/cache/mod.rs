// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Aggregate cache for vendor running counters.
//!
//! The cache is keyed by vendor code and holds the full [`VendorAggregates`]
//! mapping with a fixed time-to-live. It is a memoization layer only: any
//! miss, expiry or backend error falls back to a full aggregate query
//! against the purchase order table. Entries are always read, mutated
//! locally and rewritten whole; no backend-side increments are used.

pub mod memory;
#[cfg(feature = "redis-cache")]
pub mod redis;

pub use self::memory::InMemoryAggregateCache;
#[cfg(feature = "redis-cache")]
pub use self::redis::RedisAggregateCache;

use std::time::Duration;

use async_trait::async_trait;

use crate::reconciler::VendorAggregates;

/// Default lifetime of a cache entry (24 hours).
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// Cache backend errors. Never surfaced to callers of the handlers.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    /// The backend could not be reached or rejected the command.
    #[error("cache backend error: {0}")]
    Backend(String),

    /// A stored entry could not be decoded.
    #[error("corrupt cache entry '{key}': {details}")]
    Corrupt {
        /// Key of the unreadable entry.
        key: String,
        /// Decoder error.
        details: String,
    },
}

/// Key/value store for vendor aggregates.
#[async_trait]
pub trait AggregateCache: Send + Sync {
    /// Fetch the aggregates stored under `key`, if present and unexpired.
    async fn get(&self, key: &str) -> Result<Option<VendorAggregates>, CacheError>;

    /// Store `aggregates` under `key` for `ttl`.
    async fn set(
        &self,
        key: &str,
        aggregates: &VendorAggregates,
        ttl: Duration,
    ) -> Result<(), CacheError>;

    /// Drop the entry under `key`.
    async fn invalidate(&self, key: &str) -> Result<(), CacheError>;
}
