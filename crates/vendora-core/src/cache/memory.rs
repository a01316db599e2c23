// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! In-process aggregate cache.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;

use super::{AggregateCache, CacheError};
use crate::reconciler::VendorAggregates;

#[derive(Debug, Clone, Copy)]
struct CacheEntry {
    aggregates: VendorAggregates,
    expires_at: Instant,
}

/// Per-process cache backed by a concurrent map with per-entry expiry.
///
/// Expired entries are dropped lazily on read.
#[derive(Debug, Default)]
pub struct InMemoryAggregateCache {
    entries: DashMap<String, CacheEntry>,
}

impl InMemoryAggregateCache {
    /// Create an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored entries, including ones that expired but were not read since.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the cache holds no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop every entry.
    pub fn clear(&self) {
        self.entries.clear();
    }
}

#[async_trait]
impl AggregateCache for InMemoryAggregateCache {
    async fn get(&self, key: &str) -> Result<Option<VendorAggregates>, CacheError> {
        let now = Instant::now();
        let hit = self
            .entries
            .get(key)
            .map(|entry| (entry.aggregates, entry.expires_at > now));

        match hit {
            Some((aggregates, true)) => Ok(Some(aggregates)),
            Some((_, false)) => {
                self.entries
                    .remove_if(key, |_, entry| entry.expires_at <= now);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn set(
        &self,
        key: &str,
        aggregates: &VendorAggregates,
        ttl: Duration,
    ) -> Result<(), CacheError> {
        self.entries.insert(
            key.to_string(),
            CacheEntry {
                aggregates: *aggregates,
                expires_at: Instant::now() + ttl,
            },
        );
        Ok(())
    }

    async fn invalidate(&self, key: &str) -> Result<(), CacheError> {
        self.entries.remove(key);
        Ok(())
    }
}
