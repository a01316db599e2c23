// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Redis/Valkey backed aggregate cache.

use std::time::Duration;

use async_trait::async_trait;
use ::redis::AsyncCommands;
use ::redis::aio::ConnectionManager;
use tracing::info;

use super::{AggregateCache, CacheError};
use crate::reconciler::VendorAggregates;

/// Default prefix for cache keys.
pub const DEFAULT_KEY_PREFIX: &str = "vendora:aggregates:";

/// Shared cache across processes. Entries are JSON documents written with
/// `SET key value EX ttl`.
#[derive(Clone)]
pub struct RedisAggregateCache {
    manager: ConnectionManager,
    prefix: String,
}

impl RedisAggregateCache {
    /// Connect to `url` and use [`DEFAULT_KEY_PREFIX`] for keys.
    pub async fn connect(url: &str) -> Result<Self, CacheError> {
        Self::connect_with_prefix(url, DEFAULT_KEY_PREFIX).await
    }

    /// Connect to `url` and namespace keys under `prefix`.
    pub async fn connect_with_prefix(url: &str, prefix: &str) -> Result<Self, CacheError> {
        let client = ::redis::Client::open(url).map_err(backend)?;
        let manager = ConnectionManager::new(client).await.map_err(backend)?;

        info!(prefix = %prefix, "Connected to Redis aggregate cache");

        Ok(Self {
            manager,
            prefix: prefix.to_string(),
        })
    }

    fn key(&self, key: &str) -> String {
        format!("{}{}", self.prefix, key)
    }
}

fn backend(err: ::redis::RedisError) -> CacheError {
    CacheError::Backend(err.to_string())
}

#[async_trait]
impl AggregateCache for RedisAggregateCache {
    async fn get(&self, key: &str) -> Result<Option<VendorAggregates>, CacheError> {
        let mut conn = self.manager.clone();
        let raw: Option<String> = conn.get(self.key(key)).await.map_err(backend)?;

        raw.map(|payload| {
            serde_json::from_str(&payload).map_err(|e| CacheError::Corrupt {
                key: key.to_string(),
                details: e.to_string(),
            })
        })
        .transpose()
    }

    async fn set(
        &self,
        key: &str,
        aggregates: &VendorAggregates,
        ttl: Duration,
    ) -> Result<(), CacheError> {
        let payload = serde_json::to_string(aggregates).map_err(|e| CacheError::Corrupt {
            key: key.to_string(),
            details: e.to_string(),
        })?;

        let mut conn = self.manager.clone();
        // EX 0 is rejected by Redis
        let seconds = ttl.as_secs().max(1);
        conn.set_ex::<_, _, ()>(self.key(key), payload, seconds)
            .await
            .map_err(backend)
    }

    async fn invalidate(&self, key: &str) -> Result<(), CacheError> {
        let mut conn = self.manager.clone();
        conn.del::<_, ()>(self.key(key)).await.map_err(backend)
    }
}
