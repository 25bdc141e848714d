//! Redis-backed token storage shared between service instances
//!
//! Keys: `session:{id}` written with `SETEX` (TTL refreshed on every write)
//! and `token:{key}` with an optional TTL. The multiplexed connection is
//! opened on first use and verified with `PING`. A command that fails with a
//! dropped, refused or timed-out connection discards the cached connection
//! so the next caller reconnects; the failing command itself is not retried
//! and surfaces as `TuneLinkError::Storage`.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::AsyncCommands;
use tokio::sync::RwLock;
use tunelink_common::auth::{TokenRecord, UserSession};
use tunelink_common::EncryptionManager;
use tunelink_core::TokenStorage;
use tunelink_domain::{redact, Result, StorageConfig, TuneLinkError};

use super::{open, seal, session_key, token_key};
use crate::errors::InfraError;

fn redis_err(err: redis::RedisError) -> TuneLinkError {
    InfraError::from(err).into()
}

/// Errors after which the multiplexed connection cannot be reused
fn drops_connection(err: &redis::RedisError) -> bool {
    err.is_connection_dropped()
        || err.is_io_error()
        || err.is_connection_refusal()
        || err.is_timeout()
}

pub struct RedisTokenStorage {
    client: redis::Client,
    connection: RwLock<Option<MultiplexedConnection>>,
    encryption: Arc<EncryptionManager>,
    connect_timeout: Duration,
    session_ttl_secs: u64,
}

impl RedisTokenStorage {
    /// Create a storage handle; no connection is made until first use.
    ///
    /// # Errors
    /// Returns `TuneLinkError::Config` when `url` is not a valid Redis URL.
    pub fn new(url: &str, config: &StorageConfig, encryption: Arc<EncryptionManager>) -> Result<Self> {
        let client = redis::Client::open(url).map_err(|e| match redis_err(e) {
            TuneLinkError::Config(msg) => TuneLinkError::Config(msg),
            other => TuneLinkError::Config(format!("invalid redis URL: {other}")),
        })?;

        Ok(Self {
            client,
            connection: RwLock::new(None),
            encryption,
            connect_timeout: Duration::from_secs(config.connect_timeout_secs),
            session_ttl_secs: config.session_ttl_secs.max(1),
        })
    }

    /// Whether a connection has been established
    pub async fn is_connected(&self) -> bool {
        self.connection.read().await.is_some()
    }

    /// Drop the current connection; the next operation reconnects.
    pub async fn close(&self) {
        if self.connection.write().await.take().is_some() {
            tracing::info!("Redis connection closed");
        }
    }

    async fn connection(&self) -> Result<MultiplexedConnection> {
        if let Some(conn) = self.connection.read().await.as_ref() {
            return Ok(conn.clone());
        }

        let mut guard = self.connection.write().await;
        if let Some(conn) = guard.as_ref() {
            return Ok(conn.clone());
        }

        let mut conn =
            tokio::time::timeout(self.connect_timeout, self.client.get_multiplexed_async_connection())
                .await
                .map_err(|_| {
                    TuneLinkError::Storage(format!(
                        "Redis connection timed out after {}s",
                        self.connect_timeout.as_secs()
                    ))
                })?
                .map_err(redis_err)?;

        let _: String = redis::cmd("PING").query_async(&mut conn).await.map_err(redis_err)?;
        tracing::info!("Connected to Redis token storage");

        *guard = Some(conn.clone());
        Ok(conn)
    }

    /// Map a command result, forgetting the connection if it is dead.
    async fn settle<T>(&self, result: redis::RedisResult<T>) -> Result<T> {
        match result {
            Ok(value) => Ok(value),
            Err(err) => {
                if drops_connection(&err) && self.connection.write().await.take().is_some() {
                    tracing::warn!(error = %err, "Redis connection lost, reconnecting on next use");
                }
                Err(redis_err(err))
            }
        }
    }

    async fn read<T: serde::de::DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        let mut conn = self.connection().await?;
        let sealed: Option<String> = self.settle(conn.get(key).await).await?;
        Ok(sealed.and_then(|sealed| open(&self.encryption, key, &sealed)))
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        let mut conn = self.connection().await?;
        let removed: u64 = self.settle(conn.del(key).await).await?;
        Ok(removed > 0)
    }
}

#[async_trait]
impl TokenStorage for RedisTokenStorage {
    async fn store_session(&self, session_id: &str, session: &UserSession) -> Result<()> {
        let sealed = seal(&self.encryption, session)?;
        let mut conn = self.connection().await?;
        let written = conn.set_ex(session_key(session_id), sealed, self.session_ttl_secs).await;
        let _: () = self.settle(written).await?;
        Ok(())
    }

    async fn get_session(&self, session_id: &str) -> Result<Option<UserSession>> {
        let key = session_key(session_id);
        let session: Option<UserSession> = self.read(&key).await?;
        Ok(session.filter(|s| match s.validate() {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(key = %redact(&key), error = %e, "Discarding invalid stored session");
                false
            }
        }))
    }

    async fn delete_session(&self, session_id: &str) -> Result<bool> {
        self.delete(&session_key(session_id)).await
    }

    async fn store_token(
        &self,
        key: &str,
        record: &TokenRecord,
        ttl: Option<Duration>,
    ) -> Result<()> {
        let sealed = seal(&self.encryption, record)?;
        let mut conn = self.connection().await?;
        let key = token_key(key);
        match ttl.map(|ttl| ttl.as_secs().max(1)) {
            Some(secs) => {
                let _: () = self.settle(conn.set_ex(key, sealed, secs).await).await?;
            }
            None => {
                let _: () = self.settle(conn.set(key, sealed).await).await?;
            }
        }
        Ok(())
    }

    async fn get_token(&self, key: &str) -> Result<Option<TokenRecord>> {
        self.read(&token_key(key)).await
    }

    async fn delete_token(&self, key: &str) -> Result<bool> {
        self.delete(&token_key(key)).await
    }

    fn backend_name(&self) -> &'static str {
        "redis"
    }

    async fn health_check(&self) -> Result<()> {
        let mut conn = self.connection().await?;
        let _: String = self.settle(redis::cmd("PING").query_async(&mut conn).await).await?;
        Ok(())
    }
}
