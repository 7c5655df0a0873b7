// =============================================================================
// CACHE MODULE
// =============================================================================
// Redis-backed state that doesn't belong in Postgres:
//
// - product:{id}       product detail JSON, 5 minutes
// - revoked:{jti}      signed-out session tokens, until the token expires
// - oauth_state:{s}    pending Google sign-in attempts, 10 minutes
//
// Product caching is best effort: a Redis failure is logged and the request
// falls through to the database. Token and OAuth state checks fail closed.
// =============================================================================

use std::time::Instant;

use anyhow::{Context, Result};
use redis::aio::ConnectionManager;
use uuid::Uuid;

use crate::error::AppResult;
use crate::metrics;
use crate::models::ProductDetail;

const PRODUCT_TTL_SECS: u64 = 300;
const OAUTH_STATE_TTL_SECS: u64 = 600;

fn product_key(id: Uuid) -> String {
    format!("product:{id}")
}

fn revoked_key(jti: Uuid) -> String {
    format!("revoked:{jti}")
}

fn oauth_state_key(state: &str) -> String {
    format!("oauth_state:{state}")
}

#[derive(Clone)]
pub struct Cache {
    conn: ConnectionManager,
}

impl Cache {
    /// ConnectionManager reconnects on its own after the first connection
    pub async fn connect(redis_url: &str) -> Result<Self> {
        let client = redis::Client::open(redis_url).context("Invalid REDIS_URL")?;
        let conn = ConnectionManager::new(client)
            .await
            .context("Failed to connect to Redis")?;
        Ok(Self { conn })
    }

    pub async fn ping(&self) -> bool {
        redis::cmd("PING")
            .query_async::<_, String>(&mut self.conn.clone())
            .await
            .is_ok()
    }

    // -------------------------------------------------------------------------
    // PRODUCT DETAIL
    // -------------------------------------------------------------------------

    pub async fn get_product(&self, id: Uuid) -> Option<ProductDetail> {
        let started = Instant::now();
        let cached: Option<String> = match redis::cmd("GET")
            .arg(product_key(id))
            .query_async(&mut self.conn.clone())
            .await
        {
            Ok(value) => value,
            Err(err) => {
                tracing::warn!(product_id = %id, error = %err, "Product cache read failed");
                return None;
            }
        };
        metrics::record_redis_operation("get", started.elapsed().as_secs_f64());

        cached.and_then(|json| serde_json::from_str(&json).ok())
    }

    pub async fn put_product(&self, product: &ProductDetail) {
        let Ok(json) = serde_json::to_string(product) else {
            return;
        };

        let started = Instant::now();
        let result: redis::RedisResult<()> = redis::cmd("SETEX")
            .arg(product_key(product.product.id))
            .arg(PRODUCT_TTL_SECS)
            .arg(json)
            .query_async(&mut self.conn.clone())
            .await;
        metrics::record_redis_operation("set", started.elapsed().as_secs_f64());

        if let Err(err) = result {
            tracing::warn!(product_id = %product.product.id, error = %err, "Product cache write failed");
        }
    }

    pub async fn invalidate_product(&self, id: Uuid) {
        let started = Instant::now();
        let result: redis::RedisResult<()> = redis::cmd("DEL")
            .arg(product_key(id))
            .query_async(&mut self.conn.clone())
            .await;
        metrics::record_redis_operation("delete", started.elapsed().as_secs_f64());

        if let Err(err) = result {
            tracing::warn!(product_id = %id, error = %err, "Product cache invalidation failed");
        }
    }

    // -------------------------------------------------------------------------
    // SESSION DENYLIST
    // -------------------------------------------------------------------------

    /// Deny the token with this id for the rest of its lifetime
    pub async fn revoke_token(&self, jti: Uuid, ttl_secs: u64) -> AppResult<()> {
        redis::cmd("SETEX")
            .arg(revoked_key(jti))
            .arg(ttl_secs.max(1))
            .arg(1)
            .query_async::<_, ()>(&mut self.conn.clone())
            .await?;
        Ok(())
    }

    pub async fn is_revoked(&self, jti: Uuid) -> AppResult<bool> {
        let started = Instant::now();
        let exists: bool = redis::cmd("EXISTS")
            .arg(revoked_key(jti))
            .query_async(&mut self.conn.clone())
            .await?;
        metrics::record_redis_operation("exists", started.elapsed().as_secs_f64());
        Ok(exists)
    }

    // -------------------------------------------------------------------------
    // OAUTH STATE
    // -------------------------------------------------------------------------

    pub async fn store_oauth_state(&self, state: &str) -> AppResult<()> {
        redis::cmd("SETEX")
            .arg(oauth_state_key(state))
            .arg(OAUTH_STATE_TTL_SECS)
            .arg(1)
            .query_async::<_, ()>(&mut self.conn.clone())
            .await?;
        Ok(())
    }

    /// True exactly once per stored state
    pub async fn take_oauth_state(&self, state: &str) -> AppResult<bool> {
        let deleted: i64 = redis::cmd("DEL")
            .arg(oauth_state_key(state))
            .query_async(&mut self.conn.clone())
            .await?;
        Ok(deleted > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_are_namespaced() {
        let id = Uuid::nil();
        assert_eq!(product_key(id), "product:00000000-0000-0000-0000-000000000000");
        assert!(revoked_key(id).starts_with("revoked:"));
        assert_eq!(oauth_state_key("abc"), "oauth_state:abc");
    }
}
