//! Redis-backed lease store
//!
//! Each operation is a single Lua script so the ownership check and the
//! mutation happen atomically on the server. Values are owner ids, expiry is
//! the key's PX TTL.

use crate::error::{OwnershipError, Result};
use crate::store::LeaseStore;
use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::Script;
use std::time::Duration;

const ACQUIRE: &str = r#"
local current = redis.call('GET', KEYS[1])
if not current then
  redis.call('SET', KEYS[1], ARGV[1], 'PX', ARGV[2])
  return 1
end
if current == ARGV[1] then
  redis.call('PEXPIRE', KEYS[1], ARGV[2])
  return 1
end
return 0
"#;

const RENEW: &str = r#"
if redis.call('GET', KEYS[1]) == ARGV[1] then
  return redis.call('PEXPIRE', KEYS[1], ARGV[2])
end
return 0
"#;

const RELEASE: &str = r#"
if redis.call('GET', KEYS[1]) == ARGV[1] then
  return redis.call('DEL', KEYS[1])
end
return 0
"#;

pub struct RedisLeaseStore {
    conn: ConnectionManager,
    acquire: Script,
    renew: Script,
    release: Script,
}

impl std::fmt::Debug for RedisLeaseStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisLeaseStore").finish_non_exhaustive()
    }
}

impl RedisLeaseStore {
    /// Connect with automatic reconnection
    pub async fn connect(url: &str) -> Result<Self> {
        let client = redis::Client::open(url)?;
        let conn = ConnectionManager::new(client).await?;
        tracing::info!("Connected to lease store at {}", url);
        Ok(Self {
            conn,
            acquire: Script::new(ACQUIRE),
            renew: Script::new(RENEW),
            release: Script::new(RELEASE),
        })
    }

    async fn run(&self, script: &Script, key: &str, owner: &str, ttl: Option<Duration>) -> Result<bool> {
        let mut conn = self.conn.clone();
        let mut invocation = script.key(key);
        invocation.arg(owner);
        if let Some(ttl) = ttl {
            invocation.arg(ttl_millis(ttl));
        }
        let reply: i64 = invocation.invoke_async(&mut conn).await?;
        reply_to_bool(key, reply)
    }
}

fn ttl_millis(ttl: Duration) -> u64 {
    u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX).max(1)
}

fn reply_to_bool(key: &str, reply: i64) -> Result<bool> {
    match reply {
        1 => Ok(true),
        0 => Ok(false),
        other => Err(OwnershipError::UnexpectedReply {
            key: key.to_string(),
            reply: other,
        }),
    }
}

#[async_trait]
impl LeaseStore for RedisLeaseStore {
    async fn try_acquire(&self, key: &str, owner: &str, ttl: Duration) -> Result<bool> {
        self.run(&self.acquire, key, owner, Some(ttl)).await
    }

    async fn try_renew(&self, key: &str, owner: &str, ttl: Duration) -> Result<bool> {
        self.run(&self.renew, key, owner, Some(ttl)).await
    }

    async fn try_release(&self, key: &str, owner: &str) -> Result<bool> {
        self.run(&self.release, key, owner, None).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reply_mapping() {
        assert!(reply_to_bool("k", 1).unwrap());
        assert!(!reply_to_bool("k", 0).unwrap());
        assert!(matches!(
            reply_to_bool("k", 2),
            Err(OwnershipError::UnexpectedReply { reply: 2, .. })
        ));
    }

    #[test]
    fn test_ttl_in_millis_never_zero() {
        assert_eq!(ttl_millis(Duration::from_secs(30)), 30_000);
        assert_eq!(ttl_millis(Duration::ZERO), 1);
    }

    #[test]
    fn test_scripts_check_owner_before_mutating() {
        for script in [RENEW, RELEASE] {
            assert!(script.contains("== ARGV[1]"));
        }
        assert!(ACQUIRE.contains("'PX'"));
    }
}
