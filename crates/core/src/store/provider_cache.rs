//! Provider search-result cache with TTL.

use chrono::{Duration, Utc};
use rusqlite::params;

use super::{Database, StoreError};

#[derive(Clone)]
pub struct ProviderCacheStore {
    db: Database,
}

impl ProviderCacheStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Fetch a cached value, honoring its TTL. Expired entries read as
    /// misses; they are physically removed by `purge_expired`.
    pub fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        self.db.with_conn(|conn| {
            let row: Option<(String, String)> = conn
                .query_row(
                    "SELECT value, expires_at FROM provider_cache WHERE key = ?",
                    params![key],
                    |row| Ok((row.get(0)?, row.get(1)?)),
                )
                .map(Some)
                .or_else(|e| match e {
                    rusqlite::Error::QueryReturnedNoRows => Ok(None),
                    other => Err(StoreError::from(other)),
                })?;

            match row {
                Some((value, expires_at)) => {
                    let expired = chrono::DateTime::parse_from_rfc3339(&expires_at)
                        .map(|t| t.with_timezone(&Utc) <= Utc::now())
                        .unwrap_or(true);
                    if expired {
                        Ok(None)
                    } else {
                        Ok(Some(value))
                    }
                }
                None => Ok(None),
            }
        })
    }

    pub fn put(&self, key: &str, value: &str, ttl_secs: i64) -> Result<(), StoreError> {
        let expires_at = (Utc::now() + Duration::seconds(ttl_secs)).to_rfc3339();
        self.db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO provider_cache (key, value, expires_at) VALUES (?, ?, ?)
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value, expires_at = excluded.expires_at",
                params![key, value, expires_at],
            )?;
            Ok(())
        })
    }

    /// Remove expired rows; returns how many were dropped.
    pub fn purge_expired(&self) -> Result<u64, StoreError> {
        self.db.with_conn(|conn| {
            let removed = conn.execute(
                "DELETE FROM provider_cache WHERE expires_at <= ?",
                params![Utc::now().to_rfc3339()],
            )?;
            Ok(removed as u64)
        })
    }

    pub fn clear(&self) -> Result<u64, StoreError> {
        self.db.with_conn(|conn| {
            let removed = conn.execute("DELETE FROM provider_cache", [])?;
            Ok(removed as u64)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> ProviderCacheStore {
        ProviderCacheStore::new(Database::in_memory().unwrap())
    }

    #[test]
    fn test_put_get_roundtrip() {
        let cache = store();
        cache.put("k1", "[\"result\"]", 3600).unwrap();
        assert_eq!(cache.get("k1").unwrap().as_deref(), Some("[\"result\"]"));
    }

    #[test]
    fn test_get_honors_ttl() {
        let cache = store();
        cache.put("stale", "v", -1).unwrap();
        assert!(cache.get("stale").unwrap().is_none());
    }

    #[test]
    fn test_put_overwrites() {
        let cache = store();
        cache.put("k", "old", 3600).unwrap();
        cache.put("k", "new", 3600).unwrap();
        assert_eq!(cache.get("k").unwrap().as_deref(), Some("new"));
    }

    #[test]
    fn test_purge_expired() {
        let cache = store();
        cache.put("fresh", "v", 3600).unwrap();
        cache.put("stale", "v", -1).unwrap();

        let removed = cache.purge_expired().unwrap();
        assert_eq!(removed, 1);
        assert!(cache.get("fresh").unwrap().is_some());
    }

    #[test]
    fn test_clear() {
        let cache = store();
        cache.put("a", "v", 3600).unwrap();
        cache.put("b", "v", 3600).unwrap();
        assert_eq!(cache.clear().unwrap(), 2);
        assert!(cache.get("a").unwrap().is_none());
    }
}
