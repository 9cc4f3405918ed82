//! Redis key-value/hash backend.
//!
//! Residents map onto native Redis types: one hash per resident, one set of
//! live ids, and one counters hash updated with `HINCRBY`.

#[cfg(feature = "redis")]
mod implementation {
    use crate::storage::KeyValueStore;
    use crate::{Error, Result};
    use redis::{Client, Commands, Connection};
    use std::collections::HashMap;

    /// Keys fetched per `SCAN` round-trip.
    const SCAN_COUNT: usize = 500;

    /// Redis-backed store.
    pub struct RedisStore {
        /// Redis client.
        client: Client,
    }

    impl RedisStore {
        /// Creates a new Redis store and verifies the server answers `PING`.
        ///
        /// # Errors
        ///
        /// Returns [`Error::StoreUnavailable`] if the URL is invalid or the
        /// server cannot be reached.
        pub fn new(connection_url: &str) -> Result<Self> {
            let client = Client::open(connection_url).map_err(|e| Error::store("redis_connect", e))?;
            let store = Self { client };

            let mut conn = store.get_connection()?;
            let _: String = redis::cmd("PING")
                .query(&mut conn)
                .map_err(|e| Error::store("redis_ping", e))?;

            Ok(store)
        }

        /// Gets a connection from the client.
        fn get_connection(&self) -> Result<Connection> {
            self.client
                .get_connection()
                .map_err(|e| Error::store("redis_get_connection", e))
        }

        /// Escapes glob metacharacters for `SCAN MATCH`.
        fn escape_pattern(prefix: &str) -> String {
            let mut escaped = String::with_capacity(prefix.len() + 1);
            for c in prefix.chars() {
                if matches!(c, '*' | '?' | '[' | ']' | '\\') {
                    escaped.push('\\');
                }
                escaped.push(c);
            }
            escaped.push('*');
            escaped
        }
    }

    impl KeyValueStore for RedisStore {
        fn hash_set(&self, key: &str, field: &str, value: &str) -> Result<()> {
            let mut conn = self.get_connection()?;
            let _: i64 = conn
                .hset(key, field, value)
                .map_err(|e| Error::store("redis_hset", e))?;
            Ok(())
        }

        fn hash_get_all(&self, key: &str) -> Result<HashMap<String, String>> {
            let mut conn = self.get_connection()?;
            conn.hgetall(key)
                .map_err(|e| Error::store("redis_hgetall", e))
        }

        fn hash_delete(&self, key: &str) -> Result<bool> {
            let mut conn = self.get_connection()?;
            let deleted: i64 = conn.del(key).map_err(|e| Error::store("redis_del", e))?;
            Ok(deleted > 0)
        }

        fn hash_delete_field(&self, key: &str, field: &str) -> Result<bool> {
            let mut conn = self.get_connection()?;
            let deleted: i64 = conn
                .hdel(key, field)
                .map_err(|e| Error::store("redis_hdel", e))?;
            Ok(deleted > 0)
        }

        fn hash_increment_by(&self, key: &str, field: &str, delta: i64) -> Result<i64> {
            let mut conn = self.get_connection()?;
            conn.hincr(key, field, delta)
                .map_err(|e| Error::store("redis_hincrby", e))
        }

        fn set_add(&self, key: &str, member: &str) -> Result<bool> {
            let mut conn = self.get_connection()?;
            let added: i64 = conn
                .sadd(key, member)
                .map_err(|e| Error::store("redis_sadd", e))?;
            Ok(added > 0)
        }

        fn set_remove(&self, key: &str, member: &str) -> Result<bool> {
            let mut conn = self.get_connection()?;
            let removed: i64 = conn
                .srem(key, member)
                .map_err(|e| Error::store("redis_srem", e))?;
            Ok(removed > 0)
        }

        fn set_members(&self, key: &str) -> Result<Vec<String>> {
            let mut conn = self.get_connection()?;
            conn.smembers(key)
                .map_err(|e| Error::store("redis_smembers", e))
        }

        fn set_contains(&self, key: &str, member: &str) -> Result<bool> {
            let mut conn = self.get_connection()?;
            conn.sismember(key, member)
                .map_err(|e| Error::store("redis_sismember", e))
        }

        fn set_cardinality(&self, key: &str) -> Result<usize> {
            let mut conn = self.get_connection()?;
            conn.scard(key).map_err(|e| Error::store("redis_scard", e))
        }

        fn scan_keys(&self, prefix: &str) -> Result<Vec<String>> {
            let mut conn = self.get_connection()?;
            let pattern = Self::escape_pattern(prefix);
            let mut cursor: u64 = 0;
            let mut keys = Vec::new();

            loop {
                let (next, batch): (u64, Vec<String>) = redis::cmd("SCAN")
                    .arg(cursor)
                    .arg("MATCH")
                    .arg(&pattern)
                    .arg("COUNT")
                    .arg(SCAN_COUNT)
                    .query(&mut conn)
                    .map_err(|e| Error::store("redis_scan", e))?;
                keys.extend(batch);
                if next == 0 {
                    break;
                }
                cursor = next;
            }

            // SCAN may repeat keys across iterations.
            keys.sort();
            keys.dedup();
            Ok(keys)
        }
    }

}

#[cfg(feature = "redis")]
pub use implementation::RedisStore;

#[cfg(not(feature = "redis"))]
mod stub {
    use crate::storage::KeyValueStore;
    use crate::{Error, Result};
    use std::collections::HashMap;

    /// Stub Redis store when feature is not enabled.
    pub struct RedisStore;

    impl RedisStore {
        /// Creates a new Redis store (stub).
        ///
        /// # Errors
        ///
        /// Always returns an error because the feature is not enabled.
        pub fn new(_connection_url: &str) -> Result<Self> {
            Err(Error::FeatureNotEnabled("redis".to_string()))
        }
    }

    fn disabled<T>() -> Result<T> {
        Err(Error::FeatureNotEnabled("redis".to_string()))
    }

    impl KeyValueStore for RedisStore {
        fn hash_set(&self, _key: &str, _field: &str, _value: &str) -> Result<()> {
            disabled()
        }

        fn hash_get_all(&self, _key: &str) -> Result<HashMap<String, String>> {
            disabled()
        }

        fn hash_delete(&self, _key: &str) -> Result<bool> {
            disabled()
        }

        fn hash_delete_field(&self, _key: &str, _field: &str) -> Result<bool> {
            disabled()
        }

        fn hash_increment_by(&self, _key: &str, _field: &str, _delta: i64) -> Result<i64> {
            disabled()
        }

        fn set_add(&self, _key: &str, _member: &str) -> Result<bool> {
            disabled()
        }

        fn set_remove(&self, _key: &str, _member: &str) -> Result<bool> {
            disabled()
        }

        fn set_members(&self, _key: &str) -> Result<Vec<String>> {
            disabled()
        }

        fn set_contains(&self, _key: &str, _member: &str) -> Result<bool> {
            disabled()
        }

        fn set_cardinality(&self, _key: &str) -> Result<usize> {
            disabled()
        }

        fn scan_keys(&self, _prefix: &str) -> Result<Vec<String>> {
            disabled()
        }
    }
}

#[cfg(not(feature = "redis"))]
pub use stub::RedisStore;
