//! Consent Gate (spec §4.H): `eligible_contacts(user_id, now) -> [Contact]`,
//! cached per-user for a short TTL to damp scanner bursts. The cache is
//! hand-rolled behind a `Mutex<HashMap<_>>` rather than pulling in a caching
//! crate for one TTL map.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use tokio::sync::Mutex;

use crate::db::repository::ContactRepository;
use crate::domain::Contact;
use crate::error::EngineResult;

const DEFAULT_TTL: StdDuration = StdDuration::from_secs(30);

struct CacheEntry {
    contacts: Vec<Contact>,
    cached_at: DateTime<Utc>,
}

pub struct ConsentGate {
    pool: SqlitePool,
    ttl: chrono::Duration,
    cache: Mutex<HashMap<String, CacheEntry>>,
}

impl ConsentGate {
    pub fn new(pool: SqlitePool) -> Arc<Self> {
        Self::with_ttl(pool, DEFAULT_TTL)
    }

    pub fn with_ttl(pool: SqlitePool, ttl: StdDuration) -> Arc<Self> {
        Arc::new(Self {
            pool,
            ttl: chrono::Duration::from_std(ttl).unwrap_or(chrono::Duration::seconds(30)),
            cache: Mutex::new(HashMap::new()),
        })
    }

    /// Approved, unexpired contacts for `user_id`, ordered by priority then
    /// creation time (spec §4.H). Served from cache when the entry is younger
    /// than the TTL relative to `now`.
    pub async fn eligible_contacts(
        &self,
        user_id: &str,
        now: DateTime<Utc>,
    ) -> EngineResult<Vec<Contact>> {
        {
            let cache = self.cache.lock().await;
            if let Some(entry) = cache.get(user_id) {
                if now - entry.cached_at < self.ttl {
                    return Ok(entry.contacts.clone());
                }
            }
        }

        let contacts = ContactRepository::approved_for_user(&self.pool, user_id, now).await?;

        let mut cache = self.cache.lock().await;
        cache.insert(
            user_id.to_string(),
            CacheEntry {
                contacts: contacts.clone(),
                cached_at: now,
            },
        );

        Ok(contacts)
    }

    /// Used by the worker's consent re-check (spec §4.C step 3) when a fresh
    /// read is required regardless of cache age — e.g. after a long render.
    pub async fn invalidate(&self, user_id: &str) {
        self.cache.lock().await.remove(user_id);
    }
}
