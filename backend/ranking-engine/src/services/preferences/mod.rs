//! Read-through preference lookup owned by the caller.
//!
//! The ranking pipeline never fetches anything itself. Services that rank on
//! behalf of a user resolve the user's preference here first and pass it in
//! through `RankingContext`. "None found" is a neutral answer, not an error.

use crate::config::EngineConfig;
use crate::models::UserPreference;
use crate::services::ranking::{RankingError, Result};
use async_trait::async_trait;
use dashmap::DashMap;
use tracing::{debug, warn};

/// Injected cache: `get(key) -> Option<value>`, `put(key, value)`.
pub trait PreferenceCache: Send + Sync {
    fn get(&self, key: &str) -> Option<UserPreference>;
    fn put(&self, key: &str, value: UserPreference);
}

/// Backing store keyed by user id.
#[async_trait]
pub trait PreferenceStore: Send + Sync {
    async fn find_by_user_id(&self, user_id: i64) -> anyhow::Result<Option<UserPreference>>;
}

/// Concurrent in-process cache with a hard entry bound.
pub struct InMemoryPreferenceCache {
    entries: DashMap<String, UserPreference>,
    capacity: usize,
}

impl InMemoryPreferenceCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: DashMap::new(),
            capacity,
        }
    }

    /// Sized by `RANKING_PREFERENCE_CACHE_CAPACITY`.
    pub fn from_config(config: &EngineConfig) -> Self {
        Self::new(config.preference_cache_capacity)
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl PreferenceCache for InMemoryPreferenceCache {
    fn get(&self, key: &str) -> Option<UserPreference> {
        self.entries.get(key).map(|entry| entry.value().clone())
    }

    fn put(&self, key: &str, value: UserPreference) {
        // Overwrites are always allowed; new keys only while below capacity
        if self.entries.len() >= self.capacity && !self.entries.contains_key(key) {
            debug!(key = key, capacity = self.capacity, "Preference cache full, skipping put");
            return;
        }
        self.entries.insert(key.to_string(), value);
    }
}

pub struct PreferenceResolver<S, C> {
    store: S,
    cache: C,
}

impl<S, C> PreferenceResolver<S, C>
where
    S: PreferenceStore,
    C: PreferenceCache,
{
    pub fn new(store: S, cache: C) -> Self {
        Self { store, cache }
    }

    pub fn cache(&self) -> &C {
        &self.cache
    }

    /// Cache hit, else store lookup. Found values are cached; absence is not.
    pub async fn resolve(&self, user_id: i64) -> Result<Option<UserPreference>> {
        let key = cache_key(user_id);

        if let Some(preference) = self.cache.get(&key) {
            debug!(user_id = user_id, "Preference cache hit");
            return Ok(Some(preference));
        }

        let found = self.store.find_by_user_id(user_id).await.map_err(|e| {
            warn!(user_id = user_id, error = %e, "Preference store lookup failed");
            RankingError::PreferenceStore(e.to_string())
        })?;

        match found {
            Some(preference) => {
                self.cache.put(&key, preference.clone());
                Ok(Some(preference))
            }
            None => {
                debug!(user_id = user_id, "No stored preference, using neutral default");
                Ok(None)
            }
        }
    }
}

fn cache_key(user_id: i64) -> String {
    format!("user_preference:{}", user_id)
}
