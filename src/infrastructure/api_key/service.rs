//! API Key service
//!
//! Owns the key collection: issuing, validating, updating and deleting keys,
//! and writing the collection back to its snapshot store after every change.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::{Mutex, RwLock};
use tracing::{debug, error, info, warn};

use crate::domain::api_key::{
    is_well_formed_secret, validate_api_key_name, ApiKey, ApiKeyId, ApiKeySnapshot, ApiKeyStore,
    ApiKeySummary, ApiKeyUpdate,
};
use crate::domain::{DomainError, Metadata};

use super::generator::{constant_time_compare, ApiKeyGenerator};

/// Fresh secrets drawn before a collision is reported to the caller
const MAX_GENERATION_ATTEMPTS: usize = 5;

/// Result of issuing a new API key
#[derive(Debug)]
pub struct IssuedApiKey {
    /// The API key entity (without the secret)
    pub api_key: ApiKey,
    /// The full secret key (only returned once)
    pub secret: String,
}

/// API Key service for managing API keys
#[derive(Debug)]
pub struct ApiKeyService {
    keys: RwLock<HashMap<String, ApiKey>>,
    store: Arc<ApiKeyStore>,
    generator: ApiKeyGenerator,
    /// Bumped under the write lock each time a snapshot is taken
    version: AtomicU64,
    /// Newest snapshot version handed to the store
    persisted: Mutex<u64>,
}

impl ApiKeyService {
    /// Create an empty API key service
    pub fn new(store: Arc<ApiKeyStore>) -> Self {
        Self {
            keys: RwLock::new(HashMap::new()),
            store,
            generator: ApiKeyGenerator::default(),
            version: AtomicU64::new(0),
            persisted: Mutex::new(0),
        }
    }

    /// Create a service and load whatever the store holds
    pub async fn open(store: Arc<ApiKeyStore>) -> Self {
        let service = Self::new(store);
        service.reload().await;
        service
    }

    /// Replace the in-memory keys with the stored collection
    ///
    /// An unreadable or corrupt store is logged and treated as empty.
    pub async fn reload(&self) -> usize {
        let loaded = match self.store.load().await {
            Ok(snapshot) => snapshot.unwrap_or_default(),
            Err(e) => {
                error!(
                    error = %e,
                    location = %self.store.location(),
                    "Failed to load API keys; starting with an empty key set"
                );
                ApiKeySnapshot::new()
            }
        };

        let mut keys = self.keys.write().await;
        *keys = loaded
            .into_values()
            .map(|key| (key.id().to_string(), key))
            .collect();

        info!(count = keys.len(), "Loaded API keys");
        keys.len()
    }

    /// Issue a new API key
    ///
    /// Returns the stored key and the plaintext secret. The secret is not
    /// recoverable afterwards.
    pub async fn issue(
        &self,
        name: impl Into<String>,
        hourly_limit: u32,
        metadata: Metadata,
    ) -> Result<IssuedApiKey, DomainError> {
        let name = name.into();
        validate_api_key_name(&name).map_err(|e| DomainError::validation(e.to_string()))?;

        for attempt in 1..=MAX_GENERATION_ATTEMPTS {
            let generated = self.generator.generate();
            let key_id = ApiKeyId::new(self.generator.generate_id())
                .map_err(|e| DomainError::internal(e.to_string()))?;

            let api_key = ApiKey::new(key_id, &name, &generated.hash)
                .with_hourly_limit(hourly_limit)
                .with_metadata(metadata.clone());

            let (snapshot, version) = {
                let mut keys = self.keys.write().await;

                match insert_unique(&mut keys, api_key.clone()) {
                    Ok(()) => self.snapshot(&keys),
                    Err(e) if e.is_collision() => {
                        warn!(attempt, "Generated API key collided with an existing key; retrying");
                        continue;
                    }
                    Err(e) => return Err(e),
                }
            };

            self.persist(snapshot, version).await;

            info!(key_id = %api_key.id(), name = %name, hourly_limit, "API key issued");

            return Ok(IssuedApiKey {
                api_key,
                secret: generated.secret,
            });
        }

        Err(DomainError::generation_collision(MAX_GENERATION_ATTEMPTS))
    }

    /// Resolve a plaintext secret to its active key
    ///
    /// Returns `None` for malformed input, unknown secrets and disabled keys.
    /// A successful match stamps `last_used_at`.
    pub async fn validate(&self, secret: &str) -> Option<ApiKey> {
        if !is_well_formed_secret(secret) {
            debug!("Rejecting malformed API key");
            return None;
        }

        let hash = ApiKeyGenerator::hash_key(secret);

        let key_id = {
            let keys = self.keys.read().await;
            keys.values()
                .find(|k| k.is_active() && constant_time_compare(&hash, k.secret_hash()))
                .map(|k| k.id().to_string())
        };

        let Some(key_id) = key_id else {
            debug!("No active API key matches the presented secret");
            return None;
        };

        // Re-check under the write lock: the key may have been disabled or
        // deleted since the scan.
        let (validated, snapshot, version) = {
            let mut keys = self.keys.write().await;
            let key = keys
                .get_mut(&key_id)
                .filter(|k| k.is_active() && constant_time_compare(&hash, k.secret_hash()))?;

            key.record_usage();
            let validated = key.clone();
            let (snapshot, version) = self.snapshot(&keys);
            (validated, snapshot, version)
        };

        self.persist(snapshot, version).await;

        debug!(key_id = %key_id, "API key validated");
        Some(validated)
    }

    /// Get an API key by ID
    pub async fn get(&self, key_id: &str) -> Option<ApiKey> {
        self.keys.read().await.get(key_id).cloned()
    }

    /// List all keys, oldest first, without their hashes
    pub async fn list(&self) -> Vec<ApiKeySummary> {
        let keys = self.keys.read().await;

        let mut listed: Vec<&ApiKey> = keys.values().collect();
        listed.sort_by(|a, b| {
            a.created_at()
                .cmp(&b.created_at())
                .then_with(|| a.id().cmp(b.id()))
        });

        listed.into_iter().map(ApiKey::summary).collect()
    }

    /// Count all keys
    pub async fn count(&self) -> usize {
        self.keys.read().await.len()
    }

    /// Count active keys
    pub async fn count_active(&self) -> usize {
        self.keys.read().await.values().filter(|k| k.is_active()).count()
    }

    /// Partially update a key; `false` if the key is unknown or the update
    /// is invalid
    pub async fn update(&self, key_id: &str, update: ApiKeyUpdate) -> bool {
        match self.try_update(key_id, &update).await {
            Ok(_) => true,
            Err(e) => {
                debug!(key_id = %key_id, error = %e, "API key update rejected");
                false
            }
        }
    }

    /// Partially update a key, reporting why it failed
    pub async fn try_update(
        &self,
        key_id: &str,
        update: &ApiKeyUpdate,
    ) -> Result<ApiKey, DomainError> {
        if let Some(name) = &update.name {
            validate_api_key_name(name).map_err(|e| DomainError::validation(e.to_string()))?;
        }

        let (updated, pending) = {
            let mut keys = self.keys.write().await;
            let key = keys
                .get_mut(key_id)
                .ok_or_else(|| DomainError::not_found(format!("API key '{}' not found", key_id)))?;

            let changed = key.apply(update);
            let updated = key.clone();
            let pending = changed.then(|| self.snapshot(&keys));
            (updated, pending)
        };

        if let Some((snapshot, version)) = pending {
            self.persist(snapshot, version).await;
            info!(
                key_id = %key_id,
                name = %updated.name(),
                hourly_limit = updated.hourly_limit(),
                status = %updated.status(),
                "API key updated"
            );
        }

        Ok(updated)
    }

    /// Delete a key; `false` if the key is unknown
    pub async fn delete(&self, key_id: &str) -> bool {
        self.try_delete(key_id).await.is_ok()
    }

    /// Delete a key, returning the removed entity
    pub async fn try_delete(&self, key_id: &str) -> Result<ApiKey, DomainError> {
        let (removed, snapshot, version) = {
            let mut keys = self.keys.write().await;
            let removed = keys
                .remove(key_id)
                .ok_or_else(|| DomainError::not_found(format!("API key '{}' not found", key_id)))?;
            let (snapshot, version) = self.snapshot(&keys);
            (removed, snapshot, version)
        };

        self.persist(snapshot, version).await;

        info!(key_id = %key_id, "API key deleted");
        Ok(removed)
    }

    /// Copy the collection for persistence; call with the write lock held
    fn snapshot(&self, keys: &HashMap<String, ApiKey>) -> (ApiKeySnapshot, u64) {
        let version = self.version.fetch_add(1, Ordering::SeqCst) + 1;
        let snapshot = keys
            .iter()
            .map(|(id, key)| (id.clone(), key.clone()))
            .collect();

        (snapshot, version)
    }

    /// Write a snapshot unless a newer one has already been handed over
    ///
    /// Failures are logged; the in-memory state stays authoritative.
    async fn persist(&self, snapshot: ApiKeySnapshot, version: u64) {
        let mut persisted = self.persisted.lock().await;

        if *persisted >= version {
            debug!(version, newest = *persisted, "Skipping superseded key snapshot");
            return;
        }

        *persisted = version;

        if let Err(e) = self.store.save(&snapshot).await {
            error!(
                error = %e,
                location = %self.store.location(),
                "Failed to persist API keys; in-memory state remains authoritative"
            );
        }
    }
}

/// Insert a freshly generated key unless its ID or hash is already taken
fn insert_unique(keys: &mut HashMap<String, ApiKey>, api_key: ApiKey) -> Result<(), DomainError> {
    let id = api_key.id().to_string();

    if keys.contains_key(&id)
        || keys
            .values()
            .any(|k| constant_time_compare(k.secret_hash(), api_key.secret_hash()))
    {
        return Err(DomainError::generation_collision(1));
    }

    keys.insert(id, api_key);
    Ok(())
}
