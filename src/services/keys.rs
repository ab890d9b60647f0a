use std::sync::Arc;

use anyhow::Result;

use crate::config;

use super::storage::Storage;

/// Access to the stored provider API key. Writes go to durable storage
/// immediately; reads always consult storage so a key set elsewhere is
/// picked up without restarting.
#[derive(Clone)]
pub struct ApiKeyStore {
    storage: Arc<dyn Storage>,
}

impl ApiKeyStore {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self { storage }
    }

    pub fn set(&self, key: &str) -> Result<()> {
        self.storage.set(config::KEY_API_KEY, key)
    }

    pub fn get(&self) -> Option<String> {
        match self.storage.get(config::KEY_API_KEY) {
            Ok(key) => key.filter(|k| !k.is_empty()),
            Err(e) => {
                tracing::error!("Failed to read API key from storage: {}", e);
                None
            }
        }
    }

    pub fn has_key(&self) -> bool {
        self.get().is_some()
    }

    pub fn clear(&self) -> Result<()> {
        self.storage.remove(config::KEY_API_KEY)
    }
}
