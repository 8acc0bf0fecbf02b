// Copyright 2022 MaidSafe.net limited.
//
// This SAFE Network Software is licensed to you under The General Public License (GPL), version 3.
// Unless required by applicable law or agreed to in writing, the SAFE Network Software distributed
// under the GPL Licence is distributed on an "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY
// KIND, either express or implied. Please review the Licences for the specific language governing
// permissions and limitations relating to use of the SAFE Network Software.

//! Per network, per era snapshots of the validator directory.
//!
//! Entries are written once per key and never invalidated: a new era is a new key. Anything
//! that cannot be read back is treated as a miss.

use crate::{
    network::NetworkId,
    types::{EraIndex, Validator},
    Error, Result,
};

use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::{path::Path, sync::Arc};

const TREE_NAME: &str = "era_validators";
const SLED_FLUSH_TIME_MS: Option<u64> = Some(5000);

/// A previously built validator directory.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EraCacheEntry {
    pub validators: Vec<Validator>,
    pub average_commission: f64,
    /// Size of the active set when the directory was built.
    #[serde(default)]
    pub active_count: u32,
}

/// Async key to bytes storage behind the era cache.
///
/// Implementations only need atomic per-key writes; concurrent writers of the same key write
/// the same value.
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// The value stored under `key`, if any.
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Stores `value` under `key`.
    async fn set(&self, key: &str, value: Vec<u8>) -> Result<()>;
}

/// Process-local store.
#[derive(Clone, Debug, Default)]
pub struct MemoryStore {
    entries: Arc<DashMap<String, Vec<u8>>>,
}

impl MemoryStore {
    /// An empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of keys held.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing is stored yet.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl CacheStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.entries.get(key).map(|entry| entry.value().clone()))
    }

    async fn set(&self, key: &str, value: Vec<u8>) -> Result<()> {
        let _prev = self.entries.insert(key.to_string(), value);
        Ok(())
    }
}

/// Disk backed store, surviving restarts.
#[derive(Clone, Debug)]
pub struct SledStore {
    tree: sled::Tree,
}

impl SledStore {
    /// Opens, or creates, the store under `path`.
    pub fn open(path: &Path) -> Result<Self> {
        let db = sled::Config::default()
            .path(path)
            .flush_every_ms(SLED_FLUSH_TIME_MS)
            .open()
            .map_err(|error| {
                trace!("Sled Error: {:?}", error);
                Error::Sled(error)
            })?;
        let tree = db.open_tree(TREE_NAME)?;
        Ok(Self { tree })
    }
}

#[async_trait]
impl CacheStore for SledStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.tree.get(key)?.map(|value| value.to_vec()))
    }

    async fn set(&self, key: &str, value: Vec<u8>) -> Result<()> {
        let _prev = self.tree.insert(key, value)?;
        Ok(())
    }
}

/// Typed access to directory snapshots keyed by `(network, era)`.
#[derive(Clone, Debug)]
pub struct EraCache<S> {
    store: S,
}

impl<S: CacheStore> EraCache<S> {
    /// Wraps `store`.
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// The underlying store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// The storage key for `(network, era)`.
    pub fn key(network: NetworkId, era: EraIndex) -> String {
        format!("validators:{network}:{era}")
    }

    /// Reads the entry for `(network, era)`. Storage and decoding failures are misses.
    pub async fn get(&self, network: NetworkId, era: EraIndex) -> Option<EraCacheEntry> {
        let key = Self::key(network, era);
        let bytes = match self.store.get(&key).await {
            Ok(Some(bytes)) => bytes,
            Ok(None) => {
                trace!("Era cache miss for {key}");
                return None;
            }
            Err(error) => {
                warn!("Era cache read of {key} failed, treating as miss: {error}");
                return None;
            }
        };

        match serde_json::from_slice(&bytes) {
            Ok(entry) => {
                debug!("Era cache hit for {key}");
                Some(entry)
            }
            Err(error) => {
                warn!("Discarding undecodable era cache entry {key}: {error}");
                None
            }
        }
    }

    /// Writes the entry for `(network, era)`.
    pub async fn put(&self, network: NetworkId, era: EraIndex, entry: &EraCacheEntry) -> Result<()> {
        let key = Self::key(network, era);
        let bytes = serde_json::to_vec(entry)?;
        self.store.set(&key, bytes).await?;
        debug!(
            "Cached {} validators for {key}",
            entry.validators.len()
        );
        Ok(())
    }
}
