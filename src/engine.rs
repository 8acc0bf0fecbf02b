// Copyright 2022 MaidSafe.net limited.
//
// This SAFE Network Software is licensed to you under The General Public License (GPL), version 3.
// Unless required by applicable law or agreed to in writing, the SAFE Network Software distributed
// under the GPL Licence is distributed on an "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY
// KIND, either express or implied. Please review the Licences for the specific language governing
// permissions and limitations relating to use of the SAFE Network Software.

use crate::{
    advisory::{self, Advisory},
    batch::{BatchLoader, BatchSnapshot},
    cache::{CacheStore, EraCache, MemoryStore, SledStore},
    delegation::{self, DelegationStatus},
    directory::{Directory, ValidatorDirectory},
    era::resolve_current_era,
    network::NetworkId,
    provider::ChainStateProvider,
    statistics::compute_statistics,
    summary::{self, Summary},
    types::{EraIndex, Validator, ValidatorStatistics},
    EngineConfig, Error, Result,
};

use std::{fmt, sync::Arc};

/// Entry point for consumers: one provider, one network, one cache.
pub struct ValidatorEngine<P: ?Sized, S> {
    provider: Arc<P>,
    directory: ValidatorDirectory<S>,
    config: EngineConfig,
    network: NetworkId,
}

impl<P: ?Sized, S: fmt::Debug> fmt::Debug for ValidatorEngine<P, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ValidatorEngine")
            .field("network", &self.network)
            .field("config", &self.config)
            .field("directory", &self.directory)
            .finish_non_exhaustive()
    }
}

impl<P> ValidatorEngine<P, MemoryStore>
where
    P: ChainStateProvider + ?Sized,
{
    /// An engine whose era cache lives as long as it does.
    pub fn in_memory(provider: Arc<P>, config: EngineConfig, network: NetworkId) -> Result<Self> {
        Self::new(provider, EraCache::new(MemoryStore::new()), config, network)
    }
}

impl<P> ValidatorEngine<P, SledStore>
where
    P: ChainStateProvider + ?Sized,
{
    /// An engine caching directories under the configured `cache_dir`.
    pub fn persistent(provider: Arc<P>, config: EngineConfig, network: NetworkId) -> Result<Self> {
        let dir = config
            .cache_dir
            .clone()
            .ok_or_else(|| Error::Configuration("cache_dir is not set".to_string()))?;
        let store = SledStore::open(&dir)?;
        Self::new(provider, EraCache::new(store), config, network)
    }
}

impl<P, S> ValidatorEngine<P, S>
where
    P: ChainStateProvider + ?Sized,
    S: CacheStore,
{
    pub fn new(
        provider: Arc<P>,
        cache: EraCache<S>,
        config: EngineConfig,
        network: NetworkId,
    ) -> Result<Self> {
        config.validate()?;
        debug!("Validator engine for {network} created");
        Ok(Self {
            provider,
            directory: ValidatorDirectory::new(cache, config.clone()),
            config,
            network,
        })
    }

    pub fn network(&self) -> NetworkId {
        self.network
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn provider(&self) -> &Arc<P> {
        &self.provider
    }

    /// See [`resolve_current_era`].
    pub async fn current_era(&self) -> Result<EraIndex> {
        resolve_current_era(self.provider.as_ref(), &self.config).await
    }

    /// The directory for the current era. Nothing is fetched if the era cannot be resolved.
    pub async fn directory(&self) -> Result<Directory> {
        let era = self.current_era().await?;
        self.directory_for_era(era).await
    }

    /// The directory for a known era.
    pub async fn directory_for_era(&self, era: EraIndex) -> Result<Directory> {
        self.directory
            .get_directory(self.network, era, self.provider.as_ref())
            .await
    }

    /// A fresh loader for `era` on this engine's network.
    pub fn batch_loader(&self, era: EraIndex) -> BatchLoader<P> {
        BatchLoader::new(self.provider.clone(), self.config.clone(), self.network, era)
    }

    /// Statistics for a single validator, outside any batch.
    pub async fn statistics(&self, validator: &Validator, era: EraIndex) -> ValidatorStatistics {
        compute_statistics(validator, self.provider.as_ref(), era, &self.config).await
    }

    pub fn classify(&self, stats: &ValidatorStatistics) -> Vec<Advisory> {
        advisory::classify(stats)
    }

    pub async fn verify_delegation(
        &self,
        nominator: &str,
        validator: &str,
    ) -> Result<DelegationStatus> {
        delegation::verify_delegation(self.provider.as_ref(), nominator, validator).await
    }

    /// Summary of a directory and whatever a loader has computed for it so far.
    pub fn summarize(&self, directory: &Directory, snapshot: &BatchSnapshot) -> Summary {
        summary::summarize(&directory.validators, &snapshot.results)
    }
}
