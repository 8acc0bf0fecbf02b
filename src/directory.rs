// Copyright 2022 MaidSafe.net limited.
//
// This SAFE Network Software is licensed to you under The General Public License (GPL), version 3.
// Unless required by applicable law or agreed to in writing, the SAFE Network Software distributed
// under the GPL Licence is distributed on an "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY
// KIND, either express or implied. Please review the Licences for the specific language governing
// permissions and limitations relating to use of the SAFE Network Software.

use crate::{
    cache::{CacheStore, EraCache, EraCacheEntry},
    network::NetworkId,
    provider::{ChainStateProvider, Identity, ProviderError, SuperIdentity},
    types::{Address, EraIndex, Validator},
    EngineConfig, Error, Result,
};

use serde::{Deserialize, Serialize};
use std::{
    collections::{BTreeMap, BTreeSet},
    future::Future,
};

/// Fixed-point commission units making up one percent (parts per billion).
pub const PERBILL_PER_PERCENT: f64 = 10_000_000.0;

/// Validators per rank segment.
const RANK_SEGMENT_SIZE: usize = 100;

/// Characters kept on each side of a truncated address.
const TRUNCATED_ADDRESS_SIDE: usize = 8;

/// Converts an on-chain parts-per-billion commission into a percentage.
pub fn perbill_to_percent(perbill: u32) -> f64 {
    f64::from(perbill) / PERBILL_PER_PERCENT
}

/// `first 8 chars + "..." + last 8 chars`, or the address itself when it is too short to
/// shorten.
pub fn truncate_address(address: &str) -> String {
    let chars: Vec<char> = address.chars().collect();
    if chars.len() <= 2 * TRUNCATED_ADDRESS_SIDE + 3 {
        return address.to_string();
    }
    let head: String = chars[..TRUNCATED_ADDRESS_SIDE].iter().collect();
    let tail: String = chars[chars.len() - TRUNCATED_ADDRESS_SIDE..].iter().collect();
    format!("{head}...{tail}")
}

/// The validator set of one network at one era.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Directory {
    pub network: NetworkId,
    pub era: EraIndex,
    /// Validators in provider order; `rank` is the 1-based position.
    pub validators: Vec<Validator>,
    /// Mean commission over all validators, 0 for an empty set.
    pub average_commission: f64,
    /// Size of the active set, as found by [`detect_active_set`].
    pub active_count: u32,
}

impl Directory {
    fn from_entry(network: NetworkId, era: EraIndex, entry: EraCacheEntry) -> Self {
        Self {
            network,
            era,
            validators: entry.validators,
            average_commission: entry.average_commission,
            active_count: entry.active_count,
        }
    }

    fn to_entry(&self) -> EraCacheEntry {
        EraCacheEntry {
            validators: self.validators.clone(),
            average_commission: self.average_commission,
            active_count: self.active_count,
        }
    }

    /// Looks up a validator by address.
    pub fn get(&self, address: &str) -> Option<&Validator> {
        self.validators.iter().find(|v| v.address == address)
    }

    /// Rank of a validator.
    pub fn rank(&self, address: &str) -> Option<usize> {
        self.get(address).map(|v| v.rank)
    }

    /// Which block of 100 ranks a validator falls in, 1-based. 0 when unknown.
    pub fn rank_segment(&self, address: &str) -> usize {
        self.rank(address)
            .map(|rank| (rank + RANK_SEGMENT_SIZE - 1) / RANK_SEGMENT_SIZE)
            .unwrap_or(0)
    }

    /// Average commission rounded to one decimal place, for display.
    pub fn display_average_commission(&self) -> f64 {
        (self.average_commission * 10.0).round() / 10.0
    }

    /// Number of validators flagged active.
    pub fn active_validators(&self) -> usize {
        self.validators.iter().filter(|v| v.active).count()
    }
}

/// Where the size of the active set can come from, in order of preference.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ActiveSetSource {
    /// The session's validator list, which also tells who is active.
    SessionValidators,
    /// The number of registered staking validators.
    StakingEntries,
    /// The configured ceiling.
    Ceiling,
}

/// Detection order, run once per directory build.
pub const ACTIVE_SET_SOURCES: [ActiveSetSource; 3] = [
    ActiveSetSource::SessionValidators,
    ActiveSetSource::StakingEntries,
    ActiveSetSource::Ceiling,
];

/// What a source told us about the active set.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ActiveSet {
    /// The exact members.
    Members(BTreeSet<Address>),
    /// Only the size.
    Count(u32),
}

impl ActiveSet {
    /// Number of active validators.
    pub fn count(&self) -> u32 {
        match self {
            Self::Members(members) => members.len() as u32,
            Self::Count(count) => *count,
        }
    }

    /// Whether `address` is active. Without a member list everyone is assumed active.
    pub fn contains(&self, address: &str) -> bool {
        match self {
            Self::Members(members) => members.contains(address),
            Self::Count(_) => true,
        }
    }
}

impl ActiveSetSource {
    async fn read<P>(
        self,
        provider: &P,
        staking_entries: usize,
        config: &EngineConfig,
    ) -> Option<ActiveSet>
    where
        P: ChainStateProvider + ?Sized,
    {
        match self {
            Self::SessionValidators => match provider.session_validators().await {
                Ok(members) if !members.is_empty() => {
                    Some(ActiveSet::Members(members.into_iter().collect()))
                }
                Ok(_) => None,
                Err(error) => {
                    debug!("Session validators unavailable: {error}");
                    None
                }
            },
            Self::StakingEntries if staking_entries > 0 => {
                Some(ActiveSet::Count(staking_entries as u32))
            }
            Self::StakingEntries => None,
            Self::Ceiling => Some(ActiveSet::Count(config.max_validators_ceiling)),
        }
    }
}

/// Walks [`ACTIVE_SET_SOURCES`] and returns the first answer.
pub async fn detect_active_set<P>(
    provider: &P,
    staking_entries: usize,
    config: &EngineConfig,
) -> (ActiveSetSource, ActiveSet)
where
    P: ChainStateProvider + ?Sized,
{
    for source in ACTIVE_SET_SOURCES {
        if let Some(set) = source.read(provider, staking_entries, config).await {
            trace!("Active set of {} found via {source:?}", set.count());
            return (source, set);
        }
    }
    (
        ActiveSetSource::Ceiling,
        ActiveSet::Count(config.max_validators_ceiling),
    )
}

/// Fetches an optional table, treating any failure as "not on this chain".
async fn optional_table<T, F>(table: &str, query: F) -> BTreeMap<Address, T>
where
    F: Future<Output = Result<BTreeMap<Address, T>, ProviderError>>,
{
    match query.await {
        Ok(entries) => entries,
        Err(ProviderError::Unsupported(surface)) => {
            debug!("{table} not available on this network ({surface}), skipping");
            BTreeMap::new()
        }
        Err(error) => {
            warn!("Failed to fetch {table}, continuing without it: {error}");
            BTreeMap::new()
        }
    }
}

fn display_of(identity: Option<&Identity>) -> Option<&str> {
    identity
        .and_then(|identity| identity.display.as_deref())
        .filter(|display| !display.trim().is_empty())
}

/// Own display name, else the parent's, else a truncated address.
pub fn resolve_identity(
    address: &str,
    identities: &BTreeMap<Address, Identity>,
    supers: &BTreeMap<Address, SuperIdentity>,
) -> String {
    if let Some(display) = display_of(identities.get(address)) {
        return display.to_string();
    }

    if let Some(link) = supers.get(address) {
        let parent_display = link
            .display
            .as_deref()
            .filter(|display| !display.trim().is_empty())
            .or_else(|| display_of(identities.get(&link.parent)));
        if let Some(display) = parent_display {
            return display.to_string();
        }
    }

    truncate_address(address)
}

/// Builds validator directories, consulting the era cache first.
#[derive(Clone, Debug)]
pub struct ValidatorDirectory<S> {
    cache: EraCache<S>,
    config: EngineConfig,
}

impl<S: CacheStore> ValidatorDirectory<S> {
    /// A directory builder backed by `cache`.
    pub fn new(cache: EraCache<S>, config: EngineConfig) -> Self {
        Self { cache, config }
    }

    /// The cache in use.
    pub fn cache(&self) -> &EraCache<S> {
        &self.cache
    }

    /// The directory for `(network, era)`.
    ///
    /// A cached snapshot is returned verbatim without touching the provider. Otherwise the
    /// validator set is fetched (failure is [`Error::DirectoryFetchFailed`]), enriched with
    /// whatever identity data the chain has, and cached.
    #[instrument(skip(self, provider), level = "debug")]
    pub async fn get_directory<P>(
        &self,
        network: NetworkId,
        era: EraIndex,
        provider: &P,
    ) -> Result<Directory>
    where
        P: ChainStateProvider + ?Sized,
    {
        if let Some(entry) = self.cache.get(network, era).await {
            debug!("Using cached validator directory for {network} era {era}");
            return Ok(Directory::from_entry(network, era, entry));
        }

        let entries = provider
            .validators()
            .await
            .map_err(Error::DirectoryFetchFailed)?;

        let identities = optional_table("identities", provider.identities()).await;
        let supers = optional_table("super identities", provider.super_identities()).await;
        let (source, active_set) = detect_active_set(provider, entries.len(), &self.config).await;

        let validators: Vec<Validator> = entries
            .into_iter()
            .enumerate()
            .map(|(i, (address, prefs))| Validator {
                identity: resolve_identity(&address, &identities, &supers),
                commission: perbill_to_percent(prefs.commission),
                active: active_set.contains(&address),
                blocked: prefs.blocked,
                rank: i + 1,
                address,
            })
            .collect();

        let average_commission = if validators.is_empty() {
            0.0
        } else {
            validators.iter().map(|v| v.commission).sum::<f64>() / validators.len() as f64
        };

        let directory = Directory {
            network,
            era,
            validators,
            average_commission,
            active_count: active_set.count(),
        };

        info!(
            "Fetched {} validators for {network} era {era}, average commission {:.2}%, {} active via {source:?}",
            directory.validators.len(),
            directory.average_commission,
            directory.active_count,
        );

        if let Err(error) = self.cache.put(network, era, &directory.to_entry()).await {
            warn!("Could not cache validator directory for {network} era {era}: {error}");
        }

        Ok(directory)
    }
}
