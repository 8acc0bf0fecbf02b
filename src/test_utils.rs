// Copyright 2022 MaidSafe.net limited.
//
// This SAFE Network Software is licensed to you under The General Public License (GPL), version 3.
// Unless required by applicable law or agreed to in writing, the SAFE Network Software distributed
// under the GPL Licence is distributed on an "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY
// KIND, either express or implied. Please review the Licences for the specific language governing
// permissions and limitations relating to use of the SAFE Network Software.

//! An in-memory, scripted [`ChainStateProvider`] for tests.

use crate::{
    provider::{
        ChainStateProvider, EraRewardPoints, Identity, Nomination, ProviderError, StakingLedger,
        SuperIdentity, ValidatorPrefs,
    },
    types::{Address, Balance, EraIndex, EraPointSample},
};

use async_trait::async_trait;
use dashmap::DashMap;
use std::{
    collections::{BTreeMap, BTreeSet},
    sync::{Mutex, Once},
    time::Duration,
};

/// Seconds between two eras in generated sample timestamps.
const ERA_DURATION_SECS: u64 = 24 * 60 * 60;

static INIT: Once = Once::new();

/// Initialise logger for tests, this is run only once, even if called multiple times.
pub fn init_test_logger() {
    INIT.call_once(|| {
        tracing_subscriber::fmt::fmt()
            .with_thread_names(true)
            .with_ansi(false)
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_target(false)
            .try_init()
            .unwrap_or_else(|_| println!("Error initializing logger"));
    });
}

/// A deterministic test address. Long enough to be truncated in display names.
pub fn test_address(index: usize) -> Address {
    format!("1{index:0>7}ValidatorStashAccount{index:0>8}")
}

#[derive(Debug, Default)]
struct State {
    era: Option<EraIndex>,
    era_failures: usize,
    directory_fails: bool,
    validators: Vec<(Address, ValidatorPrefs)>,
    identities: Option<BTreeMap<Address, Identity>>,
    supers: Option<BTreeMap<Address, SuperIdentity>>,
    session: Option<Vec<Address>>,
    ledgers: BTreeMap<Address, StakingLedger>,
    nominations: Option<Vec<Nomination>>,
    histories: BTreeMap<Address, Vec<u32>>,
    failing_histories: BTreeSet<Address>,
    slow_histories: BTreeMap<Address, Duration>,
    slow_staking: Option<Duration>,
    hanging_era: bool,
    reward_table: bool,
    max_nominators_rewarded: Option<u32>,
}

/// Scripted chain state with per-query call counters.
///
/// Optional tables start out unsupported and become available once something is put in them.
#[derive(Debug, Default)]
pub struct MockProvider {
    state: Mutex<State>,
    calls: DashMap<&'static str, usize>,
}

impl MockProvider {
    /// An empty chain that reports no era.
    pub fn new() -> Self {
        Self::default()
    }

    fn update(self, f: impl FnOnce(&mut State)) -> Self {
        if let Ok(mut state) = self.state.lock() {
            f(&mut state);
        }
        self
    }

    fn read<T>(&self, f: impl FnOnce(&State) -> T) -> Result<T, ProviderError> {
        self.state
            .lock()
            .map(|state| f(&state))
            .map_err(|_| ProviderError::Query("mock state poisoned".to_string()))
    }

    fn record(&self, query: &'static str) {
        *self.calls.entry(query).or_default() += 1;
    }

    /// Number of times `query` was issued.
    pub fn calls(&self, query: &str) -> usize {
        self.calls.get(query).map(|count| *count).unwrap_or(0)
    }

    /// Total number of queries issued.
    pub fn total_calls(&self) -> usize {
        self.calls.iter().map(|entry| *entry.value()).sum()
    }

    /// Sets the era reported by the chain.
    pub fn with_era(self, era: EraIndex) -> Self {
        self.update(|s| s.era = Some(era))
    }

    /// The next `count` era queries fail before the era becomes visible.
    pub fn with_era_failures(self, count: usize) -> Self {
        self.update(|s| s.era_failures = count)
    }

    /// Makes the validator set query fail.
    pub fn with_failing_directory(self) -> Self {
        self.update(|s| s.directory_fails = true)
    }

    /// Registers a validator with a commission given in parts per billion.
    pub fn with_validator(self, address: &str, commission_perbill: u32, blocked: bool) -> Self {
        self.update(|s| {
            s.validators.push((
                address.to_string(),
                ValidatorPrefs {
                    commission: commission_perbill,
                    blocked,
                },
            ))
        })
    }

    /// Registers a display name, making the identity table available.
    pub fn with_identity(self, address: &str, display: Option<&str>) -> Self {
        self.update(|s| {
            let _ = s.identities.get_or_insert_with(BTreeMap::new).insert(
                address.to_string(),
                Identity {
                    display: display.map(str::to_string),
                },
            );
        })
    }

    /// Registers a parent identity link, making the super identity table available.
    pub fn with_super_identity(self, address: &str, parent: &str, display: Option<&str>) -> Self {
        self.update(|s| {
            let _ = s.supers.get_or_insert_with(BTreeMap::new).insert(
                address.to_string(),
                SuperIdentity {
                    parent: parent.to_string(),
                    display: display.map(str::to_string),
                },
            );
        })
    }

    /// Makes the session validators query available.
    pub fn with_session_validators(self, addresses: &[&str]) -> Self {
        self.update(|s| s.session = Some(addresses.iter().map(|a| a.to_string()).collect()))
    }

    /// Sets the staking ledger of a stash.
    pub fn with_ledger(self, address: &str, total: Balance, active: Balance) -> Self {
        self.update(|s| {
            let _ = s
                .ledgers
                .insert(address.to_string(), StakingLedger { total, active });
        })
    }

    /// Adds a nominator entry, making the nominators table available.
    pub fn with_nomination(self, nominator: &str, targets: &[&str]) -> Self {
        self.update(|s| {
            s.nominations.get_or_insert_with(Vec::new).push(Nomination {
                nominator: nominator.to_string(),
                targets: targets.iter().map(|t| t.to_string()).collect(),
            })
        })
    }

    /// Sets a validator's points, oldest first, ending at the current era.
    pub fn with_history(self, address: &str, points: Vec<u32>) -> Self {
        self.update(|s| {
            let _ = s.histories.insert(address.to_string(), points);
        })
    }

    /// Makes the history query for `address` fail.
    pub fn with_failing_history(self, address: &str) -> Self {
        self.update(|s| {
            let _ = s.failing_histories.insert(address.to_string());
        })
    }

    /// Delays the history query for `address`.
    pub fn with_slow_history(self, address: &str, delay: Duration) -> Self {
        self.update(|s| {
            let _ = s.slow_histories.insert(address.to_string(), delay);
        })
    }

    /// Delays the staking ledger and nominator queries.
    pub fn with_slow_staking(self, delay: Duration) -> Self {
        self.update(|s| s.slow_staking = Some(delay))
    }

    /// The era query never answers.
    pub fn with_hanging_era(self) -> Self {
        self.update(|s| s.hanging_era = true)
    }

    async fn staking_delay(&self) -> Result<(), ProviderError> {
        if let Some(delay) = self.read(|s| s.slow_staking)? {
            tokio::time::sleep(delay).await;
        }
        Ok(())
    }

    /// Makes the aggregate reward points table available, derived from the histories.
    pub fn with_reward_points_table(self) -> Self {
        self.update(|s| s.reward_table = true)
    }

    /// Exposes the per-validator rewarded nominator limit.
    pub fn with_max_nominators_rewarded(self, limit: u32) -> Self {
        self.update(|s| s.max_nominators_rewarded = Some(limit))
    }

    fn samples_for(state: &State, address: &str) -> Vec<EraPointSample> {
        let current = state.era.unwrap_or_default();
        let points = match state.histories.get(address) {
            Some(points) => points,
            None => return Vec::new(),
        };
        let len = points.len() as EraIndex;
        points
            .iter()
            .enumerate()
            .filter_map(|(i, points)| {
                let era = (current + 1 + i as EraIndex).checked_sub(len)?;
                Some(EraPointSample {
                    era,
                    points: *points,
                    timestamp: u64::from(era) * ERA_DURATION_SECS,
                })
            })
            .collect()
    }
}

#[async_trait]
impl ChainStateProvider for MockProvider {
    async fn current_era(&self) -> Result<Option<EraIndex>, ProviderError> {
        self.record("current_era");
        if self.read(|s| s.hanging_era)? {
            futures::future::pending::<()>().await;
        }
        let failing = self.read(|s| s.era_failures > 0)?;
        if failing {
            if let Ok(mut state) = self.state.lock() {
                state.era_failures -= 1;
            }
            return Err(ProviderError::Query("era not reachable".to_string()));
        }
        self.read(|s| s.era)
    }

    async fn validators(&self) -> Result<Vec<(Address, ValidatorPrefs)>, ProviderError> {
        self.record("validators");
        let (fails, validators) = self.read(|s| (s.directory_fails, s.validators.clone()))?;
        if fails {
            return Err(ProviderError::Query("validators unavailable".to_string()));
        }
        Ok(validators)
    }

    async fn identities(&self) -> Result<BTreeMap<Address, Identity>, ProviderError> {
        self.record("identities");
        self.read(|s| s.identities.clone())?
            .ok_or(ProviderError::Unsupported("identity.identityOf"))
    }

    async fn super_identities(&self) -> Result<BTreeMap<Address, SuperIdentity>, ProviderError> {
        self.record("super_identities");
        self.read(|s| s.supers.clone())?
            .ok_or(ProviderError::Unsupported("identity.superOf"))
    }

    async fn session_validators(&self) -> Result<Vec<Address>, ProviderError> {
        self.record("session_validators");
        self.read(|s| s.session.clone())?
            .ok_or(ProviderError::Unsupported("session.validators"))
    }

    async fn staking_ledger(&self, stash: &Address) -> Result<Option<StakingLedger>, ProviderError> {
        self.record("staking_ledger");
        self.staking_delay().await?;
        self.read(|s| s.ledgers.get(stash).copied())
    }

    async fn nominators(&self) -> Result<Vec<Nomination>, ProviderError> {
        self.record("nominators");
        self.staking_delay().await?;
        self.read(|s| s.nominations.clone())?
            .ok_or(ProviderError::Unsupported("staking.nominators"))
    }

    async fn era_points_history(
        &self,
        validator: &Address,
        era: EraIndex,
        depth: u32,
    ) -> Result<Vec<EraPointSample>, ProviderError> {
        self.record("era_points_history");
        let (fails, delay) = self.read(|s| {
            (
                s.failing_histories.contains(validator),
                s.slow_histories.get(validator).copied(),
            )
        })?;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if fails {
            return Err(ProviderError::Query(format!("no history for {validator}")));
        }
        let mut samples = self.read(|s| Self::samples_for(s, validator))?;
        samples.retain(|sample| sample.era <= era);
        let skip = samples.len().saturating_sub(depth as usize);
        Ok(samples.split_off(skip))
    }

    async fn era_reward_points(&self, era: EraIndex) -> Result<EraRewardPoints, ProviderError> {
        self.record("era_reward_points");
        self.read(|s| {
            if !s.reward_table {
                return Err(ProviderError::Unsupported("staking.erasRewardPoints"));
            }
            let mut table = EraRewardPoints::default();
            for address in s.histories.keys() {
                let earned = Self::samples_for(s, address)
                    .into_iter()
                    .find(|sample| sample.era == era)
                    .map(|sample| sample.points)
                    .unwrap_or(0);
                if earned > 0 {
                    table.total += earned;
                    let _ = table.individual.insert(address.clone(), earned);
                }
            }
            Ok(table)
        })?
    }

    async fn max_nominators_rewarded(&self) -> Result<u32, ProviderError> {
        self.record("max_nominators_rewarded");
        self.read(|s| s.max_nominators_rewarded)?
            .ok_or(ProviderError::Unsupported("staking.maxNominatorRewardedPerValidator"))
    }
}
