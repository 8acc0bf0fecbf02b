// Copyright 2022 MaidSafe.net limited.
//
// This SAFE Network Software is licensed to you under The General Public License (GPL), version 3.
// Unless required by applicable law or agreed to in writing, the SAFE Network Software distributed
// under the GPL Licence is distributed on an "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY
// KIND, either express or implied. Please review the Licences for the specific language governing
// permissions and limitations relating to use of the SAFE Network Software.

//! Drives the statistics calculator over the validators a consumer is looking at.
//!
//! Work is split into chunks of `batch_concurrency` validators. A chunk is computed
//! concurrently and merged as a whole before the next one starts, and every merge is published
//! on a watch channel. A run is tagged with its network, era and a generation; retargeting bumps
//! the generation so chunks still in flight for the old target are dropped at merge time.

use crate::{
    network::NetworkId,
    provider::ChainStateProvider,
    statistics::{compute_with_uptime, NominatorTable, UptimeSource, UptimeTable},
    types::{Address, EraIndex, Validator, ValidatorStatistics},
    EngineConfig, Error, Result,
};

use dashmap::{mapref::entry::Entry, DashMap};
use futures::future::join_all;
use std::{
    collections::{BTreeMap, BTreeSet},
    sync::Arc,
};
use tokio::{
    sync::{watch, Mutex, RwLock},
    time::timeout,
};

/// Identifies which run a piece of work belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RunTag {
    pub network: NetworkId,
    pub era: EraIndex,
    pub generation: u64,
}

/// Results published after every merged chunk.
#[derive(Clone, Debug, PartialEq)]
pub struct BatchSnapshot {
    pub network: NetworkId,
    pub era: EraIndex,
    pub results: BTreeMap<Address, ValidatorStatistics>,
}

/// Outcome of one [`BatchLoader::load`] call.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct LoadReport {
    /// Validators queued by this call, i.e. neither settled nor in flight in this run.
    pub queued: usize,
    /// Results merged by this call.
    pub computed: usize,
    /// Validators whose computation failed and will not be retried in this run.
    pub skipped: usize,
    /// Whether the run was retargeted while this call was in flight.
    pub discarded: bool,
}

#[derive(Debug)]
struct RunState {
    tag: RunTag,
    /// Validators with a merged result or a failed computation in this run.
    settled: BTreeSet<Address>,
    results: BTreeMap<Address, ValidatorStatistics>,
}

impl RunState {
    fn snapshot(&self) -> BatchSnapshot {
        BatchSnapshot {
            network: self.tag.network,
            era: self.tag.era,
            results: self.results.clone(),
        }
    }
}

#[derive(Debug)]
enum SharedUptime {
    Table(UptimeTable),
    Unavailable,
}

impl SharedUptime {
    fn source(&self) -> UptimeSource<'_> {
        match self {
            Self::Table(table) => UptimeSource::Table(table),
            Self::Unavailable => UptimeSource::Unavailable,
        }
    }
}

/// Tables read once per run and shared by all of its computations.
#[derive(Debug)]
struct RunTables {
    uptime: SharedUptime,
    nominators: NominatorTable,
}

/// Addresses a `load` call has queued but not merged yet. Whatever is left when the call ends,
/// including by being dropped, is released so a later call can queue it again.
struct InFlight<'a> {
    in_flight: &'a DashMap<Address, u64>,
    generation: u64,
    pending: BTreeSet<Address>,
}

impl InFlight<'_> {
    fn settle(&mut self, address: &str) {
        let _ = self.pending.remove(address);
        let generation = self.generation;
        let _ = self.in_flight.remove_if(address, |_, g| *g == generation);
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        if !self.pending.is_empty() {
            debug!("Releasing {} unfinished validators", self.pending.len());
        }
        let generation = self.generation;
        for address in &self.pending {
            let _ = self.in_flight.remove_if(address, |_, g| *g == generation);
        }
    }
}

/// Incremental, bounded concurrency statistics loader for one `(network, era)` at a time.
pub struct BatchLoader<P: ?Sized> {
    provider: Arc<P>,
    config: EngineConfig,
    state: RwLock<RunState>,
    in_flight: DashMap<Address, u64>,
    tables: Mutex<Option<(u64, Arc<RunTables>)>>,
    snapshots: watch::Sender<BatchSnapshot>,
}

impl<P: ?Sized> std::fmt::Debug for BatchLoader<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BatchLoader")
            .field("config", &self.config)
            .field("snapshots", &self.snapshots)
            .finish_non_exhaustive()
    }
}

impl<P> BatchLoader<P>
where
    P: ChainStateProvider + ?Sized,
{
    /// A loader with an empty result map for `(network, era)`.
    pub fn new(provider: Arc<P>, config: EngineConfig, network: NetworkId, era: EraIndex) -> Self {
        let state = RunState {
            tag: RunTag {
                network,
                era,
                generation: 0,
            },
            settled: BTreeSet::new(),
            results: BTreeMap::new(),
        };
        let (snapshots, _) = watch::channel(state.snapshot());
        Self {
            provider,
            config,
            state: RwLock::new(state),
            in_flight: DashMap::new(),
            tables: Mutex::new(None),
            snapshots,
        }
    }

    /// A receiver notified after every merged chunk.
    pub fn subscribe(&self) -> watch::Receiver<BatchSnapshot> {
        self.snapshots.subscribe()
    }

    /// The latest published results.
    pub fn snapshot(&self) -> BatchSnapshot {
        self.snapshots.borrow().clone()
    }

    /// The run currently being filled.
    pub async fn tag(&self) -> RunTag {
        self.state.read().await.tag
    }

    /// Statistics computed so far for `address`, if any.
    pub async fn get(&self, address: &str) -> Option<ValidatorStatistics> {
        self.state.read().await.results.get(address).cloned()
    }

    /// Switches to another `(network, era)`, starting an empty run.
    ///
    /// Work in flight for the previous target completes but is never merged. Retargeting to the
    /// current target is a no-op.
    pub async fn retarget(&self, network: NetworkId, era: EraIndex) {
        let mut state = self.state.write().await;
        if state.tag.network == network && state.tag.era == era {
            return;
        }
        state.tag = RunTag {
            network,
            era,
            generation: state.tag.generation + 1,
        };
        state.settled.clear();
        state.results.clear();
        info!("Batch loader retargeted to {network} era {era}");
        let _prev = self.snapshots.send_replace(state.snapshot());
    }

    /// Computes statistics for those of `validators` not yet settled or in flight in this run.
    ///
    /// Never fails: validators whose computation does not finish within the statistics timeout
    /// are left out of the results and not queued again. Validators of a call that is dropped
    /// before merging them can be queued by a later call.
    #[instrument(skip_all, fields(requested = validators.len()), level = "debug")]
    pub async fn load(&self, validators: &[Validator]) -> LoadReport {
        let (tag, pending) = {
            let state = self.state.read().await;
            let generation = state.tag.generation;
            let mut pending = Vec::new();
            for validator in validators {
                if state.settled.contains(&validator.address) {
                    continue;
                }
                let claimed = match self.in_flight.entry(validator.address.clone()) {
                    Entry::Occupied(mut entry) => {
                        if *entry.get() == generation {
                            false
                        } else {
                            let _ = entry.insert(generation);
                            true
                        }
                    }
                    Entry::Vacant(entry) => {
                        let _ = entry.insert(generation);
                        true
                    }
                };
                if claimed {
                    pending.push(validator.clone());
                }
            }
            (state.tag, pending)
        };

        let mut in_flight = InFlight {
            in_flight: &self.in_flight,
            generation: tag.generation,
            pending: pending.iter().map(|v| v.address.clone()).collect(),
        };

        let mut report = LoadReport {
            queued: pending.len(),
            ..LoadReport::default()
        };
        if pending.is_empty() {
            trace!("Nothing new to load for {} era {}", tag.network, tag.era);
            return report;
        }

        let tables = self.run_tables(tag).await;
        let uptime_source = tables.uptime.source();
        let concurrency = self.config.batch_concurrency.max(1);

        for chunk in pending.chunks(concurrency) {
            let tasks = chunk
                .iter()
                .map(|validator| self.compute(validator, tag.era, uptime_source, &tables.nominators));
            let outcomes = join_all(tasks).await;

            let mut state = self.state.write().await;
            if state.tag.generation != tag.generation {
                debug!(
                    "Discarding {} results for {} era {}, loader has been retargeted",
                    outcomes.len(),
                    tag.network,
                    tag.era
                );
                report.discarded = true;
                return report;
            }

            for (validator, outcome) in chunk.iter().zip(outcomes) {
                let _ = state.settled.insert(validator.address.clone());
                in_flight.settle(&validator.address);
                match outcome {
                    Ok(stats) => {
                        let _prev = state.results.insert(stats.address.clone(), stats);
                        report.computed += 1;
                    }
                    Err(error) => {
                        debug!("Skipping validator: {error}");
                        report.skipped += 1;
                    }
                }
            }

            let _prev = self.snapshots.send_replace(state.snapshot());
        }

        debug!(
            "Loaded {} of {} validators for {} era {}",
            report.computed, report.queued, tag.network, tag.era
        );
        report
    }

    async fn compute(
        &self,
        validator: &Validator,
        era: EraIndex,
        uptime_source: UptimeSource<'_>,
        nominators: &NominatorTable,
    ) -> Result<ValidatorStatistics> {
        let computation = compute_with_uptime(
            validator,
            self.provider.as_ref(),
            era,
            &self.config,
            uptime_source,
            nominators,
        );
        timeout(self.config.statistics_timeout(), computation)
            .await
            .map_err(|_| Error::StatisticsUnavailable(validator.address.clone()))
    }

    /// The shared tables for the run, fetched by the first load that needs them.
    async fn run_tables(&self, tag: RunTag) -> Arc<RunTables> {
        let mut cached = self.tables.lock().await;
        if let Some((generation, tables)) = cached.as_ref() {
            if *generation == tag.generation {
                return tables.clone();
            }
        }

        let (uptime, nominators) = tokio::join!(
            UptimeTable::fetch(self.provider.as_ref(), tag.era, &self.config),
            NominatorTable::fetch(self.provider.as_ref(), &self.config),
        );

        let uptime = match uptime {
            Ok(table) => {
                debug!("Fetched reward points of {} eras for uptime", table.len());
                SharedUptime::Table(table)
            }
            Err(error) if error.is_unsupported() => {
                debug!("Uptime not available on {}: {error}", tag.network);
                SharedUptime::Unavailable
            }
            Err(error) => {
                warn!("Uptime disabled for {} era {}: {error}", tag.network, tag.era);
                SharedUptime::Unavailable
            }
        };

        let tables = Arc::new(RunTables { uptime, nominators });
        *cached = Some((tag.generation, tables.clone()));
        tables
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{init_test_logger, test_address, MockProvider};
    use std::time::Duration;

    fn validators(count: usize) -> Vec<Validator> {
        (0..count)
            .map(|i| Validator {
                address: test_address(i),
                identity: format!("V{i}"),
                commission: 5.0,
                active: true,
                blocked: false,
                rank: i + 1,
            })
            .collect()
    }

    fn provider_for(validators: &[Validator]) -> MockProvider {
        validators.iter().fold(MockProvider::new().with_era(30), |provider, v| {
            provider.with_history(&v.address, vec![800; 30])
        })
    }

    fn config(concurrency: usize) -> EngineConfig {
        EngineConfig {
            batch_concurrency: concurrency,
            ..EngineConfig::default()
        }
    }

    #[tokio::test]
    async fn already_requested_validators_are_never_recomputed() {
        init_test_logger();
        let set = validators(3);
        let provider = Arc::new(provider_for(&set));
        let loader = BatchLoader::new(provider.clone(), config(8), NetworkId::Polkadot, 30);

        let first = loader.load(&set[..2]).await;
        let second = loader.load(&set).await;
        let third = loader.load(&set).await;

        assert_eq!((first.queued, first.computed), (2, 2));
        assert_eq!((second.queued, second.computed), (1, 1));
        assert_eq!(third, LoadReport::default());
        assert_eq!(provider.calls("era_points_history"), 3);
        assert_eq!(loader.snapshot().results.len(), 3);
    }

    #[tokio::test]
    async fn duplicates_within_one_request_are_computed_once() {
        let set = validators(1);
        let provider = Arc::new(provider_for(&set));
        let loader = BatchLoader::new(provider.clone(), config(8), NetworkId::Polkadot, 30);

        let report = loader.load(&[set[0].clone(), set[0].clone()]).await;

        assert_eq!(report.queued, 1);
        assert_eq!(provider.calls("era_points_history"), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn chunks_are_published_before_the_next_one_completes() {
        let set = validators(4);
        let provider = Arc::new(
            provider_for(&set).with_slow_history(&set[2].address, Duration::from_secs(3)),
        );
        let loader = Arc::new(BatchLoader::new(provider, config(2), NetworkId::Kusama, 30));
        let mut updates = loader.subscribe();

        let handle = tokio::spawn({
            let loader = loader.clone();
            let set = set.clone();
            async move { loader.load(&set).await }
        });

        tokio::time::sleep(Duration::from_secs(1)).await;
        let partial = loader.snapshot();
        assert_eq!(partial.results.len(), 2);
        assert!(partial.results.contains_key(&set[0].address));
        assert!(partial.results.contains_key(&set[1].address));
        assert!(updates.has_changed().unwrap_or(false));
        let _ = updates.borrow_and_update();

        let report = handle.await.map_err(|e| e.to_string());
        assert_eq!(report.map(|r| r.computed), Ok(4));
        assert_eq!(loader.snapshot().results.len(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn results_for_an_abandoned_era_are_discarded() {
        let set = validators(2);
        let provider = Arc::new(
            provider_for(&set).with_slow_history(&set[0].address, Duration::from_secs(2)),
        );
        let loader = Arc::new(BatchLoader::new(provider, config(8), NetworkId::Westend, 30));

        let handle = tokio::spawn({
            let loader = loader.clone();
            let set = set.clone();
            async move { loader.load(&set).await }
        });

        tokio::time::sleep(Duration::from_secs(1)).await;
        loader.retarget(NetworkId::Westend, 31).await;

        let report = handle.await.map_err(|e| e.to_string());
        assert_eq!(report.map(|r| r.discarded), Ok(true));
        let snapshot = loader.snapshot();
        assert_eq!(snapshot.era, 31);
        assert!(snapshot.results.is_empty());
        assert_eq!(loader.get(&set[1].address).await, None);

        // the new run starts from scratch
        let report = loader.load(&set).await;
        assert_eq!(report.queued, 2);
    }

    #[tokio::test]
    async fn missing_reward_points_table_leaves_uptime_undefined() {
        let set = validators(3);
        let provider = Arc::new(provider_for(&set));
        let loader = BatchLoader::new(provider, config(8), NetworkId::Paseo, 30);

        let _ = loader.load(&set).await;

        let snapshot = loader.snapshot();
        assert_eq!(snapshot.results.len(), 3);
        assert!(snapshot.results.values().all(|stats| stats.uptime.is_none()));
        assert!(snapshot.results.values().all(|stats| stats.performance == 80.0));
    }

    #[tokio::test]
    async fn reward_points_table_is_fetched_once_per_run() {
        let set = validators(5);
        let provider = Arc::new(provider_for(&set).with_reward_points_table());
        let loader = BatchLoader::new(provider.clone(), config(2), NetworkId::Paseo, 30);

        let _ = loader.load(&set[..3]).await;
        let _ = loader.load(&set).await;

        assert_eq!(provider.calls("era_reward_points"), 10);
        let snapshot = loader.snapshot();
        assert!(snapshot.results.values().all(|stats| stats.uptime == Some(100.0)));

        loader.retarget(NetworkId::Paseo, 29).await;
        let _ = loader.load(&set[..1]).await;
        assert_eq!(provider.calls("era_reward_points"), 20);
    }

    #[tokio::test(start_paused = true)]
    async fn timed_out_validators_are_skipped_and_not_retried() {
        let set = validators(2);
        let provider = Arc::new(
            provider_for(&set).with_slow_history(&set[1].address, Duration::from_secs(3)),
        );
        let config = EngineConfig {
            statistics_timeout_ms: 1_000,
            fetch_timeout_ms: 10_000,
            ..EngineConfig::default()
        };
        let loader = BatchLoader::new(provider.clone(), config, NetworkId::Polkadot, 30);

        let report = loader.load(&set).await;
        let again = loader.load(&set).await;

        assert_eq!((report.computed, report.skipped), (1, 1));
        assert_eq!(again.queued, 0);
        assert_eq!(provider.calls("era_points_history"), 2);
        assert!(loader.get(&set[1].address).await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn validators_of_a_dropped_load_are_queued_again() {
        let set = validators(2);
        let provider = Arc::new(
            provider_for(&set).with_slow_history(&set[0].address, Duration::from_secs(5)),
        );
        let config = EngineConfig {
            fetch_timeout_ms: 10_000,
            ..config(8)
        };
        let loader = BatchLoader::new(provider.clone(), config, NetworkId::Polkadot, 30);

        let cancelled = timeout(Duration::from_secs(1), loader.load(&set)).await;
        assert!(cancelled.is_err());
        assert!(loader.snapshot().results.is_empty());

        let report = loader.load(&set).await;

        assert_eq!((report.queued, report.computed), (2, 2));
        assert_eq!(loader.snapshot().results.len(), 2);
        assert_eq!(provider.calls("era_points_history"), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn validators_in_flight_are_not_queued_twice() {
        let set = validators(2);
        let provider = Arc::new(
            provider_for(&set).with_slow_history(&set[0].address, Duration::from_secs(2)),
        );
        let loader = Arc::new(BatchLoader::new(provider.clone(), config(8), NetworkId::Kusama, 30));

        let handle = tokio::spawn({
            let loader = loader.clone();
            let set = set.clone();
            async move { loader.load(&set).await }
        });
        tokio::time::sleep(Duration::from_secs(1)).await;

        let overlapping = loader.load(&set).await;
        assert_eq!(overlapping.queued, 0);

        let report = handle.await.map_err(|e| e.to_string());
        assert_eq!(report.map(|r| r.computed), Ok(2));
        assert_eq!(provider.calls("era_points_history"), 2);
    }

    #[tokio::test]
    async fn nominators_are_fetched_once_per_run() {
        let set = validators(5);
        let provider = set.iter().fold(provider_for(&set), |provider, v| {
            provider.with_nomination(&format!("n-{}", v.address), &[v.address.as_str()])
        });
        let provider = Arc::new(provider);
        let loader = BatchLoader::new(provider.clone(), config(2), NetworkId::Polkadot, 30);

        let _ = loader.load(&set[..3]).await;
        let _ = loader.load(&set).await;

        assert_eq!(provider.calls("nominators"), 1);
        assert_eq!(provider.calls("staking_ledger"), 5);
        let snapshot = loader.snapshot();
        assert!(snapshot.results.values().all(|stats| stats.nominators == 1));
    }

    #[tokio::test]
    async fn retargeting_to_the_same_era_keeps_results() {
        let set = validators(1);
        let loader = BatchLoader::new(Arc::new(provider_for(&set)), config(8), NetworkId::Local, 30);

        let _ = loader.load(&set).await;
        loader.retarget(NetworkId::Local, 30).await;

        assert_eq!(loader.tag().await.generation, 0);
        assert_eq!(loader.snapshot().results.len(), 1);
    }
}
