// Copyright 2022 MaidSafe.net limited.
//
// This SAFE Network Software is licensed to you under The General Public License (GPL), version 3.
// Unless required by applicable law or agreed to in writing, the SAFE Network Software distributed
// under the GPL Licence is distributed on an "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY
// KIND, either express or implied. Please review the Licences for the specific language governing
// permissions and limitations relating to use of the SAFE Network Software.

//! Per-validator statistics derived from reward points history and staking state.
//!
//! Performance and uptime are deliberately independent: performance weighs how many points
//! were earned over the recent sample window, uptime only whether any were earned in each of
//! the recent eras.

use crate::{
    provider::{with_timeout, ChainStateProvider, EraRewardPoints, Nomination, ProviderError},
    types::{Address, Balance, EraIndex, EraPointSample, Validator, ValidatorStatistics},
    EngineConfig,
};

use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Coarse rating of a performance figure.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum PerformanceTier {
    Poor,
    Average,
    Good,
    Excellent,
}

impl PerformanceTier {
    pub fn from_performance(performance: f64) -> Self {
        if performance >= 90.0 {
            Self::Excellent
        } else if performance >= 70.0 {
            Self::Good
        } else if performance >= 50.0 {
            Self::Average
        } else {
            Self::Poor
        }
    }
}

/// Orders samples oldest first, drops duplicate eras and keeps the `depth` most recent.
pub fn normalise_window(mut samples: Vec<EraPointSample>, depth: usize) -> Vec<EraPointSample> {
    samples.sort_by_key(|sample| sample.era);
    samples.dedup_by_key(|sample| sample.era);
    let skip = samples.len().saturating_sub(depth);
    samples.split_off(skip)
}

/// Points over the `window` most recent samples against the most that could have been earned
/// in `window` eras, as a percentage.
pub fn performance(samples: &[EraPointSample], window: usize, max_points_per_era: u32) -> f64 {
    let ceiling = window as f64 * f64::from(max_points_per_era);
    if ceiling <= 0.0 {
        return 0.0;
    }
    let earned: u64 = samples
        .iter()
        .rev()
        .take(window)
        .map(|sample| u64::from(sample.points))
        .sum();
    (earned as f64 / ceiling * 100.0).clamp(0.0, 100.0)
}

/// Share of the `window` most recent eras in which any points were earned, as a percentage.
/// Eras missing from `points` count as not participated.
pub fn uptime<I>(points: I, window: usize) -> f64
where
    I: IntoIterator<Item = u32>,
    I::IntoIter: DoubleEndedIterator,
{
    if window == 0 {
        return 0.0;
    }
    let participated = points
        .into_iter()
        .rev()
        .take(window)
        .filter(|points| *points > 0)
        .count();
    (participated as f64 / window as f64 * 100.0).clamp(0.0, 100.0)
}

/// Self stake is the bonded active amount, capped at the total; the rest is backing.
pub fn split_stake(total: Balance, active: Balance) -> (Balance, Balance) {
    let self_stake = active.min(total);
    (self_stake, total - self_stake)
}

/// Aggregate reward points for the last `window` eras, shared by a whole batch run.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct UptimeTable {
    window: usize,
    eras: BTreeMap<EraIndex, EraRewardPoints>,
}

impl UptimeTable {
    /// Fetches the table for the `window` eras ending at `era`, one query per era.
    ///
    /// Any failed era fails the whole table: uptime is either comparable across the run or
    /// absent.
    pub async fn fetch<P>(
        provider: &P,
        era: EraIndex,
        config: &EngineConfig,
    ) -> Result<Self, ProviderError>
    where
        P: ChainStateProvider + ?Sized,
    {
        let window = config.uptime_window;
        let first = era.saturating_sub(window.saturating_sub(1) as EraIndex);
        let eras: Vec<EraIndex> = (first..=era).collect();

        let tasks = eras.iter().map(|era| async move {
            let points = with_timeout(config.fetch_timeout(), provider.era_reward_points(*era)).await?;
            Ok::<_, ProviderError>((*era, points))
        });

        let eras = join_all(tasks)
            .await
            .into_iter()
            .collect::<Result<BTreeMap<_, _>, _>>()?;

        Ok(Self { window, eras })
    }

    /// Uptime of `address` across the table's eras.
    pub fn uptime(&self, address: &Address) -> f64 {
        uptime(
            self.eras
                .values()
                .map(|table| table.individual.get(address).copied().unwrap_or(0)),
            self.window,
        )
    }

    /// Number of eras held.
    pub fn len(&self) -> usize {
        self.eras.len()
    }

    pub fn is_empty(&self) -> bool {
        self.eras.is_empty()
    }
}

/// Nominator counts per validator and the rewarded nominator limit, read once and shared by
/// every computation of a run.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct NominatorTable {
    counts: BTreeMap<Address, usize>,
    limit: Option<u32>,
}

impl NominatorTable {
    /// Reads the nominator entries and the limit. Either failing leaves that part empty.
    pub async fn fetch<P>(provider: &P, config: &EngineConfig) -> Self
    where
        P: ChainStateProvider + ?Sized,
    {
        let timeout = config.fetch_timeout();
        let (nominations, limit) = tokio::join!(
            with_timeout(timeout, provider.nominators()),
            with_timeout(timeout, provider.max_nominators_rewarded()),
        );

        let nominations = nominations.unwrap_or_else(|error| {
            debug!("Could not fetch nominators, counting none: {error}");
            Vec::new()
        });
        Self::from_entries(&nominations, limit.ok())
    }

    /// Counts, for every target, the entries that include it.
    pub fn from_entries(nominations: &[Nomination], limit: Option<u32>) -> Self {
        let mut counts = BTreeMap::new();
        for entry in nominations {
            let targets: BTreeSet<&Address> = entry.targets.iter().collect();
            for target in targets {
                *counts.entry(target.clone()).or_insert(0) += 1;
            }
        }
        Self { counts, limit }
    }

    /// Number of nominator entries targeting `address`.
    pub fn count(&self, address: &str) -> usize {
        self.counts.get(address).copied().unwrap_or(0)
    }

    /// Whether `nominators` exceeds the rewarded limit. Always false when the limit is unknown.
    pub fn is_oversubscribed(&self, nominators: usize) -> bool {
        self.limit
            .map_or(false, |limit| nominators > limit as usize)
    }
}

/// Where a computation takes uptime from.
#[derive(Clone, Copy, Debug)]
pub(crate) enum UptimeSource<'a> {
    /// The validator's own history samples.
    Samples,
    /// A table shared across the batch.
    Table(&'a UptimeTable),
    /// Nothing to derive it from; uptime is left undefined.
    Unavailable,
}

/// Statistics for `validator` at `era`.
///
/// Never fails: optional sub-fetches default to zero, and a failed history fetch yields
/// [`ValidatorStatistics::zeroed`].
#[instrument(skip(validator, provider, config), fields(address = %validator.address), level = "debug")]
pub async fn compute_statistics<P>(
    validator: &Validator,
    provider: &P,
    era: EraIndex,
    config: &EngineConfig,
) -> ValidatorStatistics
where
    P: ChainStateProvider + ?Sized,
{
    let nominator_table = NominatorTable::fetch(provider, config).await;
    compute_with_uptime(
        validator,
        provider,
        era,
        config,
        UptimeSource::Samples,
        &nominator_table,
    )
    .await
}

pub(crate) async fn compute_with_uptime<P>(
    validator: &Validator,
    provider: &P,
    era: EraIndex,
    config: &EngineConfig,
    uptime_source: UptimeSource<'_>,
    nominator_table: &NominatorTable,
) -> ValidatorStatistics
where
    P: ChainStateProvider + ?Sized,
{
    let address = &validator.address;
    let timeout = config.fetch_timeout();

    let history = with_timeout(
        timeout,
        provider.era_points_history(address, era, config.era_points_depth),
    )
    .await;
    let samples = match history {
        Ok(samples) => normalise_window(samples, config.era_points_depth as usize),
        Err(error) => {
            debug!("No era points history for {address}, using zeroed statistics: {error}");
            let mut zeroed = ValidatorStatistics::zeroed(validator);
            if matches!(uptime_source, UptimeSource::Unavailable) {
                zeroed.uptime = None;
            }
            return zeroed;
        }
    };

    let total_era_points: u64 = samples.iter().map(|s| u64::from(s.points)).sum();
    let average_era_points = if samples.is_empty() {
        0.0
    } else {
        total_era_points as f64 / samples.len() as f64
    };
    let last_era_points = samples.last().map(|s| s.points).unwrap_or(0);
    let performance = performance(
        &samples,
        config.performance_window,
        config.max_points_per_era,
    );
    let uptime = match uptime_source {
        UptimeSource::Samples => Some(uptime(
            samples.iter().map(|s| s.points),
            config.uptime_window,
        )),
        UptimeSource::Table(table) => Some(table.uptime(address)),
        UptimeSource::Unavailable => None,
    };

    let ledger = with_timeout(timeout, provider.staking_ledger(address)).await;
    let (total_stake, self_stake, other_stake) = match ledger {
        Ok(Some(ledger)) => {
            let (self_stake, other_stake) = split_stake(ledger.total, ledger.active);
            (ledger.total, self_stake, other_stake)
        }
        Ok(None) => (0, 0, 0),
        Err(error) => {
            debug!("Could not fetch staking ledger for {address}: {error}");
            (0, 0, 0)
        }
    };

    let nominators = nominator_table.count(address);
    let is_oversubscribed = nominator_table.is_oversubscribed(nominators);

    ValidatorStatistics {
        address: address.clone(),
        era_points: samples,
        total_era_points,
        average_era_points,
        last_era_points,
        performance,
        uptime,
        total_stake,
        self_stake,
        other_stake,
        nominators,
        commission: validator.commission,
        is_active: validator.active,
        is_blocked: validator.blocked,
        is_oversubscribed,
        is_waiting: !validator.active,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{init_test_logger, test_address, MockProvider};
    use eyre::Result;
    use proptest::prelude::*;
    use std::time::Duration;

    fn samples(points: &[u32]) -> Vec<EraPointSample> {
        points
            .iter()
            .enumerate()
            .map(|(i, points)| EraPointSample {
                era: i as EraIndex + 1,
                points: *points,
                timestamp: 0,
            })
            .collect()
    }

    fn validator(address: &str) -> Validator {
        Validator {
            address: address.to_string(),
            identity: "V".to_string(),
            commission: 12.5,
            active: true,
            blocked: false,
            rank: 1,
        }
    }

    #[test]
    fn full_recent_window_is_full_performance() {
        let mut points = vec![0; 30];
        points.extend([1000; 20]);
        assert_eq!(performance(&samples(&points), 20, 1000), 100.0);
    }

    #[test]
    fn short_history_is_measured_against_the_full_window() {
        assert_eq!(performance(&samples(&[1000; 10]), 20, 1000), 50.0);
        assert_eq!(performance(&[], 20, 1000), 0.0);
    }

    #[test]
    fn points_above_ceiling_are_clamped() {
        assert_eq!(performance(&samples(&[5000; 20]), 20, 1000), 100.0);
    }

    #[test]
    fn uptime_counts_participating_eras() {
        assert_eq!(uptime(vec![0; 10], 10), 0.0);
        assert_eq!(uptime(vec![1; 10], 10), 100.0);
        assert_eq!(uptime(vec![5, 0, 5, 0, 5, 0, 5, 0, 5, 0], 10), 50.0);
        // only the most recent eras count
        let mut points = vec![900; 10];
        points.extend([0; 10]);
        assert_eq!(uptime(points, 10), 0.0);
    }

    #[test]
    fn sporadic_high_points_give_low_uptime_but_some_performance() {
        let points = [0, 0, 0, 0, 0, 0, 0, 0, 0, 1000];
        let s = samples(&points);
        assert_eq!(uptime(s.iter().map(|s| s.points), 10), 10.0);
        assert_eq!(performance(&s, 20, 1000), 5.0);
    }

    #[test]
    fn window_is_ordered_deduplicated_and_bounded() {
        let raw = vec![
            EraPointSample { era: 3, points: 30, timestamp: 3 },
            EraPointSample { era: 1, points: 10, timestamp: 1 },
            EraPointSample { era: 2, points: 20, timestamp: 2 },
            EraPointSample { era: 3, points: 30, timestamp: 3 },
        ];
        let window = normalise_window(raw, 2);
        let eras: Vec<_> = window.iter().map(|s| s.era).collect();
        assert_eq!(eras, [2, 3]);
    }

    #[test]
    fn tiers_follow_thresholds() {
        assert_eq!(PerformanceTier::from_performance(95.0), PerformanceTier::Excellent);
        assert_eq!(PerformanceTier::from_performance(90.0), PerformanceTier::Excellent);
        assert_eq!(PerformanceTier::from_performance(70.0), PerformanceTier::Good);
        assert_eq!(PerformanceTier::from_performance(69.9), PerformanceTier::Average);
        assert_eq!(PerformanceTier::from_performance(10.0), PerformanceTier::Poor);
    }

    #[tokio::test]
    async fn statistics_are_assembled_from_every_source() -> Result<()> {
        init_test_logger();
        let address = test_address(1);
        let provider = MockProvider::new()
            .with_era(50)
            .with_history(&address, vec![500; 30])
            .with_ledger(&address, 1_000, 400)
            .with_nomination("n1", &[address.as_str()])
            .with_nomination("n2", &[address.as_str(), "other"])
            .with_nomination("n3", &["other"])
            .with_max_nominators_rewarded(1);

        let stats = compute_statistics(&validator(&address), &provider, 50, &EngineConfig::default()).await;

        assert_eq!(stats.era_points.len(), 30);
        assert_eq!(stats.total_era_points, 15_000);
        assert_eq!(stats.average_era_points, 500.0);
        assert_eq!(stats.last_era_points, 500);
        assert_eq!(stats.performance, 50.0);
        assert_eq!(stats.uptime, Some(100.0));
        assert_eq!((stats.total_stake, stats.self_stake, stats.other_stake), (1_000, 400, 600));
        assert_eq!(stats.nominators, 2);
        assert!(stats.is_oversubscribed);
        assert!(!stats.is_waiting);
        assert_eq!(stats.commission, 12.5);
        Ok(())
    }

    #[tokio::test]
    async fn failed_history_yields_zeroed_record() {
        let address = test_address(2);
        let provider = MockProvider::new()
            .with_era(50)
            .with_failing_history(&address)
            .with_ledger(&address, 1_000, 400);

        let stats = compute_statistics(&validator(&address), &provider, 50, &EngineConfig::default()).await;

        assert_eq!(stats, ValidatorStatistics::zeroed(&validator(&address)));
        assert!(stats.has_no_data());
        assert_eq!(provider.calls("staking_ledger"), 0);
    }

    #[tokio::test]
    async fn optional_fetch_failures_default_to_zero() {
        let address = test_address(3);
        let provider = MockProvider::new().with_era(5).with_history(&address, vec![100; 5]);

        let stats = compute_statistics(&validator(&address), &provider, 5, &EngineConfig::default()).await;

        assert_eq!(stats.total_stake, 0);
        assert_eq!(stats.nominators, 0);
        assert!(!stats.is_oversubscribed);
        assert_eq!(stats.era_points.len(), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn slow_history_times_out_into_zeroed_record() {
        let address = test_address(4);
        let provider = MockProvider::new()
            .with_era(5)
            .with_history(&address, vec![100; 5])
            .with_slow_history(&address, Duration::from_secs(60));

        let stats = compute_statistics(&validator(&address), &provider, 5, &EngineConfig::default()).await;

        assert!(stats.has_no_data());
    }

    #[tokio::test]
    async fn shared_table_drives_uptime() -> Result<()> {
        let (a, b) = (test_address(1), test_address(2));
        let provider = MockProvider::new()
            .with_era(20)
            .with_history(&a, vec![10; 20])
            .with_history(&b, vec![10, 0, 10, 0, 10, 0, 10, 0, 10, 0])
            .with_reward_points_table();
        let config = EngineConfig::default();

        let table = UptimeTable::fetch(&provider, 20, &config).await?;

        assert_eq!(table.len(), 10);
        assert_eq!(provider.calls("era_reward_points"), 10);
        assert_eq!(table.uptime(&a), 100.0);
        assert_eq!(table.uptime(&b), 50.0);
        assert_eq!(table.uptime(&test_address(9)), 0.0);
        Ok(())
    }

    #[tokio::test]
    async fn unsupported_table_fails_fetch() {
        let provider = MockProvider::new().with_era(20);

        let res = UptimeTable::fetch(&provider, 20, &EngineConfig::default()).await;

        assert!(matches!(res, Err(ProviderError::Unsupported(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn slow_staking_queries_degrade_to_zero_and_keep_era_points() {
        let address = test_address(5);
        let provider = MockProvider::new()
            .with_era(40)
            .with_history(&address, vec![700; 25])
            .with_ledger(&address, 5_000, 1_000)
            .with_nomination("n1", &[address.as_str()])
            .with_slow_staking(Duration::from_secs(60));
        let started = tokio::time::Instant::now();

        let stats = compute_statistics(&validator(&address), &provider, 40, &EngineConfig::default()).await;

        assert_eq!(stats.era_points.len(), 25);
        assert_eq!(stats.performance, 70.0);
        assert_eq!((stats.total_stake, stats.self_stake, stats.other_stake), (0, 0, 0));
        assert_eq!(stats.nominators, 0);
        // one timeout for the nominators table, one for the ledger
        assert!(started.elapsed() <= Duration::from_secs(8));
    }

    #[test]
    fn nominator_table_counts_each_entry_once() {
        let entries = vec![
            Nomination {
                nominator: "n1".to_string(),
                targets: vec!["a".to_string(), "a".to_string(), "b".to_string()],
            },
            Nomination {
                nominator: "n2".to_string(),
                targets: vec!["a".to_string()],
            },
        ];

        let table = NominatorTable::from_entries(&entries, Some(1));

        assert_eq!(table.count("a"), 2);
        assert_eq!(table.count("b"), 1);
        assert_eq!(table.count("c"), 0);
        assert!(table.is_oversubscribed(2));
        assert!(!table.is_oversubscribed(1));
        assert!(!NominatorTable::from_entries(&entries, None).is_oversubscribed(100));
    }

    proptest! {
        #[test]
        fn performance_stays_in_range(points in prop::collection::vec(any::<u32>(), 0..120), window in 1usize..40) {
            let p = performance(&samples(&points), window, 1000);
            prop_assert!((0.0..=100.0).contains(&p));
        }

        #[test]
        fn uptime_stays_in_range(points in prop::collection::vec(any::<u32>(), 0..120), window in 1usize..40) {
            let u = uptime(points, window);
            prop_assert!((0.0..=100.0).contains(&u));
        }

        #[test]
        fn stake_split_is_consistent(total in any::<u128>(), active in any::<u128>()) {
            let (self_stake, other_stake) = split_stake(total, active);
            prop_assert!(self_stake <= total);
            prop_assert_eq!(self_stake + other_stake, total);
        }
    }
}
