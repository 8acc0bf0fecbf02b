// Copyright 2022 MaidSafe.net limited.
//
// This SAFE Network Software is licensed to you under The General Public License (GPL), version 3.
// Unless required by applicable law or agreed to in writing, the SAFE Network Software distributed
// under the GPL Licence is distributed on an "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY
// KIND, either express or implied. Please review the Licences for the specific language governing
// permissions and limitations relating to use of the SAFE Network Software.

use crate::types::{Address, Validator, ValidatorStatistics};

use itertools::Itertools;
use serde::{Deserialize, Serialize};
use std::{cmp::Ordering, collections::BTreeMap};

const TOP_PERFORMERS: usize = 5;

/// Network wide figures over a directory and the statistics computed for it so far.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Summary {
    pub total_validators: usize,
    pub active_validators: usize,
    pub average_commission: f64,
    /// Mean over the validators that have statistics.
    pub average_performance: f64,
    pub average_era_points: f64,
    pub total_era_points: u64,
    /// Highest performance first, ties broken by address.
    pub top_performers: Vec<Address>,
}

pub fn summarize(
    validators: &[Validator],
    statistics: &BTreeMap<Address, ValidatorStatistics>,
) -> Summary {
    let mean = |sum: f64, count: usize| if count == 0 { 0.0 } else { sum / count as f64 };

    let computed: Vec<&ValidatorStatistics> = validators
        .iter()
        .filter_map(|v| statistics.get(&v.address))
        .collect();

    let top_performers = computed
        .iter()
        .sorted_by(|a, b| {
            b.performance
                .partial_cmp(&a.performance)
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.address.cmp(&b.address))
        })
        .take(TOP_PERFORMERS)
        .map(|stats| stats.address.clone())
        .collect();

    Summary {
        total_validators: validators.len(),
        active_validators: validators.iter().filter(|v| v.active).count(),
        average_commission: mean(
            validators.iter().map(|v| v.commission).sum(),
            validators.len(),
        ),
        average_performance: mean(
            computed.iter().map(|s| s.performance).sum(),
            computed.len(),
        ),
        average_era_points: mean(
            computed.iter().map(|s| s.average_era_points).sum(),
            computed.len(),
        ),
        total_era_points: computed.iter().map(|s| s.total_era_points).sum(),
        top_performers,
    }
}
