// Copyright 2022 MaidSafe.net limited.
//
// This SAFE Network Software is licensed to you under The General Public License (GPL), version 3.
// Unless required by applicable law or agreed to in writing, the SAFE Network Software distributed
// under the GPL Licence is distributed on an "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY
// KIND, either express or implied. Please review the Licences for the specific language governing
// permissions and limitations relating to use of the SAFE Network Software.

use serde::{Deserialize, Serialize};

/// Opaque chain account identifier.
pub type Address = String;

/// Era identifier.
pub type EraIndex = u32;

/// Base-unit denominated balance.
pub type Balance = u128;

/// A single validating account, as listed in the validator directory.
///
/// Built once per directory refresh and never mutated afterwards.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Validator {
    /// Unique account identifier.
    pub address: Address,
    /// Display name, or a truncated address when no identity is registered.
    pub identity: String,
    /// Commission charged to delegators, as a percentage in `[0, 100]`.
    pub commission: f64,
    /// Whether the validator is in the current validating set.
    pub active: bool,
    /// Whether the validator refuses new delegations.
    #[serde(default)]
    pub blocked: bool,
    /// 1-based position in the directory ordering.
    pub rank: usize,
}

/// One historical reward points observation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EraPointSample {
    /// The era observed.
    pub era: EraIndex,
    /// Reward points earned in the era. 0 means no participation.
    pub points: u32,
    /// Approximate wall-clock time of the observation, in seconds since the unix epoch.
    pub timestamp: u64,
}

/// Derived statistics for one validator, for one computation run.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ValidatorStatistics {
    pub address: Address,
    /// Chronologically ordered samples, oldest first.
    pub era_points: Vec<EraPointSample>,
    pub total_era_points: u64,
    pub average_era_points: f64,
    pub last_era_points: u32,
    /// Recent participation intensity, in `[0, 100]`.
    pub performance: f64,
    /// Recent participation reliability, in `[0, 100]`.
    /// `None` when the reward points table needed to derive it is unsupported.
    pub uptime: Option<f64>,
    pub total_stake: Balance,
    pub self_stake: Balance,
    pub other_stake: Balance,
    pub nominators: usize,
    pub commission: f64,
    pub is_active: bool,
    pub is_blocked: bool,
    pub is_oversubscribed: bool,
    pub is_waiting: bool,
}

impl ValidatorStatistics {
    /// The uniform "no data" record for a validator.
    pub fn zeroed(validator: &Validator) -> Self {
        Self {
            address: validator.address.clone(),
            era_points: Vec::new(),
            total_era_points: 0,
            average_era_points: 0.0,
            last_era_points: 0,
            performance: 0.0,
            uptime: Some(0.0),
            total_stake: 0,
            self_stake: 0,
            other_stake: 0,
            nominators: 0,
            commission: validator.commission,
            is_active: validator.active,
            is_blocked: validator.blocked,
            is_oversubscribed: false,
            is_waiting: !validator.active,
        }
    }

    /// Whether this record carries no era points at all.
    pub fn has_no_data(&self) -> bool {
        self.era_points.is_empty()
    }
}
