// Copyright 2022 MaidSafe.net limited.
//
// This SAFE Network Software is licensed to you under The General Public License (GPL), version 3.
// Unless required by applicable law or agreed to in writing, the SAFE Network Software distributed
// under the GPL Licence is distributed on an "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY
// KIND, either express or implied. Please review the Licences for the specific language governing
// permissions and limitations relating to use of the SAFE Network Software.

//! The chain state capability the engine is built on.
//!
//! Transport (RPC, websockets, light clients) lives behind this trait. Optional query surfaces
//! report [`ProviderError::Unsupported`] when the target chain does not expose them, which the
//! engine treats as a degraded mode rather than a failure.

use crate::types::{Address, Balance, EraIndex, EraPointSample};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, future::Future, time::Duration};
use thiserror::Error;

/// Errors reported by a [`ChainStateProvider`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ProviderError {
    /// The queried table or constant does not exist on this chain.
    #[error("Query surface not available on this chain: {0}")]
    Unsupported(&'static str),
    /// The query was attempted but failed.
    #[error("Chain query failed: {0}")]
    Query(String),
    /// The query did not complete in time.
    #[error("Chain query timed out after {0:?}")]
    Timeout(Duration),
}

impl ProviderError {
    /// Is this the feature-detection signal rather than a real failure?
    pub fn is_unsupported(&self) -> bool {
        matches!(self, Self::Unsupported(_))
    }
}

/// Preferences a validator registered on chain.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidatorPrefs {
    /// Commission as a fixed-point parts-per-billion ratio.
    pub commission: u32,
    /// Whether new nominations are refused.
    pub blocked: bool,
}

/// A registered on-chain identity.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub display: Option<String>,
}

/// A sub-account link to a parent identity.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuperIdentity {
    /// The parent account.
    pub parent: Address,
    /// The parent's display name when the chain resolves it alongside the link.
    pub display: Option<String>,
}

/// Staking ledger of a stash account.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StakingLedger {
    pub total: Balance,
    pub active: Balance,
}

/// A nominator and the validators it backs.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Nomination {
    pub nominator: Address,
    pub targets: Vec<Address>,
}

/// Reward points handed out in one era, for every validator that earned any.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EraRewardPoints {
    pub total: u32,
    pub individual: BTreeMap<Address, u32>,
}

/// Read access to chain state needed for validator statistics.
#[async_trait]
pub trait ChainStateProvider: Send + Sync {
    /// The current era. Chains that are still bootstrapping may report `None` or `0`.
    async fn current_era(&self) -> Result<Option<EraIndex>, ProviderError>;

    /// Every registered validator with its preferences, in provider order.
    async fn validators(&self) -> Result<Vec<(Address, ValidatorPrefs)>, ProviderError>;

    /// The identity table. Optional.
    async fn identities(&self) -> Result<BTreeMap<Address, Identity>, ProviderError>;

    /// The sub-account to parent identity table. Optional.
    async fn super_identities(&self) -> Result<BTreeMap<Address, SuperIdentity>, ProviderError>;

    /// Validators in the current session. Optional.
    async fn session_validators(&self) -> Result<Vec<Address>, ProviderError>;

    /// Staking ledger for a stash, `None` when not bonded.
    async fn staking_ledger(&self, stash: &Address) -> Result<Option<StakingLedger>, ProviderError>;

    /// All nominator entries.
    async fn nominators(&self) -> Result<Vec<Nomination>, ProviderError>;

    /// Per-validator reward points history, covering at most `depth` eras up to and including
    /// `era`.
    async fn era_points_history(
        &self,
        validator: &Address,
        era: EraIndex,
        depth: u32,
    ) -> Result<Vec<EraPointSample>, ProviderError>;

    /// Aggregate reward points for one era. Optional.
    async fn era_reward_points(&self, era: EraIndex) -> Result<EraRewardPoints, ProviderError>;

    /// Maximum number of nominators rewarded per validator. Optional.
    async fn max_nominators_rewarded(&self) -> Result<u32, ProviderError> {
        Err(ProviderError::Unsupported("staking.maxNominatorRewardedPerValidator"))
    }
}

/// Runs a provider query under `timeout`, mapping an elapsed deadline to
/// [`ProviderError::Timeout`].
pub(crate) async fn with_timeout<T, F>(timeout: Duration, query: F) -> Result<T, ProviderError>
where
    F: Future<Output = Result<T, ProviderError>>,
{
    match tokio::time::timeout(timeout, query).await {
        Ok(res) => res,
        Err(_) => Err(ProviderError::Timeout(timeout)),
    }
}
