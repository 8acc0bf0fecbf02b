// Copyright 2022 MaidSafe.net limited.
//
// This SAFE Network Software is licensed to you under The General Public License (GPL), version 3.
// Unless required by applicable law or agreed to in writing, the SAFE Network Software distributed
// under the GPL Licence is distributed on an "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY
// KIND, either express or implied. Please review the Licences for the specific language governing
// permissions and limitations relating to use of the SAFE Network Software.

//! Validator performance aggregation.
//!
//! Resolves the current era, builds a ranked validator directory (cached per network and era),
//! computes per-validator performance, uptime and stake figures in bounded concurrent batches,
//! and turns the results into advisories. Chain access goes through a [`ChainStateProvider`].

#![doc(
    html_logo_url = "https://github.com/maidsafe/QA/raw/master/Images/maidsafe_logo.png",
    html_favicon_url = "https://maidsafe.net/img/favicon.ico",
    test(attr(deny(warnings)))
)]
// Forbid some very bad patterns. Forbid is stronger than `deny`, preventing us from suppressing the
// lint with `#[allow(...)]` et-all.
#![forbid(
    arithmetic_overflow,
    mutable_transmutes,
    no_mangle_const_items,
    unknown_crate_types,
    unsafe_code
)]
// Turn on some additional warnings to encourage good style.
#![warn(
    missing_debug_implementations,
    trivial_casts,
    trivial_numeric_casts,
    unreachable_pub,
    unused_extern_crates,
    unused_import_braces,
    unused_qualifications,
    unused_results,
    clippy::unicode_not_nfc
)]

#[macro_use]
extern crate tracing;

pub mod advisory;
pub mod batch;
pub mod cache;
pub mod config;
pub mod delegation;
pub mod directory;
pub mod engine;
pub mod era;
mod error;
pub mod logging;
pub mod network;
pub mod provider;
pub mod statistics;
pub mod summary;
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
pub mod types;

pub use crate::{
    advisory::{classify, Advisory, Severity},
    batch::{BatchLoader, BatchSnapshot, LoadReport},
    cache::{CacheStore, EraCache, EraCacheEntry, MemoryStore, SledStore},
    config::EngineConfig,
    delegation::{verify_delegation, DelegationStatus},
    directory::{Directory, ValidatorDirectory},
    engine::ValidatorEngine,
    era::resolve_current_era,
    error::{Error, Result},
    logging::{init_logging, LogConfig, LogRotation},
    network::NetworkId,
    provider::{ChainStateProvider, ProviderError},
    statistics::{compute_statistics, PerformanceTier},
    summary::{summarize, Summary},
    types::{Address, Balance, EraIndex, EraPointSample, Validator, ValidatorStatistics},
};
