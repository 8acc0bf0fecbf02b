// Copyright 2022 MaidSafe.net limited.
//
// This SAFE Network Software is licensed to you under The General Public License (GPL), version 3.
// Unless required by applicable law or agreed to in writing, the SAFE Network Software distributed
// under the GPL Licence is distributed on an "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY
// KIND, either express or implied. Please review the Licences for the specific language governing
// permissions and limitations relating to use of the SAFE Network Software.

use crate::{provider::ProviderError, types::Address};
use std::io;
use thiserror::Error;

/// Specialisation of `std::Result` for the validator statistics engine.
pub type Result<T, E = Error> = std::result::Result<T, E>;

#[allow(clippy::large_enum_variant)]
#[derive(Error, Debug)]
#[non_exhaustive]
/// Engine error variants.
pub enum Error {
    /// The current era could not be resolved within the retry budget.
    #[error("Current era unavailable after {attempts} attempts. Please try again later.")]
    EraUnavailable {
        /// Number of attempts made before giving up
        attempts: usize,
    },
    /// The validator set could not be fetched from the chain state provider.
    #[error("Failed to fetch the validator directory: {0}")]
    DirectoryFetchFailed(#[source] ProviderError),
    /// Statistics for a single validator could not be computed.
    #[error("Statistics unavailable for validator {0}")]
    StatisticsUnavailable(Address),
    /// Invalid engine configuration.
    #[error("Configuration error: {0}")]
    Configuration(String),
    /// A network name that is not in the registry.
    #[error("Network {0} is not supported")]
    UnknownNetwork(String),
    /// Sled error.
    #[error("Sled error:: {0}")]
    Sled(#[from] sled::Error),
    /// JSON serialisation error.
    #[error("JSON serialisation error:: {0}")]
    Serialisation(#[from] serde_json::Error),
    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}
