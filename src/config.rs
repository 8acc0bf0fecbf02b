// Copyright 2022 MaidSafe.net limited.
//
// This SAFE Network Software is licensed to you under The General Public License (GPL), version 3.
// Unless required by applicable law or agreed to in writing, the SAFE Network Software distributed
// under the GPL Licence is distributed on an "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY
// KIND, either express or implied. Please review the Licences for the specific language governing
// permissions and limitations relating to use of the SAFE Network Software.

use crate::{Error, Result};

use serde::{Deserialize, Serialize};
use std::{
    fs::File,
    io::BufReader,
    path::{Path, PathBuf},
    str::FromStr,
    time::Duration,
};

const CONFIG_DIR_APPLICATION: &str = "validator_stats";
const CONFIG_FILE: &str = "engine.config";

/// Environment variable used to override [`EngineConfig::era_max_retries`]
pub const ENV_ERA_MAX_RETRIES: &str = "VS_ERA_MAX_RETRIES";
/// Environment variable used to override [`EngineConfig::era_retry_delay_ms`]
pub const ENV_ERA_RETRY_DELAY_MS: &str = "VS_ERA_RETRY_DELAY_MS";
/// Environment variable used to override [`EngineConfig::batch_concurrency`]
pub const ENV_BATCH_CONCURRENCY: &str = "VS_BATCH_CONCURRENCY";
/// Environment variable used to override [`EngineConfig::fetch_timeout_ms`]
pub const ENV_FETCH_TIMEOUT_MS: &str = "VS_FETCH_TIMEOUT_MS";
/// Environment variable used to override [`EngineConfig::statistics_timeout_ms`]
pub const ENV_STATISTICS_TIMEOUT_MS: &str = "VS_STATISTICS_TIMEOUT_MS";
/// Environment variable used to override [`EngineConfig::cache_dir`]
pub const ENV_CACHE_DIR: &str = "VS_CACHE_DIR";

/// Default attempts made when resolving the current era.
pub const DEFAULT_ERA_MAX_RETRIES: usize = 6;
/// Default fixed delay between era resolution attempts.
pub const DEFAULT_ERA_RETRY_DELAY_MS: u64 = 1500;
/// Default number of eras of reward points kept per validator.
pub const DEFAULT_ERA_POINTS_DEPTH: u32 = 100;
/// Default number of most recent samples that make up performance.
pub const DEFAULT_PERFORMANCE_WINDOW: usize = 20;
/// Default number of most recent eras that make up uptime.
pub const DEFAULT_UPTIME_WINDOW: usize = 10;
/// Default reward points ceiling per era.
pub const DEFAULT_MAX_POINTS_PER_ERA: u32 = 1000;
/// Default batch loader chunk size.
pub const DEFAULT_BATCH_CONCURRENCY: usize = 8;
/// Default timeout for a single provider sub-fetch.
pub const DEFAULT_FETCH_TIMEOUT_MS: u64 = 4000;
/// Default timeout for computing one validator's statistics in a batch.
pub const DEFAULT_STATISTICS_TIMEOUT_MS: u64 = 20_000;
/// Default active set ceiling, used when nothing better is known.
pub const DEFAULT_MAX_VALIDATORS_CEILING: u32 = 1000;

/// Tunables of the aggregation engine.
///
/// Windows and the points ceiling are chain specific, so they live here rather than as
/// invariants of the calculator.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Attempts made when resolving the current era.
    pub era_max_retries: usize,
    /// Fixed delay between era resolution attempts, in milliseconds.
    pub era_retry_delay_ms: u64,
    /// Number of eras of reward points kept per validator.
    pub era_points_depth: u32,
    /// Most recent samples that make up performance.
    pub performance_window: usize,
    /// Most recent eras that make up uptime.
    pub uptime_window: usize,
    /// Reward points ceiling per era.
    pub max_points_per_era: u32,
    /// Number of validators computed concurrently per batch chunk.
    pub batch_concurrency: usize,
    /// Timeout of a single provider sub-fetch, in milliseconds.
    pub fetch_timeout_ms: u64,
    /// Timeout of one validator's statistics within a batch, in milliseconds.
    pub statistics_timeout_ms: u64,
    /// Active set ceiling used when no better source exists.
    pub max_validators_ceiling: u32,
    /// Directory for the persistent era cache. In-memory when unset.
    pub cache_dir: Option<PathBuf>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            era_max_retries: DEFAULT_ERA_MAX_RETRIES,
            era_retry_delay_ms: DEFAULT_ERA_RETRY_DELAY_MS,
            era_points_depth: DEFAULT_ERA_POINTS_DEPTH,
            performance_window: DEFAULT_PERFORMANCE_WINDOW,
            uptime_window: DEFAULT_UPTIME_WINDOW,
            max_points_per_era: DEFAULT_MAX_POINTS_PER_ERA,
            batch_concurrency: DEFAULT_BATCH_CONCURRENCY,
            fetch_timeout_ms: DEFAULT_FETCH_TIMEOUT_MS,
            statistics_timeout_ms: DEFAULT_STATISTICS_TIMEOUT_MS,
            max_validators_ceiling: DEFAULT_MAX_VALIDATORS_CEILING,
            cache_dir: None,
        }
    }
}

impl EngineConfig {
    /// Defaults, overridden by the default config file if there is one, overridden by the
    /// environment.
    pub fn new() -> Result<Self> {
        let mut config = match default_config_path() {
            Some(path) if path.exists() => Self::read_from_file(&path)?,
            _ => Self::default(),
        };
        config.merge_env();
        config.validate()?;
        info!("Engine config to be used: {:?}", config);
        Ok(config)
    }

    /// Reads a JSON config file. Missing fields take their defaults.
    pub fn read_from_file(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        let reader = BufReader::new(file);
        let config = serde_json::from_reader(reader)?;
        Ok(config)
    }

    /// Overrides fields from environment variables, ignoring ones that fail to parse.
    pub fn merge_env(&mut self) {
        if let Ok(Some(v)) = env_parse(ENV_ERA_MAX_RETRIES) {
            self.era_max_retries = v;
        }
        if let Ok(Some(v)) = env_parse(ENV_ERA_RETRY_DELAY_MS) {
            self.era_retry_delay_ms = v;
        }
        if let Ok(Some(v)) = env_parse(ENV_BATCH_CONCURRENCY) {
            self.batch_concurrency = v;
        }
        if let Ok(Some(v)) = env_parse(ENV_FETCH_TIMEOUT_MS) {
            self.fetch_timeout_ms = v;
        }
        if let Ok(Some(v)) = env_parse(ENV_STATISTICS_TIMEOUT_MS) {
            self.statistics_timeout_ms = v;
        }
        if let Ok(Some(v)) = env_parse::<PathBuf>(ENV_CACHE_DIR) {
            self.cache_dir = Some(v);
        }
    }

    /// Rejects settings the engine cannot work with.
    pub fn validate(&self) -> Result<()> {
        let zeroed = [
            ("era_max_retries", self.era_max_retries == 0),
            ("performance_window", self.performance_window == 0),
            ("uptime_window", self.uptime_window == 0),
            ("era_points_depth", self.era_points_depth == 0),
            ("max_points_per_era", self.max_points_per_era == 0),
            ("batch_concurrency", self.batch_concurrency == 0),
        ];
        if let Some((field, _)) = zeroed.iter().find(|(_, is_zero)| *is_zero) {
            return Err(Error::Configuration(format!("{field} must be greater than zero")));
        }
        Ok(())
    }

    /// Fixed delay between era resolution attempts.
    pub fn era_retry_delay(&self) -> Duration {
        Duration::from_millis(self.era_retry_delay_ms)
    }

    /// Timeout of a single provider sub-fetch.
    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_millis(self.fetch_timeout_ms)
    }

    /// Timeout of one validator's statistics within a batch.
    pub fn statistics_timeout(&self) -> Duration {
        Duration::from_millis(self.statistics_timeout_ms)
    }
}

/// `<config dir>/validator_stats/engine.config`, if a config dir can be located.
pub fn default_config_path() -> Option<PathBuf> {
    dirs_next::config_dir().map(|dir| dir.join(CONFIG_DIR_APPLICATION).join(CONFIG_FILE))
}

/// Writes a config file **for use by tests**.
#[cfg(test)]
pub(crate) fn write_config_file(config: &EngineConfig, dir: &Path) -> Result<PathBuf> {
    std::fs::create_dir_all(dir)?;
    let path = dir.join(CONFIG_FILE);
    let mut file = File::create(&path)?;
    serde_json::to_writer_pretty(&mut file, config)?;
    file.sync_all()?;
    Ok(path)
}

/// Parse environment variable. Returns `Ok(None)` if environment variable isn't set.
fn env_parse<F: FromStr>(s: &str) -> Result<Option<F>, F::Err> {
    let v = match std::env::var(s) {
        Ok(v) => v,
        Err(_) => return Ok(None),
    };

    F::from_str(&v).map(|v| Some(v))
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use eyre::Result;
    use tempfile::tempdir;

    #[test]
    fn defaults_match_documented_constants() {
        let config = EngineConfig::default();
        assert_eq!(config.era_max_retries, 6);
        assert_eq!(config.era_retry_delay(), Duration::from_millis(1500));
        assert_eq!(config.era_points_depth, 100);
        assert_eq!(config.performance_window, 20);
        assert_eq!(config.uptime_window, 10);
        assert_eq!(config.max_points_per_era, 1000);
        assert_eq!(config.batch_concurrency, 8);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn partial_config_file_keeps_defaults_for_missing_fields() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("partial.config");
        std::fs::write(&path, r#"{ "uptime_window": 5, "max_points_per_era": 2000 }"#)?;

        let config = EngineConfig::read_from_file(&path)?;
        assert_eq!(config.uptime_window, 5);
        assert_eq!(config.max_points_per_era, 2000);
        assert_eq!(config.performance_window, DEFAULT_PERFORMANCE_WINDOW);
        assert_eq!(config.cache_dir, None);
        Ok(())
    }

    #[test]
    fn written_config_reads_back() -> Result<()> {
        let dir = tempdir()?;
        let config = EngineConfig {
            batch_concurrency: 3,
            cache_dir: Some(dir.path().join("cache")),
            ..EngineConfig::default()
        };
        let path = write_config_file(&config, dir.path())?;
        assert_eq!(EngineConfig::read_from_file(&path)?, config);
        Ok(())
    }

    #[test]
    fn zero_windows_are_rejected() {
        let config = EngineConfig {
            uptime_window: 0,
            ..EngineConfig::default()
        };
        assert_matches!(config.validate(), Err(Error::Configuration(msg)) if msg.contains("uptime_window"));

        let config = EngineConfig {
            batch_concurrency: 0,
            ..EngineConfig::default()
        };
        assert_matches!(config.validate(), Err(Error::Configuration(_)));
    }

    #[test]
    fn missing_config_file_is_an_io_error() {
        let res = EngineConfig::read_from_file(Path::new("/definitely/not/here/engine.config"));
        assert_matches!(res, Err(Error::Io(_)));
    }
}
