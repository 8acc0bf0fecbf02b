// Copyright 2022 MaidSafe.net limited.
//
// This SAFE Network Software is licensed to you under The General Public License (GPL), version 3.
// Unless required by applicable law or agreed to in writing, the SAFE Network Software distributed
// under the GPL Licence is distributed on an "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY
// KIND, either express or implied. Please review the Licences for the specific language governing
// permissions and limitations relating to use of the SAFE Network Software.

use validator_stats::{
    init_logging,
    test_utils::{test_address, MockProvider},
    EngineConfig, LogConfig, LogRotation, NetworkId, ValidatorEngine,
};

use eyre::{eyre, Result};
use std::{fs, sync::Arc};
use tempfile::tempdir;

// Installs the global subscriber, so this is the only test in this binary.
#[tokio::test]
async fn engine_events_are_written_to_the_log_file() -> Result<()> {
    let tmp_dir = tempdir()?;
    let config = LogConfig {
        log_dir: Some(tmp_dir.path().to_path_buf()),
        file_prefix: "engine.log".to_string(),
        rotation: LogRotation::Never,
        ..LogConfig::default()
    };
    let guard = init_logging(&config)?.ok_or_else(|| eyre!("file logging returned no guard"))?;

    let provider = MockProvider::new()
        .with_era(5)
        .with_validator(&test_address(1), 10_000_000, false);
    let engine = ValidatorEngine::in_memory(Arc::new(provider), EngineConfig::default(), NetworkId::Local)?;
    let _ = engine.directory_for_era(5).await?;

    // a second subscriber cannot be installed
    assert!(init_logging(&LogConfig::default()).is_err());

    // flushes the non-blocking writer
    drop(guard);

    let logs = fs::read_to_string(tmp_dir.path().join("engine.log"))?;
    assert!(logs.contains("Fetched 1 validators for"));
    assert!(logs.contains("INFO"));
    Ok(())
}
