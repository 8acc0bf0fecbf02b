// Copyright 2022 MaidSafe.net limited.
//
// This SAFE Network Software is licensed to you under The General Public License (GPL), version 3.
// Unless required by applicable law or agreed to in writing, the SAFE Network Software distributed
// under the GPL Licence is distributed on an "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY
// KIND, either express or implied. Please review the Licences for the specific language governing
// permissions and limitations relating to use of the SAFE Network Software.

//! Subscriber setup for applications embedding the engine.
//!
//! Engine events are emitted under the `validator_stats` target. The cache backend logs under
//! `sled`, which is kept at warnings unless `RUST_LOG` says otherwise.

use crate::{Error, Result};

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::Level;
use tracing_appender::{
    non_blocking::WorkerGuard,
    rolling::{RollingFileAppender, Rotation},
};
use tracing_core::{Event, Subscriber};
use tracing_subscriber::{
    filter::{EnvFilter, Targets},
    fmt::{
        self as tracing_fmt,
        format::Writer,
        time::{FormatTime, SystemTime},
        FmtContext, FormatEvent, FormatFields, FormattedFields,
    },
    layer::Filter,
    prelude::*,
    registry::LookupSpan,
    Layer, Registry,
};

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;
type BoxedFilter = Box<dyn Filter<Registry> + Send + Sync>;

const DEFAULT_FILE_PREFIX: &str = "validator_stats.log";

/// How often the log file is rolled over.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogRotation {
    Hourly,
    Daily,
    /// A single file named after the prefix.
    Never,
}

impl Default for LogRotation {
    fn default() -> Self {
        Self::Daily
    }
}

impl LogRotation {
    fn appender(self, dir: &Path, prefix: &str) -> RollingFileAppender {
        let rotation = match self {
            Self::Hourly => Rotation::HOURLY,
            Self::Daily => Rotation::DAILY,
            Self::Never => Rotation::NEVER,
        };
        RollingFileAppender::new(rotation, dir, prefix)
    }
}

/// Where and how the engine logs.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// 0 is errors only, 4 and up is everything.
    pub verbosity: u8,
    /// Log to files in this directory instead of stdout.
    pub log_dir: Option<PathBuf>,
    /// File name, or file name prefix when rotating.
    pub file_prefix: String,
    pub rotation: LogRotation,
    /// Write JSON lines. Only applies to file output.
    pub json_logs: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            verbosity: 2,
            log_dir: None,
            file_prefix: DEFAULT_FILE_PREFIX.to_string(),
            rotation: LogRotation::default(),
            json_logs: false,
        }
    }
}

impl LogConfig {
    /// Level for this crate's events when `RUST_LOG` is not set.
    pub fn level(&self) -> Level {
        match self.verbosity {
            0 => Level::ERROR,
            1 => Level::WARN,
            2 => Level::INFO,
            3 => Level::DEBUG,
            _ => Level::TRACE,
        }
    }

    /// The engine at the configured level, the cache backend at warnings, nothing else.
    pub fn default_targets(&self) -> Targets {
        Targets::new()
            .with_target(current_crate_str(), self.level())
            .with_target("sled", Level::WARN)
    }

    fn filter(&self) -> BoxedFilter {
        match EnvFilter::try_from_default_env() {
            Ok(filter) => Box::new(filter),
            Err(_) => Box::new(self.default_targets()),
        }
    }
}

/// Event formatter printing one header line per event followed by its span scope.
#[derive(Default, Debug)]
pub struct LogFormatter;

impl<S, N> FormatEvent<S, N> for LogFormatter
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: Writer,
        event: &Event<'_>,
    ) -> std::fmt::Result {
        let meta = event.metadata();
        SystemTime.format_time(&mut writer)?;
        write!(
            writer,
            " {:<5} [{}:L{}] ",
            meta.level(),
            meta.file().unwrap_or("unknown"),
            meta.line().unwrap_or(0),
        )?;
        ctx.field_format().format_fields(writer.by_ref(), event)?;
        writeln!(writer)?;

        if let Some(scope) = ctx.event_scope() {
            let mut spans = scope.from_root().peekable();
            if spans.peek().is_some() {
                write!(writer, "    in")?;
                for span in spans {
                    write!(writer, " {}", span.name())?;
                    if let Some(fields) = span.extensions().get::<FormattedFields<N>>() {
                        if !fields.is_empty() {
                            write!(writer, "{{{fields}}}")?;
                        }
                    }
                }
                writeln!(writer)?;
            }
        }
        Ok(())
    }
}

fn stdout_layer(config: &LogConfig) -> BoxedLayer {
    tracing_fmt::layer()
        .with_ansi(false)
        .event_format(LogFormatter)
        .with_filter(config.filter())
        .boxed()
}

fn file_layer(config: &LogConfig, dir: &Path) -> (BoxedLayer, WorkerGuard) {
    let appender = config.rotation.appender(dir, &config.file_prefix);
    let (writer, guard) = tracing_appender::non_blocking(appender);
    let layer = tracing_fmt::layer().with_ansi(false).with_writer(writer);

    let layer = if config.json_logs {
        layer.json().with_filter(config.filter()).boxed()
    } else {
        layer
            .event_format(LogFormatter)
            .with_filter(config.filter())
            .boxed()
    };
    (layer, guard)
}

/// Installs the global subscriber, returning the file writer guard if logging to files.
/// The guard must be held for as long as logs should be written, dropping it flushes them.
///
/// Fails if a global subscriber is already set.
pub fn init_logging(config: &LogConfig) -> Result<Option<WorkerGuard>> {
    let (layer, guard) = match &config.log_dir {
        Some(dir) => {
            let (layer, guard) = file_layer(config, dir);
            (layer, Some(guard))
        }
        None => (stdout_layer(config), None),
    };

    tracing_subscriber::registry()
        .with(layer)
        .try_init()
        .map_err(|error| Error::Configuration(format!("Failed to initialise logging: {error}")))?;

    if let Some(dir) = &config.log_dir {
        debug!("Logging to {dir:?} with {:?} rotation", config.rotation);
    }
    Ok(guard)
}

/// Root module name, i.e. "validator_stats".
fn current_crate_str() -> &'static str {
    let m = module_path!();
    &m[..m.find(':').unwrap_or(m.len())]
}
