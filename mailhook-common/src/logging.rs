use std::{
    fs::{self, OpenOptions},
    path::PathBuf,
    str::FromStr,
    sync::Mutex,
};

use anyhow::Context as _;
use serde::Deserialize;
use tracing::metadata::LevelFilter;
use tracing_subscriber::{
    Layer, filter::FilterFn, prelude::__tracing_subscriber_SubscriberExt, util::SubscriberInitExt,
};

#[macro_export]
macro_rules! log {
    ($level:expr, $span:expr, $($msg:expr),*) => {{
        let span = $crate::tracing::span!($level, $span);
        let _enter = span.enter();

        $crate::tracing::event!($level, $($msg),*)
    }};
}

#[macro_export]
macro_rules! outgoing {
    (level = $level:ident, $($msg:expr),*) => {
        $crate::log!($crate::tracing::Level::$level, "outgoing", $($msg),*)
    };

    ($($msg:expr),*) => {
        $crate::outgoing!(level = TRACE, $($msg),*)
    };
}

#[macro_export]
macro_rules! incoming {
    (level = $level:ident, $($msg:expr),*) => {
        $crate::log!($crate::tracing::Level::$level, "incoming", $($msg),*)
    };

    ($($msg:expr),*) => {
        $crate::incoming!(level = TRACE, $($msg),*)
    };
}

#[macro_export]
macro_rules! internal {
    (level = $level:ident, $($msg:expr),*) => {
        $crate::log!($crate::tracing::Level::$level, "internal", $($msg),*)
    };

    ($($msg:expr),*) => {
        $crate::internal!(level = TRACE, $($msg),*)
    };
}

const TARGET_PREFIX: &str = "mailhook";

fn default_directory() -> Option<PathBuf> {
    Some(PathBuf::from("./logs"))
}

fn default_file_name() -> String {
    String::from("mailhook.log")
}

/// Where, and how verbosely, the gateway logs.
#[derive(Debug, Clone, Deserialize)]
pub struct LogConfig {
    /// Directory receiving a plain-text copy of the log stream. `None` logs to stdout only.
    #[serde(default = "default_directory")]
    pub directory: Option<PathBuf>,
    #[serde(default = "default_file_name")]
    pub file_name: String,
    /// Set from the command line, never from the config file.
    #[serde(skip)]
    pub debug: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            directory: default_directory(),
            file_name: default_file_name(),
            debug: false,
        }
    }
}

impl LogConfig {
    #[must_use]
    pub const fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    #[must_use]
    pub fn with_directory(mut self, directory: Option<PathBuf>) -> Self {
        self.directory = directory;
        self
    }

    /// The file the log stream is appended to, if any.
    #[must_use]
    pub fn file_path(&self) -> Option<PathBuf> {
        self.directory
            .as_ref()
            .map(|directory| directory.join(&self.file_name))
    }
}

/// Picks the level filter: the debug flag wins, then `LOG_LEVEL`, then the build default.
pub(crate) fn resolve_level(debug: bool, requested: Option<&str>) -> LevelFilter {
    let default = if cfg!(debug_assertions) {
        LevelFilter::TRACE
    } else {
        LevelFilter::INFO
    };

    if debug {
        return LevelFilter::DEBUG;
    }

    requested.map_or(default, |level| {
        LevelFilter::from_str(level).unwrap_or_else(|_| {
            eprintln!("Invalid log level specified {level}, defaulting to {default}");
            default
        })
    })
}

fn ours(metadata: &tracing::Metadata<'_>) -> bool {
    metadata.target().starts_with(TARGET_PREFIX)
}

///
/// Install the global subscriber.
///
/// # Errors
/// If the log directory cannot be created, or the log file cannot be opened for appending.
///
pub fn init(config: &LogConfig) -> anyhow::Result<()> {
    let level = resolve_level(config.debug, std::env::var("LOG_LEVEL").ok().as_deref());

    let file_layer = match config.file_path() {
        Some(path) => {
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent).with_context(|| {
                    format!("Unable to create log directory {}", parent.display())
                })?;
            }

            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(&path)
                .with_context(|| format!("Unable to open log file {}", path.display()))?;

            Some(
                tracing_subscriber::fmt::layer()
                    .with_ansi(false)
                    .with_target(false)
                    .with_timer(tracing_subscriber::fmt::time::ChronoUtc::rfc_3339())
                    .with_writer(Mutex::new(file))
                    .with_filter(level)
                    .with_filter(FilterFn::new(ours)),
            )
        }
        None => None,
    };

    let installed = tracing_subscriber::Registry::default()
        .with(
            tracing_subscriber::fmt::layer()
                .with_file(false)
                .with_line_number(false)
                .compact()
                .with_ansi(true)
                .with_timer(tracing_subscriber::fmt::time::ChronoUtc::rfc_3339())
                .with_filter(level)
                .with_filter(FilterFn::new(ours)),
        )
        .with(file_layer)
        .try_init();

    if installed.is_err() {
        tracing::debug!("A global subscriber is already installed, keeping it");
    }

    Ok(())
}
