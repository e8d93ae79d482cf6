#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

use std::path::PathBuf;

use free_log_client::FreeLogLayer;
pub use log;
use thiserror::Error;
use turnstile_env_utils::{default_env, option_env};

pub use free_log_client;

#[cfg(feature = "macros")]
mod macros;

#[cfg(debug_assertions)]
pub const DEFAULT_LOG_LEVEL: &str = "turnstile=trace";
#[cfg(not(debug_assertions))]
pub const DEFAULT_LOG_LEVEL: &str = "turnstile=info";

/// Directory that receives log files when a filename is passed to [`init`].
pub const LOG_DIR_ENV_VAR: &str = "TURNSTILE_LOG_DIR";

#[derive(Debug, Error)]
pub enum InitError {
    #[error(transparent)]
    Logs(#[from] free_log_client::LogsInitError),
    #[error(transparent)]
    BuildLogsConfig(#[from] free_log_client::BuildLogsConfigError),
    #[error(transparent)]
    BuildFileWriterConfig(#[from] free_log_client::BuildFileWriterConfigError),
    #[error(transparent)]
    IO(#[from] std::io::Error),
}

/// Filter directive: `TURNSTILE_LOG`, then `RUST_LOG`, then
/// [`DEFAULT_LOG_LEVEL`].
#[must_use]
pub fn env_filter() -> String {
    default_env("TURNSTILE_LOG", &default_env("RUST_LOG", DEFAULT_LOG_LEVEL))
}

#[must_use]
pub fn log_dir() -> Option<PathBuf> {
    option_env(LOG_DIR_ENV_VAR).map(PathBuf::from)
}

/// # Errors
///
/// * If the log directory cannot be created
/// * If the file writer or logger fails to initialize
pub fn init(filename: Option<&str>) -> Result<FreeLogLayer, InitError> {
    let mut logs_config = free_log_client::LogsConfig::builder();

    if let Some(filename) = filename {
        if let Some(log_dir) = log_dir() {
            std::fs::create_dir_all(&log_dir)?;
            logs_config = logs_config.with_file_writer(
                free_log_client::FileWriterConfig::builder()
                    .file_path(log_dir.join(filename))
                    .log_level(free_log_client::Level::Debug),
            )?;
        } else {
            log::warn!("{LOG_DIR_ENV_VAR} is not set, not writing {filename}");
        }
    }

    let layer = free_log_client::init(logs_config.env_filter(env_filter().as_str()))?;

    Ok(layer)
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use serial_test::serial;

    use super::*;

    #[test_log::test]
    #[serial]
    fn env_filter_prefers_turnstile_log() {
        // SAFETY: serialized with every other env-mutating test
        unsafe {
            std::env::set_var("TURNSTILE_LOG", "turnstile=warn");
            std::env::set_var("RUST_LOG", "debug");
        }

        assert_eq!(env_filter(), "turnstile=warn");

        unsafe {
            std::env::remove_var("TURNSTILE_LOG");
        }

        assert_eq!(env_filter(), "debug");

        unsafe {
            std::env::remove_var("RUST_LOG");
        }

        assert_eq!(env_filter(), DEFAULT_LOG_LEVEL);
    }

    #[test_log::test]
    #[serial]
    fn log_dir_is_none_when_unset() {
        unsafe { std::env::remove_var(LOG_DIR_ENV_VAR) };

        assert_eq!(log_dir(), None);
    }
}
