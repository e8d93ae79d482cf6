#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

use thiserror::Error;

#[derive(Error, Debug)]
pub enum EnvUsizeError {
    #[error(transparent)]
    Var(#[from] std::env::VarError),
    #[error(transparent)]
    ParseInt(#[from] std::num::ParseIntError),
}

/// # Errors
///
/// * If the environment variable is missing
/// * If encounters an invalid digit in the value
pub fn env_usize(name: &str) -> Result<usize, EnvUsizeError> {
    Ok(std::env::var(name)?.trim().parse::<usize>()?)
}

#[derive(Error, Debug)]
pub enum DefaultEnvUsizeError {
    #[error("Invalid value for {name}: {source}")]
    ParseInt {
        name: String,
        source: std::num::ParseIntError,
    },
}

/// # Errors
///
/// * If encounters an invalid digit in the value
pub fn default_env_usize(name: &str, default: usize) -> Result<usize, DefaultEnvUsizeError> {
    match std::env::var(name) {
        Ok(value) => value
            .trim()
            .parse::<usize>()
            .map_err(|source| DefaultEnvUsizeError::ParseInt {
                name: name.to_string(),
                source,
            }),
        Err(_) => Ok(default),
    }
}

/// # Errors
///
/// * If encounters an invalid digit in the value
pub fn default_env_u64(name: &str, default: u64) -> Result<u64, DefaultEnvUsizeError> {
    match option_env_u64(name) {
        Ok(value) => Ok(value.unwrap_or(default)),
        Err(OptionEnvUsizeError::ParseInt { name, source }) => {
            Err(DefaultEnvUsizeError::ParseInt { name, source })
        }
    }
}

#[derive(Error, Debug)]
pub enum OptionEnvUsizeError {
    #[error("Invalid value for {name}: {source}")]
    ParseInt {
        name: String,
        source: std::num::ParseIntError,
    },
}

/// # Errors
///
/// * If encounters an invalid digit in the value
pub fn option_env_u64(name: &str) -> Result<Option<u64>, OptionEnvUsizeError> {
    match std::env::var(name) {
        Ok(value) if value.trim().is_empty() => Ok(None),
        Ok(value) => value
            .trim()
            .parse::<u64>()
            .map(Some)
            .map_err(|source| OptionEnvUsizeError::ParseInt {
                name: name.to_string(),
                source,
            }),
        Err(_) => Ok(None),
    }
}

#[must_use]
pub fn default_env(name: &str, default: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| default.to_string())
}

#[must_use]
pub fn option_env(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|x| !x.trim().is_empty())
}
