//! Configuration module for lbot.
//!
//! Structured configuration loading from environment variables, organized by
//! concern: Backtest and Optimizer.

mod backtest_env_config;
mod optimizer_env_config;

pub use backtest_env_config::BacktestEnvConfig;
pub use optimizer_env_config::OptimizerEnvConfig;

use anyhow::{Result, anyhow};
use std::fmt;
use std::str::FromStr;

/// Variable source; the process environment in production.
pub type Lookup<'a> = &'a dyn Fn(&str) -> Option<String>;

pub(crate) fn parse_var<T>(lookup: Lookup<'_>, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    match parse_optional(lookup, key)? {
        Some(value) => Ok(value),
        None => Ok(default),
    }
}

pub(crate) fn parse_optional<T>(lookup: Lookup<'_>, key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    match lookup(key) {
        Some(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| anyhow!("Failed to parse {}: {}", key, e)),
        _ => Ok(None),
    }
}

pub(crate) fn parse_bool(lookup: Lookup<'_>, key: &str, default: bool) -> bool {
    lookup(key)
        .and_then(|raw| raw.trim().parse::<bool>().ok())
        .unwrap_or(default)
}
