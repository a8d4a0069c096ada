//! JSON persistence for strategy configurations and study results.
//!
//! Layout of the output directory:
//! - `config_<SYMBOL><SETTLE>_<tf>.json`: one strategy config per market
//! - `<results file>`: list of exported `StrategyResult` entries
//! - `approved_strategies.json`: markets selected for live trading

use crate::domain::optimization::{ApprovedStrategies, StrategyResult};
use crate::domain::strategy::StrategyConfig;
use anyhow::{Context, Result};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

pub const APPROVED_STRATEGIES_FILE: &str = "approved_strategies.json";

/// Handles persistence of strategy artifacts under one directory.
pub struct StrategyStore {
    dir: PathBuf,
}

impl StrategyStore {
    pub fn new(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        if !dir.exists() {
            fs::create_dir_all(&dir).context(format!("Failed to create directory {:?}", dir))?;
        }
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn config_path(&self, config: &StrategyConfig) -> PathBuf {
        self.dir.join(config.file_name())
    }

    /// Writes the config under its canonical file name.
    pub fn save_config(&self, config: &StrategyConfig) -> Result<PathBuf> {
        let path = self.config_path(config);
        write_json(&path, config)?;
        info!("Saved strategy config to {:?}", path);
        Ok(path)
    }

    /// Loads and validates a strategy config. Missing groups are fatal.
    pub fn load_config(path: impl AsRef<Path>) -> Result<StrategyConfig> {
        let path = path.as_ref();
        let config: StrategyConfig = read_json(path)?;
        config
            .validate()
            .context(format!("Invalid strategy config in {:?}", path))?;
        Ok(config)
    }

    /// Appends `result` to the results file, replacing an earlier entry for
    /// the same market.
    pub fn upsert_result(&self, file_name: &str, result: StrategyResult) -> Result<PathBuf> {
        let path = self.dir.join(file_name);
        let mut results = if path.exists() {
            Self::load_results(&path)?
        } else {
            Vec::new()
        };

        results.retain(|r| !(r.symbol == result.symbol && r.timeframe == result.timeframe));
        results.push(result);

        write_json(&path, &results)?;
        info!("Saved {} results to {:?}", results.len(), path);
        Ok(path)
    }

    pub fn load_results(path: impl AsRef<Path>) -> Result<Vec<StrategyResult>> {
        read_json(path.as_ref())
    }

    pub fn save_approved(&self, approved: &ApprovedStrategies) -> Result<PathBuf> {
        let path = self.dir.join(APPROVED_STRATEGIES_FILE);
        write_json(&path, approved)?;
        info!(
            "Saved {} approved strategies to {:?}",
            approved.approved_strategies.len(),
            path
        );
        Ok(path)
    }
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let content = fs::read_to_string(path).context(format!("Failed to read {:?}", path))?;
    serde_json::from_str(&content).context(format!("Failed to parse JSON in {:?}", path))
}

fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    let content = serde_json::to_string_pretty(value).context("Failed to serialize JSON")?;

    // Atomic write: write to temp file then rename
    let temp_path = path.with_extension("tmp");
    fs::write(&temp_path, content).context("Failed to write temp file")?;
    fs::rename(&temp_path, path).context("Failed to rename temp file")?;
    Ok(())
}
