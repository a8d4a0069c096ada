use crate::application::features::FeaturePipeline;
use crate::domain::errors::FeatureError;
use crate::domain::market::BarTable;
use crate::domain::ml::{FeatureScaler, Predictor};
use crate::domain::strategy::FilterParams;
use crate::domain::trading::TradingCosts;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::debug;

/// Price source used to detect stop-loss and take-profit hits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExitPriceMode {
    /// Bar high/low; stop checked before target
    #[default]
    Intrabar,
    /// Bar close only
    Close,
}

impl FromStr for ExitPriceMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "intrabar" => Ok(ExitPriceMode::Intrabar),
            "close" => Ok(ExitPriceMode::Close),
            other => Err(format!("Unknown exit price mode: {}", other)),
        }
    }
}

impl fmt::Display for ExitPriceMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExitPriceMode::Intrabar => write!(f, "intrabar"),
            ExitPriceMode::Close => write!(f, "close"),
        }
    }
}

/// Run-wide simulation settings shared by every trial.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineSettings {
    pub fee_rate: f64,
    pub slippage_rate: f64,
    pub sequence_length: usize,
    pub start_capital: f64,
    pub exit_mode: ExitPriceMode,
    /// Sample unrealized equity every bar for drawdown purposes
    pub mark_to_market: bool,
    /// Stochastic passes per prediction when an uncertainty gate is active
    pub uncertainty_samples: usize,
    pub trial_timeout: Option<Duration>,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            fee_rate: 0.0005,
            slippage_rate: 0.0005,
            sequence_length: 24,
            start_capital: 1000.0,
            exit_mode: ExitPriceMode::Intrabar,
            mark_to_market: false,
            uncertainty_samples: 30,
            trial_timeout: None,
        }
    }
}

impl EngineSettings {
    pub fn costs(&self) -> TradingCosts {
        TradingCosts::new(self.fee_rate, self.slippage_rate)
    }
}

/// Immutable inputs shared by every trial of a study.
///
/// Tables for non-default indicator periods are derived on demand and cached
/// per distinct period combination.
pub struct SimulationContext {
    pub table: Arc<BarTable>,
    pub predictor: Arc<dyn Predictor>,
    pub scaler: Option<Arc<dyn FeatureScaler>>,
    pub settings: EngineSettings,
    variants: Mutex<HashMap<FilterParams, Arc<BarTable>>>,
}

impl SimulationContext {
    pub fn new(table: BarTable, predictor: Arc<dyn Predictor>, settings: EngineSettings) -> Self {
        Self {
            table: Arc::new(table),
            predictor,
            scaler: None,
            settings,
            variants: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_scaler(mut self, scaler: Arc<dyn FeatureScaler>) -> Self {
        self.scaler = Some(scaler);
        self
    }

    /// Table carrying the filter indicators for `filters`.
    pub fn table_for(&self, filters: &FilterParams) -> Result<Arc<BarTable>, FeatureError> {
        let has_all = self.table.has_indicator(&filters.trend_column())
            && self.table.has_indicator(&filters.volatility_column())
            && self.table.has_indicator(&filters.strength_column());
        if has_all {
            return Ok(Arc::clone(&self.table));
        }

        if let Some(cached) = self.lock_variants().get(filters) {
            return Ok(Arc::clone(cached));
        }

        // Built outside the lock; two workers racing on the same periods
        // produce identical tables
        let extended = Arc::new(FeaturePipeline::extend_with_filters(&self.table, filters)?);
        debug!(
            "Derived indicator table for ema={} atr={} adx={}",
            filters.ema_period, filters.atr_period, filters.adx_period
        );

        Ok(Arc::clone(
            self.lock_variants()
                .entry(*filters)
                .or_insert(extended),
        ))
    }

    pub fn cached_variants(&self) -> usize {
        self.lock_variants().len()
    }

    fn lock_variants(&self) -> std::sync::MutexGuard<'_, HashMap<FilterParams, Arc<BarTable>>> {
        // A poisoned cache only ever holds fully built tables
        self.variants
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_mode_from_str() {
        assert_eq!("Intrabar".parse::<ExitPriceMode>(), Ok(ExitPriceMode::Intrabar));
        assert_eq!("close".parse::<ExitPriceMode>(), Ok(ExitPriceMode::Close));
        assert!("vwap".parse::<ExitPriceMode>().is_err());
    }

    #[test]
    fn test_default_settings() {
        let settings = EngineSettings::default();
        assert_eq!(settings.exit_mode, ExitPriceMode::Intrabar);
        assert!(!settings.mark_to_market);
        assert_eq!(settings.costs(), TradingCosts::new(0.0005, 0.0005));
    }
}
