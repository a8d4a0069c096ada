use crate::domain::errors::ConfigError;
use crate::domain::optimization::ParameterSet;
use crate::domain::strategy::signal::SignalMode;
use serde::{Deserialize, Serialize};

/// Parameter names `StrategyConfig::with_parameters` understands.
pub const KNOWN_PARAMETERS: &[&str] = &[
    "prediction_threshold",
    "uncertainty_threshold",
    "min_natr",
    "max_natr",
    "min_adx",
    "risk_per_trade_pct",
    "risk_reward_ratio",
    "leverage",
    "balance_fraction_pct",
    "ema_period",
    "atr_period",
    "adx_period",
    "use_longs",
    "use_shorts",
    "use_trend_filter",
    "use_volatility_filter",
];

/// Strategy configuration as persisted per symbol and timeframe.
///
/// The JSON layout (group names and field names) is shared with the live
/// trading bot and must not change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategyConfig {
    pub market: MarketConfig,
    pub strategy: StrategyParams,
    pub risk: RiskParams,
    pub behavior: BehaviorParams,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filters: Option<FilterParams>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MarketConfig {
    pub symbol: String,
    pub timeframe: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategyParams {
    pub prediction_threshold: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uncertainty_threshold: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_natr: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_natr: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_adx: Option<f64>,
    #[serde(default, skip_serializing_if = "SignalMode::is_probability")]
    pub signal_mode: SignalMode,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskParams {
    #[serde(default = "default_margin_mode")]
    pub margin_mode: String,
    #[serde(default = "default_balance_fraction_pct")]
    pub balance_fraction_pct: f64,
    pub risk_per_trade_pct: f64,
    pub risk_reward_ratio: f64,
    pub leverage: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BehaviorParams {
    #[serde(default = "default_true")]
    pub use_longs: bool,
    #[serde(default = "default_true")]
    pub use_shorts: bool,
    #[serde(default)]
    pub use_trend_filter: bool,
    #[serde(default)]
    pub use_volatility_filter: bool,
}

/// Lookback periods of the filter indicators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FilterParams {
    #[serde(default = "default_ema_period")]
    pub ema_period: usize,
    #[serde(default = "default_atr_period")]
    pub atr_period: usize,
    #[serde(default = "default_adx_period")]
    pub adx_period: usize,
}

fn default_margin_mode() -> String {
    "isolated".to_string()
}

fn default_balance_fraction_pct() -> f64 {
    100.0
}

fn default_true() -> bool {
    true
}

fn default_ema_period() -> usize {
    200
}

fn default_atr_period() -> usize {
    14
}

fn default_adx_period() -> usize {
    14
}

impl Default for FilterParams {
    fn default() -> Self {
        Self {
            ema_period: default_ema_period(),
            atr_period: default_atr_period(),
            adx_period: default_adx_period(),
        }
    }
}

impl FilterParams {
    pub fn trend_column(&self) -> String {
        format!("ema_{}", self.ema_period)
    }

    pub fn volatility_column(&self) -> String {
        format!("natr_{}", self.atr_period)
    }

    pub fn strength_column(&self) -> String {
        format!("adx_{}", self.adx_period)
    }
}

impl Default for BehaviorParams {
    fn default() -> Self {
        Self {
            use_longs: true,
            use_shorts: true,
            use_trend_filter: false,
            use_volatility_filter: false,
        }
    }
}

impl StrategyConfig {
    /// Baseline configuration for a market, matching the live bot defaults.
    pub fn new(symbol: impl Into<String>, timeframe: impl Into<String>) -> Self {
        Self {
            market: MarketConfig {
                symbol: symbol.into(),
                timeframe: timeframe.into(),
            },
            strategy: StrategyParams {
                prediction_threshold: 0.65,
                uncertainty_threshold: None,
                min_natr: None,
                max_natr: None,
                min_adx: None,
                signal_mode: SignalMode::Probability,
            },
            risk: RiskParams {
                margin_mode: default_margin_mode(),
                balance_fraction_pct: default_balance_fraction_pct(),
                risk_per_trade_pct: 1.0,
                risk_reward_ratio: 2.0,
                leverage: 10,
            },
            behavior: BehaviorParams::default(),
            filters: None,
        }
    }

    pub fn filters_or_default(&self) -> FilterParams {
        self.filters.unwrap_or_default()
    }

    /// Adverse price move (fraction) at which the stop triggers.
    pub fn stop_loss_pct(&self) -> f64 {
        self.risk.risk_per_trade_pct / 100.0 / self.risk.leverage.max(1) as f64
    }

    pub fn take_profit_pct(&self) -> f64 {
        self.stop_loss_pct() * self.risk.risk_reward_ratio
    }

    /// `config_<SYMBOL><SETTLE>_<timeframe>.json`, e.g. `config_BTCUSDTUSDT_1h.json`
    pub fn file_name(&self) -> String {
        let symbol: String = self
            .market
            .symbol
            .chars()
            .filter(|c| *c != '/' && *c != ':')
            .collect();
        format!("config_{}_{}.json", symbol, self.market.timeframe)
    }

    /// Applies a sampled parameter set on top of this configuration.
    pub fn with_parameters(&self, params: &ParameterSet) -> Result<Self, ConfigError> {
        let mut config = self.clone();

        for (name, value) in params.iter() {
            let float = || {
                value.as_f64().ok_or_else(|| ConfigError::ParameterType {
                    name: name.clone(),
                    expected: "number",
                })
            };
            let integer = || {
                value.as_i64().ok_or_else(|| ConfigError::ParameterType {
                    name: name.clone(),
                    expected: "integer",
                })
            };
            let flag = || {
                value.as_bool().ok_or_else(|| ConfigError::ParameterType {
                    name: name.clone(),
                    expected: "boolean",
                })
            };
            let period = || {
                let raw = integer()?;
                usize::try_from(raw).map_err(|_| {
                    ConfigError::Validation(format!("{} must be positive, got {}", name, raw))
                })
            };

            match name.as_str() {
                "prediction_threshold" => config.strategy.prediction_threshold = float()?,
                "uncertainty_threshold" => config.strategy.uncertainty_threshold = Some(float()?),
                "min_natr" => config.strategy.min_natr = Some(float()?),
                "max_natr" => config.strategy.max_natr = Some(float()?),
                "min_adx" => config.strategy.min_adx = Some(float()?),
                "risk_per_trade_pct" => config.risk.risk_per_trade_pct = float()?,
                "risk_reward_ratio" => config.risk.risk_reward_ratio = float()?,
                "balance_fraction_pct" => config.risk.balance_fraction_pct = float()?,
                "leverage" => {
                    let raw = integer()?;
                    config.risk.leverage = u32::try_from(raw).map_err(|_| {
                        ConfigError::Validation(format!("leverage must be >= 1, got {}", raw))
                    })?;
                }
                "ema_period" => config.filters.get_or_insert_with(FilterParams::default).ema_period = period()?,
                "atr_period" => config.filters.get_or_insert_with(FilterParams::default).atr_period = period()?,
                "adx_period" => config.filters.get_or_insert_with(FilterParams::default).adx_period = period()?,
                "use_longs" => config.behavior.use_longs = flag()?,
                "use_shorts" => config.behavior.use_shorts = flag()?,
                "use_trend_filter" => config.behavior.use_trend_filter = flag()?,
                "use_volatility_filter" => config.behavior.use_volatility_filter = flag()?,
                _ => return Err(ConfigError::UnknownParameter(name.clone())),
            }
        }

        Ok(config)
    }

    /// Rejects combinations that can never produce a meaningful backtest.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let strategy = &self.strategy;
        let risk = &self.risk;

        let threshold = strategy.prediction_threshold;
        match strategy.signal_mode {
            SignalMode::Probability if !(threshold > 0.0 && threshold < 1.0) => {
                return Err(ConfigError::Validation(format!(
                    "prediction_threshold must be in (0, 1), got {}",
                    threshold
                )));
            }
            SignalMode::Regression if !(threshold.is_finite() && threshold >= 0.0) => {
                return Err(ConfigError::Validation(format!(
                    "prediction_threshold must be >= 0, got {}",
                    threshold
                )));
            }
            _ => {}
        }

        for (name, value) in [
            ("uncertainty_threshold", strategy.uncertainty_threshold),
            ("min_natr", strategy.min_natr),
            ("max_natr", strategy.max_natr),
            ("min_adx", strategy.min_adx),
        ] {
            if let Some(value) = value
                && !(value.is_finite() && value >= 0.0)
            {
                return Err(ConfigError::Validation(format!(
                    "{} must be a non-negative number, got {}",
                    name, value
                )));
            }
        }

        if let (Some(min), Some(max)) = (strategy.min_natr, strategy.max_natr)
            && max <= min
        {
            return Err(ConfigError::Validation(format!(
                "max_natr ({}) must be greater than min_natr ({})",
                max, min
            )));
        }

        if risk.leverage < 1 {
            return Err(ConfigError::Validation(format!(
                "leverage must be >= 1, got {}",
                risk.leverage
            )));
        }

        if !(risk.risk_per_trade_pct.is_finite() && risk.risk_per_trade_pct > 0.0) {
            return Err(ConfigError::Validation(format!(
                "risk_per_trade_pct must be > 0, got {}",
                risk.risk_per_trade_pct
            )));
        }

        if !(risk.risk_reward_ratio.is_finite() && risk.risk_reward_ratio > 0.0) {
            return Err(ConfigError::Validation(format!(
                "risk_reward_ratio must be > 0, got {}",
                risk.risk_reward_ratio
            )));
        }

        if !(risk.balance_fraction_pct > 0.0 && risk.balance_fraction_pct <= 100.0) {
            return Err(ConfigError::Validation(format!(
                "balance_fraction_pct must be in (0, 100], got {}",
                risk.balance_fraction_pct
            )));
        }

        // The stop must sit strictly between entry and zero
        if self.stop_loss_pct() >= 1.0 {
            return Err(ConfigError::Validation(format!(
                "stop distance {:.4} is not below 100%",
                self.stop_loss_pct()
            )));
        }

        if !self.behavior.use_longs && !self.behavior.use_shorts {
            return Err(ConfigError::Validation(
                "at least one of use_longs/use_shorts must be enabled".to_string(),
            ));
        }

        if let Some(filters) = &self.filters
            && (filters.ema_period == 0 || filters.atr_period == 0 || filters.adx_period == 0)
        {
            return Err(ConfigError::Validation(
                "indicator periods must be >= 1".to_string(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::optimization::ParamValue;

    const LIVE_CONFIG: &str = r#"{
        "market": {"symbol": "BTC/USDT:USDT", "timeframe": "1h"},
        "strategy": {"prediction_threshold": 0.7},
        "risk": {
            "margin_mode": "isolated",
            "balance_fraction_pct": 100,
            "risk_per_trade_pct": 1.5,
            "risk_reward_ratio": 2.5,
            "leverage": 12
        },
        "behavior": {"use_longs": true, "use_shorts": false}
    }"#;

    #[test]
    fn test_parse_live_config() {
        let config: StrategyConfig = serde_json::from_str(LIVE_CONFIG).unwrap();
        assert_eq!(config.market.symbol, "BTC/USDT:USDT");
        assert_eq!(config.risk.leverage, 12);
        assert!(!config.behavior.use_shorts);
        assert!(!config.behavior.use_trend_filter);
        assert!(config.filters.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_missing_group_is_an_error() {
        let without_risk = r#"{
            "market": {"symbol": "ETH/USDT:USDT", "timeframe": "4h"},
            "strategy": {"prediction_threshold": 0.7},
            "behavior": {"use_longs": true, "use_shorts": true}
        }"#;
        assert!(serde_json::from_str::<StrategyConfig>(without_risk).is_err());
    }

    #[test]
    fn test_file_name_strips_separators() {
        let config: StrategyConfig = serde_json::from_str(LIVE_CONFIG).unwrap();
        assert_eq!(config.file_name(), "config_BTCUSDTUSDT_1h.json");
    }

    #[test]
    fn test_default_signal_mode_not_persisted() {
        let mut config = StrategyConfig::new("BTC/USDT:USDT", "1h");
        let json = serde_json::to_value(&config).unwrap();
        assert!(json["strategy"].get("signal_mode").is_none());

        config.strategy.signal_mode = SignalMode::Regression;
        let json = serde_json::to_value(&config).unwrap();
        assert_eq!(json["strategy"]["signal_mode"], "regression");
        let back: StrategyConfig = serde_json::from_value(json).unwrap();
        assert_eq!(back.strategy.signal_mode, SignalMode::Regression);
    }

    #[test]
    fn test_stop_and_target_distances() {
        let mut config = StrategyConfig::new("BTC/USDT:USDT", "1h");
        config.risk.risk_per_trade_pct = 1.0;
        config.risk.leverage = 10;
        config.risk.risk_reward_ratio = 2.0;
        assert!((config.stop_loss_pct() - 0.001).abs() < 1e-12);
        assert!((config.take_profit_pct() - 0.002).abs() < 1e-12);
    }

    #[test]
    fn test_with_parameters() {
        let base = StrategyConfig::new("BTC/USDT:USDT", "1h");
        let mut params = ParameterSet::new();
        params.insert("prediction_threshold", ParamValue::Float(0.72));
        params.insert("leverage", ParamValue::Int(15));
        params.insert("ema_period", ParamValue::Int(100));
        params.insert("use_trend_filter", ParamValue::Bool(true));

        let config = base.with_parameters(&params).unwrap();
        assert_eq!(config.strategy.prediction_threshold, 0.72);
        assert_eq!(config.risk.leverage, 15);
        assert_eq!(config.filters_or_default().ema_period, 100);
        assert_eq!(config.filters_or_default().atr_period, 14);
        assert!(config.behavior.use_trend_filter);
    }

    #[test]
    fn test_unknown_parameter_rejected() {
        let base = StrategyConfig::new("BTC/USDT:USDT", "1h");
        let mut params = ParameterSet::new();
        params.insert("moon_phase", ParamValue::Float(0.5));
        assert_eq!(
            base.with_parameters(&params).unwrap_err(),
            ConfigError::UnknownParameter("moon_phase".to_string())
        );
    }

    #[test]
    fn test_natr_bounds_must_be_ordered() {
        let mut config = StrategyConfig::new("BTC/USDT:USDT", "1h");
        config.strategy.min_natr = Some(2.0);
        config.strategy.max_natr = Some(1.0);
        assert!(config.validate().is_err());

        config.strategy.max_natr = Some(2.0);
        assert!(config.validate().is_err());

        config.strategy.max_natr = Some(3.0);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_negative_leverage_parameter_rejected() {
        let base = StrategyConfig::new("BTC/USDT:USDT", "1h");
        let mut params = ParameterSet::new();
        params.insert("leverage", ParamValue::Int(-3));
        assert!(base.with_parameters(&params).is_err());

        params.insert("leverage", ParamValue::Int(0));
        let config = base.with_parameters(&params).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_requires_a_direction() {
        let mut config = StrategyConfig::new("BTC/USDT:USDT", "1h");
        config.behavior.use_longs = false;
        config.behavior.use_shorts = false;
        assert!(config.validate().is_err());
    }
}
