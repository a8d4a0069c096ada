use crate::domain::errors::BacktestError;
use crate::domain::market::{BarTable, MarketBar};
use crate::domain::ml::Prediction;
use crate::domain::strategy::signal::SignalMode;
use crate::domain::strategy::strategy_config::StrategyConfig;
use crate::domain::trading::Side;
use std::fmt;
use tracing::debug;

/// Everything a gate may look at when deciding whether a position can open
/// on bar `index` in direction `side`.
#[derive(Debug, Clone, Copy)]
pub struct GateContext<'a> {
    pub index: usize,
    pub bar: &'a MarketBar,
    pub table: &'a BarTable,
    pub side: Side,
    pub prediction: Prediction,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockReason {
    BelowThreshold,
    DirectionDisabled,
    TooUncertain,
    AgainstTrend,
    VolatilityOutOfRange,
    WeakTrend,
    MissingIndicator,
}

impl fmt::Display for BlockReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            BlockReason::BelowThreshold => "signal below threshold",
            BlockReason::DirectionDisabled => "direction disabled",
            BlockReason::TooUncertain => "prediction too uncertain",
            BlockReason::AgainstTrend => "close on the wrong side of the trend",
            BlockReason::VolatilityOutOfRange => "volatility outside bounds",
            BlockReason::WeakTrend => "trend strength below floor",
            BlockReason::MissingIndicator => "indicator value missing",
        };
        write!(f, "{}", text)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateDecision {
    Pass,
    Block(BlockReason),
}

impl GateDecision {
    pub fn is_pass(&self) -> bool {
        matches!(self, GateDecision::Pass)
    }
}

/// One entry condition. Gates are evaluated in pipeline order and the first
/// block wins.
pub trait EntryGate: Send + Sync {
    fn name(&self) -> &str;

    fn evaluate(&self, ctx: &GateContext<'_>) -> GateDecision;

    /// Indicator column this gate reads, if any.
    fn required_column(&self) -> Option<&str> {
        None
    }
}

/// Predictor output must cross the threshold in an enabled direction.
pub struct SignalThresholdGate {
    pub mode: SignalMode,
    pub threshold: f64,
    pub use_longs: bool,
    pub use_shorts: bool,
}

impl EntryGate for SignalThresholdGate {
    fn name(&self) -> &str {
        "signal_threshold"
    }

    fn evaluate(&self, ctx: &GateContext<'_>) -> GateDecision {
        let enabled = match ctx.side {
            Side::Long => self.use_longs,
            Side::Short => self.use_shorts,
        };
        if !enabled {
            return GateDecision::Block(BlockReason::DirectionDisabled);
        }
        if self.mode.signals(ctx.side, ctx.prediction.mean, self.threshold) {
            GateDecision::Pass
        } else {
            GateDecision::Block(BlockReason::BelowThreshold)
        }
    }
}

/// Rejects predictions whose spread across stochastic passes is too wide.
pub struct UncertaintyGate {
    pub max_std: f64,
}

impl EntryGate for UncertaintyGate {
    fn name(&self) -> &str {
        "uncertainty"
    }

    fn evaluate(&self, ctx: &GateContext<'_>) -> GateDecision {
        if ctx.prediction.std <= self.max_std {
            GateDecision::Pass
        } else {
            GateDecision::Block(BlockReason::TooUncertain)
        }
    }
}

/// Longs only above the trend line, shorts only below it.
pub struct TrendGate {
    pub column: String,
}

impl EntryGate for TrendGate {
    fn name(&self) -> &str {
        "trend"
    }

    fn evaluate(&self, ctx: &GateContext<'_>) -> GateDecision {
        let Some(trend) = finite_indicator(ctx, &self.column) else {
            return GateDecision::Block(BlockReason::MissingIndicator);
        };
        let aligned = match ctx.side {
            Side::Long => ctx.bar.close > trend,
            Side::Short => ctx.bar.close < trend,
        };
        if aligned {
            GateDecision::Pass
        } else {
            GateDecision::Block(BlockReason::AgainstTrend)
        }
    }

    fn required_column(&self) -> Option<&str> {
        Some(&self.column)
    }
}

/// Normalized ATR must sit inside `[min, max]`; an absent bound is open.
pub struct VolatilityGate {
    pub column: String,
    pub min: Option<f64>,
    pub max: Option<f64>,
}

impl EntryGate for VolatilityGate {
    fn name(&self) -> &str {
        "volatility"
    }

    fn evaluate(&self, ctx: &GateContext<'_>) -> GateDecision {
        let Some(natr) = finite_indicator(ctx, &self.column) else {
            return GateDecision::Block(BlockReason::MissingIndicator);
        };
        let above_min = self.min.is_none_or(|min| natr >= min);
        let below_max = self.max.is_none_or(|max| natr <= max);
        if above_min && below_max {
            GateDecision::Pass
        } else {
            GateDecision::Block(BlockReason::VolatilityOutOfRange)
        }
    }

    fn required_column(&self) -> Option<&str> {
        Some(&self.column)
    }
}

/// ADX floor: only trade when a trend is actually present.
pub struct TrendStrengthGate {
    pub column: String,
    pub min_adx: f64,
}

impl EntryGate for TrendStrengthGate {
    fn name(&self) -> &str {
        "trend_strength"
    }

    fn evaluate(&self, ctx: &GateContext<'_>) -> GateDecision {
        match finite_indicator(ctx, &self.column) {
            Some(adx) if adx >= self.min_adx => GateDecision::Pass,
            Some(_) => GateDecision::Block(BlockReason::WeakTrend),
            None => GateDecision::Block(BlockReason::MissingIndicator),
        }
    }

    fn required_column(&self) -> Option<&str> {
        Some(&self.column)
    }
}

fn finite_indicator(ctx: &GateContext<'_>, column: &str) -> Option<f64> {
    ctx.table
        .indicator_at(column, ctx.index)
        .filter(|value| value.is_finite())
}

/// Ordered, fail-fast chain of entry gates.
pub struct GatePipeline {
    gates: Vec<Box<dyn EntryGate>>,
}

impl GatePipeline {
    pub fn new(gates: Vec<Box<dyn EntryGate>>) -> Self {
        Self { gates }
    }

    /// Builds the gate chain a strategy configuration asks for, in the fixed
    /// order: signal, uncertainty, trend, volatility, trend strength.
    pub fn from_config(config: &StrategyConfig) -> Self {
        let strategy = &config.strategy;
        let behavior = &config.behavior;
        let filters = config.filters_or_default();

        let mut gates: Vec<Box<dyn EntryGate>> = vec![Box::new(SignalThresholdGate {
            mode: strategy.signal_mode,
            threshold: strategy.prediction_threshold,
            use_longs: behavior.use_longs,
            use_shorts: behavior.use_shorts,
        })];

        if let Some(max_std) = strategy.uncertainty_threshold {
            gates.push(Box::new(UncertaintyGate { max_std }));
        }

        if behavior.use_trend_filter {
            gates.push(Box::new(TrendGate {
                column: filters.trend_column(),
            }));
        }

        if behavior.use_volatility_filter && (strategy.min_natr.is_some() || strategy.max_natr.is_some()) {
            gates.push(Box::new(VolatilityGate {
                column: filters.volatility_column(),
                min: strategy.min_natr,
                max: strategy.max_natr,
            }));
        }

        if let Some(min_adx) = strategy.min_adx {
            gates.push(Box::new(TrendStrengthGate {
                column: filters.strength_column(),
                min_adx,
            }));
        }

        Self::new(gates)
    }

    /// Fails if a gate reads an indicator column the table does not carry.
    pub fn check_columns(&self, table: &BarTable) -> Result<(), BacktestError> {
        for gate in &self.gates {
            if let Some(column) = gate.required_column()
                && !table.has_indicator(column)
            {
                return Err(BacktestError::MissingIndicator(column.to_string()));
            }
        }
        Ok(())
    }

    /// True if any gate consumes the prediction spread.
    pub fn needs_uncertainty(&self) -> bool {
        self.gates.iter().any(|gate| gate.name() == "uncertainty")
    }

    pub fn evaluate(&self, ctx: &GateContext<'_>) -> GateDecision {
        for gate in &self.gates {
            if let GateDecision::Block(reason) = gate.evaluate(ctx) {
                debug!(
                    "Bar {}: {} entry blocked by {} ({})",
                    ctx.index,
                    ctx.side,
                    gate.name(),
                    reason
                );
                return GateDecision::Block(reason);
            }
        }
        GateDecision::Pass
    }

    pub fn gate_names(&self) -> Vec<&str> {
        self.gates.iter().map(|gate| gate.name()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(closes: &[f64], trend: &[f64], natr: &[f64]) -> BarTable {
        let bars = closes
            .iter()
            .enumerate()
            .map(|(i, &close)| MarketBar::new(i as i64, close, close, close, close, 1.0))
            .collect();
        BarTable::new(bars)
            .unwrap()
            .with_indicator("ema_200", trend.to_vec())
            .unwrap()
            .with_indicator("natr_14", natr.to_vec())
            .unwrap()
    }

    fn ctx<'a>(table: &'a BarTable, index: usize, side: Side, mean: f64) -> GateContext<'a> {
        GateContext {
            index,
            bar: &table.bars()[index],
            table,
            side,
            prediction: Prediction::certain(mean),
        }
    }

    #[test]
    fn test_from_config_gate_order() {
        let mut config = StrategyConfig::new("BTC/USDT:USDT", "1h");
        config.strategy.uncertainty_threshold = Some(0.1);
        config.strategy.min_natr = Some(0.5);
        config.strategy.min_adx = Some(20.0);
        config.behavior.use_trend_filter = true;
        config.behavior.use_volatility_filter = true;

        let pipeline = GatePipeline::from_config(&config);
        assert_eq!(
            pipeline.gate_names(),
            vec!["signal_threshold", "uncertainty", "trend", "volatility", "trend_strength"]
        );
        assert!(pipeline.needs_uncertainty());
    }

    #[test]
    fn test_signal_only_by_default() {
        let config = StrategyConfig::new("BTC/USDT:USDT", "1h");
        let pipeline = GatePipeline::from_config(&config);
        assert_eq!(pipeline.gate_names(), vec!["signal_threshold"]);
        assert!(!pipeline.needs_uncertainty());
    }

    #[test]
    fn test_trend_gate() {
        let table = table(&[100.0, 90.0], &[95.0, 95.0], &[1.0, 1.0]);
        let gate = TrendGate {
            column: "ema_200".to_string(),
        };
        assert!(gate.evaluate(&ctx(&table, 0, Side::Long, 0.9)).is_pass());
        assert_eq!(
            gate.evaluate(&ctx(&table, 1, Side::Long, 0.9)),
            GateDecision::Block(BlockReason::AgainstTrend)
        );
        assert!(gate.evaluate(&ctx(&table, 1, Side::Short, 0.1)).is_pass());
    }

    #[test]
    fn test_nan_indicator_blocks() {
        let table = table(&[100.0], &[f64::NAN], &[1.0]);
        let gate = TrendGate {
            column: "ema_200".to_string(),
        };
        assert_eq!(
            gate.evaluate(&ctx(&table, 0, Side::Long, 0.9)),
            GateDecision::Block(BlockReason::MissingIndicator)
        );
    }

    #[test]
    fn test_volatility_bounds_inclusive() {
        let table = table(&[100.0, 100.0, 100.0], &[1.0; 3], &[0.5, 1.0, 2.5]);
        let gate = VolatilityGate {
            column: "natr_14".to_string(),
            min: Some(0.5),
            max: Some(2.0),
        };
        assert!(gate.evaluate(&ctx(&table, 0, Side::Long, 0.9)).is_pass());
        assert!(gate.evaluate(&ctx(&table, 1, Side::Long, 0.9)).is_pass());
        assert_eq!(
            gate.evaluate(&ctx(&table, 2, Side::Long, 0.9)),
            GateDecision::Block(BlockReason::VolatilityOutOfRange)
        );
    }

    #[test]
    fn test_pipeline_fails_fast_on_disabled_direction() {
        let mut config = StrategyConfig::new("BTC/USDT:USDT", "1h");
        config.behavior.use_shorts = false;
        let pipeline = GatePipeline::from_config(&config);
        let table = table(&[100.0], &[1.0], &[1.0]);

        assert_eq!(
            pipeline.evaluate(&ctx(&table, 0, Side::Short, 0.05)),
            GateDecision::Block(BlockReason::DirectionDisabled)
        );
        assert!(pipeline.evaluate(&ctx(&table, 0, Side::Long, 0.9)).is_pass());
    }

    #[test]
    fn test_check_columns() {
        let mut config = StrategyConfig::new("BTC/USDT:USDT", "1h");
        config.strategy.min_adx = Some(25.0);
        let pipeline = GatePipeline::from_config(&config);
        let table = table(&[100.0], &[1.0], &[1.0]);

        assert_eq!(
            pipeline.check_columns(&table),
            Err(BacktestError::MissingIndicator("adx_14".to_string()))
        );
    }
}
