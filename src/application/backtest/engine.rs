//! Bar-by-bar replay of a strategy configuration over a bar table.
//!
//! The first `sequence_length` bars are lookback only. On every later bar the
//! engine first resolves an open position against the bar, then (if flat)
//! asks the predictor for a signal on the preceding window and runs the entry
//! gates. At most one position is open at any time; a position still open
//! when the data ends is not counted.

use crate::application::backtest::context::{EngineSettings, ExitPriceMode, SimulationContext};
use crate::domain::errors::{BacktestError, PredictorError};
use crate::domain::market::{BarTable, FeatureWindow};
use crate::domain::ml::{FeatureScaler, Prediction, Predictor};
use crate::domain::performance::{BacktestMetrics, EquityCurve};
use crate::domain::strategy::{GateContext, GatePipeline, StrategyConfig};
use crate::domain::trading::{Side, SimulatedPosition, TradeRecord, TradingCosts};
use std::time::Instant;
use tracing::debug;

/// Bars between two wall-clock deadline checks
const DEADLINE_CHECK_INTERVAL: usize = 1024;

/// Full outcome of one replay.
#[derive(Debug, Clone, PartialEq)]
pub struct BacktestReport {
    pub metrics: BacktestMetrics,
    pub trades: Vec<TradeRecord>,
    pub equity_curve: EquityCurve,
    /// Position left open when the data ran out
    pub open_position: Option<SimulatedPosition>,
    pub liquidated: bool,
}

impl BacktestReport {
    fn empty(start_capital: f64) -> Self {
        Self {
            metrics: BacktestMetrics::zero(start_capital),
            trades: Vec::new(),
            equity_curve: EquityCurve::new(start_capital),
            open_position: None,
            liquidated: false,
        }
    }
}

pub struct BacktestEngine {
    settings: EngineSettings,
    costs: TradingCosts,
}

impl BacktestEngine {
    pub fn new(settings: EngineSettings) -> Self {
        let costs = settings.costs();
        Self { settings, costs }
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    /// Replays `config` and returns only the metrics.
    pub fn run(
        &self,
        table: &BarTable,
        predictor: &dyn Predictor,
        scaler: Option<&dyn FeatureScaler>,
        config: &StrategyConfig,
    ) -> Result<BacktestMetrics, BacktestError> {
        self.run_detailed(table, predictor, scaler, config)
            .map(|report| report.metrics)
    }

    /// Replays `config` against the shared context, deriving indicator
    /// columns for non-default filter periods when needed.
    pub fn run_in_context(
        &self,
        context: &SimulationContext,
        config: &StrategyConfig,
    ) -> Result<BacktestReport, BacktestError> {
        let table = context.table_for(&config.filters_or_default())?;
        self.run_detailed(
            &table,
            context.predictor.as_ref(),
            context.scaler.as_deref(),
            config,
        )
    }

    pub fn run_detailed(
        &self,
        table: &BarTable,
        predictor: &dyn Predictor,
        scaler: Option<&dyn FeatureScaler>,
        config: &StrategyConfig,
    ) -> Result<BacktestReport, BacktestError> {
        let start_capital = self.settings.start_capital;
        let sequence_length = self.settings.sequence_length;

        if table.is_empty() || table.len() < sequence_length {
            debug!(
                "Backtest skipped: {} bars for a lookback of {}",
                table.len(),
                sequence_length
            );
            return Ok(BacktestReport::empty(start_capital));
        }

        let gates = GatePipeline::from_config(config);
        gates.check_columns(table)?;
        let needs_uncertainty = gates.needs_uncertainty();

        let leverage = config.risk.leverage.max(1) as f64;
        let fraction = config.risk.balance_fraction_pct / 100.0;
        let stop_loss_pct = config.stop_loss_pct();
        let take_profit_pct = config.take_profit_pct();

        let mut capital = start_capital;
        let mut equity_curve = EquityCurve::new(start_capital);
        let mut drawdown_samples = vec![start_capital];
        let mut trades: Vec<TradeRecord> = Vec::new();
        let mut position: Option<SimulatedPosition> = None;
        let mut liquidated = false;
        let started = Instant::now();

        for i in sequence_length..table.len() {
            if let Some(budget) = self.settings.trial_timeout
                && i % DEADLINE_CHECK_INTERVAL == 0
                && started.elapsed() > budget
            {
                return Err(BacktestError::Timeout {
                    budget_ms: budget.as_millis() as u64,
                    bar_index: i,
                });
            }

            let Some(bar) = table.bar(i) else {
                break;
            };

            // 1. Resolve the open position against this bar
            if let Some(open) = position.as_mut() {
                let exit = match self.settings.exit_mode {
                    ExitPriceMode::Intrabar => open.exit_intrabar(bar),
                    ExitPriceMode::Close => open.exit_on_close(bar.close),
                };

                match exit {
                    Some((reason, level)) => {
                        let fill = self.costs.exit_fill(level, open.side);
                        open.close(i, fill, reason);

                        let margin = capital * fraction;
                        let gross_pnl = margin * open.price_move_pct(fill) * leverage;
                        let fees = self.costs.entry_fee(margin, leverage)
                            + self.costs.exit_fee(margin, gross_pnl, leverage);
                        let equity_after = (capital + gross_pnl - fees).max(0.0);

                        if let Some(trade) =
                            TradeRecord::from_closed(open, capital, gross_pnl, fees, equity_after)
                        {
                            debug!(
                                "Bar {}: closed {} at {:.4} ({}), equity {:.2} -> {:.2}",
                                i, trade.side, fill, reason, capital, equity_after
                            );
                            trades.push(trade);
                        }

                        capital = equity_after;
                        equity_curve.push(capital);
                        drawdown_samples.push(capital);
                        position = None;

                        if capital <= 0.0 {
                            debug!("Bar {}: account liquidated", i);
                            liquidated = true;
                            break;
                        }
                    }
                    None if self.settings.mark_to_market => {
                        let margin = capital * fraction;
                        let unrealized = margin * open.price_move_pct(bar.close) * leverage;
                        drawdown_samples.push((capital + unrealized).max(0.0));
                    }
                    None => {}
                }
            }

            if position.is_some() {
                continue;
            }

            // 2. Flat: look for an entry on the window ending before this bar
            let Some(window) = table.window(i, sequence_length) else {
                continue;
            };
            if window.has_missing() {
                debug!("Bar {}: missing feature values, skipped", i);
                continue;
            }

            let prediction = match self.predict(&window, predictor, scaler, needs_uncertainty) {
                Ok(prediction) if prediction.is_finite() => prediction,
                Ok(_) => {
                    debug!("Bar {}: non-finite prediction, skipped", i);
                    continue;
                }
                Err(e) => {
                    debug!("Bar {}: prediction failed: {}", i, e);
                    continue;
                }
            };

            for side in [Side::Long, Side::Short] {
                let ctx = GateContext {
                    index: i,
                    bar,
                    table,
                    side,
                    prediction,
                };
                if gates.evaluate(&ctx).is_pass() {
                    let entry_price = self.costs.entry_fill(bar.close, side);
                    debug!(
                        "Bar {}: opened {} at {:.4} (signal {:.4})",
                        i, side, entry_price, prediction.mean
                    );
                    position = Some(SimulatedPosition::open(
                        side,
                        i,
                        entry_price,
                        stop_loss_pct,
                        take_profit_pct,
                    ));
                    break;
                }
            }
        }

        let drawdown_curve = if self.settings.mark_to_market {
            &drawdown_samples
        } else {
            equity_curve.points()
        };
        let metrics = BacktestMetrics::calculate(start_capital, capital, &trades, drawdown_curve);

        debug!(
            "Backtest finished: {} trades, pnl {:.2}%, win rate {:.1}%, max dd {:.2}%",
            metrics.num_trades, metrics.total_pnl_pct, metrics.win_rate_pct, metrics.max_drawdown_pct
        );

        Ok(BacktestReport {
            metrics,
            trades,
            equity_curve,
            open_position: position,
            liquidated,
        })
    }

    fn predict(
        &self,
        window: &FeatureWindow<'_>,
        predictor: &dyn Predictor,
        scaler: Option<&dyn FeatureScaler>,
        needs_uncertainty: bool,
    ) -> Result<Prediction, PredictorError> {
        let scaled;
        let input = match scaler {
            Some(scaler) => {
                scaled = scaler.transform(window)?;
                &scaled
            }
            None => window,
        };

        if needs_uncertainty {
            predictor.predict_with_uncertainty(input, self.settings.uncertainty_samples)
        } else {
            predictor.predict(input).map(Prediction::certain)
        }
    }
}

/// Single-call form: replays `config` over `table` with the given costs and
/// lookback, intrabar exits and no mark-to-market.
pub fn run_backtest(
    table: &BarTable,
    predictor: &dyn Predictor,
    config: &StrategyConfig,
    fee_rate: f64,
    slippage_rate: f64,
    sequence_length: usize,
    start_capital: f64,
) -> Result<BacktestMetrics, BacktestError> {
    let settings = EngineSettings {
        fee_rate,
        slippage_rate,
        sequence_length,
        start_capital,
        ..EngineSettings::default()
    };
    BacktestEngine::new(settings).run(table, predictor, None, config)
}
