//! Reporting utilities for optimization results.
//!
//! Provides formatted console output and JSON export capabilities.

use crate::application::backtest::BacktestReport;
use crate::domain::optimization::{ParamSpec, SearchSpace, TrialResult};
use crate::domain::performance::BacktestMetrics;
use crate::domain::strategy::StrategyConfig;
use anyhow::{Context, Result};
use serde::Serialize;
use std::path::{Path, PathBuf};

/// Reporter for optimization results output.
pub struct OptimizeReporter {
    output_dir: PathBuf,
}

impl OptimizeReporter {
    /// Creates a new reporter with the given output directory.
    pub fn new(output_dir: impl AsRef<Path>) -> Self {
        Self {
            output_dir: output_dir.as_ref().to_path_buf(),
        }
    }

    /// Prints the header banner for the optimization run.
    pub fn print_header(&self, symbol: &str, timeframe: &str, data: &str, trials: usize, workers: usize) {
        println!("{}", "=".repeat(80));
        println!("🔍 TPE STRATEGY OPTIMIZER");
        println!("{}", "=".repeat(80));
        println!("Symbol:       {}", symbol);
        println!("Timeframe:    {}", timeframe);
        println!("Data:         {}", data);
        println!("Trials:       {} ({} workers)", trials, workers);
        println!("Output:       {}", self.output_dir.display());
        println!("{}", "=".repeat(80));
    }

    /// Prints the search space axes.
    pub fn print_space_info(&self, space: &SearchSpace) {
        println!("\n📊 Search Space:");
        for def in &space.parameters {
            let domain = match &def.spec {
                ParamSpec::Float { low, high } => format!("float [{}, {}]", low, high),
                ParamSpec::Int { low, high } => format!("int   [{}, {}]", low, high),
                ParamSpec::Categorical { choices } => {
                    let choices: Vec<String> = choices.iter().map(|c| c.to_string()).collect();
                    format!("one of {{{}}}", choices.join(", "))
                }
            };
            println!("  {:<24} {}", def.name, domain);
        }
    }

    /// Prints a formatted table of the best `top_n` completed trials.
    pub fn print_results_table(&self, trials: &[TrialResult], top_n: usize) {
        let ranked = rank_trials(trials, top_n);

        println!("\n{}", "=".repeat(80));
        println!(
            "✅ OPTIMIZATION COMPLETE - Top {} of {} trials",
            ranked.len(),
            trials.len()
        );
        println!("{}", "=".repeat(80));

        println!(
            "{:<5} | {:>9} | {:>8} | {:>8} | {:>7} | {:>7} | {:>9}",
            "#", "Trial", "PnL%", "WinRate", "Trades", "MaxDD%", "Score"
        );
        println!("{}", "-".repeat(80));

        for (i, trial) in ranked.iter().enumerate() {
            let metrics = trial.metrics.as_ref();
            println!(
                "{:<5} | {:>9} | {:>8.2} | {:>8.1} | {:>7} | {:>7.2} | {:>9.4}",
                i + 1,
                trial.number,
                metrics.map(|m| m.total_pnl_pct).unwrap_or_default(),
                metrics.map(|m| m.win_rate_pct).unwrap_or_default(),
                metrics.map(|m| m.num_trades).unwrap_or_default(),
                metrics.map(|m| m.max_drawdown_pct).unwrap_or_default(),
                trial.fitness_score()
            );
        }

        let pruned = trials.iter().filter(|t| !t.outcome.is_completed()).count();
        println!("{}", "-".repeat(80));
        println!("Pruned trials: {}", pruned);
        println!("{}\n", "=".repeat(80));
    }

    /// Prints detailed information about the best configuration.
    pub fn print_best_config(&self, config: &StrategyConfig, metrics: &BacktestMetrics) {
        println!("🏆 BEST CONFIGURATION:");
        println!("  Threshold:        {:.4}", config.strategy.prediction_threshold);
        if let Some(uncertainty) = config.strategy.uncertainty_threshold {
            println!("  Max Uncertainty:  {:.4}", uncertainty);
        }
        if let (Some(min), Some(max)) = (config.strategy.min_natr, config.strategy.max_natr) {
            println!("  NATR Band:        {:.3} - {:.3}", min, max);
        }
        if let Some(min_adx) = config.strategy.min_adx {
            println!("  Min ADX:          {:.1}", min_adx);
        }
        println!("  Leverage:         {}x", config.risk.leverage);
        println!("  Risk / Trade:     {:.2}%", config.risk.risk_per_trade_pct);
        println!("  Risk / Reward:    {:.2}", config.risk.risk_reward_ratio);
        if let Some(filters) = config.filters {
            println!(
                "  Filters:          EMA {} / ATR {} / ADX {}",
                filters.ema_period, filters.atr_period, filters.adx_period
            );
        }
        self.print_metrics(metrics);
        println!("{}\n", "=".repeat(80));
    }

    /// Prints the outcome of a single backtest.
    pub fn print_backtest(&self, config: &StrategyConfig, report: &BacktestReport) {
        println!("{}", "=".repeat(80));
        println!(
            "📈 BACKTEST {} {}",
            config.market.symbol, config.market.timeframe
        );
        println!("{}", "=".repeat(80));
        self.print_metrics(&report.metrics);
        if report.liquidated {
            println!("  ⚠️  Account liquidated");
        }
        if let Some(position) = &report.open_position {
            println!(
                "  Open at end:      {} @ {:.4} (not counted)",
                position.side, position.entry_price
            );
        }
        println!("{}\n", "=".repeat(80));
    }

    fn print_metrics(&self, metrics: &BacktestMetrics) {
        println!("\n  Total PnL:        {:.2}%", metrics.total_pnl_pct);
        println!("  Win Rate:         {:.1}%", metrics.win_rate_pct);
        println!("  Max Drawdown:     {:.2}%", metrics.max_drawdown_pct);
        println!("  Trades:           {}", metrics.num_trades);
        println!("  End Capital:      {:.2}", metrics.end_capital);
        match metrics.profit_factor {
            Some(pf) => println!("  Profit Factor:    {:.2}", pf),
            None => println!("  Profit Factor:    n/a"),
        }
        println!("  Max Loss Streak:  {}", metrics.max_consecutive_losses);
        println!("  Fees Paid:        {:.2}", metrics.total_fees);
    }

    /// Resolves a bare file name against the output directory.
    pub fn output_path(&self, filename: &str) -> PathBuf {
        if filename.contains('/') || filename.contains('\\') {
            PathBuf::from(filename)
        } else {
            self.output_dir.join(filename)
        }
    }

    /// Exports any serializable result set to a JSON file.
    pub fn export_json<T: Serialize + ?Sized>(&self, results: &T, filename: &str) -> Result<PathBuf> {
        let output_path = self.output_path(filename);

        if let Some(parent) = output_path.parent() {
            std::fs::create_dir_all(parent)
                .context(format!("Failed to create directory: {:?}", parent))?;
        }

        let json_output =
            serde_json::to_string_pretty(results).context("Failed to serialize results to JSON")?;

        std::fs::write(&output_path, json_output)
            .context(format!("Failed to write results to {}", output_path.display()))?;

        println!("💾 Results saved to: {}", output_path.display());
        Ok(output_path)
    }
}

impl Default for OptimizeReporter {
    fn default() -> Self {
        Self::new(".")
    }
}

/// Completed trials ordered by score, best first, truncated to `top_n`.
pub fn rank_trials(trials: &[TrialResult], top_n: usize) -> Vec<&TrialResult> {
    let mut ranked: Vec<&TrialResult> = trials.iter().filter(|t| t.outcome.is_completed()).collect();
    ranked.sort_by(|a, b| {
        b.fitness_score()
            .total_cmp(&a.fitness_score())
            .then(a.number.cmp(&b.number))
    });
    ranked.truncate(top_n);
    ranked
}
