use lbot::application::backtest::{
    BacktestEngine, BacktestReport, EngineSettings, ExitPriceMode, run_backtest,
};
use lbot::application::ml::MonteCarloPredictor;
use lbot::domain::market::{BarTable, FeatureWindow, MarketBar};
use lbot::domain::ml::Predictor;
use lbot::domain::strategy::StrategyConfig;
use lbot::infrastructure::mock::{
    ConstantPredictor, FnPredictor, bars_from_closes, compounding_closes, oscillating_closes,
    table_from_bars, table_from_closes,
};

fn config() -> StrategyConfig {
    StrategyConfig::new("BTC/USDT:USDT", "1h")
}

fn frictionless(sequence_length: usize) -> EngineSettings {
    EngineSettings {
        fee_rate: 0.0,
        slippage_rate: 0.0,
        sequence_length,
        start_capital: 1000.0,
        ..EngineSettings::default()
    }
}

fn replay(
    table: &BarTable,
    predictor: &dyn Predictor,
    settings: EngineSettings,
    config: &StrategyConfig,
) -> BacktestReport {
    BacktestEngine::new(settings)
        .run_detailed(table, predictor, None, config)
        .expect("backtest should not fail")
}

/// Long when the last close is above the window average, short otherwise.
fn momentum() -> FnPredictor<impl Fn(&FeatureWindow<'_>) -> f64 + Send + Sync> {
    FnPredictor::new(|window: &FeatureWindow<'_>| {
        let closes: Vec<f64> = (0..window.rows()).map(|r| window.row(r)[0]).collect();
        let mean = closes.iter().sum::<f64>() / closes.len() as f64;
        if closes[closes.len() - 1] >= mean { 0.8 } else { 0.2 }
    })
}

#[test]
fn test_short_input_yields_no_trades() {
    let predictor = ConstantPredictor::new(0.9);
    for len in 0..5 {
        let closes = compounding_closes(len, 100.0, 2.0);
        let metrics = run_backtest(
            &table_from_closes(&closes),
            &predictor,
            &config(),
            0.0005,
            0.0005,
            5,
            1000.0,
        )
        .unwrap();
        assert_eq!(metrics.num_trades, 0, "len {len}");
        assert_eq!(metrics.total_pnl_pct, 0.0);
    }
}

#[test]
fn test_flat_series_below_threshold_never_trades() {
    let table = table_from_closes(&[100.0; 100]);
    let predictor = ConstantPredictor::new(0.5);
    let metrics = run_backtest(&table, &predictor, &config(), 0.0005, 0.0005, 24, 1000.0).unwrap();
    assert_eq!(metrics.num_trades, 0);
    assert_eq!(metrics.total_pnl_pct, 0.0);
    assert_eq!(metrics.max_drawdown_pct, 0.0);
}

#[test]
fn test_two_percent_rise_hits_take_profit() {
    let table = table_from_closes(&compounding_closes(7, 100.0, 2.0));
    let predictor = ConstantPredictor::new(0.9);
    let report = replay(&table, &predictor, frictionless(5), &config());

    assert_eq!(report.metrics.num_trades, 1);
    assert_eq!(report.metrics.win_rate_pct, 100.0);
    let trade = &report.trades[0];
    assert_eq!(trade.entry_index, 5);
    assert_eq!(trade.exit_index, 6);
    assert_eq!(trade.exit_reason.to_string(), "take_profit");
    // 0.2% move at 10x on the full balance
    assert!((report.metrics.total_pnl_pct - 2.0).abs() < 1e-9);
    // Re-entered on the exit bar and still open at the end
    assert!(report.open_position.is_some());
}

#[test]
fn test_trades_are_causal_and_never_overlap() {
    let table = table_from_closes(&oscillating_closes(600, 100.0, 2.0));
    let predictor = momentum();
    let report = replay(&table, &predictor, EngineSettings::default(), &config());

    assert!(report.metrics.num_trades > 5);
    for trade in &report.trades {
        assert!(trade.entry_index < trade.exit_index);
    }
    for pair in report.trades.windows(2) {
        assert!(pair[0].exit_index <= pair[1].entry_index);
    }
}

#[test]
fn test_drawdown_is_zero_iff_equity_never_falls() {
    let settings = EngineSettings::default();
    let cases = [
        compounding_closes(200, 100.0, 1.0),
        oscillating_closes(400, 100.0, 2.0),
        oscillating_closes(400, 100.0, 0.3),
    ];
    let predictor = momentum();

    for closes in cases {
        let table = table_from_closes(&closes);
        let report = replay(&table, &predictor, settings.clone(), &config());
        let points = report.equity_curve.points();
        let non_decreasing = points.windows(2).all(|w| w[1] >= w[0]);

        assert!(report.metrics.max_drawdown_pct >= 0.0);
        assert_eq!(report.metrics.max_drawdown_pct == 0.0, non_decreasing);
    }
}

#[test]
fn test_replay_is_idempotent() {
    let table = table_from_closes(&oscillating_closes(500, 100.0, 1.5));
    let predictor = momentum();
    let first = replay(&table, &predictor, EngineSettings::default(), &config());
    let second = replay(&table, &predictor, EngineSettings::default(), &config());
    assert_eq!(first.metrics, second.metrics);
    assert_eq!(first.trades, second.trades);
}

#[test]
fn test_higher_fees_never_improve_pnl() {
    let table = table_from_closes(&oscillating_closes(500, 100.0, 1.5));
    let predictor = momentum();

    let pnl: Vec<f64> = [0.0, 0.0002, 0.0005, 0.001]
        .iter()
        .map(|&fee_rate| {
            let settings = EngineSettings {
                fee_rate,
                ..EngineSettings::default()
            };
            replay(&table, &predictor, settings, &config()).metrics.total_pnl_pct
        })
        .collect();

    for pair in pnl.windows(2) {
        assert!(pair[1] <= pair[0], "pnl rose with fees: {:?}", pnl);
    }
}

#[test]
fn test_higher_slippage_never_improves_pnl() {
    let table = table_from_closes(&compounding_closes(7, 100.0, 2.0));
    let predictor = ConstantPredictor::new(0.9);

    let reports: Vec<BacktestReport> = [0.0, 0.0002, 0.0005]
        .iter()
        .map(|&slippage_rate| {
            let settings = EngineSettings {
                slippage_rate,
                ..frictionless(5)
            };
            replay(&table, &predictor, settings, &config())
        })
        .collect();

    for pair in reports.windows(2) {
        assert_eq!(pair[0].metrics.num_trades, pair[1].metrics.num_trades);
        assert!(pair[1].metrics.total_pnl_pct <= pair[0].metrics.total_pnl_pct);
    }
}

#[test]
fn test_close_mode_ignores_wicks() {
    // Bar 6 wicks through the stop (99.9) but closes above the target (100.2)
    let mut bars = bars_from_closes(&[100.0; 6]);
    bars.push(MarketBar::new(6 * 3_600_000, 100.0, 100.5, 99.5, 100.4, 1_000.0));
    let table = table_from_bars(bars);
    let predictor = ConstantPredictor::new(0.9);

    let intrabar = replay(&table, &predictor, frictionless(5), &config());
    assert_eq!(intrabar.metrics.num_trades, 1);
    assert_eq!(intrabar.metrics.win_rate_pct, 0.0);

    let settings = EngineSettings {
        exit_mode: ExitPriceMode::Close,
        ..frictionless(5)
    };
    let on_close = replay(&table, &predictor, settings, &config());
    assert_eq!(on_close.metrics.num_trades, 1);
    assert_eq!(on_close.metrics.win_rate_pct, 100.0);
    assert_eq!(on_close.trades[0].exit_price, 100.4);
}

#[test]
fn test_shorts_disabled_blocks_short_signals() {
    let table = table_from_closes(&oscillating_closes(300, 100.0, 1.0));
    let predictor = ConstantPredictor::new(0.1);

    let mut longs_only = config();
    longs_only.behavior.use_shorts = false;
    let report = replay(&table, &predictor, EngineSettings::default(), &longs_only);
    assert_eq!(report.metrics.num_trades, 0);

    let both = replay(&table, &predictor, EngineSettings::default(), &config());
    assert!(both.metrics.num_trades > 0);
    assert!(both.trades.iter().all(|t| t.side.to_string() == "short"));
}

#[test]
fn test_uncertainty_ceiling_blocks_noisy_predictions() {
    let table = table_from_closes(&oscillating_closes(300, 100.0, 1.0));
    // Always bullish; the last close nudges the output so input noise shows up as spread
    let sensitive = FnPredictor::new(|window: &FeatureWindow<'_>| {
        0.9 + (window.row(window.rows() - 1)[0] - 100.0) * 0.001
    });
    let predictor = MonteCarloPredictor::new(sensitive, 1.0, 42);

    let unfiltered = replay(&table, &predictor, EngineSettings::default(), &config());
    assert!(unfiltered.metrics.num_trades > 0);

    let mut loose = config();
    loose.strategy.uncertainty_threshold = Some(0.1);
    let report = replay(&table, &predictor, EngineSettings::default(), &loose);
    assert_eq!(report.metrics.num_trades, unfiltered.metrics.num_trades);

    let mut tight = config();
    tight.strategy.uncertainty_threshold = Some(1e-6);
    let report = replay(&table, &predictor, EngineSettings::default(), &tight);
    assert_eq!(report.metrics.num_trades, 0);
}
