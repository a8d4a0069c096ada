//! Strategy Optimizer Binary
//!
//! CLI for tuning, replaying and selecting leveraged perpetual-swap
//! strategies on historical bars.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use lbot::application::backtest::{BacktestEngine, SimulationContext};
use lbot::application::features::FeaturePipeline;
use lbot::application::ml::{InputLayout, MonteCarloPredictor, SmartCorePredictor};
use lbot::application::optimization::{OptimizeEngine, OptimizeReporter, select_top};
use lbot::config::OptimizerEnvConfig;
use lbot::domain::market::BarTable;
use lbot::domain::ml::{Predictor, StandardScaler};
use lbot::domain::optimization::{ApprovedStrategies, SearchSpace};
use lbot::domain::strategy::{FilterParams, MarketConfig};
use lbot::infrastructure::persistence::{StrategyStore, load_bars};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Parser)]
#[command(author, version, about = "Leveraged Strategy Optimizer", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum Layout {
    Flatten,
    LastRow,
}

impl From<Layout> for InputLayout {
    fn from(layout: Layout) -> Self {
        match layout {
            Layout::Flatten => InputLayout::Flatten,
            Layout::LastRow => InputLayout::LastRow,
        }
    }
}

#[derive(clap::Args)]
struct ModelArgs {
    /// CSV file with timestamp, open, high, low, close, volume
    #[arg(short, long)]
    data: PathBuf,

    /// Random forest model (smartcore JSON)
    #[arg(short, long)]
    model: PathBuf,

    /// How the lookback window is fed to the model
    #[arg(long, value_enum, default_value = "flatten")]
    layout: Layout,

    /// Feature scaler (JSON with mean/scale); omit to feed raw features
    #[arg(long)]
    scaler: Option<PathBuf>,

    /// Fit a standard scaler on the loaded data instead of reading one
    #[arg(long, conflicts_with = "scaler")]
    fit_scaler: bool,

    /// Input noise for Monte Carlo uncertainty estimates (0 disables)
    #[arg(long, default_value = "0.0")]
    mc_noise: f64,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the parameter search for a single market
    Run {
        #[command(flatten)]
        model: ModelArgs,

        /// Market symbol, e.g. BTC/USDT:USDT
        #[arg(short, long, default_value = "BTC/USDT:USDT")]
        symbol: String,

        /// Bar timeframe
        #[arg(short, long, default_value = "1h")]
        timeframe: String,

        /// TOML file with the search space
        #[arg(long)]
        space: Option<PathBuf>,

        /// Number of trials (overrides OPTIM_TRIALS)
        #[arg(long)]
        trials: Option<usize>,

        /// Parallel workers (overrides OPTIM_JOBS)
        #[arg(long)]
        jobs: Option<usize>,

        /// Directory for configs and results
        #[arg(short, long, default_value = "optimization_results")]
        output_dir: PathBuf,

        /// Results file inside the output directory
        #[arg(long, default_value = "optimization_results.json")]
        results: String,

        /// Number of top trials to display
        #[arg(long, default_value = "10")]
        top_n: usize,
    },
    /// Replay one stored strategy configuration
    Backtest {
        #[command(flatten)]
        model: ModelArgs,

        /// Strategy config JSON
        #[arg(short, long)]
        config: PathBuf,
    },
    /// Pick the markets cleared for live trading from a results file
    Select {
        /// Results file written by `run`
        #[arg(short, long, default_value = "optimization_results/optimization_results.json")]
        results: PathBuf,

        /// Directory for approved_strategies.json
        #[arg(short, long, default_value = "optimization_results")]
        output_dir: PathBuf,

        /// Number of markets to approve (overrides TOP_N)
        #[arg(long)]
        top_n: Option<usize>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Setup logging
    let subscriber = tracing_subscriber::FmtSubscriber::builder()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .finish();
    tracing::subscriber::set_global_default(subscriber).ok();

    let cli = Cli::parse();
    let env_config = OptimizerEnvConfig::from_env().context("Failed to load configuration")?;

    match cli.command {
        Commands::Run {
            model,
            symbol,
            timeframe,
            space,
            trials,
            jobs,
            output_dir,
            results,
            top_n,
        } => {
            let mut settings = env_config.optimizer_settings();
            if let Some(trials) = trials {
                settings.n_trials = trials;
            }
            if let Some(jobs) = jobs {
                settings.n_workers = jobs;
            }

            let reporter = OptimizeReporter::new(&output_dir);
            reporter.print_header(
                &symbol,
                &timeframe,
                &model.data.display().to_string(),
                settings.n_trials,
                settings.n_workers,
            );

            let space = match space {
                Some(path) => {
                    info!("Loading search space from: {:?}", path);
                    load_space(&path)?
                }
                None => {
                    info!("Using default search space");
                    SearchSpace::default()
                }
            };
            reporter.print_space_info(&space);
            println!("{}\n", "=".repeat(80));

            let context = build_context(&model, &FilterParams::default(), &env_config)?;
            let market = MarketConfig { symbol, timeframe };
            let base = OptimizeEngine::base_config(&market, &space);

            let engine =
                OptimizeEngine::new(Arc::new(context), env_config.constraints(), settings);
            let token = engine.cancellation_token();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    warn!("Interrupt received, stopping after the current batch");
                    token.cancel();
                }
            });

            println!("🚀 Starting optimization...\n");
            let run = tokio::task::spawn_blocking(move || engine.run(base, &space))
                .await
                .context("Optimizer task failed")??;

            reporter.print_results_table(&run.trials, top_n);
            reporter.print_best_config(&run.best_config, &run.verification.metrics);

            let store = StrategyStore::new(&output_dir)?;
            store.save_config(&run.best_config)?;
            store.upsert_result(&results, run.strategy_result())?;

            let trials_file = format!(
                "trials_{}",
                run.best_config.file_name().trim_start_matches("config_")
            );
            reporter.export_json(&run.trials, &trials_file)?;

            if run.cancelled {
                println!("⚠️  Optimization interrupted; results cover completed trials only\n");
            } else {
                println!("✅ Optimization complete!\n");
            }
        }
        Commands::Backtest { model, config } => {
            let config = StrategyStore::load_config(&config)?;
            let context = build_context(&model, &config.filters_or_default(), &env_config)?;

            let engine = BacktestEngine::new(context.settings.clone());
            let report = engine.run_in_context(&context, &config)?;
            OptimizeReporter::default().print_backtest(&config, &report);
        }
        Commands::Select {
            results,
            output_dir,
            top_n,
        } => {
            let mut criteria = env_config.selection_criteria();
            if let Some(top_n) = top_n {
                criteria.top_n = top_n;
            }

            let all = StrategyStore::load_results(&results)?;
            let selected = select_top(&all, &criteria);
            for (rank, result) in selected.iter().enumerate() {
                println!(
                    "{:>2}. {:<20} {:<4} score {:>9.4} | pnl {:>7.2}% | win {:>5.1}% | dd {:>6.2}%",
                    rank + 1,
                    result.symbol,
                    result.timeframe,
                    result.fitness_score,
                    result.metrics.total_pnl_pct,
                    result.metrics.win_rate_pct,
                    result.metrics.max_drawdown_pct
                );
            }

            let store = StrategyStore::new(&output_dir)?;
            store.save_approved(&ApprovedStrategies::from(selected.as_slice()))?;
        }
    }

    Ok(())
}

/// Loads bars, derives features and wires the predictor into one context.
fn build_context(
    args: &ModelArgs,
    filters: &FilterParams,
    env_config: &OptimizerEnvConfig,
) -> Result<SimulationContext> {
    let data = load_bars(&args.data)?;
    let table: BarTable = FeaturePipeline::default()
        .build_table(data.bars, filters, data.extra_columns)
        .context("Failed to build feature table")?;
    info!(
        "Feature table: {} rows x {} features",
        table.len(),
        table.feature_width()
    );

    let forest = SmartCorePredictor::load(&args.model, args.layout.into())?;
    let predictor: Arc<dyn Predictor> = if args.mc_noise > 0.0 {
        Arc::new(MonteCarloPredictor::new(forest, args.mc_noise, env_config.seed))
    } else {
        Arc::new(forest)
    };

    let scaler = match (&args.scaler, args.fit_scaler) {
        (Some(path), _) => Some(load_scaler(path)?),
        (None, true) => Some(StandardScaler::fit(&table)),
        (None, false) => None,
    };

    let context = SimulationContext::new(table, predictor, env_config.backtest.engine_settings());
    Ok(match scaler {
        Some(scaler) => context.with_scaler(Arc::new(scaler)),
        None => context,
    })
}

/// Loads a search space from a TOML file.
fn load_space(path: &Path) -> Result<SearchSpace> {
    let content = std::fs::read_to_string(path)
        .context(format!("Failed to read search space file: {:?}", path))?;
    SearchSpace::from_toml_str(&content)
        .context(format!("Failed to parse search space TOML: {:?}", path))
}

fn load_scaler(path: &Path) -> Result<StandardScaler> {
    let content =
        std::fs::read_to_string(path).context(format!("Failed to read scaler file: {:?}", path))?;
    serde_json::from_str(&content).context(format!("Failed to parse scaler JSON: {:?}", path))
}
