use anyhow::Context;
use backtester::{Backtester, BacktestResult, KlineCache, read_klines};
use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};
use comfy_table::{Table, presets::UTF8_FULL};
use configuration::{Config, Objective, ObjectiveMetric};
use core_types::{Kline, StrategyId};
use optimizer::{AdaptiveOptimizer, OptimizationOutcome};
use regime::MarketStateClassifier;
use rust_decimal::Decimal;
use std::path::{Path, PathBuf};

/// The main entry point for the Perpetua trading application.
fn main() -> anyhow::Result<()> {
    // PERPETUA__* overrides may live in a .env file; it is optional.
    if let Err(e) = dotenvy::dotenv() {
        if !e.not_found() {
            return Err(e).context("failed to read .env");
        }
    }

    // Parse command-line arguments
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => configuration::load_config_from(path),
        None => configuration::load_config(),
    }
    .context("failed to load configuration")?;
    let _guard = configuration::telemetry::init_tracing(&config.logging)?;

    // Execute the appropriate command
    match cli.command {
        Commands::Import(args) => handle_import(args),
        Commands::Backtest(args) => handle_backtest(args, &config),
        Commands::Optimize(args) => handle_optimize(args, &config),
        Commands::Classify(args) => handle_classify(args, &config),
    }
}

// ==============================================================================
// CLI Structure
// ==============================================================================

/// Decision core for perpetual futures strategies: replay, optimize, classify.
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Configuration file. Defaults to ./config.toml when present.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Copy a kline CSV file into the local cache.
    Import(ImportArgs),
    /// Replay cached klines through one strategy and report the result.
    Backtest(BacktestArgs),
    /// Search parameters per market regime and recommend a blended set.
    Optimize(OptimizeArgs),
    /// Classify the market state of cached klines.
    Classify(RangeArgs),
}

/// A cached kline range.
#[derive(Args)]
struct RangeArgs {
    /// The instrument (e.g., "BTC-USDT-SWAP").
    #[arg(long)]
    symbol: String,

    /// The interval of the klines (e.g., "1h", "4h", "1d").
    #[arg(long)]
    interval: String,

    /// First day of the range (format: YYYY-MM-DD).
    #[arg(long)]
    from: NaiveDate,

    /// Last day of the range (format: YYYY-MM-DD).
    #[arg(long)]
    to: NaiveDate,

    /// Root directory of the kline cache.
    #[arg(long, default_value = "data")]
    data_dir: PathBuf,
}

#[derive(Args)]
struct ImportArgs {
    #[command(flatten)]
    range: RangeArgs,

    /// CSV file with timestamp,open,high,low,close,volume columns.
    #[arg(long)]
    csv: PathBuf,
}

#[derive(Args)]
struct BacktestArgs {
    #[command(flatten)]
    range: RangeArgs,

    /// Registry name of the strategy (e.g., "ma_crossover").
    #[arg(long)]
    strategy: StrategyId,

    /// Switch to the per-regime parameters of this optimization outcome (JSON)
    /// as the market regime changes.
    #[arg(long)]
    adaptive: Option<PathBuf>,

    /// Write the full result as JSON to this file.
    #[arg(long)]
    output: Option<PathBuf>,
}

#[derive(Args)]
struct OptimizeArgs {
    /// The optimization job description.
    #[arg(long, default_value = "optimizer.toml")]
    job: PathBuf,

    /// First day of the history (format: YYYY-MM-DD).
    #[arg(long)]
    from: NaiveDate,

    /// Last day of the history (format: YYYY-MM-DD).
    #[arg(long)]
    to: NaiveDate,

    /// Root directory of the kline cache.
    #[arg(long, default_value = "data")]
    data_dir: PathBuf,

    /// Rank by this single metric instead of the job's objective.
    #[arg(long, value_enum)]
    objective: Option<ObjectiveMetric>,

    /// Write the outcome as JSON to this file.
    #[arg(long)]
    output: Option<PathBuf>,
}

// ==============================================================================
// Command Logic
// ==============================================================================

fn handle_import(args: ImportArgs) -> anyhow::Result<()> {
    let range = &args.range;
    let klines = read_klines(&args.csv).with_context(|| format!("failed to read {}", args.csv.display()))?;
    let cache = KlineCache::new(&range.data_dir)?;
    let path = cache.store(&range.symbol, &range.interval, range.from, range.to, &klines)?;
    println!("Imported {} klines into {}", klines.len(), path.display());
    Ok(())
}

fn handle_backtest(args: BacktestArgs, config: &Config) -> anyhow::Result<()> {
    let range = &args.range;
    let klines = load_range(&range.data_dir, &range.symbol, &range.interval, range.from, range.to)?;

    let backtester = match &args.adaptive {
        Some(path) => {
            let body = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read {}", path.display()))?;
            let outcome: OptimizationOutcome = serde_json::from_str(&body)
                .with_context(|| format!("failed to parse {}", path.display()))?;
            anyhow::ensure!(
                outcome.strategy == args.strategy,
                "{} was optimized for {}, not {}",
                path.display(),
                outcome.strategy,
                args.strategy
            );
            let parameters = outcome.regime_parameters();
            Backtester::adaptive(config, range.symbol.clone(), range.interval.clone(), args.strategy, &parameters)?
        }
        None => Backtester::for_strategy(config, range.symbol.clone(), range.interval.clone(), args.strategy)?,
    };
    let result = backtester.with_progress(true).run(&klines)?;

    println!("{}", backtest_table(&result));
    if let Some(path) = &args.output {
        write_output(path, &result.to_json())?;
    }
    Ok(())
}

fn handle_optimize(args: OptimizeArgs, config: &Config) -> anyhow::Result<()> {
    let mut job = configuration::load_optimizer_config(&args.job)
        .with_context(|| format!("failed to load job {}", args.job.display()))?;
    if let Some(metric) = args.objective {
        job.analysis.objective = Objective::Metric(metric);
    }
    let klines = load_range(&args.data_dir, &job.symbol, &job.interval, args.from, args.to)?;

    let outcome = AdaptiveOptimizer::new(job, config.clone()).with_progress(true).run(&klines)?;

    println!("{}", optimization_table(&outcome));
    println!("{}", outcome.rationale);
    if let Some(path) = &args.output {
        write_output(path, &serde_json::to_string_pretty(&outcome)?)?;
    }
    Ok(())
}

fn handle_classify(args: RangeArgs, config: &Config) -> anyhow::Result<()> {
    let klines = load_range(&args.data_dir, &args.symbol, &args.interval, args.from, args.to)?;
    let classifier = MarketStateClassifier::new(config.classifier.clone());

    let state = classifier.classify(&klines);
    let segmentation = classifier.segment(&klines);

    let mut table = Table::new();
    table.load_preset(UTF8_FULL).set_header(vec!["Metric", "Value"]);
    table.add_row(vec!["Regime".to_string(), state.regime.to_string()]);
    table.add_row(vec!["Volatility".to_string(), format!("{:?}", state.volatility_level)]);
    table.add_row(vec!["ATR %".to_string(), format!("{:.3}", state.atr_pct * 100.0)]);
    table.add_row(vec!["ADX".to_string(), format!("{:.1}", state.adx)]);
    table.add_row(vec!["Trend strength".to_string(), format!("{:.2}", state.trend_strength)]);
    table.add_row(vec!["Oscillation strength".to_string(), format!("{:.2}", state.oscillation_strength)]);
    table.add_row(vec!["Volume".to_string(), format!("{:?}", state.volume_profile)]);
    for (regime, count) in &segmentation.frequencies {
        table.add_row(vec![
            format!("Bars {regime}"),
            format!("{count} ({:.1}%)", segmentation.share(*regime) * 100.0),
        ]);
    }
    println!("{table}");
    Ok(())
}

// ==============================================================================
// Helpers
// ==============================================================================

fn load_range(
    data_dir: &Path,
    symbol: &str,
    interval: &str,
    from: NaiveDate,
    to: NaiveDate,
) -> anyhow::Result<Vec<Kline>> {
    let cache = KlineCache::new(data_dir)?;
    let klines = cache
        .load(symbol, interval, from, to)
        .with_context(|| format!("no cached klines for {symbol} {interval} {from}..{to}; run `import` first"))?;
    tracing::info!(symbol, interval, bars = klines.len(), "Loaded klines from the cache");
    Ok(klines)
}

fn write_output(path: &Path, body: &str) -> anyhow::Result<()> {
    std::fs::write(path, body).with_context(|| format!("failed to write {}", path.display()))?;
    println!("Wrote {}", path.display());
    Ok(())
}

fn backtest_table(result: &BacktestResult) -> Table {
    let report = &result.report;
    let rating = result.rating();
    let optional = |value: Option<Decimal>| value.map_or("n/a".to_string(), |v| v.round_dp(2).to_string());

    let mut table = Table::new();
    table.load_preset(UTF8_FULL).set_header(vec!["Metric", "Value"]);
    table.add_row(vec!["Strategy".to_string(), result.strategy.to_string()]);
    table.add_row(vec!["Bars (skipped)".to_string(), format!("{} ({})", result.bars_processed, result.bars_skipped)]);
    if result.strategy_switches > 0 {
        table.add_row(vec!["Parameter switches".to_string(), result.strategy_switches.to_string()]);
    }
    table.add_row(vec!["Final equity".to_string(), report.final_equity.round_dp(2).to_string()]);
    table.add_row(vec!["Total return %".to_string(), report.total_return_pct.round_dp(2).to_string()]);
    table.add_row(vec!["Max drawdown %".to_string(), report.max_drawdown_pct.round_dp(2).to_string()]);
    table.add_row(vec!["Sharpe".to_string(), optional(report.sharpe_ratio)]);
    table.add_row(vec!["Profit factor".to_string(), optional(report.profit_factor)]);
    table.add_row(vec!["Trades".to_string(), report.total_trades.to_string()]);
    table.add_row(vec!["Win rate %".to_string(), optional(report.win_rate_pct)]);
    table.add_row(vec!["Fees".to_string(), report.total_fees.round_dp(2).to_string()]);
    table.add_row(vec!["Rating".to_string(), format!("{} ({})", rating.grade.label(), rating.score)]);
    table
}

fn optimization_table(outcome: &OptimizationOutcome) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_header(vec!["Regime", "Share %", "Bars", "Trials", "Best score", "Best parameters"]);
    for optimum in &outcome.regimes {
        let (score, parameters) = match &optimum.best {
            Some(best) => (
                best.score.round_dp(3).to_string(),
                serde_json::to_string(&best.parameters).unwrap_or_default(),
            ),
            None => ("-".to_string(), "-".to_string()),
        };
        table.add_row(vec![
            optimum.regime.to_string(),
            format!("{:.1}", optimum.share * 100.0),
            optimum.bars.to_string(),
            optimum.trials_run.to_string(),
            score,
            parameters,
        ]);
    }
    table.add_row(vec![
        "blended".to_string(),
        String::new(),
        String::new(),
        outcome.trials_run().to_string(),
        String::new(),
        serde_json::to_string(&outcome.recommended).unwrap_or_default(),
    ]);
    table
}
