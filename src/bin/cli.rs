//! Command-line interface for the wagering backtester.

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

use keiba_sim::bankroll::BankrollMethod;
use keiba_sim::config::{SimulationConfig, SimulationMode};
use keiba_sim::data::tsv_loader;
use keiba_sim::error::SimError;
use keiba_sim::metrics;
use keiba_sim::models::Race;
use keiba_sim::report;
use keiba_sim::simulation::{ImpliedProbability, SimulationEngine};
use keiba_sim::strategy::Strategy;

#[derive(Parser)]
#[command(name = "keiba-sim")]
#[command(author, version, about = "Horse race wagering strategy backtester", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Suppress progress output
    #[arg(short, long, global = true)]
    quiet: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Execute a simulation from a config file
    Run {
        /// Path to the YAML configuration
        config: PathBuf,

        /// Path to the TSV dataset
        #[arg(short, long)]
        data: PathBuf,

        /// Override the output directory from the config
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Validate a config file and optionally a dataset
    Validate {
        /// Path to the YAML configuration
        config: PathBuf,

        /// Also load and check this TSV dataset
        #[arg(short, long)]
        data: Option<PathBuf>,
    },

    /// Run multiple strategies against one dataset and rank them
    Compare {
        /// Path to the YAML configuration (shared filter and bankroll)
        config: PathBuf,

        /// Path to the TSV dataset
        #[arg(short, long)]
        data: PathBuf,

        /// Comma-separated strategy names
        #[arg(short, long)]
        strategies: String,
    },

    /// Print available strategies and bankroll methods
    List,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let level = if cli.quiet { Level::WARN } else { Level::INFO };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .finish();
    let _ = tracing::subscriber::set_global_default(subscriber);

    match run_command(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("{} {err:#}", "error:".red().bold());
            let code = err
                .downcast_ref::<SimError>()
                .map(SimError::exit_code)
                .unwrap_or(1);
            ExitCode::from(code as u8)
        }
    }
}

fn run_command(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Run {
            config,
            data,
            output,
        } => cmd_run(&config, &data, output, cli.quiet),
        Commands::Validate { config, data } => cmd_validate(&config, data.as_deref()),
        Commands::Compare {
            config,
            data,
            strategies,
        } => cmd_compare(&config, &data, &strategies),
        Commands::List => cmd_list(),
    }
}

fn load_inputs(
    config_path: &std::path::Path,
    data_path: &std::path::Path,
) -> Result<(SimulationConfig, Vec<Race>)> {
    let config = SimulationConfig::load(config_path)?;
    let errors = config.validate();
    if !errors.is_empty() {
        for error in &errors {
            eprintln!("  {} {error}", "-".red());
        }
        return Err(SimError::ConfigInvalid(format!(
            "{} problem(s) in {}",
            errors.len(),
            config_path.display()
        ))
        .into());
    }

    let dataset = tsv_loader::load(data_path)?;
    println!(
        "Loaded {} races from {} ({} rows skipped, {} races dropped)",
        dataset.races.len(),
        data_path.display(),
        dataset.skipped_rows,
        dataset.dropped_races
    );
    Ok((config, dataset.races))
}

fn cmd_run(
    config_path: &std::path::Path,
    data_path: &std::path::Path,
    output: Option<PathBuf>,
    quiet: bool,
) -> Result<()> {
    let (config, races) = load_inputs(config_path, data_path)?;
    let engine = SimulationEngine::from_config(&config)?;
    let out_dir = output.unwrap_or_else(|| config.output.directory.clone());
    let initial_fund = config.simulation.initial_fund;

    println!(
        "Strategy: {}  Bankroll: {}  Initial fund: {} yen",
        config.build_strategy()?.name().cyan(),
        config.fund_management.method.cyan(),
        initial_fund
    );

    match config.simulation.mode {
        SimulationMode::Simple => {
            let result = engine.run(&races, initial_fund, None)?;
            let judgment = metrics::judge(&result.metrics, 0.0);
            print!("{}", report::summary_text(&result, &judgment));
            let written = report::write_run_report(&result, &judgment, &config, &out_dir)?;
            announce_written(&written);
        }
        SimulationMode::MonteCarlo => {
            let spinner = mc_spinner(quiet, config.monte_carlo.num_trials);
            let mc = engine.run_monte_carlo(
                &races,
                initial_fund,
                &config.monte_carlo,
                config.simulation.random_seed,
                config.target_fund(),
                &ImpliedProbability,
                None,
            )?;
            if let Some(spinner) = spinner {
                spinner.finish_and_clear();
            }
            print_monte_carlo(&mc, initial_fund);

            // the judgment pairs the chronological replay with the
            // resampled bankruptcy probability
            let baseline = engine.run(&races, initial_fund, None)?;
            let judgment = metrics::judge(&baseline.metrics, mc.summary.bankruptcy_prob);
            println!(
                "Decision: {}",
                if judgment.go {
                    "GO".green().bold()
                } else {
                    "NO-GO".red().bold()
                }
            );

            let mut written = report::write_run_report(&baseline, &judgment, &config, &out_dir)?;
            written.push(report::write_monte_carlo_report(&mc, &config, &out_dir)?);
            announce_written(&written);
        }
        SimulationMode::WalkForward => {
            let windows =
                engine.run_walk_forward(&races, initial_fund, &config.walk_forward, None)?;
            println!("Walk-forward windows: {}", windows.len());
            for window in &windows {
                println!(
                    "  {} .. {}  final {:>12} yen  ROI {:>8.2}%",
                    window.test_start,
                    window.test_end,
                    window.result.final_fund,
                    window.result.metrics.roi
                );
            }
            let path = report::write_walk_forward_report(&windows, &config, &out_dir)?;
            announce_written(std::slice::from_ref(&path));
        }
    }

    println!("{}", "Simulation completed".green());
    Ok(())
}

fn mc_spinner(quiet: bool, num_trials: usize) -> Option<ProgressBar> {
    if quiet {
        return None;
    }
    let spinner = ProgressBar::new_spinner();
    spinner.set_style(
        ProgressStyle::with_template("{spinner} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    spinner.set_message(format!("running {num_trials} Monte Carlo trials"));
    spinner.enable_steady_tick(Duration::from_millis(120));
    Some(spinner)
}

fn print_monte_carlo(mc: &keiba_sim::simulation::MonteCarloResult, initial_fund: i64) {
    let s = &mc.summary;
    let sep = "=".repeat(60);
    println!("{sep}");
    println!("Monte Carlo Result  ({} trials, seed {})", mc.num_trials, mc.seed);
    println!("{sep}");
    println!("Initial fund:    {initial_fund:>14} yen");
    println!("Mean final:      {:>14.0} yen", s.mean);
    println!("Median final:    {:>14.0} yen", s.median);
    println!("Std dev:         {:>14.0} yen", s.std_dev);
    println!("Min / Max:       {:>14} / {} yen", s.min, s.max);
    println!(
        "Percentiles:     p5 {:.0}  p25 {:.0}  p75 {:.0}  p95 {:.0}",
        s.percentile_5, s.percentile_25, s.percentile_75, s.percentile_95
    );
    println!("Profit rate:     {:>13.2}%", s.profit_rate * 100.0);
    println!("Target reached:  {:>13.2}%", s.target_prob * 100.0);
    println!("Bankruptcy rate: {:>13.2}%", s.bankruptcy_prob * 100.0);
    println!("{sep}");
}

fn announce_written(paths: &[PathBuf]) {
    for path in paths {
        println!("Wrote {}", path.display());
    }
}

fn cmd_validate(config_path: &std::path::Path, data_path: Option<&std::path::Path>) -> Result<()> {
    let config = SimulationConfig::load(config_path)?;
    let errors = config.validate();
    if !errors.is_empty() {
        println!("{}", "Configuration problems:".red().bold());
        for error in &errors {
            println!("  - {error}");
        }
        return Err(SimError::ConfigInvalid(format!(
            "{} problem(s) in {}",
            errors.len(),
            config_path.display()
        ))
        .into());
    }

    println!("{}", "Configuration is valid".green());
    println!("  Strategy:     {}", config.build_strategy()?.name());
    println!("  Bankroll:     {}", config.fund_management.method);
    println!("  Initial fund: {} yen", config.simulation.initial_fund);

    if let Some(data_path) = data_path {
        let dataset = tsv_loader::load(data_path)
            .with_context(|| format!("validating {}", data_path.display()))?;
        let summary = dataset.summary();
        println!("{}", "Dataset is valid".green());
        println!("  Races:          {}", summary.total_races);
        println!("  Horses:         {}", summary.total_horses);
        println!("  Avg field size: {:.1}", summary.avg_field_size);
        println!("  Tracks:         {}", summary.tracks.join(", "));
        println!(
            "  Years:          {}",
            summary
                .years
                .iter()
                .map(|y| y.to_string())
                .collect::<Vec<_>>()
                .join(", ")
        );
        if dataset.skipped_rows > 0 || dataset.dropped_races > 0 {
            println!(
                "  {} {} rows skipped, {} races dropped",
                "warning:".yellow(),
                dataset.skipped_rows,
                dataset.dropped_races
            );
        }
    }
    Ok(())
}

fn cmd_compare(
    config_path: &std::path::Path,
    data_path: &std::path::Path,
    strategies: &str,
) -> Result<()> {
    let (config, races) = load_inputs(config_path, data_path)?;
    let names: Vec<&str> = strategies
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect();
    if names.is_empty() {
        return Err(SimError::ConfigInvalid("no strategies to compare".into()).into());
    }

    let initial_fund = config.simulation.initial_fund;
    let mut entries = Vec::new();
    for name in names {
        let strategy = Strategy::from_config(name, &config.strategy.params)?;
        let engine = SimulationEngine::new(
            strategy,
            config.build_bankroll()?,
            config.build_filter(),
        )
        .with_confidence_level(config.monte_carlo.confidence_level);
        let result = engine.run(&races, initial_fund, None)?;
        println!(
            "{:<28} final {:>12} yen  ROI {:>8.2}%  hit {:>6.2}%",
            name, result.final_fund, result.metrics.roi, result.metrics.hit_rate
        );
        entries.push((name.to_string(), result));
    }

    let written = report::write_comparison_report(&entries, &config.output.directory)?;
    announce_written(&written);
    Ok(())
}

fn cmd_list() -> Result<()> {
    println!("{}", "Available strategies:".bold());
    for (name, description) in Strategy::available() {
        println!("  {:<28} {description}", name.cyan());
    }
    println!();
    println!("{}", "Available bankroll methods:".bold());
    for (name, description) in BankrollMethod::available() {
        println!("  {:<28} {description}", name.cyan());
    }
    Ok(())
}
