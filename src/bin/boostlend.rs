//! boostlend CLI
//!
//! Replays lending scenarios against the in-memory reference protocol and
//! answers offline health factor questions.

use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand, ValueEnum};
use console::style;
use dialoguer::Confirm;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;

use boostlend::cli::{CliConfig, HealthQuery, OutputFormat, OutputFormatter, Scenario, ScenarioRunner};
use boostlend::utils::math::Wad;

/// boostlend - over-collateralized lending risk core
#[derive(Parser)]
#[command(name = "boostlend")]
#[command(author = "Boostlend Team")]
#[command(version = boostlend::VERSION)]
#[command(about = "Scenario runner and risk calculator for the boostlend protocol", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Path to the configuration file
    #[arg(short, long, env = "BOOSTLEND_CONFIG")]
    config: Option<PathBuf>,

    /// Output format
    #[arg(short, long, value_enum, default_value = "text")]
    format: Format,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum Format {
    Text,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Replay a JSON scenario
    Simulate {
        /// Scenario file
        #[arg(short, long)]
        scenario: PathBuf,

        /// Write the full report as JSON
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Exit with an error if any step failed
        #[arg(long)]
        strict: bool,
    },

    /// Compute a health factor offline
    Health {
        /// Collateral amount in whole units
        #[arg(long)]
        collateral: Wad,

        /// Price per whole collateral unit
        #[arg(long)]
        price: Wad,

        /// Base collateral factor, e.g. 0.45
        #[arg(long)]
        factor: Wad,

        /// Debt in whole units
        #[arg(long)]
        debt: Wad,

        /// Boost bonus, e.g. 0.03
        #[arg(long, default_value = "0")]
        bonus: Wad,
    },

    /// Configuration management
    #[command(subcommand)]
    Config(ConfigCommands),
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Print the effective configuration
    Show,

    /// Write a default configuration file
    Init {
        /// Overwrite without asking
        #[arg(short, long)]
        force: bool,
    },
}

// ═══════════════════════════════════════════════════════════════════════════════
// MAIN
// ═══════════════════════════════════════════════════════════════════════════════

fn main() {
    let cli = Cli::parse();

    if let Err(e) = run(&cli) {
        eprintln!("{} {:#}", style("Error:").red().bold(), e);
        std::process::exit(1);
    }
}

fn run(cli: &Cli) -> anyhow::Result<()> {
    let path = cli.config.clone().unwrap_or_else(CliConfig::default_path);
    let config = CliConfig::load_or_default(&path)?.with_env()?;
    config.validate()?;

    init_logging(&config.log);

    let output = OutputFormatter::new(match cli.format {
        Format::Text => OutputFormat::Text,
        Format::Json => OutputFormat::JsonPretty,
    });

    match &cli.command {
        Commands::Simulate {
            scenario,
            output: report_path,
            strict,
        } => cmd_simulate(&config, &output, scenario, report_path.as_deref(), *strict),
        Commands::Health {
            collateral,
            price,
            factor,
            debt,
            bonus,
        } => {
            let query = HealthQuery {
                collateral: *collateral,
                price: *price,
                factor: *factor,
                debt: *debt,
                bonus: *bonus,
                cap: config.params.effective_factor_cap,
            };
            cmd_health(&output, &query)
        }
        Commands::Config(ConfigCommands::Show) => cmd_config_show(&output, &config, &path),
        Commands::Config(ConfigCommands::Init { force }) => cmd_config_init(&output, &path, *force),
    }
}

fn init_logging(filter: &str) {
    let filter = tracing_subscriber::EnvFilter::try_new(filter)
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

// ═══════════════════════════════════════════════════════════════════════════════
// COMMAND HANDLERS
// ═══════════════════════════════════════════════════════════════════════════════

fn cmd_simulate(
    config: &CliConfig,
    output: &OutputFormatter,
    scenario_path: &Path,
    report_path: Option<&Path>,
    strict: bool,
) -> anyhow::Result<()> {
    let content = std::fs::read_to_string(scenario_path)?;
    let scenario = Scenario::from_json(&content)?;
    info!(steps = scenario.steps.len(), name = %scenario.name, "replaying scenario");

    let mut runner = ScenarioRunner::new(&scenario, config.params.clone())?;
    let progress = create_progress(scenario.steps.len() as u64, output.is_json());
    for step in &scenario.steps {
        progress.set_message(step.action());
        runner.step(step);
        progress.inc(1);
    }
    progress.finish_and_clear();

    let report = runner.finish()?;

    if let Some(path) = report_path {
        let writer = BufWriter::new(File::create(path)?);
        serde_json::to_writer_pretty(writer, &report)?;
        output.success(&format!("Report written to {}", path.display()));
    }

    if output.is_json() {
        output.data(&report)?;
    } else {
        output.simulation_report(&report);
    }

    let failures = report.failures();
    if failures > 0 {
        output.warning(&format!("{} of {} steps failed", failures, report.steps.len()));
        if strict {
            anyhow::bail!("{} steps failed", failures);
        }
    }
    Ok(())
}

fn cmd_health(output: &OutputFormatter, query: &HealthQuery) -> anyhow::Result<()> {
    let answer = query.evaluate()?;

    if output.is_json() {
        output.data(&answer)?;
        return Ok(());
    }

    output.section("Health");
    output.kv("Collateral value", &answer.collateral_value.to_string());
    output.kv("Effective factor", &answer.effective_factor.to_string());
    output.kv("Borrowing capacity", &answer.borrowing_capacity.to_string());
    let hf = if answer.health_factor.is_max() {
        style("∞".to_string()).green()
    } else if answer.health_factor < Wad::ONE {
        style(answer.health_factor.to_string()).red().bold()
    } else {
        style(answer.health_factor.to_string()).green()
    };
    output.kv("Health factor", &hf.to_string());
    Ok(())
}

fn cmd_config_show(output: &OutputFormatter, config: &CliConfig, path: &Path) -> anyhow::Result<()> {
    if output.is_json() {
        output.data(config)?;
        return Ok(());
    }

    let params = &config.params;
    output.section("Configuration");
    output.kv("File", &path.display().to_string());
    output.kv("Log filter", &config.log);
    output.kv("Debt asset", params.debt_asset.as_str());
    output.kv("Boost asset", params.boost_asset.as_str());
    output.kv("Health threshold", &params.health_threshold.to_string());
    output.kv("Factor cap", &params.effective_factor_cap.to_string());
    output.kv("Liquidation bonus", &format!("{} bps", params.liquidation_bonus_bps));
    output.kv("Max price age", &format!("{}s", params.max_price_age_secs));
    output.kv("Max boost", &params.max_boost.to_string());
    output.kv("Boost reference", &params.boost_reference_stake.to_string());
    output.kv("Disbursement share", &format!("{} bps", params.disbursement_bps));
    Ok(())
}

fn cmd_config_init(output: &OutputFormatter, path: &Path, force: bool) -> anyhow::Result<()> {
    if path.exists() && !force {
        let overwrite = Confirm::new()
            .with_prompt(format!("{} exists. Overwrite?", path.display()))
            .default(false)
            .interact()?;
        if !overwrite {
            output.info("Left existing configuration untouched");
            return Ok(());
        }
    }

    CliConfig::default().save(path)?;
    output.success(&format!(
        "Configuration written to {} at {}",
        path.display(),
        chrono::Utc::now().to_rfc3339()
    ));
    Ok(())
}

// ═══════════════════════════════════════════════════════════════════════════════
// HELPER FUNCTIONS
// ═══════════════════════════════════════════════════════════════════════════════

fn create_progress(len: u64, hidden: bool) -> ProgressBar {
    if hidden {
        return ProgressBar::hidden();
    }
    let bar = ProgressBar::new(len);
    if let Ok(template) = ProgressStyle::with_template("{bar:30.cyan/blue} {pos}/{len} {msg}") {
        bar.set_style(template);
    }
    bar
}
