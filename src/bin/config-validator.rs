//! # Offer Scheduler Configuration Validator
//!
//! Command-line tool that loads the layered scheduler configuration for an
//! environment, validates it and prints the result. Catches configuration
//! problems before a scheduler is started with them.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use offer_scheduler::config::{ConfigManager, LaunchConstrainerMode, SchedulerConfig};
use std::path::PathBuf;
use std::process;
use tracing::{error, info, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser)]
#[command(name = "config-validator")]
#[command(about = "Validate offer scheduler configuration files")]
#[command(version = env!("CARGO_PKG_VERSION"))]
pub struct Cli {
    /// Environment overlay to apply (development, test, production, ...)
    #[arg(short, long, default_value = "development")]
    environment: String,

    /// Configuration directory (default: $OFFER_SCHEDULER_CONFIG_DIR or ./config)
    #[arg(short, long)]
    config_dir: Option<PathBuf>,

    /// Verbose output level (use multiple times for more verbosity)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Load and validate the configuration (default)
    Validate,

    /// Print the effective configuration as JSON
    Dump,

    /// Compare the effective configuration of two environments
    Compare {
        #[arg(short, long, default_value = "development")]
        base: String,

        #[arg(short, long)]
        target: String,
    },
}

fn main() {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };
    let _ = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .try_init();

    let result = match &cli.command {
        Some(Commands::Validate) | None => validate(&cli),
        Some(Commands::Dump) => dump(&cli),
        Some(Commands::Compare { base, target }) => compare(&cli, base, target),
    };

    match result {
        Ok(()) => {
            info!("Configuration validation completed successfully");
            process::exit(0);
        }
        Err(e) => {
            error!("Configuration validation failed: {e:#}");
            eprintln!("❌ {e:#}");
            process::exit(1);
        }
    }
}

fn load(cli: &Cli, environment: &str) -> Result<std::sync::Arc<ConfigManager>> {
    ConfigManager::load_from_directory_with_env(cli.config_dir.clone(), environment)
        .with_context(|| format!("loading configuration for environment '{environment}'"))
}

fn validate(cli: &Cli) -> Result<()> {
    println!("🔧 Validating offer scheduler configuration");
    println!("Environment: {}", cli.environment);

    let manager = load(cli, &cli.environment)?;
    println!(
        "✅ Loaded from {}",
        manager.config_directory().display()
    );
    summarize(manager.config());

    println!("\n🎉 Configuration is valid");
    Ok(())
}

fn summarize(config: &SchedulerConfig) {
    if config.offers.is_unbounded() {
        println!("  offers: unbounded queue");
    } else {
        println!("  offers: queue of {}", config.offers.queue_size);
    }
    println!(
        "  revive: {} tokens, refill every {:?}",
        config.revive.capacity,
        config.revive.refill_interval()
    );
    match config.recovery.permanent_failure_timeout() {
        Some(timeout) => println!("  recovery: permanent after {timeout:?}"),
        None => println!("  recovery: permanent only when labeled"),
    }
    if config.recovery.launch_constrainer == LaunchConstrainerMode::Timed {
        println!(
            "  recovery: at most one permanent recovery per {:?}",
            config.recovery.min_delay_between_permanent_recoveries()
        );
    }
    println!(
        "  task killer: retry every {:?}",
        config.task_killer.retry_interval()
    );
    println!(
        "  reconciliation: backoff {:?} up to {:?}",
        config.reconciliation.base_backoff(),
        config.reconciliation.max_backoff()
    );
}

fn dump(cli: &Cli) -> Result<()> {
    let manager = load(cli, &cli.environment)?;
    let rendered = serde_json::to_string_pretty(&manager.debug_config())
        .context("rendering configuration")?;
    println!("{rendered}");
    Ok(())
}

fn compare(cli: &Cli, base: &str, target: &str) -> Result<()> {
    let base_config = load(cli, base)?.debug_config();
    let target_config = load(cli, target)?.debug_config();

    println!("🔍 Comparing {base} → {target}");
    let mut differences = 0;
    if let (Some(base_sections), Some(target_sections)) =
        (base_config.as_object(), target_config.as_object())
    {
        for (section, base_value) in base_sections {
            let target_value = target_sections.get(section);
            if target_value != Some(base_value) {
                differences += 1;
                println!("  {section}:");
                println!("    {base}: {base_value}");
                match target_value {
                    Some(value) => println!("    {target}: {value}"),
                    None => println!("    {target}: <missing>"),
                }
            }
        }
    }

    if differences == 0 {
        println!("✅ No differences");
    }
    Ok(())
}
