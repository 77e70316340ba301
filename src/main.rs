//! C2-Hunter command-line interface.
//!
//! ```text
//! c2-hunter beacon -f proxy.csv        rank outbound sessions by beacon score
//! c2-hunter dns -f dns.csv             rank super domains by subdomain fan-out
//! c2-hunter config init|show|set       manage the TOML configuration
//! ```
//!
//! Reports go to stdout (or `--output-file`); logs always go to stderr.

use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use c2_hunter::allowlist::AllowList;
use c2_hunter::config::Config;
use c2_hunter::export::{export_beacon_report, export_domain_report, OutputFormat};
use c2_hunter::{detect_beacons, detect_fanout, ingest};

const DEFAULT_CONFIG_PATH: &str = "c2_hunter.toml";

/// C2-Hunter: find C2 beaconing and DNS fan-out in collected network logs.
#[derive(Parser, Debug)]
#[command(name = "c2-hunter")]
#[command(author = "Security Team")]
#[command(version = "0.1.0")]
#[command(about = "Detect C2 beaconing and suspicious subdomain fan-out in network logs")]
#[command(long_about = None)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Treat missing configuration options as errors.
    #[arg(long, global = true)]
    strict: bool,

    /// Enable verbose logging (writes to stderr).
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Score outbound sessions in a flow log for beaconing.
    Beacon {
        /// Path to the delimited flow log.
        #[arg(short, long)]
        file: PathBuf,

        #[command(flatten)]
        report: ReportArgs,
    },

    /// Rank super domains in a DNS log by subdomain fan-out.
    Dns {
        /// Path to the delimited DNS log.
        #[arg(short, long)]
        file: PathBuf,

        #[command(flatten)]
        report: ReportArgs,
    },

    /// Inspect or edit the configuration file.
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(clap::Args, Debug)]
struct ReportArgs {
    /// Allow-list file (JSON array or one entry per line).
    #[arg(short, long)]
    allow_list: Option<PathBuf>,

    /// Output format: text, json, jsonl (overrides the config file).
    #[arg(short, long)]
    output: Option<OutputFormat>,

    /// Write the report to this file instead of stdout.
    #[arg(long)]
    output_file: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
enum ConfigAction {
    /// Print every option and its effective value.
    Show,

    /// Write a configuration file populated with defaults.
    Init {
        /// Overwrite an existing file.
        #[arg(long)]
        force: bool,
    },

    /// Change one option, e.g. `config set beacon.score_floor 0.75`.
    Set { key: String, value: String },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set tracing subscriber")?;

    match cli.command {
        Commands::Beacon { file, report } => {
            let config = load_config(cli.config.as_deref(), cli.strict)?;
            let allow_list = load_allow_list(report.allow_list.as_deref())?;

            info!("Analyzing flow log: {}", file.display());
            let input = ingest::open_input(&file)?;
            let result = detect_beacons(input, &config, &allow_list)?;

            let format = report.output.unwrap_or(config.output.format);
            emit(&export_beacon_report(&result, format), &report, &config)
        }

        Commands::Dns { file, report } => {
            let config = load_config(cli.config.as_deref(), cli.strict)?;
            let allow_list = load_allow_list(report.allow_list.as_deref())?;

            info!("Analyzing DNS log: {}", file.display());
            let input = ingest::open_input(&file)?;
            let result = detect_fanout(input, &config, &allow_list)?;

            let format = report.output.unwrap_or(config.output.format);
            emit(&export_domain_report(&result, format), &report, &config)
        }

        Commands::Config { action } => run_config(action, cli.config, cli.strict),
    }
}

fn load_config(path: Option<&Path>, strict: bool) -> Result<Config> {
    let loaded = Config::load_or_default(path, strict)?;
    if !loaded.defaulted.is_empty() {
        info!(
            "{} configuration options defaulted (use --strict to require them)",
            loaded.defaulted.len()
        );
    }
    Ok(loaded.config)
}

fn load_allow_list(path: Option<&Path>) -> Result<AllowList> {
    match path {
        Some(p) => {
            let list = AllowList::load(p)?;
            info!(
                "Loaded {} allow-list entries from {}: {}",
                list.len(),
                p.display(),
                list.entries().join(", ")
            );
            Ok(list)
        }
        None => Ok(AllowList::default()),
    }
}

/// Writes a rendered report to the requested destination.
fn emit(rendered: &str, args: &ReportArgs, config: &Config) -> Result<()> {
    let target = args
        .output_file
        .clone()
        .or_else(|| config.output.file.as_ref().map(PathBuf::from));

    match target {
        Some(path) => {
            std::fs::write(&path, format!("{}\n", rendered))
                .with_context(|| format!("Failed to write report: {}", path.display()))?;
            info!("Report written to {}", path.display());
        }
        None => {
            let mut stdout = std::io::stdout().lock();
            writeln!(stdout, "{}", rendered).context("Failed to write report to stdout")?;
        }
    }
    Ok(())
}

fn run_config(action: ConfigAction, path: Option<PathBuf>, strict: bool) -> Result<()> {
    match action {
        ConfigAction::Show => {
            let config = load_config(path.as_deref(), strict)?;
            println!("{:<28} {}", "Option", "Value");
            println!("{}", "-".repeat(60));
            for (key, value) in config.entries() {
                println!("{:<28} {}", key, value);
            }
            Ok(())
        }

        ConfigAction::Init { force } => {
            let path = path.unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH));
            if path.exists() && !force {
                bail!(
                    "{} already exists (use --force to overwrite)",
                    path.display()
                );
            }
            std::fs::write(&path, Config::generate_default())
                .with_context(|| format!("Failed to write config file: {}", path.display()))?;
            println!("Wrote default configuration to {}", path.display());
            Ok(())
        }

        ConfigAction::Set { key, value } => {
            let path = path.unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH));
            if !path.exists() {
                bail!(
                    "{} does not exist (run `c2-hunter config init` first)",
                    path.display()
                );
            }
            let mut config = Config::load(&path, strict)?.config;
            config.set(&key, &value)?;
            config.save(&path)?;
            println!("{} = {}", key, config.get(&key).unwrap_or_default());
            Ok(())
        }
    }
}
