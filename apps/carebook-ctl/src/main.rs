use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use carebook_core::domain::access_log::online_users;
use carebook_core::CarebookCore;
use chrono::Utc;
use clap::{Parser, Subcommand};
use runtime::{AppConfig, CliArgs};

/// Carebook operator tool: configuration, backups and access logs
#[derive(Parser)]
#[command(name = "carebook-ctl")]
#[command(about = "Carebook operator tool: configuration, backups and access logs")]
#[command(version)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Data directory (overrides app.home_dir)
    #[arg(long)]
    home_dir: Option<String>,

    /// Print current configuration and exit
    #[arg(long)]
    print_config: bool,

    /// Log verbosity level (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Check configuration and open the store
    Check,
    /// Write a full backup of every reserved key
    Export {
        /// Output file (defaults to the dated backup name in the current directory)
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Restore a backup file, overwriting the keys it contains
    Import {
        /// Backup file produced by `export`
        file: PathBuf,
    },
    /// Estimate the storage footprint
    Usage,
    /// List the user directory
    Users,
    /// Show the access log, newest first
    Logs {
        /// Include entries pulled from the remote relay
        #[arg(long)]
        remote: bool,
        /// Only list identifiers active in the last ten minutes
        #[arg(long)]
        online: bool,
        /// Maximum number of entries printed
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let args = CliArgs {
        config: cli.config.as_ref().map(|p| p.to_string_lossy().to_string()),
        home_dir: cli.home_dir.clone(),
        print_config: cli.print_config,
        verbose: cli.verbose,
    };

    let mut config = AppConfig::load_or_default(cli.config.as_deref())?;
    config.apply_cli_overrides(&args);
    if args.home_dir.is_some() {
        config.normalize_home_dir()?;
    }

    let logging_config = config.logging.as_ref().cloned().unwrap_or_default();
    runtime::logging::init_logging_from_config(&logging_config, Path::new(&config.app.home_dir));
    tracing::debug!(home_dir = %config.app.home_dir, "carebook-ctl starting");

    if cli.print_config {
        println!("{}", config.to_yaml()?);
        return Ok(());
    }

    match cli.command.unwrap_or(Commands::Check) {
        Commands::Check => check_config(&config),
        Commands::Export { out } => export(&config, out),
        Commands::Import { file } => import(&config, &file),
        Commands::Usage => usage(&config),
        Commands::Users => users(&config),
        Commands::Logs {
            remote,
            online,
            limit,
        } => logs(&config, remote, online, limit).await,
    }
}

fn open_core(config: &AppConfig) -> Result<CarebookCore> {
    CarebookCore::from_app_config(config).context("Failed to initialize carebook core")
}

fn check_config(config: &AppConfig) -> Result<()> {
    tracing::info!("Checking configuration...");
    let core = open_core(config)?;

    println!("Configuration check passed");
    println!("home_dir: {}", config.app.home_dir);
    match &core.config().relay_endpoint {
        Some(url) => println!("relay: {url}"),
        None => println!("relay: disabled"),
    }
    println!("{}", config.to_yaml()?);
    Ok(())
}

fn export(config: &AppConfig, out: Option<PathBuf>) -> Result<()> {
    let core = open_core(config)?;
    let backup = core.store().export_all()?;
    let path = out.unwrap_or_else(|| PathBuf::from(&backup.file_name));

    std::fs::write(&path, &backup.contents)
        .with_context(|| format!("Failed to write backup to {}", path.display()))?;
    println!("Backup written to {}", path.display());
    Ok(())
}

fn import(config: &AppConfig, file: &Path) -> Result<()> {
    let blob = std::fs::read_to_string(file)
        .with_context(|| format!("Failed to read backup {}", file.display()))?;

    let core = open_core(config)?;
    if !core.import_all(&blob) {
        bail!("{} is not a valid carebook backup", file.display());
    }
    println!("Backup restored from {}", file.display());
    Ok(())
}

fn usage(config: &AppConfig) -> Result<()> {
    let core = open_core(config)?;
    println!("{}", core.store().storage_usage());
    Ok(())
}

fn users(config: &AppConfig) -> Result<()> {
    let core = open_core(config)?;
    let users = core.store().load_users();
    if users.is_empty() {
        println!("No accounts");
        return Ok(());
    }
    for user in users {
        println!(
            "{}\t{}\tlast active {}",
            user.email,
            if user.blocked { "blocked" } else { "active" },
            user.last_active.to_rfc3339()
        );
    }
    Ok(())
}

async fn logs(config: &AppConfig, remote: bool, online: bool, limit: usize) -> Result<()> {
    let core = open_core(config)?;
    let log = core.access_log();
    let entries = if remote {
        log.merged_with_remote().await
    } else {
        log.entries()
    };

    if online {
        for email in online_users(&entries, Utc::now()) {
            println!("{email}");
        }
        return Ok(());
    }

    for entry in entries.iter().take(limit) {
        println!(
            "{}\t{}\t{}\t{}\t{}{}",
            entry.timestamp.to_rfc3339(),
            entry.email,
            serde_json::to_value(entry.action)?.as_str().unwrap_or_default(),
            serde_json::to_value(entry.status)?.as_str().unwrap_or_default(),
            entry.device,
            if entry.is_remote { "\t(remote)" } else { "" }
        );
    }
    Ok(())
}
