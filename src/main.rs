use std::{io, path::PathBuf, process::ExitCode};

use clap::Parser;
use log::{error, warn};
use photo_fraud_scan::{
    FraudScanner, ScanConfig,
    error::{Result, ScanError},
    loader::user_folders,
    report::{JsonSink, ReportSink, TextReport},
};
use tracing_subscriber::EnvFilter;

/// Flags user photo collections that look fraudulent.
#[derive(Parser, Debug)]
#[command(name = "photo-fraud-scan", version, about)]
struct Cli {
    /// Reference overlay icon searched for in every image.
    #[arg(long, default_value = "camera.png")]
    icon: PathBuf,

    /// JSON file overriding the default thresholds.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Directory whose subdirectories are scanned as users.
    #[arg(long)]
    users_root: Option<PathBuf>,

    /// Worker pool size.
    #[arg(long)]
    threads: Option<usize>,

    /// Scan everything on the calling thread.
    #[arg(long)]
    sequential: bool,

    /// Emit the report as JSON.
    #[arg(long)]
    json: bool,

    /// User folders to scan.
    folders: Vec<PathBuf>,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(io::stderr)
        .init();

    match run(Cli::parse()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("{err}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    let mut config = match &cli.config {
        Some(path) => ScanConfig::from_json_file(path)?,
        None => ScanConfig::default(),
    };
    if cli.threads.is_some() {
        config.threads = cli.threads;
    }
    if cli.sequential {
        config.parallel = false;
    }

    let folders = collect_folders(&cli)?;
    let scanner = FraudScanner::new(&cli.icon)?.with_config(config);
    let result = scanner.scan(&folders)?;

    let stdout = io::stdout().lock();
    if cli.json {
        JsonSink::new(stdout).emit(&result)
    } else {
        let icon_name = cli
            .icon
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| cli.icon.display().to_string());
        TextReport::new(stdout).with_icon_name(icon_name).emit(&result)
    }
}

fn collect_folders(cli: &Cli) -> Result<Vec<PathBuf>> {
    if cli.folders.is_empty() && cli.users_root.is_none() {
        return Err(ScanError::InvalidParameter(
            "no user folders given; pass folders or --users-root".into(),
        ));
    }

    let mut folders = cli.folders.clone();
    if let Some(root) = &cli.users_root {
        let found = user_folders(root)?;
        if found.is_empty() {
            warn!("{} contains no user folders", root.display());
        }
        folders.extend(found);
    }

    Ok(folders)
}
