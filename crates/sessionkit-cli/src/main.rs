//! sessionkit: Diagnose, scan, compare and generate DAW project files

mod output;

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::Context;
use clap::{Parser, Subcommand};
use serde::Serialize;
use sessionkit_core::Grade;
use sessionkit_services::{CancellationToken, Config, ScanEvent, ScanFilters};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "sessionkit")]
#[command(about = "Inspect, compare and generate DAW project files")]
#[command(version = env!("CARGO_PKG_VERSION"))]
struct Cli {
    /// Config file (defaults to the user config directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Print reports as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Debug logging (overridden by RUST_LOG)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Health report and validation for one project
    Diagnose {
        file: PathBuf,
    },
    /// Structural validation only; exits non-zero when the file would not load
    Validate {
        file: PathBuf,
    },
    /// Diagnose every project under a directory
    Scan {
        dir: PathBuf,

        /// Worker threads (0 = one per core)
        #[arg(short, long)]
        jobs: Option<usize>,

        /// File extension to include; repeatable
        #[arg(long = "ext")]
        extensions: Vec<String>,

        /// Only the top-level directory
        #[arg(long)]
        no_recursive: bool,

        /// Also scan `Backup` directories
        #[arg(long)]
        include_backups: bool,

        /// Case-insensitive file name filter
        #[arg(long)]
        name: Option<String>,

        /// Only report files graded this or worse
        #[arg(long)]
        max_grade: Option<Grade>,
    },
    /// Diff two versions of a project
    Compare {
        old: PathBuf,
        new: PathBuf,
    },
    /// Build a project from a song spec (TOML or JSON) and a template
    Generate {
        spec: PathBuf,

        #[arg(short, long)]
        template: PathBuf,

        #[arg(short, long)]
        out: PathBuf,
    },
    /// Print the effective configuration as TOML
    ShowConfig,
}

fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();
    init_logging(cli.verbose)?;

    let config = Config::load(cli.config.as_deref())?;
    let policy = &config.health;

    match cli.command {
        Commands::Diagnose { file } => {
            let diagnosis = sessionkit_services::diagnose(&file, policy)?;
            emit(cli.json, &diagnosis, output::diagnosis)?;
        }
        Commands::Validate { file } => {
            let doc = sessionkit_services::read_document(&file)?;
            let report = sessionkit_core::validate(&doc);
            emit(cli.json, &report, output::validation)?;
            if !report.is_loadable() {
                return Ok(ExitCode::FAILURE);
            }
        }
        Commands::Scan {
            dir,
            jobs,
            extensions,
            no_recursive,
            include_backups,
            name,
            max_grade,
        } => {
            let mut filters = ScanFilters::from(&config.scan);
            if let Some(jobs) = jobs {
                filters.jobs = jobs;
            }
            if !extensions.is_empty() {
                filters.extensions = extensions
                    .iter()
                    .map(|e| e.trim_start_matches('.').to_ascii_lowercase())
                    .collect();
            }
            filters.recursive &= !no_recursive;
            filters.skip_backups &= !include_backups;
            filters.name_contains = name;
            filters.max_grade = max_grade;

            let outcome = scan_with_progress(&dir, &filters, policy)?;
            emit(cli.json, &outcome, output::scan)?;
        }
        Commands::Compare { old, new } => {
            let report = sessionkit_services::compare(&old, &new, policy)?;
            emit(cli.json, &report, output::diff)?;
        }
        Commands::Generate { spec, template, out } => {
            let song = sessionkit_services::load_song_spec(&spec)?;
            let doc = sessionkit_services::generate(&song, &template, &out)
                .with_context(|| format!("Generating {:?} from {}", song.name, template.display()))?;
            let report = sessionkit_core::analyze_with(&doc, policy);
            emit(cli.json, &report, output::health)?;
        }
        Commands::ShowConfig => {
            print!("{}", config.to_toml()?);
        }
    }

    Ok(ExitCode::SUCCESS)
}

fn init_logging(verbose: bool) -> anyhow::Result<()> {
    let default = if verbose { "sessionkit=debug" } else { "sessionkit=info" };
    let filter = match std::env::var("RUST_LOG") {
        Ok(_) => tracing_subscriber::EnvFilter::from_default_env(),
        Err(_) => tracing_subscriber::EnvFilter::new("warn").add_directive(default.parse()?),
    };
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();
    Ok(())
}

fn emit<T: Serialize>(json: bool, value: &T, text: fn(&T) -> String) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(value)?);
    } else {
        print!("{}", text(value));
    }
    Ok(())
}

/// Run a scan, logging progress from a listener thread
fn scan_with_progress(
    dir: &Path,
    filters: &ScanFilters,
    policy: &sessionkit_core::HealthPolicy,
) -> anyhow::Result<sessionkit_services::ScanOutcome> {
    let (tx, rx) = crossbeam_channel::unbounded();
    let listener = std::thread::spawn(move || {
        for event in rx {
            if let ScanEvent::FileDone { path, status, done, total } = event {
                tracing::debug!(path = %path.display(), ?status, done, total, "Scanned");
            }
        }
    });

    let cancel = CancellationToken::new();
    let outcome = sessionkit_services::scan(dir, filters, policy, &cancel, Some(&tx));
    drop(tx);
    let _ = listener.join();
    outcome.with_context(|| format!("Scanning {}", dir.display()))
}
