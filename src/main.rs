use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use std::io::Read as _;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use permit_desk::config;
use permit_desk::permits::{self, PermitError, PermitQuery, FETCH_FALLBACK_GUIDANCE};
use permit_desk::server;
use permit_desk::source::{FileBlob, ReportSource};

#[derive(Parser)]
#[command(
    name = "pdesk",
    version,
    about = "Building permit report ingestion and research desk"
)]
struct Cli {
    /// Path to the configuration file.
    #[arg(long, global = true, default_value = "./config/pdesk.toml", value_name = "PATH")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Ingest permit reports and emit normalized rows or CSV.
    ///
    /// Exactly one source must be given: --fetch downloads the live
    /// reports, --files reads saved report files, --stdin reads pasted
    /// report text from standard input.
    Permits(PermitsArgs),

    /// Run the HTTP API server.
    Serve,
}

#[derive(Args)]
#[command(group = clap::ArgGroup::new("report_source")
    .required(true)
    .multiple(false)
    .args(["fetch", "files", "stdin"]))]
struct PermitsArgs {
    /// Download the live reports from the configured endpoints.
    #[arg(long)]
    fetch: bool,

    /// Read one or more saved report files.
    #[arg(long, num_args = 1.., value_name = "PATH")]
    files: Vec<PathBuf>,

    /// Read report text from standard input.
    #[arg(long)]
    stdin: bool,

    /// Day window counted back from today, both ends inclusive.
    #[arg(long, value_name = "N", value_parser = clap::value_parser!(u32).range(1..))]
    days: Option<u32>,

    /// Keep only permits issued to homeowners acting as their own contractor.
    #[arg(long)]
    homeowner_only: bool,

    /// Project code whose report sections are scanned.
    #[arg(long, value_name = "CODE")]
    project_code: Option<String>,

    /// Write the rows as CSV to this path.
    #[arg(long, value_name = "PATH")]
    export: Option<PathBuf>,

    /// Print the CSV to stdout instead of the summary.
    #[arg(long)]
    print: bool,
}

#[tokio::main]
async fn main() {
    // Usage errors exit 1, not clap's default 2: exit code 2 is reserved
    // for the fetch-unavailable case below.
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(error) => {
            let code = if error.use_stderr() { 1 } else { 0 };
            let _ = error.print();
            std::process::exit(code);
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .init();

    if let Err(error) = run(cli).await {
        // Live-fetch failure is the one recoverable case and gets its own
        // exit code so wrappers can switch to the file/paste fallback.
        if let Some(PermitError::FetchUnavailable(detail)) = error.downcast_ref::<PermitError>() {
            tracing::warn!(detail = %detail, "live report fetch failed");
            eprintln!("{}", FETCH_FALLBACK_GUIDANCE);
            std::process::exit(2);
        }
        eprintln!("Error: {:#}", error);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Serve => server::run_server(&config).await,
        Commands::Permits(args) => {
            let days = args.days.unwrap_or(config.permits.default_days);

            let source = if args.fetch {
                ReportSource::Fetch { days }
            } else if args.stdin {
                let mut text = String::new();
                std::io::stdin()
                    .read_to_string(&mut text)
                    .context("Failed to read report text from stdin")?;
                ReportSource::Stdin(text)
            } else {
                let mut blobs = Vec::new();
                for path in &args.files {
                    let bytes = std::fs::read(path)
                        .with_context(|| format!("Failed to read report file: {}", path.display()))?;
                    let name = path
                        .file_name()
                        .map(|n| n.to_string_lossy().into_owned())
                        .unwrap_or_else(|| path.display().to_string());
                    blobs.push(FileBlob { name, bytes });
                }
                ReportSource::Files(blobs)
            };

            let query = PermitQuery {
                source,
                days,
                homeowner_only: args.homeowner_only,
                project_code: args.project_code,
            };
            permits::run_permits(&config, query, args.export.as_deref(), args.print).await
        }
    }
}
