use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use mail_triage::config::Config;
use mail_triage::rules::RuleLoader;
use mail_triage::runner;
use mail_triage::store::LibSqlBackend;

/// Fetch Gmail messages into a local database and apply rules to them.
#[derive(Debug, Parser)]
#[command(version, about)]
struct Args {
    /// Only fetch messages, don't process rules.
    #[arg(long, conflicts_with = "process_only")]
    fetch_only: bool,

    /// Only process rules, don't fetch new messages.
    #[arg(long)]
    process_only: bool,

    /// Initialize the database and exit.
    #[arg(long)]
    init_db: bool,
}

fn init_tracing() -> anyhow::Result<WorkerGuard> {
    let log_file = Config::log_file_from_env();
    let dir = log_file
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .map(|p| p.to_path_buf())
        .unwrap_or_else(|| ".".into());
    let file_name = log_file
        .file_name()
        .context("MAIL_TRIAGE_LOG_FILE has no file name")?;

    let appender = tracing_appender::rolling::never(dir, file_name);
    let (file_writer, guard) = tracing_appender::non_blocking(appender);

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(file_writer),
        )
        .init();

    Ok(guard)
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    let _guard = match init_tracing() {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Error: failed to initialize logging: {e:#}");
            return ExitCode::FAILURE;
        }
    };

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %format!("{e:#}"), "Run failed");
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> anyhow::Result<()> {
    let db_path = Config::db_path_from_env();
    let store = LibSqlBackend::new_local(&db_path)
        .await
        .with_context(|| format!("failed to open database at {}", db_path.display()))?;
    runner::init_schema(&store)
        .await
        .context("database initialization failed")?;

    if args.init_db {
        tracing::info!(path = %db_path.display(), "Database initialized");
        return Ok(());
    }

    tracing::info!("Mail triage starting");
    let config = Config::from_env().context("invalid configuration")?;
    config.validate().context("invalid configuration")?;

    let provider = runner::gmail_provider(&config);

    if !args.process_only {
        match runner::fetch_step(&provider, &store, &config.fetch).await {
            Ok(report) => {
                tracing::info!(succeeded = report.succeeded, "Fetched messages");
                if report.failed > 0 {
                    tracing::warn!(failed = report.failed, "Some messages failed to fetch");
                }
            }
            Err(e) => tracing::error!(error = %e, "Fetch step failed, continuing"),
        }
    }

    if !args.fetch_only {
        let stats = runner::process_step(
            &provider,
            &store,
            RuleLoader::from_path(&config.rules_file),
            config.process_batch_size,
        )
        .await
        .context("rule processing failed")?;

        if stats.actions_failed > 0 {
            tracing::warn!(failed = stats.actions_failed, "Some actions failed");
        }
    }

    tracing::info!("Mail triage completed");
    Ok(())
}
