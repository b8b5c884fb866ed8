use std::io::Write;
use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use dxbench::config::{self, Cli, Command, GlobalArgs, DEFAULT_PORT};
use dxbench::zipf::run_zipf;
use dxbench::{
    execute_compare, write_report, DxError, Engine, Holder, HostPool, RunOutcome, Specs,
};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> ExitCode {
    config::load_env(Path::new("."));
    let cli = Cli::parse();

    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "dxbench=info,index_client=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cancel = CancellationToken::new();
    let interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupt received, cancelling run");
            interrupt.cancel();
        }
    });

    match run(cli, cancel).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{:#}", e);
            let code = e.downcast_ref::<DxError>().map(DxError::exit_code).unwrap_or(1);
            ExitCode::from(code)
        }
    }
}

async fn run(cli: Cli, cancel: CancellationToken) -> anyhow::Result<()> {
    let mut out = std::io::stdout();
    match cli.command {
        Command::Compare(args) => {
            let comparison = execute_compare(&args.file1, &args.file2)
                .with_context(|| format!("error comparing {}", args.file1.display()))?;
            write_report(&mut out, &comparison, cli.global.format)?;
        }
        Command::Zipf(args) => {
            let config = args.config();
            let pool = HostPool::connect(
                &config.hosts,
                DEFAULT_PORT,
                &args.adapter_options(&cli.global),
            )?;
            let report = run_zipf(Arc::new(pool), &config, cancel).await?;
            serde_json::to_writer_pretty(&mut out, &report)?;
            writeln!(out)?;
        }
        Command::Query(args) => {
            let engine = build_engine(&cli.global, cancel).await?;
            let outcome = engine
                .run_query(&args.queries, args.rows, &mut out)
                .await
                .context("could not execute solo queries")?;
            log_outcome(outcome)?;
        }
        Command::Ingest(args) => {
            let engine = build_engine(&cli.global, cancel).await?;
            let outcome = engine
                .run_ingest(&args.params(), &mut out)
                .await
                .context("could not execute solo ingest")?;
            log_outcome(outcome)?;
        }
    }
    Ok(())
}

async fn build_engine(global: &GlobalArgs, cancel: CancellationToken) -> anyhow::Result<Engine> {
    let instance = global.instance()?;
    let specs = Specs::load(global.specs_path()?)?;
    let (hosts, port) = global.hosts_for(instance)?;
    std::fs::create_dir_all(&global.data_dir).map_err(DxError::from)?;

    let holder = Holder::connect(instance, hosts, port, &specs, &global.adapter_options())
        .await
        .with_context(|| format!("could not create holder for {}", instance))?;
    Ok(Engine::new(
        Arc::new(holder),
        specs,
        global.engine_config(),
        cancel,
    ))
}

/// The report is already written when this runs; a stale artifact still fails the command.
fn log_outcome(outcome: RunOutcome) -> anyhow::Result<()> {
    match outcome {
        RunOutcome::Recorded(path) => tracing::info!(
            "First run recorded to {}; run again against the other instance to compare",
            path.display()
        ),
        RunOutcome::Compared(comparison) => tracing::info!(
            "Compared {} batches of {} -> {}",
            comparison.benchmarks.len(),
            comparison.first,
            comparison.second
        ),
        RunOutcome::StaleArtifact { comparison, error } => {
            tracing::info!(
                "Compared {} batches of {} -> {}",
                comparison.benchmarks.len(),
                comparison.first,
                comparison.second
            );
            return Err(anyhow::Error::new(error).context("could not remove first-run artifact"));
        }
    }
    Ok(())
}
