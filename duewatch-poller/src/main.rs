//! Duewatch Poller
//!
//! Background service that sends "due" notifications for library borrows
//! and reservations.
//!
//! Architecture:
//! - Configuration: environment (optionally from `.env`) plus command line
//! - Client: authenticated access to the library API (duewatch-client)
//! - Services: the pending queue and the dead-letter sink
//! - Scheduler: the fetch loop (producer) and dispatch loop (consumer)
//!
//! The poller logs in with the system account, then fetches the items due
//! in consecutive time windows and submits each one back to the API once
//! its due instant is reached; the API sends the e-mail. Startup
//! authentication failure exits non-zero; an interrupt exits cleanly.

mod config;
mod scheduler;
mod service;

use anyhow::{Context, Result};
use clap::Parser;
use duewatch_core::domain::DueKind;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, error, info, info_span, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::{Config, LogFormat};
use crate::scheduler::{DispatchLoop, DispatchStats, FetchLoop, FetchStats, SystemClock};
use crate::service::{DeadLetterSink, DiscardDeadLetters, JsonlDeadLetterFile, PendingQueue};
use duewatch_client::{AuthClient, DueItemApi, DueItemClient, LibraryApi, TokenStore};

#[derive(Parser)]
#[command(name = "duewatch-poller")]
#[command(about = "Sends due-date notifications for library borrows and reservations", long_about = None)]
struct Cli {
    /// Records to watch (overrides DUEWATCH_KIND)
    kind: Option<DueKind>,

    /// Library API base URL (overrides DUEWATCH_API_URL)
    #[arg(long)]
    api_url: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // A missing .env file is fine; the environment may already be set
    let dotenv = dotenvy::dotenv();
    let cli = Cli::parse();

    init_tracing(LogFormat::from_env());

    info!("Starting Duewatch poller");
    if let Ok(path) = dotenv {
        info!("Loaded environment from {}", path.display());
    }

    let config = load_config(cli)?;
    info!(
        "Loaded configuration: instance_id={}, kind={}, api_url={}",
        config.instance_id, config.kind, config.api_url
    );

    let api = LibraryApi::with_timeout(config.api_url.clone(), config.http_timeout)
        .context("Failed to build HTTP client")?;
    let auth = Arc::new(AuthClient::new(api.clone(), Arc::new(TokenStore::new())));

    if let Err(e) = auth.authenticate(&config.email, &config.password).await {
        error!("Authentication failed: {}", e);
        return Err(e).context("Startup authentication failed");
    }

    let client: Arc<dyn DueItemApi> = Arc::new(DueItemClient::new(api, auth, config.kind));
    let queue = Arc::new(PendingQueue::new(config.queue_order));
    let clock = Arc::new(SystemClock::new(config.timezone));

    let dead_letters: Arc<dyn DeadLetterSink> = match &config.dead_letter_path {
        Some(path) => {
            info!("Failed submissions will be appended to {}", path.display());
            Arc::new(JsonlDeadLetterFile::new(path.clone()))
        }
        None => Arc::new(DiscardDeadLetters),
    };

    let fetch_loop = FetchLoop::new(
        Arc::clone(&client),
        Arc::clone(&queue),
        clock.clone(),
        config.fetch_interval,
    )?;
    let dispatch_loop = DispatchLoop::new(
        client,
        Arc::clone(&queue),
        clock,
        dead_letters,
        config.idle_poll,
    );

    info!(
        "Fetch interval: {:?}, idle poll: {:?}, queue order: {}, timezone: {}",
        config.fetch_interval, config.idle_poll, config.queue_order, config.timezone
    );

    let cancel = CancellationToken::new();
    let span = |name: &'static str| {
        info_span!("loop", loop_name = name, instance = %config.instance_id, kind = %config.kind)
    };
    let fetch_handle = tokio::spawn(fetch_loop.run(cancel.clone()).instrument(span("fetch")));
    let dispatch_handle =
        tokio::spawn(dispatch_loop.run(cancel.clone()).instrument(span("dispatch")));

    let (fetch_stats, dispatch_stats) =
        supervise(fetch_handle, dispatch_handle, cancel).await?;

    if !queue.is_empty() {
        warn!("Dropping {} pending item(s) on shutdown", queue.len());
    }
    info!(
        "Fetch cycles: {}, enqueued: {}, discarded: {}, fetch failures: {}",
        fetch_stats.cycles, fetch_stats.enqueued, fetch_stats.discarded, fetch_stats.failures
    );
    info!(
        "Submitted: {}, failed: {}, requeued: {}",
        dispatch_stats.submitted, dispatch_stats.failed, dispatch_stats.requeued
    );
    info!("Duewatch poller stopped");

    Ok(())
}

fn init_tracing(format: LogFormat) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "duewatch_poller=info,duewatch_client=info".into());

    let (text, json) = match format {
        LogFormat::Text => (Some(tracing_subscriber::fmt::layer()), None),
        LogFormat::Json => (None, Some(tracing_subscriber::fmt::layer().json())),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(text)
        .with(json)
        .init();
}

/// Loads configuration from the environment and applies command-line overrides
fn load_config(cli: Cli) -> Result<Config> {
    let mut config = Config::from_env().context("Failed to load configuration")?;

    if let Some(kind) = cli.kind {
        config.kind = kind;
    }
    if let Some(api_url) = cli.api_url {
        config.api_url = api_url;
    }

    config.validate()?;
    Ok(config)
}

/// Waits for an interrupt, then stops both loops and collects their counters
///
/// The loops only return once cancelled, so one finishing on its own means
/// it panicked; the other is then stopped and the panic reported.
async fn supervise(
    mut fetch: JoinHandle<FetchStats>,
    mut dispatch: JoinHandle<DispatchStats>,
    cancel: CancellationToken,
) -> Result<(FetchStats, DispatchStats)> {
    tokio::select! {
        _ = shutdown_signal() => {
            info!("Interrupt received, stopping the process");
        }
        result = &mut fetch => {
            cancel.cancel();
            let _ = dispatch.await;
            result.context("Fetch loop terminated")?;
            anyhow::bail!("Fetch loop exited unexpectedly");
        }
        result = &mut dispatch => {
            cancel.cancel();
            let _ = fetch.await;
            result.context("Dispatch loop terminated")?;
            anyhow::bail!("Dispatch loop exited unexpectedly");
        }
    }

    cancel.cancel();
    let fetch_stats = fetch.await.context("Fetch loop panicked")?;
    let dispatch_stats = dispatch.await.context("Dispatch loop panicked")?;

    Ok((fetch_stats, dispatch_stats))
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
