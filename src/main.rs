// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025-2026 JR Morton

//! logwarden: login watchdog with pluggable notifiers.
//!
//! This is the main entry point. It parses the command line, loads the TOML
//! config, sets up logging and hands off to the orchestrator:
//!
//! - **watcher**: per-platform login detection (auth log, unified log, event log)
//! - **sources**: tailing, classification, historical lookback, log integrity
//! - **notify**: webhook, Slack, Telegram, DingTalk, WeCom, Feishu and email sinks
//! - **core**: event type, dispatcher, application state, orchestration
//!
//! The architecture is a channel pipeline:
//! Watcher + IntegrityMonitor → event_tx → Dispatcher → notifiers

mod config;
mod core;
mod notify;
mod sources;
mod watcher;

#[cfg(test)]
mod testing;

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::config::Config;
use crate::core::app_state::{AppState, RunOverrides};
use crate::core::dispatcher::Dispatcher;

#[derive(Parser, Debug)]
#[command(name = "logwarden", version, about = "Watch system logs for logins and notify on every one")]
struct Args {
    /// Path to the TOML config file
    #[arg(short, long, default_value = config::DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Also report logins from this far back (e.g. `30m`, `2h`); overrides `watch.since`
    #[arg(long, value_parser = parse_since)]
    since: Option<Duration>,

    /// Disable the log integrity monitor
    #[arg(long)]
    no_integrity: bool,

    /// Send a test notification to every enabled notifier and exit
    #[arg(long)]
    test: bool,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,
}

fn parse_since(s: &str) -> Result<Duration, String> {
    config::parse_duration(s).map_err(|e| e.to_string())
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "logwarden=debug" } else { "logwarden=info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| default.into()))
        .with_writer(std::io::stderr)
        .init();
}

/// Resolves once Ctrl+C or (on unix) SIGTERM arrives.
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = term.recv() => {}
                }
                return;
            }
            Err(e) => warn!("Cannot install SIGTERM handler: {}", e),
        }
    }
    let _ = tokio::signal::ctrl_c().await;
}

async fn send_test(state: &AppState) -> Result<()> {
    let event = state.test_event();
    info!("Sending test notification: {}", event);
    let dispatcher = Dispatcher::new(state.notifiers.clone(), Default::default());
    let mut failed = 0;
    for (name, result) in dispatcher.send_all(&event).await {
        match result {
            Ok(()) => info!("{}: sent", name),
            Err(e) => {
                failed += 1;
                error!("{}: {:#}", name, e);
            }
        }
    }
    if failed > 0 {
        anyhow::bail!("{} of {} notifiers failed", failed, dispatcher.notifier_count());
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(args.verbose);

    let config = Config::load(&args.config)?;
    config.validate()?;
    info!("Config loaded from {}", args.config.display());

    let overrides = RunOverrides {
        since: args.since,
        no_integrity: args.no_integrity,
    };
    let (state, rx) = AppState::build(config, overrides)?;
    info!("Monitoring host {} ({}), {} notifier(s)", state.hostname, state.os, state.notifiers.len());

    if args.test {
        return send_test(&state).await;
    }

    let cancel = CancellationToken::new();
    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            shutdown_signal().await;
            info!("Shutting down...");
            cancel.cancel();
        }
    });

    crate::core::orchestrator::run_watchdog(state, rx, cancel).await
}
