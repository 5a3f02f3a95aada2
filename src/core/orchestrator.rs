// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025-2026 JR Morton

//! Runtime orchestration: spawns the producers and runs the dispatcher.
//!
//! [`run_watchdog`] is the single entry point for the long-lived runtime. It
//! takes ownership of [`AppState`] and the event receiver, spawns the platform
//! watcher and the log integrity monitor, then drains events until the
//! cancellation token fires or every producer has stopped.

use anyhow::{Context, Result};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::app_state::AppState;
use super::dispatcher::Dispatcher;
use super::event::LoginEvent;
use crate::sources::classify::HostContext;
use crate::sources::logtamper::IntegrityMonitor;
use crate::watcher::{self, WatchOptions, WatcherSettings};

pub async fn run_watchdog(state: AppState, rx: mpsc::Receiver<LoginEvent>, cancel: CancellationToken) -> Result<()> {
    let AppState {
        config,
        hostname,
        os,
        since,
        integrity_enabled,
        notifiers,
        event_tx,
    } = state;

    let watcher = watcher::for_platform(WatcherSettings {
        host: HostContext::new(&hostname, os),
        log_paths: config.watch.log_paths.clone(),
        tail: config.watch.tail_config(),
    })?;
    info!("Using {} watcher", watcher.name());

    // ── Log integrity monitor ───────────────────────────────────────────────
    let log_files = watcher.log_files();
    if integrity_enabled && !log_files.is_empty() {
        info!("Log integrity monitor enabled for {:?}", log_files);
        let monitor = IntegrityMonitor::new(log_files, config.integrity.options(), &hostname, os);
        let tx = event_tx.clone();
        let token = cancel.clone();
        tokio::spawn(async move {
            if let Err(e) = monitor.run(tx, token).await {
                warn!("Log integrity monitor error: {:#}", e);
            }
        });
    }

    // ── Login watcher ───────────────────────────────────────────────────────
    let opts = WatchOptions { since };
    let token = cancel.clone();
    let mut watcher_task = tokio::spawn(async move { watcher.watch_with_history(opts, event_tx, token).await });

    if since.is_zero() {
        info!("logwarden v{} started, watching for logins...", env!("CARGO_PKG_VERSION"));
    } else {
        info!(
            "logwarden v{} started, checking logins from {} ago and watching for new ones...",
            env!("CARGO_PKG_VERSION"),
            humantime::format_duration(since)
        );
    }

    // ── Dispatcher ──────────────────────────────────────────────────────────
    let dispatcher = Dispatcher::new(notifiers, config.filters.clone());
    let dispatch = dispatcher.run(rx, cancel.clone());
    tokio::pin!(dispatch);

    tokio::select! {
        _ = &mut dispatch => {}
        joined = &mut watcher_task => {
            match joined {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    cancel.cancel();
                    dispatch.await;
                    return Err(e).context("Login watcher failed");
                }
                Err(e) => {
                    cancel.cancel();
                    dispatch.await;
                    return Err(e).context("Login watcher task panicked");
                }
            }
            dispatch.await;
        }
    }

    info!("Shutdown complete");
    Ok(())
}
