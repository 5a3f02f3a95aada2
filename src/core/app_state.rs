// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025-2026 JR Morton

//! Centralized application state for the logwarden runtime.
//!
//! [`AppState`] bundles everything resolved once at startup (config, host
//! facts, notifiers, the event channel sender) and threaded through the
//! orchestrator. All fatal setup checks happen in [`AppState::build`], before
//! any task is spawned.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use tokio::sync::mpsc;

use super::event::LoginEvent;
use super::host;
use crate::config::Config;
use crate::notify::{self, Notifier};

/// Command-line overrides applied on top of the config file.
#[derive(Debug, Clone, Default)]
pub struct RunOverrides {
    pub since: Option<Duration>,
    pub no_integrity: bool,
}

pub struct AppState {
    pub config: Config,
    pub hostname: String,
    pub os: &'static str,
    pub since: Duration,
    pub integrity_enabled: bool,
    pub notifiers: Vec<Arc<dyn Notifier>>,
    pub event_tx: mpsc::Sender<LoginEvent>,
}

impl AppState {
    /// Resolve host facts and sinks. Returns the state and the receiving end
    /// of the event channel.
    pub fn build(config: Config, overrides: RunOverrides) -> Result<(Self, mpsc::Receiver<LoginEvent>)> {
        let hostname = host::resolve_hostname(&config.general.hostname).context("Failed to resolve hostname")?;
        let since = match overrides.since {
            Some(since) => since,
            None => config.watch.since()?,
        };

        let notifiers = notify::build_enabled(&config.notifiers);
        if notifiers.is_empty() {
            bail!("No notifiers available");
        }

        let (event_tx, event_rx) = mpsc::channel(config.general.channel_capacity.max(1));
        let integrity_enabled = config.integrity.enabled && !overrides.no_integrity;

        let state = Self {
            config,
            hostname,
            os: host::platform_tag(),
            since,
            integrity_enabled,
            notifiers,
            event_tx,
        };
        Ok((state, event_rx))
    }

    /// Synthetic event sent by `--test`.
    pub fn test_event(&self) -> LoginEvent {
        let user = std::env::var("USER")
            .or_else(|_| std::env::var("USERNAME"))
            .unwrap_or_else(|_| "unknown".to_string());
        LoginEvent::new(&user, &self.hostname, "test", self.os)
    }
}
