// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025-2026 JR Morton

//! Log tampering detection.
//!
//! Watches the login log files for evidence destruction:
//! - **Deleted**: file no longer exists
//! - **Truncated**: size dropped by at least the configured percentage
//! - **Replaced**: identity token (inode) changed
//! - **Permissions changed**: mode bits differ
//!
//! Each finding becomes a [`LoginEvent`] from the `SECURITY` pseudo-user so
//! it travels through the same channel and sinks as a login. The first
//! observation of a file only records its state. Files that are merely idle
//! never alert.

use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::PathBuf;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::identity::{FileIdentity, STABLE_TOKEN};
use crate::core::event::LoginEvent;

#[derive(Debug, Clone)]
pub struct IntegrityOptions {
    pub interval: Duration,
    /// Percent size drop that counts as truncation, 0 disables.
    pub size_drop_threshold: u32,
    pub detect_deletion: bool,
    pub detect_inode_change: bool,
    pub detect_permission_change: bool,
}

impl Default for IntegrityOptions {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(30),
            size_drop_threshold: 50,
            detect_deletion: true,
            detect_inode_change: true,
            detect_permission_change: true,
        }
    }
}

#[derive(Debug, Clone)]
enum PathState {
    Unseen,
    Tracked(FileIdentity),
    Removed,
}

pub struct IntegrityMonitor {
    paths: Vec<PathBuf>,
    states: HashMap<PathBuf, PathState>,
    opts: IntegrityOptions,
    hostname: String,
    os: String,
}

impl IntegrityMonitor {
    pub fn new(paths: Vec<PathBuf>, opts: IntegrityOptions, hostname: &str, os: &str) -> Self {
        let states = paths.iter().map(|p| (p.clone(), PathState::Unseen)).collect();
        Self {
            paths,
            states,
            opts,
            hostname: hostname.to_string(),
            os: os.to_string(),
        }
    }

    fn alert(&self, detail: String) -> LoginEvent {
        LoginEvent::tamper(&self.hostname, &self.os, detail)
    }

    /// Stat every path once and return the alerts this tick produced.
    pub fn check(&mut self) -> Vec<LoginEvent> {
        let mut alerts = Vec::new();
        for path in self.paths.clone() {
            let previous = self.states.get(&path).cloned().unwrap_or(PathState::Unseen);
            let next = match FileIdentity::capture(&path) {
                Err(e) if e.kind() == ErrorKind::NotFound => {
                    if let PathState::Tracked(_) = previous {
                        if self.opts.detect_deletion {
                            alerts.push(self.alert(format!("Log file DELETED: {}", path.display())));
                        } else {
                            debug!("{} disappeared", path.display());
                        }
                    }
                    PathState::Removed
                }
                Err(e) => {
                    warn!("Cannot stat {}: {}", path.display(), e);
                    previous
                }
                Ok(current) => {
                    match &previous {
                        PathState::Tracked(prev) => alerts.extend(self.compare(prev, &current)),
                        PathState::Unseen | PathState::Removed => {
                            debug!("Tracking {} ({} bytes)", path.display(), current.size_bytes);
                        }
                    }
                    PathState::Tracked(current)
                }
            };
            self.states.insert(path, next);
        }
        alerts
    }

    fn compare(&self, prev: &FileIdentity, current: &FileIdentity) -> Vec<LoginEvent> {
        let mut alerts = Vec::new();
        let path = current.path.display();

        if self.opts.size_drop_threshold > 0 {
            if let Some(drop) = prev.size_drop_percent(current) {
                if drop >= f64::from(self.opts.size_drop_threshold) {
                    alerts.push(self.alert(format!("Log file TRUNCATED: {} ({:.0}% smaller)", path, drop)));
                }
            }
        }

        // Without a stable token every write looks like a replacement.
        if self.opts.detect_inode_change && STABLE_TOKEN && !prev.same_file(current) {
            alerts.push(self.alert(format!("Log file REPLACED: {} (inode changed)", path)));
        }

        if self.opts.detect_permission_change && prev.permission_bits != current.permission_bits {
            alerts.push(self.alert(format!(
                "Log file PERMISSIONS changed: {} ({:o} → {:o})",
                path, prev.permission_bits, current.permission_bits
            )));
        }
        alerts
    }

    /// Check on every interval tick until cancelled. The first tick fires
    /// immediately and only records state.
    pub async fn run(mut self, tx: mpsc::Sender<LoginEvent>, cancel: CancellationToken) -> anyhow::Result<()> {
        info!(
            "Log integrity monitor started for {} file(s), every {:?}",
            self.paths.len(),
            self.opts.interval
        );
        let mut ticker = tokio::time::interval(self.opts.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }
            for alert in self.check() {
                warn!("{}", alert.detail.as_deref().unwrap_or("log integrity alert"));
                tokio::select! {
                    _ = cancel.cancelled() => return Ok(()),
                    res = tx.send(alert) => {
                        if res.is_err() {
                            debug!("Event channel closed, stopping integrity monitor");
                            return Ok(());
                        }
                    }
                }
            }
        }
        info!("Log integrity monitor stopped");
        Ok(())
    }
}
