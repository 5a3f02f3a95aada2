// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025-2026 JR Morton

//! Windows watcher: polls the Security event log for logon events (4624).

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Local};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::{forward, WatchOptions, Watcher, WatcherSettings};
use crate::core::error::WatchError;
use crate::core::event::LoginEvent;
use crate::sources::classify::{Classifier, WindowsClassifier};
use crate::sources::history::{event_log_script, run_query, split_event_blocks, HistoricalScanner, Query, QueryOutcome};

pub const POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Query for events logged at or after `since`, to the millisecond.
pub fn poll_query(since: DateTime<Local>) -> Query {
    let start = format!("'{}'", since.format("%Y-%m-%dT%H:%M:%S%.3f"));
    Query {
        program: "powershell".to_string(),
        args: vec!["-NoProfile".to_string(), "-Command".to_string(), event_log_script(&start)],
    }
}

/// Blocks of `output` that the previous poll did not already return.
///
/// Consecutive poll windows overlap by the time a query takes to run, so a
/// logon near the boundary shows up twice. Messages carry a unique Logon ID,
/// which makes the text itself a usable key.
fn fresh_blocks<'a>(output: &'a str, previous: &HashSet<String>) -> Vec<&'a str> {
    split_event_blocks(output)
        .into_iter()
        .filter(|block| !previous.contains(*block))
        .collect()
}

pub struct WindowsWatcher {
    classifier: Arc<dyn Classifier>,
}

impl WindowsWatcher {
    pub fn new(settings: WatcherSettings) -> Result<Self, WatchError> {
        Ok(Self {
            classifier: Arc::new(WindowsClassifier::new(settings.host)?),
        })
    }
}

#[async_trait]
impl Watcher for WindowsWatcher {
    fn name(&self) -> &str {
        "windows"
    }

    async fn watch_with_history(
        &self,
        opts: WatchOptions,
        tx: mpsc::Sender<LoginEvent>,
        cancel: CancellationToken,
    ) -> Result<(), WatchError> {
        if !opts.since.is_zero() {
            HistoricalScanner::event_log(self.classifier.clone())
                .scan(opts.since, &tx, &cancel)
                .await;
        }

        info!("Polling Security event log every {:?}", POLL_INTERVAL);
        let mut ticker = tokio::time::interval(POLL_INTERVAL);
        ticker.tick().await;
        let mut last_check = Local::now();
        let mut previous: HashSet<String> = HashSet::new();

        loop {
            tokio::select! {
                _ = cancel.cancelled() => return Ok(()),
                _ = ticker.tick() => {}
            }
            let query = poll_query(last_check);
            last_check = Local::now();

            let output = match run_query(&query, &cancel).await {
                QueryOutcome::Output(text) => text,
                QueryOutcome::Cancelled => return Ok(()),
                QueryOutcome::Failed(reason) => {
                    debug!("Event log poll failed: {}", reason);
                    continue;
                }
            };
            let fresh = fresh_blocks(&output, &previous);
            previous = split_event_blocks(&output).into_iter().map(String::from).collect();
            for block in fresh {
                if let Some(event) = self.classifier.classify(block) {
                    if !forward(&tx, event, &cancel).await {
                        return Ok(());
                    }
                }
            }
        }
    }
}
