// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025-2026 JR Morton

//! macOS watcher: follows `log stream` for login-related processes.

use std::process::Stdio;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::{forward, WatchOptions, Watcher, WatcherSettings};
use crate::core::error::WatchError;
use crate::core::event::LoginEvent;
use crate::sources::classify::macos::{console_user_from_env, LOG_PREDICATE};
use crate::sources::classify::{Classifier, MacosClassifier};
use crate::sources::history::HistoricalScanner;

const LOG_PROGRAM: &str = "log";

pub fn stream_args() -> Vec<&'static str> {
    vec!["stream", "--predicate", LOG_PREDICATE, "--style", "compact"]
}

pub struct MacosWatcher {
    classifier: Arc<dyn Classifier>,
}

impl MacosWatcher {
    pub fn new(settings: WatcherSettings) -> Result<Self, WatchError> {
        let classifier = MacosClassifier::new(settings.host, console_user_from_env())?;
        Ok(Self {
            classifier: Arc::new(classifier),
        })
    }
}

#[async_trait]
impl Watcher for MacosWatcher {
    fn name(&self) -> &str {
        "macos"
    }

    async fn watch_with_history(
        &self,
        opts: WatchOptions,
        tx: mpsc::Sender<LoginEvent>,
        cancel: CancellationToken,
    ) -> Result<(), WatchError> {
        if !opts.since.is_zero() {
            HistoricalScanner::unified_log(self.classifier.clone())
                .scan(opts.since, &tx, &cancel)
                .await;
        }

        let mut child = Command::new(LOG_PROGRAM)
            .args(stream_args())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| WatchError::Spawn {
                program: LOG_PROGRAM.to_string(),
                source,
            })?;
        let stdout = child.stdout.take().ok_or_else(|| WatchError::Spawn {
            program: LOG_PROGRAM.to_string(),
            source: std::io::Error::other("stdout not captured"),
        })?;
        info!("Following unified log stream");

        let mut lines = BufReader::new(stdout).lines();
        loop {
            let line = tokio::select! {
                _ = cancel.cancelled() => break,
                line = lines.next_line() => line,
            };
            match line {
                Ok(Some(line)) => {
                    if let Some(event) = self.classifier.classify(&line) {
                        debug!("log stream: {}", event);
                        if !forward(&tx, event, &cancel).await {
                            break;
                        }
                    }
                }
                Ok(None) => {
                    warn!("log stream closed its output");
                    return Err(WatchError::StreamEnded(LOG_PROGRAM.to_string()));
                }
                Err(e) => {
                    warn!("Error reading log stream: {}", e);
                    return Err(WatchError::StreamEnded(LOG_PROGRAM.to_string()));
                }
            }
        }
        // Dropping the child kills it.
        drop(child);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stream_args_use_shared_predicate() {
        let args = stream_args();
        assert_eq!(args[0], "stream");
        assert_eq!(args[2], LOG_PREDICATE);
        assert!(args.contains(&"compact"));
    }
}
