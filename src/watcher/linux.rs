// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025-2026 JR Morton

//! Linux watcher: tails the syslog auth log.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::{forward, WatchOptions, Watcher, WatcherSettings};
use crate::core::error::WatchError;
use crate::core::event::LoginEvent;
use crate::sources::classify::{Classifier, LinuxClassifier};
use crate::sources::history::HistoricalScanner;
use crate::sources::tail::{TailConfig, TailReader};

/// Debian/Ubuntu auth log.
pub const DEBIAN_AUTH_LOG: &str = "/var/log/auth.log";
/// RHEL/CentOS auth log.
pub const RHEL_AUTH_LOG: &str = "/var/log/secure";

/// `/var/log/auth.log` when present, otherwise `/var/log/secure`.
pub fn default_log_path() -> PathBuf {
    if Path::new(DEBIAN_AUTH_LOG).exists() {
        PathBuf::from(DEBIAN_AUTH_LOG)
    } else {
        PathBuf::from(RHEL_AUTH_LOG)
    }
}

pub struct LinuxWatcher {
    log_paths: Vec<PathBuf>,
    tail: TailConfig,
    classifier: Arc<dyn Classifier>,
}

impl LinuxWatcher {
    pub fn new(settings: WatcherSettings) -> Result<Self, WatchError> {
        let log_paths = if settings.log_paths.is_empty() {
            vec![default_log_path()]
        } else {
            settings.log_paths
        };
        Ok(Self {
            log_paths,
            tail: settings.tail,
            classifier: Arc::new(LinuxClassifier::new(settings.host)?),
        })
    }
}

/// Classify every line `reader` yields and forward the matches.
pub(crate) async fn follow(
    mut reader: TailReader,
    classifier: Arc<dyn Classifier>,
    tx: mpsc::Sender<LoginEvent>,
    cancel: CancellationToken,
) {
    while let Some(line) = reader.next_line(&cancel).await {
        let Some(event) = classifier.classify(&line) else {
            continue;
        };
        debug!("{}: {}", reader.path().display(), event);
        if !forward(&tx, event, &cancel).await {
            break;
        }
    }
    debug!("Stopped tailing {}", reader.path().display());
}

#[async_trait]
impl Watcher for LinuxWatcher {
    fn name(&self) -> &str {
        "linux"
    }

    async fn watch_with_history(
        &self,
        opts: WatchOptions,
        tx: mpsc::Sender<LoginEvent>,
        cancel: CancellationToken,
    ) -> Result<(), WatchError> {
        // Open before the scan so lines written during it are not lost.
        let readers = self
            .log_paths
            .iter()
            .map(|p| TailReader::open(p, self.tail))
            .collect::<Result<Vec<_>, _>>()?;

        if !opts.since.is_zero() {
            let scanner = HistoricalScanner::journal(self.classifier.clone(), self.log_paths[0].clone());
            scanner.scan(opts.since, &tx, &cancel).await;
        }

        for reader in &readers {
            info!("Watching {}", reader.path().display());
        }
        let handles: Vec<_> = readers
            .into_iter()
            .map(|reader| tokio::spawn(follow(reader, self.classifier.clone(), tx.clone(), cancel.clone())))
            .collect();
        drop(tx);

        for handle in handles {
            if let Err(e) = handle.await {
                tracing::warn!("Tail task failed: {}", e);
            }
        }
        Ok(())
    }

    fn log_files(&self) -> Vec<PathBuf> {
        self.log_paths.clone()
    }
}
