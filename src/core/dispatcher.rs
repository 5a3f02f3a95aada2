// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025-2026 JR Morton

//! Event dispatcher: drains the shared channel and fans events out to sinks.
//!
//! Malformed and filtered events are dropped. Every other event is logged
//! and handed to each notifier on its own task, so one slow sink never
//! delays another.
//! Delivery failures are logged and never retried.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::FilterConfig;
use crate::core::event::LoginEvent;
use crate::notify::Notifier;

/// Counters returned when the dispatcher stops.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DispatchStats {
    pub received: usize,
    pub filtered: usize,
    /// Events dropped for lacking a user, host or session kind.
    pub malformed: usize,
    /// Delivery tasks spawned (events x notifiers).
    pub deliveries: usize,
}

pub struct Dispatcher {
    notifiers: Vec<Arc<dyn Notifier>>,
    filters: FilterConfig,
}

impl Dispatcher {
    pub fn new(notifiers: Vec<Arc<dyn Notifier>>, filters: FilterConfig) -> Self {
        Self { notifiers, filters }
    }

    pub fn notifier_count(&self) -> usize {
        self.notifiers.len()
    }

    /// Drain `rx` until cancelled or every sender is gone, then wait for
    /// in-flight deliveries.
    pub async fn run(&self, mut rx: mpsc::Receiver<LoginEvent>, cancel: CancellationToken) -> DispatchStats {
        let mut stats = DispatchStats::default();
        let mut in_flight = JoinSet::new();

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                Some(_) = in_flight.join_next(), if !in_flight.is_empty() => {}
                event = rx.recv() => match event {
                    Some(event) => self.dispatch(event, &mut in_flight, &mut stats),
                    None => {
                        debug!("All event producers finished");
                        break;
                    }
                },
            }
        }

        // Sink timeouts bound this wait.
        while in_flight.join_next().await.is_some() {}
        info!(
            "Dispatcher stopped: {} received, {} filtered, {} malformed, {} deliveries",
            stats.received, stats.filtered, stats.malformed, stats.deliveries
        );
        stats
    }

    fn dispatch(&self, event: LoginEvent, in_flight: &mut JoinSet<()>, stats: &mut DispatchStats) {
        stats.received += 1;
        if !event.is_well_formed() {
            warn!("Dropping malformed event: {:?}", event);
            stats.malformed += 1;
            return;
        }
        if self.filters.should_ignore(&event.username, &event.terminal) {
            debug!("Filtered: {}", event);
            stats.filtered += 1;
            return;
        }

        if event.is_tamper() {
            warn!("Log tamper detected: {}", event);
        } else {
            info!("Login detected: {}", event);
        }

        let event = Arc::new(event);
        for notifier in &self.notifiers {
            let notifier = Arc::clone(notifier);
            let event = Arc::clone(&event);
            stats.deliveries += 1;
            in_flight.spawn(async move {
                if let Err(e) = notifier.send(&event).await {
                    warn!("Failed to send notification via {}: {:#}", notifier.name(), e);
                }
            });
        }
    }

    /// Deliver `event` to every sink and wait for each result. Used by the
    /// `--test` mode; filters do not apply.
    pub async fn send_all(&self, event: &LoginEvent) -> Vec<(String, anyhow::Result<()>)> {
        let mut results = Vec::with_capacity(self.notifiers.len());
        for notifier in &self.notifiers {
            results.push((notifier.name().to_string(), notifier.send(event).await));
        }
        results
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::config::FilterCombination;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use std::time::Duration;

    /// Records every event it is asked to deliver.
    pub(crate) struct RecordingNotifier {
        pub name: String,
        pub sent: Mutex<Vec<LoginEvent>>,
        pub fail: bool,
    }

    impl RecordingNotifier {
        pub(crate) fn new(name: &str, fail: bool) -> Arc<Self> {
            Arc::new(Self {
                name: name.to_string(),
                sent: Mutex::new(Vec::new()),
                fail,
            })
        }

        pub(crate) fn count(&self) -> usize {
            self.sent.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl Notifier for RecordingNotifier {
        fn name(&self) -> &str {
            &self.name
        }

        async fn send(&self, event: &LoginEvent) -> anyhow::Result<()> {
            self.sent.lock().unwrap().push(event.clone());
            if self.fail {
                anyhow::bail!("{} is down", self.name);
            }
            Ok(())
        }
    }

    fn filters() -> FilterConfig {
        FilterConfig {
            ignore_terminals: vec!["cron".to_string()],
            ignore_users: vec![],
            ignore_combinations: vec![FilterCombination {
                user: "root".to_string(),
                terminal: "su".to_string(),
            }],
        }
    }

    #[tokio::test]
    async fn test_fan_out_and_filtering() {
        let a = RecordingNotifier::new("a", false);
        let b = RecordingNotifier::new("b", true);
        let dispatcher = Dispatcher::new(vec![a.clone() as Arc<dyn Notifier>, b.clone()], filters());

        let (tx, rx) = mpsc::channel(10);
        tx.send(LoginEvent::new("alice", "h", "ssh", "linux")).await.unwrap();
        tx.send(LoginEvent::new("root", "h", "cron", "linux")).await.unwrap();
        tx.send(LoginEvent::new("root", "h", "su", "linux")).await.unwrap();
        tx.send(LoginEvent::tamper("h", "linux", "Log file DELETED: /var/log/auth.log")).await.unwrap();
        drop(tx);

        let stats = dispatcher.run(rx, CancellationToken::new()).await;
        assert_eq!(
            stats,
            DispatchStats {
                received: 4,
                filtered: 2,
                malformed: 0,
                deliveries: 4
            }
        );
        // A failing sink does not stop the others, and is not retried.
        assert_eq!(a.count(), 2);
        assert_eq!(b.count(), 2);
    }

    #[tokio::test]
    async fn test_malformed_events_never_reach_sinks() {
        let sink = RecordingNotifier::new("sink", false);
        let dispatcher = Dispatcher::new(vec![sink.clone() as Arc<dyn Notifier>], FilterConfig::default());

        let (tx, rx) = mpsc::channel(10);
        tx.send(LoginEvent::new("", "h", "ssh", "linux")).await.unwrap();
        tx.send(LoginEvent::new("alice", "", "ssh", "linux")).await.unwrap();
        tx.send(LoginEvent::new("alice", "h", "", "linux")).await.unwrap();
        tx.send(LoginEvent::new("alice", "h", "ssh", "linux")).await.unwrap();
        drop(tx);

        let stats = dispatcher.run(rx, CancellationToken::new()).await;
        assert_eq!(stats.received, 4);
        assert_eq!(stats.malformed, 3);
        assert_eq!(stats.deliveries, 1);
        assert_eq!(sink.count(), 1);
        assert_eq!(sink.sent.lock().unwrap()[0].username, "alice");
    }

    #[tokio::test]
    async fn test_stops_on_cancel_with_open_channel() {
        let dispatcher = Dispatcher::new(vec![], FilterConfig::default());
        let (_tx, rx) = mpsc::channel(10);
        let cancel = CancellationToken::new();
        cancel.cancel();
        let stats = tokio::time::timeout(Duration::from_secs(2), dispatcher.run(rx, cancel))
            .await
            .unwrap();
        assert_eq!(stats.received, 0);
    }

    #[tokio::test]
    async fn test_send_all_reports_each_sink() {
        let dispatcher = Dispatcher::new(
            vec![
                RecordingNotifier::new("ok", false) as Arc<dyn Notifier>,
                RecordingNotifier::new("down", true),
            ],
            filters(),
        );
        // Test events bypass filters.
        let results = dispatcher.send_all(&LoginEvent::new("root", "h", "cron", "linux")).await;
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].0, "ok");
        assert!(results[0].1.is_ok());
        assert_eq!(results[1].1.as_ref().unwrap_err().to_string(), "down is down");
    }
}
