// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025-2026 JR Morton

//! Integration tests exercising multiple modules together.

#[cfg(test)]
mod tests {
    use crate::config::Config;
    use crate::core::app_state::AppState;
    use crate::core::dispatcher::tests::RecordingNotifier;
    use crate::core::dispatcher::Dispatcher;
    use crate::core::event::{INTEGRITY_TERMINAL, SECURITY_USER};
    use crate::core::orchestrator::run_watchdog;
    use crate::notify::Notifier;
    use crate::sources::classify::{HostContext, LinuxClassifier};
    use crate::sources::logtamper::{IntegrityMonitor, IntegrityOptions};
    use crate::sources::tail::{TailConfig, TailReader};
    use crate::watcher::linux::follow;
    use std::io::Write;
    use std::path::Path;
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::sync::mpsc;
    use tokio_util::sync::CancellationToken;

    fn fast_tail() -> TailConfig {
        TailConfig {
            poll_interval: Duration::from_millis(10),
            rotation_check: Duration::from_millis(50),
        }
    }

    fn append(path: &Path, line: &str) {
        let mut f = std::fs::OpenOptions::new().append(true).open(path).unwrap();
        writeln!(f, "{}", line).unwrap();
    }

    async fn wait_for(notifier: &RecordingNotifier, n: usize) {
        for _ in 0..300 {
            if notifier.count() >= n {
                return;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        panic!("expected {} deliveries, got {}", n, notifier.count());
    }

    // ── Tail → classifier → channel ─────────────────────────────────────

    #[tokio::test]
    async fn test_tail_classify_forward() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("auth.log");
        std::fs::write(&path, "sshd[1]: Accepted password for stale from 10.0.0.9 port 1 ssh2\n").unwrap();

        let reader = TailReader::open(&path, fast_tail()).unwrap();
        let classifier = Arc::new(LinuxClassifier::new(HostContext::new("web-01", "linux")).unwrap());
        let (tx, mut rx) = mpsc::channel(10);
        let cancel = CancellationToken::new();
        let task = tokio::spawn(follow(reader, classifier, tx, cancel.clone()));

        append(&path, "Jan 15 10:30:00 web-01 sshd[123]: Accepted publickey for alice from 10.0.0.5 port 51000 ssh2");
        append(&path, "Jan 15 10:30:01 web-01 kernel: eth0 link up");
        append(&path, "Jan 15 10:31:01 web-01 CRON[4242]: pam_unix(cron:session): session opened for user root by (uid=0)");

        let first = tokio::time::timeout(Duration::from_secs(2), rx.recv()).await.unwrap().unwrap();
        assert_eq!(first.username, "alice");
        assert_eq!(first.terminal, "ssh");
        assert_eq!(first.hostname, "web-01");

        let second = tokio::time::timeout(Duration::from_secs(2), rx.recv()).await.unwrap().unwrap();
        assert_eq!(second.username, "root");
        assert_eq!(second.terminal, "cron");

        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(2), task).await.unwrap().unwrap();
    }

    // ── Integrity monitor → dispatcher ──────────────────────────────────

    #[tokio::test]
    async fn test_truncation_reaches_sinks() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("auth.log");
        std::fs::write(&path, vec![b'x'; 10_000]).unwrap();

        let mut monitor = IntegrityMonitor::new(vec![path.clone()], IntegrityOptions::default(), "web-01", "linux");
        assert!(monitor.check().is_empty());
        std::fs::write(&path, vec![b'x'; 1_000]).unwrap();
        let alerts = monitor.check();
        assert_eq!(alerts.len(), 1);

        let sink = RecordingNotifier::new("sink", false);
        let dispatcher = Dispatcher::new(vec![sink.clone() as Arc<dyn Notifier>], Default::default());
        let (tx, rx) = mpsc::channel(10);
        for alert in alerts {
            tx.send(alert).await.unwrap();
        }
        drop(tx);

        let stats = dispatcher.run(rx, CancellationToken::new()).await;
        assert_eq!(stats.deliveries, 1);
        let sent = sink.sent.lock().unwrap();
        assert_eq!(sent[0].username, SECURITY_USER);
        assert_eq!(sent[0].terminal, INTEGRITY_TERMINAL);
        assert!(sent[0].detail.as_deref().unwrap().contains("(90% smaller)"));
    }

    // ── Full runtime ────────────────────────────────────────────────────

    #[cfg(target_os = "linux")]
    #[tokio::test]
    async fn test_watchdog_end_to_end() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("auth.log");
        std::fs::write(&path, vec![b'#'; 4_096]).unwrap();

        let cfg = Config::parse(&format!(
            "[general]\nhostname = \"web-01\"\n\
             [watch]\nlog_paths = [{:?}]\ntail_poll_ms = 10\n\
             [integrity]\ninterval_secs = 1\n\
             [filters]\nignore_users = [\"bob\"]\n\
             [[notifiers]]\ntype = \"webhook\"\n[notifiers.config]\nurl = \"http://localhost/hook\"\n",
            path.display().to_string()
        ))
        .unwrap();
        cfg.validate().unwrap();

        let sink = RecordingNotifier::new("sink", false);
        let (state, rx) = AppState::build(cfg, Default::default()).unwrap();
        let state = AppState {
            notifiers: vec![sink.clone() as Arc<dyn Notifier>],
            ..state
        };

        let cancel = CancellationToken::new();
        let runtime = tokio::spawn(run_watchdog(state, rx, cancel.clone()));
        tokio::time::sleep(Duration::from_millis(200)).await;

        append(&path, "sshd[9]: Accepted password for bob from 10.0.0.7 port 2 ssh2");
        append(&path, "sshd[10]: Accepted publickey for alice from 10.0.0.5 port 3 ssh2");
        wait_for(&sink, 1).await;
        {
            let sent = sink.sent.lock().unwrap();
            assert_eq!(sent[0].username, "alice");
            assert_eq!(sent[0].source_ip.as_deref(), Some("10.0.0.5"));
        }

        // Wiping the log is reported by the integrity monitor on its next tick.
        std::fs::write(&path, "").unwrap();
        wait_for(&sink, 2).await;
        {
            let sent = sink.sent.lock().unwrap();
            assert!(sent[1].is_tamper());
            assert!(sent[1].detail.as_deref().unwrap().starts_with("Log file TRUNCATED"));
        }

        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(5), runtime)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
    }
}
