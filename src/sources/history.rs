// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025-2026 JR Morton

//! One-shot historical scan run before live watching starts.
//!
//! Each platform asks its native log tool for the last N minutes and pushes
//! the output through the same classifier as the live path. On Linux a failed
//! `journalctl` falls back to the last [`FALLBACK_LINES`] lines of the auth
//! log file.

use std::collections::VecDeque;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use tokio::process::Command;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::classify::macos::LOG_PREDICATE;
use super::classify::Classifier;
use crate::core::event::LoginEvent;

/// Lines read from the end of the log file when `journalctl` is unusable.
pub const FALLBACK_LINES: usize = 1000;

/// Line printed after every event message by the PowerShell queries.
pub const EVENT_SEPARATOR: &str = "----logwarden-event----";

/// Whole minutes of lookback, never less than one.
pub fn lookback_minutes(since: Duration) -> u64 {
    (since.as_secs() / 60).max(1)
}

/// An external command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Query {
    pub program: String,
    pub args: Vec<String>,
}

impl Query {
    fn new(program: &str, args: &[&str]) -> Self {
        Self {
            program: program.to_string(),
            args: args.iter().map(|a| a.to_string()).collect(),
        }
    }
}

pub fn journal_query(minutes: u64) -> Query {
    let since = format!("{} minutes ago", minutes);
    Query::new("journalctl", &["--since", &since, "-u", "sshd", "-u", "ssh", "--no-pager"])
}

pub fn unified_log_query(minutes: u64) -> Query {
    let last = format!("{}m", minutes);
    Query::new("log", &["show", "--last", &last, "--style", "compact", "--predicate", LOG_PREDICATE])
}

pub fn event_log_query(minutes: u64) -> Query {
    let script = event_log_script(&format!("(Get-Date).AddMinutes(-{})", minutes));
    Query::new("powershell", &["-NoProfile", "-Command", &script])
}

/// PowerShell pipeline printing every 4624 message since `start`, each
/// followed by [`EVENT_SEPARATOR`]. `start` is a PowerShell expression.
pub fn event_log_script(start: &str) -> String {
    format!(
        "Get-WinEvent -FilterHashtable @{{LogName='Security';Id=4624;StartTime={}}} -ErrorAction SilentlyContinue | ForEach-Object {{ $_.Message; '{}' }}",
        start, EVENT_SEPARATOR
    )
}

/// How query output is cut into classifier records.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordStyle {
    Lines,
    EventBlocks,
}

impl RecordStyle {
    pub fn split<'a>(&self, output: &'a str) -> Vec<&'a str> {
        match self {
            RecordStyle::Lines => output.lines().collect(),
            RecordStyle::EventBlocks => split_event_blocks(output),
        }
    }
}

/// Split PowerShell output on [`EVENT_SEPARATOR`] lines, dropping empty blocks.
pub fn split_event_blocks(output: &str) -> Vec<&str> {
    output
        .split(EVENT_SEPARATOR)
        .map(str::trim)
        .filter(|b| !b.is_empty())
        .collect()
}

#[derive(Debug)]
pub(crate) enum QueryOutcome {
    Output(String),
    Failed(String),
    Cancelled,
}

/// Run `query` to completion unless `cancel` fires first. The child is
/// killed when the future is dropped.
pub(crate) async fn run_query(query: &Query, cancel: &CancellationToken) -> QueryOutcome {
    let mut cmd = Command::new(&query.program);
    cmd.args(&query.args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    debug!("Running {} {:?}", query.program, query.args);
    let output = tokio::select! {
        _ = cancel.cancelled() => return QueryOutcome::Cancelled,
        output = cmd.output() => output,
    };

    match output {
        Ok(out) if out.status.success() => {
            QueryOutcome::Output(String::from_utf8_lossy(&out.stdout).into_owned())
        }
        Ok(out) => QueryOutcome::Failed(format!(
            "{} exited with {}: {}",
            query.program,
            out.status,
            String::from_utf8_lossy(&out.stderr).trim()
        )),
        Err(e) => QueryOutcome::Failed(format!("{}: {}", query.program, e)),
    }
}

/// The last `n` lines of `path`, lossily decoded.
pub fn last_lines(path: &Path, n: usize) -> std::io::Result<Vec<String>> {
    let mut reader = BufReader::new(File::open(path)?);
    let mut window: VecDeque<String> = VecDeque::with_capacity(n.min(4096));
    let mut buf = Vec::new();
    loop {
        buf.clear();
        if reader.read_until(b'\n', &mut buf)? == 0 {
            break;
        }
        if window.len() == n {
            window.pop_front();
        }
        let line = String::from_utf8_lossy(&buf);
        window.push_back(line.trim_end_matches(['\n', '\r']).to_string());
    }
    Ok(window.into_iter().collect())
}

pub struct HistoricalScanner {
    build: fn(u64) -> Query,
    style: RecordStyle,
    fallback: Option<PathBuf>,
    classifier: Arc<dyn Classifier>,
}

impl HistoricalScanner {
    pub fn new(build: fn(u64) -> Query, style: RecordStyle, classifier: Arc<dyn Classifier>) -> Self {
        Self {
            build,
            style,
            fallback: None,
            classifier,
        }
    }

    /// `journalctl`, falling back to the tail of `log_file`.
    pub fn journal(classifier: Arc<dyn Classifier>, log_file: PathBuf) -> Self {
        Self::new(journal_query, RecordStyle::Lines, classifier).with_fallback(log_file)
    }

    pub fn unified_log(classifier: Arc<dyn Classifier>) -> Self {
        Self::new(unified_log_query, RecordStyle::Lines, classifier)
    }

    pub fn event_log(classifier: Arc<dyn Classifier>) -> Self {
        Self::new(event_log_query, RecordStyle::EventBlocks, classifier)
    }

    pub fn with_fallback(mut self, log_file: PathBuf) -> Self {
        self.fallback = Some(log_file);
        self
    }

    /// Forward every login found in the last `since` to `tx`.
    ///
    /// Returns the number of events sent. A zero lookback scans nothing.
    /// Failures never propagate: the scan just yields fewer events.
    pub async fn scan(
        &self,
        since: Duration,
        tx: &mpsc::Sender<LoginEvent>,
        cancel: &CancellationToken,
    ) -> usize {
        if since.is_zero() || cancel.is_cancelled() {
            return 0;
        }
        let query = (self.build)(lookback_minutes(since));

        let records: Vec<String> = match run_query(&query, cancel).await {
            QueryOutcome::Output(text) => self.style.split(&text).into_iter().map(String::from).collect(),
            QueryOutcome::Cancelled => return 0,
            QueryOutcome::Failed(reason) => match &self.fallback {
                Some(path) => {
                    warn!("Historical query failed ({}), reading {} instead", reason, path.display());
                    // Every match is forwarded: syslog lines carry no year, so
                    // the cutoff cannot be applied reliably.
                    match read_fallback(path.clone()).await {
                        Ok(lines) => lines,
                        Err(e) => {
                            warn!("Cannot read {}: {}", path.display(), e);
                            return 0;
                        }
                    }
                }
                None => {
                    warn!("Historical query failed, skipping history: {}", reason);
                    return 0;
                }
            },
        };

        let mut sent = 0;
        for record in &records {
            let Some(event) = self.classifier.classify(record) else {
                continue;
            };
            tokio::select! {
                _ = cancel.cancelled() => return sent,
                res = tx.send(event) => {
                    if res.is_err() {
                        debug!("Event channel closed during history scan");
                        return sent;
                    }
                    sent += 1;
                }
            }
        }
        info!("Historical scan found {} login event(s) in the last {:?}", sent, since);
        sent
    }
}

async fn read_fallback(path: PathBuf) -> std::io::Result<Vec<String>> {
    tokio::task::spawn_blocking(move || last_lines(&path, FALLBACK_LINES))
        .await
        .map_err(std::io::Error::other)?
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sources::classify::{HostContext, LinuxClassifier};
    use std::io::Write;

    fn linux() -> Arc<dyn Classifier> {
        Arc::new(LinuxClassifier::new(HostContext::new("web-01", "linux")).unwrap())
    }

    fn missing_program(_: u64) -> Query {
        Query::new("logwarden-test-no-such-binary", &[])
    }

    #[test]
    fn test_lookback_minutes() {
        assert_eq!(lookback_minutes(Duration::from_secs(30)), 1);
        assert_eq!(lookback_minutes(Duration::from_secs(60)), 1);
        assert_eq!(lookback_minutes(Duration::from_secs(150)), 2);
        assert_eq!(lookback_minutes(Duration::from_secs(3600)), 60);
    }

    #[test]
    fn test_queries() {
        let q = journal_query(5);
        assert_eq!(q.program, "journalctl");
        assert_eq!(q.args, vec!["--since", "5 minutes ago", "-u", "sshd", "-u", "ssh", "--no-pager"]);

        let q = unified_log_query(2);
        assert_eq!(&q.args[..5], &["show", "--last", "2m", "--style", "compact"]);
        assert_eq!(q.args[6], LOG_PREDICATE);

        let q = event_log_query(10);
        assert!(q.args[2].contains("AddMinutes(-10)"));
        assert!(q.args[2].contains("Id=4624"));
        assert!(q.args[2].contains(EVENT_SEPARATOR));
    }

    #[test]
    fn test_split_event_blocks() {
        let output = format!(
            "An account was successfully logged on.\r\n\r\nSubject:\r\n\tAccount Name:\t\t-\r\n{sep}\r\nSecond\r\n{sep}\r\n\r\n",
            sep = EVENT_SEPARATOR
        );
        let blocks = split_event_blocks(&output);
        assert_eq!(blocks.len(), 2);
        assert!(blocks[0].starts_with("An account"));
        assert!(blocks[0].contains("Subject:"));
        assert_eq!(blocks[1], "Second");
    }

    #[test]
    fn test_last_lines_keeps_tail() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        for i in 0..1500 {
            writeln!(file, "line {}", i).unwrap();
        }
        let lines = last_lines(file.path(), FALLBACK_LINES).unwrap();
        assert_eq!(lines.len(), 1000);
        assert_eq!(lines[0], "line 500");
        assert_eq!(lines[999], "line 1499");
    }

    #[test]
    fn test_last_lines_short_file_without_newline() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "a\r\nb").unwrap();
        assert_eq!(last_lines(file.path(), 10).unwrap(), vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_failed_query_falls_back_to_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "Jan 1 00:00:00 h sshd[1]: Accepted publickey for alice from 10.0.0.5 port 1 ssh2").unwrap();
        writeln!(file, "Jan 1 00:00:01 h sshd[1]: Failed password for bob from 10.0.0.6 port 1 ssh2").unwrap();
        writeln!(file, "Jan 1 00:00:02 h CRON[2]: pam_unix(cron:session): session opened for user root by (uid=0)").unwrap();

        let scanner = HistoricalScanner::new(missing_program, RecordStyle::Lines, linux())
            .with_fallback(file.path().to_path_buf());
        let (tx, mut rx) = mpsc::channel(10);
        let sent = scanner.scan(Duration::from_secs(600), &tx, &CancellationToken::new()).await;
        assert_eq!(sent, 2);
        assert_eq!(rx.recv().await.unwrap().username, "alice");
        assert_eq!(rx.recv().await.unwrap().terminal, "cron");
    }

    #[tokio::test]
    async fn test_failed_query_without_fallback_yields_nothing() {
        let scanner = HistoricalScanner::new(missing_program, RecordStyle::Lines, linux());
        let (tx, _rx) = mpsc::channel(10);
        assert_eq!(scanner.scan(Duration::from_secs(600), &tx, &CancellationToken::new()).await, 0);
    }

    #[tokio::test]
    async fn test_zero_lookback_runs_nothing() {
        let scanner = HistoricalScanner::new(missing_program, RecordStyle::Lines, linux())
            .with_fallback(PathBuf::from("/nonexistent/auth.log"));
        let (tx, _rx) = mpsc::channel(10);
        assert_eq!(scanner.scan(Duration::ZERO, &tx, &CancellationToken::new()).await, 0);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_query_output_is_classified() {
        fn printing(_: u64) -> Query {
            Query::new(
                "sh",
                &["-c", "echo 'sshd[7]: Accepted password for carol from 192.0.2.1 port 22 ssh2'; echo noise"],
            )
        }
        let scanner = HistoricalScanner::new(printing, RecordStyle::Lines, linux());
        let (tx, mut rx) = mpsc::channel(10);
        assert_eq!(scanner.scan(Duration::from_secs(60), &tx, &CancellationToken::new()).await, 1);
        let event = rx.recv().await.unwrap();
        assert_eq!(event.username, "carol");
        assert_eq!(event.source_ip.as_deref(), Some("192.0.2.1"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_cancellation_stops_long_query() {
        fn sleeping(_: u64) -> Query {
            Query::new("sh", &["-c", "sleep 30"])
        }
        let scanner = HistoricalScanner::new(sleeping, RecordStyle::Lines, linux());
        let (tx, _rx) = mpsc::channel(10);
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            trigger.cancel();
        });
        let sent = tokio::time::timeout(Duration::from_secs(5), scanner.scan(Duration::from_secs(60), &tx, &cancel))
            .await
            .expect("scan should stop on cancellation");
        assert_eq!(sent, 0);
    }
}
