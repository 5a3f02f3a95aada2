// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025-2026 JR Morton

//! Login line classification.
//!
//! Each platform has a [`Classifier`] holding an ordered [`RuleSet`]. Rules
//! are compiled once and evaluated top to bottom. The first rule whose
//! pattern matches owns the line: its extractor either produces the event or
//! declines, and no later rule is consulted. A line therefore yields at most
//! one event.

pub mod linux;
pub mod macos;
pub mod windows;

use regex::{Captures, Regex};

use crate::core::event::LoginEvent;

pub use linux::LinuxClassifier;
pub use macos::MacosClassifier;
pub use windows::WindowsClassifier;

/// Turns one raw log line (or event-log text block) into at most one event.
///
/// Implementations are pure: no I/O, no interior state.
pub trait Classifier: Send + Sync {
    fn classify(&self, line: &str) -> Option<LoginEvent>;
}

/// The kinds of login evidence the engine recognizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RuleKind {
    /// `sshd: Accepted <method> for <user> from <ip>`
    SshAccepted,
    /// `pam_unix(<service>:session): session opened for user <user>`
    PamSession,
    /// `LOGIN ON <tty> BY <user>`
    TtyLogin,
    /// macOS loginwindow console login
    ConsoleLogin,
    /// macOS screensharingd connection
    ScreenSharing,
}

/// One compiled classification rule.
#[derive(Debug)]
pub struct Rule {
    pub kind: RuleKind,
    pattern: Regex,
}

/// Ordered, immutable rule table.
#[derive(Debug)]
pub struct RuleSet {
    rules: Vec<Rule>,
}

impl RuleSet {
    /// Compile `(kind, pattern)` pairs, keeping their order as priority.
    pub fn compile(specs: &[(RuleKind, &str)]) -> Result<Self, regex::Error> {
        let rules = specs
            .iter()
            .map(|(kind, pattern)| Ok(Rule { kind: *kind, pattern: Regex::new(pattern)? }))
            .collect::<Result<Vec<_>, regex::Error>>()?;
        Ok(Self { rules })
    }

    /// The highest-priority rule matching `line`, with its captures.
    pub fn first_match<'l>(&self, line: &'l str) -> Option<(RuleKind, Captures<'l>)> {
        self.rules
            .iter()
            .find_map(|rule| rule.pattern.captures(line).map(|caps| (rule.kind, caps)))
    }

    #[cfg(test)]
    pub fn kinds(&self) -> Vec<RuleKind> {
        self.rules.iter().map(|r| r.kind).collect()
    }
}

/// Host facts stamped onto every event a classifier builds.
#[derive(Debug, Clone)]
pub struct HostContext {
    pub hostname: String,
    pub os: String,
}

impl HostContext {
    pub fn new(hostname: &str, os: &str) -> Self {
        Self {
            hostname: hostname.to_string(),
            os: os.to_string(),
        }
    }

    /// Event for `username` on `terminal`, or `None` when either is empty.
    pub fn event(&self, username: &str, terminal: &str) -> Option<LoginEvent> {
        if username.is_empty() || terminal.is_empty() {
            return None;
        }
        Some(LoginEvent::new(username, &self.hostname, terminal, &self.os))
    }
}

/// Captured group `idx` as `&str`, empty when absent.
pub(crate) fn group<'c>(caps: &'c Captures<'_>, idx: usize) -> &'c str {
    caps.get(idx).map(|m| m.as_str()).unwrap_or("")
}
