// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025-2026 JR Morton

//! Classifier for macOS unified log lines (`log stream` / `log show`, compact style).
//!
//! Console and screen-sharing lines do not reliably carry a username, so the
//! console rule reports the user resolved from the process environment and
//! the screen-sharing rule reports a fixed sentinel.

use super::{group, Classifier, HostContext, RuleKind, RuleSet};
use crate::core::event::LoginEvent;

const SSH_ACCEPTED: &str = r"sshd.*Accepted\s+\w+\s+for\s+(\S+)\s+from\s+([0-9A-Fa-f:.]+)";
const CONSOLE_LOGIN: &str = r"loginwindow.*Login Window.*[Ll]ogin|User logged in";
const SCREEN_SHARING: &str = r"screensharingd.*(?:[Aa]uthenticat|[Cc]onnect)";

/// Username used when the console user cannot be resolved.
pub const CONSOLE_SENTINEL: &str = "console";
/// Username reported for screen-sharing sessions.
pub const SCREEN_SHARING_SENTINEL: &str = "screensharing";

/// Predicate shared by the live stream and the historical query.
pub const LOG_PREDICATE: &str = r#"process == "loginwindow" OR process == "sshd" OR process == "screensharingd" OR (process == "securityd" AND eventMessage CONTAINS "Session")"#;

/// The acting user from the process environment, if set.
pub fn console_user_from_env() -> Option<String> {
    std::env::var("USER").ok().filter(|u| !u.trim().is_empty())
}

pub struct MacosClassifier {
    host: HostContext,
    console_user: String,
    rules: RuleSet,
}

impl MacosClassifier {
    /// `console_user` is resolved once by the caller; `None` falls back to
    /// the [`CONSOLE_SENTINEL`].
    pub fn new(host: HostContext, console_user: Option<String>) -> Result<Self, regex::Error> {
        let rules = RuleSet::compile(&[
            (RuleKind::SshAccepted, SSH_ACCEPTED),
            (RuleKind::ConsoleLogin, CONSOLE_LOGIN),
            (RuleKind::ScreenSharing, SCREEN_SHARING),
        ])?;
        Ok(Self {
            host,
            console_user: console_user.unwrap_or_else(|| CONSOLE_SENTINEL.to_string()),
            rules,
        })
    }
}

impl Classifier for MacosClassifier {
    fn classify(&self, line: &str) -> Option<LoginEvent> {
        let (kind, caps) = self.rules.first_match(line)?;
        match kind {
            RuleKind::SshAccepted => self
                .host
                .event(group(&caps, 1), "ssh")
                .map(|e| e.with_source_ip(group(&caps, 2))),
            RuleKind::ConsoleLogin => self.host.event(&self.console_user, "console"),
            RuleKind::ScreenSharing => self.host.event(SCREEN_SHARING_SENTINEL, "vnc"),
            RuleKind::PamSession | RuleKind::TtyLogin => None,
        }
    }
}
