// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025-2026 JR Morton

//! The single event type produced by every logwarden source.
//!
//! Login watchers and the log integrity monitor both emit [`LoginEvent`]
//! values onto the shared channel. Tamper alerts are synthetic events with
//! the [`SECURITY_USER`] sentinel as username and [`INTEGRITY_TERMINAL`] as
//! the session kind.

use chrono::{DateTime, Local, Offset};
use serde::Serialize;
use std::fmt;

use super::host;

/// Username carried by synthetic tamper events.
pub const SECURITY_USER: &str = "SECURITY";
/// Session kind carried by synthetic tamper events.
pub const INTEGRITY_TERMINAL: &str = "log-integrity";

/// A structured record of an interactive session start, real or synthetic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LoginEvent {
    /// Account that logged in, or a sentinel such as `SECURITY`
    pub username: String,
    pub hostname: String,
    /// Remote address, when the log line carries one
    pub source_ip: Option<String>,
    /// Session kind: `ssh`, `console`, `vnc`, `rdp`, a PAM service, a tty, ...
    pub terminal: String,
    pub timestamp: DateTime<Local>,
    /// Platform tag (`linux`, `macos`, `windows`)
    pub os: String,
    /// Free-form description, set by tamper alerts
    pub detail: Option<String>,
}

impl LoginEvent {
    /// Create a login event timestamped to now.
    pub fn new(username: &str, hostname: &str, terminal: &str, os: &str) -> Self {
        Self {
            username: username.to_string(),
            hostname: hostname.to_string(),
            source_ip: None,
            terminal: terminal.to_string(),
            timestamp: Local::now(),
            os: os.to_string(),
            detail: None,
        }
    }

    /// Attach a source address.
    pub fn with_source_ip(mut self, ip: &str) -> Self {
        self.source_ip = Some(ip.to_string());
        self
    }

    /// Attach a human-readable description.
    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    /// Build a tamper alert for the log integrity monitor.
    pub fn tamper(hostname: &str, os: &str, detail: impl Into<String>) -> Self {
        Self::new(SECURITY_USER, hostname, INTEGRITY_TERMINAL, os).with_detail(detail)
    }

    /// True for synthetic events produced by the integrity monitor.
    pub fn is_tamper(&self) -> bool {
        self.terminal == INTEGRITY_TERMINAL
    }

    /// A well-formed event always names a user, a host and a session kind.
    pub fn is_well_formed(&self) -> bool {
        !self.username.is_empty() && !self.hostname.is_empty() && !self.terminal.is_empty()
    }

    /// Offset from UTC of the event timestamp, rendered as `UTC+8` / `UTC-5`.
    fn utc_offset_label(&self) -> String {
        let secs = self.timestamp.offset().fix().local_minus_utc();
        let hours = secs / 3600;
        let minutes = (secs.abs() % 3600) / 60;
        let sign = if secs < 0 { "-" } else { "+" };
        if minutes == 0 {
            format!("UTC{}{}", sign, hours.abs())
        } else {
            format!("UTC{}{}:{:02}", sign, hours.abs(), minutes)
        }
    }

    /// `CST (UTC+8)` when the zone name is known, otherwise `UTC+8`.
    pub fn zone_label(&self) -> String {
        zone_label(
            host::zone_abbreviation(self.timestamp.timestamp()).as_deref(),
            &self.utc_offset_label(),
        )
    }

    /// Multi-line message used by text-based notifiers.
    pub fn format(&self) -> String {
        let title = if self.is_tamper() { "🚨 Log Tamper Alert" } else { "🔔 Login Alert" };
        let mut msg = format!(
            "{}\n\nUser: {}\nHost: {}\nTime: {}\nZone: {}\nOS: {}",
            title,
            self.username,
            self.hostname,
            self.timestamp.format("%Y-%m-%d %H:%M:%S"),
            self.zone_label(),
            self.os,
        );
        if let Some(ref ip) = self.source_ip {
            msg.push_str(&format!("\nIP: {}", ip));
        }
        if !self.terminal.is_empty() {
            msg.push_str(&format!("\nTerminal: {}", self.terminal));
        }
        if let Some(ref detail) = self.detail {
            msg.push_str(&format!("\nDetail: {}", detail));
        }
        msg
    }
}

fn zone_label(abbreviation: Option<&str>, offset: &str) -> String {
    match abbreviation {
        Some(name) if name != offset => format!("{} ({})", name, offset),
        _ => offset.to_string(),
    }
}

impl fmt::Display for LoginEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{} ({})", self.username, self.hostname, self.terminal)?;
        if let Some(ref ip) = self.source_ip {
            write!(f, " from {}", ip)?;
        }
        if let Some(ref detail) = self.detail {
            write!(f, ": {}", detail)?;
        }
        Ok(())
    }
}
