// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025-2026 JR Morton

//! Classifier for Windows Security event 4624 ("An account was successfully
//! logged on") message blocks, as rendered by `Get-WinEvent`.
//!
//! A block carries several `Account Name:` fields: the subject (usually the
//! machine account), the new logon and, on Windows 10 and later, a
//! `Network Account Name:` that is almost always `-`. The account that logged
//! on is the first `Account Name:` line of the `New Logon:` section.

use regex::Regex;

use super::{Classifier, HostContext};
use crate::core::event::LoginEvent;

const ACCOUNT_NAME: &str = r"(?m)^[ \t]*Account Name:[ \t]+(\S+)";
const NEW_LOGON_HEADER: &str = "New Logon:";
const SOURCE_ADDRESS: &str = r"Source Network Address:\s+(\S+)";
const LOGON_TYPE: &str = r"Logon Type:\s+(\d+)";

/// Terminal used when the logon type is missing or not in [`logon_type_terminal`].
const DEFAULT_TERMINAL: &str = "windows";

/// Map a 4624 logon type code to a session kind.
pub fn logon_type_terminal(code: &str) -> Option<&'static str> {
    match code {
        "2" => Some("console"),
        "3" => Some("network"),
        "10" => Some("rdp"),
        "11" => Some("cached"),
        _ => None,
    }
}

/// Machine accounts, the empty marker and SYSTEM never represent a person.
fn is_system_account(name: &str) -> bool {
    name.is_empty() || name == "-" || name.ends_with('$') || name.eq_ignore_ascii_case("SYSTEM")
}

pub struct WindowsClassifier {
    host: HostContext,
    account: Regex,
    address: Regex,
    logon_type: Regex,
}

impl WindowsClassifier {
    pub fn new(host: HostContext) -> Result<Self, regex::Error> {
        Ok(Self {
            host,
            account: Regex::new(ACCOUNT_NAME)?,
            address: Regex::new(SOURCE_ADDRESS)?,
            logon_type: Regex::new(LOGON_TYPE)?,
        })
    }
}

impl Classifier for WindowsClassifier {
    fn classify(&self, block: &str) -> Option<LoginEvent> {
        let username = match block.find(NEW_LOGON_HEADER) {
            Some(at) => self.account.captures(&block[at + NEW_LOGON_HEADER.len()..]),
            None => self.account.captures_iter(block).last(),
        }
        .and_then(|c| c.get(1))
        .map(|m| m.as_str())?;
        if is_system_account(username) {
            return None;
        }

        let terminal = self
            .logon_type
            .captures(block)
            .and_then(|c| c.get(1))
            .and_then(|m| logon_type_terminal(m.as_str()))
            .unwrap_or(DEFAULT_TERMINAL);

        let mut event = self.host.event(username, terminal)?;
        if let Some(addr) = self.address.captures(block).and_then(|c| c.get(1)) {
            let addr = addr.as_str();
            if addr != "-" {
                event = event.with_source_ip(addr);
            }
        }
        Some(event)
    }
}
