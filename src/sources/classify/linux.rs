// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025-2026 JR Morton

//! Classifier for syslog-style auth logs (`/var/log/auth.log`, `/var/log/secure`).

use super::{group, Classifier, HostContext, RuleKind, RuleSet};
use crate::core::event::LoginEvent;

const SSH_ACCEPTED: &str = r"sshd\[\d+\]:\s+Accepted\s+\w+\s+for\s+(\S+)\s+from\s+([0-9A-Fa-f:.]+)\s+port\s+\d+";
const PAM_SESSION: &str = r"pam_unix\(([\w-]+):session\):\s+session opened for user\s+([\w.-]+)";
const TTY_LOGIN: &str = r"LOGIN ON\s+(\S+)\s+BY\s+([\w.-]+)";

/// The PAM service whose sessions are already reported by the SSH rule.
const SSH_PAM_SERVICE: &str = "sshd";

pub struct LinuxClassifier {
    host: HostContext,
    rules: RuleSet,
}

impl LinuxClassifier {
    pub fn new(host: HostContext) -> Result<Self, regex::Error> {
        let rules = RuleSet::compile(&[
            (RuleKind::SshAccepted, SSH_ACCEPTED),
            (RuleKind::PamSession, PAM_SESSION),
            (RuleKind::TtyLogin, TTY_LOGIN),
        ])?;
        Ok(Self { host, rules })
    }
}

impl Classifier for LinuxClassifier {
    fn classify(&self, line: &str) -> Option<LoginEvent> {
        let (kind, caps) = self.rules.first_match(line)?;
        match kind {
            RuleKind::SshAccepted => self
                .host
                .event(group(&caps, 1), "ssh")
                .map(|e| e.with_source_ip(group(&caps, 2))),
            RuleKind::PamSession => {
                let service = group(&caps, 1);
                // sshd sessions are reported by the SSH rule with the source IP.
                if service == SSH_PAM_SERVICE {
                    return None;
                }
                self.host.event(group(&caps, 2), service)
            }
            RuleKind::TtyLogin => self.host.event(group(&caps, 2), group(&caps, 1)),
            RuleKind::ConsoleLogin | RuleKind::ScreenSharing => None,
        }
    }
}
