// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025-2026 JR Morton

//! SMTP email. Config keys: `smtp_host`, `to` (comma separated), optional
//! `smtp_port` (default 587), `username`, `password` and `from` (defaults to
//! `username`).
//!
//! Port 465 uses implicit TLS; any other port upgrades with STARTTLS when the
//! server offers it. PLAIN auth is used only when both `username` and
//! `password` are set.

use std::time::Duration;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::message::{Mailbox, Message};
use lettre::transport::smtp::authentication::{Credentials, Mechanism};
use lettre::transport::smtp::client::{Tls, TlsParameters};
use lettre::{AsyncSmtpTransport, AsyncTransport, Tokio1Executor};

use super::{display_name, optional, required, Notifier};
use crate::config::NotifierConfig;
use crate::core::event::LoginEvent;

const DEFAULT_SMTP_PORT: u16 = 587;
const IMPLICIT_TLS_PORT: u16 = 465;
const SMTP_TIMEOUT: Duration = Duration::from_secs(10);

pub struct Email {
    name: String,
    from: Mailbox,
    to: Vec<Mailbox>,
    transport: AsyncSmtpTransport<Tokio1Executor>,
}

fn parse_recipients(list: &str) -> Result<Vec<Mailbox>> {
    let to = list
        .split(',')
        .map(str::trim)
        .filter(|addr| !addr.is_empty())
        .map(|addr| addr.parse::<Mailbox>().with_context(|| format!("email: invalid recipient {}", addr)))
        .collect::<Result<Vec<_>>>()?;
    if to.is_empty() {
        bail!("email: to is required");
    }
    Ok(to)
}

impl Email {
    pub fn new(cfg: &NotifierConfig) -> Result<Self> {
        let host = required(cfg, "email", "smtp_host")?;
        let port = match optional(cfg, "smtp_port") {
            Some(p) => p.parse::<u16>().with_context(|| format!("email: invalid smtp_port: {}", p))?,
            None => DEFAULT_SMTP_PORT,
        };
        let username = optional(cfg, "username");
        let password = optional(cfg, "password");

        let from = match optional(cfg, "from").or(username) {
            Some(addr) => addr
                .parse::<Mailbox>()
                .with_context(|| format!("email: invalid from address {}", addr))?,
            None => bail!("email: from is required"),
        };
        let to = parse_recipients(required(cfg, "email", "to")?)?;

        let mut builder = if port == IMPLICIT_TLS_PORT {
            AsyncSmtpTransport::<Tokio1Executor>::relay(host).context("email: invalid smtp_host")?
        } else {
            let tls = TlsParameters::new(host.to_string()).context("email: invalid smtp_host")?;
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(host).tls(Tls::Opportunistic(tls))
        };
        builder = builder.port(port).timeout(Some(SMTP_TIMEOUT));
        if let (Some(user), Some(pass)) = (username, password) {
            builder = builder
                .credentials(Credentials::new(user.to_string(), pass.to_string()))
                .authentication(vec![Mechanism::Plain]);
        }

        Ok(Self {
            name: display_name(cfg, "Email"),
            from,
            to,
            transport: builder.build(),
        })
    }

    pub fn subject(event: &LoginEvent) -> String {
        if event.is_tamper() {
            format!("Log Tamper Alert: {}", event.hostname)
        } else {
            format!("Login Alert: {} logged in to {}", event.username, event.hostname)
        }
    }

    /// Plain-text body: an intro line followed by the event fields.
    pub fn body(event: &LoginEvent) -> String {
        let intro = if event.is_tamper() {
            "Log tampering detected on your system:"
        } else {
            "Login detected on your system:"
        };
        let formatted = event.format();
        let fields = formatted.split_once("\n\n").map(|(_, rest)| rest).unwrap_or(&formatted);
        format!("{}\n\n{}\n", intro, fields)
    }

    pub fn message(&self, event: &LoginEvent) -> Result<Message> {
        let mut builder = Message::builder().from(self.from.clone());
        for rcpt in &self.to {
            builder = builder.to(rcpt.clone());
        }
        builder
            .subject(Self::subject(event))
            .header(ContentType::TEXT_PLAIN)
            .body(Self::body(event))
            .context("email: failed to build message")
    }
}

#[async_trait]
impl Notifier for Email {
    fn name(&self) -> &str {
        &self.name
    }

    async fn send(&self, event: &LoginEvent) -> Result<()> {
        let message = self.message(event)?;
        self.transport.send(message).await.context("email: failed to send")?;
        Ok(())
    }
}
