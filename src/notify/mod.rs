// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025-2026 JR Morton

//! Notification sinks.
//!
//! Defines [`Notifier`], the trait every delivery backend implements, and
//! [`build`], which turns one `[[notifiers]]` config entry into a sink.
//! The chat and webhook sinks share one HTTP client setup (10 s timeout);
//! email goes over SMTP.

pub mod dingtalk;
pub mod email;
pub mod feishu;
pub mod slack;
pub mod telegram;
pub mod webhook;
pub mod wecom;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use base64::Engine as _;
use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;

use crate::config::NotifierConfig;
use crate::core::event::LoginEvent;

pub use dingtalk::DingTalk;
pub use email::Email;
pub use feishu::Feishu;
pub use slack::Slack;
pub use telegram::Telegram;
pub use webhook::Webhook;
pub use wecom::WeCom;

const HTTP_TIMEOUT: Duration = Duration::from_secs(10);
const USER_AGENT: &str = concat!("logwarden/", env!("CARGO_PKG_VERSION"));

/// A delivery backend for login and tamper events.
///
/// Implementations must be `Send + Sync` so they can be shared as
/// `Arc<dyn Notifier>` across the per-event delivery tasks.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Display name, from config or the backend's default.
    fn name(&self) -> &str;

    /// Deliver one event. Failures are reported, never retried.
    async fn send(&self, event: &LoginEvent) -> Result<()>;
}

/// Build the sink described by `cfg`.
pub fn build(cfg: &NotifierConfig) -> Result<Arc<dyn Notifier>> {
    let notifier: Arc<dyn Notifier> = match cfg.kind.as_str() {
        "webhook" => Arc::new(Webhook::new(cfg)?),
        "slack" => Arc::new(Slack::new(cfg)?),
        "telegram" => Arc::new(Telegram::new(cfg)?),
        "dingtalk" => Arc::new(DingTalk::new(cfg)?),
        "wecom" => Arc::new(WeCom::new(cfg)?),
        "feishu" => Arc::new(Feishu::new(cfg)?),
        "email" => Arc::new(Email::new(cfg)?),
        "" => bail!("notifier `{}` has no type", cfg.name),
        other => bail!("unknown notifier type: {}", other),
    };
    Ok(notifier)
}

/// Build every enabled sink. A sink that fails to build is skipped with a
/// warning; the result may be empty.
pub fn build_enabled(configs: &[NotifierConfig]) -> Vec<Arc<dyn Notifier>> {
    let mut sinks = Vec::new();
    for cfg in configs.iter().filter(|c| c.enabled) {
        match build(cfg) {
            Ok(n) => {
                tracing::info!("Notifier enabled: {} ({})", n.name(), cfg.kind);
                sinks.push(n);
            }
            Err(e) => tracing::warn!("Failed to create notifier {}: {:#}", cfg.name, e),
        }
    }
    sinks
}

pub(crate) fn http_client() -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(HTTP_TIMEOUT)
        .user_agent(USER_AGENT)
        .build()
        .context("failed to build HTTP client")
}

/// Required config value, or an error naming the backend and key.
pub(crate) fn required<'a>(cfg: &'a NotifierConfig, backend: &str, key: &str) -> Result<&'a str> {
    match cfg.config.get(key).map(|v| v.trim()) {
        Some(v) if !v.is_empty() => Ok(v),
        _ => bail!("{}: {} is required", backend, key),
    }
}

/// Optional config value; empty counts as unset.
pub(crate) fn optional<'a>(cfg: &'a NotifierConfig, key: &str) -> Option<&'a str> {
    cfg.config.get(key).map(|v| v.trim()).filter(|v| !v.is_empty())
}

/// Configured name, or the backend's default.
pub(crate) fn display_name(cfg: &NotifierConfig, default: &str) -> String {
    if cfg.name.trim().is_empty() {
        default.to_string()
    } else {
        cfg.name.clone()
    }
}

/// Fail on a non-2xx status, carrying the response body.
pub(crate) async fn ensure_success(backend: &str, resp: reqwest::Response) -> Result<reqwest::Response> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    bail!("{}: unexpected status {}: {}", backend, status.as_u16(), body)
}

/// `{"errcode": 0, "errmsg": "ok"}` reply used by the DingTalk and WeCom robots.
#[derive(Debug, Deserialize)]
pub(crate) struct RobotReply {
    #[serde(default)]
    pub errcode: i64,
    #[serde(default)]
    pub errmsg: String,
}

impl RobotReply {
    pub fn into_result(self, backend: &str) -> Result<()> {
        if self.errcode != 0 {
            bail!("{}: error {}: {}", backend, self.errcode, self.errmsg);
        }
        Ok(())
    }
}

/// Base64 HMAC-SHA256 of `message` under `key`.
pub(crate) fn hmac_sha256_base64(key: &[u8], message: &[u8]) -> Result<String> {
    let mut mac = <Hmac<Sha256> as Mac>::new_from_slice(key).map_err(|e| anyhow!("invalid HMAC key: {}", e))?;
    mac.update(message);
    Ok(base64::engine::general_purpose::STANDARD.encode(mac.finalize().into_bytes()))
}
