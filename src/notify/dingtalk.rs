// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025-2026 JR Morton

//! DingTalk custom robot. Config keys: `webhook`, optional `secret`.
//!
//! With a secret, every request carries `timestamp` (ms) and `sign` query
//! parameters: base64 HMAC-SHA256 of `"{timestamp}\n{secret}"` keyed by the
//! secret.

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Url;
use serde_json::json;

use super::{display_name, hmac_sha256_base64, http_client, optional, required, Notifier, RobotReply};
use crate::config::NotifierConfig;
use crate::core::event::LoginEvent;

pub struct DingTalk {
    name: String,
    webhook: Url,
    secret: Option<String>,
    client: reqwest::Client,
}

impl DingTalk {
    pub fn new(cfg: &NotifierConfig) -> Result<Self> {
        let webhook = required(cfg, "dingtalk", "webhook")?;
        let webhook = Url::parse(webhook).with_context(|| format!("dingtalk: invalid webhook url {}", webhook))?;
        Ok(Self {
            name: display_name(cfg, "DingTalk"),
            webhook,
            secret: optional(cfg, "secret").map(String::from),
            client: http_client()?,
        })
    }

    /// The webhook URL, signed for `timestamp_ms` when a secret is set.
    pub fn signed_url(&self, timestamp_ms: i64) -> Result<Url> {
        let mut url = self.webhook.clone();
        if let Some(ref secret) = self.secret {
            let sign = hmac_sha256_base64(secret.as_bytes(), format!("{}\n{}", timestamp_ms, secret).as_bytes())?;
            url.query_pairs_mut()
                .append_pair("timestamp", &timestamp_ms.to_string())
                .append_pair("sign", &sign);
        }
        Ok(url)
    }
}

#[async_trait]
impl Notifier for DingTalk {
    fn name(&self) -> &str {
        &self.name
    }

    async fn send(&self, event: &LoginEvent) -> Result<()> {
        let url = self.signed_url(chrono::Utc::now().timestamp_millis())?;
        let payload = json!({
            "msgtype": "text",
            "text": { "content": event.format() },
        });
        let reply: RobotReply = self
            .client
            .post(url)
            .json(&payload)
            .send()
            .await
            .context("dingtalk: request failed")?
            .json()
            .await
            .context("dingtalk: failed to parse response")?;
        reply.into_result("dingtalk")
    }
}
