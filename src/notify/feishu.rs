// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025-2026 JR Morton

//! Feishu (Lark) custom bot. Config keys: `webhook`, optional `secret`.
//!
//! Signed requests put `timestamp` (seconds) and `sign` in the body. Feishu
//! signs differently from DingTalk: `"{timestamp}\n{secret}"` is the HMAC
//! key and the message is empty.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

use super::{display_name, ensure_success, hmac_sha256_base64, http_client, optional, required, Notifier};
use crate::config::NotifierConfig;
use crate::core::event::LoginEvent;

pub struct Feishu {
    name: String,
    webhook: String,
    secret: Option<String>,
    client: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct BotReply {
    #[serde(default)]
    code: i64,
    #[serde(default)]
    msg: String,
}

impl Feishu {
    pub fn new(cfg: &NotifierConfig) -> Result<Self> {
        Ok(Self {
            name: display_name(cfg, "Feishu"),
            webhook: required(cfg, "feishu", "webhook")?.to_string(),
            secret: optional(cfg, "secret").map(String::from),
            client: http_client()?,
        })
    }

    pub fn payload(&self, event: &LoginEvent, timestamp: i64) -> Result<serde_json::Value> {
        let mut payload = json!({
            "msg_type": "text",
            "content": { "text": event.format() },
        });
        if let Some(ref secret) = self.secret {
            let key = format!("{}\n{}", timestamp, secret);
            payload["timestamp"] = json!(timestamp.to_string());
            payload["sign"] = json!(hmac_sha256_base64(key.as_bytes(), b"")?);
        }
        Ok(payload)
    }
}

#[async_trait]
impl Notifier for Feishu {
    fn name(&self) -> &str {
        &self.name
    }

    async fn send(&self, event: &LoginEvent) -> Result<()> {
        let payload = self.payload(event, chrono::Utc::now().timestamp())?;
        let resp = self
            .client
            .post(&self.webhook)
            .json(&payload)
            .send()
            .await
            .context("feishu: request failed")?;
        let resp = ensure_success("feishu", resp).await?;
        // An unreadable body on a 2xx is treated as delivered.
        if let Ok(reply) = resp.json::<BotReply>().await {
            if reply.code != 0 {
                bail!("feishu: API error {}: {}", reply.code, reply.msg);
            }
        }
        Ok(())
    }
}
