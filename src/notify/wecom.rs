// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025-2026 JR Morton

//! WeCom (WeChat Work) group robot. Config key: `webhook`.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::json;

use super::{display_name, http_client, required, Notifier, RobotReply};
use crate::config::NotifierConfig;
use crate::core::event::LoginEvent;

pub struct WeCom {
    name: String,
    webhook: String,
    client: reqwest::Client,
}

impl WeCom {
    pub fn new(cfg: &NotifierConfig) -> Result<Self> {
        Ok(Self {
            name: display_name(cfg, "WeCom"),
            webhook: required(cfg, "wecom", "webhook")?.to_string(),
            client: http_client()?,
        })
    }
}

#[async_trait]
impl Notifier for WeCom {
    fn name(&self) -> &str {
        &self.name
    }

    async fn send(&self, event: &LoginEvent) -> Result<()> {
        let payload = json!({
            "msgtype": "text",
            "text": { "content": event.format() },
        });
        let reply: RobotReply = self
            .client
            .post(&self.webhook)
            .json(&payload)
            .send()
            .await
            .context("wecom: request failed")?
            .json()
            .await
            .context("wecom: failed to parse response")?;
        reply.into_result("wecom")
    }
}
