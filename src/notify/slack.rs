// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025-2026 JR Morton

//! Slack incoming webhook. Config key: `webhook`.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::json;

use super::{display_name, ensure_success, http_client, required, Notifier};
use crate::config::NotifierConfig;
use crate::core::event::LoginEvent;

pub struct Slack {
    name: String,
    webhook: String,
    client: reqwest::Client,
}

impl Slack {
    pub fn new(cfg: &NotifierConfig) -> Result<Self> {
        Ok(Self {
            name: display_name(cfg, "Slack"),
            webhook: required(cfg, "slack", "webhook")?.to_string(),
            client: http_client()?,
        })
    }
}

/// Block Kit message: header plus a field grid, with the plain text as fallback.
pub fn payload(event: &LoginEvent) -> serde_json::Value {
    let title = if event.is_tamper() { "🚨 Log Tamper Alert" } else { "🔔 Login Alert" };
    let mut fields = vec![
        json!({"type": "mrkdwn", "text": format!("*User:*\n{}", event.username)}),
        json!({"type": "mrkdwn", "text": format!("*Host:*\n{}", event.hostname)}),
        json!({"type": "mrkdwn", "text": format!("*Time:*\n{}", event.timestamp.format("%Y-%m-%d %H:%M:%S"))}),
        json!({"type": "mrkdwn", "text": format!("*OS:*\n{}", event.os)}),
    ];
    if let Some(ref ip) = event.source_ip {
        fields.push(json!({"type": "mrkdwn", "text": format!("*IP:*\n{}", ip)}));
    }
    fields.push(json!({"type": "mrkdwn", "text": format!("*Terminal:*\n{}", event.terminal)}));

    let mut blocks = vec![
        json!({"type": "header", "text": {"type": "plain_text", "text": title}}),
        json!({"type": "section", "fields": fields}),
    ];
    if let Some(ref detail) = event.detail {
        blocks.push(json!({"type": "section", "text": {"type": "mrkdwn", "text": detail}}));
    }
    json!({ "text": event.format(), "blocks": blocks })
}

#[async_trait]
impl Notifier for Slack {
    fn name(&self) -> &str {
        &self.name
    }

    async fn send(&self, event: &LoginEvent) -> Result<()> {
        let resp = self
            .client
            .post(&self.webhook)
            .json(&payload(event))
            .send()
            .await
            .context("slack: request failed")?;
        ensure_success("slack", resp).await?;
        Ok(())
    }
}
