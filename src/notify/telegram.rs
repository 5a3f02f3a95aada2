// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025-2026 JR Morton

//! Telegram bot sink. Config keys: `token`, `chat_id`, optional `api_base`.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

use super::{display_name, http_client, optional, required, Notifier};
use crate::config::NotifierConfig;
use crate::core::event::LoginEvent;

const DEFAULT_API_BASE: &str = "https://api.telegram.org";

pub struct Telegram {
    name: String,
    endpoint: String,
    chat_id: String,
    client: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct ApiReply {
    ok: bool,
    #[serde(default)]
    description: String,
}

impl Telegram {
    pub fn new(cfg: &NotifierConfig) -> Result<Self> {
        let token = required(cfg, "telegram", "token")?;
        let chat_id = required(cfg, "telegram", "chat_id")?;
        let base = optional(cfg, "api_base").unwrap_or(DEFAULT_API_BASE).trim_end_matches('/');
        Ok(Self {
            name: display_name(cfg, "Telegram"),
            endpoint: format!("{}/bot{}/sendMessage", base, token),
            chat_id: chat_id.to_string(),
            client: http_client()?,
        })
    }
}

#[async_trait]
impl Notifier for Telegram {
    fn name(&self) -> &str {
        &self.name
    }

    async fn send(&self, event: &LoginEvent) -> Result<()> {
        let payload = json!({
            "chat_id": self.chat_id,
            "text": event.format(),
            "disable_web_page_preview": true,
        });
        // Telegram answers errors with a JSON body too, so the status alone
        // is not checked.
        let reply: ApiReply = self
            .client
            .post(&self.endpoint)
            .json(&payload)
            .send()
            .await
            .context("telegram: request failed")?
            .json()
            .await
            .context("telegram: failed to parse response")?;
        if !reply.ok {
            bail!("telegram: {}", reply.description);
        }
        Ok(())
    }
}
