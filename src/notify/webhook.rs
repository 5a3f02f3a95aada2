// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025-2026 JR Morton

//! Generic HTTP webhook.
//!
//! Config keys: `url` (required), `method` (`POST` default, or `GET`),
//! `content_type` (default `application/json`).

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use serde_json::json;

use super::{display_name, ensure_success, http_client, optional, required, Notifier};
use crate::config::NotifierConfig;
use crate::core::event::LoginEvent;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Method {
    Get,
    Post,
}

pub struct Webhook {
    name: String,
    url: String,
    method: Method,
    content_type: String,
    client: reqwest::Client,
}

impl Webhook {
    pub fn new(cfg: &NotifierConfig) -> Result<Self> {
        let url = required(cfg, "webhook", "url")?.to_string();
        let method = match optional(cfg, "method").map(str::to_ascii_uppercase).as_deref() {
            None | Some("POST") => Method::Post,
            Some("GET") => Method::Get,
            Some(_) => bail!("webhook: method must be GET or POST"),
        };
        Ok(Self {
            name: display_name(cfg, "Webhook"),
            url,
            method,
            content_type: optional(cfg, "content_type").unwrap_or("application/json").to_string(),
            client: http_client()?,
        })
    }
}

/// JSON body posted for `event`.
pub fn payload(event: &LoginEvent) -> serde_json::Value {
    json!({
        "event": if event.is_tamper() { "log_tamper" } else { "login" },
        "username": event.username,
        "hostname": event.hostname,
        "ip": event.source_ip.clone().unwrap_or_default(),
        "terminal": event.terminal,
        "timestamp": event.timestamp.to_rfc3339(),
        "os": event.os,
        "detail": event.detail,
        "message": event.format(),
    })
}

#[async_trait]
impl Notifier for Webhook {
    fn name(&self) -> &str {
        &self.name
    }

    async fn send(&self, event: &LoginEvent) -> Result<()> {
        let request = match self.method {
            Method::Get => self.client.get(&self.url),
            Method::Post => {
                let body = serde_json::to_vec(&payload(event)).context("webhook: failed to encode payload")?;
                self.client
                    .post(&self.url)
                    .header(reqwest::header::CONTENT_TYPE, &self.content_type)
                    .body(body)
            }
        };
        let resp = request.send().await.context("webhook: request failed")?;
        ensure_success("webhook", resp).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::test_support::{notifier_config, sample_event};
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_invalid_method_rejected() {
        let cfg = notifier_config("webhook", &[("url", "http://localhost/x"), ("method", "PUT")]);
        assert!(Webhook::new(&cfg).is_err());
        let cfg = notifier_config("webhook", &[("url", "http://localhost/x"), ("method", "get")]);
        assert_eq!(Webhook::new(&cfg).unwrap().method, Method::Get);
    }

    #[test]
    fn test_payload_fields() {
        let p = payload(&sample_event());
        assert_eq!(p["event"], "login");
        assert_eq!(p["username"], "alice");
        assert_eq!(p["ip"], "10.0.0.5");
        assert!(p["detail"].is_null());
        assert!(p["message"].as_str().unwrap().contains("User: alice"));

        let tamper = LoginEvent::tamper("web-01", "linux", "Log file DELETED: /var/log/auth.log");
        let p = payload(&tamper);
        assert_eq!(p["event"], "log_tamper");
        assert_eq!(p["ip"], "");
        assert_eq!(p["detail"], "Log file DELETED: /var/log/auth.log");
    }

    #[tokio::test]
    async fn test_post_delivers_json() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/hook"))
            .and(header("content-type", "application/json"))
            .and(body_partial_json(json!({"event": "login", "username": "alice", "terminal": "ssh"})))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        let cfg = notifier_config("webhook", &[("url", &format!("{}/hook", server.uri()))]);
        Webhook::new(&cfg).unwrap().send(&sample_event()).await.unwrap();
    }

    #[tokio::test]
    async fn test_get_sends_no_body() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/ping"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let url = format!("{}/ping", server.uri());
        let cfg = notifier_config("webhook", &[("url", &url), ("method", "GET")]);
        Webhook::new(&cfg).unwrap().send(&sample_event()).await.unwrap();
    }

    #[tokio::test]
    async fn test_error_status_is_reported() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .mount(&server)
            .await;

        let cfg = notifier_config("webhook", &[("url", &server.uri())]);
        let err = Webhook::new(&cfg).unwrap().send(&sample_event()).await.unwrap_err();
        assert_eq!(err.to_string(), "webhook: unexpected status 500: boom");
    }
}
