// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025-2026 JR Morton

//! Configuration loading and validation.
//!
//! Defines the TOML configuration schema for logwarden. The root [`Config`]
//! struct has one section per concern (general, watch, integrity, filters)
//! plus the list of notifiers.
//!
//! All sections implement `Default` and use `#[serde(default)]` so missing
//! fields fall back to sensible defaults. Config is loaded from
//! `/etc/logwarden/config.toml` by default.

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::sources::logtamper::IntegrityOptions;
use crate::sources::tail::TailConfig;

pub const DEFAULT_CONFIG_PATH: &str = "/etc/logwarden/config.toml";

/// Root configuration struct, deserialized from TOML.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub watch: WatchConfig,
    #[serde(default)]
    pub integrity: IntegrityConfig,
    #[serde(default)]
    pub filters: FilterConfig,
    #[serde(default)]
    pub notifiers: Vec<NotifierConfig>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct GeneralConfig {
    /// Overrides the system hostname when non-empty.
    #[serde(default)]
    pub hostname: String,
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
}

fn default_channel_capacity() -> usize { 10 }

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            hostname: String::new(),
            channel_capacity: default_channel_capacity(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct WatchConfig {
    /// Log files to tail; empty means the platform default.
    #[serde(default)]
    pub log_paths: Vec<PathBuf>,
    /// Historical lookback in humantime syntax (`30m`, `1h`, `0s`).
    #[serde(default = "default_since")]
    pub since: String,
    #[serde(default = "default_tail_poll_ms")]
    pub tail_poll_ms: u64,
    #[serde(default = "default_rotation_check_secs")]
    pub rotation_check_secs: u64,
}

fn default_since() -> String { "0s".to_string() }
fn default_tail_poll_ms() -> u64 { 50 }
fn default_rotation_check_secs() -> u64 { 5 }

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            log_paths: Vec::new(),
            since: default_since(),
            tail_poll_ms: default_tail_poll_ms(),
            rotation_check_secs: default_rotation_check_secs(),
        }
    }
}

impl WatchConfig {
    pub fn since(&self) -> Result<Duration> {
        parse_duration(&self.since).with_context(|| format!("invalid watch.since: {:?}", self.since))
    }

    pub fn tail_config(&self) -> TailConfig {
        TailConfig {
            poll_interval: Duration::from_millis(self.tail_poll_ms.max(1)),
            rotation_check: Duration::from_secs(self.rotation_check_secs.max(1)),
        }
    }
}

/// Parse a humantime duration; an empty string means zero.
pub fn parse_duration(s: &str) -> Result<Duration> {
    let s = s.trim();
    if s.is_empty() || s == "0" {
        return Ok(Duration::ZERO);
    }
    Ok(humantime::parse_duration(s)?)
}

#[derive(Debug, Deserialize, Clone)]
pub struct IntegrityConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_integrity_interval")]
    pub interval_secs: u64,
    /// Percent size drop treated as truncation, 0 disables.
    #[serde(default = "default_size_drop_threshold")]
    pub size_drop_threshold: u32,
    #[serde(default = "default_true")]
    pub detect_deletion: bool,
    #[serde(default = "default_true")]
    pub detect_inode_change: bool,
    #[serde(default = "default_true")]
    pub detect_permission_change: bool,
}

fn default_true() -> bool { true }
fn default_integrity_interval() -> u64 { 30 }
fn default_size_drop_threshold() -> u32 { 50 }

impl Default for IntegrityConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: default_integrity_interval(),
            size_drop_threshold: default_size_drop_threshold(),
            detect_deletion: true,
            detect_inode_change: true,
            detect_permission_change: true,
        }
    }
}

impl IntegrityConfig {
    pub fn options(&self) -> IntegrityOptions {
        IntegrityOptions {
            interval: Duration::from_secs(self.interval_secs),
            size_drop_threshold: self.size_drop_threshold,
            detect_deletion: self.detect_deletion,
            detect_inode_change: self.detect_inode_change,
            detect_permission_change: self.detect_permission_change,
        }
    }
}

/// Events to drop before they reach any notifier.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct FilterConfig {
    #[serde(default)]
    pub ignore_terminals: Vec<String>,
    #[serde(default)]
    pub ignore_users: Vec<String>,
    #[serde(default)]
    pub ignore_combinations: Vec<FilterCombination>,
}

#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct FilterCombination {
    pub user: String,
    pub terminal: String,
}

impl FilterConfig {
    /// Exact, case-sensitive match on terminal, user, or the pair.
    pub fn should_ignore(&self, username: &str, terminal: &str) -> bool {
        self.ignore_terminals.iter().any(|t| t == terminal)
            || self.ignore_users.iter().any(|u| u == username)
            || self
                .ignore_combinations
                .iter()
                .any(|c| c.user == username && c.terminal == terminal)
    }
}

/// One `[[notifiers]]` entry.
#[derive(Debug, Deserialize, Clone)]
pub struct NotifierConfig {
    /// `webhook`, `slack`, `telegram`, `dingtalk`, `wecom`, `feishu` or `email`.
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub name: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Type-specific settings (`url`, `webhook`, `token`, ...).
    #[serde(default)]
    pub config: HashMap<String, String>,
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config: {}", path.display()))?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse config")
    }

    pub fn validate(&self) -> Result<()> {
        if self.notifiers.is_empty() {
            bail!("at least one notifier must be configured");
        }
        for (i, n) in self.notifiers.iter().enumerate() {
            if n.kind.trim().is_empty() {
                bail!("notifiers[{}]: type is required", i);
            }
        }
        if !self.notifiers.iter().any(|n| n.enabled) {
            bail!("at least one notifier must be enabled");
        }
        if self.integrity.size_drop_threshold > 100 {
            bail!(
                "integrity.size_drop_threshold must be between 0 and 100, got {}",
                self.integrity.size_drop_threshold
            );
        }
        if self.integrity.interval_secs == 0 {
            bail!("integrity.interval_secs must be greater than 0");
        }
        if self.general.channel_capacity == 0 {
            bail!("general.channel_capacity must be greater than 0");
        }
        self.watch.since()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FULL: &str = r#"
        [general]
        hostname = "bastion"

        [watch]
        log_paths = ["/var/log/auth.log"]
        since = "30m"

        [integrity]
        size_drop_threshold = 80
        detect_permission_change = false

        [filters]
        ignore_terminals = ["cron"]
        ignore_users = ["backup"]
        ignore_combinations = [{ user = "root", terminal = "su" }]

        [[notifiers]]
        type = "webhook"
        name = "ops"
        [notifiers.config]
        url = "https://example.com/hook"

        [[notifiers]]
        type = "telegram"
        enabled = false
        [notifiers.config]
        token = "t"
        chat_id = "1"
    "#;

    #[test]
    fn test_full_config() {
        let config = Config::parse(FULL).unwrap();
        config.validate().unwrap();
        assert_eq!(config.general.hostname, "bastion");
        assert_eq!(config.general.channel_capacity, 10);
        assert_eq!(config.watch.since().unwrap(), Duration::from_secs(1800));
        assert_eq!(config.watch.log_paths, vec![PathBuf::from("/var/log/auth.log")]);
        assert_eq!(config.integrity.size_drop_threshold, 80);
        assert!(config.integrity.detect_deletion);
        assert!(!config.integrity.detect_permission_change);
        assert_eq!(config.notifiers.len(), 2);
        assert_eq!(config.notifiers[0].kind, "webhook");
        assert!(config.notifiers[0].enabled);
        assert_eq!(config.notifiers[0].config["url"], "https://example.com/hook");
        assert!(!config.notifiers[1].enabled);
    }

    #[test]
    fn test_defaults() {
        let config = Config::parse("").unwrap();
        assert!(config.integrity.enabled);
        assert_eq!(config.integrity.interval_secs, 30);
        assert_eq!(config.integrity.size_drop_threshold, 50);
        assert_eq!(config.watch.since().unwrap(), Duration::ZERO);
        let tail = config.watch.tail_config();
        assert_eq!(tail.poll_interval, Duration::from_millis(50));
        assert_eq!(tail.rotation_check, Duration::from_secs(5));
        assert!(config.general.hostname.is_empty());
    }

    #[test]
    fn test_validate_requires_notifier() {
        let err = Config::parse("").unwrap().validate().unwrap_err();
        assert_eq!(err.to_string(), "at least one notifier must be configured");
    }

    #[test]
    fn test_validate_requires_type() {
        let config = Config::parse("[[notifiers]]\nname = \"x\"\n").unwrap();
        assert_eq!(config.validate().unwrap_err().to_string(), "notifiers[0]: type is required");
    }

    #[test]
    fn test_validate_requires_enabled_notifier() {
        let config = Config::parse("[[notifiers]]\ntype = \"slack\"\nenabled = false\n").unwrap();
        assert_eq!(
            config.validate().unwrap_err().to_string(),
            "at least one notifier must be enabled"
        );
    }

    #[test]
    fn test_validate_threshold_and_interval() {
        let base = "[[notifiers]]\ntype = \"slack\"\n";
        let config = Config::parse(&format!("[integrity]\nsize_drop_threshold = 101\n{}", base)).unwrap();
        assert!(config.validate().is_err());
        let config = Config::parse(&format!("[integrity]\ninterval_secs = 0\n{}", base)).unwrap();
        assert!(config.validate().is_err());
        let config = Config::parse(&format!("[watch]\nsince = \"soon\"\n{}", base)).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_should_ignore() {
        let filters = Config::parse(FULL).unwrap().filters;
        assert!(filters.should_ignore("alice", "cron"));
        assert!(filters.should_ignore("backup", "ssh"));
        assert!(filters.should_ignore("root", "su"));
        assert!(!filters.should_ignore("root", "ssh"));
        assert!(!filters.should_ignore("alice", "su"));
        assert!(!filters.should_ignore("Backup", "ssh"), "matching is case-sensitive");
    }

    #[test]
    fn test_load_missing_file() {
        let err = Config::load(Path::new("/nonexistent/logwarden.toml")).unwrap_err();
        assert!(err.to_string().contains("Failed to read config"));
    }

    #[test]
    fn test_load_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, FULL).unwrap();
        assert_eq!(Config::load(&path).unwrap().notifiers.len(), 2);
    }

    #[test]
    fn test_parse_duration() {
        assert_eq!(parse_duration("").unwrap(), Duration::ZERO);
        assert_eq!(parse_duration("0").unwrap(), Duration::ZERO);
        assert_eq!(parse_duration("1h 30m").unwrap(), Duration::from_secs(5400));
        assert!(parse_duration("yesterday").is_err());
    }
}
