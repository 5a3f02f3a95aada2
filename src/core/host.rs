// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025-2026 JR Morton

//! Host facts: hostname, platform tag and local time zone name.

use super::error::WatchError;

/// Platform tag stamped on every event (`linux`, `macos`, `windows`, ...).
pub fn platform_tag() -> &'static str {
    std::env::consts::OS
}

/// Resolve the system hostname.
///
/// An empty or unreadable hostname is a fatal setup error.
pub fn hostname() -> Result<String, WatchError> {
    let name = system_hostname().ok_or(WatchError::Hostname)?;
    let name = name.trim().to_string();
    if name.is_empty() {
        return Err(WatchError::Hostname);
    }
    Ok(name)
}

/// Use `configured` when non-empty, otherwise the system hostname.
pub fn resolve_hostname(configured: &str) -> Result<String, WatchError> {
    let configured = configured.trim();
    if configured.is_empty() {
        hostname()
    } else {
        Ok(configured.to_string())
    }
}

#[cfg(unix)]
fn system_hostname() -> Option<String> {
    let mut buf = [0u8; 256];
    let rc = unsafe { libc::gethostname(buf.as_mut_ptr() as *mut libc::c_char, buf.len()) };
    if rc != 0 {
        return std::fs::read_to_string("/etc/hostname").ok();
    }
    let end = buf.iter().position(|&b| b == 0).unwrap_or(buf.len());
    Some(String::from_utf8_lossy(&buf[..end]).into_owned())
}

#[cfg(not(unix))]
fn system_hostname() -> Option<String> {
    std::env::var("COMPUTERNAME")
        .or_else(|_| std::env::var("HOSTNAME"))
        .ok()
}

/// Abbreviated local zone name (`CST`, `PDT`, `UTC`) in effect at the unix
/// `timestamp`. `None` when the platform cannot tell, or only knows a
/// numeric offset such as `+08`.
#[cfg(any(target_os = "linux", target_os = "macos"))]
pub fn zone_abbreviation(timestamp: i64) -> Option<String> {
    let t = timestamp as libc::time_t;
    let mut tm: libc::tm = unsafe { std::mem::zeroed() };
    let res = unsafe { libc::localtime_r(&t, &mut tm) };
    if res.is_null() || tm.tm_zone.is_null() {
        return None;
    }
    let name = unsafe { std::ffi::CStr::from_ptr(tm.tm_zone) }
        .to_string_lossy()
        .trim()
        .to_string();
    if name.is_empty() || name.starts_with(['+', '-']) {
        return None;
    }
    Some(name)
}

#[cfg(not(any(target_os = "linux", target_os = "macos")))]
pub fn zone_abbreviation(_timestamp: i64) -> Option<String> {
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_configured_hostname_wins() {
        assert_eq!(resolve_hostname("  edge-01 ").unwrap(), "edge-01");
    }

    #[test]
    fn test_system_hostname_is_non_empty() {
        let name = resolve_hostname("").unwrap();
        assert!(!name.is_empty());
    }

    #[cfg(any(target_os = "linux", target_os = "macos"))]
    #[test]
    fn test_zone_abbreviation_is_a_name() {
        let zone = zone_abbreviation(1_705_314_600).unwrap();
        assert!(!zone.is_empty());
        assert!(!zone.starts_with(['+', '-']));
    }

    #[test]
    fn test_platform_tag_matches_target() {
        assert_eq!(platform_tag(), std::env::consts::OS);
    }
}
