/*
 * server.rs
 * Copyright (C) 2026 Chris Burdess
 *
 * This file is part of Tagliacarte, a cross-platform email client.
 *
 * Tagliacarte is free software: you can redistribute it and/or modify
 * it under the terms of the GNU General Public License as published by
 * the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * Tagliacarte is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 * GNU General Public License for more details.
 *
 * You should have received a copy of the GNU General Public License
 * along with Tagliacarte.  If not, see <http://www.gnu.org/licenses/>.
 */

//! NNTP server definitions and the (host, port) key used for caching and credentials.

use std::fmt;
use std::time::Duration;

/// Well-known NNTP port.
pub const NNTP_DEFAULT_PORT: u16 = 119;

/// Request timeout when the server definition does not set one.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// One configured news server.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServerDefinition {
    /// Display name; key in the server-definition collection.
    pub name: String,
    pub host: String,
    /// 0 means the default port.
    pub port: u16,
    pub use_ssl: bool,
    /// Login name; credentials are only looked up when this is non-empty.
    pub auth_user: Option<String>,
    /// Request timeout in minutes; 0 means the default.
    pub timeout_minutes: u32,
}

impl ServerDefinition {
    pub fn new(name: impl Into<String>, host: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            host: host.into(),
            ..Self::default()
        }
    }

    pub fn effective_port(&self) -> u16 {
        if self.port != 0 {
            self.port
        } else {
            NNTP_DEFAULT_PORT
        }
    }

    pub fn key(&self) -> ServerKey {
        ServerKey {
            host: self.host.clone(),
            port: self.effective_port(),
        }
    }

    /// True if an auth user is configured (non-empty).
    pub fn requires_auth(&self) -> bool {
        self.auth_user.as_deref().is_some_and(|u| !u.is_empty())
    }

    pub fn timeout(&self) -> Duration {
        if self.timeout_minutes > 0 {
            Duration::from_secs(u64::from(self.timeout_minutes) * 60)
        } else {
            DEFAULT_TIMEOUT
        }
    }
}

/// Server identity for cache file naming and credential lookup: host plus effective port.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ServerKey {
    pub host: String,
    pub port: u16,
}

impl fmt::Display for ServerKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unset_port_uses_default() {
        let sd = ServerDefinition::new("News", "news.example.com");
        assert_eq!(sd.effective_port(), 119);
        assert_eq!(sd.key(), ServerKey { host: "news.example.com".into(), port: 119 });
    }

    #[test]
    fn explicit_port_is_kept() {
        let mut sd = ServerDefinition::new("News", "news.example.com");
        sd.port = 563;
        assert_eq!(sd.effective_port(), 563);
        assert_eq!(sd.key().to_string(), "news.example.com:563");
    }

    #[test]
    fn timeout_in_minutes() {
        let mut sd = ServerDefinition::new("News", "h");
        assert_eq!(sd.timeout(), Duration::from_secs(60));
        sd.timeout_minutes = 3;
        assert_eq!(sd.timeout(), Duration::from_secs(180));
    }

    #[test]
    fn empty_auth_user_needs_no_credentials() {
        let mut sd = ServerDefinition::new("News", "h");
        assert!(!sd.requires_auth());
        sd.auth_user = Some(String::new());
        assert!(!sd.requires_auth());
        sd.auth_user = Some("reader".into());
        assert!(sd.requires_auth());
    }
}
