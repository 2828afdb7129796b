/*
 * uri.rs
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

//! NNTP request URIs: nntp://host:port[/group] or nntps://host:port[/group].
//! Composed by hand so the authority always follows exactly one "//" and the port is always
//! explicit. Group names are percent-encoded as a single path segment.

use percent_encoding::{utf8_percent_encode, AsciiSet, CONTROLS};

use crate::protocol::nntp::{ServerDefinition, ServerKey};

pub const NNTP_SCHEME: &str = "nntp";
pub const NNTPS_SCHEME: &str = "nntps";

/// Path segment safe set: group names are dotted words, but never let / ? # or space through.
const PATH_SEGMENT: &AsciiSet = &CONTROLS
    .add(b'/')
    .add(b'?')
    .add(b'#')
    .add(b'[')
    .add(b']')
    .add(b'@')
    .add(b'%')
    .add(b' ');

fn scheme(use_ssl: bool) -> &'static str {
    if use_ssl {
        NNTPS_SCHEME
    } else {
        NNTP_SCHEME
    }
}

/// Authority host: IPv6 literals are bracketed.
pub(crate) fn authority_host(host: &str) -> String {
    if host.contains(':') && !host.starts_with('[') {
        format!("[{}]", host)
    } else {
        host.to_string()
    }
}

/// Request URI for a server, optionally addressing one group.
/// An absent or empty group addresses the server root (no trailing slash).
pub fn nntp_request_uri(sd: &ServerDefinition, group: Option<&str>) -> String {
    let root = format!("{}://{}:{}", scheme(sd.use_ssl), authority_host(&sd.host), sd.effective_port());
    match group {
        Some(g) if !g.is_empty() => format!("{}/{}", root, encode_group_name(g)),
        _ => root,
    }
}

/// Credential lookup URI for a server key: nntp://host:port (scheme does not depend on TLS,
/// so toggling SSL keeps the stored credential).
pub fn nntp_credential_uri(key: &ServerKey) -> String {
    format!("{}://{}:{}", NNTP_SCHEME, authority_host(&key.host), key.port)
}

/// Percent-encode a group name for use as a path segment.
pub fn encode_group_name(group: &str) -> String {
    utf8_percent_encode(group, PATH_SEGMENT).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn server(host: &str, port: u16, ssl: bool) -> ServerDefinition {
        ServerDefinition {
            host: host.into(),
            port,
            use_ssl: ssl,
            ..ServerDefinition::default()
        }
    }

    #[test]
    fn plain_default_port() {
        let u = nntp_request_uri(&server("news.example.com", 0, false), None);
        assert_eq!(u, "nntp://news.example.com:119");
    }

    #[test]
    fn ssl_scheme_regardless_of_port() {
        assert_eq!(nntp_request_uri(&server("h", 0, true), None), "nntps://h:119");
        assert_eq!(nntp_request_uri(&server("h", 563, true), None), "nntps://h:563");
        assert_eq!(nntp_request_uri(&server("h", 8119, true), None), "nntps://h:8119");
    }

    #[test]
    fn group_is_path_segment() {
        let u = nntp_request_uri(&server("h", 0, false), Some("comp.lang.rust"));
        assert_eq!(u, "nntp://h:119/comp.lang.rust");
        assert_eq!(u.matches("//").count(), 1);
    }

    #[test]
    fn empty_group_addresses_root() {
        assert_eq!(nntp_request_uri(&server("h", 0, false), Some("")), "nntp://h:119");
    }

    #[test]
    fn group_slash_is_encoded() {
        let u = nntp_request_uri(&server("h", 0, false), Some("odd/name"));
        assert_eq!(u, "nntp://h:119/odd%2Fname");
    }

    #[test]
    fn credential_uri_ignores_ssl() {
        let key = server("h", 563, true).key();
        assert_eq!(nntp_credential_uri(&key), "nntp://h:563");
    }

    #[test]
    fn ipv6_host_is_bracketed() {
        assert_eq!(nntp_request_uri(&server("::1", 0, false), None), "nntp://[::1]:119");
        assert_eq!(
            nntp_request_uri(&server("2001:db8::5", 563, true), Some("alt.test")),
            "nntps://[2001:db8::5]:563/alt.test"
        );
        assert_eq!(nntp_request_uri(&server("[::1]", 0, false), None), "nntp://[::1]:119");
        assert_eq!(nntp_credential_uri(&server("::1", 0, false).key()), "nntp://[::1]:119");
    }
}
