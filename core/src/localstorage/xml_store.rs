/*
 * xml_store.rs
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

//! XML files for identities and NNTP server definitions in the config directory.
//!
//! ```text
//! <identities>
//!   <identity name="work"><real-name>..</real-name><mail-address>..</mail-address>...</identity>
//! </identities>
//!
//! <servers>
//!   <server name="News" host="news.example.com" port="119" ssl="false" auth-user="joe" timeout="1"/>
//! </servers>
//! ```
//!
//! Files are replaced via a temporary file and rename, so a reader sees the old or the new
//! content, never a partial write.

use std::borrow::Cow;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use quick_xml::events::attributes::Attributes;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::reader::Reader;
use quick_xml::writer::Writer;

use super::{IdentityStorage, ServerStorage, StorageError};
use crate::identity::Identity;
use crate::protocol::nntp::ServerDefinition;

// ============================================================================
// Identities
// ============================================================================

const IDENTITY_FIELDS: [&str; 6] = [
    "real-name",
    "mail-address",
    "organization",
    "response-address",
    "referrer-url",
    "signature",
];

fn identity_field<'a>(identity: &'a mut Identity, element: &[u8]) -> Option<&'a mut String> {
    match element {
        b"real-name" => Some(&mut identity.real_name),
        b"mail-address" => Some(&mut identity.mail_address),
        b"organization" => Some(&mut identity.organization),
        b"response-address" => Some(&mut identity.response_address),
        b"referrer-url" => Some(&mut identity.referrer_url),
        b"signature" => Some(&mut identity.signature),
        _ => None,
    }
}

fn identity_values(identity: &Identity) -> [&str; 6] {
    [
        identity.real_name.as_str(),
        identity.mail_address.as_str(),
        identity.organization.as_str(),
        identity.response_address.as_str(),
        identity.referrer_url.as_str(),
        identity.signature.as_str(),
    ]
}

#[derive(Debug, Clone)]
pub struct XmlIdentityStore {
    path: PathBuf,
}

impl XmlIdentityStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl IdentityStorage for XmlIdentityStore {
    fn load_identities(&self) -> Result<Vec<Identity>, StorageError> {
        match read_optional(&self.path)? {
            Some(content) => parse_identities(&content),
            None => Ok(Vec::new()),
        }
    }

    fn save_identities(&self, identities: &[Identity]) -> Result<(), StorageError> {
        let xml = identities_xml(identities)?;
        replace_file(&self.path, &xml)
    }
}

fn parse_identities(content: &str) -> Result<Vec<Identity>, StorageError> {
    let mut reader = Reader::from_str(content);
    let mut buf = Vec::new();
    let mut out = Vec::new();
    let mut current: Option<Identity> = None;
    let mut element = Vec::<u8>::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Err(e) => return Err(StorageError::Xml(e.to_string())),
            Ok(Event::Eof) => break,
            Ok(Event::Start(e)) if e.name().as_ref() == b"identity" => {
                let name = attribute(e.attributes(), b"name")?
                    .ok_or_else(|| StorageError::Format("identity without a name".into()))?;
                current = Some(Identity::new(name));
                element.clear();
            }
            Ok(Event::Empty(e)) if e.name().as_ref() == b"identity" => {
                if let Some(name) = attribute(e.attributes(), b"name")? {
                    out.push(Identity::new(name));
                }
            }
            Ok(Event::Start(e)) => {
                element.clear();
                element.extend_from_slice(e.name().as_ref());
            }
            Ok(Event::Text(e)) => {
                if let Some(field) = current.as_mut().and_then(|i| identity_field(i, &element)) {
                    let text = e.unescape().map_err(|e| StorageError::Xml(e.to_string()))?;
                    field.push_str(&text);
                }
            }
            Ok(Event::End(e)) => {
                if e.name().as_ref() == b"identity" {
                    if let Some(identity) = current.take() {
                        out.push(identity);
                    }
                }
                element.clear();
            }
            _ => {}
        }
        buf.clear();
    }
    Ok(out)
}

fn identities_xml(identities: &[Identity]) -> Result<Vec<u8>, StorageError> {
    let mut out = Vec::new();
    let mut writer = Writer::new_with_indent(&mut out, b' ', 2);
    writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;
    writer.write_event(Event::Start(BytesStart::new("identities")))?;
    for identity in identities {
        let mut start = BytesStart::new("identity");
        start.push_attribute(("name", identity.name.as_str()));
        writer.write_event(Event::Start(start))?;
        for (name, value) in IDENTITY_FIELDS.iter().zip(identity_values(identity)) {
            if value.is_empty() {
                continue;
            }
            writer.write_event(Event::Start(BytesStart::new(*name)))?;
            writer.write_event(Event::Text(BytesText::new(value)))?;
            writer.write_event(Event::End(BytesEnd::new(*name)))?;
        }
        writer.write_event(Event::End(BytesEnd::new("identity")))?;
    }
    writer.write_event(Event::End(BytesEnd::new("identities")))?;
    Ok(out)
}

// ============================================================================
// Server definitions
// ============================================================================

#[derive(Debug, Clone)]
pub struct XmlServerStore {
    path: PathBuf,
}

impl XmlServerStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ServerStorage for XmlServerStore {
    fn load_servers(&self) -> Result<Vec<ServerDefinition>, StorageError> {
        match read_optional(&self.path)? {
            Some(content) => parse_servers(&content),
            None => Ok(Vec::new()),
        }
    }

    fn save_servers(&self, servers: &[ServerDefinition]) -> Result<(), StorageError> {
        let xml = servers_xml(servers)?;
        replace_file(&self.path, &xml)
    }
}

fn parse_servers(content: &str) -> Result<Vec<ServerDefinition>, StorageError> {
    let mut reader = Reader::from_str(content);
    let mut buf = Vec::new();
    let mut out = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Err(e) => return Err(StorageError::Xml(e.to_string())),
            Ok(Event::Eof) => break,
            Ok(Event::Start(e)) | Ok(Event::Empty(e)) if e.name().as_ref() == b"server" => {
                out.push(server_from_attributes(e.attributes())?);
            }
            _ => {}
        }
        buf.clear();
    }
    Ok(out)
}

fn server_from_attributes(attributes: Attributes<'_>) -> Result<ServerDefinition, StorageError> {
    let mut sd = ServerDefinition::default();
    for attr in attributes {
        let attr = attr.map_err(|e| StorageError::Xml(e.to_string()))?;
        let value = attr.unescape_value().map_err(|e| StorageError::Xml(e.to_string()))?;
        match attr.key.as_ref() {
            b"name" => sd.name = value.into_owned(),
            b"host" => sd.host = value.into_owned(),
            b"port" => sd.port = parse_number(&value, "port")?,
            b"ssl" => sd.use_ssl = value == "true",
            b"auth-user" if !value.is_empty() => sd.auth_user = Some(value.into_owned()),
            b"timeout" => sd.timeout_minutes = parse_number(&value, "timeout")?,
            _ => {}
        }
    }
    if sd.name.is_empty() {
        return Err(StorageError::Format("server without a name".into()));
    }
    Ok(sd)
}

fn parse_number<T: std::str::FromStr>(value: &str, what: &str) -> Result<T, StorageError> {
    value
        .trim()
        .parse()
        .map_err(|_| StorageError::Format(format!("invalid {}: {:?}", what, value)))
}

fn servers_xml(servers: &[ServerDefinition]) -> Result<Vec<u8>, StorageError> {
    let mut out = Vec::new();
    let mut writer = Writer::new_with_indent(&mut out, b' ', 2);
    writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;
    writer.write_event(Event::Start(BytesStart::new("servers")))?;
    for sd in servers {
        let port = sd.port.to_string();
        let timeout = sd.timeout_minutes.to_string();
        let mut start = BytesStart::new("server");
        start.push_attribute(("name", sd.name.as_str()));
        start.push_attribute(("host", sd.host.as_str()));
        start.push_attribute(("port", port.as_str()));
        start.push_attribute(("ssl", if sd.use_ssl { "true" } else { "false" }));
        if let Some(user) = &sd.auth_user {
            start.push_attribute(("auth-user", user.as_str()));
        }
        start.push_attribute(("timeout", timeout.as_str()));
        writer.write_event(Event::Empty(start))?;
    }
    writer.write_event(Event::End(BytesEnd::new("servers")))?;
    Ok(out)
}

// ============================================================================
// File helpers
// ============================================================================

fn attribute(attributes: Attributes<'_>, name: &[u8]) -> Result<Option<String>, StorageError> {
    for attr in attributes {
        let attr = attr.map_err(|e| StorageError::Xml(e.to_string()))?;
        if attr.key.as_ref() == name {
            let value: Cow<'_, str> = attr.unescape_value().map_err(|e| StorageError::Xml(e.to_string()))?;
            return Ok(Some(value.into_owned()));
        }
    }
    Ok(None)
}

fn read_optional(path: &Path) -> Result<Option<String>, StorageError> {
    match fs::read_to_string(path) {
        Ok(s) => Ok(Some(s)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

fn replace_file(path: &Path, content: &[u8]) -> Result<(), StorageError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let tmp = path.with_extension("tmp");
    let mut w = BufWriter::new(File::create(&tmp)?);
    w.write_all(content)?;
    w.flush()?;
    drop(w);
    fs::rename(&tmp, path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_files_load_empty() {
        let dir = tempfile::tempdir().unwrap();
        assert!(XmlIdentityStore::new(dir.path().join("identities.xml")).load_identities().unwrap().is_empty());
        assert!(XmlServerStore::new(dir.path().join("nntp-servers.xml")).load_servers().unwrap().is_empty());
    }

    #[test]
    fn identities_survive_a_reload() {
        let dir = tempfile::tempdir().unwrap();
        let store = XmlIdentityStore::new(dir.path().join("conf").join("identities.xml"));
        let work = Identity {
            name: "work".into(),
            real_name: "Ada <Lovelace>".into(),
            mail_address: "ada@example.com".into(),
            signature: "-- \nAda & co\n".into(),
            ..Identity::default()
        };
        let bare = Identity::new("bare");
        store.save_identities(&[work.clone(), bare.clone()]).unwrap();
        assert!(!store.path().with_extension("tmp").exists());
        assert_eq!(store.load_identities().unwrap(), vec![work, bare]);
    }

    #[test]
    fn identity_without_name_is_rejected() {
        let err = parse_identities("<identities><identity><real-name>x</real-name></identity></identities>")
            .unwrap_err();
        assert!(matches!(err, StorageError::Format(_)));
    }

    #[test]
    fn unknown_identity_elements_are_ignored() {
        let ids = parse_identities(
            r#"<identities><identity name="a"><nickname>n</nickname><organization>Org</organization></identity></identities>"#,
        )
        .unwrap();
        assert_eq!(ids.len(), 1);
        assert_eq!(ids[0].organization, "Org");
        assert!(ids[0].real_name.is_empty());
    }

    #[test]
    fn servers_survive_a_reload() {
        let dir = tempfile::tempdir().unwrap();
        let store = XmlServerStore::new(dir.path().join("nntp-servers.xml"));
        let mut secure = ServerDefinition::new("Secure", "news.example.org");
        secure.port = 563;
        secure.use_ssl = true;
        secure.auth_user = Some("joe".into());
        secure.timeout_minutes = 3;
        let plain = ServerDefinition::new("Plain", "news.example.com");
        store.save_servers(&[secure.clone(), plain.clone()]).unwrap();
        assert_eq!(store.load_servers().unwrap(), vec![secure, plain]);
    }

    #[test]
    fn bad_port_is_a_format_error() {
        let err = parse_servers(r#"<servers><server name="x" host="h" port="lots"/></servers>"#).unwrap_err();
        assert!(err.to_string().contains("invalid port"));
    }

    #[test]
    fn truncated_xml_is_an_error() {
        assert!(parse_identities("<identities><identity name=\"a\"><real-name>x</identities>").is_err());
    }
}
