/*
 * config.rs
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

//! Client configuration (directories, proxy) and news server credentials.
//!
//! Credentials are keyed by the server's credential URI (nntp://host:port) and live either in
//! the system keychain or in ~/.tagliacarte/credentials: XML encrypted with XChaCha20-Poly1305,
//! key in ~/.tagliacarte/.key (mode 0o600).

use std::collections::HashMap;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use chacha20poly1305::aead::{Aead, AeadCore, KeyInit, OsRng};
use chacha20poly1305::XChaCha20Poly1305;
use keyring::Entry;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::reader::Reader;
use quick_xml::writer::Writer;
use thiserror::Error;
use tracing::warn;

#[cfg(unix)]
use std::os::unix::fs::{OpenOptionsExt, PermissionsExt};

use crate::net::ProxyConfig;
use crate::protocol::nntp::ServerDefinition;
use crate::uri::nntp_credential_uri;

/// Environment override for the configuration directory.
pub const ENV_HOME: &str = "TAGLIACARTE_HOME";
/// Environment override for the newsgroup cache directory.
pub const ENV_CACHE_DIR: &str = "TAGLIACARTE_CACHE_DIR";
/// Environment proxy, `[user:pass@]host:port`.
pub const ENV_PROXY: &str = "TAGLIACARTE_PROXY";

const ENCRYPTED_MAGIC: &[u8] = b"TCENC";
const NONCE_LEN: usize = 24;
const TAG_LEN: usize = 16;
const KEY_LEN: usize = 32;

const KEYRING_SERVICE: &str = "tagliacarte";

static USE_KEYCHAIN: AtomicBool = AtomicBool::new(false);

#[derive(Debug, Error)]
pub enum CredentialError {
    #[error("credentials I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("credentials XML error: {0}")]
    Xml(String),
    #[error("credentials encryption error: {0}")]
    Crypto(String),
    #[error("keychain error: {0}")]
    Keychain(#[from] keyring::Error),
    #[error("invalid credentials: {0}")]
    Invalid(String),
}

impl From<quick_xml::Error> for CredentialError {
    fn from(e: quick_xml::Error) -> Self {
        Self::Xml(e.to_string())
    }
}

/// Where the backend keeps its files.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub config_dir: PathBuf,
    pub cache_dir: PathBuf,
    /// Proxy handed to every fetch; None connects directly.
    pub proxy: Option<ProxyConfig>,
}

impl ClientConfig {
    /// Config rooted at `config_dir`; cache under `config_dir/cache/nntp`.
    pub fn new(config_dir: impl Into<PathBuf>) -> Self {
        let config_dir = config_dir.into();
        let cache_dir = config_dir.join("cache").join("nntp");
        Self { config_dir, cache_dir, proxy: None }
    }

    /// Defaults (~/.tagliacarte) with TAGLIACARTE_HOME, TAGLIACARTE_CACHE_DIR and
    /// TAGLIACARTE_PROXY applied. None if no directory can be determined.
    pub fn from_env() -> Option<Self> {
        let config_dir = std::env::var_os(ENV_HOME)
            .map(PathBuf::from)
            .or_else(default_config_dir)?;
        let mut config = Self::new(config_dir);
        if let Some(cache) = std::env::var_os(ENV_CACHE_DIR) {
            config.cache_dir = PathBuf::from(cache);
        }
        if let Ok(proxy) = std::env::var(ENV_PROXY) {
            config.proxy = ProxyConfig::parse(&proxy);
            if config.proxy.is_none() {
                warn!("ignoring malformed {}: {:?}", ENV_PROXY, proxy);
            }
        }
        Some(config)
    }

    pub fn credentials_path(&self) -> PathBuf {
        self.config_dir.join("credentials")
    }

    pub fn identities_path(&self) -> PathBuf {
        self.config_dir.join("identities.xml")
    }

    pub fn servers_path(&self) -> PathBuf {
        self.config_dir.join("nntp-servers.xml")
    }
}

/// Default config directory: ~/.tagliacarte.
pub fn default_config_dir() -> Option<PathBuf> {
    std::env::var_os("HOME").map(PathBuf::from).map(|h| h.join(".tagliacarte"))
}

/// Set whether to use the system keychain (true) or the encrypted file (false) for credentials.
pub fn set_credentials_backend(use_keychain: bool) {
    USE_KEYCHAIN.store(use_keychain, Ordering::SeqCst);
}

pub fn credentials_use_keychain() -> bool {
    USE_KEYCHAIN.load(Ordering::SeqCst)
}

/// Username and password for one news server.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

/// Supplies credentials for a server. Only consulted for servers with an auth user.
pub trait CredentialsProvider: Send + Sync {
    fn credentials_for(&self, server: &ServerDefinition) -> Option<Credentials>;
}

/// Credentials from the configured backend (keychain or encrypted file).
#[derive(Debug, Clone)]
pub struct StoredCredentials {
    path: PathBuf,
}

impl StoredCredentials {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl CredentialsProvider for StoredCredentials {
    fn credentials_for(&self, server: &ServerDefinition) -> Option<Credentials> {
        let uri = nntp_credential_uri(&server.key());
        let mut entries = match load_credentials(&self.path, Some(&uri)) {
            Ok(e) => e,
            Err(e) => {
                warn!("could not load credentials for {}: {}", uri, e);
                return None;
            }
        };
        let mut creds = entries.remove(&uri)?;
        if creds.username.is_empty() {
            creds.username = server.auth_user.clone().unwrap_or_default();
        }
        Some(creds)
    }
}

// ======================================================================
// Keychain backend
// ======================================================================

/// Secret layout: 4-byte LE username length, username UTF-8, password UTF-8.
fn encode_secret(username: &str, password: &str) -> Vec<u8> {
    let u = username.as_bytes();
    let mut out = Vec::with_capacity(4 + u.len() + password.len());
    out.extend_from_slice(&(u.len() as u32).to_le_bytes());
    out.extend_from_slice(u);
    out.extend_from_slice(password.as_bytes());
    out
}

fn decode_secret(secret: &[u8]) -> Option<Credentials> {
    let len_bytes: [u8; 4] = secret.get(..4)?.try_into().ok()?;
    let len = u32::from_le_bytes(len_bytes) as usize;
    let username = std::str::from_utf8(secret.get(4..4 + len)?).ok()?.to_string();
    let password = std::str::from_utf8(&secret[4 + len..]).ok()?.to_string();
    Some(Credentials { username, password })
}

fn keychain_get(uri: &str) -> Result<Option<Credentials>, CredentialError> {
    let entry = Entry::new(KEYRING_SERVICE, uri)?;
    match entry.get_secret() {
        Ok(secret) => Ok(decode_secret(&secret)),
        Err(keyring::Error::NoEntry) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

fn keychain_set(uri: &str, creds: &Credentials) -> Result<(), CredentialError> {
    let entry = Entry::new(KEYRING_SERVICE, uri)?;
    entry.set_secret(&encode_secret(&creds.username, &creds.password))?;
    Ok(())
}

// ======================================================================
// File backend
// ======================================================================

/// Load credentials. With the keychain backend only `uri_for_keychain` is looked up (0 or 1
/// entries); with the file backend the whole file is loaded. A missing file is empty.
pub fn load_credentials(
    path: &Path,
    uri_for_keychain: Option<&str>,
) -> Result<HashMap<String, Credentials>, CredentialError> {
    if credentials_use_keychain() {
        let mut out = HashMap::new();
        if let Some(uri) = uri_for_keychain {
            if let Some(creds) = keychain_get(uri)? {
                out.insert(uri.to_string(), creds);
            }
        }
        return Ok(out);
    }
    load_credentials_from_file(path)
}

/// Save one credential to the configured backend. Values must not contain NUL.
pub fn save_credential(path: &Path, uri: &str, creds: &Credentials) -> Result<(), CredentialError> {
    if [uri, creds.username.as_str(), creds.password.as_str()].iter().any(|s| s.contains('\0')) {
        return Err(CredentialError::Invalid("values must not contain NUL (U+0000)".into()));
    }
    if credentials_use_keychain() {
        return keychain_set(uri, creds);
    }
    let mut entries = load_credentials_from_file(path)?;
    entries.insert(uri.to_string(), creds.clone());
    write_credentials_encrypted(path, &entries)
}

fn key_path(credentials_path: &Path) -> Result<PathBuf, CredentialError> {
    credentials_path
        .parent()
        .map(|p| p.join(".key"))
        .ok_or_else(|| CredentialError::Invalid("credentials path has no parent".into()))
}

fn read_key(path: &Path) -> Result<Option<[u8; KEY_LEN]>, CredentialError> {
    let buf = match fs::read(path) {
        Ok(b) => b,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    let key: [u8; KEY_LEN] = buf
        .as_slice()
        .try_into()
        .map_err(|_| CredentialError::Crypto("key file has wrong length".into()))?;
    Ok(Some(key))
}

fn get_or_create_key(path: &Path) -> Result<[u8; KEY_LEN], CredentialError> {
    if let Some(key) = read_key(path)? {
        return Ok(key);
    }
    let mut key = [0u8; KEY_LEN];
    getrandom::getrandom(&mut key).map_err(|e| CredentialError::Crypto(e.to_string()))?;
    let mut f = open_private_for_write(path)?;
    f.write_all(&key)?;
    f.flush()?;
    Ok(key)
}

fn load_credentials_from_file(path: &Path) -> Result<HashMap<String, Credentials>, CredentialError> {
    let raw = match fs::read(path) {
        Ok(b) => b,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(HashMap::new()),
        Err(e) => return Err(e.into()),
    };
    let plain = if raw.starts_with(ENCRYPTED_MAGIC) {
        if raw.len() < ENCRYPTED_MAGIC.len() + NONCE_LEN + TAG_LEN {
            return Err(CredentialError::Crypto("encrypted credentials file too short".into()));
        }
        let key = read_key(&key_path(path)?)?
            .ok_or_else(|| CredentialError::Crypto("encrypted credentials file but key file not found".into()))?;
        let cipher = XChaCha20Poly1305::new_from_slice(&key).map_err(|e| CredentialError::Crypto(e.to_string()))?;
        let (nonce, ciphertext) = raw[ENCRYPTED_MAGIC.len()..].split_at(NONCE_LEN);
        cipher
            .decrypt(chacha20poly1305::XNonce::from_slice(nonce), ciphertext)
            .map_err(|_| CredentialError::Crypto("decryption failed (wrong key or tampered file)".into()))?
    } else {
        raw
    };
    let content = String::from_utf8(plain).map_err(|e| CredentialError::Invalid(e.to_string()))?;
    parse_credentials_xml(&content)
}

/// Parse `<credentials><credential><uri/><username/><password/></credential>...</credentials>`.
fn parse_credentials_xml(content: &str) -> Result<HashMap<String, Credentials>, CredentialError> {
    // Text is kept as is: passwords may start or end with spaces.
    let mut reader = Reader::from_str(content);
    let mut buf = Vec::new();
    let mut out = HashMap::new();
    let mut uri = String::new();
    let mut current = Credentials::default();
    let mut element = Vec::<u8>::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Err(e) => return Err(CredentialError::Xml(e.to_string())),
            Ok(Event::Eof) => break,
            Ok(Event::Start(e)) => {
                element.clear();
                element.extend_from_slice(e.name().as_ref());
                if element == b"credential" {
                    uri.clear();
                    current = Credentials::default();
                }
            }
            Ok(Event::Text(e)) => {
                let text = e.unescape().map_err(|e| CredentialError::Xml(e.to_string()))?.into_owned();
                match element.as_slice() {
                    b"uri" => uri = text,
                    b"username" => current.username = text,
                    b"password" => current.password = text,
                    _ => {}
                }
            }
            Ok(Event::End(e)) => {
                if e.name().as_ref() == b"credential" && !uri.is_empty() {
                    out.insert(std::mem::take(&mut uri), std::mem::take(&mut current));
                }
                element.clear();
            }
            _ => {}
        }
        buf.clear();
    }
    Ok(out)
}

fn credentials_xml(entries: &HashMap<String, Credentials>) -> Result<Vec<u8>, CredentialError> {
    let mut out = Vec::new();
    let mut writer = Writer::new(&mut out);
    writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;
    writer.write_event(Event::Start(BytesStart::new("credentials")))?;
    for (uri, creds) in entries {
        writer.write_event(Event::Start(BytesStart::new("credential")))?;
        for (name, value) in [
            ("uri", uri.as_str()),
            ("username", creds.username.as_str()),
            ("password", creds.password.as_str()),
        ] {
            writer.write_event(Event::Start(BytesStart::new(name)))?;
            writer.write_event(Event::Text(BytesText::new(value)))?;
            writer.write_event(Event::End(BytesEnd::new(name)))?;
        }
        writer.write_event(Event::End(BytesEnd::new("credential")))?;
    }
    writer.write_event(Event::End(BytesEnd::new("credentials")))?;
    Ok(out)
}

/// File format: "TCENC" + nonce (24) + ciphertext with tag.
fn write_credentials_encrypted(path: &Path, entries: &HashMap<String, Credentials>) -> Result<(), CredentialError> {
    let parent = path
        .parent()
        .ok_or_else(|| CredentialError::Invalid("credentials path has no parent".into()))?;
    fs::create_dir_all(parent)?;
    #[cfg(unix)]
    let _ = fs::set_permissions(parent, PermissionsExt::from_mode(0o700));
    let plain = credentials_xml(entries)?;
    let key = get_or_create_key(&key_path(path)?)?;
    let cipher = XChaCha20Poly1305::new_from_slice(&key).map_err(|e| CredentialError::Crypto(e.to_string()))?;
    let nonce = XChaCha20Poly1305::generate_nonce(&mut OsRng);
    let ciphertext = cipher
        .encrypt(&nonce, plain.as_ref())
        .map_err(|e| CredentialError::Crypto(e.to_string()))?;
    let mut f = open_private_for_write(path)?;
    f.write_all(ENCRYPTED_MAGIC)?;
    f.write_all(nonce.as_slice())?;
    f.write_all(&ciphertext)?;
    f.flush()?;
    Ok(())
}

/// Open for writing; on Unix the file is created with mode 0o600.
fn open_private_for_write(path: &Path) -> std::io::Result<File> {
    #[cfg(unix)]
    {
        fs::OpenOptions::new()
            .write(true)
            .truncate(true)
            .create(true)
            .mode(0o600)
            .open(path)
    }
    #[cfg(not(unix))]
    {
        File::create(path)
    }
}
