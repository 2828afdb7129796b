/*
 * client.rs
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

//! Async NNTP client for listing groups: connect (direct or via proxy), greeting, CAPABILITIES,
//! STARTTLS, AUTHINFO USER/PASS, LIST, QUIT.
//! NNTP is strictly sequential, so one command is in flight at a time.

use std::io;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tracing::debug;

use super::fetch::FetchError;
use super::server::ServerDefinition;
use crate::config::{Credentials, CredentialsProvider};
use crate::net::{PlainStream, ProxyConfig, TlsStreamWrapper};
use crate::uri::nntp_request_uri;

#[derive(Debug, Error)]
pub enum NntpClientError {
    #[error("{0}")]
    Io(#[from] io::Error),
    #[error("{0}")]
    Protocol(String),
    #[error("authentication failed: {0}")]
    Auth(String),
}

impl NntpClientError {
    fn protocol(msg: impl Into<String>) -> Self {
        Self::Protocol(msg.into())
    }
}

/// Upper bound on one response line, terminator included.
const MAX_LINE_LEN: usize = 8192;

fn line_too_long() -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, "response line too long")
}

/// Parsed NNTP status line: 3-digit code + rest of line.
#[derive(Debug, Clone)]
struct NntpStatus {
    code: u16,
    text: String,
}

fn parse_status(line: &str) -> Option<NntpStatus> {
    let code: u16 = line.get(..3)?.parse().ok()?;
    let text = line.get(4..).unwrap_or("").to_string();
    Some(NntpStatus { code, text })
}

/// Read one CRLF-terminated line byte by byte, so nothing past it is consumed (STARTTLS safe).
async fn read_line<S>(stream: &mut S, buf: &mut Vec<u8>) -> io::Result<String>
where
    S: AsyncRead + Unpin,
{
    buf.clear();
    loop {
        if buf.len() >= MAX_LINE_LEN {
            return Err(line_too_long());
        }
        let mut b = [0u8; 1];
        let n = stream.read(&mut b).await?;
        if n == 0 {
            return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "connection closed"));
        }
        buf.push(b[0]);
        if buf.ends_with(b"\r\n") {
            break;
        }
    }
    Ok(String::from_utf8_lossy(&buf[..buf.len() - 2]).into_owned())
}

async fn write_line<S>(stream: &mut S, line: &str) -> io::Result<()>
where
    S: AsyncWrite + Unpin,
{
    stream.write_all(line.as_bytes()).await?;
    stream.write_all(b"\r\n").await?;
    stream.flush().await
}

async fn send_command<S>(stream: &mut S, buf: &mut Vec<u8>, command: &str) -> Result<NntpStatus, NntpClientError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    write_line(stream, command).await?;
    let line = read_line(stream, buf).await?;
    parse_status(&line).ok_or_else(|| NntpClientError::protocol(format!("bad status: {}", line)))
}

async fn read_greeting<S>(stream: &mut S, buf: &mut Vec<u8>) -> Result<NntpStatus, NntpClientError>
where
    S: AsyncRead + Unpin,
{
    let line = read_line(stream, buf).await?;
    let status = parse_status(&line)
        .ok_or_else(|| NntpClientError::protocol(format!("invalid NNTP greeting: {}", line)))?;
    if status.code != 200 && status.code != 201 {
        return Err(NntpClientError::protocol(format!("NNTP greeting error: {}", line)));
    }
    Ok(status)
}

/// CAPABILITIES (101 + multi-line). Servers without the command yield an empty list.
async fn fetch_capabilities<S>(stream: &mut S, buf: &mut Vec<u8>) -> Result<Vec<String>, NntpClientError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let status = send_command(stream, buf, "CAPABILITIES").await?;
    if status.code != 101 {
        return Ok(Vec::new());
    }
    let mut caps = Vec::new();
    loop {
        let line = read_line(stream, buf).await?;
        if line == "." {
            break;
        }
        caps.push(line.trim().to_uppercase());
    }
    Ok(caps)
}

/// AUTHINFO USER/PASS (RFC 4643).
async fn authinfo<S>(stream: &mut S, buf: &mut Vec<u8>, creds: &Credentials) -> Result<(), NntpClientError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let status = send_command(stream, buf, &format!("AUTHINFO USER {}", creds.username)).await?;
    match status.code {
        281 => return Ok(()),
        381 => {}
        _ => return Err(NntpClientError::Auth(format!("AUTHINFO USER: {} {}", status.code, status.text))),
    }
    let status = send_command(stream, buf, &format!("AUTHINFO PASS {}", creds.password)).await?;
    if status.code == 281 {
        Ok(())
    } else {
        Err(NntpClientError::Auth(format!("AUTHINFO PASS: {} {}", status.code, status.text)))
    }
}

/// Authenticated NNTP session (plain or TLS).
pub enum AuthenticatedSession {
    Plain { stream: PlainStream, posting_allowed: bool },
    Tls { stream: TlsStreamWrapper, posting_allowed: bool },
}

/// Connect and authenticate. `use_implicit_tls` handshakes right after connect (nntps).
/// On a plain connection STARTTLS is used before sending credentials when the server offers it.
pub async fn connect_and_authenticate(
    host: &str,
    port: u16,
    use_implicit_tls: bool,
    credentials: Option<&Credentials>,
    proxy: Option<&ProxyConfig>,
) -> Result<AuthenticatedSession, NntpClientError> {
    let plain = PlainStream::connect(host, port, proxy).await?;
    let mut buf = Vec::with_capacity(512);

    if use_implicit_tls {
        let mut stream = plain.upgrade_to_tls(host).await?;
        let greeting = read_greeting(&mut stream, &mut buf).await?;
        if let Some(creds) = credentials {
            authinfo(&mut stream, &mut buf, creds).await?;
        }
        return Ok(AuthenticatedSession::Tls { stream, posting_allowed: greeting.code == 200 });
    }

    let mut plain = plain;
    let greeting = read_greeting(&mut plain, &mut buf).await?;
    let posting_allowed = greeting.code == 200;
    let Some(creds) = credentials else {
        return Ok(AuthenticatedSession::Plain { stream: plain, posting_allowed });
    };

    let caps = fetch_capabilities(&mut plain, &mut buf).await?;
    if caps.iter().any(|c| c == "STARTTLS") {
        let status = send_command(&mut plain, &mut buf, "STARTTLS").await?;
        if status.code != 382 {
            return Err(NntpClientError::protocol(format!("STARTTLS failed: {} {}", status.code, status.text)));
        }
        let mut tls = plain.upgrade_to_tls(host).await?;
        authinfo(&mut tls, &mut buf, creds).await?;
        return Ok(AuthenticatedSession::Tls { stream: tls, posting_allowed });
    }
    debug!("{}:{} offers no STARTTLS; sending AUTHINFO in plaintext", host, port);
    authinfo(&mut plain, &mut buf, creds).await?;
    Ok(AuthenticatedSession::Plain { stream: plain, posting_allowed })
}

/// Group name from one LIST ACTIVE line ("name high low status"). Blank lines yield None.
pub fn parse_newsgroup_name(line: &str) -> Option<&str> {
    line.split_whitespace().next()
}

/// Send LIST and feed each group name to `on_group` as the response streams in.
/// Performs dot-unstuffing and stops at the terminating ".".
pub async fn list_newsgroups<S, F>(stream: S, mut on_group: F) -> Result<S, NntpClientError>
where
    S: AsyncRead + AsyncWrite + Unpin,
    F: FnMut(&str),
{
    let mut reader = BufReader::new(stream);
    write_line(reader.get_mut(), "LIST").await?;
    let mut line = Vec::with_capacity(128);
    read_crlf_line(&mut reader, &mut line).await?;
    let status_line = String::from_utf8_lossy(&line).into_owned();
    let status = parse_status(&status_line)
        .ok_or_else(|| NntpClientError::protocol(format!("bad LIST response: {}", status_line)))?;
    if status.code != 215 {
        return Err(NntpClientError::protocol(format!("LIST failed: {} {}", status.code, status.text)));
    }
    loop {
        read_crlf_line(&mut reader, &mut line).await?;
        if line == b"." {
            break;
        }
        let data = if line.starts_with(b"..") { &line[1..] } else { &line[..] };
        let text = String::from_utf8_lossy(data);
        if let Some(name) = parse_newsgroup_name(&text) {
            on_group(name);
        }
    }
    Ok(reader.into_inner())
}

/// Buffered line read; strips CRLF (or bare LF). EOF before the terminator is an error.
async fn read_crlf_line<R>(reader: &mut R, line: &mut Vec<u8>) -> io::Result<()>
where
    R: tokio::io::AsyncBufRead + Unpin,
{
    line.clear();
    let n = (&mut *reader).take(MAX_LINE_LEN as u64).read_until(b'\n', line).await?;
    if !line.ends_with(b"\n") && line.len() >= MAX_LINE_LEN {
        return Err(line_too_long());
    }
    if n == 0 || !line.ends_with(b"\n") {
        return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "connection closed during LIST"));
    }
    line.pop();
    if line.ends_with(b"\r") {
        line.pop();
    }
    Ok(())
}

/// Best-effort QUIT; the list is already complete, so errors are ignored.
async fn quit<S>(mut stream: S)
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut buf = Vec::new();
    let _ = send_command(&mut stream, &mut buf, "QUIT").await;
    let _ = stream.shutdown().await;
}

// ======================================================================
// List request and group source
// ======================================================================

/// One "list the groups" request, fully resolved: where to connect, how to authenticate,
/// through which proxy, and how long to wait.
#[derive(Debug, Clone)]
pub struct ListRequest {
    pub uri: String,
    pub method: &'static str,
    pub host: String,
    pub port: u16,
    pub use_tls: bool,
    pub credentials: Option<Credentials>,
    pub proxy: Option<ProxyConfig>,
    pub timeout: Duration,
}

impl ListRequest {
    pub const METHOD: &'static str = "LIST";

    /// Build the request for `server`. `credentials` is only consulted if the server has an
    /// auth user; the proxy is attached as given.
    pub fn for_server(
        server: &ServerDefinition,
        credentials: Option<&dyn CredentialsProvider>,
        proxy: Option<&ProxyConfig>,
    ) -> Self {
        let credentials = if server.requires_auth() {
            credentials.and_then(|p| p.credentials_for(server))
        } else {
            None
        };
        Self {
            uri: nntp_request_uri(server, None),
            method: Self::METHOD,
            host: server.host.clone(),
            port: server.effective_port(),
            use_tls: server.use_ssl,
            credentials,
            proxy: proxy.cloned(),
            timeout: server.timeout(),
        }
    }
}

/// Performs the network round-trip of a list request.
#[async_trait]
pub trait GroupSource: Send + Sync {
    async fn list_groups(&self, request: &ListRequest) -> Result<Vec<String>, FetchError>;
}

/// Real NNTP implementation of [`GroupSource`].
#[derive(Debug, Clone, Copy, Default)]
pub struct NntpGroupSource;

#[async_trait]
impl GroupSource for NntpGroupSource {
    async fn list_groups(&self, request: &ListRequest) -> Result<Vec<String>, FetchError> {
        debug!("{} {}", request.method, request.uri);
        let session = connect_and_authenticate(
            &request.host,
            request.port,
            request.use_tls,
            request.credentials.as_ref(),
            request.proxy.as_ref(),
        )
        .await?;
        let mut groups = Vec::with_capacity(500);
        match session {
            AuthenticatedSession::Plain { stream, .. } => {
                let stream = list_newsgroups(stream, |g| groups.push(g.to_string())).await?;
                quit(stream).await;
            }
            AuthenticatedSession::Tls { stream, .. } => {
                let stream = list_newsgroups(stream, |g| groups.push(g.to_string())).await?;
                quit(stream).await;
            }
        }
        debug!("{} groups from {}", groups.len(), request.uri);
        Ok(groups)
    }
}
