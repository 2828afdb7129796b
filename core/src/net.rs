/*
 * net.rs
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

//! Connection helpers: plain TCP (optionally tunnelled through an HTTP CONNECT proxy) and
//! TLS on top of it via rustls.
//!
//! Implicit TLS (nntps) is a plain connect followed immediately by the handshake; STARTTLS
//! upgrades the same plain stream after protocol negotiation.

use std::io;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, ReadBuf};
use tokio::net::TcpStream;
use tokio_rustls::client::TlsStream as TokioTlsStream;
use tokio_rustls::rustls::client::ClientConfig;
use tokio_rustls::rustls::pki_types::ServerName;
use tokio_rustls::rustls::RootCertStore;
use tokio_rustls::TlsConnector;

use crate::uri::authority_host;

/// Upper bound on a proxy's CONNECT response header block.
const MAX_PROXY_RESPONSE: usize = 8192;

/// HTTP proxy used to tunnel NNTP connections (CONNECT method).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyConfig {
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
}

impl ProxyConfig {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            username: None,
            password: None,
        }
    }

    /// Parse `[user:pass@]host:port`.
    pub fn parse(s: &str) -> Option<Self> {
        let s = s.trim();
        let (userinfo, hostport) = match s.rfind('@') {
            Some(at) => (Some(&s[..at]), &s[at + 1..]),
            None => (None, s),
        };
        let colon = hostport.rfind(':')?;
        let host = &hostport[..colon];
        let port: u16 = hostport[colon + 1..].parse().ok()?;
        if host.is_empty() || port == 0 {
            return None;
        }
        let mut proxy = Self::new(host, port);
        if let Some(userinfo) = userinfo {
            let (user, pass) = userinfo.split_once(':').unwrap_or((userinfo, ""));
            proxy.username = Some(user.to_string());
            proxy.password = Some(pass.to_string());
        }
        Some(proxy)
    }

    fn authorization(&self) -> Option<String> {
        let user = self.username.as_deref()?;
        let pass = self.password.as_deref().unwrap_or("");
        Some(format!("Basic {}", BASE64.encode(format!("{}:{}", user, pass))))
    }
}

/// Build a root certificate store: platform native certs first, then webpki-roots as fallback.
fn build_root_store() -> RootCertStore {
    let mut root_store = RootCertStore::empty();
    if let Ok(certs) = rustls_native_certs::load_native_certs() {
        for cert in certs {
            let _ = root_store.add(cert);
        }
    }
    if root_store.is_empty() {
        root_store.roots = webpki_roots::TLS_SERVER_ROOTS.iter().cloned().collect();
    }
    root_store
}

static DEFAULT_CONNECTOR: std::sync::OnceLock<TlsConnector> = std::sync::OnceLock::new();

fn default_connector() -> &'static TlsConnector {
    DEFAULT_CONNECTOR.get_or_init(|| {
        let config = ClientConfig::builder()
            .with_root_certificates(build_root_store())
            .with_no_client_auth();
        TlsConnector::from(Arc::new(config))
    })
}

/// Async TLS stream (wraps tokio-rustls client TlsStream over TcpStream).
pub struct TlsStreamWrapper {
    inner: TokioTlsStream<TcpStream>,
}

impl AsyncRead for TlsStreamWrapper {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_read(cx, buf)
    }
}

impl AsyncWrite for TlsStreamWrapper {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.inner).poll_write(cx, buf)
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_flush(cx)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_shutdown(cx)
    }
}

/// Plain TCP stream, possibly already tunnelled through a proxy.
pub struct PlainStream {
    inner: TcpStream,
}

impl PlainStream {
    /// Connect to host:port, through `proxy` when given.
    pub async fn connect(host: &str, port: u16, proxy: Option<&ProxyConfig>) -> io::Result<Self> {
        let inner = match proxy {
            None => TcpStream::connect((host, port)).await?,
            Some(proxy) => {
                let mut tcp = TcpStream::connect((proxy.host.as_str(), proxy.port)).await?;
                proxy_connect(&mut tcp, proxy, host, port).await?;
                tcp
            }
        };
        Ok(Self { inner })
    }

    /// Run the TLS handshake on this connection (implicit TLS, or after STARTTLS was accepted).
    pub async fn upgrade_to_tls(self, host: &str) -> io::Result<TlsStreamWrapper> {
        let server_name = ServerName::try_from(host.to_string())
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "invalid host name"))?;
        let tls = default_connector()
            .connect(server_name, self.inner)
            .await
            .map_err(|e| io::Error::new(io::ErrorKind::ConnectionRefused, e))?;
        Ok(TlsStreamWrapper { inner: tls })
    }
}

impl AsyncRead for PlainStream {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_read(cx, buf)
    }
}

impl AsyncWrite for PlainStream {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.inner).poll_write(cx, buf)
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_flush(cx)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_shutdown(cx)
    }
}

/// Ask the proxy to open a tunnel to host:port. On return the stream talks to the target.
async fn proxy_connect<S>(stream: &mut S, proxy: &ProxyConfig, host: &str, port: u16) -> io::Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let host = authority_host(host);
    let mut request = format!("CONNECT {host}:{port} HTTP/1.1\r\nHost: {host}:{port}\r\n");
    if let Some(auth) = proxy.authorization() {
        request.push_str(&format!("Proxy-Authorization: {}\r\n", auth));
    }
    request.push_str("\r\n");
    stream.write_all(request.as_bytes()).await?;
    stream.flush().await?;

    // Read byte by byte so nothing after the header block is consumed.
    let mut head = Vec::with_capacity(256);
    while !head.ends_with(b"\r\n\r\n") {
        if head.len() >= MAX_PROXY_RESPONSE {
            return Err(io::Error::new(io::ErrorKind::InvalidData, "proxy response too large"));
        }
        let mut b = [0u8; 1];
        if stream.read(&mut b).await? == 0 {
            return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "proxy closed connection"));
        }
        head.push(b[0]);
    }
    let head = String::from_utf8_lossy(&head);
    let status_line = head.lines().next().unwrap_or("");
    let code = status_line.split_whitespace().nth(1).unwrap_or("");
    if code != "200" {
        return Err(io::Error::new(
            io::ErrorKind::ConnectionRefused,
            format!("proxy CONNECT to {}:{} refused: {}", host, port, status_line),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::duplex;

    #[test]
    fn parse_host_port() {
        let p = ProxyConfig::parse("proxy.local:3128").unwrap();
        assert_eq!(p, ProxyConfig::new("proxy.local", 3128));
    }

    #[test]
    fn parse_with_userinfo() {
        let p = ProxyConfig::parse("bob:s3cret@proxy.local:8080").unwrap();
        assert_eq!(p.username.as_deref(), Some("bob"));
        assert_eq!(p.password.as_deref(), Some("s3cret"));
        assert_eq!(p.host, "proxy.local");
        assert_eq!(p.port, 8080);
    }

    #[test]
    fn parse_rejects_missing_port() {
        assert!(ProxyConfig::parse("proxy.local").is_none());
        assert!(ProxyConfig::parse(":80").is_none());
    }

    #[tokio::test]
    async fn connect_tunnel_accepted() {
        let (mut client, mut server) = duplex(1024);
        let mut proxy = ProxyConfig::new("proxy", 3128);
        proxy.username = Some("u".into());
        proxy.password = Some("p".into());
        let server_task = tokio::spawn(async move {
            let mut buf = vec![0u8; 1024];
            let n = server.read(&mut buf).await.unwrap();
            let req = String::from_utf8_lossy(&buf[..n]).to_string();
            server.write_all(b"HTTP/1.1 200 Connection established\r\n\r\n200 hello\r\n").await.unwrap();
            req
        });
        proxy_connect(&mut client, &proxy, "news.example.com", 119).await.unwrap();
        let req = server_task.await.unwrap();
        assert!(req.starts_with("CONNECT news.example.com:119 HTTP/1.1\r\n"));
        assert!(req.contains("Proxy-Authorization: Basic dTpw\r\n"));
        // The greeting that followed the header block is still unread.
        let mut rest = [0u8; 11];
        client.read_exact(&mut rest).await.unwrap();
        assert_eq!(&rest, b"200 hello\r\n");
    }

    #[tokio::test]
    async fn connect_tunnel_to_ipv6_target() {
        let (mut client, mut server) = duplex(1024);
        let server_task = tokio::spawn(async move {
            let mut buf = vec![0u8; 1024];
            let n = server.read(&mut buf).await.unwrap();
            server.write_all(b"HTTP/1.1 200 OK\r\n\r\n").await.unwrap();
            String::from_utf8_lossy(&buf[..n]).to_string()
        });
        proxy_connect(&mut client, &ProxyConfig::new("proxy", 3128), "::1", 119).await.unwrap();
        let req = server_task.await.unwrap();
        assert!(req.starts_with("CONNECT [::1]:119 HTTP/1.1\r\nHost: [::1]:119\r\n"), "{}", req);
    }

    #[tokio::test]
    async fn connect_tunnel_refused() {
        let (mut client, mut server) = duplex(1024);
        tokio::spawn(async move {
            let mut buf = vec![0u8; 1024];
            let _ = server.read(&mut buf).await;
            let _ = server.write_all(b"HTTP/1.1 407 Proxy Authentication Required\r\n\r\n").await;
        });
        let err = proxy_connect(&mut client, &ProxyConfig::new("proxy", 3128), "h", 119)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("407"));
    }
}
