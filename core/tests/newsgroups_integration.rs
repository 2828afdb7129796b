/*
 * newsgroups_integration.rs
 * Copyright (C) 2026 Chris Burdess
 *
 * Integration test for newsgroup list loading. Runs the loader against an
 * in-process NNTP server on 127.0.0.1 and checks the on-disk cache after each
 * forced reload.
 *
 * Run with:
 *   cargo test -p tagliacarte_news --test newsgroups_integration -- --nocapture
 */

use std::sync::{Arc, Mutex};

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use tagliacarte_news::config::{Credentials, CredentialsProvider};
use tagliacarte_news::localstorage::GroupCache;
use tagliacarte_news::{FetchFailure, NewsgroupLoader, ServerDefinition};

const AUTH_USER: &str = "reader";
const AUTH_PASS: &str = " s3cret pw ";

/// How the fake server answers.
#[derive(Clone, Copy)]
enum Script {
    /// 200 greeting, LIST answered with these groups.
    Groups(&'static [&'static str]),
    /// Greeting refuses service.
    Refuse,
    /// LIST only after AUTHINFO USER/PASS with `AUTH_USER` and `AUTH_PASS`.
    /// CAPABILITIES does not offer STARTTLS.
    RequireAuth(&'static [&'static str]),
}

/// Every command line the fake server received, in order.
type Transcript = Arc<Mutex<Vec<String>>>;

fn list_reply(groups: &[&str]) -> String {
    let mut reply = String::from("215 list of newsgroups follows\r\n");
    for (i, g) in groups.iter().enumerate() {
        reply.push_str(&format!("{} {:010} {:010} y\r\n", g, i + 10, 1));
    }
    reply.push_str(".\r\n");
    reply
}

/// Serve exactly one connection on a fresh port. Returns the port and the transcript.
async fn fake_nntp_server(script: Script) -> (u16, Transcript) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let transcript = Transcript::default();
    let seen = transcript.clone();
    tokio::spawn(async move {
        let (socket, _) = listener.accept().await.unwrap();
        let (read, mut write) = socket.into_split();
        let (groups, require_auth) = match script {
            Script::Refuse => {
                write.write_all(b"502 access denied\r\n").await.unwrap();
                return;
            }
            Script::Groups(groups) => (groups, false),
            Script::RequireAuth(groups) => (groups, true),
        };
        write.write_all(b"200 fake news server ready\r\n").await.unwrap();
        let mut user_ok = false;
        let mut authenticated = !require_auth;
        let mut lines = BufReader::new(read).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            seen.lock().unwrap().push(line.clone());
            let reply = if let Some(user) = line.strip_prefix("AUTHINFO USER ") {
                user_ok = user == AUTH_USER;
                "381 password required\r\n".to_string()
            } else if let Some(pass) = line.strip_prefix("AUTHINFO PASS ") {
                authenticated = user_ok && pass == AUTH_PASS;
                let reply = if authenticated { "281 welcome\r\n" } else { "481 rejected\r\n" };
                reply.to_string()
            } else {
                match line.trim() {
                    "CAPABILITIES" => "101 capabilities\r\nVERSION 2\r\nAUTHINFO USER\r\nLIST ACTIVE\r\n.\r\n".to_string(),
                    "LIST" | "LIST ACTIVE" if authenticated => list_reply(groups),
                    "LIST" | "LIST ACTIVE" => "480 authentication required\r\n".to_string(),
                    "QUIT" => {
                        let _ = write.write_all(b"205 bye\r\n").await;
                        break;
                    }
                    _ => "500 what?\r\n".to_string(),
                }
            };
            write.write_all(reply.as_bytes()).await.unwrap();
        }
    });
    (port, transcript)
}

/// Same credentials for every server.
struct FixedCredentials(Credentials);

impl CredentialsProvider for FixedCredentials {
    fn credentials_for(&self, _server: &ServerDefinition) -> Option<Credentials> {
        Some(self.0.clone())
    }
}

fn credentials(password: &str) -> Arc<dyn CredentialsProvider> {
    Arc::new(FixedCredentials(Credentials { username: AUTH_USER.into(), password: password.into() }))
}

fn local_server(port: u16) -> ServerDefinition {
    let mut sd = ServerDefinition::new("Local", "127.0.0.1");
    sd.port = port;
    sd
}

#[derive(Default)]
struct Failures(Mutex<Vec<String>>);

impl Failures {
    fn reporter(&self) -> impl Fn(&FetchFailure) + Send + Sync + '_ {
        move |f: &FetchFailure| self.0.lock().unwrap().push(f.to_string())
    }
}

#[tokio::test]
async fn forced_reload_writes_cache_and_plain_load_reads_it() {
    let dir = tempfile::tempdir().unwrap();
    let cache = GroupCache::new(dir.path().join("nntp"));
    let loader = NewsgroupLoader::new(cache.clone());
    let (port, _) = fake_nntp_server(Script::Groups(&["alt.test", "comp.lang"])).await;
    let server = local_server(port);
    let failures = Failures::default();
    let reporter = failures.reporter();
    let cancel = CancellationToken::new();

    let groups = loader.load_newsgroups(&server, true, &cancel, &reporter).await.unwrap();
    assert_eq!(groups, vec!["alt.test", "comp.lang"]);
    assert!(failures.0.lock().unwrap().is_empty());

    let path = cache.file_path(&server.key());
    assert_eq!(path.file_name().unwrap().to_str().unwrap(), format!("127.0.0.1_{}.xml", port));
    assert_eq!(std::fs::read_to_string(&path).unwrap(), "alt.test\ncomp.lang\n");

    // The fake server only accepts one connection; this must come from the cache.
    let cached = loader.load_newsgroups(&server, false, &cancel, &reporter).await.unwrap();
    assert_eq!(cached, groups);
}

#[tokio::test]
async fn empty_list_removes_cache_entry() {
    let dir = tempfile::tempdir().unwrap();
    let cache = GroupCache::new(dir.path());
    let loader = NewsgroupLoader::new(cache.clone());
    let (port, _) = fake_nntp_server(Script::Groups(&[])).await;
    let server = local_server(port);
    cache.save(&server.key(), &["stale.group".to_string()]);
    let failures = Failures::default();
    let reporter = failures.reporter();
    let cancel = CancellationToken::new();

    let groups = loader.load_newsgroups(&server, true, &cancel, &reporter).await.unwrap();
    assert!(groups.is_empty());
    assert!(!cache.file_path(&server.key()).exists());
    assert!(loader.load_newsgroups(&server, false, &cancel, &reporter).await.unwrap().is_empty());
}

#[tokio::test]
async fn refused_service_keeps_cache_and_reports_host() {
    let dir = tempfile::tempdir().unwrap();
    let cache = GroupCache::new(dir.path());
    let loader = NewsgroupLoader::new(cache.clone());
    let (port, _) = fake_nntp_server(Script::Refuse).await;
    let server = local_server(port);
    cache.save(&server.key(), &["kept.group".to_string()]);
    let failures = Failures::default();
    let reporter = failures.reporter();

    let groups = loader
        .load_newsgroups(&server, true, &CancellationToken::new(), &reporter)
        .await
        .unwrap();
    assert!(groups.is_empty());
    assert_eq!(cache.load(&server.key()), vec!["kept.group"]);
    let messages = failures.0.lock().unwrap();
    assert_eq!(messages.len(), 1);
    assert!(messages[0].starts_with("Loading newsgroups from 127.0.0.1 failed:"), "{}", messages[0]);
    assert!(messages[0].contains("502"), "{}", messages[0]);
}

#[tokio::test]
async fn unreachable_server_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    let loader = NewsgroupLoader::new(GroupCache::new(dir.path()));
    // Bind then drop to get a port with nothing listening.
    let port = {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap().port()
    };
    let failures = Failures::default();
    let reporter = failures.reporter();

    let groups = loader
        .load_newsgroups(&local_server(port), true, &CancellationToken::new(), &reporter)
        .await
        .unwrap();
    assert!(groups.is_empty());
    let messages = failures.0.lock().unwrap();
    assert_eq!(messages.len(), 1);
    assert!(messages[0].contains("127.0.0.1"));
}

#[tokio::test]
async fn authenticates_in_plaintext_before_list() {
    let dir = tempfile::tempdir().unwrap();
    let cache = GroupCache::new(dir.path());
    let loader = NewsgroupLoader::new(cache.clone()).credentials(credentials(AUTH_PASS));
    let (port, transcript) = fake_nntp_server(Script::RequireAuth(&["private.group"])).await;
    let mut server = local_server(port);
    server.auth_user = Some(AUTH_USER.into());
    let failures = Failures::default();
    let reporter = failures.reporter();

    let groups = loader
        .load_newsgroups(&server, true, &CancellationToken::new(), &reporter)
        .await
        .unwrap();
    assert!(failures.0.lock().unwrap().is_empty());
    assert_eq!(groups, vec!["private.group"]);
    assert_eq!(cache.load(&server.key()), vec!["private.group"]);
    let commands = transcript.lock().unwrap().clone();
    assert_eq!(
        &commands[..4],
        &[
            "CAPABILITIES".to_string(),
            format!("AUTHINFO USER {}", AUTH_USER),
            format!("AUTHINFO PASS {}", AUTH_PASS),
            "LIST".to_string(),
        ]
    );
}

#[tokio::test]
async fn wrong_password_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    let loader = NewsgroupLoader::new(GroupCache::new(dir.path())).credentials(credentials("wrong"));
    let (port, transcript) = fake_nntp_server(Script::RequireAuth(&["private.group"])).await;
    let mut server = local_server(port);
    server.auth_user = Some(AUTH_USER.into());
    let failures = Failures::default();
    let reporter = failures.reporter();

    let groups = loader
        .load_newsgroups(&server, true, &CancellationToken::new(), &reporter)
        .await
        .unwrap();
    assert!(groups.is_empty());
    let messages = failures.0.lock().unwrap();
    assert_eq!(messages.len(), 1);
    assert!(messages[0].contains("authentication failed"), "{}", messages[0]);
    assert!(!transcript.lock().unwrap().iter().any(|c| c.starts_with("LIST")));
}

#[tokio::test]
async fn no_auth_user_sends_no_credentials() {
    let dir = tempfile::tempdir().unwrap();
    let loader = NewsgroupLoader::new(GroupCache::new(dir.path())).credentials(credentials(AUTH_PASS));
    let (port, transcript) = fake_nntp_server(Script::Groups(&["alt.test"])).await;
    let failures = Failures::default();
    let reporter = failures.reporter();

    let groups = loader
        .load_newsgroups(&local_server(port), true, &CancellationToken::new(), &reporter)
        .await
        .unwrap();
    assert_eq!(groups, vec!["alt.test"]);
    let commands = transcript.lock().unwrap();
    assert_eq!(commands.first().map(String::as_str), Some("LIST"));
    assert!(!commands.iter().any(|c| c.starts_with("AUTHINFO") || c == "CAPABILITIES"));
}
