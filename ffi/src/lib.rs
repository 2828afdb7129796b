/*
 * lib.rs
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

//! C FFI for the tagliacarte news backend. A manager is identified by the handle string
//! returned from tagliacarte_news_manager_new; newsgroup loads by a request id.
//! Returned strings are freed with tagliacarte_free_string, string lists with
//! tagliacarte_free_string_list. All string parameters are UTF-8 NUL-terminated.

use libc::{c_char, c_int, c_void, size_t};
use std::collections::HashMap;
use std::ffi::{CStr, CString};
use std::ptr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use tagliacarte_news::config::{save_credential, set_credentials_backend, ClientConfig, Credentials};
use tagliacarte_news::logging::init_logging;
use tagliacarte_news::uri::nntp_credential_uri;
use tagliacarte_news::{
    anonymous_identity, ChangeEvent, ConfigurationSnapshot, FetchFailure, Identity, LegacyIdentity,
    LoadStatus, NewsServerManager, ServerDefinition,
};
use tokio::sync::broadcast::error::RecvError;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

/// Wrapper so *mut c_void can be moved into Send closures. C callbacks are invoked from worker threads.
struct SendableUserData(*mut c_void);
unsafe impl Send for SendableUserData {}
unsafe impl Sync for SendableUserData {}

impl SendableUserData {
    fn ptr(&self) -> *mut c_void {
        self.0
    }
}

/// Callbacks for a newsgroup load. Called on a backend thread; UI must marshal to main thread.
/// on_group(name), once per group in server order.
type OnNewsgroup = extern "C" fn(*const c_char, *mut c_void);
/// on_failed(message): the user-facing error text, e.g. for a message box.
type OnLoadFailed = extern "C" fn(*const c_char, *mut c_void);
/// on_complete(status, group_count): status is one of TAGLIACARTE_NEWS_*.
type OnLoadComplete = extern "C" fn(c_int, size_t, *mut c_void);

/// on_changed(kind): kind is one of TAGLIACARTE_NEWS_CHANGED_*.
type OnConfigurationChanged = extern "C" fn(c_int, *mut c_void);

pub const TAGLIACARTE_NEWS_OK: c_int = 0;
pub const TAGLIACARTE_NEWS_ERROR: c_int = -1;
pub const TAGLIACARTE_NEWS_CANCELLED: c_int = 1;

pub const TAGLIACARTE_NEWS_CHANGED_IDENTITIES: c_int = 1;
pub const TAGLIACARTE_NEWS_CHANGED_SERVERS: c_int = 2;

/// Managers keyed by handle, in-flight loads keyed by request id, change listeners keyed by
/// listener id.
/// Hosts the shared tokio runtime for all backend I/O.
struct Registry {
    runtime: tokio::runtime::Runtime,
    managers: RwLock<HashMap<String, Arc<NewsServerManager>>>,
    requests: RwLock<HashMap<String, CancellationToken>>,
    listeners: RwLock<HashMap<String, CancellationToken>>,
    request_counter: AtomicU64,
}

fn registry() -> Option<&'static Registry> {
    static REGISTRY: once_cell::sync::OnceCell<Registry> = once_cell::sync::OnceCell::new();
    let init = REGISTRY.get_or_try_init(|| -> std::io::Result<Registry> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .enable_all()
            .build()?;
        Ok(Registry {
            runtime,
            managers: RwLock::new(HashMap::new()),
            requests: RwLock::new(HashMap::new()),
            listeners: RwLock::new(HashMap::new()),
            request_counter: AtomicU64::new(0),
        })
    });
    match init {
        Ok(r) => Some(r),
        Err(e) => {
            error!("failed to create tokio runtime: {}", e);
            set_last_error("failed to create tokio runtime");
            None
        }
    }
}

fn manager(handle: *const c_char) -> Option<Arc<NewsServerManager>> {
    let Some(handle) = ptr_to_str(handle) else {
        set_last_error("manager handle is null or not valid UTF-8");
        return None;
    };
    let found = registry()?
        .managers
        .read()
        .ok()
        .and_then(|g| g.get(&handle).cloned());
    if found.is_none() {
        set_last_error("manager not found");
    }
    found
}

fn ptr_to_str(ptr: *const c_char) -> Option<String> {
    if ptr.is_null() {
        return None;
    }
    unsafe { CStr::from_ptr(ptr).to_str().ok().map(|s| s.to_string()) }
}

/// Interior NULs are dropped rather than failing the call.
fn to_c_string(s: &str) -> CString {
    CString::new(s.replace('\0', "")).unwrap_or_default()
}

thread_local! {
    static LAST_ERROR: std::cell::RefCell<Option<CString>> = const { std::cell::RefCell::new(None) };
}

fn set_last_error(msg: &str) {
    let msg = to_c_string(msg);
    LAST_ERROR.with(|e| *e.borrow_mut() = Some(msg));
}

fn clear_last_error() {
    LAST_ERROR.with(|e| *e.borrow_mut() = None);
}

/// NULL-terminated array of owned strings; freed with tagliacarte_free_string_list.
fn string_list_to_c(items: impl IntoIterator<Item = String>) -> *mut *mut c_char {
    let mut v: Vec<*mut c_char> = items.into_iter().map(|s| to_c_string(&s).into_raw()).collect();
    v.push(ptr::null_mut());
    Box::into_raw(v.into_boxed_slice()) as *mut *mut c_char
}

// ---------- C structs ----------

/// One identity. Returned structs are freed with tagliacarte_news_free_identity.
#[repr(C)]
pub struct TagliacarteIdentity {
    pub name: *mut c_char,
    pub real_name: *mut c_char,
    pub mail_address: *mut c_char,
    pub organization: *mut c_char,
    pub response_address: *mut c_char,
    pub referrer_url: *mut c_char,
    pub signature: *mut c_char,
}

/// One NNTP server definition. port 0 and timeout_minutes 0 mean the defaults.
/// Returned structs are freed with tagliacarte_news_free_server.
#[repr(C)]
pub struct TagliacarteNntpServer {
    pub name: *mut c_char,
    pub host: *mut c_char,
    pub port: u16,
    pub use_ssl: c_int,
    /// NULL or empty for no authentication.
    pub auth_user: *mut c_char,
    pub timeout_minutes: u32,
}

fn identity_to_c(identity: &Identity) -> *mut TagliacarteIdentity {
    Box::into_raw(Box::new(TagliacarteIdentity {
        name: to_c_string(&identity.name).into_raw(),
        real_name: to_c_string(&identity.real_name).into_raw(),
        mail_address: to_c_string(&identity.mail_address).into_raw(),
        organization: to_c_string(&identity.organization).into_raw(),
        response_address: to_c_string(&identity.response_address).into_raw(),
        referrer_url: to_c_string(&identity.referrer_url).into_raw(),
        signature: to_c_string(&identity.signature).into_raw(),
    }))
}

/// NULL fields read as empty strings.
fn identity_from_c(c: &TagliacarteIdentity) -> Identity {
    let field = |p: *mut c_char| ptr_to_str(p).unwrap_or_default();
    Identity {
        name: field(c.name),
        real_name: field(c.real_name),
        mail_address: field(c.mail_address),
        organization: field(c.organization),
        response_address: field(c.response_address),
        referrer_url: field(c.referrer_url),
        signature: field(c.signature),
    }
}

fn legacy_identity_from_c(c: &TagliacarteIdentity) -> LegacyIdentity {
    let id = identity_from_c(c);
    LegacyIdentity {
        name: id.name,
        real_name: id.real_name,
        mail_address: id.mail_address,
        organization: id.organization,
        response_address: id.response_address,
        referrer_url: id.referrer_url,
        signature: id.signature,
    }
}

fn server_to_c(sd: &ServerDefinition) -> *mut TagliacarteNntpServer {
    Box::into_raw(Box::new(TagliacarteNntpServer {
        name: to_c_string(&sd.name).into_raw(),
        host: to_c_string(&sd.host).into_raw(),
        port: sd.port,
        use_ssl: if sd.use_ssl { 1 } else { 0 },
        auth_user: match &sd.auth_user {
            Some(u) => to_c_string(u).into_raw(),
            None => ptr::null_mut(),
        },
        timeout_minutes: sd.timeout_minutes,
    }))
}

fn server_from_c(c: &TagliacarteNntpServer) -> ServerDefinition {
    ServerDefinition {
        name: ptr_to_str(c.name).unwrap_or_default(),
        host: ptr_to_str(c.host).unwrap_or_default(),
        port: c.port,
        use_ssl: c.use_ssl != 0,
        auth_user: ptr_to_str(c.auth_user).filter(|u| !u.is_empty()),
        timeout_minutes: c.timeout_minutes,
    }
}

/// Borrow a C array as a slice; NULL or zero count is empty.
unsafe fn c_slice<'a, T>(ptr: *const T, count: size_t) -> &'a [T] {
    if ptr.is_null() || count == 0 {
        Default::default()
    } else {
        std::slice::from_raw_parts(ptr, count)
    }
}

unsafe fn free_c_string(p: *mut c_char) {
    if !p.is_null() {
        let _ = CString::from_raw(p);
    }
}

// ---------- Library ----------

/// Version string (static, do not free).
#[no_mangle]
pub extern "C" fn tagliacarte_news_version() -> *const c_char {
    b"0.1.0\0".as_ptr() as *const c_char
}

/// Last error message from a failed call on this thread. Valid until next FFI call. Do not free.
#[no_mangle]
pub extern "C" fn tagliacarte_news_last_error() -> *const c_char {
    LAST_ERROR.with(|e| {
        e.borrow()
            .as_ref()
            .map(|s| s.as_ptr())
            .unwrap_or(ptr::null())
    })
}

/// Set up logging (RUST_LOG, default info) and the backend runtime. Safe to call more than once.
/// Returns 0 on success, -1 on error.
#[no_mangle]
pub extern "C" fn tagliacarte_news_init() -> c_int {
    init_logging();
    match registry() {
        Some(_) => {
            clear_last_error();
            TAGLIACARTE_NEWS_OK
        }
        None => TAGLIACARTE_NEWS_ERROR,
    }
}

/// Free a string returned by this library. No-op if ptr is NULL.
#[no_mangle]
pub unsafe extern "C" fn tagliacarte_free_string(ptr: *mut c_char) {
    free_c_string(ptr);
}

/// Free a NULL-terminated string list returned by this library.
#[no_mangle]
pub unsafe extern "C" fn tagliacarte_free_string_list(ptr: *mut *mut c_char) {
    if ptr.is_null() {
        return;
    }
    let mut p = ptr;
    while !(*p).is_null() {
        let _ = CString::from_raw(*p);
        p = p.add(1);
    }
    let len = (p.offset_from(ptr) as usize) + 1;
    let _ = Box::from_raw(std::ptr::slice_from_raw_parts_mut(ptr, len));
}

/// Select the credentials backend: 1 = system keychain, 0 = encrypted file in the config directory.
#[no_mangle]
pub extern "C" fn tagliacarte_news_set_credentials_backend(use_keychain: c_int) {
    set_credentials_backend(use_keychain != 0);
}

// ---------- Manager ----------

/// Create a manager. config_dir: directory for identities, server definitions, credentials and
/// the newsgroup cache; NULL uses the default (~/.tagliacarte, overridable via TAGLIACARTE_HOME).
/// Returns the manager handle (caller frees with tagliacarte_free_string), or NULL on error.
/// Creating a manager for a directory that already has one returns the existing manager's handle.
#[no_mangle]
pub unsafe extern "C" fn tagliacarte_news_manager_new(config_dir: *const c_char) -> *mut c_char {
    let Some(reg) = registry() else {
        return ptr::null_mut();
    };
    let config = match ptr_to_str(config_dir) {
        Some(dir) => {
            let mut config = ClientConfig::new(dir);
            if let Some(env) = ClientConfig::from_env() {
                config.proxy = env.proxy;
            }
            config
        }
        None => match ClientConfig::from_env() {
            Some(c) => c,
            None => {
                set_last_error("no config directory given and no home directory found");
                return ptr::null_mut();
            }
        },
    };
    let handle = config.config_dir.to_string_lossy().into_owned();
    let Ok(mut guard) = reg.managers.write() else {
        set_last_error("manager registry unavailable");
        return ptr::null_mut();
    };
    guard
        .entry(handle.clone())
        .or_insert_with(|| Arc::new(NewsServerManager::new(config)));
    clear_last_error();
    to_c_string(&handle).into_raw()
}

/// Release a manager. Loads already running finish normally. No-op for unknown handles.
#[no_mangle]
pub unsafe extern "C" fn tagliacarte_news_manager_free(handle: *const c_char) {
    let (Some(reg), Some(handle)) = (registry(), ptr_to_str(handle)) else {
        return;
    };
    if let Ok(mut guard) = reg.managers.write() {
        guard.remove(&handle);
    }
}

/// Register a callback for configuration changes on this manager. The callback runs on a
/// backend thread after the change has been persisted. Each call adds a listener; returns its
/// id for tagliacarte_news_remove_change_callback (caller frees with tagliacarte_free_string),
/// or NULL on error.
#[no_mangle]
pub unsafe extern "C" fn tagliacarte_news_set_change_callback(
    handle: *const c_char,
    on_changed: OnConfigurationChanged,
    user_data: *mut c_void,
) -> *mut c_char {
    let (Some(reg), Some(m)) = (registry(), manager(handle)) else {
        return ptr::null_mut();
    };
    let id = format!("listener-{}", reg.request_counter.fetch_add(1, Ordering::SeqCst) + 1);
    let stop = CancellationToken::new();
    match reg.listeners.write() {
        Ok(mut guard) => {
            guard.insert(id.clone(), stop.clone());
        }
        Err(_) => {
            set_last_error("listener registry unavailable");
            return ptr::null_mut();
        }
    }
    let mut rx = m.subscribe();
    let user = SendableUserData(user_data);
    let listener_id = id.clone();
    reg.runtime.spawn(async move {
        loop {
            let received = tokio::select! {
                biased;
                _ = stop.cancelled() => break,
                r = rx.recv() => r,
            };
            match received {
                Ok(event) => {
                    let kind = match event {
                        ChangeEvent::IdentityDefinitionsModified => TAGLIACARTE_NEWS_CHANGED_IDENTITIES,
                        ChangeEvent::ServerDefinitionsModified => TAGLIACARTE_NEWS_CHANGED_SERVERS,
                    };
                    (on_changed)(kind, user.ptr());
                }
                Err(RecvError::Lagged(n)) => debug!("change listener skipped {} events", n),
                Err(RecvError::Closed) => break,
            }
        }
        if let Some(reg) = registry() {
            if let Ok(mut guard) = reg.listeners.write() {
                guard.remove(&listener_id);
            }
        }
    });
    clear_last_error();
    to_c_string(&id).into_raw()
}

/// Unregister a change listener. Once this returns its callback is not invoked for changes
/// made afterwards. No-op for unknown ids.
#[no_mangle]
pub unsafe extern "C" fn tagliacarte_news_remove_change_callback(listener_id: *const c_char) {
    let (Some(reg), Some(id)) = (registry(), ptr_to_str(listener_id)) else {
        return;
    };
    if let Some(token) = reg.listeners.write().ok().and_then(|mut g| g.remove(&id)) {
        token.cancel();
    }
}

// ---------- Newsgroups ----------

/// Start loading the newsgroup list of the server named server_name. With force_reload 0 the
/// cached list is delivered (possibly empty) without network access; otherwise the server is
/// queried and the cache updated. Callbacks run on a backend thread: on_group for each group,
/// on_failed with a message if the server could not be queried, then on_complete exactly once.
/// Returns a request id for tagliacarte_news_cancel (caller frees with tagliacarte_free_string),
/// or NULL if the load could not be started.
#[no_mangle]
pub unsafe extern "C" fn tagliacarte_news_load_newsgroups(
    handle: *const c_char,
    server_name: *const c_char,
    force_reload: c_int,
    on_group: OnNewsgroup,
    on_failed: OnLoadFailed,
    on_complete: OnLoadComplete,
    user_data: *mut c_void,
) -> *mut c_char {
    let (Some(reg), Some(m)) = (registry(), manager(handle)) else {
        return ptr::null_mut();
    };
    let Some(name) = ptr_to_str(server_name) else {
        set_last_error("server_name is null or not valid UTF-8");
        return ptr::null_mut();
    };
    let id = format!("load-{}", reg.request_counter.fetch_add(1, Ordering::SeqCst) + 1);
    let cancel = CancellationToken::new();
    if let Ok(mut guard) = reg.requests.write() {
        guard.insert(id.clone(), cancel.clone());
    }
    let user = Arc::new(SendableUserData(user_data));
    let request_id = id.clone();
    reg.runtime.spawn(async move {
        let reporter_user = user.clone();
        let reporter = move |failure: &FetchFailure| {
            let msg = to_c_string(&failure.to_string());
            (on_failed)(msg.as_ptr(), reporter_user.ptr());
        };
        let result = m
            .load_newsgroups_for(&name, force_reload != 0, &cancel, &reporter)
            .await;
        let (status, count) = match result {
            Ok(load) => {
                for group in &load.groups {
                    let c = to_c_string(group);
                    (on_group)(c.as_ptr(), user.ptr());
                }
                let status = match load.status {
                    LoadStatus::Loaded => TAGLIACARTE_NEWS_OK,
                    LoadStatus::Failed => TAGLIACARTE_NEWS_ERROR,
                    LoadStatus::Cancelled => TAGLIACARTE_NEWS_CANCELLED,
                };
                (status, load.groups.len())
            }
            Err(e) => {
                let msg = to_c_string(&e.to_string());
                (on_failed)(msg.as_ptr(), user.ptr());
                (TAGLIACARTE_NEWS_ERROR, 0)
            }
        };
        if let Some(reg) = registry() {
            if let Ok(mut guard) = reg.requests.write() {
                guard.remove(&request_id);
            }
        }
        (on_complete)(status, count as size_t, user.ptr());
    });
    clear_last_error();
    to_c_string(&id).into_raw()
}

/// Cancel a running load. Its on_complete still fires, with TAGLIACARTE_NEWS_CANCELLED.
/// No-op for finished or unknown requests.
#[no_mangle]
pub unsafe extern "C" fn tagliacarte_news_cancel(request_id: *const c_char) {
    let (Some(reg), Some(id)) = (registry(), ptr_to_str(request_id)) else {
        return;
    };
    if let Some(token) = reg.requests.read().ok().and_then(|g| g.get(&id).cloned()) {
        token.cancel();
    }
}

// ---------- Server definitions ----------

/// Names of the configured NNTP servers, sorted. Caller frees with tagliacarte_free_string_list.
#[no_mangle]
pub unsafe extern "C" fn tagliacarte_news_list_servers(handle: *const c_char) -> *mut *mut c_char {
    let Some(m) = manager(handle) else {
        return ptr::null_mut();
    };
    clear_last_error();
    string_list_to_c(m.current_nntp_servers().into_iter().map(|sd| sd.name))
}

/// Copy of one server definition, or NULL if there is none by that name.
/// Caller frees with tagliacarte_news_free_server.
#[no_mangle]
pub unsafe extern "C" fn tagliacarte_news_get_server(
    handle: *const c_char,
    name: *const c_char,
) -> *mut TagliacarteNntpServer {
    let Some(m) = manager(handle) else {
        return ptr::null_mut();
    };
    match ptr_to_str(name).and_then(|n| m.nntp_server(&n)) {
        Some(sd) => {
            clear_last_error();
            server_to_c(&sd)
        }
        None => {
            set_last_error("server not found");
            ptr::null_mut()
        }
    }
}

#[no_mangle]
pub unsafe extern "C" fn tagliacarte_news_free_server(server: *mut TagliacarteNntpServer) {
    if server.is_null() {
        return;
    }
    let s = Box::from_raw(server);
    free_c_string(s.name);
    free_c_string(s.host);
    free_c_string(s.auth_user);
}

/// Store the password for the server named server_name in the configured credentials backend.
/// username NULL or empty uses the server's auth user. Returns 0 on success, -1 on error.
#[no_mangle]
pub unsafe extern "C" fn tagliacarte_news_credential_save(
    handle: *const c_char,
    server_name: *const c_char,
    username: *const c_char,
    password: *const c_char,
) -> c_int {
    let Some(m) = manager(handle) else {
        return TAGLIACARTE_NEWS_ERROR;
    };
    let Some(sd) = ptr_to_str(server_name).and_then(|n| m.nntp_server(&n)) else {
        set_last_error("server not found");
        return TAGLIACARTE_NEWS_ERROR;
    };
    let creds = Credentials {
        username: ptr_to_str(username).unwrap_or_default(),
        password: ptr_to_str(password).unwrap_or_default(),
    };
    let uri = nntp_credential_uri(&sd.key());
    match save_credential(&m.config().credentials_path(), &uri, &creds) {
        Ok(()) => {
            clear_last_error();
            TAGLIACARTE_NEWS_OK
        }
        Err(e) => {
            error!("could not save credential for {}: {}", uri, e);
            set_last_error(&e.to_string());
            TAGLIACARTE_NEWS_ERROR
        }
    }
}

// ---------- Identities ----------

/// Names of all identities, sorted. Caller frees with tagliacarte_free_string_list.
#[no_mangle]
pub unsafe extern "C" fn tagliacarte_news_list_identities(handle: *const c_char) -> *mut *mut c_char {
    let Some(m) = manager(handle) else {
        return ptr::null_mut();
    };
    clear_last_error();
    string_list_to_c(m.identities().into_iter().map(|i| i.name))
}

/// Copy of one identity, or NULL if there is none by that name.
/// Caller frees with tagliacarte_news_free_identity.
#[no_mangle]
pub unsafe extern "C" fn tagliacarte_news_get_identity(
    handle: *const c_char,
    name: *const c_char,
) -> *mut TagliacarteIdentity {
    let Some(m) = manager(handle) else {
        return ptr::null_mut();
    };
    match ptr_to_str(name).and_then(|n| m.identity(&n)) {
        Some(identity) => {
            clear_last_error();
            identity_to_c(&identity)
        }
        None => {
            set_last_error("identity not found");
            ptr::null_mut()
        }
    }
}

/// The anonymous identity. Caller frees with tagliacarte_news_free_identity.
#[no_mangle]
pub extern "C" fn tagliacarte_news_anonymous_identity() -> *mut TagliacarteIdentity {
    identity_to_c(&anonymous_identity())
}

#[no_mangle]
pub unsafe extern "C" fn tagliacarte_news_free_identity(identity: *mut TagliacarteIdentity) {
    if identity.is_null() {
        return;
    }
    let i = Box::from_raw(identity);
    for p in [
        i.name,
        i.real_name,
        i.mail_address,
        i.organization,
        i.response_address,
        i.referrer_url,
        i.signature,
    ] {
        free_c_string(p);
    }
}

/// Import count identities in the legacy format. replace != 0 makes them the only identities;
/// otherwise they are merged by name. The result is saved. Returns 0 on success, -1 on error.
#[no_mangle]
pub unsafe extern "C" fn tagliacarte_news_migrate_identities(
    handle: *const c_char,
    identities: *const TagliacarteIdentity,
    count: size_t,
    replace: c_int,
) -> c_int {
    let Some(m) = manager(handle) else {
        return TAGLIACARTE_NEWS_ERROR;
    };
    let old: Vec<LegacyIdentity> = c_slice(identities, count).iter().map(legacy_identity_from_c).collect();
    m.migrate_or_merge_identities(&old, replace != 0);
    clear_last_error();
    TAGLIACARTE_NEWS_OK
}

/// Replace all identities and server definitions with the given ones (e.g. after the settings
/// dialog was confirmed). Both are persisted, then change callbacks fire.
/// Returns 0 on success, -1 on error.
#[no_mangle]
pub unsafe extern "C" fn tagliacarte_news_apply_configuration(
    handle: *const c_char,
    identities: *const TagliacarteIdentity,
    identity_count: size_t,
    servers: *const TagliacarteNntpServer,
    server_count: size_t,
) -> c_int {
    let Some(m) = manager(handle) else {
        return TAGLIACARTE_NEWS_ERROR;
    };
    let snapshot = ConfigurationSnapshot {
        identities: c_slice(identities, identity_count).iter().map(identity_from_c).collect(),
        servers: c_slice(servers, server_count).iter().map(server_from_c).collect(),
    };
    if snapshot.identities.iter().any(|i| i.name.is_empty()) {
        set_last_error("identity without a name");
        return TAGLIACARTE_NEWS_ERROR;
    }
    if snapshot.servers.iter().any(|s| s.name.is_empty()) {
        set_last_error("server definition without a name");
        return TAGLIACARTE_NEWS_ERROR;
    }
    m.apply_configuration(&snapshot);
    clear_last_error();
    TAGLIACARTE_NEWS_OK
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;
    use std::sync::Mutex;
    use std::time::Duration;

    fn c(s: &str) -> CString {
        CString::new(s).unwrap()
    }

    /// Callback sink: user_data points at one of these.
    struct Events(Mutex<mpsc::Sender<String>>);

    fn record(data: *mut c_void, event: String) {
        let events = unsafe { &*(data as *const Events) };
        // Release the lock before sending: once the test receives the event it may drop the sink.
        let tx = events.0.lock().unwrap().clone();
        let _ = tx.send(event);
    }

    extern "C" fn record_group(name: *const c_char, data: *mut c_void) {
        record(data, format!("group {}", ptr_to_str(name).unwrap_or_default()));
    }

    extern "C" fn record_failed(msg: *const c_char, data: *mut c_void) {
        record(data, format!("failed {}", ptr_to_str(msg).unwrap_or_default()));
    }

    extern "C" fn record_complete(status: c_int, count: size_t, data: *mut c_void) {
        record(data, format!("complete {} {}", status, count));
    }

    extern "C" fn record_change(kind: c_int, data: *mut c_void) {
        record(data, format!("changed {}", kind));
    }

    fn events() -> (Events, mpsc::Receiver<String>) {
        let (tx, rx) = mpsc::channel();
        (Events(Mutex::new(tx)), rx)
    }

    fn next(rx: &mpsc::Receiver<String>) -> String {
        rx.recv_timeout(Duration::from_secs(30)).unwrap()
    }

    fn closed_port() -> u16 {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    }

    unsafe fn configure_server(handle: *const c_char, name: &str, port: u16) {
        let mut sd = ServerDefinition::new(name, "127.0.0.1");
        sd.port = port;
        let server = server_to_c(&sd);
        assert_eq!(
            tagliacarte_news_apply_configuration(handle, ptr::null(), 0, server, 1),
            TAGLIACARTE_NEWS_OK
        );
        tagliacarte_news_free_server(server);
    }

    #[test]
    fn string_list_round_trip() {
        let list = string_list_to_c(vec!["alt.test".to_string(), "comp.lang".to_string()]);
        unsafe {
            assert_eq!(CStr::from_ptr(*list).to_str().unwrap(), "alt.test");
            assert_eq!(CStr::from_ptr(*list.add(1)).to_str().unwrap(), "comp.lang");
            assert!((*list.add(2)).is_null());
            tagliacarte_free_string_list(list);
        }
    }

    #[test]
    fn identity_struct_conversion() {
        let mut id = Identity::new("work");
        id.signature = "-- \nme".into();
        let p = identity_to_c(&id);
        unsafe {
            assert_eq!(identity_from_c(&*p), id);
            tagliacarte_news_free_identity(p);
        }
    }

    #[test]
    fn server_struct_conversion() {
        let mut sd = ServerDefinition::new("News", "news.example.com");
        sd.use_ssl = true;
        sd.port = 563;
        let p = server_to_c(&sd);
        unsafe {
            assert!((*p).auth_user.is_null());
            assert_eq!(server_from_c(&*p), sd);
            tagliacarte_news_free_server(p);
        }
    }

    #[test]
    fn manager_lifecycle() {
        let dir = tempfile::tempdir().unwrap();
        let dir_c = c(dir.path().to_str().unwrap());
        assert_eq!(tagliacarte_news_init(), TAGLIACARTE_NEWS_OK);
        unsafe {
            let handle = tagliacarte_news_manager_new(dir_c.as_ptr());
            assert!(!handle.is_null());

            let anon = tagliacarte_news_anonymous_identity();
            assert_eq!(tagliacarte_news_migrate_identities(handle, anon, 1, 1), TAGLIACARTE_NEWS_OK);
            tagliacarte_news_free_identity(anon);

            let names = tagliacarte_news_list_identities(handle);
            assert_eq!(CStr::from_ptr(*names).to_str().unwrap(), "anonymous");
            assert!((*names.add(1)).is_null());
            tagliacarte_free_string_list(names);

            let missing = c("nobody");
            assert!(tagliacarte_news_get_identity(handle, missing.as_ptr()).is_null());
            assert!(!tagliacarte_news_last_error().is_null());

            tagliacarte_news_manager_free(handle);
            assert!(tagliacarte_news_list_servers(handle).is_null());
            tagliacarte_free_string(handle);
        }
    }

    #[test]
    fn unreachable_server_completes_with_error_status() {
        let dir = tempfile::tempdir().unwrap();
        let dir_c = c(dir.path().to_str().unwrap());
        assert_eq!(tagliacarte_news_init(), TAGLIACARTE_NEWS_OK);
        unsafe {
            let handle = tagliacarte_news_manager_new(dir_c.as_ptr());
            configure_server(handle, "Dead", closed_port());
            let (sink, rx) = events();
            let data = &sink as *const Events as *mut c_void;
            let name = c("Dead");

            let id = tagliacarte_news_load_newsgroups(
                handle,
                name.as_ptr(),
                1,
                record_group,
                record_failed,
                record_complete,
                data,
            );
            assert!(!id.is_null());
            let failed = next(&rx);
            assert!(failed.starts_with("failed Loading newsgroups from 127.0.0.1 failed:"), "{}", failed);
            assert_eq!(next(&rx), format!("complete {} 0", TAGLIACARTE_NEWS_ERROR));
            tagliacarte_free_string(id);

            // Nothing cached: an empty list, but a successful load.
            let id = tagliacarte_news_load_newsgroups(
                handle,
                name.as_ptr(),
                0,
                record_group,
                record_failed,
                record_complete,
                data,
            );
            assert_eq!(next(&rx), format!("complete {} 0", TAGLIACARTE_NEWS_OK));
            tagliacarte_free_string(id);

            tagliacarte_news_manager_free(handle);
            tagliacarte_free_string(handle);
        }
    }

    #[test]
    fn removed_change_listener_is_not_called() {
        let dir = tempfile::tempdir().unwrap();
        let dir_c = c(dir.path().to_str().unwrap());
        assert_eq!(tagliacarte_news_init(), TAGLIACARTE_NEWS_OK);
        unsafe {
            let handle = tagliacarte_news_manager_new(dir_c.as_ptr());
            let (sink, rx) = events();
            let listener = tagliacarte_news_set_change_callback(
                handle,
                record_change,
                &sink as *const Events as *mut c_void,
            );
            assert!(!listener.is_null());

            configure_server(handle, "One", 119);
            assert_eq!(next(&rx), format!("changed {}", TAGLIACARTE_NEWS_CHANGED_SERVERS));
            assert_eq!(next(&rx), format!("changed {}", TAGLIACARTE_NEWS_CHANGED_IDENTITIES));

            tagliacarte_news_remove_change_callback(listener);
            configure_server(handle, "Two", 119);
            assert!(rx.recv_timeout(Duration::from_millis(300)).is_err());

            // Unknown or already removed ids are ignored.
            tagliacarte_news_remove_change_callback(listener);
            tagliacarte_free_string(listener);
            tagliacarte_news_manager_free(handle);
            tagliacarte_free_string(handle);
        }
    }
}
