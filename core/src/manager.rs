/*
 * manager.rs
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

//! News server manager: owns the identity registry, the NNTP server definitions and the
//! newsgroup loader, and applies configuration changes made in the UI.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::config::{ClientConfig, StoredCredentials};
use crate::error::Error;
use crate::events::{ChangeEvent, ChangeEvents};
use crate::identity::{Identity, IdentityRegistry, LegacyIdentity};
use crate::localstorage::{GroupCache, IdentityStorage, ServerStorage, XmlIdentityStore, XmlServerStore};
use crate::newsgroups::{FailureReporter, NewsgroupLoad, NewsgroupLoader};
use crate::protocol::nntp::ServerDefinition;

/// Edited configuration as handed over by the settings UI.
#[derive(Debug, Clone, Default)]
pub struct ConfigurationSnapshot {
    pub identities: Vec<Identity>,
    pub servers: Vec<ServerDefinition>,
}

// ============================================================================
// Server definitions
// ============================================================================

/// NNTP server definitions keyed by name. Only whole snapshots go in or out.
struct ServerDefinitions {
    storage: Arc<dyn ServerStorage>,
    servers: Mutex<HashMap<String, ServerDefinition>>,
}

impl ServerDefinitions {
    fn load(storage: Arc<dyn ServerStorage>) -> Self {
        let servers = match storage.load_servers() {
            Ok(list) => list.into_iter().map(|sd| (sd.name.clone(), sd)).collect(),
            Err(e) => {
                error!("could not load NNTP server definitions: {}", e);
                HashMap::new()
            }
        };
        Self {
            storage,
            servers: Mutex::new(servers),
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, ServerDefinition>> {
        self.servers.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// All definitions, sorted by name.
    fn snapshot(&self) -> Vec<ServerDefinition> {
        let mut list: Vec<ServerDefinition> = self.lock().values().cloned().collect();
        list.sort_by(|a, b| a.name.cmp(&b.name));
        list
    }

    fn get(&self, name: &str) -> Option<ServerDefinition> {
        self.lock().get(name).cloned()
    }

    /// Replace every definition with clones of `servers` and persist, under one lock.
    fn replace_and_persist(&self, servers: &[ServerDefinition]) {
        let mut guard = self.lock();
        guard.clear();
        for sd in servers {
            guard.insert(sd.name.clone(), sd.clone());
        }
        let mut list: Vec<ServerDefinition> = guard.values().cloned().collect();
        list.sort_by(|a, b| a.name.cmp(&b.name));
        if let Err(e) = self.storage.save_servers(&list) {
            error!("could not save NNTP server definitions: {}", e);
        }
    }
}

// ============================================================================
// Manager
// ============================================================================

pub struct NewsServerManager {
    config: ClientConfig,
    identities: Mutex<IdentityRegistry>,
    servers: ServerDefinitions,
    loader: NewsgroupLoader,
    events: ChangeEvents,
}

impl NewsServerManager {
    /// Manager with XML storage in the config directory, the credentials store, and a real
    /// NNTP connection for reloads.
    pub fn new(config: ClientConfig) -> Self {
        let identities = Arc::new(XmlIdentityStore::new(config.identities_path()));
        let servers = Arc::new(XmlServerStore::new(config.servers_path()));
        let loader = NewsgroupLoader::new(GroupCache::new(&config.cache_dir))
            .credentials(Arc::new(StoredCredentials::new(config.credentials_path())))
            .proxy(config.proxy.clone());
        Self::with_parts(config, identities, servers, loader)
    }

    pub fn with_parts(
        config: ClientConfig,
        identity_storage: Arc<dyn IdentityStorage>,
        server_storage: Arc<dyn ServerStorage>,
        loader: NewsgroupLoader,
    ) -> Self {
        info!("news backend using {}", config.config_dir.display());
        Self {
            config,
            identities: Mutex::new(IdentityRegistry::new(identity_storage)),
            servers: ServerDefinitions::load(server_storage),
            loader,
            events: ChangeEvents::new(),
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Change notifications, raised after each applied configuration.
    pub fn subscribe(&self) -> broadcast::Receiver<ChangeEvent> {
        self.events.subscribe()
    }

    fn registry(&self) -> MutexGuard<'_, IdentityRegistry> {
        self.identities.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // ---- Newsgroups ----

    /// See [`NewsgroupLoader::load_newsgroups`].
    pub async fn load_newsgroups(
        &self,
        server: &ServerDefinition,
        force_reload: bool,
        user_cancel: &CancellationToken,
        reporter: &dyn FailureReporter,
    ) -> Result<Vec<String>, Error> {
        self.loader
            .load_newsgroups(server, force_reload, user_cancel, reporter)
            .await
    }

    /// Load for the server configured under `name`, with the load status.
    /// See [`NewsgroupLoader::load_with_status`].
    pub async fn load_newsgroups_for(
        &self,
        name: &str,
        force_reload: bool,
        user_cancel: &CancellationToken,
        reporter: &dyn FailureReporter,
    ) -> Result<NewsgroupLoad, Error> {
        let server = self
            .nntp_server(name)
            .ok_or_else(|| Error::invalid_argument(format!("no NNTP server named {:?}", name)))?;
        self.loader
            .load_with_status(&server, force_reload, user_cancel, reporter)
            .await
    }

    // ---- Server definitions ----

    pub fn current_nntp_servers(&self) -> Vec<ServerDefinition> {
        self.servers.snapshot()
    }

    pub fn nntp_server(&self, name: &str) -> Option<ServerDefinition> {
        self.servers.get(name)
    }

    // ---- Identities ----

    /// Copy of all identities, sorted by name.
    pub fn identities(&self) -> Vec<Identity> {
        self.registry().identities().to_sorted_vec()
    }

    pub fn identity(&self, name: &str) -> Option<Identity> {
        self.registry().identities().get(name).cloned()
    }

    /// Add or replace one identity and save.
    pub fn put_identity(&self, identity: Identity) -> Result<(), Error> {
        if identity.name.is_empty() {
            return Err(Error::invalid_argument("identity has no name"));
        }
        let mut registry = self.registry();
        registry.identities().insert(identity);
        registry.save();
        Ok(())
    }

    pub fn remove_identity(&self, name: &str) -> Option<Identity> {
        let mut registry = self.registry();
        let removed = registry.identities().remove(name);
        registry.save();
        removed
    }

    pub fn migrate_or_merge_identities(&self, old_identities: &[LegacyIdentity], replace: bool) {
        self.registry().migrate_or_merge(old_identities, replace);
    }

    pub fn save_identities(&self) {
        self.registry().save();
    }

    /// Drop the in-memory identities; they are reloaded from storage on next access.
    pub fn reset_identities(&self) {
        self.registry().reset();
    }

    // ---- Configuration changes ----

    /// Take over an edited configuration: identities first, then server definitions, each
    /// persisted before the change events go out.
    pub fn apply_configuration(&self, snapshot: &ConfigurationSnapshot) {
        self.registry().replace_all(snapshot.identities.iter());
        self.servers.replace_and_persist(&snapshot.servers);
        info!(
            "applied configuration: {} identities, {} NNTP servers",
            snapshot.identities.len(),
            snapshot.servers.len()
        );
        self.events.emit(ChangeEvent::ServerDefinitionsModified);
        self.events.emit(ChangeEvent::IdentityDefinitionsModified);
    }
}
