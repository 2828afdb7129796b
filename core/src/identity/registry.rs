/*
 * registry.rs
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

//! Identity registry: identities keyed by name, loaded lazily from storage and saved only
//! when something changed.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, error};

use super::{Identity, LegacyIdentity};
use crate::localstorage::IdentityStorage;

/// Identities keyed by name, with a modified flag set by every mutation.
#[derive(Debug, Clone, Default)]
pub struct IdentityMap {
    entries: HashMap<String, Identity>,
    modified: bool,
}

impl IdentityMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: HashMap::with_capacity(capacity),
            modified: false,
        }
    }

    /// Build an unmodified map, e.g. straight from storage. Later duplicates win.
    pub fn from_loaded(identities: impl IntoIterator<Item = Identity>) -> Self {
        let entries = identities.into_iter().map(|i| (i.name.clone(), i)).collect();
        Self { entries, modified: false }
    }

    pub fn is_modified(&self) -> bool {
        self.modified
    }

    pub(crate) fn mark_saved(&mut self) {
        self.modified = false;
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&Identity> {
        self.entries.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// Insert or replace by `identity.name`. Returns the replaced identity.
    pub fn insert(&mut self, identity: Identity) -> Option<Identity> {
        self.modified = true;
        self.entries.insert(identity.name.clone(), identity)
    }

    pub fn remove(&mut self, name: &str) -> Option<Identity> {
        let removed = self.entries.remove(name);
        if removed.is_some() {
            self.modified = true;
        }
        removed
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.modified = true;
    }

    pub fn values(&self) -> impl Iterator<Item = &Identity> {
        self.entries.values()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// Identities sorted by name.
    pub fn to_sorted_vec(&self) -> Vec<Identity> {
        let mut v: Vec<Identity> = self.entries.values().cloned().collect();
        v.sort_by(|a, b| a.name.cmp(&b.name));
        v
    }
}

/// Lazily loaded, change-tracked identity collection backed by an [`IdentityStorage`].
pub struct IdentityRegistry {
    storage: Arc<dyn IdentityStorage>,
    identities: Option<IdentityMap>,
}

impl IdentityRegistry {
    pub fn new(storage: Arc<dyn IdentityStorage>) -> Self {
        Self { storage, identities: None }
    }

    pub fn is_loaded(&self) -> bool {
        self.identities.is_some()
    }

    /// The identities, loading them on first access. A load failure yields an empty registry.
    pub fn identities(&mut self) -> &mut IdentityMap {
        let storage = &self.storage;
        self.identities.get_or_insert_with(|| match storage.load_identities() {
            Ok(loaded) => {
                debug!("loaded {} identities", loaded.len());
                IdentityMap::from_loaded(loaded)
            }
            Err(e) => {
                error!("could not load user identities: {}", e);
                IdentityMap::new()
            }
        })
    }

    /// Replace the in-memory collection wholesale.
    pub fn set_identities(&mut self, identities: IdentityMap) {
        self.identities = Some(identities);
    }

    /// Persist if modified. On failure the modified flag stays set so a later save retries.
    pub fn save(&mut self) {
        let identities = self.identities();
        if !identities.is_modified() {
            return;
        }
        let snapshot = identities.to_sorted_vec();
        match self.storage.save_identities(&snapshot) {
            Ok(()) => {
                self.identities().mark_saved();
                debug!("saved {} identities", snapshot.len());
            }
            Err(e) => error!("could not save user identities: {}", e),
        }
    }

    /// Forget the in-memory identities; the next access reloads from storage.
    pub fn reset(&mut self) {
        self.identities = None;
    }

    /// Import identities from the legacy format. With `replace` the registry becomes exactly the
    /// migrated set; otherwise each migrated identity is upserted by name and nothing is removed.
    /// Saves afterwards. An empty input does nothing.
    pub fn migrate_or_merge(&mut self, old_identities: &[LegacyIdentity], replace: bool) {
        if old_identities.is_empty() {
            return;
        }
        let mut migrated = IdentityMap::with_capacity(old_identities.len());
        for old in old_identities {
            migrated.insert(Identity::from(old));
        }

        if replace {
            self.set_identities(migrated);
        } else {
            let current = self.identities();
            for identity in migrated.entries.into_values() {
                current.insert(identity);
            }
        }
        self.save();
    }

    /// Clear the registry, take clones of `snapshot`, and save.
    pub fn replace_all<'a>(&mut self, snapshot: impl IntoIterator<Item = &'a Identity>) {
        let identities = self.identities();
        identities.clear();
        for identity in snapshot {
            identities.insert(identity.clone());
        }
        self.save();
    }
}
