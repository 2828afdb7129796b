/*
 * mod.rs
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

//! Local persistence: the newsgroup list cache and the identity / server definition stores.

pub mod group_cache;
pub mod xml_store;

pub use group_cache::GroupCache;
pub use xml_store::{XmlIdentityStore, XmlServerStore};

use thiserror::Error;

use crate::identity::Identity;
use crate::protocol::nntp::ServerDefinition;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("{0}")]
    Io(#[from] std::io::Error),
    #[error("malformed XML: {0}")]
    Xml(String),
    #[error("{0}")]
    Format(String),
}

impl From<quick_xml::Error> for StorageError {
    fn from(e: quick_xml::Error) -> Self {
        StorageError::Xml(e.to_string())
    }
}

/// Where identities are persisted. A missing store loads as empty.
pub trait IdentityStorage: Send + Sync {
    fn load_identities(&self) -> Result<Vec<Identity>, StorageError>;
    fn save_identities(&self, identities: &[Identity]) -> Result<(), StorageError>;
}

/// Where NNTP server definitions are persisted. A missing store loads as empty.
pub trait ServerStorage: Send + Sync {
    fn load_servers(&self) -> Result<Vec<ServerDefinition>, StorageError>;
    fn save_servers(&self, servers: &[ServerDefinition]) -> Result<(), StorageError>;
}
