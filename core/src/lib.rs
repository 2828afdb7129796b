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

//! News backend: newsgroup lists fetched from NNTP servers (with a local per-server cache),
//! NNTP server definitions, and posting identities.
//!
//! The entry point for a front end is [`manager::NewsServerManager`].

pub mod config;
pub mod error;
pub mod events;
pub mod identity;
pub mod localstorage;
pub mod logging;
pub mod manager;
pub mod net;
pub mod newsgroups;
pub mod protocol;
pub mod uri;

pub use error::Error;
pub use events::ChangeEvent;
pub use identity::{anonymous_identity, Identity, IdentityMap, IdentityRegistry, LegacyIdentity};
pub use manager::{ConfigurationSnapshot, NewsServerManager};
pub use newsgroups::{FailureReporter, FetchFailure, LoadStatus, NewsgroupLoad, NewsgroupLoader};
pub use protocol::nntp::{ServerDefinition, ServerKey};
