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

//! NNTP: server definitions, the LIST client, and the background fetch worker that runs it.

mod client;
mod fetch;
mod server;

pub use client::{
    connect_and_authenticate, list_newsgroups, parse_newsgroup_name, AuthenticatedSession,
    GroupSource, ListRequest, NntpClientError, NntpGroupSource,
};
pub use fetch::{spawn_fetch, FetchError, FetchHandle, FetchOutcome};
pub use server::{ServerDefinition, ServerKey, DEFAULT_TIMEOUT, NNTP_DEFAULT_PORT};
