/*
 * newsgroups.rs
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

//! Newsgroup lists for a server: served from the cache, or fetched and cached on a forced
//! reload.

use std::fmt;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::config::CredentialsProvider;
use crate::error::Error;
use crate::localstorage::GroupCache;
use crate::net::ProxyConfig;
use crate::protocol::nntp::{spawn_fetch, FetchError, FetchOutcome, GroupSource, ListRequest, NntpGroupSource, ServerDefinition};

/// A failed forced reload, as shown to the user.
#[derive(Debug)]
pub struct FetchFailure {
    pub host: String,
    pub error: FetchError,
}

impl fmt::Display for FetchFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Loading newsgroups from {} failed: {}", self.host, self.error)
    }
}

/// Receives fetch failures, e.g. to show an error dialog.
pub trait FailureReporter: Send + Sync {
    fn fetch_failed(&self, failure: &FetchFailure);
}

impl<F> FailureReporter for F
where
    F: Fn(&FetchFailure) + Send + Sync,
{
    fn fetch_failed(&self, failure: &FetchFailure) {
        self(failure)
    }
}

/// How a load ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadStatus {
    /// Served from the cache, or fetched from the server.
    Loaded,
    /// The server could not be queried; the failure went to the reporter.
    Failed,
    Cancelled,
}

/// Groups of one load together with how it ended. `groups` is empty unless `Loaded`.
#[derive(Debug)]
pub struct NewsgroupLoad {
    pub groups: Vec<String>,
    pub status: LoadStatus,
}

impl NewsgroupLoad {
    fn loaded(groups: Vec<String>) -> Self {
        Self { groups, status: LoadStatus::Loaded }
    }

    fn empty(status: LoadStatus) -> Self {
        Self { groups: Vec::new(), status }
    }
}

pub struct NewsgroupLoader {
    cache: GroupCache,
    source: Arc<dyn GroupSource>,
    credentials: Option<Arc<dyn CredentialsProvider>>,
    proxy: Option<ProxyConfig>,
}

impl NewsgroupLoader {
    /// Loader that talks NNTP directly.
    pub fn new(cache: GroupCache) -> Self {
        Self::with_source(cache, Arc::new(NntpGroupSource))
    }

    pub fn with_source(cache: GroupCache, source: Arc<dyn GroupSource>) -> Self {
        Self {
            cache,
            source,
            credentials: None,
            proxy: None,
        }
    }

    pub fn credentials(mut self, provider: Arc<dyn CredentialsProvider>) -> Self {
        self.credentials = Some(provider);
        self
    }

    pub fn proxy(mut self, proxy: Option<ProxyConfig>) -> Self {
        self.proxy = proxy;
        self
    }

    pub fn cache(&self) -> &GroupCache {
        &self.cache
    }

    /// Group names for `server`.
    ///
    /// Without `force_reload` this is whatever the cache holds (possibly nothing) and the
    /// network is not touched. With it the server is asked for its list: a non-empty answer
    /// replaces the cache entry, an empty one removes it. A failure goes to `reporter` and a
    /// cancellation through `user_cancel` is silent; both return an empty list and leave the
    /// cache alone.
    pub async fn load_newsgroups(
        &self,
        server: &ServerDefinition,
        force_reload: bool,
        user_cancel: &CancellationToken,
        reporter: &dyn FailureReporter,
    ) -> Result<Vec<String>, Error> {
        let load = self.load_with_status(server, force_reload, user_cancel, reporter).await?;
        Ok(load.groups)
    }

    /// Like [`Self::load_newsgroups`], also telling an empty list apart from a failed or
    /// cancelled fetch. The status follows the fetch outcome, so a cancel that arrives after
    /// the list is in still reports `Loaded`.
    pub async fn load_with_status(
        &self,
        server: &ServerDefinition,
        force_reload: bool,
        user_cancel: &CancellationToken,
        reporter: &dyn FailureReporter,
    ) -> Result<NewsgroupLoad, Error> {
        if server.host.trim().is_empty() {
            return Err(Error::invalid_argument("server definition has no host"));
        }
        let key = server.key();
        if !force_reload {
            return Ok(NewsgroupLoad::loaded(self.cache.load(&key)));
        }

        let request = ListRequest::for_server(server, self.credentials.as_deref(), self.proxy.as_ref());
        info!("loading newsgroups from {}", request.uri);
        let handle = spawn_fetch(self.source.clone(), request, user_cancel.child_token());
        match handle.wait().await {
            FetchOutcome::Success(groups) => {
                if groups.is_empty() {
                    self.cache.invalidate(&key);
                } else {
                    self.cache.save(&key, &groups);
                }
                Ok(NewsgroupLoad::loaded(groups))
            }
            FetchOutcome::Failure(error) => {
                reporter.fetch_failed(&FetchFailure {
                    host: server.host.clone(),
                    error,
                });
                Ok(NewsgroupLoad::empty(LoadStatus::Failed))
            }
            FetchOutcome::Cancelled => {
                debug!("newsgroup load from {} cancelled", key);
                Ok(NewsgroupLoad::empty(LoadStatus::Cancelled))
            }
        }
    }
}
