/*
 * fetch.rs
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

//! Background fetch of a server's group list.
//!
//! Each fetch runs on its own tokio task. The caller keeps a [`FetchHandle`]: it can cancel the
//! fetch and awaits exactly one [`FetchOutcome`], whichever way the task ends.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::client::{GroupSource, ListRequest, NntpClientError};

#[derive(Debug, Error)]
pub enum FetchError {
    #[error(transparent)]
    Nntp(#[from] NntpClientError),
    #[error("no response within {} seconds", .0.as_secs())]
    Timeout(Duration),
    #[error("fetch task failed: {0}")]
    Worker(String),
}

/// Result of one fetch. A list and an error never come together.
#[derive(Debug)]
pub enum FetchOutcome {
    Success(Vec<String>),
    Failure(FetchError),
    Cancelled,
}

/// Handle to a running fetch.
#[derive(Debug)]
pub struct FetchHandle {
    done: oneshot::Receiver<FetchOutcome>,
    cancel: CancellationToken,
}

impl FetchHandle {
    /// Request cooperative abort; the outcome will be `Cancelled` unless the fetch already ended.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Wait for the fetch to finish. The outcome is delivered exactly once.
    pub async fn wait(self) -> FetchOutcome {
        match self.done.await {
            Ok(outcome) => outcome,
            Err(_) => FetchOutcome::Failure(FetchError::Worker("fetch task ended without a result".into())),
        }
    }
}

/// Spawn a fetch of `request` from `source`. `cancel` aborts it; pass a child token to tie it
/// to a wider cancellation scope.
pub fn spawn_fetch(source: Arc<dyn GroupSource>, request: ListRequest, cancel: CancellationToken) -> FetchHandle {
    let (done_tx, done_rx) = oneshot::channel();
    let token = cancel.clone();
    tokio::spawn(async move {
        let timeout = request.timeout;
        let outcome = tokio::select! {
            biased;
            () = token.cancelled() => FetchOutcome::Cancelled,
            result = tokio::time::timeout(timeout, source.list_groups(&request)) => match result {
                Ok(Ok(groups)) => FetchOutcome::Success(groups),
                Ok(Err(e)) => FetchOutcome::Failure(e),
                Err(_) => FetchOutcome::Failure(FetchError::Timeout(timeout)),
            },
        };
        match &outcome {
            FetchOutcome::Success(groups) => debug!("{}: {} groups", request.uri, groups.len()),
            FetchOutcome::Failure(e) => warn!("{}: {}", request.uri, e),
            FetchOutcome::Cancelled => debug!("{}: cancelled", request.uri),
        }
        let _ = done_tx.send(outcome);
    });
    FetchHandle { done: done_rx, cancel }
}
