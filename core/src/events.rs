/*
 * events.rs
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

//! Change notifications for configuration consumers.

use tokio::sync::broadcast;
use tracing::trace;

const CHANNEL_CAPACITY: usize = 16;

/// Raised after a configuration change has been applied and persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeEvent {
    IdentityDefinitionsModified,
    ServerDefinitionsModified,
}

/// Fan-out of [`ChangeEvent`]s to any number of subscribers.
#[derive(Debug, Clone)]
pub struct ChangeEvents {
    tx: broadcast::Sender<ChangeEvent>,
}

impl Default for ChangeEvents {
    fn default() -> Self {
        Self::new()
    }
}

impl ChangeEvents {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self { tx }
    }

    /// Events emitted after this call. A subscriber that falls behind sees `Lagged`.
    pub fn subscribe(&self) -> broadcast::Receiver<ChangeEvent> {
        self.tx.subscribe()
    }

    pub fn emit(&self, event: ChangeEvent) {
        // No subscribers is not an error.
        let n = self.tx.send(event).unwrap_or(0);
        trace!("{:?} delivered to {} subscribers", event, n);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscribers_see_events_in_order() {
        let events = ChangeEvents::new();
        let mut a = events.subscribe();
        let mut b = events.subscribe();
        events.emit(ChangeEvent::ServerDefinitionsModified);
        events.emit(ChangeEvent::IdentityDefinitionsModified);
        for rx in [&mut a, &mut b] {
            assert_eq!(rx.recv().await.unwrap(), ChangeEvent::ServerDefinitionsModified);
            assert_eq!(rx.recv().await.unwrap(), ChangeEvent::IdentityDefinitionsModified);
        }
    }

    #[test]
    fn emit_without_subscribers_is_fine() {
        ChangeEvents::new().emit(ChangeEvent::IdentityDefinitionsModified);
    }
}
