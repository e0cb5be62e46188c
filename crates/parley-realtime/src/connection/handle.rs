//! Individual WebSocket connection handle.

use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{DateTime, Utc};
use tokio::sync::{Notify, mpsc};

use parley_core::types::{ConnectionId, UserId};
use parley_entity::UserIdentity;

use crate::message::types::OutboundEvent;

/// A handle to a single live connection.
///
/// Holds the sender for pushing events to the client plus the identity
/// snapshot resolved during the handshake.
#[derive(Debug)]
pub struct ConnectionHandle {
    /// Unique connection ID
    pub id: ConnectionId,
    /// Authenticated identity snapshot
    pub user: UserIdentity,
    /// When the connection was established
    pub connected_at: DateTime<Utc>,
    sender: mpsc::Sender<OutboundEvent>,
    alive: AtomicBool,
    close_signal: Notify,
}

impl ConnectionHandle {
    /// Create a new connection handle
    pub fn new(user: UserIdentity, sender: mpsc::Sender<OutboundEvent>) -> Self {
        Self {
            id: ConnectionId::new(),
            user,
            connected_at: Utc::now(),
            sender,
            alive: AtomicBool::new(true),
            close_signal: Notify::new(),
        }
    }

    /// Owning user
    pub fn user_id(&self) -> UserId {
        self.user.id
    }

    /// Queue an event without waiting. Returns `false` if it was dropped.
    pub fn send(&self, event: OutboundEvent) -> bool {
        if !self.is_alive() {
            return false;
        }
        match self.sender.try_send(event) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(event)) => {
                tracing::warn!(
                    conn_id = %self.id,
                    event = event.name(),
                    "Connection send buffer full, dropping event"
                );
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                self.mark_closed();
                false
            }
        }
    }

    /// Queue an event, waiting for buffer space.
    ///
    /// Only safe once the receiving side is being drained.
    pub async fn send_wait(&self, event: OutboundEvent) -> bool {
        if !self.is_alive() {
            return false;
        }
        if self.sender.send(event).await.is_err() {
            self.mark_closed();
            return false;
        }
        true
    }

    /// Check if connection is alive
    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    /// Mark the connection closed and wake whoever waits on [`Self::closed`].
    pub fn mark_closed(&self) {
        if self.alive.swap(false, Ordering::SeqCst) {
            self.close_signal.notify_one();
        }
    }

    /// Resolves once the connection has been marked closed.
    pub async fn closed(&self) {
        if !self.is_alive() {
            return;
        }
        self.close_signal.notified().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity() -> UserIdentity {
        UserIdentity {
            id: UserId::new(),
            name: "alice".to_string(),
            email: "alice@example.com".to_string(),
            is_verified: true,
        }
    }

    #[tokio::test]
    async fn test_send_after_close_is_dropped() {
        let (tx, mut rx) = mpsc::channel(4);
        let handle = ConnectionHandle::new(identity(), tx);
        assert!(handle.send(OutboundEvent::Error {
            code: "X".to_string(),
            message: "x".to_string(),
        }));
        handle.mark_closed();
        assert!(!handle.send(OutboundEvent::Error {
            code: "X".to_string(),
            message: "x".to_string(),
        }));
        assert!(rx.recv().await.is_some());
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_full_buffer_drops() {
        let (tx, _rx) = mpsc::channel(1);
        let handle = ConnectionHandle::new(identity(), tx);
        let event = OutboundEvent::Error {
            code: "X".to_string(),
            message: "x".to_string(),
        };
        assert!(handle.send(event.clone()));
        assert!(!handle.send(event));
        assert!(handle.is_alive());
    }

    #[tokio::test]
    async fn test_closed_resolves_after_mark() {
        let (tx, _rx) = mpsc::channel(1);
        let handle = ConnectionHandle::new(identity(), tx);
        handle.mark_closed();
        tokio::time::timeout(std::time::Duration::from_millis(50), handle.closed())
            .await
            .expect("closed should resolve");
    }
}
