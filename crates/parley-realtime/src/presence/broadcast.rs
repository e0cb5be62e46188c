//! Presence broadcast to direct-chat counterparts.

use std::sync::Arc;

use tracing::{debug, warn};

use parley_core::types::UserId;
use parley_database::store::MembershipStore;

use crate::connection::manager::ConnectionManager;
use crate::message::types::OutboundEvent;

use super::tracker::PresenceTracker;

/// Notifies a user's direct-chat counterparts when their status changes.
pub struct PresenceBroadcaster {
    membership: Arc<dyn MembershipStore>,
    presence: Arc<PresenceTracker>,
    connections: Arc<ConnectionManager>,
}

impl std::fmt::Debug for PresenceBroadcaster {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PresenceBroadcaster").finish()
    }
}

impl PresenceBroadcaster {
    /// Create a new broadcaster.
    pub fn new(
        membership: Arc<dyn MembershipStore>,
        presence: Arc<PresenceTracker>,
        connections: Arc<ConnectionManager>,
    ) -> Self {
        Self {
            membership,
            presence,
            connections,
        }
    }

    /// Send the user's current presence to every connected counterpart.
    ///
    /// Returns how many counterparts were reached. Lookup failures are
    /// logged and reported as zero.
    pub async fn broadcast(&self, user_id: UserId) -> usize {
        let counterparts = match self.membership.direct_counterparts(user_id).await {
            Ok(counterparts) => counterparts,
            Err(e) => {
                warn!(user_id = %user_id, error = %e, "Failed to load direct-chat counterparts");
                return 0;
            }
        };

        let event = OutboundEvent::ContactStatusChanged {
            user_id,
            status: self.presence.get_status(user_id),
            last_seen: self.presence.get_last_seen(user_id),
        };

        let reached = counterparts
            .iter()
            .filter(|peer| self.connections.send_to_user(peer, &event))
            .count();

        debug!(
            user_id = %user_id,
            counterparts = counterparts.len(),
            reached,
            "Presence change broadcast"
        );
        reached
    }
}
