//! User presence tracking.

pub mod broadcast;
pub mod tracker;

pub use broadcast::PresenceBroadcaster;
pub use tracker::{PresenceRecord, PresenceTracker};
