//! # parley-realtime
//!
//! Real-time chat core for Parley. Provides:
//!
//! - Connection gateway with JWT authentication and per-user rate limiting
//! - Group rooms for fan-out of chat events
//! - Presence tracking (online/away/busy/offline) with stale-record sweeping
//! - Message dispatch with send/edit/delete/recall authorization
//! - Delivery confirmation with bounded retry and read-receipt aggregation
//! - Optional fire-and-forget publication to an external broker

pub mod bridge;
pub mod channel;
pub mod connection;
pub mod delivery;
pub mod dispatch;
pub mod gateway;
pub mod message;
pub mod metrics;
pub mod presence;
pub mod server;

pub use channel::registry::RoomRegistry;
pub use connection::manager::ConnectionManager;
pub use delivery::tracker::DeliveryTracker;
pub use dispatch::handler::MessageDispatcher;
pub use gateway::Gateway;
pub use presence::tracker::PresenceTracker;
pub use server::RealtimeEngine;
