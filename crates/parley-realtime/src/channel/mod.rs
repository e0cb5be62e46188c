//! Group rooms: the fan-out sets behind group broadcasts.

pub mod registry;
pub mod subscription;

pub use registry::RoomRegistry;
pub use subscription::SubscriptionTracker;
