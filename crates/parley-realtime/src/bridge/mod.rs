//! Fire-and-forget notification of new messages to an external broker.

pub mod memory_pubsub;
pub mod publisher;
pub mod redis_pubsub;

pub use memory_pubsub::MemoryPubSub;
pub use publisher::{EventPublisher, build_publisher, group_topic};
