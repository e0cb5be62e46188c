//! # parley-entity
//!
//! Domain entity models for Parley. Every struct in this crate represents
//! a stored row or a domain value object owned by the persistence layer;
//! the real-time core only reads them or mutates them through the store
//! interfaces.

pub mod group;
pub mod message;
pub mod presence;
pub mod user;

pub use group::{Group, GroupKind, GroupMembership, MemberRole};
pub use message::{FileRef, Message, MessageStatus, MessageType, NewMessage};
pub use presence::PresenceStatus;
pub use user::UserIdentity;
