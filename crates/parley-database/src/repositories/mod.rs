//! PostgreSQL implementations of the store interfaces.

pub mod membership;
pub mod message;
pub mod user;

use std::sync::Arc;

use sqlx::PgPool;

use crate::store::Stores;

pub use membership::MembershipRepository;
pub use message::MessageRepository;
pub use user::UserRepository;

/// Back all three interfaces with PostgreSQL repositories sharing one pool.
pub fn postgres_stores(pool: PgPool) -> Stores {
    Stores {
        membership: Arc::new(MembershipRepository::new(pool.clone())),
        messages: Arc::new(MessageRepository::new(pool.clone())),
        users: Arc::new(UserRepository::new(pool)),
    }
}
