//! # parley-database
//!
//! Persistence seam for Parley. The real-time core depends only on the
//! traits in [`store`]; this crate also ships an in-memory adapter for
//! development and tests and a PostgreSQL adapter built on sqlx.

pub mod connection;
pub mod memory;
pub mod repositories;
pub mod store;

use std::sync::Arc;

use parley_core::config::{DatabaseConfig, DatabaseProvider};
use parley_core::error::AppError;

pub use memory::MemoryStore;
pub use store::{MembershipStore, MessageStore, Stores, UserDirectory};

/// Build the configured store adapter.
pub async fn connect(config: &DatabaseConfig) -> Result<Stores, AppError> {
    match config.provider {
        DatabaseProvider::Memory => {
            tracing::warn!("Using in-memory store; data will not survive a restart");
            Ok(Stores::from_memory(Arc::new(MemoryStore::new())))
        }
        DatabaseProvider::Postgres => {
            let pool = connection::open_pool(config).await?;
            Ok(repositories::postgres_stores(pool))
        }
    }
}
