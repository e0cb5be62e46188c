//! WebSocket connection management.

pub mod authenticator;
pub mod handle;
pub mod manager;
pub mod pool;
pub mod rate_limit;

pub use authenticator::WsAuthenticator;
pub use handle::ConnectionHandle;
pub use manager::ConnectionManager;
pub use pool::ConnectionPool;
pub use rate_limit::RateLimiter;
