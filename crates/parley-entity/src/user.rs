//! Authenticated user identity.

use serde::{Deserialize, Serialize};

use parley_core::types::UserId;

/// Snapshot of the user resolved from a bearer credential.
///
/// Attached to a connection for its whole lifetime; later profile changes
/// are not reflected until the user reconnects.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserIdentity {
    /// User ID.
    pub id: UserId,
    /// Display name.
    pub name: String,
    /// Email address.
    pub email: String,
    /// Whether the account has been verified.
    pub is_verified: bool,
}
