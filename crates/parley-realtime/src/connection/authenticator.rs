//! Handshake authentication, validates the bearer credential and resolves the user.

use std::sync::Arc;

use parley_auth::JwtDecoder;
use parley_core::error::AppError;
use parley_database::store::UserDirectory;
use parley_entity::UserIdentity;

/// Authenticates connections using JWT bearer credentials.
#[derive(Clone)]
pub struct WsAuthenticator {
    decoder: JwtDecoder,
    users: Arc<dyn UserDirectory>,
}

impl std::fmt::Debug for WsAuthenticator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WsAuthenticator").finish()
    }
}

impl WsAuthenticator {
    /// Creates a new authenticator.
    pub fn new(decoder: JwtDecoder, users: Arc<dyn UserDirectory>) -> Self {
        Self { decoder, users }
    }

    /// Verifies the credential and resolves it to a verified user.
    pub async fn authenticate(&self, token: Option<&str>) -> Result<UserIdentity, AppError> {
        let token = token.ok_or_else(|| AppError::authentication("Missing credential"))?;
        let claims = self.decoder.decode(token)?;

        let identity = self
            .users
            .find_identity(claims.user_id())
            .await?
            .ok_or_else(|| AppError::authentication("Unknown user"))?;

        if !identity.is_verified {
            return Err(AppError::authentication("Account is not verified"));
        }

        Ok(identity)
    }
}
