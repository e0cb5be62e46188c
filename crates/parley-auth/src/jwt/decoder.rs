//! JWT credential validation.

use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode};

use parley_core::config::AuthConfig;
use parley_core::error::AppError;

use super::claims::Claims;

/// Validates HS256 bearer credentials.
#[derive(Clone)]
pub struct JwtDecoder {
    /// HMAC secret key for verification.
    decoding_key: DecodingKey,
    /// Validation configuration.
    validation: Validation,
}

impl std::fmt::Debug for JwtDecoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JwtDecoder")
            .field("validation", &self.validation)
            .finish()
    }
}

impl JwtDecoder {
    /// Creates a new decoder from auth configuration.
    pub fn new(config: &AuthConfig) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = true;
        validation.leeway = config.leeway_seconds;
        validation.set_required_spec_claims(&["exp", "sub"]);

        Self {
            decoding_key: DecodingKey::from_secret(config.jwt_secret.as_bytes()),
            validation,
        }
    }

    /// Decodes and validates a bearer credential.
    ///
    /// Every failure maps to an authentication error with a short reason.
    pub fn decode(&self, token: &str) -> Result<Claims, AppError> {
        let token = token.trim();
        if token.is_empty() {
            return Err(AppError::authentication("Missing credential"));
        }

        let token_data =
            decode::<Claims>(token, &self.decoding_key, &self.validation).map_err(|e| {
                tracing::debug!(error = %e, "Credential rejected");
                match e.kind() {
                    jsonwebtoken::errors::ErrorKind::ExpiredSignature => {
                        AppError::authentication("Token has expired")
                    }
                    jsonwebtoken::errors::ErrorKind::InvalidSignature => {
                        AppError::authentication("Invalid token signature")
                    }
                    jsonwebtoken::errors::ErrorKind::InvalidToken => {
                        AppError::authentication("Invalid token format")
                    }
                    _ => AppError::authentication("Token validation failed"),
                }
            })?;

        Ok(token_data.claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use jsonwebtoken::{EncodingKey, Header, encode};
    use parley_core::error::ErrorKind;
    use parley_core::types::UserId;

    const SECRET: &str = "test-secret";

    fn decoder() -> JwtDecoder {
        JwtDecoder::new(&AuthConfig {
            jwt_secret: SECRET.to_string(),
            leeway_seconds: 0,
        })
    }

    fn mint(sub: UserId, exp_offset: i64, secret: &str) -> String {
        let now = Utc::now().timestamp();
        let claims = Claims {
            sub,
            iat: now,
            exp: now + exp_offset,
        };
        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .expect("encode")
    }

    #[test]
    fn test_valid_token_yields_subject() {
        let user = UserId::new();
        let claims = decoder().decode(&mint(user, 600, SECRET)).unwrap();
        assert_eq!(claims.user_id(), user);
        assert!(claims.remaining_ttl_seconds() > 0);
    }

    #[test]
    fn test_expired_token_rejected() {
        let err = decoder().decode(&mint(UserId::new(), -120, SECRET)).unwrap_err();
        assert_eq!(err.kind, ErrorKind::Authentication);
        assert_eq!(err.message, "Token has expired");
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let err = decoder()
            .decode(&mint(UserId::new(), 600, "other-secret"))
            .unwrap_err();
        assert_eq!(err.message, "Invalid token signature");
    }

    #[test]
    fn test_malformed_and_missing_tokens_rejected() {
        assert_eq!(
            decoder().decode("not.a.jwt").unwrap_err().kind,
            ErrorKind::Authentication
        );
        assert_eq!(decoder().decode("  ").unwrap_err().message, "Missing credential");
    }

    #[test]
    fn test_non_uuid_subject_rejected() {
        let now = Utc::now().timestamp();
        let token = encode(
            &Header::default(),
            &raw_claims(now),
            &EncodingKey::from_secret(SECRET.as_bytes()),
        )
        .expect("encode");
        assert_eq!(
            decoder().decode(&token).unwrap_err().kind,
            ErrorKind::Authentication
        );
    }

    #[derive(serde::Serialize)]
    struct RawClaims {
        sub: String,
        exp: i64,
    }

    fn raw_claims(now: i64) -> RawClaims {
        RawClaims {
            sub: format!("user-{}", uuid::Uuid::new_v4().simple()),
            exp: now + 600,
        }
    }
}
