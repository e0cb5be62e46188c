//! Application configuration schemas.
//!
//! All configuration structs are deserialized from TOML files via the
//! `config` crate. Each sub-module represents a logical configuration
//! section, and every section falls back to its defaults when absent.

pub mod app;
pub mod auth;
pub mod broker;
pub mod database;
pub mod delivery;
pub mod logging;
pub mod messaging;
pub mod presence;
pub mod realtime;

use serde::{Deserialize, Serialize};

pub use self::app::ServerConfig;
pub use self::auth::AuthConfig;
pub use self::broker::BrokerConfig;
pub use self::database::{DatabaseConfig, DatabaseProvider};
pub use self::delivery::DeliveryConfig;
pub use self::logging::LoggingConfig;
pub use self::messaging::MessagingConfig;
pub use self::presence::PresenceConfig;
pub use self::realtime::{RateLimitConfig, RealtimeConfig};

use crate::error::AppError;

/// Root application configuration.
///
/// Top-level deserialization target for the merged TOML configuration
/// files (default.toml + environment overlay + `PARLEY__*` variables).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// HTTP server settings.
    #[serde(default)]
    pub server: ServerConfig,
    /// Persistence settings.
    #[serde(default)]
    pub database: DatabaseConfig,
    /// Bearer-credential validation settings.
    #[serde(default)]
    pub auth: AuthConfig,
    /// Connection gateway settings.
    #[serde(default)]
    pub realtime: RealtimeConfig,
    /// Presence tracker settings.
    #[serde(default)]
    pub presence: PresenceConfig,
    /// Delivery tracker settings.
    #[serde(default)]
    pub delivery: DeliveryConfig,
    /// Message dispatch rules.
    #[serde(default)]
    pub messaging: MessagingConfig,
    /// External broker notification settings.
    #[serde(default)]
    pub broker: BrokerConfig,
    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl AppConfig {
    /// Load configuration from TOML files.
    ///
    /// Merges `{dir}/default.toml` with the `{dir}/{env}.toml` overlay and
    /// environment variables prefixed with `PARLEY__`.
    pub fn load(dir: &str, env: &str) -> Result<Self, AppError> {
        let config = config::Config::builder()
            .add_source(config::File::with_name(&format!("{dir}/default")).required(false))
            .add_source(config::File::with_name(&format!("{dir}/{env}")).required(false))
            .add_source(
                config::Environment::with_prefix("PARLEY")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| AppError::configuration(format!("Failed to build config: {e}")))?;

        let loaded: Self = config
            .try_deserialize()
            .map_err(|e| AppError::configuration(format!("Failed to deserialize config: {e}")))?;

        loaded.validate()?;
        Ok(loaded)
    }

    /// Reject combinations the engine cannot run with.
    pub fn validate(&self) -> Result<(), AppError> {
        if self.delivery.max_attempts == 0 {
            return Err(AppError::configuration(
                "delivery.max_attempts must be at least 1",
            ));
        }
        if self.delivery.receipt_low_watermark > self.delivery.receipt_capacity {
            return Err(AppError::configuration(
                "delivery.receipt_low_watermark must not exceed delivery.receipt_capacity",
            ));
        }
        if self.presence.last_seen_low_watermark > self.presence.last_seen_capacity {
            return Err(AppError::configuration(
                "presence.last_seen_low_watermark must not exceed presence.last_seen_capacity",
            ));
        }
        if self.realtime.rate_limit.window_seconds == 0 {
            return Err(AppError::configuration(
                "realtime.rate_limit.window_seconds must be positive",
            ));
        }
        if self.database.provider == DatabaseProvider::Postgres && self.database.url.is_empty() {
            return Err(AppError::configuration(
                "database.url is required for the postgres provider",
            ));
        }
        Ok(())
    }
}
