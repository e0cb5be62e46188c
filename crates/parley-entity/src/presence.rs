//! Presence status definitions.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use parley_core::AppError;

/// User presence status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PresenceStatus {
    /// Connected and available.
    Online,
    /// Connected but stepped away.
    Away,
    /// Connected, do not disturb.
    Busy,
    /// Not connected, or chose to appear offline.
    Offline,
}

impl PresenceStatus {
    /// Converts to string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Online => "online",
            Self::Away => "away",
            Self::Busy => "busy",
            Self::Offline => "offline",
        }
    }
}

impl fmt::Display for PresenceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PresenceStatus {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "online" => Ok(Self::Online),
            "away" => Ok(Self::Away),
            "busy" => Ok(Self::Busy),
            "offline" => Ok(Self::Offline),
            _ => Err(AppError::validation(format!(
                "Invalid status '{s}'. Expected one of: online, away, busy, offline"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_known_statuses() {
        assert_eq!("busy".parse::<PresenceStatus>().unwrap(), PresenceStatus::Busy);
        assert_eq!("offline".parse::<PresenceStatus>().unwrap(), PresenceStatus::Offline);
    }

    #[test]
    fn test_parse_rejects_unknown() {
        let err = "invisible".parse::<PresenceStatus>().unwrap_err();
        assert_eq!(err.kind, parley_core::ErrorKind::Validation);
        assert!("Online".parse::<PresenceStatus>().is_err());
    }
}
