//! Command vocabulary.
//!
//! The controller understands a closed set of commands. Requests carry one of
//! the five request commands; unsolicited pushes arrive as
//! [`Command::NotifyList`].

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

// ============================================================================
// Command
// ============================================================================

/// A command name as it appears in the `command` field on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Command {
    /// Read attributes of one or more objects.
    GetParamList,
    /// Write attributes of one or more objects.
    SetParamList,
    /// Run a named query (hardware definition, circuit status, ...).
    GetQuery,
    /// Subscribe to change notifications for objects.
    RequestParamList,
    /// Release a previous subscription.
    ReleaseParamList,
    /// Unsolicited change notification pushed by the controller.
    NotifyList,
}

impl Command {
    /// Returns the wire name of the command.
    #[inline]
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::GetParamList => "GetParamList",
            Self::SetParamList => "SetParamList",
            Self::GetQuery => "GetQuery",
            Self::RequestParamList => "RequestParamList",
            Self::ReleaseParamList => "ReleaseParamList",
            Self::NotifyList => "NotifyList",
        }
    }

    /// Returns `true` for commands a client may send.
    #[inline]
    #[must_use]
    pub const fn is_request(self) -> bool {
        !matches!(self, Self::NotifyList)
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Command {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "GetParamList" => Ok(Self::GetParamList),
            "SetParamList" => Ok(Self::SetParamList),
            "GetQuery" => Ok(Self::GetQuery),
            "RequestParamList" => Ok(Self::RequestParamList),
            "ReleaseParamList" => Ok(Self::ReleaseParamList),
            "NotifyList" => Ok(Self::NotifyList),
            other => Err(Error::protocol(format!("Unknown command: {other}"))),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serialize_pascal_case() {
        let json = serde_json::to_string(&Command::RequestParamList).expect("serialize");
        assert_eq!(json, "\"RequestParamList\"");
    }

    #[test]
    fn test_from_str_matches_as_str() {
        for command in [
            Command::GetParamList,
            Command::SetParamList,
            Command::GetQuery,
            Command::RequestParamList,
            Command::ReleaseParamList,
            Command::NotifyList,
        ] {
            assert_eq!(command.as_str().parse::<Command>().ok(), Some(command));
        }
    }

    #[test]
    fn test_unknown_command() {
        assert!("SendParamList".parse::<Command>().is_err());
    }

    #[test]
    fn test_is_request() {
        assert!(Command::GetQuery.is_request());
        assert!(!Command::NotifyList.is_request());
    }
}
