// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use serde::{de, Deserialize, Deserializer, Serialize};
use std::fmt;
use std::str::FromStr;

/// Severity of a log event, always rendered in uppercase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    Debug,
    Info,
    Warn,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown log level '{0}'")]
pub struct UnknownSeverity(pub String);

impl Severity {
    pub const ALL: [Severity; 4] = [
        Severity::Debug,
        Severity::Info,
        Severity::Warn,
        Severity::Error,
    ];

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Debug => "DEBUG",
            Severity::Info => "INFO",
            Severity::Warn => "WARN",
            Severity::Error => "ERROR",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parses a level case-insensitively.
///
/// Producers built on other logging frameworks send a few extra names; they
/// are folded onto the four supported severities: `TRACE` becomes `DEBUG`,
/// `WARNING` becomes `WARN`, `FATAL` and `CRITICAL` become `ERROR`.
impl FromStr for Severity {
    type Err = UnknownSeverity;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "DEBUG" | "TRACE" => Ok(Severity::Debug),
            "INFO" => Ok(Severity::Info),
            "WARN" | "WARNING" => Ok(Severity::Warn),
            "ERROR" | "FATAL" | "CRITICAL" => Ok(Severity::Error),
            _ => Err(UnknownSeverity(s.to_string())),
        }
    }
}

impl<'de> Deserialize<'de> for Severity {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_is_case_insensitive() {
        assert_eq!("info".parse::<Severity>(), Ok(Severity::Info));
        assert_eq!(" Error ".parse::<Severity>(), Ok(Severity::Error));
        assert_eq!("WARN".parse::<Severity>(), Ok(Severity::Warn));
    }

    #[test]
    fn test_parse_folds_aliases() {
        assert_eq!("trace".parse::<Severity>(), Ok(Severity::Debug));
        assert_eq!("warning".parse::<Severity>(), Ok(Severity::Warn));
        assert_eq!("FATAL".parse::<Severity>(), Ok(Severity::Error));
    }

    #[test]
    fn test_parse_unknown() {
        let err = "verbose".parse::<Severity>().unwrap_err();
        assert_eq!(err.to_string(), "unknown log level 'verbose'");
    }

    #[test]
    fn test_serializes_uppercase() {
        let json = serde_json::to_string(&Severity::Warn).unwrap();
        assert_eq!(json, "\"WARN\"");
        let parsed: Severity = serde_json::from_str("\"debug\"").unwrap();
        assert_eq!(parsed, Severity::Debug);
    }
}
