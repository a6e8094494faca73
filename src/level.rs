//! Severity ladder shared by loggers and handlers.
//!
//! Levels are small integers so configuration can name them or give the
//! number directly. The ladder extends the usual severities with `GARBAGE`,
//! `TRACE` and `PROFILE` below `INFO` and `QUIET` above `CRITICAL`.

use std::fmt;
use std::str::FromStr;

use log::warn;
use serde::{Deserialize, Deserializer, Serialize, Serializer, de};
use thiserror::Error;

/// Error returned when a level name cannot be parsed.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("invalid log level: {0}")]
pub struct ParseLevelError(pub String);

/// A log level. Higher values are more severe.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct FemtoLevel(u16);

impl FemtoLevel {
    pub const ALL: Self = Self(0);
    pub const GARBAGE: Self = Self(1);
    pub const TRACE: Self = Self(5);
    pub const DEBUG: Self = Self(10);
    pub const PROFILE: Self = Self(15);
    pub const INFO: Self = Self(20);
    pub const WARNING: Self = Self(30);
    pub const ERROR: Self = Self(40);
    pub const CRITICAL: Self = Self(50);
    pub const QUIET: Self = Self(1000);

    /// Named levels sorted from most to least verbose.
    pub const NAMED: [(&'static str, FemtoLevel); 10] = [
        ("ALL", Self::ALL),
        ("GARBAGE", Self::GARBAGE),
        ("TRACE", Self::TRACE),
        ("DEBUG", Self::DEBUG),
        ("PROFILE", Self::PROFILE),
        ("INFO", Self::INFO),
        ("WARNING", Self::WARNING),
        ("ERROR", Self::ERROR),
        ("CRITICAL", Self::CRITICAL),
        ("QUIET", Self::QUIET),
    ];

    /// Wrap a raw numeric level.
    pub const fn from_value(value: u16) -> Self {
        Self(value)
    }

    /// Numeric value of the level.
    pub const fn value(self) -> u16 {
        self.0
    }

    /// Canonical name, if the value has one.
    pub fn name(self) -> Option<&'static str> {
        Self::NAMED
            .iter()
            .find(|(_, level)| *level == self)
            .map(|(name, _)| *name)
    }

    /// Resolve a configuration value.
    ///
    /// A missing value means `WARNING`. Unknown names fall back to `ERROR`
    /// after a warning so a typo never silences logging entirely.
    pub fn from_config(value: Option<&str>) -> Self {
        let Some(raw) = value else {
            return Self::WARNING;
        };
        match raw.parse() {
            Ok(level) => level,
            Err(_) => {
                if !raw.is_empty() {
                    warn!(
                        "could not translate log level '{raw}' into a level; using ERROR instead"
                    );
                }
                Self::ERROR
            }
        }
    }

    /// Return whether a record at `level` passes a gate set at `self`.
    pub fn allows(self, level: FemtoLevel) -> bool {
        level >= self
    }
}

impl From<u16> for FemtoLevel {
    fn from(value: u16) -> Self {
        Self(value)
    }
}

impl From<FemtoLevel> for u16 {
    fn from(level: FemtoLevel) -> Self {
        level.0
    }
}

impl fmt::Display for FemtoLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(name) => f.write_str(name),
            None => write!(f, "Level {}", self.0),
        }
    }
}

impl FromStr for FemtoLevel {
    type Err = ParseLevelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if let Ok(value) = trimmed.parse::<u16>() {
            return Ok(Self(value));
        }
        match trimmed.to_ascii_uppercase().as_str() {
            "NOTSET" => Ok(Self::ALL),
            "WARN" => Ok(Self::WARNING),
            upper => Self::NAMED
                .iter()
                .find(|(name, _)| *name == upper)
                .map(|(_, level)| *level)
                .ok_or_else(|| ParseLevelError(s.to_owned())),
        }
    }
}

impl Serialize for FemtoLevel {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self.name() {
            Some(name) => serializer.serialize_str(name),
            None => serializer.serialize_u16(self.0),
        }
    }
}

impl<'de> Deserialize<'de> for FemtoLevel {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct LevelVisitor;

        impl de::Visitor<'_> for LevelVisitor {
            type Value = FemtoLevel;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a level name or an integer between 0 and 65535")
            }

            fn visit_u64<E: de::Error>(self, v: u64) -> Result<Self::Value, E> {
                u16::try_from(v)
                    .map(FemtoLevel)
                    .map_err(|_| E::invalid_value(de::Unexpected::Unsigned(v), &self))
            }

            fn visit_i64<E: de::Error>(self, v: i64) -> Result<Self::Value, E> {
                u16::try_from(v)
                    .map(FemtoLevel)
                    .map_err(|_| E::invalid_value(de::Unexpected::Signed(v), &self))
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<Self::Value, E> {
                v.parse().map_err(E::custom)
            }
        }

        deserializer.deserialize_any(LevelVisitor)
    }
}
