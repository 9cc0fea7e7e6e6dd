//! Semantic analysis version carried on each record.
//!
//! The engine bumps the patch component on every successful reclassification.
//! The field is assumed well-formed `major.minor.patch`; a malformed value is a
//! parse error the caller decides how to contain.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Malformed analysis version string.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("Invalid analysis version '{input}': expected major.minor.patch")]
pub struct VersionParseError {
    pub input: String,
}

/// `major.minor.patch` version of the classification applied to a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AnalysisVersion {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

impl AnalysisVersion {
    pub const fn new(major: u32, minor: u32, patch: u32) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }

    /// Version stamped on records that have never been analyzed.
    pub const fn initial() -> Self {
        Self::new(1, 0, 0)
    }

    /// The version after one more reclassification pass.
    pub fn bump_patch(self) -> Self {
        Self {
            patch: self.patch + 1,
            ..self
        }
    }
}

impl fmt::Display for AnalysisVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

impl FromStr for AnalysisVersion {
    type Err = VersionParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || VersionParseError {
            input: s.to_string(),
        };

        let mut parts = s.split('.');
        let major = parts.next().ok_or_else(err)?;
        let minor = parts.next().ok_or_else(err)?;
        let patch = parts.next().ok_or_else(err)?;
        if parts.next().is_some() {
            return Err(err());
        }

        Ok(Self {
            major: major.parse().map_err(|_| err())?,
            minor: minor.parse().map_err(|_| err())?,
            patch: patch.parse().map_err(|_| err())?,
        })
    }
}
