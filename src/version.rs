//! Database Version Identifiers
//!
//! A database version is a fixed-width, zero-padded decimal numeral such as
//! `"001"` or `"154"`. Versions order lexicographically, which matches their
//! numeric order as long as both sides have the same width, and they step
//! forward one at a time with decimal carry (`"029"` -> `"030"`).
//!
//! Both properties only hold for equal widths, so every comparison that
//! drives a migration goes through [`DatabaseVersion::ensure_same_width`].

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Errors raised while parsing or stepping versions
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VersionError {
    #[error("Version must not be empty")]
    Empty,

    #[error("Version '{version}' must consist of decimal digits only")]
    NonNumeric { version: String },

    #[error("Version '{version}' cannot be incremented without changing its width")]
    Overflow { version: String },

    #[error("Versions '{left}' and '{right}' have different widths and cannot be compared")]
    WidthMismatch { left: String, right: String },
}

/// A validated database version
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DatabaseVersion(String);

impl DatabaseVersion {
    /// Parse and validate a version string
    pub fn parse(value: &str) -> Result<Self, VersionError> {
        if value.is_empty() {
            return Err(VersionError::Empty);
        }
        if !value.bytes().all(|b| b.is_ascii_digit()) {
            return Err(VersionError::NonNumeric {
                version: value.to_string(),
            });
        }
        Ok(Self(value.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Number of digits, including leading zeros
    pub fn width(&self) -> usize {
        self.0.len()
    }

    /// The version directly following this one.
    ///
    /// Increments the last digit and carries to the left, keeping the width.
    pub fn next(&self) -> Result<Self, VersionError> {
        let mut digits = self.0.clone().into_bytes();
        for digit in digits.iter_mut().rev() {
            if *digit == b'9' {
                *digit = b'0';
            } else {
                *digit += 1;
                // Only ASCII digits were touched, so the bytes stay valid UTF-8.
                return Ok(Self(String::from_utf8_lossy(&digits).into_owned()));
            }
        }
        Err(VersionError::Overflow {
            version: self.0.clone(),
        })
    }

    /// Fails unless both versions have the same width
    pub fn ensure_same_width(&self, other: &DatabaseVersion) -> Result<(), VersionError> {
        if self.width() != other.width() {
            return Err(VersionError::WidthMismatch {
                left: self.0.clone(),
                right: other.0.clone(),
            });
        }
        Ok(())
    }

    /// All `(from, to)` steps leading from `self` up to `target`.
    ///
    /// Returns an empty chain when `target` is not after `self`.
    pub fn chain_to(
        &self,
        target: &DatabaseVersion,
    ) -> Result<Vec<(DatabaseVersion, DatabaseVersion)>, VersionError> {
        self.ensure_same_width(target)?;
        let mut steps = Vec::new();
        let mut current = self.clone();
        while current < *target {
            let next = current.next()?;
            steps.push((current, next.clone()));
            current = next;
        }
        Ok(steps)
    }
}

impl fmt::Display for DatabaseVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for DatabaseVersion {
    type Err = VersionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for DatabaseVersion {
    type Error = VersionError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<DatabaseVersion> for String {
    fn from(version: DatabaseVersion) -> Self {
        version.0
    }
}

impl AsRef<str> for DatabaseVersion {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
