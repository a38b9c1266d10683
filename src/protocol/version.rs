//! Server version as reported by `SELECT version()`.

use std::fmt;
use std::str::FromStr;

use crate::error::{ChError, Result};

/// A four-part server version (major, minor, patch, build).
///
/// Missing components are treated as zero, so `21.3` equals `21.3.0.0`.
/// Ordering is lexicographic over the tuple.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct ServerVersion {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
    pub build: u32,
}

impl ServerVersion {
    /// Creates a version from its four components.
    pub const fn new(major: u32, minor: u32, patch: u32, build: u32) -> Self {
        Self {
            major,
            minor,
            patch,
            build,
        }
    }

    /// Parses a version string such as `22.3.1.1` or `21.3`.
    ///
    /// Surrounding whitespace is ignored. Empty strings, non-numeric parts,
    /// more than four parts and a zero major version are rejected.
    pub fn parse(s: &str) -> Result<Self> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Err(ChError::InvalidVersion(s.to_string()));
        }

        let mut parts = [0u32; 4];
        let mut count = 0;
        for piece in trimmed.split('.') {
            if count == parts.len() {
                return Err(ChError::InvalidVersion(s.to_string()));
            }
            parts[count] = piece
                .parse()
                .map_err(|_| ChError::InvalidVersion(s.to_string()))?;
            count += 1;
        }

        if parts[0] == 0 {
            return Err(ChError::InvalidVersion(s.to_string()));
        }

        Ok(Self::new(parts[0], parts[1], parts[2], parts[3]))
    }
}

impl FromStr for ServerVersion {
    type Err = ChError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for ServerVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}.{}.{}.{}",
            self.major, self.minor, self.patch, self.build
        )
    }
}
