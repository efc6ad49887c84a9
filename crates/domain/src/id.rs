//! Release identifiers.
//!
//! A release id is a ULID: 26 Crockford base-32 characters, time-prefixed so
//! lexicographic order equals creation order. The catalog stores it as TEXT
//! and relies on that ordering for history walkback.

use std::fmt;

use serde::{Deserialize, Serialize};
use ulid::Ulid;

use crate::error::{Error, Result};

/// Sortable release identifier (ULID).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ReleaseId(String);

impl ReleaseId {
    /// Mint a new id from the current time plus randomness.
    pub fn generate() -> Self {
        Self(Ulid::new().to_string())
    }

    /// Parse an id received from the wire or read back from the catalog.
    pub fn parse(input: &str) -> Result<Self> {
        let ulid: Ulid = input
            .parse()
            .map_err(|_| Error::Other(format!("invalid release id: {input:?}")))?;
        Ok(Self(ulid.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ReleaseId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for ReleaseId {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl From<ReleaseId> for String {
    fn from(value: ReleaseId) -> Self {
        value.0
    }
}
