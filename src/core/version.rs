//! Version types for series data

use serde::{Deserialize, Serialize};

/// A plain (major, minor, patch) triple, ordered lexicographically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct VersionNumber {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

impl VersionNumber {
    pub fn new(major: u32, minor: u32, patch: u32) -> Self {
        VersionNumber {
            major,
            minor,
            patch,
        }
    }
}

impl std::fmt::Display for VersionNumber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

/// One slot of the remote version file: the latest state of a series'
/// major-version line, including which patch level carries the snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionSpec {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
    /// Patch level of the most recent full snapshot.
    pub snapshot: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub database_version: Option<String>,
    pub date_of_creation: String,
}

impl VersionSpec {
    pub fn version_number(&self) -> VersionNumber {
        VersionNumber::new(self.major, self.minor, self.patch)
    }
}

/// The version of series data we have (or are downloading), as persisted
/// in the version table and carried in download events.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataVersion {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub database_version: Option<String>,
    pub date_of_creation: String,
    pub lang: String,
}

impl DataVersion {
    pub fn version_number(&self) -> VersionNumber {
        VersionNumber::new(self.major, self.minor, self.patch)
    }
}

impl std::fmt::Display for DataVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_numbers_order_lexicographically() {
        assert!(VersionNumber::new(4, 0, 0) > VersionNumber::new(3, 9, 9));
        assert!(VersionNumber::new(4, 1, 0) > VersionNumber::new(4, 0, 12));
        assert!(VersionNumber::new(4, 1, 2) > VersionNumber::new(4, 1, 1));
        assert_eq!(VersionNumber::new(4, 1, 2), VersionNumber::new(4, 1, 2));
    }
}
