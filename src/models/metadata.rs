//! Documents the indexer reads from and writes to the bucket.

use serde::{Deserialize, Serialize};

/// How a purge ticket asks for a version to be removed.
pub const PURGE_MODE: &str = "expiry";

/// Metadata document written next to an indexed version.
///
/// All times are epoch milliseconds. The expiry fields are only present for
/// versions that uploaded an expiry declaration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VersionMetadata {
    /// When the upload finished, taken from the job parameters.
    pub upload_time: i64,
    /// When this indexing run processed the version.
    pub index_time: i64,
    /// When the version becomes eligible for removal.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiry_time: Option<i64>,
    /// Ticket that tracks the scheduled removal.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiry_job_id: Option<u64>,
}

/// Expiry declaration uploaded next to the version content.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExpiryInfo {
    /// Lifetime of the version in milliseconds, counted from indexing.
    pub expires_in: i64,
}

/// Pointer to the most recently indexed version of a project.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LatestPointer {
    /// Version the pointer refers to, empty for the placeholder.
    pub version: String,
    /// Indexing time of that version in epoch milliseconds.
    pub index_time: i64,
}

impl LatestPointer {
    /// Indexing time carried by placeholder pointers. Strictly below every
    /// real clock reading, so any later real version replaces a placeholder.
    pub const SENTINEL: i64 = -1;

    pub fn new(version: impl Into<String>, index_time: i64) -> Self {
        Self {
            version: version.into(),
            index_time,
        }
    }

    /// Placeholder stored instead of an expiring version, keeping the
    /// persistent pointer off versions that are scheduled to disappear.
    pub fn placeholder() -> Self {
        Self {
            version: String::new(),
            index_time: Self::SENTINEL,
        }
    }

    /// Whether `candidate` should replace what is currently stored. An absent
    /// pointer is always replaced, a present one only by a strictly newer
    /// candidate, so replays of the same run settle into a stable state.
    pub fn should_replace(existing: Option<&LatestPointer>, candidate: &LatestPointer) -> bool {
        match existing {
            None => true,
            Some(stored) => stored.index_time < candidate.index_time,
        }
    }
}

/// Body of a purge ticket created for an expiring version.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PurgeRequest {
    pub project: String,
    pub version: String,
    /// Always [`PURGE_MODE`].
    pub mode: String,
    /// Epoch milliseconds after which the version may be removed.
    pub delete_after: i64,
}
