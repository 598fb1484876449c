use crate::services::object_store::StoreError;
use crate::services::tracker::TrackerError;
use thiserror::Error;

/// Error taxonomy for one indexing run.
///
/// Everything that goes wrong after setup funnels into this enum, and its
/// display string is what gets posted as the failure comment on the
/// originating ticket, so the messages carry the offending key or call.
#[derive(Debug, Error)]
pub enum IndexError {
    /// Missing or invalid settings, raised before any remote call is made.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The advisory lease for the version is missing or could not be checked.
    #[error("precondition failed: {0}")]
    PreconditionFailed(String),

    /// A storage or tracker call did not succeed.
    #[error("remote call failed: {0}")]
    RemoteCallFailed(String),

    /// An existing remote object does not have the expected shape.
    #[error("malformed state at `{key}`: {reason}")]
    MalformedState { key: String, reason: String },
}

impl IndexError {
    /// Shortcut for a MalformedState at a given key.
    pub fn malformed(key: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::MalformedState {
            key: key.into(),
            reason: reason.into(),
        }
    }
}

impl From<StoreError> for IndexError {
    fn from(err: StoreError) -> Self {
        Self::RemoteCallFailed(err.to_string())
    }
}

impl From<TrackerError> for IndexError {
    fn from(err: TrackerError) -> Self {
        Self::RemoteCallFailed(err.to_string())
    }
}
