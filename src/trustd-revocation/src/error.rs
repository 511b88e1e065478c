//! Error types for revocation database operations.

use thiserror::Error;

/// Errors that can occur while maintaining or querying the revocation
/// database.
///
/// The update scheduler recovers from every variant except
/// [`RevocationError::Corruption`]: transport, authentication and wire
/// failures simply discard the update and reschedule, storage failures roll
/// back the surrounding transaction, and corruption requests a full
/// database replacement at the next startup.
#[derive(Debug, Error)]
pub enum RevocationError {
    /// The update server could not be reached or returned garbage.
    #[error("Transport error: {message}")]
    Transport {
        /// Error message from the fetcher.
        message: String,
    },

    /// The detached signature over the update payload did not verify.
    #[error("Update authentication failed")]
    Authentication,

    /// Declared lengths inconsistent with the buffer, or a chunk failed to
    /// deserialize into the expected document shape.
    #[error("Malformed update data: {message}")]
    WireFormat {
        /// What was wrong with the bytes.
        message: String,
    },

    /// SQL failure inside a transaction; the transaction has been rolled
    /// back.
    #[error("Storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    /// The on-disk schema is older than the minimum this build can trust.
    #[error("Unsupported schema version {found} (minimum {minimum})")]
    UnsupportedSchema {
        /// Schema version read from the admin table.
        found: i64,
        /// Minimum version this build accepts.
        minimum: i64,
    },

    /// The update source publishes a wire format this build cannot read.
    #[error("Unsupported wire format version {found} (minimum {minimum})")]
    UnsupportedWireFormat {
        /// Format version advertised by the source.
        found: u32,
        /// Oldest format this build still decodes.
        minimum: u32,
    },

    /// The database file is unrecoverably damaged; a rebuild has been
    /// requested.
    #[error("Database corruption: {message}")]
    Corruption {
        /// Diagnostic detail.
        message: String,
    },

    /// Invalid engine configuration (e.g. a read-only instance asked to
    /// apply updates).
    #[error("Configuration error: {message}")]
    Config {
        /// Error message.
        message: String,
    },
}

impl RevocationError {
    /// Check if this error should be handled by rescheduling the update
    /// cycle with backoff, leaving the database untouched.
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::Transport { .. }
                | Self::Authentication
                | Self::WireFormat { .. }
                | Self::UnsupportedWireFormat { .. }
        )
    }

    /// Check if this error should trigger a full database replacement.
    #[must_use]
    pub fn is_corruption(&self) -> bool {
        match self {
            Self::Corruption { .. } => true,
            Self::Storage(e) => {
                matches!(
                    e.sqlite_error_code(),
                    Some(rusqlite::ErrorCode::DatabaseCorrupt)
                        | Some(rusqlite::ErrorCode::NotADatabase)
                )
            },
            _ => false,
        }
    }
}
