//! Configuration for the revocation database engine.

use std::path::PathBuf;
use std::time::Duration;

/// Configuration for a [`crate::RevocationDb`] instance.
#[derive(Debug, Clone)]
pub struct RevocationConfig {
    /// Path to the SQLite database file.
    pub db_path: PathBuf,
    /// Whether this process is the database owner (sole writer). All other
    /// instances open the file read-only.
    pub owner: bool,
    /// Identity of the update server this database is sourced from.
    pub update_server: String,
    /// Wire format version spoken by the update server.
    pub wire_format: u32,
    /// Baseline interval between update checks.
    pub update_interval: Duration,
    /// Fraction of the interval added as random jitter (0.0 to 1.0).
    pub jitter_fraction: f64,
    /// Result cache capacity.
    pub cache_capacity: usize,
    /// SHA-256 digests of pinned platform trust anchors. Lookups never
    /// produce a revoking result for these certificates.
    pub trusted_anchors: Vec<[u8; 32]>,
    /// Cross-process notification name posted after a committed update.
    pub notify_name: String,
}

impl Default for RevocationConfig {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from("revocation.db"),
            owner: true,
            update_server: "updates.trustd.example".into(),
            wire_format: crate::types::WIRE_FORMAT_VERSION,
            update_interval: Duration::from_secs(4 * 60 * 60), // 4 hours
            jitter_fraction: 0.1,
            cache_capacity: crate::cache::CACHE_CAPACITY,
            trusted_anchors: Vec::new(),
            notify_name: "com.trustd.revocation-db-changed".into(),
        }
    }
}
