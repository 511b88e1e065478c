//! Lookup facade over the store, cache and filter matcher.
//!
//! The lookup path is fail-soft: storage errors degrade to "no revocation
//! opinion" (a `None` result) rather than surfacing into the caller's
//! chain-evaluation path. Corruption detected during a lookup schedules a
//! deferred rebuild instead of failing the process.

use sha2::{Digest, Sha256};
use tracing::{debug, instrument, warn};

use crate::cache::LookupCache;
use crate::config::RevocationConfig;
use crate::error::RevocationError;
use crate::filter;
use crate::store::{self, Store};
use crate::types::{
    CertificateRef, GroupFlags, RevocationFormat, ValidInfo, MIN_SUPPORTED_SCHEMA_VERSION,
};

/// The revocation database engine: one instance per process.
pub struct RevocationDb {
    store: Store,
    cache: LookupCache,
    config: RevocationConfig,
}

fn sha256(data: &[u8]) -> [u8; 32] {
    Sha256::digest(data).into()
}

impl RevocationDb {
    /// Open the database described by `config`.
    ///
    /// The owner instance creates or migrates the file as needed; read-only
    /// instances fail if the file does not exist yet.
    pub fn open(config: RevocationConfig) -> Result<Self, RevocationError> {
        let store = Store::open(&config)?;
        let cache = LookupCache::new(config.cache_capacity);
        Ok(Self { store, cache, config })
    }

    /// Look up the revocation/validity status of `cert` as issued by the
    /// certificate with DER encoding `issuer_der`.
    ///
    /// Returns `None` when the database holds no opinion: the issuer is
    /// unknown, the certificate is a pinned platform anchor, the schema is
    /// unusable, or the read failed. A `Some` result carries the matched
    /// group's policy flags whether or not the certificate itself is on
    /// the group's list.
    #[instrument(skip(self, cert, issuer_der))]
    pub fn lookup(&self, cert: CertificateRef<'_>, issuer_der: &[u8]) -> Option<ValidInfo> {
        let cert_hash = sha256(cert.der);
        let issuer_hash = sha256(issuer_der);

        // Pinned platform anchors are exempt from revocation by policy.
        if self.config.trusted_anchors.contains(&cert_hash) {
            debug!("certificate is a pinned trust anchor");
            return None;
        }

        // A schema this build cannot read yields no opinion until the
        // owner has rebuilt the file; leave the rebuild marker so the
        // owner actually does.
        if self.store.schema_version() < MIN_SUPPORTED_SCHEMA_VERSION {
            warn!(
                schema = self.store.schema_version(),
                "schema below supported floor, scheduling rebuild"
            );
            self.store.request_rebuild();
            return None;
        }

        let key = LookupCache::key(&cert_hash, &issuer_hash);
        if let Some(info) = self.cache.get(&key, &cert_hash, &issuer_hash) {
            return Some(info);
        }

        match self.lookup_uncached(&cert, cert_hash, issuer_hash) {
            Ok(Some(info)) => {
                self.cache.put(key, info.clone());
                Some(info)
            },
            Ok(None) => None,
            Err(e) => {
                warn!(error = %e, "lookup failed, returning no opinion");
                if e.is_corruption() {
                    self.store.request_rebuild();
                }
                None
            },
        }
    }

    fn lookup_uncached(
        &self,
        cert: &CertificateRef<'_>,
        cert_hash: [u8; 32],
        issuer_hash: [u8; 32],
    ) -> Result<Option<ValidInfo>, RevocationError> {
        self.store.with_read(|conn| {
            let Some(gid) = store::group_id_for_issuer(conn, &issuer_hash)? else {
                return Ok(None);
            };
            let Some(row) = store::group_row(conn, gid)? else {
                // Issuer row pointing at a missing group: stale mapping.
                return Err(RevocationError::Corruption {
                    message: format!("issuer maps to missing group {gid}"),
                });
            };

            let on_list = match row.format {
                RevocationFormat::SerialList => store::has_serial(conn, gid, cert.serial)?,
                RevocationFormat::HashList => store::has_hash(conn, gid, &cert_hash)?,
                RevocationFormat::Nto1 => match &row.data {
                    Some(blob) => {
                        let (xor, params) = filter::decode_blob(blob)?;
                        filter::matches(&xor, &params, cert.serial)
                    },
                    None => false,
                },
            };

            let dates = if row.flags.contains(GroupFlags::DATE_CONSTRAINTS) {
                store::get_dates(conn, gid)?
            } else {
                None
            };

            Ok(Some(ValidInfo {
                format: row.format,
                flags: row.flags,
                on_list,
                cert_hash,
                issuer_hash,
                anchor_hash: None,
                not_before: dates.map(|d| d.0),
                not_after: dates.map(|d| d.1),
                name_constraints: None,
                policy_constraints: None,
            }))
        })
    }

    /// Whether any issuer group covers the given issuer certificate.
    pub fn contains_issuer(&self, issuer_der: &[u8]) -> Result<bool, RevocationError> {
        let issuer_hash = sha256(issuer_der);
        self.store
            .with_read(|conn| Ok(store::group_id_for_issuer(conn, &issuer_hash)?.is_some()))
    }

    /// Current content version (0 if the database has never been fed).
    pub fn content_version(&self) -> Result<u64, RevocationError> {
        self.store.content_version()
    }

    /// On-disk schema version, memoized after the first read.
    pub fn schema_version(&self) -> i64 {
        self.store.schema_version()
    }

    /// Wire format version the stored content was decoded from.
    pub fn wire_format_version(&self) -> Result<u32, RevocationError> {
        self.store.wire_format()
    }

    /// Identity of the server the stored content came from.
    pub fn update_source(&self) -> Result<Option<String>, RevocationError> {
        self.store.update_source()
    }

    /// Next scheduled update check, Unix seconds, if one was persisted.
    pub fn next_update(&self) -> Result<Option<i64>, RevocationError> {
        self.store.next_update()
    }

    /// Drop every cached lookup result and re-read the schema version.
    ///
    /// Called locally after a committed update, and by read-only instances
    /// when the owner's cross-process change notification arrives.
    pub fn invalidate_caches(&self) {
        self.cache.clear();
        self.store.refresh_schema_version();
    }

    /// Ask for the database file to be discarded and rebuilt from scratch
    /// at the owner's next startup.
    pub fn request_rebuild(&self) {
        self.store.request_rebuild();
    }

    pub(crate) fn store(&self) -> &Store {
        &self.store
    }

    pub(crate) fn cache(&self) -> &LookupCache {
        &self.cache
    }

    pub(crate) fn config(&self) -> &RevocationConfig {
        &self.config
    }
}
