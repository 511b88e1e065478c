//! Update scheduler: fetch, verify, ingest, notify.
//!
//! One update cycle runs end to end on the owner instance:
//!
//! ```text
//! fetch → split frame → verify signature → decode documents
//!       → apply inside one write transaction → invalidate caches
//!       → post change notification → schedule the next check
//! ```
//!
//! Transport, authentication and wire failures discard the fetched blob
//! and leave the database untouched; the cycle is simply rescheduled.
//! Corruption detected while applying requests a deferred rebuild. At most
//! one cycle runs at a time per process.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

use rand::Rng;
use tracing::{debug, info, instrument, warn};

use crate::db::RevocationDb;
use crate::error::RevocationError;
use crate::ingest::{self, IngestContext};
use crate::store::admin_set_blob;
use crate::types::{admin_keys, MIN_WIRE_FORMAT_VERSION, WIRE_FORMAT_VERSION};
use crate::wire;

/// Result of asking the update server for new data.
#[derive(Debug, Clone)]
pub enum FetchOutcome {
    /// The server has nothing newer than the version we reported.
    NotModified,
    /// A raw framed update blob (payload + detached signature).
    Update(Vec<u8>),
}

/// Transport used to retrieve update blobs from the configured server.
pub trait UpdateFetcher {
    /// Ask `server` for updates newer than `have_version`.
    fn fetch(&self, server: &str, have_version: u64) -> Result<FetchOutcome, RevocationError>;
}

/// Verification of the detached signature over an update payload.
pub trait UpdateVerifier {
    /// Whether `signature` is a valid trust-authority signature over
    /// `payload`.
    fn verify(&self, payload: &[u8], signature: &[u8]) -> bool;
}

/// Metadata of a locally available pre-seeded database snapshot.
#[derive(Debug, Clone, Copy)]
pub struct SnapshotInfo {
    /// Content version the snapshot carries.
    pub version: u64,
    /// Wire format version the snapshot was built from.
    pub format: u32,
}

/// Source of pre-seeded database snapshots shipped with the platform.
///
/// When a snapshot carries a newer content version than the live database
/// (typically right after a system update), installing it wholesale beats
/// replaying updates from the server.
pub trait SnapshotProvider {
    /// Metadata of the best available snapshot, if any.
    fn info(&self) -> Option<SnapshotInfo>;
    /// Materialize the snapshot as a readable database file.
    fn take_snapshot(&self) -> Result<PathBuf, RevocationError>;
}

/// Cross-process change notification channel.
///
/// The owner posts after every committed update; read-only instances
/// subscribe and invalidate their caches on delivery.
pub trait ChangeNotifier {
    /// Post the named notification.
    fn post(&self, name: &str);
}

/// In-process [`ChangeNotifier`] delivering posts to registered callbacks.
///
/// Stands in for the platform notification bus in tests and single-process
/// deployments.
#[derive(Default)]
pub struct LocalNotifier {
    subscribers: Mutex<Vec<Box<dyn Fn(&str) + Send>>>,
}

impl LocalNotifier {
    /// Create a notifier with no subscribers.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a callback invoked on every post.
    pub fn subscribe(&self, callback: impl Fn(&str) + Send + 'static) {
        if let Ok(mut subs) = self.subscribers.lock() {
            subs.push(Box::new(callback));
        }
    }
}

impl ChangeNotifier for LocalNotifier {
    fn post(&self, name: &str) {
        if let Ok(subs) = self.subscribers.lock() {
            for callback in subs.iter() {
                callback(name);
            }
        }
    }
}

/// Outcome of one update cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    /// Another cycle was already in flight; nothing was done.
    AlreadyRunning,
    /// The server confirmed we are up to date.
    AlreadyCurrent,
    /// The fetched payload carried no version newer than the database.
    NoNewerData,
    /// A local pre-seeded snapshot replaced the database wholesale.
    SnapshotInstalled {
        /// Content version of the installed snapshot.
        version: u64,
    },
    /// Documents were applied and committed.
    Applied {
        /// Content version after the commit.
        version: u64,
    },
}

/// Drives periodic update cycles against one [`RevocationDb`].
pub struct Updater {
    fetcher: Box<dyn UpdateFetcher + Send + Sync>,
    verifier: Box<dyn UpdateVerifier + Send + Sync>,
    notifier: Box<dyn ChangeNotifier + Send + Sync>,
    snapshots: Option<Box<dyn SnapshotProvider + Send + Sync>>,
    in_flight: AtomicBool,
}

/// Clears the in-flight flag when a cycle ends, on every exit path.
struct InFlightGuard<'a>(&'a AtomicBool);

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

fn now_unix() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

impl Updater {
    /// Create an updater without a snapshot source.
    pub fn new(
        fetcher: Box<dyn UpdateFetcher + Send + Sync>,
        verifier: Box<dyn UpdateVerifier + Send + Sync>,
        notifier: Box<dyn ChangeNotifier + Send + Sync>,
    ) -> Self {
        Self {
            fetcher,
            verifier,
            notifier,
            snapshots: None,
            in_flight: AtomicBool::new(false),
        }
    }

    /// Attach a pre-seeded snapshot source.
    #[must_use]
    pub fn with_snapshots(mut self, snapshots: Box<dyn SnapshotProvider + Send + Sync>) -> Self {
        self.snapshots = Some(snapshots);
        self
    }

    /// When the next update check should run, Unix seconds.
    ///
    /// Uses the persisted schedule when one exists, otherwise now plus the
    /// configured interval with jitter.
    pub fn next_check_time(&self, db: &RevocationDb) -> i64 {
        match db.next_update() {
            Ok(Some(when)) => when,
            _ => now_unix() + self.jittered_interval(db, None),
        }
    }

    /// Interval until the next check: the server's suggestion when given,
    /// otherwise the configured baseline, plus random jitter so a fleet of
    /// hosts does not hit the server in lockstep.
    fn jittered_interval(&self, db: &RevocationDb, suggested: Option<u64>) -> i64 {
        let base = suggested.unwrap_or_else(|| db.config().update_interval.as_secs());
        let jitter_max = (base as f64 * db.config().jitter_fraction) as u64;
        let jitter = if jitter_max > 0 {
            rand::thread_rng().gen_range(0..=jitter_max)
        } else {
            0
        };
        (base + jitter) as i64
    }

    fn schedule_next(&self, db: &RevocationDb, suggested: Option<u64>) {
        let when = now_unix() + self.jittered_interval(db, suggested);
        if let Err(e) = db.store().set_next_update(when) {
            warn!(error = %e, "failed to persist next update check");
        }
        debug!(when, "next update check scheduled");
    }

    /// Verify a raw framed blob and decode its documents.
    ///
    /// The signature is checked before any document bytes are parsed;
    /// unauthenticated data never reaches the deserializer.
    pub fn verify_and_decode<'a>(
        &self,
        raw: &'a [u8],
        format: u32,
        have_version: u64,
    ) -> Result<wire::DocumentStream<'a>, RevocationError> {
        let frame = wire::split_frame(raw)?;
        if !self.verifier.verify(frame.payload, frame.signature) {
            return Err(RevocationError::Authentication);
        }
        wire::decode(frame.payload, format, have_version)
    }

    /// Run one update cycle to completion.
    ///
    /// Recoverable failures (transport, authentication, malformed data)
    /// leave the database untouched; the error is returned after the next
    /// check has been rescheduled. Corruption additionally requests a
    /// deferred rebuild.
    #[instrument(skip(self, db))]
    pub fn run_cycle(&self, db: &RevocationDb) -> Result<CycleOutcome, RevocationError> {
        if self
            .in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!("update cycle already in flight");
            return Ok(CycleOutcome::AlreadyRunning);
        }
        let _guard = InFlightGuard(&self.in_flight);

        if !db.store().is_owner() {
            return Err(RevocationError::Config {
                message: "read-only instance cannot run update cycles".into(),
            });
        }

        let result = self.run_cycle_inner(db);
        match &result {
            Ok(outcome) => info!(?outcome, "update cycle finished"),
            Err(e) => {
                warn!(error = %e, "update cycle failed");
                if e.is_corruption() {
                    db.store().request_rebuild();
                }
                if e.is_recoverable() {
                    self.schedule_next(db, None);
                }
            },
        }
        result
    }

    fn run_cycle_inner(&self, db: &RevocationDb) -> Result<CycleOutcome, RevocationError> {
        let have = db.content_version()?;

        // A pre-seeded snapshot newer than the live content short-circuits
        // the server round trip entirely.
        if let Some(provider) = &self.snapshots {
            if let Some(info) = provider.info() {
                let usable = (MIN_WIRE_FORMAT_VERSION..=WIRE_FORMAT_VERSION).contains(&info.format);
                if usable && info.version > have {
                    info!(version = info.version, "installing pre-seeded snapshot");
                    let path = provider.take_snapshot()?;
                    db.store().install_snapshot(&path)?;
                    db.invalidate_caches();
                    self.notifier.post(&db.config().notify_name);
                    self.schedule_next(db, None);
                    return Ok(CycleOutcome::SnapshotInstalled { version: info.version });
                }
            }
        }

        let server = db.config().update_server.clone();
        let raw = match self.fetcher.fetch(&server, have)? {
            FetchOutcome::NotModified => {
                self.schedule_next(db, None);
                return Ok(CycleOutcome::AlreadyCurrent);
            },
            FetchOutcome::Update(raw) => raw,
        };

        let mut stream = self.verify_and_decode(&raw, db.config().wire_format, have)?;
        let mut documents = Vec::new();
        for item in &mut stream {
            documents.push(item?);
        }
        if documents.is_empty() {
            debug!(stale = ?stream.stale_version(), "payload carried nothing to apply");
            self.schedule_next(db, None);
            return Ok(CycleOutcome::NoNewerData);
        }

        let ctx = db.store().with_write(|tx| {
            let mut ctx = IngestContext::default();
            for (doc, is_first) in &documents {
                ingest::apply_document(tx, &mut ctx, doc, *is_first)?;
            }
            ingest::finalize_cycle(tx, &ctx)?;
            admin_set_blob(tx, admin_keys::DB_SOURCE, server.as_bytes())?;
            Ok(ctx)
        })?;

        db.invalidate_caches();
        self.notifier.post(&db.config().notify_name);
        self.schedule_next(db, ctx.check_again);

        let version = db.content_version()?;
        Ok(CycleOutcome::Applied { version })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;

    use super::*;
    use crate::config::RevocationConfig;
    use crate::wire::{GroupUpdate, UpdateDocument};

    struct StaticFetcher(FetchOutcome);

    impl UpdateFetcher for StaticFetcher {
        fn fetch(&self, _server: &str, _have: u64) -> Result<FetchOutcome, RevocationError> {
            Ok(self.0.clone())
        }
    }

    struct AcceptAll;

    impl UpdateVerifier for AcceptAll {
        fn verify(&self, _payload: &[u8], _signature: &[u8]) -> bool {
            true
        }
    }

    struct RejectAll;

    impl UpdateVerifier for RejectAll {
        fn verify(&self, _payload: &[u8], _signature: &[u8]) -> bool {
            false
        }
    }

    fn test_db() -> (tempfile::TempDir, RevocationDb) {
        let dir = tempfile::tempdir().unwrap();
        let config = RevocationConfig {
            db_path: dir.path().join("revocation.db"),
            ..RevocationConfig::default()
        };
        (dir, RevocationDb::open(config).unwrap())
    }

    fn signed_blob(docs: &[UpdateDocument]) -> Vec<u8> {
        wire::encode(docs, WIRE_FORMAT_VERSION, b"test-signature").unwrap()
    }

    fn full_doc(version: u64) -> UpdateDocument {
        UpdateDocument {
            version: Some(version),
            check_again: Some(7200),
            full: true,
            update: vec![GroupUpdate {
                issuers: vec![hex::encode([version as u8; 32])],
                format: Some("serial".into()),
                add: vec!["01".into()],
                ..GroupUpdate::default()
            }],
            ..UpdateDocument::default()
        }
    }

    fn updater(outcome: FetchOutcome) -> Updater {
        Updater::new(
            Box::new(StaticFetcher(outcome)),
            Box::new(AcceptAll),
            Box::new(LocalNotifier::new()),
        )
    }

    #[test]
    fn test_cycle_applies_update() {
        let (_dir, db) = test_db();
        let up = updater(FetchOutcome::Update(signed_blob(&[full_doc(4)])));

        let outcome = up.run_cycle(&db).unwrap();
        assert_eq!(outcome, CycleOutcome::Applied { version: 4 });
        assert_eq!(db.content_version().unwrap(), 4);
        // The source identity and next check were persisted.
        assert!(db.update_source().unwrap().is_some());
        assert!(db.next_update().unwrap().is_some());
    }

    #[test]
    fn test_cycle_not_modified() {
        let (_dir, db) = test_db();
        let up = updater(FetchOutcome::NotModified);
        assert_eq!(up.run_cycle(&db).unwrap(), CycleOutcome::AlreadyCurrent);
        assert_eq!(db.content_version().unwrap(), 0);
    }

    #[test]
    fn test_reapplying_same_version_is_noop() {
        let (_dir, db) = test_db();
        let blob = signed_blob(&[full_doc(4)]);
        let up = updater(FetchOutcome::Update(blob));

        assert_eq!(up.run_cycle(&db).unwrap(), CycleOutcome::Applied { version: 4 });
        // Same blob again: the stream stops at the stale version before
        // touching the database.
        assert_eq!(up.run_cycle(&db).unwrap(), CycleOutcome::NoNewerData);
        assert_eq!(db.content_version().unwrap(), 4);
    }

    #[test]
    fn test_bad_signature_leaves_database_untouched() {
        let (_dir, db) = test_db();
        let up = Updater::new(
            Box::new(StaticFetcher(FetchOutcome::Update(signed_blob(&[full_doc(4)])))),
            Box::new(RejectAll),
            Box::new(LocalNotifier::new()),
        );

        let result = up.run_cycle(&db);
        assert!(matches!(result, Err(RevocationError::Authentication)));
        assert_eq!(db.content_version().unwrap(), 0);
        assert!(!db.contains_issuer(b"anything").unwrap());
    }

    #[test]
    fn test_malformed_frame_is_recoverable() {
        let (_dir, db) = test_db();
        let up = updater(FetchOutcome::Update(vec![0xff; 3]));

        let result = up.run_cycle(&db);
        assert!(matches!(result, Err(ref e) if e.is_recoverable()));
        assert_eq!(db.content_version().unwrap(), 0);
        // Recoverable failures still reschedule the next check.
        assert!(db.next_update().unwrap().is_some());
    }

    #[test]
    fn test_notification_posted_on_commit() {
        let (_dir, db) = test_db();
        let posts = Arc::new(AtomicUsize::new(0));
        let notifier = LocalNotifier::new();
        let counter = Arc::clone(&posts);
        notifier.subscribe(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        let up = Updater::new(
            Box::new(StaticFetcher(FetchOutcome::Update(signed_blob(&[full_doc(2)])))),
            Box::new(AcceptAll),
            Box::new(notifier),
        );
        up.run_cycle(&db).unwrap();
        assert_eq!(posts.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_snapshot_preferred_when_newer() {
        struct Seeded {
            path: PathBuf,
            version: u64,
        }

        impl SnapshotProvider for Seeded {
            fn info(&self) -> Option<SnapshotInfo> {
                Some(SnapshotInfo {
                    version: self.version,
                    format: WIRE_FORMAT_VERSION,
                })
            }
            fn take_snapshot(&self) -> Result<PathBuf, RevocationError> {
                Ok(self.path.clone())
            }
        }

        // Build the snapshot file as its own database at version 9.
        let snap_dir = tempfile::tempdir().unwrap();
        let snap_path = snap_dir.path().join("seed.db");
        {
            let config = RevocationConfig {
                db_path: snap_path.clone(),
                ..RevocationConfig::default()
            };
            let seed = RevocationDb::open(config).unwrap();
            let up = updater(FetchOutcome::Update(signed_blob(&[full_doc(9)])));
            up.run_cycle(&seed).unwrap();
        }

        let (_dir, db) = test_db();
        let up = updater(FetchOutcome::NotModified).with_snapshots(Box::new(Seeded {
            path: snap_path,
            version: 9,
        }));

        let outcome = up.run_cycle(&db).unwrap();
        assert_eq!(outcome, CycleOutcome::SnapshotInstalled { version: 9 });
        assert_eq!(db.content_version().unwrap(), 9);
    }

    #[test]
    fn test_read_only_instance_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("revocation.db");
        let _owner = RevocationDb::open(RevocationConfig {
            db_path: path.clone(),
            ..RevocationConfig::default()
        })
        .unwrap();
        let ro = RevocationDb::open(RevocationConfig {
            db_path: path,
            owner: false,
            ..RevocationConfig::default()
        })
        .unwrap();

        let up = updater(FetchOutcome::NotModified);
        assert!(matches!(
            up.run_cycle(&ro),
            Err(RevocationError::Config { .. })
        ));
    }
}
