//! End-to-end update and lookup scenarios through the public API.

use std::collections::VecDeque;
use std::sync::Mutex;

use sha2::{Digest, Sha256};

use trustd_revocation::wire;
use trustd_revocation::{
    CertificateRef, CycleOutcome, FetchOutcome, GroupUpdate, LocalNotifier, RevocationConfig,
    RevocationDb, RevocationError, UpdateDocument, UpdateFetcher, UpdateVerifier, Updater,
    WIRE_FORMAT_VERSION,
};

const ISSUER_DER: &[u8] = b"integration test issuer der";

fn sha256(data: &[u8]) -> [u8; 32] {
    Sha256::digest(data).into()
}

/// Fetcher that replays a queue of canned responses.
struct QueueFetcher(Mutex<VecDeque<FetchOutcome>>);

impl QueueFetcher {
    fn new(responses: Vec<FetchOutcome>) -> Self {
        Self(Mutex::new(responses.into()))
    }
}

impl UpdateFetcher for QueueFetcher {
    fn fetch(&self, _server: &str, _have: u64) -> Result<FetchOutcome, RevocationError> {
        self.0
            .lock()
            .ok()
            .and_then(|mut q| q.pop_front())
            .ok_or_else(|| RevocationError::Transport {
                message: "fetch queue exhausted".into(),
            })
    }
}

struct AcceptAll;

impl UpdateVerifier for AcceptAll {
    fn verify(&self, _payload: &[u8], _signature: &[u8]) -> bool {
        true
    }
}

fn open_db(dir: &tempfile::TempDir) -> RevocationDb {
    RevocationDb::open(RevocationConfig {
        db_path: dir.path().join("revocation.db"),
        ..RevocationConfig::default()
    })
    .unwrap()
}

fn updater(responses: Vec<FetchOutcome>) -> Updater {
    Updater::new(
        Box::new(QueueFetcher::new(responses)),
        Box::new(AcceptAll),
        Box::new(LocalNotifier::new()),
    )
}

fn blob(docs: &[UpdateDocument]) -> FetchOutcome {
    FetchOutcome::Update(wire::encode(docs, WIRE_FORMAT_VERSION, b"sig").unwrap())
}

fn full_serial_doc(version: u64, serials: &[&str]) -> UpdateDocument {
    UpdateDocument {
        version: Some(version),
        full: true,
        update: vec![GroupUpdate {
            issuers: vec![hex::encode(sha256(ISSUER_DER))],
            format: Some("serial".into()),
            add: serials.iter().map(|s| (*s).to_string()).collect(),
            ..GroupUpdate::default()
        }],
        ..UpdateDocument::default()
    }
}

fn leaf(serial: &[u8]) -> CertificateRef<'_> {
    // A real certificate's DER embeds its serial, so distinct serials must
    // yield distinct DER (the lookup cache is keyed on the DER digest).
    let der: &[u8] = Box::leak(
        [b"static leaf der " as &[u8], serial]
            .concat()
            .into_boxed_slice(),
    );
    CertificateRef { der, serial }
}

#[test]
fn full_update_then_lookup() {
    let dir = tempfile::tempdir().unwrap();
    let db = open_db(&dir);
    let up = updater(vec![blob(&[full_serial_doc(5, &["01", "02"])])]);

    assert_eq!(up.run_cycle(&db).unwrap(), CycleOutcome::Applied { version: 5 });
    assert_eq!(db.content_version().unwrap(), 5);

    let hit = db.lookup(leaf(&[0x01]), ISSUER_DER).expect("issuer known");
    assert!(hit.on_list);
    let miss = db.lookup(leaf(&[0x03]), ISSUER_DER).expect("issuer known");
    assert!(!miss.on_list);
}

#[test]
fn oversized_length_rejected_without_side_effects() {
    let dir = tempfile::tempdir().unwrap();
    let db = open_db(&dir);

    // Seed real content first.
    updater(vec![blob(&[full_serial_doc(5, &["01"])])])
        .run_cycle(&db)
        .unwrap();

    // Then serve a blob whose outer length field exceeds the buffer.
    let mut raw = wire::encode(&[full_serial_doc(6, &["02"])], WIRE_FORMAT_VERSION, b"sig").unwrap();
    raw[0..4].copy_from_slice(&u32::MAX.to_be_bytes());
    let up = updater(vec![FetchOutcome::Update(raw)]);

    let result = up.run_cycle(&db);
    assert!(matches!(result, Err(RevocationError::WireFormat { .. })));
    // Content and lookups are exactly as before the bad fetch.
    assert_eq!(db.content_version().unwrap(), 5);
    assert!(db.lookup(leaf(&[0x01]), ISSUER_DER).unwrap().on_list);
    assert!(db.lookup(leaf(&[0x02]), ISSUER_DER).map(|i| !i.on_list).unwrap_or(true));
}

#[test]
fn reapplied_update_is_noop() {
    let dir = tempfile::tempdir().unwrap();
    let db = open_db(&dir);
    let doc = full_serial_doc(5, &["01"]);
    let up = updater(vec![blob(&[doc.clone()]), blob(&[doc])]);

    assert_eq!(up.run_cycle(&db).unwrap(), CycleOutcome::Applied { version: 5 });
    assert_eq!(up.run_cycle(&db).unwrap(), CycleOutcome::NoNewerData);
    assert_eq!(db.content_version().unwrap(), 5);
    assert!(db.lookup(leaf(&[0x01]), ISSUER_DER).unwrap().on_list);
}

#[test]
fn rebuild_discards_previous_content() {
    let dir = tempfile::tempdir().unwrap();
    {
        let db = open_db(&dir);
        updater(vec![blob(&[full_serial_doc(5, &["01"])])])
            .run_cycle(&db)
            .unwrap();
        assert!(db.contains_issuer(ISSUER_DER).unwrap());
        db.request_rebuild();
    }

    // The marker is consumed at the next owner startup: fresh file, no
    // trace of pre-rebuild issuers.
    let db = open_db(&dir);
    assert_eq!(db.content_version().unwrap(), 0);
    assert!(!db.contains_issuer(ISSUER_DER).unwrap());
    assert!(db.lookup(leaf(&[0x01]), ISSUER_DER).is_none());
}

#[test]
fn partial_date_update_preserves_other_bound() {
    let dir = tempfile::tempdir().unwrap();
    let db = open_db(&dir);

    let mut seeded = full_serial_doc(5, &["01"]);
    seeded.update[0].not_before = Some(1_000.0);
    seeded.update[0].not_after = Some(9_000.0);

    let partial = UpdateDocument {
        version: Some(6),
        update: vec![GroupUpdate {
            issuers: vec![hex::encode(sha256(ISSUER_DER))],
            not_before: Some(2_000.0),
            ..GroupUpdate::default()
        }],
        ..UpdateDocument::default()
    };

    let up = updater(vec![blob(&[seeded]), blob(&[partial])]);
    up.run_cycle(&db).unwrap();
    up.run_cycle(&db).unwrap();

    let info = db.lookup(leaf(&[0x01]), ISSUER_DER).unwrap();
    assert!(info.has_date_constraints());
    assert_eq!(info.not_before, Some(2_000.0));
    assert_eq!(info.not_after, Some(9_000.0), "untouched bound must survive");
}

#[test]
fn lookups_survive_cache_eviction() {
    let dir = tempfile::tempdir().unwrap();
    let db = open_db(&dir);

    // One group revoking serial 0x00; 101 distinct leaves overflow the
    // 100-entry result cache.
    updater(vec![blob(&[full_serial_doc(5, &["00"])])])
        .run_cycle(&db)
        .unwrap();

    let ders: Vec<Vec<u8>> = (0u8..=100).map(|n| vec![b'L', n]).collect();
    for (n, der) in ders.iter().enumerate() {
        let cert = CertificateRef {
            der,
            serial: &[n as u8],
        };
        let info = db.lookup(cert, ISSUER_DER).unwrap();
        assert_eq!(info.on_list, n == 0);
    }

    // The first leaf was evicted; this answer comes from a fresh database
    // read and must still be correct.
    let cert = CertificateRef {
        der: &ders[0],
        serial: &[0x00],
    };
    assert!(db.lookup(cert, ISSUER_DER).unwrap().on_list);
}
