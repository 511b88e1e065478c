//! Property-based tests for the revocation database engine.
//!
//! These tests verify the probabilistic-filter guarantee, flag-merge
//! semantics, wire framing and result-cache bounds.

use proptest::prelude::*;

use trustd_revocation::cache::LookupCache;
use trustd_revocation::filter;
use trustd_revocation::types::ValidInfo;
use trustd_revocation::wire;
use trustd_revocation::{
    FlagUpdates, GroupFlags, GroupUpdate, RevocationFormat, UpdateDocument, WIRE_FORMAT_VERSION,
};

/// Strategy for serial numbers (1 to 20 bytes, as seen in real
/// certificates).
fn serial_strategy() -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(any::<u8>(), 1..=20)
}

/// Strategy for a small set of distinct serials.
fn serial_set_strategy() -> impl Strategy<Value = Vec<Vec<u8>>> {
    prop::collection::btree_set(serial_strategy(), 1..32)
        .prop_map(|set| set.into_iter().collect())
}

/// Strategy for filter hash-mixing parameters.
fn params_strategy() -> impl Strategy<Value = Vec<u32>> {
    prop::collection::vec(any::<u32>(), 1..8)
}

/// Strategy for named flag updates.
fn flag_updates_strategy() -> impl Strategy<Value = FlagUpdates> {
    (
        any::<Option<bool>>(),
        any::<Option<bool>>(),
        any::<Option<bool>>(),
        any::<Option<bool>>(),
        any::<Option<bool>>(),
    )
        .prop_map(|(complete, check_ocsp, known_only, require_ct, allowed)| FlagUpdates {
            complete,
            check_ocsp,
            known_only,
            require_ct,
            allowed,
            ..FlagUpdates::default()
        })
}

/// Strategy for update documents with arbitrary bodies.
fn document_strategy() -> impl Strategy<Value = UpdateDocument> {
    (
        any::<Option<u64>>(),
        any::<Option<u64>>(),
        any::<bool>(),
        prop::collection::vec("[0-9a-f]{64}", 0..4),
        prop::collection::vec(
            ("[0-9a-f]{64}", flag_updates_strategy(), prop::collection::vec("[0-9a-f]{2,16}", 0..8)),
            0..4,
        ),
    )
        .prop_map(|(version, check_again, full, delete, groups)| UpdateDocument {
            version,
            check_again,
            full,
            delete,
            update: groups
                .into_iter()
                .map(|(issuer, flags, add)| GroupUpdate {
                    issuers: vec![issuer],
                    flags,
                    format: Some("serial".into()),
                    add,
                    ..GroupUpdate::default()
                })
                .collect(),
        })
}

fn info_for(cert: [u8; 32], issuer: [u8; 32]) -> ValidInfo {
    ValidInfo {
        format: RevocationFormat::SerialList,
        flags: GroupFlags::default(),
        on_list: false,
        cert_hash: cert,
        issuer_hash: issuer,
        anchor_hash: None,
        not_before: None,
        not_after: None,
        name_constraints: None,
        policy_constraints: None,
    }
}

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 256,
        max_shrink_iters: 1000,
        ..ProptestConfig::default()
    })]

    // ========================================================================
    // Probabilistic Filter Properties
    // ========================================================================

    /// Every encoded serial matches: the filter may report false positives
    /// but never a false negative.
    #[test]
    fn filter_never_misses_encoded_serial(
        serials in serial_set_strategy(),
        params in params_strategy(),
        nbits in 64usize..4096
    ) {
        let refs: Vec<&[u8]> = serials.iter().map(Vec::as_slice).collect();
        let xor = filter::build_vector(nbits, &params, &refs);
        for serial in &refs {
            prop_assert!(filter::matches(&xor, &params, serial));
        }
    }

    /// An all-zero vector matches nothing.
    #[test]
    fn filter_empty_vector_matches_nothing(
        serial in serial_strategy(),
        params in params_strategy(),
        nbytes in 1usize..256
    ) {
        let xor = vec![0u8; nbytes];
        prop_assert!(!filter::matches(&xor, &params, &serial));
    }

    /// Blob encoding round-trips through (possibly compressed) storage.
    #[test]
    fn filter_blob_roundtrip(
        params in params_strategy(),
        xor in prop::collection::vec(any::<u8>(), 0..512)
    ) {
        let blob = filter::encode_blob(&xor, &params);
        let (got_xor, got_params) = filter::decode_blob(&blob).unwrap();
        prop_assert_eq!(got_xor, xor);
        prop_assert_eq!(got_params, params);
    }

    // ========================================================================
    // Flag Merge Properties
    // ========================================================================

    /// Merging is idempotent: applying the same updates twice equals once.
    #[test]
    fn flag_merge_idempotent(
        bits in any::<u32>(),
        updates in flag_updates_strategy()
    ) {
        let flags = GroupFlags::from_bits(bits);
        let (once, _) = flags.merge(&updates);
        let (twice, changed) = once.merge(&updates);
        prop_assert_eq!(once, twice);
        prop_assert!(!changed);
    }

    /// An empty update never changes anything.
    #[test]
    fn flag_merge_empty_is_identity(bits in any::<u32>()) {
        let flags = GroupFlags::from_bits(bits);
        let (merged, changed) = flags.merge(&FlagUpdates::default());
        prop_assert_eq!(merged, flags);
        prop_assert!(!changed);
    }

    /// Bits with no named update are never touched.
    #[test]
    fn flag_merge_preserves_unnamed_bits(
        bits in any::<u32>(),
        updates in flag_updates_strategy()
    ) {
        let reserved = bits & !0xff; // bits 8.. have no named update here
        let (merged, _) = GroupFlags::from_bits(bits).merge(&updates);
        prop_assert_eq!(merged.bits() & !0xff, reserved);
    }

    // ========================================================================
    // Wire Framing Properties
    // ========================================================================

    /// Any document list survives encode → split → decode unchanged.
    #[test]
    fn wire_roundtrip(
        docs in prop::collection::vec(document_strategy(), 1..5),
        signature in prop::collection::vec(any::<u8>(), 0..128)
    ) {
        let raw = wire::encode(&docs, WIRE_FORMAT_VERSION, &signature).unwrap();
        let frame = wire::split_frame(&raw).unwrap();
        prop_assert_eq!(frame.signature, signature.as_slice());

        let decoded: Vec<_> = wire::decode(frame.payload, WIRE_FORMAT_VERSION, 0)
            .unwrap()
            .map(|item| item.map(|(doc, _)| doc))
            .collect::<Result<_, _>>()
            .unwrap();
        prop_assert_eq!(decoded, docs);
    }

    /// Truncating a framed blob anywhere never panics; it either still
    /// splits (truncation hit the signature's slack) or errors cleanly.
    #[test]
    fn wire_truncation_never_panics(
        docs in prop::collection::vec(document_strategy(), 1..3),
        cut in any::<prop::sample::Index>()
    ) {
        let raw = wire::encode(&docs, WIRE_FORMAT_VERSION, b"sig").unwrap();
        let cut = cut.index(raw.len());
        let _ = wire::split_frame(&raw[..cut]);
    }

    // ========================================================================
    // Result Cache Properties
    // ========================================================================

    /// The cache never exceeds its capacity, and the most recent insert is
    /// always retrievable.
    #[test]
    fn cache_bounded_and_mru_retained(
        certs in prop::collection::vec(any::<[u8; 32]>(), 1..300),
        capacity in 1usize..50
    ) {
        let cache = LookupCache::new(capacity);
        let issuer = [0xee; 32];
        let mut last = None;
        for cert in &certs {
            let key = LookupCache::key(cert, &issuer);
            cache.put(key, info_for(*cert, issuer));
            last = Some((key, *cert));
        }
        prop_assert!(cache.len() <= capacity);
        let (key, cert) = last.unwrap();
        prop_assert!(cache.get(&key, &cert, &issuer).is_some());
    }
}
