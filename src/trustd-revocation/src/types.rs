//! Core types shared across the revocation database engine.

use serde::{Deserialize, Serialize};

/// Current on-disk schema version written by this build.
pub const SCHEMA_VERSION: i64 = 7;

/// Oldest schema version this build will read or migrate in place. A
/// database below this floor is discarded and rebuilt rather than
/// transformed, because earlier schema versions may carry silently-dropped
/// rows from prior bugs.
pub const MIN_SUPPORTED_SCHEMA_VERSION: i64 = 5;

/// Newest update wire format this build decodes (chunked documents).
pub const WIRE_FORMAT_VERSION: u32 = 3;

/// Oldest wire format still accepted (single unchunked document).
pub const MIN_WIRE_FORMAT_VERSION: u32 = 2;

/// Keys in the `admin` table.
pub mod admin_keys {
    /// Content version: monotonically increasing per successful update.
    pub const VERSION: &str = "version";
    /// Schema version of the table layout itself.
    pub const DB_VERSION: &str = "db_version";
    /// Wire format version the stored data was decoded from.
    pub const DB_FORMAT: &str = "db_format";
    /// Identity of the server the data was sourced from.
    pub const DB_SOURCE: &str = "db_source";
    /// Next scheduled update check (Unix seconds).
    pub const CHECK_AGAIN: &str = "check_again";
}

/// Matching data format declared by an issuer group.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RevocationFormat {
    /// Exact serial-number set in the `serials` table.
    SerialList,
    /// Exact SHA-256 certificate-digest set in the `hashes` table.
    HashList,
    /// N-to-1 probabilistic filter stored in the group's data blob.
    /// Positive matches may be false; negative matches are certain.
    Nto1,
}

impl RevocationFormat {
    /// Value persisted in the `groups.format` column.
    pub fn as_i64(self) -> i64 {
        match self {
            Self::SerialList => 1,
            Self::HashList => 2,
            Self::Nto1 => 3,
        }
    }

    /// Decode the persisted column value.
    pub fn from_i64(v: i64) -> Option<Self> {
        match v {
            1 => Some(Self::SerialList),
            2 => Some(Self::HashList),
            3 => Some(Self::Nto1),
            _ => None,
        }
    }

    /// Decode the wire-document spelling (`"serial"`, `"sha256"`, `"nto1"`).
    pub fn from_wire(s: &str) -> Option<Self> {
        match s {
            "serial" => Some(Self::SerialList),
            "sha256" => Some(Self::HashList),
            "nto1" => Some(Self::Nto1),
            _ => None,
        }
    }

    /// Wire-document spelling of this format.
    pub fn as_wire(self) -> &'static str {
        match self {
            Self::SerialList => "serial",
            Self::HashList => "sha256",
            Self::Nto1 => "nto1",
        }
    }
}

/// Issuer-group policy flags, persisted as a bitmask in `groups.flags`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GroupFlags(u32);

impl GroupFlags {
    /// The group's identifier set covers every certificate of its issuers.
    pub const COMPLETE: Self = Self(1 << 0);
    /// Certificates matched by this group must be checked via OCSP.
    pub const CHECK_OCSP: Self = Self(1 << 1);
    /// Only issuers listed in the database are acceptable for this group.
    pub const KNOWN_ONLY: Self = Self(1 << 2);
    /// Certificates matched by this group require CT proof.
    pub const REQUIRE_CT: Self = Self(1 << 3);
    /// The identifier set is an allow list, not a revocation list.
    pub const ALLOWED: Self = Self(1 << 4);
    /// Skip the v1 CA-constraint check for this group.
    pub const NO_CA_V1: Self = Self(1 << 5);
    /// Skip the v2 CA-constraint check for this group.
    pub const NO_CA_V2: Self = Self(1 << 6);
    /// A local trust decision may override this group's verdict.
    pub const OVERRIDABLE: Self = Self(1 << 7);
    /// The group carries a row in the `dates` table.
    pub const DATE_CONSTRAINTS: Self = Self(1 << 8);
    /// Reserved: name-constraint blob present.
    pub const NAME_CONSTRAINTS: Self = Self(1 << 9);
    /// Reserved: policy-constraint blob present.
    pub const POLICY_CONSTRAINTS: Self = Self(1 << 10);

    /// Raw bitmask value.
    pub fn bits(self) -> u32 {
        self.0
    }

    /// Construct from a persisted bitmask. Unknown bits are preserved so a
    /// newer publisher does not lose information through an older reader.
    pub fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    /// Check whether all bits of `other` are set.
    pub fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// Set the bits of `other`.
    pub fn insert(&mut self, other: Self) {
        self.0 |= other.0;
    }

    /// Clear the bits of `other`.
    pub fn remove(&mut self, other: Self) {
        self.0 &= !other.0;
    }

    /// Apply a set of named flag updates.
    ///
    /// Each named boolean in `updates` sets or clears its flag; absent
    /// booleans leave the current value untouched. Returns the merged flags
    /// and whether anything changed.
    pub fn merge(self, updates: &FlagUpdates) -> (Self, bool) {
        let mut merged = self;
        let pairs = [
            (updates.complete, Self::COMPLETE),
            (updates.check_ocsp, Self::CHECK_OCSP),
            (updates.known_only, Self::KNOWN_ONLY),
            (updates.require_ct, Self::REQUIRE_CT),
            (updates.allowed, Self::ALLOWED),
            (updates.no_ca_v1, Self::NO_CA_V1),
            (updates.no_ca_v2, Self::NO_CA_V2),
            (updates.overridable, Self::OVERRIDABLE),
        ];
        for (value, flag) in pairs {
            match value {
                Some(true) => merged.insert(flag),
                Some(false) => merged.remove(flag),
                None => {},
            }
        }
        (merged, merged != self)
    }
}

impl std::ops::BitOr for GroupFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

/// Named boolean flag updates carried by an update document.
///
/// This replaces the original string-keyed flag dictionary with a typed
/// merge: each present boolean sets or clears exactly one named flag.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct FlagUpdates {
    /// Set/clear [`GroupFlags::COMPLETE`].
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub complete: Option<bool>,
    /// Set/clear [`GroupFlags::CHECK_OCSP`].
    #[serde(default, rename = "check-ocsp", skip_serializing_if = "Option::is_none")]
    pub check_ocsp: Option<bool>,
    /// Set/clear [`GroupFlags::KNOWN_ONLY`].
    #[serde(default, rename = "known-only", skip_serializing_if = "Option::is_none")]
    pub known_only: Option<bool>,
    /// Set/clear [`GroupFlags::REQUIRE_CT`].
    #[serde(default, rename = "require-ct", skip_serializing_if = "Option::is_none")]
    pub require_ct: Option<bool>,
    /// Set/clear [`GroupFlags::ALLOWED`].
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allowed: Option<bool>,
    /// Set/clear [`GroupFlags::NO_CA_V1`].
    #[serde(default, rename = "no-ca-v1", skip_serializing_if = "Option::is_none")]
    pub no_ca_v1: Option<bool>,
    /// Set/clear [`GroupFlags::NO_CA_V2`].
    #[serde(default, rename = "no-ca-v2", skip_serializing_if = "Option::is_none")]
    pub no_ca_v2: Option<bool>,
    /// Set/clear [`GroupFlags::OVERRIDABLE`].
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub overridable: Option<bool>,
}

/// A leaf certificate as seen by the lookup path.
///
/// The engine performs no X.509 parsing beyond what the caller already did:
/// the raw DER (for the SHA-256 self digest) and the extracted serial
/// number bytes.
#[derive(Debug, Clone, Copy)]
pub struct CertificateRef<'a> {
    /// Raw DER encoding of the certificate.
    pub der: &'a [u8],
    /// Serial number bytes, big-endian as encoded in the certificate.
    pub serial: &'a [u8],
}

/// Result of a revocation lookup for one (certificate, issuer) pair.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidInfo {
    /// Matching format of the issuer group that produced this result.
    pub format: RevocationFormat,
    /// All policy flags of the group.
    pub flags: GroupFlags,
    /// Whether this specific certificate matched the group's identifier
    /// set. For [`RevocationFormat::Nto1`] a `true` here is a *possible*
    /// match; `false` is a certain non-match.
    pub on_list: bool,
    /// SHA-256 digest of the certificate.
    pub cert_hash: [u8; 32],
    /// SHA-256 digest of the issuing certificate.
    pub issuer_hash: [u8; 32],
    /// SHA-256 digest of the anchoring root, when known.
    pub anchor_hash: Option<[u8; 32]>,
    /// Group-wide validity lower bound (Unix seconds), if constrained.
    pub not_before: Option<f64>,
    /// Group-wide validity upper bound (Unix seconds), if constrained.
    pub not_after: Option<f64>,
    /// Reserved: name-constraint blob. Currently never populated.
    pub name_constraints: Option<Vec<u8>>,
    /// Reserved: policy-constraint blob. Currently never populated.
    pub policy_constraints: Option<Vec<u8>>,
}

impl ValidInfo {
    /// Whether the group's identifier set is an allow list.
    pub fn is_allowlisted(&self) -> bool {
        self.flags.contains(GroupFlags::ALLOWED)
    }

    /// Whether a matched certificate must be confirmed via OCSP.
    pub fn should_check_ocsp(&self) -> bool {
        self.flags.contains(GroupFlags::CHECK_OCSP)
    }

    /// Whether a matched certificate requires CT proof.
    pub fn requires_ct(&self) -> bool {
        self.flags.contains(GroupFlags::REQUIRE_CT)
    }

    /// Whether the group constrains validity dates.
    pub fn has_date_constraints(&self) -> bool {
        self.flags.contains(GroupFlags::DATE_CONSTRAINTS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_roundtrip() {
        for f in [
            RevocationFormat::SerialList,
            RevocationFormat::HashList,
            RevocationFormat::Nto1,
        ] {
            assert_eq!(RevocationFormat::from_i64(f.as_i64()), Some(f));
            assert_eq!(RevocationFormat::from_wire(f.as_wire()), Some(f));
        }
        assert_eq!(RevocationFormat::from_i64(0), None);
        assert_eq!(RevocationFormat::from_wire("bloom"), None);
    }

    #[test]
    fn test_flag_merge_additive() {
        let flags = GroupFlags::COMPLETE | GroupFlags::CHECK_OCSP;
        let updates = FlagUpdates {
            check_ocsp: Some(false),
            require_ct: Some(true),
            ..FlagUpdates::default()
        };

        let (merged, changed) = flags.merge(&updates);
        assert!(changed);
        assert!(merged.contains(GroupFlags::COMPLETE)); // untouched
        assert!(!merged.contains(GroupFlags::CHECK_OCSP)); // cleared
        assert!(merged.contains(GroupFlags::REQUIRE_CT)); // set
    }

    #[test]
    fn test_flag_merge_noop() {
        let flags = GroupFlags::ALLOWED;
        let (merged, changed) = flags.merge(&FlagUpdates::default());
        assert!(!changed);
        assert_eq!(merged, flags);
    }

    #[test]
    fn test_unknown_bits_preserved() {
        let flags = GroupFlags::from_bits(1 << 30 | GroupFlags::COMPLETE.bits());
        let (merged, _) = flags.merge(&FlagUpdates {
            allowed: Some(true),
            ..FlagUpdates::default()
        });
        assert_eq!(merged.bits() & (1 << 30), 1 << 30);
    }
}
