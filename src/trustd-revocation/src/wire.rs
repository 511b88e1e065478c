//! Update wire format: framing and document decoding.
//!
//! An update blob is framed as:
//!
//! ```text
//! ┌────────────┬─────────────────┬────────────┬───────────────┐
//! │ u32 BE len │ signed payload  │ u32 BE len │ detached sig  │
//! └────────────┴─────────────────┴────────────┴───────────────┘
//! ```
//!
//! Inside the signed payload, format 3 carries a big-endian chunk count
//! followed by `{u32 BE len, JSON document}` pairs. Document 1 carries the
//! content version and the suggested next-check interval; documents 2..N
//! carry only update bodies and continue document 1's version. Format 2
//! omits the count and holds exactly one document.
//!
//! Decoding is lazy and stops early once a document declares a content
//! version the caller already has — the remaining chunks are guaranteed
//! redundant and are skipped, not treated as an error.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::RevocationError;
use crate::types::{FlagUpdates, MIN_WIRE_FORMAT_VERSION, WIRE_FORMAT_VERSION};

/// One structured update document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UpdateDocument {
    /// Content version this update brings the database to. Only meaningful
    /// on the first document of a payload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<u64>,
    /// Suggested seconds until the next update check. First document only.
    #[serde(default, rename = "check-again", skip_serializing_if = "Option::is_none")]
    pub check_again: Option<u64>,
    /// Whether this update replaces the entire dataset.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub full: bool,
    /// Hex-encoded issuer hashes whose groups are to be deleted.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub delete: Vec<String>,
    /// Per-issuer-group create/update entries.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub update: Vec<GroupUpdate>,
}

/// One issuer-group entry inside an update document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GroupUpdate {
    /// Hex-encoded SHA-256 digests of the issuer certificates this group
    /// covers. The stored issuer set is always replaced, never merged.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub issuers: Vec<String>,
    /// Named flag set/clear operations.
    #[serde(flatten)]
    pub flags: FlagUpdates,
    /// Explicit format (`"serial"`, `"sha256"`, `"nto1"`). Changing an
    /// existing group's format forces deletion and recreation of the group.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
    /// Probabilistic-filter sub-fields; missing sub-fields inherit the
    /// group's existing values.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter: Option<FilterUpdate>,
    /// Hex-encoded identifiers (serials or hashes, per format) to insert.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub add: Vec<String>,
    /// Hex-encoded identifiers to remove; the single entry `"*"` removes
    /// every identifier of the group.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub remove: Vec<String>,
    /// Group-wide validity lower bound (Unix seconds).
    #[serde(default, rename = "not-before", skip_serializing_if = "Option::is_none")]
    pub not_before: Option<f64>,
    /// Group-wide validity upper bound (Unix seconds).
    #[serde(default, rename = "not-after", skip_serializing_if = "Option::is_none")]
    pub not_after: Option<f64>,
}

/// Probabilistic-filter update sub-fields.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FilterUpdate {
    /// Base64-encoded bit vector. Combined with the group's existing
    /// vector via byte-wise exclusive-or.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub xor: Option<String>,
    /// Replacement hash-mixing parameters.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Vec<u32>>,
}

/// The two length-prefixed sections of a raw update blob.
#[derive(Debug, Clone, Copy)]
pub struct SignedFrame<'a> {
    /// The signed payload (chunked documents).
    pub payload: &'a [u8],
    /// The detached signature block over the payload.
    pub signature: &'a [u8],
}

fn read_len(buf: &[u8], what: &str) -> Result<(usize, usize), RevocationError> {
    if buf.len() < 4 {
        return Err(RevocationError::WireFormat {
            message: format!("truncated {what} length field"),
        });
    }
    let len = u32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]]) as usize;
    if buf.len() - 4 < len {
        return Err(RevocationError::WireFormat {
            message: format!("{what} length {} exceeds remaining {} bytes", len, buf.len() - 4),
        });
    }
    Ok((len, 4))
}

/// Split a raw update blob into its signed payload and detached signature.
pub fn split_frame(raw: &[u8]) -> Result<SignedFrame<'_>, RevocationError> {
    let (payload_len, header) = read_len(raw, "payload")?;
    let payload = &raw[header..header + payload_len];
    let rest = &raw[header + payload_len..];
    let (sig_len, header) = read_len(rest, "signature")?;
    let signature = &rest[header..header + sig_len];
    Ok(SignedFrame { payload, signature })
}

/// Lazy, finite, non-restartable stream of decoded update documents.
pub struct DocumentStream<'a> {
    buf: &'a [u8],
    /// Chunks left to read. Format 2 payloads are treated as one chunk
    /// spanning the whole buffer.
    remaining: u32,
    chunked: bool,
    first: bool,
    have_version: u64,
    stale: Option<u64>,
    done: bool,
}

impl<'a> DocumentStream<'a> {
    /// When decoding stopped because a document declared a content version
    /// the caller already has, the redundant version.
    pub fn stale_version(&self) -> Option<u64> {
        self.stale
    }

    fn next_document(&mut self) -> Result<Option<(UpdateDocument, bool)>, RevocationError> {
        if self.done || self.remaining == 0 {
            return Ok(None);
        }
        let chunk = if self.chunked {
            let (len, header) = read_len(self.buf, "chunk")?;
            let chunk = &self.buf[header..header + len];
            self.buf = &self.buf[header + len..];
            chunk
        } else {
            std::mem::take(&mut self.buf)
        };
        self.remaining -= 1;

        let doc: UpdateDocument =
            serde_json::from_slice(chunk).map_err(|e| RevocationError::WireFormat {
                message: format!("chunk does not deserialize: {e}"),
            })?;

        let is_first = self.first;
        self.first = false;

        // A version we already have makes every remaining chunk redundant.
        if let Some(v) = doc.version {
            if v <= self.have_version && self.have_version > 0 {
                debug!(version = v, have = self.have_version, "update already applied, skipping");
                self.stale = Some(v);
                self.done = true;
                return Ok(None);
            }
        }
        Ok(Some((doc, is_first)))
    }
}

impl<'a> Iterator for DocumentStream<'a> {
    type Item = Result<(UpdateDocument, bool), RevocationError>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.next_document() {
            Ok(Some(item)) => Some(Ok(item)),
            Ok(None) => None,
            Err(e) => {
                self.done = true;
                Some(Err(e))
            },
        }
    }
}

/// Decode a signed payload into a document stream.
///
/// `format` is the wire format version the source publishes; `have_version`
/// is the content version already in the database (0 if none), used to
/// stop decoding early on redundant updates.
pub fn decode(
    payload: &[u8],
    format: u32,
    have_version: u64,
) -> Result<DocumentStream<'_>, RevocationError> {
    if !(MIN_WIRE_FORMAT_VERSION..=WIRE_FORMAT_VERSION).contains(&format) {
        return Err(RevocationError::UnsupportedWireFormat {
            found: format,
            minimum: MIN_WIRE_FORMAT_VERSION,
        });
    }
    if format < WIRE_FORMAT_VERSION {
        // Single unchunked document.
        return Ok(DocumentStream {
            buf: payload,
            remaining: 1,
            chunked: false,
            first: true,
            have_version,
            stale: None,
            done: false,
        });
    }
    if payload.len() < 4 {
        return Err(RevocationError::WireFormat {
            message: "truncated chunk count".into(),
        });
    }
    let count = u32::from_be_bytes([payload[0], payload[1], payload[2], payload[3]]);
    Ok(DocumentStream {
        buf: &payload[4..],
        remaining: count,
        chunked: true,
        first: true,
        have_version,
        stale: None,
        done: false,
    })
}

/// Encode documents into a framed update blob (the publisher-side inverse
/// of [`split_frame`] + [`decode`]).
///
/// The signature block is taken as given; producing a real signature is
/// the trust authority's concern, not this crate's.
pub fn encode(
    documents: &[UpdateDocument],
    format: u32,
    signature: &[u8],
) -> Result<Vec<u8>, RevocationError> {
    let mut payload = Vec::new();
    if format >= WIRE_FORMAT_VERSION {
        payload.extend_from_slice(&(documents.len() as u32).to_be_bytes());
        for doc in documents {
            let body = serde_json::to_vec(doc).map_err(|e| RevocationError::WireFormat {
                message: format!("document does not serialize: {e}"),
            })?;
            payload.extend_from_slice(&(body.len() as u32).to_be_bytes());
            payload.extend_from_slice(&body);
        }
    } else {
        if documents.len() != 1 {
            return Err(RevocationError::WireFormat {
                message: format!("format {format} carries exactly one document"),
            });
        }
        payload = serde_json::to_vec(&documents[0]).map_err(|e| RevocationError::WireFormat {
            message: format!("document does not serialize: {e}"),
        })?;
    }

    let mut out = Vec::with_capacity(8 + payload.len() + signature.len());
    out.extend_from_slice(&(payload.len() as u32).to_be_bytes());
    out.extend_from_slice(&payload);
    out.extend_from_slice(&(signature.len() as u32).to_be_bytes());
    out.extend_from_slice(signature);
    Ok(out)
}
