//! N-to-1 probabilistic filter matcher.
//!
//! An issuer group in `nto1` format stores a bit vector (`xor`) and a list
//! of 32-bit hash-mixing parameters (`params`) instead of exact serials.
//! Each parameter seeds an FNV-1-style hash folded over the serial bytes;
//! the hash selects one bit of the vector. A clear bit for any parameter
//! proves the serial is not in the set. All bits set means "possibly in the
//! set" — false positives are allowed by design, false negatives are not.
//! The false-positive rate is a publisher-side choice (vector size versus
//! parameter count); this matcher enforces no specific bound.

use std::io::Read;

use crate::error::RevocationError;

/// FNV-1 32-bit prime.
const FNV_PRIME: u32 = 0x0100_0193;

/// Persisted filter blobs start with a big-endian parameter count,
/// followed by that many big-endian `u32` parameters, then the bit vector.
/// The whole blob may additionally be gzip- or zlib-compressed.
const PARAM_SIZE: usize = 4;

/// Seeded 32-bit hash over the serial number bytes.
///
/// Folds byte-by-byte starting from the least-significant (last) byte of
/// the big-endian serial, FNV-1 style: multiply by the FNV prime, then mix
/// in the byte.
fn seeded_hash(seed: u32, serial: &[u8]) -> u32 {
    let mut h = seed;
    for &b in serial.iter().rev() {
        h = h.wrapping_mul(FNV_PRIME) ^ u32::from(b);
    }
    h
}

/// Test a serial number against a filter.
///
/// Returns `false` (certain non-match) as soon as any parameter selects a
/// clear bit; returns `true` (possible match) only if every parameter's
/// bit is set. An empty bit vector or parameter list matches nothing.
pub fn matches(xor: &[u8], params: &[u32], serial: &[u8]) -> bool {
    let nbits = xor.len() * 8;
    if nbits == 0 || params.is_empty() {
        return false;
    }
    for &p in params {
        let idx = seeded_hash(p, serial) as usize % nbits;
        if xor[idx / 8] & (1 << (idx % 8)) == 0 {
            return false;
        }
    }
    true
}

/// Attempt to decompress a stored filter blob.
///
/// Decompression is attempted unconditionally (gzip first, then raw
/// zlib/deflate); if neither applies the bytes are used unchanged.
pub fn inflate(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::new();
    if flate2::read::GzDecoder::new(data).read_to_end(&mut out).is_ok() {
        return out;
    }
    out.clear();
    if flate2::read::ZlibDecoder::new(data).read_to_end(&mut out).is_ok() {
        return out;
    }
    data.to_vec()
}

/// Encode a filter as a storable blob: big-endian parameter count, the
/// parameters, then the bit vector.
pub fn encode_blob(xor: &[u8], params: &[u32]) -> Vec<u8> {
    let mut out = Vec::with_capacity(PARAM_SIZE * (1 + params.len()) + xor.len());
    out.extend_from_slice(&(params.len() as u32).to_be_bytes());
    for p in params {
        out.extend_from_slice(&p.to_be_bytes());
    }
    out.extend_from_slice(xor);
    out
}

/// Decode a stored (possibly compressed) filter blob into its bit vector
/// and parameter list.
pub fn decode_blob(blob: &[u8]) -> Result<(Vec<u8>, Vec<u32>), RevocationError> {
    let raw = inflate(blob);
    if raw.len() < PARAM_SIZE {
        return Err(RevocationError::WireFormat {
            message: format!("filter blob too short: {} bytes", raw.len()),
        });
    }
    let count = u32::from_be_bytes([raw[0], raw[1], raw[2], raw[3]]) as usize;
    let vector_start = PARAM_SIZE + count * PARAM_SIZE;
    if raw.len() < vector_start {
        return Err(RevocationError::WireFormat {
            message: format!(
                "filter blob declares {} params but holds {} bytes",
                count,
                raw.len()
            ),
        });
    }
    let mut params = Vec::with_capacity(count);
    for i in 0..count {
        let off = PARAM_SIZE + i * PARAM_SIZE;
        params.push(u32::from_be_bytes([
            raw[off],
            raw[off + 1],
            raw[off + 2],
            raw[off + 3],
        ]));
    }
    Ok((raw[vector_start..].to_vec(), params))
}

/// Build a bit vector containing the given serials (publisher-side helper,
/// also used by the no-false-negative tests).
pub fn build_vector(nbits: usize, params: &[u32], serials: &[&[u8]]) -> Vec<u8> {
    let mut xor = vec![0u8; nbits.div_ceil(8)];
    let nbits = xor.len() * 8;
    if nbits == 0 {
        return xor;
    }
    for serial in serials {
        for &p in params {
            let idx = seeded_hash(p, serial) as usize % nbits;
            xor[idx / 8] |= 1 << (idx % 8);
        }
    }
    xor
}
