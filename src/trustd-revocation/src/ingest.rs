//! Applying decoded update documents to the store.
//!
//! The update scheduler opens one immediate write transaction per update
//! cycle and feeds every document of the cycle through
//! [`apply_document`], then [`finalize_cycle`]. Any failure aborts the
//! surrounding transaction, so partial application of a document is never
//! visible to readers.

use rusqlite::Transaction;
use tracing::{debug, info, warn};

use crate::error::RevocationError;
use crate::filter;
use crate::store::{
    self, admin_get_int, admin_set_int, delete_all_groups, delete_group, group_id_for_issuer,
    group_row, GroupRow,
};
use crate::types::{admin_keys, GroupFlags, RevocationFormat};
use crate::wire::{GroupUpdate, UpdateDocument};

/// Wide-open default bounds written when a document sets date constraints
/// without supplying one of them and no prior bound exists.
const DEFAULT_NOT_BEFORE: f64 = 0.0;
/// 9999-12-31T23:59:59Z.
const DEFAULT_NOT_AFTER: f64 = 253_402_300_799.0;

/// State carried across the documents of one update cycle.
#[derive(Debug, Default)]
pub struct IngestContext {
    /// Whether any document of this cycle declared itself full/rebuild.
    pub full: bool,
    /// Content version declared by the first document.
    pub version: Option<u64>,
    /// Suggested seconds until the next check, from the first document.
    pub check_again: Option<u64>,
}

fn decode_hex(s: &str, what: &str) -> Result<Vec<u8>, RevocationError> {
    hex::decode(s).map_err(|e| RevocationError::WireFormat {
        message: format!("bad hex {what} {s:?}: {e}"),
    })
}

/// Apply one decoded, already-authenticated update document inside the
/// caller's open write transaction.
pub fn apply_document(
    tx: &Transaction<'_>,
    ctx: &mut IngestContext,
    doc: &UpdateDocument,
    is_first: bool,
) -> Result<(), RevocationError> {
    if doc.full && !ctx.full {
        // A rebuild never merges with prior state: drop everything and
        // reset the content version before repopulating.
        info!("full update: clearing all issuer groups");
        delete_all_groups(tx)?;
        admin_set_int(tx, admin_keys::VERSION, 0)?;
        ctx.full = true;
    }
    if is_first {
        ctx.version = doc.version;
        ctx.check_again = doc.check_again;
    }

    for issuer in &doc.delete {
        let hash = decode_hex(issuer, "issuer hash")?;
        match group_id_for_issuer(tx, &hash)? {
            Some(gid) => {
                debug!(groupid = gid, "deleting issuer group");
                delete_group(tx, gid)?;
            },
            None => debug!(issuer = %issuer, "delete for unknown issuer, ignoring"),
        }
    }

    for group in &doc.update {
        apply_group_update(tx, ctx, group)?;
    }
    Ok(())
}

/// Create or update one issuer group.
fn apply_group_update(
    tx: &Transaction<'_>,
    ctx: &IngestContext,
    gu: &GroupUpdate,
) -> Result<(), RevocationError> {
    let issuer_hashes: Vec<Vec<u8>> = gu
        .issuers
        .iter()
        .map(|s| decode_hex(s, "issuer hash"))
        .collect::<Result<_, _>>()?;
    if issuer_hashes.is_empty() {
        return Err(RevocationError::WireFormat {
            message: "group update without issuer hashes".into(),
        });
    }

    let explicit_format = gu
        .format
        .as_deref()
        .map(|s| {
            RevocationFormat::from_wire(s).ok_or_else(|| RevocationError::WireFormat {
                message: format!("unknown group format {s:?}"),
            })
        })
        .transpose()?;

    // Full updates never merge with prior state.
    let mut existing: Option<GroupRow> = None;
    if !ctx.full {
        for hash in &issuer_hashes {
            if let Some(gid) = group_id_for_issuer(tx, hash)? {
                existing = group_row(tx, gid)?;
                if existing.is_some() {
                    break;
                }
            }
        }
    }

    // An explicit format that differs from the stored one forces deletion
    // and recreation: row shapes are format-specific and are not merged.
    if let (Some(row), Some(format)) = (&existing, explicit_format) {
        if row.format != format {
            debug!(groupid = row.groupid, "format change, recreating group");
            delete_group(tx, row.groupid)?;
            existing = None;
        }
    }

    let (gid, stored_flags, format, prior_data) = match existing {
        Some(row) => {
            // The issuer-hash set is always replaced, never merged.
            store::delete_issuers_for_group(tx, row.groupid)?;
            (row.groupid, row.flags, row.format, row.data)
        },
        None => {
            let format = explicit_format.ok_or_else(|| RevocationError::WireFormat {
                message: "new issuer group without a declared format".into(),
            })?;
            let gid = store::insert_group(tx, GroupFlags::default(), format, None)?;
            (gid, GroupFlags::default(), format, None)
        },
    };

    let (mut flags, _) = stored_flags.merge(&gu.flags);

    // Probabilistic-filter blob: missing sub-fields inherit the group's
    // existing values; the bit vector merges via byte-wise xor against a
    // length-adjusted copy of the prior vector.
    let data = if format == RevocationFormat::Nto1 {
        merge_filter(gu, prior_data)?
    } else {
        None
    };

    for hash in &issuer_hashes {
        store::insert_issuer(tx, gid, hash)?;
    }

    apply_identifiers(tx, gid, format, gu)?;

    if gu.not_before.is_some() || gu.not_after.is_some() {
        // A partial update must not silently erase a previously-set bound:
        // the missing side is filled from the existing row before any
        // default applies.
        let prior = if ctx.full { None } else { store::get_dates(tx, gid)? };
        let notbefore = gu
            .not_before
            .or(prior.map(|p| p.0))
            .unwrap_or(DEFAULT_NOT_BEFORE);
        let notafter = gu
            .not_after
            .or(prior.map(|p| p.1))
            .unwrap_or(DEFAULT_NOT_AFTER);
        store::set_dates(tx, gid, notbefore, notafter)?;
        // Once set, this flag is only ever removed by a format change
        // deleting the group outright.
        flags.insert(GroupFlags::DATE_CONSTRAINTS);
    }

    store::update_group(tx, gid, flags, format, data.as_deref())?;
    Ok(())
}

fn merge_filter(
    gu: &GroupUpdate,
    prior_data: Option<Vec<u8>>,
) -> Result<Option<Vec<u8>>, RevocationError> {
    let Some(fu) = &gu.filter else {
        return Ok(prior_data);
    };
    let (prior_xor, prior_params) = match &prior_data {
        Some(blob) => filter::decode_blob(blob)?,
        None => (Vec::new(), Vec::new()),
    };
    let params = fu.params.clone().unwrap_or(prior_params);
    let xor = match &fu.xor {
        Some(b64) => {
            use base64::Engine;
            let incoming = base64::engine::general_purpose::STANDARD
                .decode(b64)
                .map_err(|e| RevocationError::WireFormat {
                    message: format!("bad filter bit vector: {e}"),
                })?;
            let mut merged = prior_xor;
            merged.resize(incoming.len(), 0);
            for (m, b) in merged.iter_mut().zip(&incoming) {
                *m ^= b;
            }
            merged
        },
        None => prior_xor,
    };
    Ok(Some(filter::encode_blob(&xor, &params)))
}

fn apply_identifiers(
    tx: &Transaction<'_>,
    gid: i64,
    format: RevocationFormat,
    gu: &GroupUpdate,
) -> Result<(), RevocationError> {
    if format == RevocationFormat::Nto1 {
        if !gu.add.is_empty() || !gu.remove.is_empty() {
            warn!(groupid = gid, "identifier lists on an nto1 group, ignoring");
        }
        return Ok(());
    }

    for ident in &gu.add {
        let bytes = decode_hex(ident, "identifier")?;
        match format {
            RevocationFormat::SerialList => store::insert_serial(tx, gid, &bytes)?,
            RevocationFormat::HashList => store::insert_hash(tx, gid, &bytes)?,
            RevocationFormat::Nto1 => unreachable!("handled above"),
        }
    }
    for ident in &gu.remove {
        if ident == "*" {
            match format {
                RevocationFormat::SerialList => store::delete_all_serials(tx, gid)?,
                RevocationFormat::HashList => store::delete_all_hashes(tx, gid)?,
                RevocationFormat::Nto1 => unreachable!("handled above"),
            }
            continue;
        }
        // A leading '*' only marks the entry as a deletion; the identifier
        // itself follows.
        let bytes = decode_hex(ident.strip_prefix('*').unwrap_or(ident), "identifier")?;
        match format {
            RevocationFormat::SerialList => store::delete_serial(tx, gid, &bytes)?,
            RevocationFormat::HashList => store::delete_hash(tx, gid, &bytes)?,
            RevocationFormat::Nto1 => unreachable!("handled above"),
        }
    }
    Ok(())
}

/// Persist cycle-level state after every document has been applied.
///
/// The content version only ever increases, except across a full update
/// which already reset it to 0 before rebuilding.
pub fn finalize_cycle(tx: &Transaction<'_>, ctx: &IngestContext) -> Result<(), RevocationError> {
    if let Some(version) = ctx.version {
        let stored = admin_get_int(tx, admin_keys::VERSION)?.unwrap_or(0).max(0) as u64;
        if ctx.full || version > stored {
            admin_set_int(tx, admin_keys::VERSION, version as i64)?;
        }
    }
    // Self-heal admin rows an old writer may have left unset.
    if admin_get_int(tx, admin_keys::DB_VERSION)?.is_none() {
        admin_set_int(tx, admin_keys::DB_VERSION, crate::types::SCHEMA_VERSION)?;
    }
    if admin_get_int(tx, admin_keys::DB_FORMAT)?.is_none() {
        admin_set_int(
            tx,
            admin_keys::DB_FORMAT,
            i64::from(crate::types::WIRE_FORMAT_VERSION),
        )?;
    }
    Ok(())
}
