//! Content digests.
//!
//! Every stored record carries a digest of its key and encoded fields in
//! [`DIGEST_FIELD`]. Reads recompute it to detect corruption or out-of-band
//! edits. The back-reference field is excluded because it is written by other
//! records.

use crate::config::HashAlgorithm;
use crate::record::Record;
use crate::types::CorruptionPolicy;
use serde_json::{Map, Value as Json};
use std::collections::BTreeMap;

/// Reserved field holding the content digest.
pub const DIGEST_FIELD: &str = "__digest__";

/// Reserved field holding the back-references of a record.
pub const BACK_REFERENCES_FIELD: &str = "__fks__";

/// Returns true for names of the form `__name__`.
#[must_use]
pub fn is_reserved(name: &str) -> bool {
    name.len() >= 4 && name.starts_with("__") && name.ends_with("__")
}

/// Outcome of checking a stored record against its digest.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verification {
    /// The digest matches.
    Valid,
    /// The digest does not match the stored fields.
    Mismatch,
    /// No digest is stored.
    Missing,
}

impl Verification {
    /// Returns true for [`Verification::Valid`].
    #[must_use]
    pub fn is_valid(self) -> bool {
        self == Verification::Valid
    }
}

fn canonical(fields: &BTreeMap<String, String>) -> String {
    let object: Map<String, Json> = fields
        .iter()
        .filter(|(name, _)| !is_reserved(name))
        .map(|(name, value)| (name.clone(), Json::String(value.clone())))
        .collect();
    Json::Object(object).to_string()
}

/// Computes the digest of a record stored under `key`.
///
/// Reserved fields in `fields` are ignored.
#[must_use]
pub fn stamp(key: &str, fields: &BTreeMap<String, String>, algorithm: HashAlgorithm) -> String {
    let mut input = key.as_bytes().to_vec();
    input.extend_from_slice(canonical(fields).as_bytes());
    algorithm.hex_digest(&input)
}

/// Checks the raw stored fields of `key` against their stored digest.
#[must_use]
pub fn verify(key: &str, raw: &BTreeMap<String, String>, algorithm: HashAlgorithm) -> Verification {
    match raw.get(DIGEST_FIELD) {
        None => Verification::Missing,
        Some(stored) if *stored == stamp(key, raw, algorithm) => Verification::Valid,
        Some(_) => Verification::Mismatch,
    }
}

/// Applies `policy` to a decoded record. `None` means the record is dropped.
pub(crate) fn apply_policy(
    mut record: Record,
    verification: Verification,
    policy: CorruptionPolicy,
) -> Option<Record> {
    if verification.is_valid() {
        return Some(record);
    }
    match policy {
        CorruptionPolicy::Flag => {
            record.flag_corrupt();
            Some(record)
        }
        CorruptionPolicy::Skip => None,
        CorruptionPolicy::Ignore => Some(record),
    }
}
