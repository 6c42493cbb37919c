//! Record fingerprinting.
//!
//! A fingerprint is the dedupe key for a record: a SHA-256 digest over the
//! identity-bearing fields (category, source, document id, normalized text).
//! It must be stable across process restarts and implementations, so the
//! input is a fixed field order with explicit separators and the text is
//! normalized before hashing. Timestamps never participate.

use sha2::{Digest, Sha256};

use crate::error::{LeadscopeError, Result};
use crate::models::RawRecord;

/// Separator written between fields so that ("ab","c") and ("a","bc")
/// cannot collide.
const FIELD_SEP: [u8; 1] = [0x1f];

/// Compute the identity digest for a raw record.
///
/// Fails with [`LeadscopeError::MissingIdentityField`] if category, source,
/// or document id is absent or blank — hashing a partial identity would
/// create false duplicates or false uniqueness downstream.
pub fn fingerprint_record(raw: &RawRecord) -> Result<String> {
    let category = require("category", Some(&raw.category))?;
    let source = require("source", Some(&raw.source))?;
    let doc_id = require("doc_id", raw.doc_id.as_deref())?;

    let text = normalize_text(raw.snippet.as_deref().unwrap_or(""));

    let mut hasher = Sha256::new();
    hasher.update(category.as_bytes());
    hasher.update(FIELD_SEP);
    hasher.update(source.as_bytes());
    hasher.update(FIELD_SEP);
    hasher.update(doc_id.as_bytes());
    hasher.update(FIELD_SEP);
    hasher.update(text.as_bytes());
    Ok(format!("{:x}", hasher.finalize()))
}

fn require<'a>(name: &'static str, value: Option<&'a str>) -> Result<&'a str> {
    match value {
        Some(v) if !v.trim().is_empty() => Ok(v),
        _ => Err(LeadscopeError::MissingIdentityField(name)),
    }
}

/// Normalize free text for identity purposes: trim, collapse internal
/// whitespace runs to a single space, lowercase. Keeps semantically
/// identical snippets (formatting or casing jitter) on the same digest.
pub fn normalize_text(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}
