//! Review Commit
//!
//! Applies a batch of human-review overrides to a ledger and produces the
//! re-encoded remark blob plus the freshly derived status for the caller to
//! persist. Batches have partial-failure semantics: one bad entry is
//! reported and skipped, the rest of the batch still applies.

use chrono::{DateTime, Utc};
use tracing::warn;

use crate::finding::MatchStatus;
use crate::ledger::{LedgerError, ReviewLedger, ReviewStatus};
use crate::remark::{self, EncodeError};

/// One manual override against a ledger index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReviewOverride {
    pub index: usize,
    pub status: MatchStatus,
    pub remark: Option<String>,
}

impl ReviewOverride {
    pub fn new(index: usize, status: MatchStatus) -> Self {
        Self {
            index,
            status,
            remark: None,
        }
    }

    pub fn with_remark(mut self, remark: impl Into<String>) -> Self {
        self.remark = Some(remark.into());
        self
    }
}

/// Per-entry failure inside an override batch. Never aborts the batch.
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum OverrideError {
    #[error("override {position}: index {index} out of range for ledger of {len} findings")]
    IndexOutOfRange {
        position: usize,
        index: usize,
        len: usize,
    },
}

/// Outcome of committing an override batch.
#[derive(Debug, Clone)]
pub struct ReviewCommit {
    pub ledger: ReviewLedger,
    pub remark_blob: String,
    pub status: ReviewStatus,
    pub errors: Vec<OverrideError>,
}

/// Remark text crosses into the bullet-line grammar, where line breaks and
/// the bullet glyph are structural.
fn sanitize_remark(remark: &str) -> String {
    remark
        .replace(['\r', '\n'], " ")
        .replace(remark::BULLET, "-")
        .trim()
        .to_string()
}

/// Apply `overrides` in order (a later entry wins on a duplicate index),
/// then re-derive the status and re-encode the blob.
///
/// Out-of-range entries are skipped and reported individually. Encoding
/// fails only when the incoming ledger itself carries unencodable text
/// (a degraded legacy blob with a bullet glyph inside a line body);
/// override remarks are sanitized here.
pub fn commit_review(
    mut ledger: ReviewLedger,
    overrides: &[ReviewOverride],
    now: DateTime<Utc>,
) -> Result<ReviewCommit, EncodeError> {
    let mut errors = Vec::new();

    for (position, entry) in overrides.iter().enumerate() {
        let remark = entry.remark.as_deref().map(sanitize_remark);
        if let Err(LedgerError::IndexOutOfRange { index, len }) =
            ledger.apply_override(entry.index, entry.status, remark.as_deref(), now)
        {
            warn!(position, index, len, "skipping out-of-range override");
            errors.push(OverrideError::IndexOutOfRange {
                position,
                index,
                len,
            });
        }
    }

    let remark_blob = remark::encode(&ledger)?;
    let status = ledger.status();
    Ok(ReviewCommit {
        ledger,
        remark_blob,
        status,
        errors,
    })
}
