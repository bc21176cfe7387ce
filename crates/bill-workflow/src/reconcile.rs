//! Dual-Store Reconciliation
//!
//! After a committed review, the GST-invoice projection must carry the same
//! status and remark blob as its primary record. Matching is by IREPS bill
//! number; anything other than exactly one match is refused, because
//! duplicate bill numbers are a known data-quality condition and guessing
//! among them would corrupt the projection. The primary record stays
//! authoritative either way.

use chrono::{DateTime, Utc};

use bill_ledger::ReviewStatus;
use bill_store::GstInvoiceRecord;

/// Error type for reconciliation. Reported and queued for retry; never
/// blocks or rolls back the primary write.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ReconciliationError {
    #[error("no GST invoice record carries bill number {0}")]
    NotFound(String),

    #[error("{count} GST invoice records carry bill number {reference}; refusing to pick one")]
    Ambiguous { reference: String, count: usize },
}

/// Copy a committed review onto the single matching projection record.
/// Returns the updated record for the caller to persist; performs no
/// mutation itself on zero or multiple matches.
pub fn reconcile(
    authorization_ref: &str,
    status: ReviewStatus,
    remark_blob: &str,
    snapshot: &[GstInvoiceRecord],
    now: DateTime<Utc>,
) -> Result<GstInvoiceRecord, ReconciliationError> {
    let mut matches = snapshot
        .iter()
        .filter(|record| record.authorization_ref == authorization_ref);

    let first = matches
        .next()
        .ok_or_else(|| ReconciliationError::NotFound(authorization_ref.to_string()))?;

    let extra = matches.count();
    if extra > 0 {
        return Err(ReconciliationError::Ambiguous {
            reference: authorization_ref.to_string(),
            count: extra + 1,
        });
    }

    let mut updated = first.clone();
    updated.status = status;
    updated.remark_blob = remark_blob.to_string();
    updated.synced_at = Some(now);
    Ok(updated)
}
