//! Review Ledger
//!
//! The ordered collection of field findings belonging to one document
//! record, with aggregate status derivation and the two mutations that
//! touch it: the AI verification ingest and single-finding manual
//! overrides.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::finding::{review_timestamp, FieldFinding, MatchStatus, Reviewer, UNKNOWN};
use crate::remark;

/// Aggregate review status of a document record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReviewStatus {
    Pending,
    Approved,
    Rejected,
}

impl ReviewStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
        }
    }
}

impl std::fmt::Display for ReviewStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for ReviewStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "approved" => Ok(Self::Approved),
            "rejected" => Ok(Self::Rejected),
            _ => Err(format!("Unknown review status: {}", s)),
        }
    }
}

/// Errors raised by ledger mutations.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum LedgerError {
    /// Re-running the AI pass over a populated ledger would discard manual
    /// review; callers wanting a genuine re-verify must `reset` first.
    #[error("ledger already holds {0} findings; re-running verification would discard review")]
    AlreadyReviewed(usize),

    #[error("finding index {index} out of range for ledger of {len} findings")]
    IndexOutOfRange { index: usize, len: usize },
}

/// Ordered list of field findings for one document record.
///
/// The Mismatch-first / Match-second partition is a display and encoding
/// concern; the ledger itself never reorders findings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewLedger {
    findings: Vec<FieldFinding>,
}

impl ReviewLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_findings(findings: Vec<FieldFinding>) -> Self {
        Self { findings }
    }

    pub fn findings(&self) -> &[FieldFinding] {
        &self.findings
    }

    pub fn get(&self, index: usize) -> Option<&FieldFinding> {
        self.findings.get(index)
    }

    pub fn len(&self) -> usize {
        self.findings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.findings.is_empty()
    }

    pub fn mismatch_count(&self) -> usize {
        self.findings
            .iter()
            .filter(|f| f.status.is_mismatch())
            .count()
    }

    /// Derive the aggregate status: any Mismatch rejects, any finding at
    /// all approves, an empty ledger is still pending.
    pub fn status(&self) -> ReviewStatus {
        if self.mismatch_count() > 0 {
            ReviewStatus::Rejected
        } else if self.findings.is_empty() {
            ReviewStatus::Pending
        } else {
            ReviewStatus::Approved
        }
    }

    /// Discard all findings, returning the ledger to pending. The explicit
    /// entry point for an intentional re-verify.
    pub fn reset(&mut self) {
        self.findings.clear();
    }

    /// Populate the ledger from the verification service's two result
    /// lists, Mismatch findings first. Guarded: only a pending (empty)
    /// ledger may be ingested into.
    ///
    /// Result lines may arrive bare or already carrying provenance; each is
    /// parsed through the codec productions, and findings missing a
    /// reviewer or review time are stamped `AI` at `now`.
    pub fn ingest_ai_result(
        &mut self,
        matched: &[String],
        unmatched: &[String],
        now: DateTime<Utc>,
    ) -> Result<(), LedgerError> {
        if !self.findings.is_empty() {
            return Err(LedgerError::AlreadyReviewed(self.findings.len()));
        }

        let stamp = review_timestamp(now);
        for (lines, status) in [
            (unmatched, MatchStatus::Mismatch),
            (matched, MatchStatus::Match),
        ] {
            for line in lines {
                let (mut finding, _) = remark::parse_line(line.trim(), status);
                if !finding.reviewer.is_known() {
                    finding.reviewer = Reviewer::Ai;
                }
                if finding.reviewed_at == UNKNOWN {
                    finding.reviewed_at = stamp.clone();
                }
                self.findings.push(finding);
            }
        }

        debug!(
            findings = self.findings.len(),
            mismatches = self.mismatch_count(),
            "ingested verification result"
        );
        Ok(())
    }

    /// Mutate exactly one finding: set its status, stamp it as manually
    /// reviewed at `now`, and replace its remark only when one is given.
    pub fn apply_override(
        &mut self,
        index: usize,
        status: MatchStatus,
        new_remark: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<(), LedgerError> {
        let len = self.findings.len();
        let finding = self
            .findings
            .get_mut(index)
            .ok_or(LedgerError::IndexOutOfRange { index, len })?;

        finding.status = status;
        finding.reviewer = Reviewer::Manual;
        finding.reviewed_at = review_timestamp(now);
        if let Some(remark) = new_remark {
            finding.remark = remark.to_string();
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 1, 10, 0, 0).unwrap()
    }

    fn ingested() -> ReviewLedger {
        let mut ledger = ReviewLedger::new();
        ledger
            .ingest_ai_result(
                &["PO number matches".to_string()],
                &["Invoice number mismatch".to_string()],
                now(),
            )
            .unwrap();
        ledger
    }

    #[test]
    fn test_status_derivation_truth_table() {
        assert_eq!(ReviewLedger::new().status(), ReviewStatus::Pending);

        let approved = ReviewLedger::from_findings(vec![FieldFinding::bare(
            "Rate matches",
            MatchStatus::Match,
        )]);
        assert_eq!(approved.status(), ReviewStatus::Approved);

        let rejected = ReviewLedger::from_findings(vec![
            FieldFinding::bare("Rate matches", MatchStatus::Match),
            FieldFinding::bare("Qty mismatch", MatchStatus::Mismatch),
        ]);
        assert_eq!(rejected.status(), ReviewStatus::Rejected);
    }

    #[test]
    fn test_ingest_orders_unmatched_first_and_stamps_provenance() {
        let ledger = ingested();
        assert_eq!(ledger.len(), 2);
        assert_eq!(ledger.status(), ReviewStatus::Rejected);

        let first = &ledger.findings()[0];
        assert_eq!(first.subject, "Invoice number mismatch");
        assert!(first.status.is_mismatch());
        assert_eq!(first.reviewer, Reviewer::Ai);
        assert_eq!(first.reviewed_at, "01/03/2025, 03:30:00 pm");

        let second = &ledger.findings()[1];
        assert_eq!(second.subject, "PO number matches");
        assert!(!second.status.is_mismatch());
        assert!(second.is_reviewed());
    }

    #[test]
    fn test_ingest_keeps_existing_provenance() {
        let mut ledger = ReviewLedger::new();
        ledger
            .ingest_ai_result(
                &[],
                &["Qty mismatch (Manual (12/05/2024, 09:15:00 am))".to_string()],
                now(),
            )
            .unwrap();
        let finding = &ledger.findings()[0];
        assert_eq!(finding.reviewer, Reviewer::Manual);
        assert_eq!(finding.reviewed_at, "12/05/2024, 09:15:00 am");
    }

    #[test]
    fn test_ingest_guarded_against_populated_ledger() {
        let mut ledger = ingested();
        let err = ledger
            .ingest_ai_result(&["anything".to_string()], &[], now())
            .unwrap_err();
        assert_eq!(err, LedgerError::AlreadyReviewed(2));
        // The guarded call must not have touched the ledger.
        assert_eq!(ledger.len(), 2);
    }

    #[test]
    fn test_reset_allows_fresh_ingest() {
        let mut ledger = ingested();
        ledger.reset();
        assert_eq!(ledger.status(), ReviewStatus::Pending);
        ledger
            .ingest_ai_result(&["Rate matches".to_string()], &[], now())
            .unwrap();
        assert_eq!(ledger.status(), ReviewStatus::Approved);
    }

    #[test]
    fn test_apply_override_flips_status_and_stamps_manual() {
        let mut ledger = ingested();
        ledger
            .apply_override(0, MatchStatus::Match, Some("Confirmed by phone"), now())
            .unwrap();

        let finding = &ledger.findings()[0];
        assert!(!finding.status.is_mismatch());
        assert_eq!(finding.reviewer, Reviewer::Manual);
        assert_eq!(finding.remark, "Confirmed by phone");
        assert_eq!(ledger.status(), ReviewStatus::Approved);
    }

    #[test]
    fn test_apply_override_without_remark_keeps_existing() {
        let mut ledger = ingested();
        ledger
            .apply_override(0, MatchStatus::Match, Some("First pass"), now())
            .unwrap();
        ledger
            .apply_override(0, MatchStatus::Mismatch, None, now())
            .unwrap();

        let finding = &ledger.findings()[0];
        assert_eq!(finding.remark, "First pass");
        assert!(finding.status.is_mismatch());
        assert_eq!(ledger.status(), ReviewStatus::Rejected);
    }

    #[test]
    fn test_apply_override_touches_exactly_one_finding() {
        let mut ledger = ingested();
        let untouched = ledger.findings()[1].clone();
        ledger
            .apply_override(0, MatchStatus::Match, Some("ok"), now())
            .unwrap();
        assert_eq!(ledger.findings()[1], untouched);
    }

    #[test]
    fn test_apply_override_out_of_range() {
        let mut ledger = ingested();
        let err = ledger
            .apply_override(5, MatchStatus::Match, None, now())
            .unwrap_err();
        assert_eq!(err, LedgerError::IndexOutOfRange { index: 5, len: 2 });
    }
}
