//! Review Pipeline
//!
//! Orchestrates the flows around one document record: the AI verification
//! pass, manual review commits, document attachment, and secondary-store
//! retries. Ledger mutations happen in memory first; a record is persisted
//! only once its new state is fully built, and a primary write is never
//! rolled back by a secondary failure.

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use bill_agentic::{
    ExtractionError, ExtractionService, VerificationService, VerificationServiceError,
};
use bill_ledger::{
    commit_review, review_timestamp, EncodeError, LedgerError, OverrideError, ReviewOverride,
    ReviewStatus,
};
use bill_store::{DocumentKind, DocumentRecord, PersistenceApi, PersistenceError};

use crate::outbox::{DrainReport, ReconcileOutbox};
use crate::reconcile::reconcile;

/// Error type for pipeline operations. Verification failures are absent on
/// purpose: they are absorbed into a forced rejection, not surfaced.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error(transparent)]
    Persistence(#[from] PersistenceError),

    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error(transparent)]
    Encode(#[from] EncodeError),

    #[error(transparent)]
    Extraction(#[from] ExtractionError),
}

/// Outcome of a review commit: the persisted primary record, any per-entry
/// override errors, and whether the GST projection was synced in-line.
#[derive(Debug)]
pub struct CommitOutcome {
    pub record: DocumentRecord,
    pub override_errors: Vec<OverrideError>,
    pub reconciled: bool,
}

/// Wires the verification service, the store, and the extraction service
/// around the review ledger.
pub struct ReviewPipeline<P, V, X> {
    store: P,
    verifier: V,
    extractor: X,
    outbox: ReconcileOutbox,
}

impl<P, V, X> ReviewPipeline<P, V, X>
where
    P: PersistenceApi,
    V: VerificationService,
    X: ExtractionService,
{
    pub fn new(store: P, verifier: V, extractor: X) -> Self {
        Self {
            store,
            verifier,
            extractor,
            outbox: ReconcileOutbox::new(),
        }
    }

    pub fn store(&self) -> &P {
        &self.store
    }

    pub fn outbox(&self) -> &ReconcileOutbox {
        &self.outbox
    }

    /// Run the AI verification pass over a pending record, populate its
    /// ledger, and persist the derived status and blob.
    ///
    /// A verification failure does not bubble: the record is forced to
    /// rejected with the raw error text as a synthetic remark, and a fresh
    /// user-initiated call is the only retry path.
    pub async fn verify_record(
        &self,
        record: &DocumentRecord,
        now: DateTime<Utc>,
    ) -> Result<DocumentRecord, PipelineError> {
        match self.verifier.verify(record).await {
            Ok(report) => {
                let mut ledger = record.ledger().ledger;
                ledger.ingest_ai_result(&report.matched, &report.unmatched, now)?;

                let status = ledger.status();
                if let Some(reported) = &report.reported_status {
                    if !reported.eq_ignore_ascii_case(status.as_str()) {
                        warn!(
                            record = record.id,
                            reported = %reported,
                            derived = status.as_str(),
                            "service-reported status disagrees with derived status"
                        );
                    }
                }

                let mut updated = record.clone();
                updated.status = status;
                updated.remark_blob = bill_ledger::encode(&ledger)?;
                updated.verified_at = Some(review_timestamp(now));
                info!(
                    record = record.id,
                    status = status.as_str(),
                    findings = ledger.len(),
                    "verification pass ingested"
                );
                Ok(self.store.update_record(&updated).await?)
            }
            Err(err) => {
                let synthetic = match &err {
                    VerificationServiceError::CompareFailed(reason) => reason.clone(),
                    other => other.to_string(),
                };
                warn!(
                    record = record.id,
                    error = %err,
                    "verification failed; forcing rejection with synthetic remark"
                );

                let mut updated = record.clone();
                updated.status = ReviewStatus::Rejected;
                updated.remark_blob = synthetic;
                updated.verified_at = Some(review_timestamp(now));
                Ok(self.store.update_record(&updated).await?)
            }
        }
    }

    /// Apply a batch of manual overrides, persist the primary record, then
    /// bring the GST projection in line. A persistence failure surfaces so
    /// the caller can retain the pending edit; a reconciliation failure is
    /// queued for retry and never rolls back the primary write.
    pub async fn commit_review(
        &self,
        record: &DocumentRecord,
        overrides: &[ReviewOverride],
        now: DateTime<Utc>,
    ) -> Result<CommitOutcome, PipelineError> {
        let decoded = record.ledger();
        if !decoded.degradations.is_empty() {
            debug!(
                record = record.id,
                degraded = decoded.degradations.len(),
                "remark blob decoded with fallback grammars"
            );
        }

        let commit = commit_review(decoded.ledger, overrides, now)?;

        let mut updated = record.clone();
        updated.status = commit.status;
        updated.remark_blob = commit.remark_blob;
        let record = self.store.update_record(&updated).await?;

        let reconciled = self.sync_secondary(&record, now).await;
        Ok(CommitOutcome {
            record,
            override_errors: commit.errors,
            reconciled,
        })
    }

    /// Fill one upload slot, running the extraction pass first. A GST
    /// invoice upload also records the IREPS bill registration number the
    /// reconciler keys on.
    pub async fn attach_document(
        &self,
        record: &DocumentRecord,
        kind: DocumentKind,
        file_base64: String,
        now: DateTime<Utc>,
    ) -> Result<DocumentRecord, PipelineError> {
        let receipt = self.extractor.extract(kind, &file_base64, record.id).await?;

        let mut updated = record.clone();
        updated.documents.set_upload(kind, file_base64, now);
        if kind == DocumentKind::GstInvoice {
            if let Some(reg_no) = receipt.ireps_reg_no {
                updated.authorization_ref = Some(reg_no);
            }
        }
        Ok(self.store.update_record(&updated).await?)
    }

    /// Return a reviewed record to pending with an empty ledger: the
    /// explicit path for an intentional re-verify.
    pub async fn reset_review(
        &self,
        record: &DocumentRecord,
    ) -> Result<DocumentRecord, PipelineError> {
        let mut updated = record.clone();
        updated.status = ReviewStatus::Pending;
        updated.remark_blob = String::new();
        updated.verified_at = None;
        Ok(self.store.update_record(&updated).await?)
    }

    /// Retry every queued GST projection sync.
    pub async fn retry_reconciliations(
        &self,
        now: DateTime<Utc>,
    ) -> Result<DrainReport, PersistenceError> {
        self.outbox.drain(&self.store, now).await
    }

    async fn sync_secondary(&self, record: &DocumentRecord, now: DateTime<Utc>) -> bool {
        let Some(reference) = record.reconciliation_key() else {
            warn!(
                record = record.id,
                "record has no bill number; GST projection left untouched"
            );
            return false;
        };

        let failure = match self.store.fetch_gst_invoices().await {
            Ok(snapshot) => {
                match reconcile(reference, record.status, &record.remark_blob, &snapshot, now) {
                    Ok(updated) => match self.store.update_gst_invoice(&updated).await {
                        Ok(()) => {
                            info!(record = record.id, reference, "GST projection synced");
                            return true;
                        }
                        Err(err) => err.to_string(),
                    },
                    Err(err) => err.to_string(),
                }
            }
            Err(err) => err.to_string(),
        };

        warn!(
            record = record.id,
            reference,
            error = %failure,
            "GST projection sync failed; queueing for retry"
        );
        self.outbox
            .enqueue(reference, record.status, record.remark_blob.clone(), now)
            .await;
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use bill_agentic::{ExtractionReceipt, VerificationReport};
    use bill_ledger::MatchStatus;
    use bill_store::{GstInvoiceRecord, MemoryPersistence};
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 1, 10, 0, 0).unwrap()
    }

    /// Verification double: a fixed result or a fixed compare failure.
    struct StubVerifier {
        matched: Vec<String>,
        unmatched: Vec<String>,
        fail_reason: Option<String>,
    }

    impl StubVerifier {
        fn passing(matched: &[&str], unmatched: &[&str]) -> Self {
            Self {
                matched: matched.iter().map(|s| s.to_string()).collect(),
                unmatched: unmatched.iter().map(|s| s.to_string()).collect(),
                fail_reason: None,
            }
        }

        fn failing(reason: &str) -> Self {
            Self {
                matched: Vec::new(),
                unmatched: Vec::new(),
                fail_reason: Some(reason.to_string()),
            }
        }
    }

    #[async_trait]
    impl VerificationService for StubVerifier {
        async fn verify(
            &self,
            _record: &DocumentRecord,
        ) -> Result<VerificationReport, VerificationServiceError> {
            if let Some(reason) = &self.fail_reason {
                return Err(VerificationServiceError::CompareFailed(reason.clone()));
            }
            let status = if self.unmatched.is_empty() {
                "approved"
            } else {
                "rejected"
            };
            Ok(VerificationReport {
                reported_status: Some(status.to_string()),
                matched: self.matched.clone(),
                unmatched: self.unmatched.clone(),
            })
        }
    }

    /// Extraction double: GST invoices yield a fixed bill number.
    struct StubExtractor;

    #[async_trait]
    impl ExtractionService for StubExtractor {
        async fn extract(
            &self,
            kind: DocumentKind,
            _file_base64: &str,
            _record_id: i64,
        ) -> Result<ExtractionReceipt, ExtractionError> {
            Ok(ExtractionReceipt {
                ireps_reg_no: (kind == DocumentKind::GstInvoice)
                    .then(|| "IREPS-123".to_string()),
            })
        }
    }

    fn gst_invoice(id: i64, reference: &str) -> GstInvoiceRecord {
        GstInvoiceRecord {
            id,
            authorization_ref: reference.to_string(),
            status: ReviewStatus::Pending,
            remark_blob: String::new(),
            synced_at: None,
        }
    }

    async fn seeded_pipeline(
        verifier: StubVerifier,
    ) -> ReviewPipeline<MemoryPersistence, StubVerifier, StubExtractor> {
        let store = MemoryPersistence::new();
        let mut record = DocumentRecord::new(1);
        record.authorization_ref = Some("IREPS-123".to_string());
        store.seed_record(record).await;
        ReviewPipeline::new(store, verifier, StubExtractor)
    }

    #[tokio::test]
    async fn test_verify_populates_ledger_and_persists() {
        let pipeline =
            seeded_pipeline(StubVerifier::passing(
                &["PO number matches"],
                &["Invoice number mismatch"],
            ))
            .await;
        let record = pipeline.store().fetch_records().await.unwrap().remove(0);

        let updated = pipeline.verify_record(&record, now()).await.unwrap();
        assert_eq!(updated.status, ReviewStatus::Rejected);
        assert!(updated.remark_blob.starts_with("Unmatched Results"));
        assert!(updated.remark_blob.contains("Matched Results"));
        assert_eq!(updated.verified_at.as_deref(), Some("01/03/2025, 03:30:00 pm"));
        assert_eq!(updated.revision, 1);

        let decoded = updated.ledger();
        assert_eq!(decoded.ledger.len(), 2);
        assert!(decoded.degradations.is_empty());
    }

    #[tokio::test]
    async fn test_verify_failure_forces_rejection_with_synthetic_remark() {
        let pipeline = seeded_pipeline(StubVerifier::failing("GST invoice missing")).await;
        let record = pipeline.store().fetch_records().await.unwrap().remove(0);

        let updated = pipeline.verify_record(&record, now()).await.unwrap();
        assert_eq!(updated.status, ReviewStatus::Rejected);
        assert_eq!(updated.remark_blob, "GST invoice missing");

        // The synthetic remark still decodes into a rejecting ledger.
        let decoded = updated.ledger();
        assert_eq!(decoded.ledger.status(), ReviewStatus::Rejected);
        assert_eq!(decoded.degradations.len(), 1);
    }

    #[tokio::test]
    async fn test_verify_refuses_already_reviewed_record() {
        let pipeline =
            seeded_pipeline(StubVerifier::passing(&["PO number matches"], &[])).await;
        let record = pipeline.store().fetch_records().await.unwrap().remove(0);

        let verified = pipeline.verify_record(&record, now()).await.unwrap();
        let err = pipeline.verify_record(&verified, now()).await.unwrap_err();
        assert!(matches!(
            err,
            PipelineError::Ledger(LedgerError::AlreadyReviewed(1))
        ));

        // Reset is the sanctioned path back to a fresh pass.
        let reset = pipeline.reset_review(&verified).await.unwrap();
        assert_eq!(reset.status, ReviewStatus::Pending);
        pipeline.verify_record(&reset, now()).await.unwrap();
    }

    #[tokio::test]
    async fn test_commit_persists_primary_and_syncs_projection() {
        let pipeline = seeded_pipeline(StubVerifier::passing(
            &["PO number matches"],
            &["Invoice number mismatch"],
        ))
        .await;
        pipeline
            .store()
            .seed_gst_invoice(gst_invoice(10, "IREPS-123"))
            .await;

        let record = pipeline.store().fetch_records().await.unwrap().remove(0);
        let verified = pipeline.verify_record(&record, now()).await.unwrap();

        let outcome = pipeline
            .commit_review(
                &verified,
                &[ReviewOverride::new(0, MatchStatus::Match).with_remark("Confirmed by phone")],
                now(),
            )
            .await
            .unwrap();

        assert_eq!(outcome.record.status, ReviewStatus::Approved);
        assert!(outcome.override_errors.is_empty());
        assert!(outcome.reconciled);

        let projection = pipeline
            .store()
            .fetch_gst_invoices()
            .await
            .unwrap()
            .remove(0);
        assert_eq!(projection.status, ReviewStatus::Approved);
        assert_eq!(projection.remark_blob, outcome.record.remark_blob);
        assert_eq!(projection.synced_at, Some(now()));
    }

    #[tokio::test]
    async fn test_commit_reports_out_of_range_override() {
        let pipeline = seeded_pipeline(StubVerifier::passing(
            &["PO number matches"],
            &["Invoice number mismatch"],
        ))
        .await;
        let record = pipeline.store().fetch_records().await.unwrap().remove(0);
        let verified = pipeline.verify_record(&record, now()).await.unwrap();

        let outcome = pipeline
            .commit_review(&verified, &[ReviewOverride::new(5, MatchStatus::Match)], now())
            .await
            .unwrap();

        assert_eq!(outcome.override_errors.len(), 1);
        // The untouched ledger still rejects.
        assert_eq!(outcome.record.status, ReviewStatus::Rejected);
    }

    #[tokio::test]
    async fn test_commit_with_duplicate_projection_queues_retry() {
        let pipeline =
            seeded_pipeline(StubVerifier::passing(&[], &["Invoice number mismatch"])).await;
        pipeline
            .store()
            .seed_gst_invoice(gst_invoice(10, "IREPS-123"))
            .await;
        pipeline
            .store()
            .seed_gst_invoice(gst_invoice(11, "IREPS-123"))
            .await;

        let record = pipeline.store().fetch_records().await.unwrap().remove(0);
        let verified = pipeline.verify_record(&record, now()).await.unwrap();
        let outcome = pipeline
            .commit_review(&verified, &[], now())
            .await
            .unwrap();

        // Primary write landed; secondary was refused and queued.
        assert!(!outcome.reconciled);
        assert_eq!(outcome.record.status, ReviewStatus::Rejected);
        assert_eq!(pipeline.outbox().pending_len().await, 1);

        let untouched = pipeline.store().fetch_gst_invoices().await.unwrap();
        assert!(untouched.iter().all(|r| r.status == ReviewStatus::Pending));
    }

    #[tokio::test]
    async fn test_stale_revision_surfaces_to_caller() {
        let pipeline =
            seeded_pipeline(StubVerifier::passing(&[], &["Invoice number mismatch"])).await;
        let record = pipeline.store().fetch_records().await.unwrap().remove(0);
        let verified = pipeline.verify_record(&record, now()).await.unwrap();

        // Commit against the pre-verification copy: its revision is stale.
        let err = pipeline
            .commit_review(&record, &[], now())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            PipelineError::Persistence(PersistenceError::StaleRevision { .. })
        ));

        // The fresh copy commits cleanly.
        pipeline.commit_review(&verified, &[], now()).await.unwrap();
    }

    #[tokio::test]
    async fn test_attach_gst_invoice_records_bill_number() {
        let store = MemoryPersistence::new();
        store.seed_record(DocumentRecord::new(1)).await;
        let pipeline = ReviewPipeline::new(store, StubVerifier::passing(&[], &[]), StubExtractor);

        let record = pipeline.store().fetch_records().await.unwrap().remove(0);
        assert_eq!(record.reconciliation_key(), None);

        let updated = pipeline
            .attach_document(&record, DocumentKind::GstInvoice, "base64".to_string(), now())
            .await
            .unwrap();
        assert_eq!(updated.reconciliation_key(), Some("IREPS-123"));
        assert!(updated.documents.is_uploaded(DocumentKind::GstInvoice));
        assert_eq!(
            updated.documents.uploaded_at(DocumentKind::GstInvoice),
            Some(now())
        );

        // Non-GST uploads leave the bill number alone.
        let updated = pipeline
            .attach_document(&updated, DocumentKind::TaxInvoice, "base64".to_string(), now())
            .await
            .unwrap();
        assert_eq!(updated.reconciliation_key(), Some("IREPS-123"));
    }

    #[tokio::test]
    async fn test_retry_reconciliations_drains_outbox() {
        let pipeline =
            seeded_pipeline(StubVerifier::passing(&[], &["Invoice number mismatch"])).await;

        let record = pipeline.store().fetch_records().await.unwrap().remove(0);
        let verified = pipeline.verify_record(&record, now()).await.unwrap();
        // No projection record yet: sync fails and queues.
        let outcome = pipeline.commit_review(&verified, &[], now()).await.unwrap();
        assert!(!outcome.reconciled);

        pipeline
            .store()
            .seed_gst_invoice(gst_invoice(10, "IREPS-123"))
            .await;
        let report = pipeline.retry_reconciliations(now()).await.unwrap();
        assert_eq!(report.synced, 1);

        let projection = pipeline
            .store()
            .fetch_gst_invoices()
            .await
            .unwrap()
            .remove(0);
        assert_eq!(projection.status, ReviewStatus::Rejected);
    }
}
