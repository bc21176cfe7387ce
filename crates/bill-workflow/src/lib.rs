//! Orchestration around the review ledger: the dual-store reconciler that
//! keeps the GST-invoice projection consistent with its primary record, the
//! outbox that retries failed projection syncs, and the pipeline wiring
//! verification, manual review, and persistence together.

pub mod outbox;
pub mod pipeline;
pub mod reconcile;

pub use outbox::{DrainReport, ReconcileOutbox, ReconcileTask};
pub use pipeline::{CommitOutcome, PipelineError, ReviewPipeline};
pub use reconcile::{reconcile, ReconciliationError};
