//! Clients for the external AI services behind the review tool: the
//! verification pass that cross-checks extracted document fields, and the
//! field-extraction pass that turns uploaded documents into structured
//! values. Both are consumed through their request/response contracts; the
//! models themselves are opaque.

pub mod extraction;
pub mod verification;

pub use extraction::{
    ExtractionError, ExtractionReceipt, ExtractionService, HttpExtractionService,
};
pub use verification::{
    HttpVerificationService, VerificationReport, VerificationService, VerificationServiceError,
};
