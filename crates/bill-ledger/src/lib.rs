//! Review ledger core for the bill-processing review tool.
//!
//! One document record owns an ordered ledger of field-level Match/Mismatch
//! findings. This crate holds the finding model, the bespoke text codec
//! that serializes the ledger into the store's single free-text remark
//! column, aggregate status derivation, and the manual-override engine.
//!
//! Everything here is synchronous and side-effect-free; persistence and the
//! AI services live in the sibling crates.

pub mod finding;
pub mod ledger;
pub mod remark;
pub mod review;

pub use finding::{review_timestamp, FieldFinding, MatchStatus, Reviewer};
pub use ledger::{LedgerError, ReviewLedger, ReviewStatus};
pub use remark::{decode, encode, DecodeDegradation, Decoded, EncodeError, Production};
pub use review::{commit_review, OverrideError, ReviewCommit, ReviewOverride};
