//! Field Finding Types
//!
//! The atomic unit of a comparison outcome: one field-level Match/Mismatch
//! between two source documents, with reviewer/time/remark provenance.

use chrono::{DateTime, FixedOffset, Utc};
use serde::{Deserialize, Serialize};

/// Sentinel for provenance fields with no recorded value.
pub const UNKNOWN: &str = "-";

/// Outcome of comparing one field across documents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchStatus {
    Match,
    Mismatch,
}

impl MatchStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Match => "match",
            Self::Mismatch => "mismatch",
        }
    }

    pub fn is_mismatch(&self) -> bool {
        matches!(self, Self::Mismatch)
    }
}

impl std::fmt::Display for MatchStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for MatchStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "match" => Ok(Self::Match),
            "mismatch" => Ok(Self::Mismatch),
            _ => Err(format!("Unknown match status: {}", s)),
        }
    }
}

/// Who last reviewed a finding.
///
/// Blobs written before provenance stamping existed carry arbitrary
/// reviewer text; `Other` preserves it verbatim so re-encoding is lossless.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "String", from = "String")]
pub enum Reviewer {
    Ai,
    Manual,
    Unknown,
    Other(String),
}

impl Reviewer {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Ai => "AI",
            Self::Manual => "Manual",
            Self::Unknown => UNKNOWN,
            Self::Other(s) => s,
        }
    }

    pub fn is_known(&self) -> bool {
        !matches!(self, Self::Unknown)
    }
}

impl From<&str> for Reviewer {
    fn from(s: &str) -> Self {
        match s {
            "AI" => Self::Ai,
            "Manual" => Self::Manual,
            UNKNOWN => Self::Unknown,
            other => Self::Other(other.to_string()),
        }
    }
}

impl From<String> for Reviewer {
    fn from(s: String) -> Self {
        Self::from(s.as_str())
    }
}

impl From<Reviewer> for String {
    fn from(r: Reviewer) -> Self {
        r.as_str().to_string()
    }
}

impl std::fmt::Display for Reviewer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One field-level comparison outcome with review provenance.
///
/// `reviewed_at` and `remark` are display strings with `"-"` as the unknown
/// sentinel; they belong to the remark blob's alphabet, not to structured
/// time handling.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldFinding {
    pub subject: String,
    pub status: MatchStatus,
    pub reviewer: Reviewer,
    pub reviewed_at: String,
    pub remark: String,
}

impl FieldFinding {
    /// Finding with no provenance recorded yet.
    pub fn bare(subject: impl Into<String>, status: MatchStatus) -> Self {
        Self {
            subject: subject.into(),
            status,
            reviewer: Reviewer::Unknown,
            reviewed_at: UNKNOWN.to_string(),
            remark: UNKNOWN.to_string(),
        }
    }

    /// Has a reviewer and a review time been recorded?
    pub fn is_reviewed(&self) -> bool {
        self.reviewer.is_known() && self.reviewed_at != UNKNOWN
    }
}

/// Review timestamps are displayed in IST (UTC+05:30).
fn ist() -> FixedOffset {
    FixedOffset::east_opt(5 * 3600 + 30 * 60).expect("IST offset is valid")
}

/// Render a review timestamp the way the store displays them:
/// `dd/mm/yyyy, hh:mm:ss am/pm` in IST.
pub fn review_timestamp(at: DateTime<Utc>) -> String {
    at.with_timezone(&ist())
        .format("%d/%m/%Y, %I:%M:%S %P")
        .to_string()
}
