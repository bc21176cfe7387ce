//! Remark Blob Codec
//!
//! The store exposes a single free-text remark column per record, so the
//! review ledger is serialized into and recovered from that one string.
//! Decoding never fails: stored blobs span several grammar generations, and
//! a line no grammar accepts is kept verbatim as a degraded finding rather
//! than dropped.

use std::sync::LazyLock;

use regex::Regex;
use tracing::warn;

use crate::finding::{FieldFinding, MatchStatus, Reviewer, UNKNOWN};
use crate::ledger::ReviewLedger;

/// Section header preceding Mismatch findings.
pub const UNMATCHED_HEADER: &str = "Unmatched Results";

/// Section header preceding Match findings.
pub const MATCHED_HEADER: &str = "Matched Results";

/// Bullet glyph opening each finding line.
pub const BULLET: char = '\u{2022}';

/// Current grammar: `subject (reviewer (reviewed_at)(remark)(reserved))`.
/// The subject is greedy up to the final top-level group; the reserved
/// group is always written as `-` but parsed tolerantly.
static CURRENT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^(?P<subject>.*) \((?P<reviewer>[^()]*) \((?P<time>[^()]*)\)\((?P<remark>.*)\)\((?P<reserved>[^()]*)\)\)$",
    )
    .unwrap()
});

/// Earlier generation: `subject (reviewer (reviewed_at))`.
static TIMED_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?P<subject>.*) \((?P<reviewer>[^()]+) \((?P<time>[^()]*)\)\)$").unwrap()
});

/// Oldest parenthesized generation: `subject (reviewer)`.
static BARE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(?P<subject>.*) \((?P<reviewer>[^()]+)\)$").unwrap());

/// Grammar generations, probed in this order. Everything before
/// `LinePreserving` has been observed in stored blobs; the fallback accepts
/// whatever is left so no line is ever discarded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Production {
    Current,
    TimestampedLegacy,
    ReviewerLegacy,
    LinePreserving,
}

impl Production {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Current => "current",
            Self::TimestampedLegacy => "timestamped_legacy",
            Self::ReviewerLegacy => "reviewer_legacy",
            Self::LinePreserving => "line_preserving",
        }
    }
}

/// Error type for encoding. Text crossing into the line grammar must not
/// contain the bullet glyph or line breaks; callers sanitize first.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum EncodeError {
    #[error("finding {index}: {field} contains a line break or bullet glyph")]
    UnencodableText { index: usize, field: &'static str },
}

/// A line that fell back past the current grammar. Counted for
/// data-quality monitoring; never surfaced as a user error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodeDegradation {
    pub line_no: usize,
    pub production: Production,
    pub line: String,
}

/// Decode result: the recovered ledger plus any degradations.
#[derive(Debug, Clone)]
pub struct Decoded {
    pub ledger: ReviewLedger,
    pub degradations: Vec<DecodeDegradation>,
}

fn encodable(text: &str) -> bool {
    !text.contains(['\n', '\r', BULLET])
}

fn render(finding: &FieldFinding) -> String {
    format!(
        "{} ({} ({})({})(-))",
        finding.subject,
        finding.reviewer.as_str(),
        finding.reviewed_at,
        finding.remark
    )
}

/// Serialize a ledger into the remark column format.
///
/// Each section is emitted only when it has findings, Unmatched before
/// Matched, separated by one blank line when both are present. Findings
/// keep their ledger order within each section.
pub fn encode(ledger: &ReviewLedger) -> Result<String, EncodeError> {
    for (index, finding) in ledger.findings().iter().enumerate() {
        if !encodable(&finding.subject) {
            return Err(EncodeError::UnencodableText {
                index,
                field: "subject",
            });
        }
        if !encodable(&finding.remark) {
            return Err(EncodeError::UnencodableText {
                index,
                field: "remark",
            });
        }
    }

    let mut sections = Vec::new();
    for (header, status) in [
        (UNMATCHED_HEADER, MatchStatus::Mismatch),
        (MATCHED_HEADER, MatchStatus::Match),
    ] {
        let mut section = String::new();
        for finding in ledger.findings().iter().filter(|f| f.status == status) {
            section.push('\n');
            section.push(BULLET);
            section.push(' ');
            section.push_str(&render(finding));
        }
        if !section.is_empty() {
            sections.push(format!("{}{}", header, section));
        }
    }

    Ok(sections.join("\n\n"))
}

/// Recover a ledger from the remark column. Never fails; lines that no
/// grammar accepts degrade to subject-only findings.
///
/// Lines before any section header belong to the Mismatch partition: a raw
/// synthetic rejection remark must keep the record rejected.
pub fn decode(text: &str) -> Decoded {
    let mut findings = Vec::new();
    let mut degradations = Vec::new();
    let mut section = MatchStatus::Mismatch;

    for (line_no, raw) in text.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() {
            continue;
        }
        if line.eq_ignore_ascii_case(UNMATCHED_HEADER) {
            section = MatchStatus::Mismatch;
            continue;
        }
        if line.eq_ignore_ascii_case(MATCHED_HEADER) {
            section = MatchStatus::Match;
            continue;
        }

        let content = line.strip_prefix(BULLET).map(str::trim).unwrap_or(line);
        let (finding, production) = parse_line(content, section);
        if production != Production::Current {
            warn!(
                line_no,
                production = production.as_str(),
                "remark line decoded via fallback grammar"
            );
            degradations.push(DecodeDegradation {
                line_no,
                production,
                line: content.to_string(),
            });
        }
        findings.push(finding);
    }

    Decoded {
        ledger: ReviewLedger::from_findings(findings),
        degradations,
    }
}

/// Parse one finding line against the ordered productions.
pub(crate) fn parse_line(line: &str, status: MatchStatus) -> (FieldFinding, Production) {
    if let Some(caps) = CURRENT_RE.captures(line) {
        return (
            FieldFinding {
                subject: caps["subject"].to_string(),
                status,
                reviewer: Reviewer::from(&caps["reviewer"]),
                reviewed_at: caps["time"].to_string(),
                remark: caps["remark"].to_string(),
            },
            Production::Current,
        );
    }
    if let Some(caps) = TIMED_RE.captures(line) {
        return (
            FieldFinding {
                subject: caps["subject"].to_string(),
                status,
                reviewer: Reviewer::from(&caps["reviewer"]),
                reviewed_at: caps["time"].to_string(),
                remark: UNKNOWN.to_string(),
            },
            Production::TimestampedLegacy,
        );
    }
    if let Some(caps) = BARE_RE.captures(line) {
        return (
            FieldFinding {
                subject: caps["subject"].to_string(),
                status,
                reviewer: Reviewer::from(&caps["reviewer"]),
                reviewed_at: UNKNOWN.to_string(),
                remark: UNKNOWN.to_string(),
            },
            Production::ReviewerLegacy,
        );
    }
    (
        FieldFinding::bare(line, status),
        Production::LinePreserving,
    )
}
