//! AI Verification Client
//!
//! Client for the verification service that cross-checks the extracted
//! fields of a record's documents. On success the service returns the
//! Matched/Unmatched result-line lists plus its own status reading; when it
//! cannot compare at all it returns a single `Reason` string instead.

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use bill_store::DocumentRecord;

/// Error type for the verification pass. The caller turns any of these
/// into a forced rejection carrying the error text as a synthetic remark;
/// retry is a fresh user-initiated call, never automatic.
#[derive(Debug, thiserror::Error)]
pub enum VerificationServiceError {
    #[error("verification transport error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("verification service error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("verification could not compare: {0}")]
    CompareFailed(String),

    #[error("verification returned an unusable payload: {0}")]
    Payload(String),

    #[error("missing environment variable: {0}")]
    MissingEnv(&'static str),
}

/// Successful AI pass: the two result-line lists and the status the
/// service itself reported. The reported status is advisory only; the
/// ledger re-derives it from the Mismatch count.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerificationReport {
    pub reported_status: Option<String>,
    pub matched: Vec<String>,
    pub unmatched: Vec<String>,
}

/// The AI comparison pass over one record's documents.
#[async_trait]
pub trait VerificationService: Send + Sync {
    async fn verify(
        &self,
        record: &DocumentRecord,
    ) -> Result<VerificationReport, VerificationServiceError>;
}

/// Raw response shape: either both result lists or a `Reason`.
#[derive(Debug, Deserialize)]
struct RawVerifyResponse {
    #[serde(rename = "Status")]
    status: Option<String>,
    #[serde(rename = "MatchedResults")]
    matched: Option<Vec<String>>,
    #[serde(rename = "UnmatchedResults")]
    unmatched: Option<Vec<String>>,
    #[serde(rename = "Reason")]
    reason: Option<String>,
}

fn into_report(raw: RawVerifyResponse) -> Result<VerificationReport, VerificationServiceError> {
    match (raw.matched, raw.unmatched) {
        (Some(matched), Some(unmatched)) => Ok(VerificationReport {
            reported_status: raw.status,
            matched,
            unmatched,
        }),
        _ => match raw.reason {
            Some(reason) => Err(VerificationServiceError::CompareFailed(reason)),
            None => Err(VerificationServiceError::Payload(
                "neither result lists nor a reason present".to_string(),
            )),
        },
    }
}

/// HTTP implementation against the verification backend.
#[derive(Clone)]
pub struct HttpVerificationService {
    base_url: String,
    client: reqwest::Client,
}

impl HttpVerificationService {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            client: reqwest::Client::new(),
        }
    }

    /// Create from the `VERIFICATION_API_URL` environment variable.
    pub fn from_env() -> Result<Self, VerificationServiceError> {
        let base_url = std::env::var("VERIFICATION_API_URL")
            .map_err(|_| VerificationServiceError::MissingEnv("VERIFICATION_API_URL"))?;
        Ok(Self::new(base_url))
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), path)
    }
}

#[async_trait]
impl VerificationService for HttpVerificationService {
    async fn verify(
        &self,
        record: &DocumentRecord,
    ) -> Result<VerificationReport, VerificationServiceError> {
        let response = self
            .client
            .post(self.url("/api/expenditure-data-verify"))
            .json(record)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response.text().await.unwrap_or_default();
            return Err(VerificationServiceError::Api { status, message });
        }

        let text = response.text().await?;
        debug!(
            record = record.id,
            bytes = text.len(),
            "verification response received"
        );

        let raw: RawVerifyResponse = serde_json::from_str(&text).map_err(|e| {
            VerificationServiceError::Payload(format!(
                "{}: {}",
                e,
                &text[..text.len().min(200)]
            ))
        })?;
        into_report(raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_report_from_result_lists() {
        let raw: RawVerifyResponse = serde_json::from_value(serde_json::json!({
            "Status": "rejected",
            "MatchedResults": ["PO number matches"],
            "UnmatchedResults": ["Invoice number mismatch"],
        }))
        .unwrap();

        let report = into_report(raw).unwrap();
        assert_eq!(report.reported_status.as_deref(), Some("rejected"));
        assert_eq!(report.matched, vec!["PO number matches"]);
        assert_eq!(report.unmatched, vec!["Invoice number mismatch"]);
    }

    #[test]
    fn test_reason_maps_to_compare_failed() {
        let raw: RawVerifyResponse = serde_json::from_value(serde_json::json!({
            "Reason": "GST invoice missing",
        }))
        .unwrap();

        match into_report(raw) {
            Err(VerificationServiceError::CompareFailed(reason)) => {
                assert_eq!(reason, "GST invoice missing");
            }
            other => panic!("expected CompareFailed, got {:?}", other),
        }
    }

    #[test]
    fn test_empty_payload_is_unusable() {
        let raw: RawVerifyResponse = serde_json::from_value(serde_json::json!({})).unwrap();
        assert!(matches!(
            into_report(raw),
            Err(VerificationServiceError::Payload(_))
        ));
    }

    #[test]
    fn test_empty_result_lists_still_report() {
        // A comparison that found nothing to flag is a valid (empty) pass.
        let raw: RawVerifyResponse = serde_json::from_value(serde_json::json!({
            "Status": "approved",
            "MatchedResults": [],
            "UnmatchedResults": [],
        }))
        .unwrap();
        let report = into_report(raw).unwrap();
        assert!(report.matched.is_empty());
        assert!(report.unmatched.is_empty());
    }
}
