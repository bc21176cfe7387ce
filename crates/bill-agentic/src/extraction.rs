//! Field-Extraction Client
//!
//! Per document kind, the extraction service turns an uploaded file into
//! the structured field values the verification pass compares. The service
//! is opaque here apart from one contract detail: extracting a GST invoice
//! also returns the IREPS bill registration number that keys the record to
//! its GST-invoice projection.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use bill_store::DocumentKind;

/// Error type for the extraction pass.
#[derive(Debug, thiserror::Error)]
pub enum ExtractionError {
    #[error("extraction transport error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("extraction service error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("extraction returned an unusable payload: {0}")]
    Payload(String),

    #[error("missing environment variable: {0}")]
    MissingEnv(&'static str),
}

/// Receipt for one extraction pass. Only the GST invoice yields a bill
/// registration number; other kinds extract silently.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractionReceipt {
    pub ireps_reg_no: Option<String>,
}

/// The AI extraction pass over one uploaded document.
#[async_trait]
pub trait ExtractionService: Send + Sync {
    async fn extract(
        &self,
        kind: DocumentKind,
        file_base64: &str,
        record_id: i64,
    ) -> Result<ExtractionReceipt, ExtractionError>;
}

/// Fields requested from the extraction service, per document kind.
fn extraction_fields(kind: DocumentKind) -> &'static str {
    match kind {
        DocumentKind::ReceiptNote => {
            "R/Note-No., Vendor Code, Supplier Name, Supplier Address, PO/AT No., PL No., \
             R.O.No., R.O.Date, RN Quantity, Rate, Value, P.O.Sr.No., Freight, \
             Inspection agency, IC no., dated, Challan/invoice no., Date, Qty. Invoiced, \
             Qty. Received, Qty. Accepted, Qty. Rejected"
        }
        DocumentKind::TaxInvoice => {
            "Supplier Name, Supplier Address, GST No., Supplier PAN, CIN, Invoice No., Date, \
             No of Pkg, Qty, Rate, Freight Charges, GST Amount, Total Sales Amount, \
             Destination, Dispatched through, e-Way Bill no., Bill of Landing/LR-RR No., \
             HSN Code"
        }
        DocumentKind::GstInvoice => {
            "Tax invoice no., IREPS Bill Reg No., Tax invoice date, Invoice Amount, \
             Rnote no., Rnote date, DRR No., Rnote Value, RO No., RO Date, Rnote Qty, \
             PO Rate, PO Sr No, PL No, PO No, HSN Code, Supplier Name, Supplier Address, \
             Supplier GSTIN, Inspection Agency, Vendor Code"
        }
        DocumentKind::ModificationAdvice => {
            "P.O.No., Supplier Name, Supplier Address, P.O.Sr., PL no, Vcode"
        }
        DocumentKind::PurchaseOrder => {
            "PO No., Inspection Agency, Basic Rate, PO Sr., PL No, Ordered Quantity, \
             Freight Charges, Security Money"
        }
        DocumentKind::InspectionCertificate => {
            "Certificate no., PO Number, Date, IC Count No., PO Serial Number, \
             Order Qty, Qty Offered, Qty not due, Qty Passed, Qty Rejected"
        }
    }
}

/// Extraction instruction sent alongside the document.
fn extraction_prompt(kind: DocumentKind) -> String {
    format!(
        "Extract the following fields from the provided {} and return them as a JSON \
         object using exactly these key names, with null for any value that cannot be \
         identified, every value as a string, and dates as dd/mm/yy: {}",
        kind.label(),
        extraction_fields(kind)
    )
}

#[derive(Debug, Serialize)]
struct ExtractRequest<'a> {
    prompt: String,
    #[serde(rename = "fileBase64")]
    file_base64: &'a str,
    #[serde(rename = "documentType")]
    document_type: &'static str,
    #[serde(rename = "rowId")]
    row_id: i64,
}

#[derive(Debug, Deserialize)]
struct ExtractResponse {
    #[serde(rename = "regno", default)]
    reg_no: Option<String>,
}

/// HTTP implementation against the extraction backend.
#[derive(Clone)]
pub struct HttpExtractionService {
    base_url: String,
    client: reqwest::Client,
}

impl HttpExtractionService {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            client: reqwest::Client::new(),
        }
    }

    /// Create from the `EXTRACTION_API_URL` environment variable.
    pub fn from_env() -> Result<Self, ExtractionError> {
        let base_url = std::env::var("EXTRACTION_API_URL")
            .map_err(|_| ExtractionError::MissingEnv("EXTRACTION_API_URL"))?;
        Ok(Self::new(base_url))
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), path)
    }
}

#[async_trait]
impl ExtractionService for HttpExtractionService {
    async fn extract(
        &self,
        kind: DocumentKind,
        file_base64: &str,
        record_id: i64,
    ) -> Result<ExtractionReceipt, ExtractionError> {
        let request = ExtractRequest {
            prompt: extraction_prompt(kind),
            file_base64,
            document_type: kind.as_str(),
            row_id: record_id,
        };

        let response = self
            .client
            .post(self.url("/api/extract-expenditure-data"))
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response.text().await.unwrap_or_default();
            return Err(ExtractionError::Api { status, message });
        }

        let parsed: ExtractResponse = response.json().await?;
        debug!(
            record = record_id,
            kind = kind.as_str(),
            has_reg_no = parsed.reg_no.is_some(),
            "extraction pass completed"
        );

        if kind == DocumentKind::GstInvoice && parsed.reg_no.is_none() {
            return Err(ExtractionError::Payload(
                "GST invoice extraction returned no IREPS bill registration number".to_string(),
            ));
        }

        Ok(ExtractionReceipt {
            ireps_reg_no: parsed.reg_no,
        })
    }
}
