//! Document Record Types
//!
//! Wire-facing records for the expenditure review store: the primary
//! document record (one row per bill, six upload slots, the remark blob)
//! and the secondary GST-invoice projection keyed by the IREPS bill number.
//! Field renames follow the store's column names exactly.

use bill_ledger::{remark, Decoded, ReviewStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The six source documents compared during a review pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DocumentKind {
    ReceiptNote,
    TaxInvoice,
    #[serde(rename = "GSTInvoice")]
    GstInvoice,
    ModificationAdvice,
    PurchaseOrder,
    InspectionCertificate,
}

impl DocumentKind {
    pub const ALL: [DocumentKind; 6] = [
        Self::ReceiptNote,
        Self::TaxInvoice,
        Self::GstInvoice,
        Self::ModificationAdvice,
        Self::PurchaseOrder,
        Self::InspectionCertificate,
    ];

    /// Store column name for the slot content.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ReceiptNote => "ReceiptNote",
            Self::TaxInvoice => "TaxInvoice",
            Self::GstInvoice => "GSTInvoice",
            Self::ModificationAdvice => "ModificationAdvice",
            Self::PurchaseOrder => "PurchaseOrder",
            Self::InspectionCertificate => "InspectionCertificate",
        }
    }

    /// Human-readable label.
    pub fn label(&self) -> &'static str {
        match self {
            Self::ReceiptNote => "Receipt Note",
            Self::TaxInvoice => "Tax Invoice",
            Self::GstInvoice => "GST Invoice",
            Self::ModificationAdvice => "Modification Advice",
            Self::PurchaseOrder => "Purchase Order",
            Self::InspectionCertificate => "Inspection Certificate",
        }
    }
}

impl std::fmt::Display for DocumentKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Upload slots for one record. `<Kind>` holds the base64 payload and
/// `<Kind>UploadTime` the upload timestamp, matching the store's columns.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DocumentSlots {
    #[serde(rename = "ReceiptNote")]
    pub receipt_note: Option<String>,
    #[serde(rename = "ReceiptNoteUploadTime")]
    pub receipt_note_uploaded_at: Option<DateTime<Utc>>,

    #[serde(rename = "TaxInvoice")]
    pub tax_invoice: Option<String>,
    #[serde(rename = "TaxInvoiceUploadTime")]
    pub tax_invoice_uploaded_at: Option<DateTime<Utc>>,

    #[serde(rename = "GSTInvoice")]
    pub gst_invoice: Option<String>,
    #[serde(rename = "GSTInvoiceUploadTime")]
    pub gst_invoice_uploaded_at: Option<DateTime<Utc>>,

    #[serde(rename = "ModificationAdvice")]
    pub modification_advice: Option<String>,
    #[serde(rename = "ModificationAdviceUploadTime")]
    pub modification_advice_uploaded_at: Option<DateTime<Utc>>,

    #[serde(rename = "PurchaseOrder")]
    pub purchase_order: Option<String>,
    #[serde(rename = "PurchaseOrderUploadTime")]
    pub purchase_order_uploaded_at: Option<DateTime<Utc>>,

    #[serde(rename = "InspectionCertificate")]
    pub inspection_certificate: Option<String>,
    #[serde(rename = "InspectionCertificateUploadTime")]
    pub inspection_certificate_uploaded_at: Option<DateTime<Utc>>,
}

impl DocumentSlots {
    pub fn content(&self, kind: DocumentKind) -> Option<&str> {
        match kind {
            DocumentKind::ReceiptNote => self.receipt_note.as_deref(),
            DocumentKind::TaxInvoice => self.tax_invoice.as_deref(),
            DocumentKind::GstInvoice => self.gst_invoice.as_deref(),
            DocumentKind::ModificationAdvice => self.modification_advice.as_deref(),
            DocumentKind::PurchaseOrder => self.purchase_order.as_deref(),
            DocumentKind::InspectionCertificate => self.inspection_certificate.as_deref(),
        }
    }

    pub fn uploaded_at(&self, kind: DocumentKind) -> Option<DateTime<Utc>> {
        match kind {
            DocumentKind::ReceiptNote => self.receipt_note_uploaded_at,
            DocumentKind::TaxInvoice => self.tax_invoice_uploaded_at,
            DocumentKind::GstInvoice => self.gst_invoice_uploaded_at,
            DocumentKind::ModificationAdvice => self.modification_advice_uploaded_at,
            DocumentKind::PurchaseOrder => self.purchase_order_uploaded_at,
            DocumentKind::InspectionCertificate => self.inspection_certificate_uploaded_at,
        }
    }

    /// Fill a slot with uploaded content and stamp the upload time.
    pub fn set_upload(&mut self, kind: DocumentKind, content: String, at: DateTime<Utc>) {
        let (slot, stamp) = match kind {
            DocumentKind::ReceiptNote => {
                (&mut self.receipt_note, &mut self.receipt_note_uploaded_at)
            }
            DocumentKind::TaxInvoice => (&mut self.tax_invoice, &mut self.tax_invoice_uploaded_at),
            DocumentKind::GstInvoice => (&mut self.gst_invoice, &mut self.gst_invoice_uploaded_at),
            DocumentKind::ModificationAdvice => (
                &mut self.modification_advice,
                &mut self.modification_advice_uploaded_at,
            ),
            DocumentKind::PurchaseOrder => (
                &mut self.purchase_order,
                &mut self.purchase_order_uploaded_at,
            ),
            DocumentKind::InspectionCertificate => (
                &mut self.inspection_certificate,
                &mut self.inspection_certificate_uploaded_at,
            ),
        };
        *slot = Some(content);
        *stamp = Some(at);
    }

    pub fn is_uploaded(&self, kind: DocumentKind) -> bool {
        self.content(kind).is_some()
    }

    pub fn uploaded_count(&self) -> usize {
        DocumentKind::ALL
            .iter()
            .filter(|kind| self.is_uploaded(**kind))
            .count()
    }
}

/// Primary record: one bill under review.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentRecord {
    #[serde(rename = "SNo")]
    pub id: i64,

    #[serde(rename = "Status")]
    pub status: ReviewStatus,

    /// IST display timestamp of the last verification pass.
    #[serde(rename = "VerificationTime", default)]
    pub verified_at: Option<String>,

    /// IREPS bill number, filled in by the GST-invoice extraction pass.
    /// The store writes `"-"` when none is known.
    #[serde(rename = "AuthorizationCommittee", default)]
    pub authorization_ref: Option<String>,

    /// Serialized review ledger; the store's only structured state.
    #[serde(rename = "Remark", default)]
    pub remark_blob: String,

    #[serde(flatten)]
    pub documents: DocumentSlots,

    /// Optimistic concurrency token; stale writes are rejected.
    #[serde(rename = "Revision", default)]
    pub revision: u64,
}

impl DocumentRecord {
    /// Fresh pending record with empty slots.
    pub fn new(id: i64) -> Self {
        Self {
            id,
            status: ReviewStatus::Pending,
            verified_at: None,
            authorization_ref: None,
            remark_blob: String::new(),
            documents: DocumentSlots::default(),
            revision: 0,
        }
    }

    /// Decode the remark blob into the typed ledger.
    pub fn ledger(&self) -> Decoded {
        remark::decode(&self.remark_blob)
    }

    /// The bill number used to find this record's GST-invoice projection,
    /// if one has been recorded.
    pub fn reconciliation_key(&self) -> Option<&str> {
        self.authorization_ref
            .as_deref()
            .map(str::trim)
            .filter(|key| !key.is_empty() && *key != "-")
    }
}

/// Secondary projection of a reviewed bill for GST reporting, keyed by the
/// same IREPS bill number as its primary record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GstInvoiceRecord {
    #[serde(rename = "SNo")]
    pub id: i64,

    #[serde(rename = "IREPSBillRegNo")]
    pub authorization_ref: String,

    #[serde(rename = "Status")]
    pub status: ReviewStatus,

    #[serde(rename = "Remark", default)]
    pub remark_blob: String,

    /// When this projection last matched its primary record.
    #[serde(rename = "SyncedAt", default)]
    pub synced_at: Option<DateTime<Utc>>,
}
