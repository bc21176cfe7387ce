//! Persistence API Client
//!
//! CRUD for document records and the GST-invoice projection over the
//! backing HTTP store. Writes use the store's `{data: [record]}` envelope.
//! Record updates carry an optimistic revision; a stale write is rejected
//! and surfaced so the caller can retry with fresh state instead of
//! silently overwriting a concurrent edit.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::debug;

use crate::record::{DocumentRecord, GstInvoiceRecord};

/// Error type for store operations.
#[derive(Debug, thiserror::Error)]
pub enum PersistenceError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("store rejected the request ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("record {id} not found")]
    NotFound { id: i64 },

    #[error("stale write for record {id}: revision {sent} behind stored {stored}")]
    StaleRevision { id: i64, sent: u64, stored: u64 },

    #[error("missing environment variable: {0}")]
    MissingEnv(&'static str),
}

/// CRUD surface of the backing store. Implementations must reject stale
/// record revisions rather than last-write-wins overwriting.
#[async_trait]
pub trait PersistenceApi: Send + Sync {
    async fn fetch_records(&self) -> Result<Vec<DocumentRecord>, PersistenceError>;

    /// Persist one record; returns the stored copy with its new revision.
    async fn update_record(
        &self,
        record: &DocumentRecord,
    ) -> Result<DocumentRecord, PersistenceError>;

    async fn fetch_gst_invoices(&self) -> Result<Vec<GstInvoiceRecord>, PersistenceError>;

    async fn update_gst_invoice(&self, record: &GstInvoiceRecord)
        -> Result<(), PersistenceError>;
}

/// Write envelope the store expects for both record kinds.
#[derive(Debug, Serialize)]
struct WriteEnvelope<'a, T: Serialize> {
    data: [&'a T; 1],
}

/// Read envelope wrapping fetched rows.
#[derive(Debug, Deserialize)]
#[serde(bound(deserialize = "T: Deserialize<'de>"))]
struct FetchEnvelope<T> {
    #[serde(default)]
    data: Vec<T>,
}

/// Acknowledgement returned by write endpoints.
#[derive(Debug, Deserialize)]
struct WriteAck {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    message: Option<String>,
    #[serde(rename = "Revision", default)]
    revision: Option<u64>,
}

/// HTTP implementation against the expenditure backend.
#[derive(Clone)]
pub struct HttpPersistenceApi {
    base_url: String,
    client: reqwest::Client,
}

impl HttpPersistenceApi {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            client: reqwest::Client::new(),
        }
    }

    /// Create from the `EXPENDITURE_API_URL` environment variable.
    pub fn from_env() -> Result<Self, PersistenceError> {
        let base_url = std::env::var("EXPENDITURE_API_URL")
            .map_err(|_| PersistenceError::MissingEnv("EXPENDITURE_API_URL"))?;
        Ok(Self::new(base_url))
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), path)
    }

    async fn fetch<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
    ) -> Result<Vec<T>, PersistenceError> {
        let response = self.client.get(self.url(path)).send().await?;
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response.text().await.unwrap_or_default();
            return Err(PersistenceError::Api { status, message });
        }
        let envelope: FetchEnvelope<T> = response.json().await?;
        Ok(envelope.data)
    }

    async fn write<T: Serialize>(
        &self,
        path: &str,
        record: &T,
        id: i64,
        sent_revision: u64,
    ) -> Result<WriteAck, PersistenceError> {
        let response = self
            .client
            .post(self.url(path))
            .json(&WriteEnvelope { data: [record] })
            .send()
            .await?;

        if response.status() == reqwest::StatusCode::CONFLICT {
            let ack: WriteAck = response.json().await?;
            return Err(PersistenceError::StaleRevision {
                id,
                sent: sent_revision,
                stored: ack.revision.unwrap_or(sent_revision),
            });
        }
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response.text().await.unwrap_or_default();
            return Err(PersistenceError::Api { status, message });
        }

        let ack: WriteAck = response.json().await?;
        if !ack.success {
            return Err(PersistenceError::Api {
                status: 200,
                message: ack.message.unwrap_or_else(|| "update rejected".to_string()),
            });
        }
        Ok(ack)
    }
}

#[async_trait]
impl PersistenceApi for HttpPersistenceApi {
    async fn fetch_records(&self) -> Result<Vec<DocumentRecord>, PersistenceError> {
        let records = self.fetch("/api/get-expenditure-data").await?;
        debug!(count = records.len(), "fetched document records");
        Ok(records)
    }

    async fn update_record(
        &self,
        record: &DocumentRecord,
    ) -> Result<DocumentRecord, PersistenceError> {
        let ack = self
            .write(
                "/api/update-expenditure-data",
                record,
                record.id,
                record.revision,
            )
            .await?;
        let mut updated = record.clone();
        updated.revision = ack.revision.unwrap_or(record.revision + 1);
        Ok(updated)
    }

    async fn fetch_gst_invoices(&self) -> Result<Vec<GstInvoiceRecord>, PersistenceError> {
        let records = self.fetch("/api/get-gst-invoice-data").await?;
        debug!(count = records.len(), "fetched GST invoice records");
        Ok(records)
    }

    async fn update_gst_invoice(
        &self,
        record: &GstInvoiceRecord,
    ) -> Result<(), PersistenceError> {
        self.write("/api/update-gst-invoice-data", record, record.id, 0)
            .await?;
        Ok(())
    }
}

/// In-memory store for tests and local development. Enforces the same
/// revision compare-and-set the HTTP store performs.
#[derive(Default)]
pub struct MemoryPersistence {
    records: RwLock<Vec<DocumentRecord>>,
    gst_invoices: RwLock<Vec<GstInvoiceRecord>>,
}

impl MemoryPersistence {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn seed_record(&self, record: DocumentRecord) {
        self.records.write().await.push(record);
    }

    pub async fn seed_gst_invoice(&self, record: GstInvoiceRecord) {
        self.gst_invoices.write().await.push(record);
    }
}

#[async_trait]
impl PersistenceApi for MemoryPersistence {
    async fn fetch_records(&self) -> Result<Vec<DocumentRecord>, PersistenceError> {
        Ok(self.records.read().await.clone())
    }

    async fn update_record(
        &self,
        record: &DocumentRecord,
    ) -> Result<DocumentRecord, PersistenceError> {
        let mut records = self.records.write().await;
        if let Some(position) = records.iter().position(|r| r.id == record.id) {
            let stored = &mut records[position];
            if stored.revision != record.revision {
                return Err(PersistenceError::StaleRevision {
                    id: record.id,
                    sent: record.revision,
                    stored: stored.revision,
                });
            }
            *stored = record.clone();
            stored.revision += 1;
            Ok(stored.clone())
        } else {
            let mut inserted = record.clone();
            inserted.revision += 1;
            records.push(inserted.clone());
            Ok(inserted)
        }
    }

    async fn fetch_gst_invoices(&self) -> Result<Vec<GstInvoiceRecord>, PersistenceError> {
        Ok(self.gst_invoices.read().await.clone())
    }

    async fn update_gst_invoice(
        &self,
        record: &GstInvoiceRecord,
    ) -> Result<(), PersistenceError> {
        let mut invoices = self.gst_invoices.write().await;
        let stored = invoices
            .iter_mut()
            .find(|r| r.id == record.id)
            .ok_or(PersistenceError::NotFound { id: record.id })?;
        *stored = record.clone();
        Ok(())
    }
}
