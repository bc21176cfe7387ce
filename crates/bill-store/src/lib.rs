//! Records and persistence for the bill-processing review tool: the
//! primary document record, its GST-invoice projection, and the client for
//! the backing store's CRUD API.

pub mod api;
pub mod record;

pub use api::{HttpPersistenceApi, MemoryPersistence, PersistenceApi, PersistenceError};
pub use record::{DocumentKind, DocumentRecord, DocumentSlots, GstInvoiceRecord};
