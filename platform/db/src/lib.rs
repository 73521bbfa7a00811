//! Store adapters for the suite services.
//!
//! [`MemoryStore`] is the document store the server runs on; it implements
//! the authorization hook's [`RecordStore`] seam. [`sql::to_condition`]
//! translates the same filters into `sea_orm` conditions for services backed
//! by a relational database.

mod memory;
pub mod sql;

pub use memory::{MemoryStore, Page, Paginate};

use platform_authz::FilterError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("no record `{id}` in {service}")]
    NotFound { service: String, id: String },
    #[error("invalid query: {0}")]
    InvalidFilter(#[from] FilterError),
    #[error("invalid payload: {0}")]
    InvalidPayload(String),
    #[error("`{field}` cannot be translated: {reason}")]
    Unsupported { field: String, reason: String },
}

impl StoreError {
    pub fn not_found(service: &str, id: &str) -> Self {
        Self::NotFound {
            service: service.to_string(),
            id: id.to_string(),
        }
    }
}

pub type StoreResult<T> = Result<T, StoreError>;
