//! Document store abstraction.
//!
//! All persistent reads and writes go through the [`ContentStore`]
//! trait: a GROQ query verb plus create / patch / asset-upload
//! mutations, mirroring what the content lake actually exposes. Typed
//! query helpers for the domain documents live in the service layer;
//! this module stays at the generic-verb level the wire protocol has.

pub mod sanity;

use async_trait::async_trait;
use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

pub use sanity::SanityClient;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("store transport error: {0}")]
    Network(String),
    #[error("store rejected request ({status}): {message}")]
    Api { status: u16, message: String },
    #[error("failed to decode store response: {0}")]
    Decode(String),
}

/// A partial update of one document: fields to set and fields to unset,
/// applied in a single commit.
#[derive(Debug, Clone, Default)]
pub struct DocumentPatch {
    pub id: String,
    pub set: Map<String, Value>,
    pub unset: Vec<String>,
}

impl DocumentPatch {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Default::default()
        }
    }

    pub fn set(mut self, field: impl Into<String>, value: Value) -> Self {
        self.set.insert(field.into(), value);
        self
    }

    pub fn unset(mut self, field: impl Into<String>) -> Self {
        self.unset.push(field.into());
        self
    }
}

#[async_trait]
pub trait ContentStore: Send + Sync {
    /// Runs a GROQ query with named parameters and returns the raw result.
    async fn fetch(&self, query: &str, params: &[(&str, Value)]) -> Result<Value, StoreError>;

    /// Creates a document, returning its store-assigned id.
    async fn create(&self, document: Value) -> Result<String, StoreError>;

    /// Applies a partial update to one document.
    async fn patch(&self, patch: DocumentPatch) -> Result<(), StoreError>;

    /// Uploads a file asset, returning the asset document id.
    async fn upload_asset(&self, filename: &str, bytes: Bytes) -> Result<String, StoreError>;
}

/// Runs a `[0]`-style GROQ query and decodes the single result, mapping
/// a null result to `None`.
pub async fn fetch_one<T: DeserializeOwned>(
    store: &dyn ContentStore,
    query: &str,
    params: &[(&str, Value)],
) -> Result<Option<T>, StoreError> {
    let value = store.fetch(query, params).await?;
    if value.is_null() {
        return Ok(None);
    }
    serde_json::from_value(value)
        .map(Some)
        .map_err(|e| StoreError::Decode(e.to_string()))
}
