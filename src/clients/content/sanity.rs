use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::instrument;

use super::{ContentStore, DocumentPatch, StoreError};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

/// HTTP client for the Sanity content lake: GROQ queries against the
/// query endpoint, mutations against the mutate endpoint, file uploads
/// against the asset endpoint. All writes carry the write token.
#[derive(Clone)]
pub struct SanityClient {
    client: reqwest::Client,
    base_url: String,
    dataset: String,
    token: String,
}

#[derive(Debug, Deserialize)]
struct QueryResponse {
    result: Value,
}

#[derive(Debug, Deserialize)]
struct MutationResponse {
    #[serde(default)]
    results: Vec<MutationResult>,
}

#[derive(Debug, Deserialize)]
struct MutationResult {
    id: String,
}

#[derive(Debug, Deserialize)]
struct AssetResponse {
    document: AssetDocument,
}

#[derive(Debug, Deserialize)]
struct AssetDocument {
    #[serde(rename = "_id")]
    id: String,
}

impl SanityClient {
    pub fn new(
        project_id: &str,
        dataset: &str,
        api_version: &str,
        token: String,
    ) -> Result<Self, StoreError> {
        let base_url = format!("https://{project_id}.api.sanity.io/v{api_version}");
        Self::with_base_url(base_url, dataset.to_string(), token)
    }

    pub fn with_base_url(
        base_url: String,
        dataset: String,
        token: String,
    ) -> Result<Self, StoreError> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| StoreError::Network(format!("failed to build http client: {e}")))?;
        Ok(Self {
            client,
            base_url,
            dataset,
            token,
        })
    }

    async fn mutate(&self, mutations: Value) -> Result<MutationResponse, StoreError> {
        let url = format!("{}/data/mutate/{}?returnIds=true", self.base_url, self.dataset);
        let response = self
            .client
            .post(url)
            .bearer_auth(&self.token)
            .json(&json!({ "mutations": mutations }))
            .send()
            .await
            .map_err(|e| StoreError::Network(e.to_string()))?;
        Self::decode(response).await
    }

    async fn decode<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, StoreError> {
        let status = response.status();
        let bytes = response
            .bytes()
            .await
            .map_err(|e| StoreError::Network(e.to_string()))?;

        if !status.is_success() {
            let message = String::from_utf8_lossy(&bytes).into_owned();
            return Err(StoreError::Api {
                status: status.as_u16(),
                message,
            });
        }
        serde_json::from_slice(&bytes).map_err(|e| StoreError::Decode(e.to_string()))
    }
}

#[async_trait]
impl ContentStore for SanityClient {
    #[instrument(skip(self, params), fields(query = %query))]
    async fn fetch(&self, query: &str, params: &[(&str, Value)]) -> Result<Value, StoreError> {
        let url = format!("{}/data/query/{}", self.base_url, self.dataset);
        let mut request = self
            .client
            .get(url)
            .bearer_auth(&self.token)
            .query(&[("query", query)]);
        for (name, value) in params {
            // GROQ parameters are passed JSON-encoded as `$name`.
            let encoded = serde_json::to_string(value)
                .map_err(|e| StoreError::Decode(e.to_string()))?;
            request = request.query(&[(format!("${name}"), encoded)]);
        }

        let response = request
            .send()
            .await
            .map_err(|e| StoreError::Network(e.to_string()))?;
        let body: QueryResponse = Self::decode(response).await?;
        Ok(body.result)
    }

    #[instrument(skip(self, document))]
    async fn create(&self, document: Value) -> Result<String, StoreError> {
        let body = self.mutate(json!([{ "create": document }])).await?;
        body.results
            .into_iter()
            .next()
            .map(|r| r.id)
            .ok_or_else(|| StoreError::Decode("mutation returned no document id".into()))
    }

    #[instrument(skip(self, patch), fields(document_id = %patch.id))]
    async fn patch(&self, patch: DocumentPatch) -> Result<(), StoreError> {
        let mut body = json!({ "id": patch.id });
        if !patch.set.is_empty() {
            body["set"] = Value::Object(patch.set);
        }
        if !patch.unset.is_empty() {
            body["unset"] = json!(patch.unset);
        }
        self.mutate(json!([{ "patch": body }])).await?;
        Ok(())
    }

    #[instrument(skip(self, bytes), fields(filename = %filename, size = bytes.len()))]
    async fn upload_asset(&self, filename: &str, bytes: Bytes) -> Result<String, StoreError> {
        let url = format!("{}/assets/files/{}", self.base_url, self.dataset);
        let response = self
            .client
            .post(url)
            .bearer_auth(&self.token)
            .query(&[("filename", filename)])
            .header(http::header::CONTENT_TYPE, "application/octet-stream")
            .body(bytes)
            .send()
            .await
            .map_err(|e| StoreError::Network(e.to_string()))?;
        let body: AssetResponse = Self::decode(response).await?;
        Ok(body.document.id)
    }
}
