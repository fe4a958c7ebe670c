//! Vector store boundary.
//!
//! The orchestration needs exactly two operations from the external
//! similarity-search store: insert-or-replace a vector under an id, and fetch
//! the nearest neighbors of a query vector. [`VectorStore`] models those two
//! calls; [`PineconeStore`] speaks the managed store's REST surface. The
//! store's index structure and consistency model are not reproduced here.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use thiserror::Error;

/// Failures from the vector store boundary.
#[derive(Debug, Error)]
pub enum StoreError {
    /// An argument violated the store contract; caught before the wire call.
    #[error("invalid store argument: {0}")]
    InvalidArgument(String),

    /// Connection-level failure talking to the store.
    #[error("vector store transport failure: {0}")]
    Transport(#[source] reqwest::Error),

    /// The store answered with an error status; its own reason text is kept.
    #[error("vector store request failed with status {status}: {reason}")]
    Api { status: StatusCode, reason: String },

    /// The store responded successfully but with an unexpected shape.
    #[error("unexpected vector store response: {0}")]
    Decode(String),
}

/// Single ranked match from a nearest-neighbor query.
///
/// Ordering is the store's similarity ranking (highest first); callers must
/// not re-sort.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SearchResult {
    pub score: f32,
    /// Store-side metadata record; the store's wire name is `metadata`.
    #[serde(default, alias = "metadata")]
    pub attributes: Map<String, Value>,
}

/// The two store operations the orchestration pipeline consumes.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Insert or replace one vector under `id` with its attribute record.
    async fn upsert(
        &self,
        id: &str,
        vector: &[f32],
        attributes: Map<String, Value>,
    ) -> Result<(), StoreError>;

    /// Nearest neighbors of `vector`, at most `top_k`, in ranking order.
    async fn query(&self, vector: &[f32], top_k: usize) -> Result<Vec<SearchResult>, StoreError>;
}

/// REST client for the managed vector store.
#[derive(Debug)]
pub struct PineconeStore {
    http: reqwest::Client,
    host: String,
    api_key: String,
    namespace: String,
    dimension: Option<usize>,
}

impl PineconeStore {
    /// Create a client for one index host and namespace.
    ///
    /// The namespace is mandatory; writing into the store's default namespace
    /// by accident has bitten before.
    pub fn new(
        host: impl Into<String>,
        api_key: impl Into<String>,
        namespace: impl Into<String>,
    ) -> Result<Self, StoreError> {
        let namespace = namespace.into();
        if namespace.is_empty() {
            return Err(StoreError::InvalidArgument(
                "namespace must not be empty".into(),
            ));
        }
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .connect_timeout(Duration::from_secs(10))
            .build()
            .expect("failed to build HTTP client");
        Ok(Self {
            http,
            host: host.into(),
            api_key: api_key.into(),
            namespace,
            dimension: None,
        })
    }

    /// Pin the dimensionality the index was configured with; vectors of any
    /// other length are rejected before the wire call.
    pub fn with_dimension(mut self, dimension: usize) -> Self {
        self.dimension = Some(dimension);
        self
    }

    fn endpoint(&self, path: &str) -> String {
        let host = self.host.trim_end_matches('/');
        if host.starts_with("http://") || host.starts_with("https://") {
            format!("{host}/{path}")
        } else {
            format!("https://{host}/{path}")
        }
    }

    fn check_vector(&self, vector: &[f32]) -> Result<(), StoreError> {
        if let Some(dimension) = self.dimension {
            if vector.len() != dimension {
                return Err(StoreError::InvalidArgument(format!(
                    "vector has {} dimensions, index expects {dimension}",
                    vector.len()
                )));
            }
        }
        Ok(())
    }

    async fn post(&self, path: &str, body: Value) -> Result<Value, StoreError> {
        let response = self
            .http
            .post(self.endpoint(path))
            .header("Api-Key", &self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(StoreError::Transport)?;

        let status = response.status();
        if !status.is_success() {
            let reason = response.text().await.unwrap_or_default();
            return Err(StoreError::Api { status, reason });
        }
        response
            .json()
            .await
            .map_err(|err| StoreError::Decode(format!("invalid JSON body: {err}")))
    }
}

#[derive(Debug, Deserialize)]
struct QueryReply {
    #[serde(default)]
    matches: Vec<SearchResult>,
}

#[async_trait]
impl VectorStore for PineconeStore {
    async fn upsert(
        &self,
        id: &str,
        vector: &[f32],
        attributes: Map<String, Value>,
    ) -> Result<(), StoreError> {
        if id.is_empty() {
            return Err(StoreError::InvalidArgument(
                "vector id must not be empty".into(),
            ));
        }
        self.check_vector(vector)?;

        let body = json!({
            "vectors": [{
                "id": id,
                "values": vector,
                "metadata": attributes,
            }],
            "namespace": self.namespace,
        });
        let reply = self.post("vectors/upsert", body).await?;
        let count = reply
            .get("upsertedCount")
            .and_then(Value::as_u64)
            .unwrap_or(0);
        if count != 1 {
            return Err(StoreError::Decode(format!(
                "store reported {count} upserted vectors, expected 1"
            )));
        }
        Ok(())
    }

    async fn query(&self, vector: &[f32], top_k: usize) -> Result<Vec<SearchResult>, StoreError> {
        if top_k == 0 {
            return Err(StoreError::InvalidArgument("top_k must be positive".into()));
        }
        self.check_vector(vector)?;

        let body = json!({
            "vector": vector,
            "topK": top_k,
            "namespace": self.namespace,
            "includeMetadata": true,
            "includeValues": false,
        });
        let reply = self.post("query", body).await?;
        let reply: QueryReply = serde_json::from_value(reply)
            .map_err(|err| StoreError::Decode(format!("malformed query reply: {err}")))?;
        Ok(reply.matches)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> PineconeStore {
        PineconeStore::new("index.example.test", "key", "catalog").unwrap()
    }

    #[test]
    fn empty_namespace_is_a_construction_error() {
        let err = PineconeStore::new("host", "key", "").unwrap_err();
        assert!(matches!(err, StoreError::InvalidArgument(_)));
    }

    #[test]
    fn endpoint_prepends_https_for_bare_hosts() {
        let store = store();
        assert_eq!(
            store.endpoint("vectors/upsert"),
            "https://index.example.test/vectors/upsert"
        );
        let explicit = PineconeStore::new("http://localhost:9000/", "key", "ns").unwrap();
        assert_eq!(explicit.endpoint("query"), "http://localhost:9000/query");
    }

    #[tokio::test]
    async fn empty_id_is_rejected_before_the_wire() {
        let err = store().upsert("", &[0.1], Map::new()).await.unwrap_err();
        assert!(matches!(err, StoreError::InvalidArgument(_)));
    }

    #[tokio::test]
    async fn zero_top_k_is_rejected_before_the_wire() {
        let err = store().query(&[0.1], 0).await.unwrap_err();
        assert!(matches!(err, StoreError::InvalidArgument(_)));
    }

    #[tokio::test]
    async fn dimension_mismatch_is_rejected_before_the_wire() {
        let store = store().with_dimension(3);
        let err = store.upsert("id", &[0.1, 0.2], Map::new()).await.unwrap_err();
        assert!(matches!(err, StoreError::InvalidArgument(msg) if msg.contains("expects 3")));
    }

    #[test]
    fn query_reply_parses_matches_with_metadata() {
        let reply: QueryReply = serde_json::from_value(json!({
            "matches": [
                {"id": "img-1", "score": 0.92, "metadata": {"value": "tabby cat"}},
                {"id": "text-7", "score": 0.81}
            ]
        }))
        .unwrap();
        assert_eq!(reply.matches.len(), 2);
        assert_eq!(reply.matches[0].score, 0.92);
        assert_eq!(
            reply.matches[0].attributes.get("value"),
            Some(&Value::String("tabby cat".into()))
        );
        assert!(reply.matches[1].attributes.is_empty());
    }
}
