//! Remote inference backend integration.
//!
//! [`InferencePayload`] builds the wire payload for the three backend
//! operations, [`EmbedderClient`] performs the call with a fixed-interval
//! retry policy for transient unavailability, and [`EmbedError`] keeps the
//! failure classes distinguishable for callers.

mod client;
mod error;
mod payload;

pub use client::{EmbedderClient, FixedRetry};
pub use error::EmbedError;
pub use payload::InferencePayload;

use async_trait::async_trait;

/// Seam over the inference backend so the orchestration pipeline can be
/// exercised without a network.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Obtain the embedding vector for one payload.
    async fn embed(&self, payload: &InferencePayload) -> Result<Vec<f32>, EmbedError>;
}

#[async_trait]
impl Embedder for EmbedderClient {
    async fn embed(&self, payload: &InferencePayload) -> Result<Vec<f32>, EmbedError> {
        EmbedderClient::embed(self, payload).await
    }
}
