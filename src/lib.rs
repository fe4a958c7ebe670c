//! Zero-shot object detection over a remote embedding backend and a managed
//! vector store.
//!
//! The crate embeds short text labels and images into fixed-length vectors by
//! calling an external inference endpoint, persists those vectors in a
//! similarity-search store, and answers "what is the main object in this
//! image" by nearest-neighbor lookup against the stored catalog.
//!
//! Module map:
//!
//! - [`limiter`]: per-client sliding-window admission control for the public
//!   endpoints.
//! - [`embedding`]: payload construction and the retrying backend client.
//! - [`store`]: the two vector-store operations the pipeline needs, behind a
//!   trait, plus the REST client for the managed store.
//! - [`service`]: the orchestration pipeline (catalog load, single-item
//!   embed, query-by-image).
//! - [`server`]: the axum front end gating the pipeline behind the limiter.
//! - [`config`]: environment-driven configuration for all of the above.

pub mod config;
pub mod embedding;
pub mod limiter;
pub mod server;
pub mod service;
pub mod store;

pub use config::AppConfig;
pub use embedding::{EmbedError, Embedder, EmbedderClient, FixedRetry, InferencePayload};
pub use limiter::{LimiterError, SlidingWindowLimiter};
pub use service::{Catalog, CatalogItem, DetectorService, ServiceError};
pub use store::{PineconeStore, SearchResult, StoreError, VectorStore};
