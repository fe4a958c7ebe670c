//! Orchestration pipeline: build request, call inference, extract vector,
//! call store, shape the result.
//!
//! Three use cases share the same sequencing: pre-loading a catalog of known
//! objects, embedding one interactive upload, and answering a main-object
//! query. The service is stateless beyond its two collaborators and safe to
//! share behind an `Arc`.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Deserialize;
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::info;

use crate::embedding::{EmbedError, Embedder, InferencePayload};
use crate::store::{SearchResult, StoreError, VectorStore};

/// Neighbors fetched for a main-object query.
const DETECT_TOP_K: usize = 20;

/// Failures from the orchestration pipeline, with enough context to name the
/// item or call that failed.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// A catalog item without an id is a fatal configuration error, never a
    /// skip; silent partial loads corrupt the catalog invisibly.
    #[error("catalog item {index} has an empty id")]
    EmptyItemId { index: usize },

    #[error("failed to read catalog {}: {source}", path.display())]
    CatalogRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse catalog {}: {source}", path.display())]
    CatalogParse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("embedding failed for item `{id}`: {source}")]
    Embed {
        id: String,
        #[source]
        source: EmbedError,
    },

    #[error("upsert of `{vector_id}` failed for item `{id}`: {source}")]
    Upsert {
        id: String,
        vector_id: String,
        #[source]
        source: StoreError,
    },

    #[error("query embedding failed: {source}")]
    Detect {
        #[source]
        source: EmbedError,
    },

    #[error("vector store query failed: {source}")]
    Query {
        #[source]
        source: StoreError,
    },
}

impl ServiceError {
    /// True when the failure was caught before any network call, so the
    /// front end can report it as a client error rather than a pipeline one.
    pub fn is_validation(&self) -> bool {
        match self {
            ServiceError::EmptyItemId { .. }
            | ServiceError::CatalogRead { .. }
            | ServiceError::CatalogParse { .. } => true,
            ServiceError::Embed { source, .. } | ServiceError::Detect { source } => matches!(
                source,
                EmbedError::InvalidInput(_) | EmbedError::ImageRead { .. }
            ),
            ServiceError::Upsert { source, .. } | ServiceError::Query { source } => {
                matches!(source, StoreError::InvalidArgument(_))
            }
        }
    }
}

/// Operator-supplied record driving a batch embedding load.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct CatalogItem {
    pub image_file: PathBuf,
    pub label: String,
    pub id: String,
}

/// Catalog of known objects, loaded from a JSON file of the shape
/// `{"items": [{"image_file": ..., "label": ..., "id": ...}]}`.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct Catalog {
    pub items: Vec<CatalogItem>,
}

impl Catalog {
    pub fn load(path: &Path) -> Result<Self, ServiceError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ServiceError::CatalogRead {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&raw).map_err(|source| ServiceError::CatalogParse {
            path: path.to_path_buf(),
            source,
        })
    }
}

/// Sequences builder, backend call, and store call for the three use cases.
pub struct DetectorService {
    embedder: Arc<dyn Embedder>,
    store: Arc<dyn VectorStore>,
}

impl DetectorService {
    pub fn new(embedder: Arc<dyn Embedder>, store: Arc<dyn VectorStore>) -> Self {
        Self { embedder, store }
    }

    /// Embed and upsert every catalog item.
    ///
    /// All item ids are validated up front, before any network call. A
    /// failure for one item aborts the load and names that item.
    pub async fn load_catalog(&self, catalog: &Catalog) -> Result<(), ServiceError> {
        for (index, item) in catalog.items.iter().enumerate() {
            if item.id.is_empty() {
                return Err(ServiceError::EmptyItemId { index });
            }
        }
        for item in &catalog.items {
            self.embed_item(item).await?;
            info!(id = %item.id, label = %item.label, "catalog item embedded");
        }
        Ok(())
    }

    /// One item's sequence: text vector under `text-<id>`, image vector
    /// under `img-<id>`, both sharing the `{"value": label}` attribute
    /// record. Strictly sequential within the item.
    async fn embed_item(&self, item: &CatalogItem) -> Result<(), ServiceError> {
        let text_payload = InferencePayload::text(&item.label)
            .map_err(|source| self.embed_err(item, source))?;
        let text_vector = self
            .embedder
            .embed(&text_payload)
            .await
            .map_err(|source| self.embed_err(item, source))?;

        let image_payload = InferencePayload::image(&item.image_file)
            .map_err(|source| self.embed_err(item, source))?;
        let image_vector = self
            .embedder
            .embed(&image_payload)
            .await
            .map_err(|source| self.embed_err(item, source))?;

        // the label only; image bytes never go into store attributes
        let mut attributes = Map::new();
        attributes.insert("value".into(), Value::String(item.label.clone()));

        let text_id = format!("text-{}", item.id);
        self.store
            .upsert(&text_id, &text_vector, attributes.clone())
            .await
            .map_err(|source| ServiceError::Upsert {
                id: item.id.clone(),
                vector_id: text_id,
                source,
            })?;

        let image_id = format!("img-{}", item.id);
        self.store
            .upsert(&image_id, &image_vector, attributes)
            .await
            .map_err(|source| ServiceError::Upsert {
                id: item.id.clone(),
                vector_id: image_id,
                source,
            })?;
        Ok(())
    }

    fn embed_err(&self, item: &CatalogItem, source: EmbedError) -> ServiceError {
        ServiceError::Embed {
            id: item.id.clone(),
            source,
        }
    }

    /// Embed one uploaded image already persisted to disk: the catalog-load
    /// sequence for exactly one item.
    pub async fn embed_upload(
        &self,
        image_file: &Path,
        label: &str,
        id: &str,
    ) -> Result<(), ServiceError> {
        let catalog = Catalog {
            items: vec![CatalogItem {
                image_file: image_file.to_path_buf(),
                label: label.to_owned(),
                id: id.to_owned(),
            }],
        };
        self.load_catalog(&catalog).await
    }

    /// Find the catalog entries closest to the main object of an image.
    ///
    /// Results come back in the store's ranking order with their scores; an
    /// empty list is a valid "no match" outcome, not an error.
    pub async fn detect(&self, image_file: &Path) -> Result<Vec<SearchResult>, ServiceError> {
        let payload = InferencePayload::main_object(image_file)
            .map_err(|source| ServiceError::Detect { source })?;
        let vector = self
            .embedder
            .embed(&payload)
            .await
            .map_err(|source| ServiceError::Detect { source })?;
        self.store
            .query(&vector, DETECT_TOP_K)
            .await
            .map_err(|source| ServiceError::Query { source })
    }
}

/// Split a client-supplied filename into a storage-safe identifier and the
/// original extension.
///
/// Anything outside letters, digits, hyphen, and underscore in the base name
/// becomes a hyphen; the extension (final `.` onward) is returned separately
/// so the stored file keeps its type. The extension is held to letters,
/// digits, and the leading dot, so neither half can smuggle a path
/// separator into the storage path.
pub fn sanitize_filename(filename: &str) -> (String, String) {
    let (base, ext) = match filename.rfind('.') {
        Some(pos) if pos > 0 => filename.split_at(pos),
        _ => (filename, ""),
    };
    let id = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '-'
            }
        })
        .collect();
    let ext = ext
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '.' {
                c
            } else {
                '-'
            }
        })
        .collect();
    (id, ext)
}
