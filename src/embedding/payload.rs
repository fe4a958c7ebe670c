//! Wire payload construction for the inference backend.
//!
//! A pure mapping from typed input to the backend's JSON shape; the only side
//! effect is reading the image file. The variant is discriminated by an
//! explicit operation tag, never by which optional fields happen to be set.

use std::fs;
use std::path::Path;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::Serialize;

use super::error::EmbedError;

const OP_GET_EMBEDDINGS: &str = "get-embeddings";
const OP_FIND_MAIN_OBJECT: &str = "find-main-object";

/// One embedding request, built once per call and immutable afterwards.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct InferencePayload {
    inputs: Inputs,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
struct Inputs {
    #[serde(skip_serializing_if = "Option::is_none")]
    image: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    candidates: Option<Vec<String>>,
    #[serde(rename = "type")]
    operation: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    mode: Option<&'static str>,
}

impl InferencePayload {
    /// Text-embedding request from a comma-delimited label string.
    ///
    /// Labels are split on commas and trimmed; entries that trim to nothing
    /// are dropped. An empty resulting list is an input error, not an
    /// empty-candidates request.
    pub fn text(labels_csv: &str) -> Result<Self, EmbedError> {
        let labels: Vec<String> = labels_csv
            .split(',')
            .map(str::trim)
            .filter(|label| !label.is_empty())
            .map(str::to_owned)
            .collect();
        if labels.is_empty() {
            return Err(EmbedError::InvalidInput(
                "label list is empty after trimming".into(),
            ));
        }
        Ok(Self {
            inputs: Inputs {
                image: None,
                candidates: Some(labels),
                operation: OP_GET_EMBEDDINGS,
                mode: Some("text"),
            },
        })
    }

    /// Image-embedding request from a readable image file.
    pub fn image(path: &Path) -> Result<Self, EmbedError> {
        Ok(Self {
            inputs: Inputs {
                image: Some(encode_image(path)?),
                candidates: None,
                operation: OP_GET_EMBEDDINGS,
                mode: Some("image"),
            },
        })
    }

    /// Main-object query: same image encoding, different backend operation,
    /// no candidate list.
    pub fn main_object(path: &Path) -> Result<Self, EmbedError> {
        Ok(Self {
            inputs: Inputs {
                image: Some(encode_image(path)?),
                candidates: None,
                operation: OP_FIND_MAIN_OBJECT,
                mode: None,
            },
        })
    }
}

fn encode_image(path: &Path) -> Result<String, EmbedError> {
    let bytes = fs::read(path).map_err(|source| EmbedError::ImageRead {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(BASE64.encode(bytes))
}
