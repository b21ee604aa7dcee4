//! Image classifier for exported Teachable Machine style ONNX models, run with tract.

use std::io::Cursor;
use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, info};
use tract_onnx::prelude::*;

use recyclo_core::{
    model::{Frame, Prediction},
    ports::{ImageModel, InferenceError, ModelAssets, ModelLoadError, ModelLoader},
};

mod preprocess;

use preprocess::frame_to_tensor;

/// Input edge length used when the metadata does not name one.
pub const DEFAULT_IMAGE_SIZE: u32 = 224;

type Plan = SimplePlan<TypedFact, Box<dyn TypedOp>, TypedModel>;

/// Contents of the model's `metadata.json` that inference depends on.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelMetadata {
    /// Class names in output order.
    pub labels: Vec<String>,
    /// Square input edge length in pixels.
    #[serde(default = "default_image_size")]
    pub image_size: u32,
}

fn default_image_size() -> u32 {
    DEFAULT_IMAGE_SIZE
}

impl ModelMetadata {
    /// Parse metadata JSON.
    ///
    /// # Errors
    ///
    /// Returns [`ModelLoadError::Metadata`] when the JSON is malformed, has no labels, or
    /// names a zero image size.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, ModelLoadError> {
        let metadata: Self = serde_json::from_slice(bytes)
            .map_err(|err| ModelLoadError::Metadata(err.to_string()))?;
        if metadata.labels.is_empty() {
            return Err(ModelLoadError::Metadata("no labels".to_owned()));
        }
        if metadata.image_size == 0 {
            return Err(ModelLoadError::Metadata("imageSize is zero".to_owned()));
        }
        Ok(metadata)
    }
}

/// Loaded ONNX model with its labels.
pub struct OnnxImageModel {
    plan: Plan,
    metadata: ModelMetadata,
}

impl OnnxImageModel {
    /// Build a runnable plan from raw ONNX bytes.
    ///
    /// # Errors
    ///
    /// Returns [`ModelLoadError::Init`] when tract cannot parse or optimise the model.
    pub fn from_bytes(bytes: &[u8], metadata: ModelMetadata) -> Result<Self, ModelLoadError> {
        let edge = usize::try_from(metadata.image_size)
            .map_err(|err| ModelLoadError::Init(err.to_string()))?;
        let plan = onnx()
            .model_for_read(&mut Cursor::new(bytes))
            .and_then(|model| model.with_input_fact(0, f32::fact([1, edge, edge, 3]).into()))
            .and_then(|model| model.into_optimized())
            .and_then(|model| model.into_runnable())
            .map_err(|err| ModelLoadError::Init(format!("{err:#}")))?;

        Ok(Self { plan, metadata })
    }

    /// Class names in output order.
    #[must_use]
    pub fn labels(&self) -> &[String] {
        &self.metadata.labels
    }
}

impl ImageModel for OnnxImageModel {
    fn predict(&self, frame: &Frame) -> Result<Vec<Prediction>, InferenceError> {
        let input = frame_to_tensor(frame, self.metadata.image_size)?;
        let outputs = self
            .plan
            .run(tvec!(input.into_tvalue()))
            .map_err(|err| InferenceError::Backend(format!("{err:#}")))?;
        let scores = outputs
            .first()
            .ok_or_else(|| InferenceError::Backend("model produced no output".to_owned()))?
            .to_array_view::<f32>()
            .map_err(|err| InferenceError::Backend(format!("{err:#}")))?;

        pair_scores(&self.metadata.labels, scores.iter().copied())
    }
}

/// Pair scores with labels in order.
fn pair_scores<I>(labels: &[String], scores: I) -> Result<Vec<Prediction>, InferenceError>
where
    I: IntoIterator<Item = f32>,
{
    let scores: Vec<f32> = scores.into_iter().collect();
    if scores.len() != labels.len() {
        return Err(InferenceError::Backend(format!(
            "model returned {} scores for {} labels",
            scores.len(),
            labels.len()
        )));
    }

    // Softmax outputs can overshoot 1.0 by rounding.
    Ok(labels
        .iter()
        .zip(scores)
        .map(|(label, score)| Prediction::new(label.as_str(), score.clamp(0.0, 1.0)))
        .collect())
}

/// Loads model and metadata from local paths or http(s) URIs.
pub struct OnnxModelLoader {
    client: Client,
}

impl OnnxModelLoader {
    /// Create a new loader bound to the given HTTP client.
    #[must_use]
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    async fn fetch(&self, uri: &str) -> Result<Vec<u8>, ModelLoadError> {
        let asset_error = |reason: String| ModelLoadError::Asset {
            uri: uri.to_owned(),
            reason,
        };

        if is_remote(uri) {
            debug!(uri, "downloading model asset");
            let resp = self
                .client
                .get(uri)
                .send()
                .await
                .and_then(reqwest::Response::error_for_status)
                .map_err(|err| asset_error(err.to_string()))?;
            let bytes = resp
                .bytes()
                .await
                .map_err(|err| asset_error(err.to_string()))?;
            return Ok(bytes.to_vec());
        }

        debug!(path = uri, "reading model asset");
        tokio::fs::read(uri)
            .await
            .map_err(|err| asset_error(err.to_string()))
    }
}

#[async_trait]
impl ModelLoader for OnnxModelLoader {
    async fn load(&self, assets: &ModelAssets) -> Result<Arc<dyn ImageModel>, ModelLoadError> {
        let metadata = ModelMetadata::from_slice(&self.fetch(&assets.metadata_uri).await?)?;
        let bytes = self.fetch(&assets.model_uri).await?;

        let build = move || OnnxImageModel::from_bytes(&bytes, metadata);
        let model = tokio::task::spawn_blocking(build)
            .await
            .map_err(|err| ModelLoadError::Init(err.to_string()))??;
        info!(uri = %assets.model_uri, labels = model.labels().len(), "model ready");

        Ok(Arc::new(model))
    }
}

fn is_remote(uri: &str) -> bool {
    uri.starts_with("http://") || uri.starts_with("https://")
}

/// Build a loader for ONNX models.
#[must_use]
pub fn loader(client: Client) -> Arc<dyn ModelLoader> {
    Arc::new(OnnxModelLoader::new(client))
}
