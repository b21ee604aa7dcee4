//! Traits describing the external collaborators and the errors they report.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Error as ReqwestError;

use crate::model::{CenterId, CollectionCenter, Frame, Prediction};

#[derive(thiserror::Error, Debug, Clone)]
/// Errors raised while fetching or initialising the pretrained model.
pub enum ModelLoadError {
    /// Model or metadata asset could not be read.
    #[error("Failed to fetch {uri}: {reason}")]
    Asset {
        /// Location of the asset.
        uri: String,
        /// Underlying failure.
        reason: String,
    },
    /// Metadata file is malformed.
    #[error("Invalid model metadata: {0}")]
    Metadata(String),
    /// Inference backend rejected the model.
    #[error("Model initialisation failed: {0}")]
    Init(String),
    /// A single attempt ran past the load timeout.
    #[error("Model load timed out after {0:?}")]
    TimedOut(Duration),
    /// Every attempt failed.
    #[error("Model load gave up after {attempts} attempts: {last}")]
    Exhausted {
        /// Number of attempts made.
        attempts: u32,
        /// Error from the final attempt.
        last: Box<ModelLoadError>,
    },
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
/// Errors raised when a frame cannot be classified.
pub enum InferenceError {
    /// No model is loaded yet, or loading failed.
    #[error("Model not ready")]
    ModelUnavailable,
    /// Frame has no pixels or a buffer that does not match its size.
    #[error("Invalid frame: {0}")]
    InvalidFrame(String),
    /// Model produced unusable scores.
    #[error("Invalid classifier output: {0}")]
    InvalidOutput(String),
    /// Inference backend failed.
    #[error("Inference failed: {0}")]
    Backend(String),
}

#[derive(thiserror::Error, Debug)]
/// Errors that can occur while querying the remote data store.
pub enum LookupError {
    /// Network layer failed.
    #[error("Network error: {0}")]
    Network(#[from] ReqwestError),
    /// Backend answered with an error status.
    #[error("Data store returned status {status}: {body}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Response body, possibly truncated.
        body: String,
    },
    /// Response body did not match the expected rows.
    #[error("Decode error: {0}")]
    Decode(String),
    /// Query ran past the lookup timeout.
    #[error("Lookup timed out after {0:?}")]
    TimedOut(Duration),
    /// Internal adapter error.
    #[error("Internal error: {0}")]
    Internal(String),
}

#[derive(thiserror::Error, Debug)]
/// Errors raised by a capture source.
pub enum CaptureError {
    /// Device or source could not be opened.
    #[error("Capture source unavailable: {0}")]
    Unavailable(String),
    /// Frame could not be grabbed or decoded.
    #[error("Frame capture failed: {0}")]
    Frame(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// Locations of the model weights and of its label metadata.
pub struct ModelAssets {
    /// Model file path or URI.
    pub model_uri: String,
    /// Metadata file path or URI.
    pub metadata_uri: String,
}

impl ModelAssets {
    /// Construct the asset pair.
    #[must_use]
    pub fn new<M: Into<String>, D: Into<String>>(model_uri: M, metadata_uri: D) -> Self {
        Self {
            model_uri: model_uri.into(),
            metadata_uri: metadata_uri.into(),
        }
    }
}

/// A loaded pretrained classifier.
pub trait ImageModel: Send + Sync {
    /// Score every known label for one frame.
    ///
    /// Blocking; callers run it off the async executor.
    ///
    /// # Errors
    ///
    /// Returns an [`InferenceError`] when the backend fails.
    fn predict(&self, frame: &Frame) -> Result<Vec<Prediction>, InferenceError>;
}

#[async_trait]
/// Trait for backends able to materialise an [`ImageModel`].
pub trait ModelLoader: Send + Sync {
    /// Fetch and initialise the model once.
    ///
    /// # Errors
    ///
    /// Returns a [`ModelLoadError`] when an asset is missing or invalid.
    async fn load(&self, assets: &ModelAssets) -> Result<Arc<dyn ImageModel>, ModelLoadError>;
}

#[async_trait]
/// General fee table keyed by item label.
pub trait FeeTablePort: Send + Sync {
    /// Base disposal amount for a label, `None` when no row exists.
    ///
    /// # Errors
    ///
    /// Returns a [`LookupError`] when the query fails.
    async fn base_amount(&self, label: &str) -> Result<Option<f64>, LookupError>;
}

#[async_trait]
/// Collection center table.
pub trait CenterTablePort: Send + Sync {
    /// Centers whose identifier equals `id`.
    ///
    /// # Errors
    ///
    /// Returns a [`LookupError`] when the query fails.
    async fn by_id(&self, id: &CenterId) -> Result<Vec<CollectionCenter>, LookupError>;

    /// Centers whose accepted-items text contains any of `terms`, ignoring case.
    ///
    /// # Errors
    ///
    /// Returns a [`LookupError`] when the query fails.
    async fn search_accepted_items(
        &self,
        terms: &[String],
        limit: usize,
    ) -> Result<Vec<CollectionCenter>, LookupError>;

    /// Fee configured on the first center row with identifier `id`.
    ///
    /// # Errors
    ///
    /// Returns a [`LookupError`] when the query fails.
    async fn center_amount(&self, id: &CenterId) -> Result<Option<f64>, LookupError>;
}

/// An open capture stream owned by exactly one viewer.
pub trait FrameStream: Send {
    /// Grab the current still frame.
    ///
    /// # Errors
    ///
    /// Returns a [`CaptureError`] when no frame can be produced.
    fn capture_frame(&mut self) -> Result<Frame, CaptureError>;

    /// Release the underlying device. Called exactly once.
    fn stop(&mut self);
}

/// Source of still frames, such as a camera or a file picker.
pub trait CapturePort: Send + Sync {
    /// Open a new stream.
    ///
    /// # Errors
    ///
    /// Returns a [`CaptureError`] when the source cannot be opened.
    fn start(&self) -> Result<Box<dyn FrameStream>, CaptureError>;
}
