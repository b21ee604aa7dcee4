//! Classifier adapter: owns the model lifecycle and turns frames into ranked labels.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde::Serialize;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::model::{ClassificationResult, Frame};
use crate::ports::{ImageModel, InferenceError, ModelAssets, ModelLoadError, ModelLoader};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// Retry and timeout settings for loading the model.
pub struct LoadPolicy {
    /// Attempts per load sequence, at least one.
    pub max_attempts: u32,
    /// Pause between failed attempts.
    pub retry_delay: Duration,
    /// Deadline for a single attempt.
    pub timeout: Duration,
    /// Wait before the background load starts.
    pub startup_delay: Duration,
}

impl Default for LoadPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            retry_delay: Duration::from_millis(2_000),
            timeout: Duration::from_secs(20),
            startup_delay: Duration::from_millis(1_000),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
/// Snapshot of the model lifecycle for display.
pub struct ModelStatus {
    /// A model is loaded and usable.
    pub ready: bool,
    /// A load sequence is running.
    pub loading: bool,
    /// Attempts made since the last reset.
    pub attempts: u32,
    /// Attempts allowed per sequence.
    pub max_attempts: u32,
    /// Error from the most recent failed attempt.
    pub error: Option<String>,
}

impl ModelStatus {
    /// Every attempt failed and nothing is running: the user has to ask for a reload.
    #[must_use]
    pub fn is_exhausted(&self) -> bool {
        !self.ready && !self.loading && self.attempts >= self.max_attempts
    }
}

#[derive(Default)]
struct LoaderState {
    model: Option<Arc<dyn ImageModel>>,
    loading: bool,
    attempts: u32,
    error: Option<ModelLoadError>,
}

/// Wraps a [`ModelLoader`] with bounded retries, a per-attempt timeout, and manual reload.
///
/// All lifecycle state lives in the instance, so independent adapters never share
/// counters or models.
pub struct ClassifierAdapter {
    loader: Arc<dyn ModelLoader>,
    assets: ModelAssets,
    policy: LoadPolicy,
    state: Mutex<LoaderState>,
}

/// Clears the `loading` flag however the sequence ends, including cancellation.
struct LoadingGuard<'adapter> {
    adapter: &'adapter ClassifierAdapter,
}

impl Drop for LoadingGuard<'_> {
    fn drop(&mut self) {
        self.adapter.lock().loading = false;
    }
}

impl ClassifierAdapter {
    /// Create an adapter; nothing is loaded until [`Self::load`] or [`Self::spawn_load`].
    #[must_use]
    pub fn new(loader: Arc<dyn ModelLoader>, assets: ModelAssets, policy: LoadPolicy) -> Self {
        let policy = LoadPolicy {
            max_attempts: policy.max_attempts.max(1),
            ..policy
        };
        Self {
            loader,
            assets,
            policy,
            state: Mutex::new(LoaderState::default()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, LoaderState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Current lifecycle snapshot.
    #[must_use]
    pub fn status(&self) -> ModelStatus {
        let state = self.lock();
        ModelStatus {
            ready: state.model.is_some(),
            loading: state.loading,
            attempts: state.attempts,
            max_attempts: self.policy.max_attempts,
            error: state.error.as_ref().map(ToString::to_string),
        }
    }

    /// Load the model unless it is already loaded or loading.
    ///
    /// # Errors
    ///
    /// Returns [`ModelLoadError::Exhausted`] when all attempts failed, including when a
    /// previous sequence already used them up and [`Self::reset`] was not called.
    pub async fn load(&self) -> Result<(), ModelLoadError> {
        {
            let state = self.lock();
            if state.model.is_some() {
                return Ok(());
            }
            if state.attempts >= self.policy.max_attempts
                && let Some(last) = state.error.clone()
            {
                return Err(ModelLoadError::Exhausted {
                    attempts: state.attempts,
                    last: Box::new(last),
                });
            }
        }
        self.run_sequence().await
    }

    /// Forget attempt counters and the last error. A loaded model is kept.
    pub fn reset(&self) {
        let mut state = self.lock();
        state.attempts = 0;
        state.error = None;
        debug!("classifier load state reset");
    }

    /// User-initiated recovery: reset, then run a fresh load sequence.
    ///
    /// A model that is already loaded stays in use until the new one replaces it.
    ///
    /// # Errors
    ///
    /// Returns [`ModelLoadError::Exhausted`] when every attempt of the new sequence failed.
    pub async fn reload(&self) -> Result<(), ModelLoadError> {
        if self.lock().loading {
            return Ok(());
        }
        self.reset();
        info!(model = %self.assets.model_uri, "reloading classifier model");
        self.run_sequence().await
    }

    /// Start loading in the background after the configured startup delay.
    pub fn spawn_load(self: &Arc<Self>) -> JoinHandle<()> {
        let adapter = Arc::clone(self);
        tokio::spawn(async move {
            tokio::time::sleep(adapter.policy.startup_delay).await;
            if let Err(err) = adapter.load().await {
                warn!(error = %err, "classifier unavailable; continuing without a model");
            }
        })
    }

    /// Run [`Self::reload`] on a background task.
    pub fn spawn_reload(self: &Arc<Self>) -> JoinHandle<()> {
        let adapter = Arc::clone(self);
        tokio::spawn(async move {
            if let Err(err) = adapter.reload().await {
                warn!(error = %err, "manual classifier reload failed");
            }
        })
    }

    async fn run_sequence(&self) -> Result<(), ModelLoadError> {
        {
            let mut state = self.lock();
            if state.loading {
                return Ok(());
            }
            state.loading = true;
        }
        let _guard = LoadingGuard { adapter: self };

        loop {
            let attempt = {
                let mut state = self.lock();
                state.attempts += 1;
                state.attempts
            };
            info!(
                attempt,
                max_attempts = self.policy.max_attempts,
                model = %self.assets.model_uri,
                metadata = %self.assets.metadata_uri,
                "loading classifier model"
            );

            let failure =
                match tokio::time::timeout(self.policy.timeout, self.loader.load(&self.assets))
                    .await
                {
                    Ok(Ok(model)) => {
                        let mut state = self.lock();
                        state.model = Some(model);
                        state.error = None;
                        info!(attempt, "classifier model loaded");
                        return Ok(());
                    }
                    Ok(Err(err)) => err,
                    Err(_elapsed) => ModelLoadError::TimedOut(self.policy.timeout),
                };

            warn!(attempt, error = %failure, "classifier model load attempt failed");
            self.lock().error = Some(failure.clone());

            if attempt >= self.policy.max_attempts {
                return Err(ModelLoadError::Exhausted {
                    attempts: attempt,
                    last: Box::new(failure),
                });
            }
            tokio::time::sleep(self.policy.retry_delay).await;
        }
    }

    /// Classify one still frame.
    ///
    /// # Errors
    ///
    /// Returns [`InferenceError::ModelUnavailable`] when no model is loaded,
    /// [`InferenceError::InvalidFrame`] for malformed frames, and backend or output
    /// errors from the model.
    pub async fn classify(&self, frame: Frame) -> Result<ClassificationResult, InferenceError> {
        let model = self
            .lock()
            .model
            .clone()
            .ok_or(InferenceError::ModelUnavailable)?;

        if !frame.is_valid() {
            return Err(InferenceError::InvalidFrame(format!(
                "{}x{} frame with {} bytes",
                frame.width,
                frame.height,
                frame.rgb.len()
            )));
        }

        let predictions = tokio::task::spawn_blocking(move || model.predict(&frame))
            .await
            .map_err(|err| InferenceError::Backend(err.to_string()))??;

        let result = ClassificationResult::new(predictions)?;
        debug!(
            top = %result.top().label,
            confidence = result.top().confidence,
            "frame classified"
        );
        Ok(result)
    }
}
