//! In-memory fakes for every port, shared by the unit tests.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;

use crate::model::{BusinessHours, CenterId, CollectionCenter, Frame, Prediction};
use crate::ports::{
    CaptureError, CapturePort, CenterTablePort, FeeTablePort, FrameStream, ImageModel,
    InferenceError, LookupError, ModelAssets, ModelLoadError, ModelLoader,
};

pub(crate) fn solid_frame(width: u32, height: u32) -> Frame {
    tinted_frame(width, height, 0)
}

/// Frame whose every byte is `tint`; [`FakeModel::keyed`] picks its output from it.
pub(crate) fn tinted_frame(width: u32, height: u32, tint: u8) -> Frame {
    let len = usize::try_from(width * height * 3).unwrap_or_default();
    Frame::new(width, height, vec![tint; len])
}

pub(crate) fn center(id: &str, name: &str, accepted: &str, point: Option<f64>) -> CollectionCenter {
    CollectionCenter {
        id: CenterId(id.to_owned()),
        name: name.to_owned(),
        address: Some(format!("{name} street 1")),
        phone: None,
        accepted_items: Some(accepted.to_owned()),
        parking_info: None,
        hours: BusinessHours::default(),
        point,
    }
}

pub(crate) struct FakeModel {
    outputs: HashMap<u8, Vec<Prediction>>,
    fallback: Vec<Prediction>,
}

impl FakeModel {
    pub(crate) fn fixed(predictions: Vec<Prediction>) -> Self {
        Self {
            outputs: HashMap::new(),
            fallback: predictions,
        }
    }

    pub(crate) fn keyed(outputs: Vec<(u8, Vec<Prediction>)>) -> Self {
        Self {
            outputs: outputs.into_iter().collect(),
            fallback: Vec::new(),
        }
    }
}

impl ImageModel for FakeModel {
    fn predict(&self, frame: &Frame) -> Result<Vec<Prediction>, InferenceError> {
        let key = frame.rgb.first().copied().unwrap_or_default();
        Ok(self
            .outputs
            .get(&key)
            .cloned()
            .unwrap_or_else(|| self.fallback.clone()))
    }
}

pub(crate) struct FakeLoader {
    fail_first: u32,
    hang: bool,
    calls: AtomicU32,
    model: Arc<FakeModel>,
}

impl FakeLoader {
    /// Fails the first `fail_first` calls, then hands out `model`.
    pub(crate) fn failing(fail_first: u32, model: FakeModel) -> Self {
        Self {
            fail_first,
            hang: false,
            calls: AtomicU32::new(0),
            model: Arc::new(model),
        }
    }

    pub(crate) fn hanging() -> Self {
        Self {
            hang: true,
            ..Self::failing(0, FakeModel::fixed(Vec::new()))
        }
    }

    pub(crate) fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ModelLoader for FakeLoader {
    async fn load(&self, assets: &ModelAssets) -> Result<Arc<dyn ImageModel>, ModelLoadError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if self.hang {
            std::future::pending::<()>().await;
        }
        if call <= self.fail_first {
            return Err(ModelLoadError::Asset {
                uri: assets.model_uri.clone(),
                reason: "HTTP 404".to_owned(),
            });
        }
        let model = Arc::clone(&self.model);
        Ok(model)
    }
}

#[derive(Default)]
pub(crate) struct FakeFeeTable {
    pub(crate) amounts: HashMap<String, f64>,
    pub(crate) fail: bool,
    pub(crate) delay: Option<Duration>,
}

impl FakeFeeTable {
    pub(crate) fn with(amounts: &[(&str, f64)]) -> Self {
        Self {
            amounts: amounts
                .iter()
                .map(|(label, amount)| ((*label).to_owned(), *amount))
                .collect(),
            ..Self::default()
        }
    }
}

#[async_trait]
impl FeeTablePort for FakeFeeTable {
    async fn base_amount(&self, label: &str) -> Result<Option<f64>, LookupError> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail {
            return Err(LookupError::Internal("fee table offline".to_owned()));
        }
        Ok(self.amounts.get(label).copied())
    }
}

#[derive(Default)]
pub(crate) struct FakeCenterTable {
    pub(crate) centers: Vec<CollectionCenter>,
    pub(crate) fail_by_id: bool,
    pub(crate) fail_search: bool,
    pub(crate) fail_amount: bool,
    /// Per-identifier latency for `by_id`.
    pub(crate) delays: HashMap<String, Duration>,
    pub(crate) search_calls: AtomicU32,
}

impl FakeCenterTable {
    pub(crate) fn with(centers: Vec<CollectionCenter>) -> Self {
        Self {
            centers,
            ..Self::default()
        }
    }

    pub(crate) fn search_calls(&self) -> u32 {
        self.search_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CenterTablePort for FakeCenterTable {
    async fn by_id(&self, id: &CenterId) -> Result<Vec<CollectionCenter>, LookupError> {
        if let Some(delay) = self.delays.get(&id.0) {
            tokio::time::sleep(*delay).await;
        }
        if self.fail_by_id {
            return Err(LookupError::Internal("center table offline".to_owned()));
        }
        Ok(self
            .centers
            .iter()
            .filter(|center| center.id == *id)
            .cloned()
            .collect())
    }

    async fn search_accepted_items(
        &self,
        terms: &[String],
        limit: usize,
    ) -> Result<Vec<CollectionCenter>, LookupError> {
        self.search_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_search {
            return Err(LookupError::Internal("center search offline".to_owned()));
        }
        let needles: Vec<String> = terms.iter().map(|term| term.to_lowercase()).collect();
        Ok(self
            .centers
            .iter()
            .filter(|center| {
                center.accepted_items.as_deref().is_some_and(|items| {
                    let haystack = items.to_lowercase();
                    needles.iter().any(|needle| haystack.contains(needle))
                })
            })
            .take(limit)
            .cloned()
            .collect())
    }

    async fn center_amount(&self, id: &CenterId) -> Result<Option<f64>, LookupError> {
        if self.fail_amount {
            return Err(LookupError::Internal("center table offline".to_owned()));
        }
        Ok(self
            .centers
            .iter()
            .find(|center| center.id == *id)
            .and_then(|center| center.point))
    }
}

#[derive(Default)]
pub(crate) struct FakeCapture {
    pub(crate) fail_frame: bool,
    pub(crate) starts: Arc<AtomicU32>,
    pub(crate) stops: Arc<AtomicU32>,
}

struct FakeStream {
    fail_frame: bool,
    stops: Arc<AtomicU32>,
}

impl FrameStream for FakeStream {
    fn capture_frame(&mut self) -> Result<Frame, CaptureError> {
        if self.fail_frame {
            return Err(CaptureError::Frame("sensor busy".to_owned()));
        }
        Ok(solid_frame(4, 4))
    }

    fn stop(&mut self) {
        self.stops.fetch_add(1, Ordering::SeqCst);
    }
}

impl CapturePort for FakeCapture {
    fn start(&self) -> Result<Box<dyn FrameStream>, CaptureError> {
        self.starts.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FakeStream {
            fail_frame: self.fail_frame,
            stops: Arc::clone(&self.stops),
        }))
    }
}
