//! High-level service facade running one capture-classify-lookup cycle at a time.

use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use tracing::{info, warn};

use crate::aggregate::{DisplayBundle, aggregate};
use crate::capture::ActiveCapture;
use crate::classifier::{ClassifierAdapter, ModelStatus};
use crate::cycle::{CycleTicket, CycleTracker};
use crate::model::{FeeRecord, Frame};
use crate::ports::{CaptureError, CapturePort, InferenceError};
use crate::resolver::{LabelResolver, MatchStrategy};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
/// How prominently a notice should be shown.
pub enum Severity {
    /// Informational.
    Info,
    /// Degraded but usable.
    Warning,
    /// Something failed.
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
/// What a notice is about.
pub enum NoticeKind {
    /// Frame classified successfully.
    Classified,
    /// No model is loaded; the flow continues without a result.
    ModelNotReady,
    /// Capture source failed.
    CaptureFailed,
    /// Classifier failed on the frame.
    InferenceFailed,
    /// A fee source failed.
    FeeLookupFailed,
    /// The center query failed.
    CenterLookupFailed,
    /// No fee configured for the label.
    NoFee,
    /// No center accepts the item.
    NoCenters,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
/// User-facing message produced by a cycle.
pub struct Notice {
    /// Display prominence.
    pub severity: Severity,
    /// Category.
    pub kind: NoticeKind,
    /// Human-readable text.
    pub message: String,
}

impl Notice {
    fn new<S: Into<String>>(severity: Severity, kind: NoticeKind, message: S) -> Self {
        Self {
            severity,
            kind,
            message: message.into(),
        }
    }
}

impl fmt::Display for Notice {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "{}", self.message)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
/// Final state of a cycle that was not superseded.
pub struct CycleReport {
    /// Cycle number.
    pub cycle: u64,
    /// Result view contents; `None` when nothing could be classified.
    pub bundle: Option<DisplayBundle>,
    /// How centers were found, when the center query succeeded.
    pub strategy: Option<MatchStrategy>,
    /// Messages to surface, in the order they arose.
    pub notices: Vec<Notice>,
}

impl CycleReport {
    fn empty(cycle: u64) -> Self {
        Self {
            cycle,
            bundle: None,
            strategy: None,
            notices: Vec::new(),
        }
    }

    fn with_notice(mut self, notice: Notice) -> Self {
        self.notices.push(notice);
        self
    }

    /// Whether a notice of `kind` was raised.
    #[must_use]
    pub fn has_notice(&self, kind: NoticeKind) -> bool {
        self.notices.iter().any(|notice| notice.kind == kind)
    }
}

#[derive(Debug, Clone, PartialEq)]
/// Outcome of [`RecycloService::analyze`].
pub enum CycleOutcome {
    /// The cycle finished and is still the newest one.
    Completed(Box<CycleReport>),
    /// A newer cycle started first; the result was dropped.
    Superseded {
        /// Number of the abandoned cycle.
        cycle: u64,
    },
}

/// Public entry point: classify a frame and resolve fee and centers for it.
pub struct RecycloService {
    classifier: Arc<ClassifierAdapter>,
    resolver: Arc<LabelResolver>,
    cycles: CycleTracker,
    secondary_count: usize,
}

impl RecycloService {
    /// Create a new service over a classifier adapter and a resolver.
    #[must_use]
    pub fn new(
        classifier: Arc<ClassifierAdapter>,
        resolver: Arc<LabelResolver>,
        secondary_count: usize,
    ) -> Self {
        Self {
            classifier,
            resolver,
            cycles: CycleTracker::new(),
            secondary_count,
        }
    }

    /// Current model lifecycle snapshot.
    #[must_use]
    pub fn model_status(&self) -> ModelStatus {
        self.classifier.status()
    }

    /// Reset the model retry state and load again in the background.
    pub fn reload_model(&self) {
        drop(self.classifier.spawn_reload());
    }

    /// Abandon the cycle in flight, if any.
    pub fn cancel_pending(&self) {
        self.cycles.cancel_all();
    }

    /// Run a full cycle on an already captured frame.
    ///
    /// Starting a cycle supersedes any cycle still in flight; the older one then resolves
    /// to [`CycleOutcome::Superseded`] and its data is never returned.
    pub async fn analyze(&self, frame: Frame) -> CycleOutcome {
        let ticket = self.cycles.begin();
        self.run_guarded(ticket, Ok(frame)).await
    }

    /// Grab a frame from `source`, release the source, then run a full cycle.
    ///
    /// The grab runs on the blocking pool since sources may decode images.
    pub async fn capture_and_analyze(&self, source: Arc<dyn CapturePort>) -> CycleOutcome {
        let ticket = self.cycles.begin();
        let frame = grab_frame(source).await;
        self.run_guarded(ticket, frame).await
    }

    async fn run_guarded(
        &self,
        ticket: CycleTicket,
        frame: Result<Frame, CaptureError>,
    ) -> CycleOutcome {
        let cycle = ticket.id();
        let report = tokio::select! {
            biased;
            () = ticket.token().cancelled() => None,
            report = self.run_cycle(cycle, frame) => Some(report),
        };

        match report {
            Some(report) if self.cycles.is_current(&ticket) => {
                CycleOutcome::Completed(Box::new(report))
            }
            _ => {
                info!(cycle, "discarding superseded cycle");
                CycleOutcome::Superseded { cycle }
            }
        }
    }

    async fn run_cycle(&self, cycle: u64, frame: Result<Frame, CaptureError>) -> CycleReport {
        let report = CycleReport::empty(cycle);

        let frame = match frame {
            Ok(frame) => frame,
            Err(err) => {
                warn!(cycle, error = %err, "capture failed");
                return report.with_notice(Notice::new(
                    Severity::Error,
                    NoticeKind::CaptureFailed,
                    format!("Could not capture an image: {err}"),
                ));
            }
        };

        let classification = match self.classifier.classify(frame).await {
            Ok(classification) => classification,
            Err(InferenceError::ModelUnavailable) => {
                info!(cycle, "classification skipped; model not ready");
                return report.with_notice(Notice::new(
                    Severity::Warning,
                    NoticeKind::ModelNotReady,
                    "The image model is not ready yet. You can keep taking pictures.",
                ));
            }
            Err(err) => {
                warn!(cycle, error = %err, "classification failed");
                return report.with_notice(Notice::new(
                    Severity::Error,
                    NoticeKind::InferenceFailed,
                    format!("Could not classify the image: {err}"),
                ));
            }
        };

        let top = classification.top();
        let label = top.label.clone();
        let mut report = report.with_notice(Notice::new(
            Severity::Info,
            NoticeKind::Classified,
            format!("Best match: {label} ({:.2}%)", top.confidence * 100.0),
        ));

        let (fee, centers) = tokio::join!(
            self.resolver.resolve_fee(&label),
            self.resolver.resolve_centers(&label),
        );

        let fee_record = match fee {
            Ok(outcome) => {
                if let Some((source, err)) = &outcome.degraded {
                    report.notices.push(Notice::new(
                        Severity::Warning,
                        NoticeKind::FeeLookupFailed,
                        format!("The {source} is unavailable: {err}"),
                    ));
                }
                if !outcome.record.has_fee() {
                    report.notices.push(Notice::new(
                        Severity::Info,
                        NoticeKind::NoFee,
                        format!("No disposal fee is configured for '{label}'."),
                    ));
                }
                outcome.record
            }
            Err(err) => {
                report.notices.push(Notice::new(
                    Severity::Error,
                    NoticeKind::FeeLookupFailed,
                    format!("Could not load fee information: {err}"),
                ));
                FeeRecord::empty(label.as_str())
            }
        };

        let centers = match centers {
            Ok(matches) => {
                report.strategy = Some(matches.strategy);
                if matches.centers.is_empty() {
                    report.notices.push(Notice::new(
                        Severity::Info,
                        NoticeKind::NoCenters,
                        format!("No collection centers found for '{label}'."),
                    ));
                }
                matches.centers
            }
            Err(err) => {
                report.notices.push(Notice::new(
                    Severity::Error,
                    NoticeKind::CenterLookupFailed,
                    format!("Could not load collection centers: {err}"),
                ));
                Vec::new()
            }
        };

        let bundle = aggregate(&classification, fee_record, centers, self.secondary_count);
        info!(
            cycle,
            label = %label,
            total_fee = bundle.fee.total,
            centers = bundle.centers.len(),
            "cycle complete"
        );
        report.bundle = Some(bundle);
        report
    }
}

async fn grab_frame(source: Arc<dyn CapturePort>) -> Result<Frame, CaptureError> {
    tokio::task::spawn_blocking(move || {
        let mut capture = ActiveCapture::start(source.as_ref())?;
        let frame = capture.capture_frame();
        capture.finish();
        frame
    })
    .await
    .map_err(|err| CaptureError::Frame(err.to_string()))?
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::atomic::Ordering;
    use std::time::Duration;

    use super::*;
    use crate::classifier::LoadPolicy;
    use crate::model::Prediction;
    use crate::ports::ModelAssets;
    use crate::resolver::DEFAULT_LOOKUP_TIMEOUT;
    use crate::synonyms::SynonymMap;
    use crate::testing::{
        FakeCapture, FakeCenterTable, FakeFeeTable, FakeLoader, FakeModel, center, solid_frame,
        tinted_frame,
    };

    async fn service(
        model: FakeModel,
        fees: FakeFeeTable,
        centers: FakeCenterTable,
        load: bool,
    ) -> RecycloService {
        let classifier = Arc::new(ClassifierAdapter::new(
            Arc::new(FakeLoader::failing(0, model)),
            ModelAssets::new("model.onnx", "metadata.json"),
            LoadPolicy::default(),
        ));
        if load {
            classifier.load().await.expect("fake model loads");
        }
        let resolver = Arc::new(LabelResolver::new(
            Arc::new(fees),
            Arc::new(centers),
            SynonymMap::builtin(),
            DEFAULT_LOOKUP_TIMEOUT,
        ));
        RecycloService::new(classifier, resolver, 2)
    }

    fn completed(outcome: CycleOutcome) -> CycleReport {
        match outcome {
            CycleOutcome::Completed(report) => *report,
            CycleOutcome::Superseded { cycle } => panic!("cycle {cycle} was superseded"),
        }
    }

    fn predictions(top: &str) -> Vec<Prediction> {
        vec![
            Prediction::new("can", 0.05),
            Prediction::new(top, 0.85),
            Prediction::new("paper", 0.1),
        ]
    }

    #[tokio::test]
    async fn coffee_cup_with_base_fee_only() {
        let service = service(
            FakeModel::fixed(predictions("coffee cup")),
            FakeFeeTable::with(&[("coffee cup", 5.0)]),
            FakeCenterTable::with(vec![center("depot", "Depot", "Paper cup, cans", None)]),
            true,
        )
        .await;

        let report = completed(service.analyze(solid_frame(4, 4)).await);
        let bundle = report.bundle.as_ref().expect("classified");

        assert_eq!(bundle.top.label, "coffee cup");
        assert!((bundle.fee.total - 5.0).abs() < f64::EPSILON);
        assert!(bundle.fee.has_fee);
        assert_eq!(report.strategy, Some(MatchStrategy::Fallback));
        assert_eq!(bundle.centers.len(), 1);
        assert!(!bundle.centers.iter().any(|card| card.exact_match));
        assert!(report.has_notice(NoticeKind::Classified));
        assert!(!report.has_notice(NoticeKind::NoFee));
    }

    #[tokio::test]
    async fn unknown_object_reports_empty_states_not_errors() {
        let service = service(
            FakeModel::fixed(predictions("unknown-object")),
            FakeFeeTable::default(),
            FakeCenterTable::with(vec![center("depot", "Depot", "cans", Some(4.0))]),
            true,
        )
        .await;

        let report = completed(service.analyze(solid_frame(4, 4)).await);
        let bundle = report.bundle.as_ref().expect("classified");

        assert_eq!(bundle.fee.record.base_amount, None);
        assert_eq!(bundle.fee.record.center_amount, None);
        assert!(!bundle.fee.has_fee);
        assert!(bundle.centers.is_empty());
        assert_eq!(report.strategy, Some(MatchStrategy::None));
        assert!(report.has_notice(NoticeKind::NoFee));
        assert!(report.has_notice(NoticeKind::NoCenters));
        assert!(
            report
                .notices
                .iter()
                .all(|notice| notice.severity != Severity::Error)
        );
    }

    #[tokio::test]
    async fn model_not_ready_keeps_capture_usable() {
        let service = service(
            FakeModel::fixed(predictions("pen")),
            FakeFeeTable::default(),
            FakeCenterTable::default(),
            false,
        )
        .await;
        let camera = Arc::new(FakeCapture::default());

        for _ in 0..2 {
            let source = Arc::clone(&camera);
            let report = completed(service.capture_and_analyze(source).await);
            assert!(report.bundle.is_none());
            assert!(report.has_notice(NoticeKind::ModelNotReady));
        }
        assert_eq!(camera.starts.load(Ordering::SeqCst), 2);
        assert_eq!(camera.stops.load(Ordering::SeqCst), 2);
        assert!(!service.model_status().ready);
    }

    #[tokio::test]
    async fn capture_failure_is_reported_and_stream_released() {
        let service = service(
            FakeModel::fixed(predictions("pen")),
            FakeFeeTable::default(),
            FakeCenterTable::default(),
            true,
        )
        .await;
        let camera = Arc::new(FakeCapture {
            fail_frame: true,
            ..FakeCapture::default()
        });

        let source = Arc::clone(&camera);
        let report = completed(service.capture_and_analyze(source).await);
        assert!(report.has_notice(NoticeKind::CaptureFailed));
        assert_eq!(camera.stops.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn center_failure_keeps_fee_data() {
        let centers = FakeCenterTable {
            fail_by_id: true,
            ..FakeCenterTable::default()
        };
        let service = service(
            FakeModel::fixed(predictions("pen")),
            FakeFeeTable::with(&[("pen", 1.0)]),
            centers,
            true,
        )
        .await;

        let report = completed(service.analyze(solid_frame(4, 4)).await);
        let bundle = report.bundle.as_ref().expect("classified");

        assert_eq!(bundle.fee.record.base_amount, Some(1.0));
        assert!(bundle.centers.is_empty());
        assert_eq!(report.strategy, None);
        assert!(report.has_notice(NoticeKind::CenterLookupFailed));
        assert!(!report.has_notice(NoticeKind::NoCenters));
    }

    #[tokio::test]
    async fn degraded_fee_without_amount_still_reports_no_fee() {
        let centers = FakeCenterTable {
            fail_amount: true,
            ..FakeCenterTable::with(vec![center("pen", "Pen bank", "pens", None)])
        };
        let service = service(
            FakeModel::fixed(predictions("pen")),
            FakeFeeTable::default(),
            centers,
            true,
        )
        .await;

        let report = completed(service.analyze(solid_frame(4, 4)).await);
        let bundle = report.bundle.as_ref().expect("classified");

        assert!(!bundle.fee.has_fee);
        assert!(report.has_notice(NoticeKind::FeeLookupFailed));
        assert!(report.has_notice(NoticeKind::NoFee));
    }

    #[tokio::test]
    async fn repeated_analysis_is_idempotent() {
        let service = service(
            FakeModel::fixed(predictions("pen")),
            FakeFeeTable::with(&[("pen", 2.0)]),
            FakeCenterTable::with(vec![center("pen", "Pen bank", "pens", Some(1.0))]),
            true,
        )
        .await;

        let first = completed(service.analyze(solid_frame(4, 4)).await);
        let second = completed(service.analyze(solid_frame(4, 4)).await);

        assert_eq!(first.bundle, second.bundle);
        assert_eq!(first.strategy, Some(MatchStrategy::Exact));
        assert!(second.cycle > first.cycle);
    }

    #[tokio::test]
    async fn late_result_from_older_cycle_is_discarded() {
        let model = FakeModel::keyed(vec![(1, predictions("pen")), (2, predictions("coffee cup"))]);
        let centers = FakeCenterTable {
            delays: HashMap::from([("pen".to_owned(), Duration::from_secs(5))]),
            ..FakeCenterTable::with(vec![center("coffee cup", "Cup return", "cups", None)])
        };
        let service = Arc::new(service(model, FakeFeeTable::default(), centers, true).await);

        let older = {
            let service = Arc::clone(&service);
            tokio::spawn(async move { service.analyze(tinted_frame(4, 4, 1)).await })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;

        let newer = completed(service.analyze(tinted_frame(4, 4, 2)).await);
        let older = older.await.expect("task completes");

        assert!(matches!(older, CycleOutcome::Superseded { .. }));
        let bundle = newer.bundle.expect("classified");
        assert_eq!(bundle.top.label, "coffee cup");
        assert!(bundle.centers.iter().all(|card| card.exact_match));
    }
}
