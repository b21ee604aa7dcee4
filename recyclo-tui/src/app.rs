use std::sync::Arc;

use recyclo_core::{
    aggregate::{CenterCard, DisplayBundle},
    classifier::ModelStatus,
    service::{CycleOutcome, CycleReport, Notice, NoticeKind, RecycloService, Severity},
};
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Screen {
    Capture,
    Result,
    CenterDetail,
}

pub(crate) struct App {
    pub service: Arc<RecycloService>,

    pub screen: Screen,
    pub path_input: String,
    pub model: ModelStatus,

    pub report: Option<CycleReport>,
    pub center_index: usize,
    pub notices: Vec<Notice>,

    pub pending: usize,
    pub error_message: Option<String>,
}

impl App {
    pub(crate) fn new(service: Arc<RecycloService>, path_input: String) -> Self {
        let model = service.model_status();
        Self {
            service,
            screen: Screen::Capture,
            path_input,
            model,
            report: None,
            center_index: 0,
            notices: Vec::new(),
            pending: 0,
            error_message: None,
        }
    }

    pub(crate) fn is_loading(&self) -> bool {
        self.pending > 0
    }

    pub(crate) fn refresh_model(&mut self) {
        self.model = self.service.model_status();
    }

    pub(crate) fn bundle(&self) -> Option<&DisplayBundle> {
        self.report.as_ref().and_then(|report| report.bundle.as_ref())
    }

    /// Error notice of `kind` from the shown report, when that lookup failed outright.
    pub(crate) fn failed_lookup(&self, kind: NoticeKind) -> Option<&Notice> {
        self.report
            .as_ref()?
            .notices
            .iter()
            .find(|notice| notice.kind == kind && notice.severity == Severity::Error)
    }

    pub(crate) fn selected_center(&self) -> Option<&CenterCard> {
        self.bundle()
            .and_then(|bundle| bundle.centers.get(self.center_index))
    }

    pub(crate) fn open_selected_center(&mut self) {
        if self.selected_center().is_some() {
            self.screen = Screen::CenterDetail;
        }
    }

    /// Leave the result views and abandon anything still running.
    pub(crate) fn back_to_capture(&mut self) {
        self.service.cancel_pending();
        self.screen = Screen::Capture;
        self.center_index = 0;
    }

    pub(crate) fn apply_outcome(&mut self, outcome: CycleOutcome) {
        self.pending = self.pending.saturating_sub(1);

        let report = match outcome {
            CycleOutcome::Completed(report) => *report,
            CycleOutcome::Superseded { cycle } => {
                debug!(cycle, "ignoring superseded result");
                return;
            }
        };

        self.notices.clone_from(&report.notices);
        self.error_message = None;
        if report.bundle.is_some() {
            self.center_index = 0;
            self.report = Some(report);
            self.screen = Screen::Result;
        }
    }
}
