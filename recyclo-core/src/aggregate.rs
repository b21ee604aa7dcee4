//! Result aggregation: shapes classifier and lookup output into one display bundle.

use serde::Serialize;

use crate::model::{CenterId, ClassificationResult, CollectionCenter, FeeRecord, Prediction};

/// Number of runner-up predictions shown next to the top result.
pub const DEFAULT_SECONDARY_COUNT: usize = 2;

#[derive(Debug, Clone, PartialEq, Serialize)]
/// A prediction prepared for display.
pub struct RankedPrediction {
    /// Class name.
    pub label: String,
    /// Raw confidence.
    pub confidence: f32,
    /// Confidence as a whole percentage, used for bar widths.
    pub percent: u8,
}

impl From<&Prediction> for RankedPrediction {
    fn from(prediction: &Prediction) -> Self {
        Self {
            label: prediction.label.clone(),
            confidence: prediction.confidence,
            percent: to_percent(prediction.confidence),
        }
    }
}

#[expect(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    reason = "value is clamped to 0..=100 before the cast"
)]
fn to_percent(confidence: f32) -> u8 {
    (confidence * 100.0).round().clamp(0.0, 100.0) as u8
}

#[derive(Debug, Clone, PartialEq, Serialize)]
/// Fee block contents.
pub struct FeeSummary {
    /// Per-source amounts.
    pub record: FeeRecord,
    /// Sum of both sources.
    pub total: f64,
    /// Whether the fee block has anything to show.
    pub has_fee: bool,
}

impl From<FeeRecord> for FeeSummary {
    fn from(record: FeeRecord) -> Self {
        Self {
            total: record.total_fee(),
            has_fee: record.has_fee(),
            record,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
/// A center ready for display.
pub struct CenterCard {
    /// Stored center record.
    pub center: CollectionCenter,
    /// Identifier equals the resolved label, as opposed to a fallback hit.
    pub exact_match: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
/// Everything the result view needs for one classification cycle.
pub struct DisplayBundle {
    /// Highest-confidence prediction.
    pub top: RankedPrediction,
    /// Runner-up predictions, best first.
    pub alternatives: Vec<RankedPrediction>,
    /// Merged fee information.
    pub fee: FeeSummary,
    /// Matching centers.
    pub centers: Vec<CenterCard>,
}

impl DisplayBundle {
    /// Whether any center matched.
    #[must_use]
    pub fn has_centers(&self) -> bool {
        !self.centers.is_empty()
    }
}

/// Merge one cycle's outputs. Pure; no lookups happen here.
#[must_use]
pub fn aggregate(
    classification: &ClassificationResult,
    fee: FeeRecord,
    centers: Vec<CollectionCenter>,
    secondary_count: usize,
) -> DisplayBundle {
    let top = classification.top();
    let top_id = CenterId(top.label.clone());

    // Stable ranking puts the top entry first, so the runners-up follow it.
    let alternatives = classification
        .ranked()
        .into_iter()
        .skip(1)
        .take(secondary_count)
        .map(RankedPrediction::from)
        .collect();

    let centers = centers
        .into_iter()
        .map(|center| CenterCard {
            exact_match: center.id == top_id,
            center,
        })
        .collect();

    DisplayBundle {
        top: RankedPrediction::from(top),
        alternatives,
        fee: FeeSummary::from(fee),
        centers,
    }
}
