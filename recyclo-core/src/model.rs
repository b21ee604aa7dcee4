//! Domain data structures for frames, predictions, fees, and collection centers.

use std::fmt;

use chrono::Weekday;
use reqwest::Url;
use serde::{Deserialize, Serialize};

use crate::ports::InferenceError;

const MAPS_SEARCH_URL: &str = "https://www.google.com/maps/search/";

/// Still RGB8 image handed from a capture source to the classifier.
#[derive(Clone, PartialEq, Eq)]
pub struct Frame {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
    /// Packed RGB bytes, row-major, three bytes per pixel.
    pub rgb: Vec<u8>,
}

impl Frame {
    /// Wrap raw RGB8 pixels.
    #[must_use]
    pub fn new(width: u32, height: u32, rgb: Vec<u8>) -> Self {
        Self { width, height, rgb }
    }

    /// A frame is usable when it has an area and the buffer matches it exactly.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        if self.width == 0 || self.height == 0 {
            return false;
        }
        let expected = u64::from(self.width) * u64::from(self.height) * 3;
        u64::try_from(self.rgb.len()).is_ok_and(|len| len == expected)
    }
}

impl fmt::Debug for Frame {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("Frame")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("bytes", &self.rgb.len())
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
/// A single label scored by the classifier.
pub struct Prediction {
    /// Class name as exported with the model.
    pub label: String,
    /// Confidence in `[0, 1]`.
    pub confidence: f32,
}

impl Prediction {
    /// Construct a prediction.
    #[must_use]
    pub fn new<S: Into<String>>(label: S, confidence: f32) -> Self {
        Self {
            label: label.into(),
            confidence,
        }
    }
}

/// Output of one classification call.
///
/// The order is whatever the model produced; use [`ClassificationResult::top`] or
/// [`ClassificationResult::ranked`] instead of relying on the first entry.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClassificationResult {
    predictions: Vec<Prediction>,
    top: Prediction,
}

impl ClassificationResult {
    /// Validate raw model output.
    ///
    /// # Errors
    ///
    /// Returns [`InferenceError::InvalidOutput`] when the list is empty or a confidence is
    /// not a finite number in `[0, 1]`.
    pub fn new(predictions: Vec<Prediction>) -> Result<Self, InferenceError> {
        if let Some(bad) = predictions
            .iter()
            .find(|prediction| !(0.0..=1.0).contains(&prediction.confidence))
        {
            return Err(InferenceError::InvalidOutput(format!(
                "confidence {} for '{}' is outside [0, 1]",
                bad.confidence, bad.label
            )));
        }

        // Keeping the current best on equal scores favours earlier entries.
        let top = predictions
            .iter()
            .fold(None::<&Prediction>, |best, candidate| match best {
                Some(current) if current.confidence >= candidate.confidence => Some(current),
                _ => Some(candidate),
            })
            .cloned()
            .ok_or_else(|| {
                InferenceError::InvalidOutput("classifier returned no predictions".to_owned())
            })?;

        Ok(Self { predictions, top })
    }

    /// Entry with the highest confidence; ties go to the earlier entry.
    #[must_use]
    pub fn top(&self) -> &Prediction {
        &self.top
    }

    /// Predictions sorted by descending confidence, stable for equal scores.
    #[must_use]
    pub fn ranked(&self) -> Vec<&Prediction> {
        let mut ranked: Vec<&Prediction> = self.predictions.iter().collect();
        ranked.sort_by(|left, right| right.confidence.total_cmp(&left.confidence));
        ranked
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
/// Disposal fee facts for a label, one value per fee source.
pub struct FeeRecord {
    /// Label the fee was looked up by.
    pub label: String,
    /// Amount from the general fee table.
    pub base_amount: Option<f64>,
    /// Amount from the per-center table.
    pub center_amount: Option<f64>,
}

impl FeeRecord {
    /// Record with neither source configured.
    #[must_use]
    pub fn empty<S: Into<String>>(label: S) -> Self {
        Self {
            label: label.into(),
            base_amount: None,
            center_amount: None,
        }
    }

    /// Sum of both sources, missing ones counting as zero.
    #[must_use]
    pub fn total_fee(&self) -> f64 {
        self.base_amount.unwrap_or(0.0) + self.center_amount.unwrap_or(0.0)
    }

    /// Whether there is anything to show in the fee block.
    #[must_use]
    pub fn has_fee(&self) -> bool {
        self.total_fee() > 0.0 || self.base_amount.is_some() || self.center_amount.is_some()
    }
}

const WEEK: [Weekday; 7] = [
    Weekday::Mon,
    Weekday::Tue,
    Weekday::Wed,
    Weekday::Thu,
    Weekday::Fri,
    Weekday::Sat,
    Weekday::Sun,
];

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
/// Opening hours per weekday as free text.
pub struct BusinessHours {
    days: [Option<String>; 7],
}

impl BusinessHours {
    /// Build from Monday-first entries.
    #[must_use]
    pub fn from_week(days: [Option<String>; 7]) -> Self {
        Self { days }
    }

    /// Hours text for one day.
    #[must_use]
    pub fn get(&self, day: Weekday) -> Option<&str> {
        self.days
            .iter()
            .nth(day.num_days_from_monday() as usize)
            .and_then(Option::as_deref)
    }

    /// Monday-first iterator over all seven days.
    pub fn iter(&self) -> impl Iterator<Item = (Weekday, Option<&str>)> {
        WEEK.into_iter()
            .zip(self.days.iter().map(Option::as_deref))
    }

    /// True when at least one day has non-blank text.
    #[must_use]
    pub fn has_any(&self) -> bool {
        self.days
            .iter()
            .flatten()
            .any(|hours| !hours.trim().is_empty())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
/// Identifier of a collection center row.
pub struct CenterId(pub String);

impl fmt::Display for CenterId {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
/// Collection center as stored remotely. Never mutated by the pipeline.
pub struct CollectionCenter {
    /// Identifier; equals an item label for exact matches.
    pub id: CenterId,
    /// Display name.
    pub name: String,
    /// Road-name address.
    pub address: Option<String>,
    /// Main phone number.
    pub phone: Option<String>,
    /// Free text listing the accepted items.
    pub accepted_items: Option<String>,
    /// Parking instructions.
    pub parking_info: Option<String>,
    /// Opening hours.
    pub hours: BusinessHours,
    /// Fee configured at this center.
    pub point: Option<f64>,
}

impl CollectionCenter {
    /// Map search link for the address, if there is one.
    #[must_use]
    pub fn maps_url(&self) -> Option<Url> {
        let address = self.address.as_deref().map(str::trim)?;
        if address.is_empty() {
            return None;
        }
        Url::parse_with_params(MAPS_SEARCH_URL, &[("api", "1"), ("query", address)]).ok()
    }

    /// Phone number reduced to dialable characters.
    #[must_use]
    pub fn dial_number(&self) -> Option<String> {
        let cleaned: String = self
            .phone
            .as_deref()?
            .chars()
            .filter(|character| character.is_ascii_digit() || *character == '+')
            .collect();
        (!cleaned.is_empty()).then_some(cleaned)
    }
}
