//! Normalization of raw feature service records into [`Chapter`]s.
//!
//! Each feature is validated on its own. A feature that fails validation is
//! reported to the observer and dropped; it never fails the batch.

use crate::extract::RawFeature;
use crate::telemetry::{Observer, PipelineEvent};
use serde_json::Value;
use std::fmt;

/// Attribute holding the stable chapter identifier.
pub const CHAPTER_ID_ATTR: &str = "ChapterID";
/// Attribute holding the university chapter name.
pub const CHAPTER_NAME_ATTR: &str = "University_Chapter";
pub const CITY_ATTR: &str = "City";
pub const STATE_ATTR: &str = "State";

/// Column widths of the destination table.
pub const MAX_CHAPTER_ID_LEN: usize = 20;
pub const MAX_CHAPTER_NAME_LEN: usize = 255;
pub const MAX_CITY_LEN: usize = 100;
pub const MAX_STATE_LEN: usize = 2;

/// A validated university chapter ready for loading.
#[derive(Debug, Clone, PartialEq)]
pub struct Chapter {
    pub chapter_id: String,
    pub chapter_name: String,
    pub city: String,
    pub state: String,
    pub longitude: f64,
    pub latitude: f64,
}

impl Chapter {
    pub fn new(
        chapter_id: impl Into<String>,
        chapter_name: impl Into<String>,
        city: impl Into<String>,
        state: impl Into<String>,
        longitude: f64,
        latitude: f64,
    ) -> Self {
        Self {
            chapter_id: chapter_id.into(),
            chapter_name: chapter_name.into(),
            city: city.into(),
            state: state.into(),
            longitude,
            latitude,
        }
    }

    /// Returns the first column whose value is wider than the destination
    /// column, as `(column, max, actual)`.
    pub fn oversized_field(&self) -> Option<(&'static str, usize, usize)> {
        [
            ("chapter_id", &self.chapter_id, MAX_CHAPTER_ID_LEN),
            ("chapter_name", &self.chapter_name, MAX_CHAPTER_NAME_LEN),
            ("city", &self.city, MAX_CITY_LEN),
            ("state", &self.state, MAX_STATE_LEN),
        ]
        .into_iter()
        .map(|(field, value, max)| (field, max, value.chars().count()))
        .find(|(_, max, actual)| actual > max)
    }
}

/// Why a raw feature was discarded.
#[derive(Debug, Clone, PartialEq)]
pub enum SkipReason {
    /// One or more required attributes were absent, null, empty or zero.
    MissingAttributes {
        missing: Vec<&'static str>,
        attributes: String,
    },
    /// `x` or `y` was absent or null.
    MissingCoordinates { chapter_id: String },
    /// `x` or `y` was present but not a finite number.
    InvalidCoordinates { chapter_id: String },
    /// A value would not fit its destination column.
    FieldTooLong {
        chapter_id: String,
        field: &'static str,
        max: usize,
        actual: usize,
    },
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingAttributes {
                missing,
                attributes,
            } => write!(
                f,
                "missing attributes [{}]: {}",
                missing.join(", "),
                attributes
            ),
            Self::MissingCoordinates { chapter_id } => {
                write!(f, "missing coordinates: {chapter_id}")
            }
            Self::InvalidCoordinates { chapter_id } => {
                write!(f, "non-numeric coordinates: {chapter_id}")
            }
            Self::FieldTooLong {
                chapter_id,
                field,
                max,
                actual,
            } => write!(
                f,
                "{field} is {actual} characters, column allows {max}: {chapter_id}"
            ),
        }
    }
}

enum Coordinate {
    Missing,
    Invalid,
    Valid(f64),
}

/// Converts every feature it can and reports the rest.
///
/// Accepted chapters keep the relative order of their input features.
pub fn normalize(features: &[RawFeature], observer: &dyn Observer) -> Vec<Chapter> {
    let chapters: Vec<Chapter> = features
        .iter()
        .enumerate()
        .filter_map(|(index, feature)| match normalize_feature(feature) {
            Ok(chapter) => Some(chapter),
            Err(reason) => {
                observer.observe(&PipelineEvent::FeatureSkipped { index, reason });
                None
            }
        })
        .collect();

    observer.observe(&PipelineEvent::Normalized {
        accepted: chapters.len(),
        total: features.len(),
    });

    chapters
}

/// Validates a single raw feature.
pub fn normalize_feature(feature: &RawFeature) -> Result<Chapter, SkipReason> {
    let mut missing = Vec::new();
    let mut required = |name: &'static str| {
        let value = attribute_text(feature.attributes.get(name));
        if value.is_none() {
            missing.push(name);
        }
        value
    };

    let chapter_id = required(CHAPTER_ID_ATTR);
    let chapter_name = required(CHAPTER_NAME_ATTR);
    let city = required(CITY_ATTR);
    let state = required(STATE_ATTR);

    let (Some(chapter_id), Some(chapter_name), Some(city), Some(state)) =
        (chapter_id, chapter_name, city, state)
    else {
        return Err(SkipReason::MissingAttributes {
            missing,
            attributes: Value::Object(feature.attributes.clone()).to_string(),
        });
    };

    let (longitude, latitude) = match (
        coordinate(feature.geometry.get("x")),
        coordinate(feature.geometry.get("y")),
    ) {
        (Coordinate::Valid(x), Coordinate::Valid(y)) => (x, y),
        (Coordinate::Missing, _) | (_, Coordinate::Missing) => {
            return Err(SkipReason::MissingCoordinates { chapter_id })
        }
        _ => return Err(SkipReason::InvalidCoordinates { chapter_id }),
    };

    let chapter = Chapter {
        chapter_id,
        chapter_name,
        city,
        state,
        longitude,
        latitude,
    };

    if let Some((field, max, actual)) = chapter.oversized_field() {
        return Err(SkipReason::FieldTooLong {
            chapter_id: chapter.chapter_id,
            field,
            max,
            actual,
        });
    }

    Ok(chapter)
}

/// Reads a required attribute. Null, empty strings, zero, booleans and
/// nested values all count as missing.
fn attribute_text(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) if n.as_f64() != Some(0.0) => Some(n.to_string()),
        _ => None,
    }
}

/// Reads a coordinate. Zero is a valid coordinate.
fn coordinate(value: Option<&Value>) -> Coordinate {
    let parsed = match value {
        None | Some(Value::Null) => return Coordinate::Missing,
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().parse::<f64>().ok(),
        Some(_) => None,
    };

    match parsed {
        Some(v) if v.is_finite() => Coordinate::Valid(v),
        _ => Coordinate::Invalid,
    }
}
