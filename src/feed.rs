//! Raw feed shapes and their normalization into [`QuakeRecord`]s.
//!
//! Every upstream source answers with a GeoJSON-like feature collection, but
//! each one fills a different subset of properties and expects a different
//! display treatment. [`NormalizeRule`] captures those per-source rules so a
//! provider can never accidentally apply another source's formatting.

use std::fmt;

use chrono::{DateTime, Utc};
use log::warn;
use serde::Deserialize;
use thiserror::Error;

use crate::error::FeedError;
use crate::record::{DISTANCE_CALCULATING, DISTANCE_ENABLE_LOCATION, QuakeRecord, Severity};
use crate::util::round_half_up;

/// Length of the fixed prefix carried by `maptitle` values.
const TITLE_PREFIX_CHARS: usize = 13;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct FeatureCollection {
    #[serde(default)]
    pub features: Vec<Feature>,
}

impl FeatureCollection {
    /// Decode a response body fetched from `url`.
    pub fn parse(url: &str, body: &str) -> Result<Self, FeedError> {
        serde_json::from_str(body).map_err(|source| FeedError::Decode {
            url: url.to_owned(),
            source,
        })
    }

    /// Time of the last (oldest) feature, used as the pagination cursor.
    pub fn oldest_time(&self) -> Option<&str> {
        self.features.last().and_then(Feature::time)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Feature {
    pub id: FeatureId,
    #[serde(default)]
    pub properties: FeatureProperties,
}

impl Feature {
    pub fn time(&self) -> Option<&str> {
        self.properties.time.as_deref()
    }

    pub fn region(&self) -> Option<&str> {
        self.properties.flynn_region.as_deref()
    }
}

/// Feature identifiers arrive as strings from some sources and numbers from others.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum FeatureId {
    Text(String),
    Number(serde_json::Number),
}

impl fmt::Display for FeatureId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FeatureId::Text(text) => f.write_str(text),
            FeatureId::Number(number) => write!(f, "{number}"),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct FeatureProperties {
    pub mag: Option<f64>,
    pub time: Option<String>,
    pub lon: Option<f64>,
    pub lat: Option<f64>,
    pub depth: Option<f64>,
    pub maptitle: Option<String>,
    pub ldate: Option<String>,
    pub ltime: Option<String>,
    pub tz: Option<String>,
    pub flynn_region: Option<String>,
}

/// Why a feature could not become a record.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum NormalizeError {
    #[error("feature {id} has no {field}")]
    MissingField { id: String, field: &'static str },
    #[error("feature {id} has an unclassifiable magnitude")]
    Unclassified { id: String },
}

/// Per-source normalization rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NormalizeRule {
    /// Pre-rendered static files: rounded values, depth, title-derived place.
    StaticFiles,
    /// Live query API: full precision, title-derived place.
    LiveQuery,
    /// Seismic portal: full precision, region-derived place, UTC display time.
    SeismicPortal,
}

impl NormalizeRule {
    pub fn normalize(self, feature: &Feature) -> Result<QuakeRecord, NormalizeError> {
        let id = feature.id.to_string();
        let props = &feature.properties;
        let missing = |field| NormalizeError::MissingField {
            id: id.clone(),
            field,
        };

        let raw_magnitude = props.mag.ok_or_else(|| missing("mag"))?;
        let time = props.time.clone().ok_or_else(|| missing("time"))?;
        let longitude = props.lon.ok_or_else(|| missing("lon"))?;
        let latitude = props.lat.ok_or_else(|| missing("lat"))?;
        let severity = Severity::classify(raw_magnitude)
            .ok_or_else(|| NormalizeError::Unclassified { id: id.clone() })?;
        let depth = props.depth.map(|depth| round_half_up(depth, 0) as i64);

        let record = match self {
            NormalizeRule::StaticFiles => QuakeRecord {
                magnitude: round_half_up(raw_magnitude, 1),
                longitude: round_half_up(longitude, 2),
                latitude: round_half_up(latitude, 2),
                place: strip_title_prefix(props.maptitle.as_deref().ok_or_else(|| missing("maptitle"))?),
                distance: DISTANCE_CALCULATING.to_string(),
                local_date: props.ldate.clone().unwrap_or_default(),
                local_time: props.ltime.clone().unwrap_or_default(),
                timezone: props.tz.clone().unwrap_or_default(),
                ..base_record(id.clone(), raw_magnitude, time, longitude, latitude, depth, severity)
            },
            NormalizeRule::LiveQuery => QuakeRecord {
                place: strip_title_prefix(props.maptitle.as_deref().ok_or_else(|| missing("maptitle"))?),
                distance: DISTANCE_ENABLE_LOCATION.to_string(),
                local_date: props.ldate.clone().unwrap_or_default(),
                local_time: props.ltime.clone().unwrap_or_default(),
                timezone: props.tz.clone().unwrap_or_default(),
                ..base_record(id.clone(), raw_magnitude, time, longitude, latitude, depth, severity)
            },
            NormalizeRule::SeismicPortal => {
                let place = props.flynn_region.clone().ok_or_else(|| missing("flynn_region"))?;
                let (local_date, local_time) = utc_date_and_time(&time);
                QuakeRecord {
                    place,
                    distance: String::new(),
                    local_date,
                    local_time,
                    timezone: "UTC".to_string(),
                    ..base_record(id.clone(), raw_magnitude, time, longitude, latitude, depth, severity)
                }
            }
        };

        Ok(record)
    }

    /// Normalize a page, skipping features that cannot be normalized.
    pub fn normalize_all<'a, I>(self, features: I) -> Vec<QuakeRecord>
    where
        I: IntoIterator<Item = &'a Feature>,
    {
        features
            .into_iter()
            .filter_map(|feature| match self.normalize(feature) {
                Ok(record) => Some(record),
                Err(err) => {
                    warn!("Skipping feature: {}", err);
                    None
                }
            })
            .collect()
    }
}

fn base_record(
    id: String,
    magnitude: f64,
    time: String,
    longitude: f64,
    latitude: f64,
    depth: Option<i64>,
    severity: Severity,
) -> QuakeRecord {
    QuakeRecord {
        id,
        magnitude,
        time,
        longitude,
        latitude,
        depth,
        severity,
        ..QuakeRecord::default()
    }
}

fn strip_title_prefix(title: &str) -> String {
    title.chars().skip(TITLE_PREFIX_CHARS).collect()
}

/// Split an ISO-8601 timestamp into UTC `YYYY-MM-DD` and `HH:MM:SS`.
fn utc_date_and_time(time: &str) -> (String, String) {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(time) {
        let utc = parsed.with_timezone(&Utc);
        return (
            utc.format("%Y-%m-%d").to_string(),
            utc.format("%H:%M:%S").to_string(),
        );
    }

    match time.split_once('T') {
        Some((date, clock)) => (date.to_string(), clock.chars().take(8).collect()),
        None => (time.to_string(), String::new()),
    }
}
