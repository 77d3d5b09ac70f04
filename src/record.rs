use std::fmt;

use serde::{Deserialize, Serialize};

/// Distance label shown while the device position is being resolved.
pub const DISTANCE_CALCULATING: &str = "Calculating...";
/// Distance label shown when no position fix is available.
pub const DISTANCE_ENABLE_LOCATION: &str = "Please enable location services";

/// Severity class derived from magnitude alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Magnitude below 5.
    Low,
    /// Magnitude from 5 up to but excluding 6.
    Moderate,
    /// Magnitude 6 and above.
    High,
}

impl Severity {
    /// Classify a magnitude. Non-finite magnitudes are left unclassified.
    pub fn classify(magnitude: f64) -> Option<Self> {
        if !magnitude.is_finite() {
            return None;
        }
        Some(if magnitude < 5.0 {
            Severity::Low
        } else if magnitude < 6.0 {
            Severity::Moderate
        } else {
            Severity::High
        })
    }

    /// Style class used by list rows.
    pub fn list_class(self) -> &'static str {
        match self {
            Severity::Low => "item-balanced",
            Severity::Moderate => "item-energized",
            Severity::High => "item-assertive",
        }
    }

    /// Style class used by the detail header.
    pub fn header_class(self) -> &'static str {
        match self {
            Severity::Low => "balanced-bg",
            Severity::Moderate => "energized-bg",
            Severity::High => "assertive-bg",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Severity::Low => "low",
            Severity::Moderate => "moderate",
            Severity::High => "high",
        };
        f.pad(label)
    }
}

/// One normalized seismic event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuakeRecord {
    pub id: String,
    pub magnitude: f64,
    /// ISO-8601 event time as delivered by the source.
    pub time: String,
    pub longitude: f64,
    pub latitude: f64,
    /// Depth in kilometres.
    pub depth: Option<i64>,
    pub place: String,
    /// Display label, never a number.
    pub distance: String,
    pub severity: Severity,
    pub local_date: String,
    pub local_time: String,
    pub timezone: String,
}

impl Default for QuakeRecord {
    fn default() -> Self {
        Self {
            id: String::new(),
            magnitude: 0.0,
            time: String::new(),
            longitude: 0.0,
            latitude: 0.0,
            depth: None,
            place: String::new(),
            distance: DISTANCE_CALCULATING.to_string(),
            severity: Severity::Low,
            local_date: String::new(),
            local_time: String::new(),
            timezone: String::new(),
        }
    }
}
