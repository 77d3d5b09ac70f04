//! Device position capability and distance labels.
//!
//! Geolocation is supplied by the host platform; this module only defines the
//! seam ([`Geolocation`]) and what the data layer does with a fix.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::record::{DISTANCE_ENABLE_LOCATION, QuakeRecord};
use crate::util::round_half_up;

/// Timeout the report and detail flows pass to [`Geolocation::current_position`].
pub const GEOLOCATION_TIMEOUT: Duration = Duration::from_secs(10);

/// Mean Earth diameter in kilometres.
const EARTH_DIAMETER_KM: f64 = 12742.0;

/// One position reading.
#[derive(Debug, Clone, PartialEq)]
pub struct PositionFix {
    pub latitude: f64,
    pub longitude: f64,
    /// Accuracy radius in metres, when the platform reports one.
    pub accuracy: Option<f64>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum GeolocationError {
    #[error("location permission denied")]
    Denied,
    #[error("no position within {0:?}")]
    Timeout(Duration),
    #[error("position unavailable: {0}")]
    Unavailable(String),
}

#[async_trait]
pub trait Geolocation: Send + Sync {
    async fn current_position(
        &self,
        timeout: Duration,
        high_accuracy: bool,
    ) -> Result<PositionFix, GeolocationError>;
}

/// A [`Geolocation`] that always reports the same coordinates.
#[derive(Debug, Clone)]
pub struct FixedPosition {
    pub latitude: f64,
    pub longitude: f64,
    pub accuracy: Option<f64>,
}

#[async_trait]
impl Geolocation for FixedPosition {
    async fn current_position(
        &self,
        _timeout: Duration,
        _high_accuracy: bool,
    ) -> Result<PositionFix, GeolocationError> {
        Ok(PositionFix {
            latitude: self.latitude,
            longitude: self.longitude,
            accuracy: self.accuracy,
            timestamp: Utc::now(),
        })
    }
}

/// Great-circle distance in kilometres, rounded to two decimals.
pub fn distance_km(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let p = std::f64::consts::PI / 180.0;
    let a = 0.5 - ((lat2 - lat1) * p).cos() / 2.0
        + (lat1 * p).cos() * (lat2 * p).cos() * (1.0 - ((lon2 - lon1) * p).cos()) / 2.0;
    round_half_up(EARTH_DIAMETER_KM * a.sqrt().asin(), 2)
}

impl QuakeRecord {
    /// Overwrite the distance label from a position lookup result.
    pub fn resolve_distance(&mut self, position: Result<&PositionFix, &GeolocationError>) {
        self.distance = match position {
            Ok(fix) => format!(
                "{} km",
                distance_km(fix.latitude, fix.longitude, self.latitude, self.longitude)
            ),
            Err(_) => DISTANCE_ENABLE_LOCATION.to_string(),
        };
    }
}

/// Ask `geolocation` for a fix and label `record` with the result.
pub async fn locate_record(geolocation: &dyn Geolocation, record: &mut QuakeRecord) {
    let position = geolocation
        .current_position(GEOLOCATION_TIMEOUT, false)
        .await;
    record.resolve_distance(position.as_ref());
}
