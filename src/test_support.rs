//! Test utilities for the data layer.
//!
//! [`StubTransport`] is a deterministic [`HttpTransport`] that replays canned
//! responses by URL and records every request, so provider, report and cache
//! behaviour can be exercised without a network.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::{Value, json};

use crate::error::TransportError;
use crate::transport::{HttpTransport, PostRequest};

/// A request observed by [`StubTransport`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordedRequest {
    Get(String),
    Post(PostRequest),
}

#[derive(Debug, Default)]
struct StubState {
    responses: HashMap<String, Result<String, TransportError>>,
    requests: Vec<RecordedRequest>,
}

/// Stub [`HttpTransport`] backed by an in-memory URL table.
///
/// Unknown URLs answer with HTTP 404. Clones share the same table and
/// request log.
#[derive(Debug, Clone, Default)]
pub struct StubTransport {
    state: Arc<Mutex<StubState>>,
}

impl StubTransport {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer `url` with `body`.
    #[must_use]
    pub fn with_response(self, url: impl Into<String>, body: impl Into<String>) -> Self {
        self.respond(url, body);
        self
    }

    /// Answer `url` with `error`.
    #[must_use]
    pub fn with_error(self, url: impl Into<String>, error: TransportError) -> Self {
        self.lock().responses.insert(url.into(), Err(error));
        self
    }

    /// Replace the answer for `url` after construction.
    pub fn respond(&self, url: impl Into<String>, body: impl Into<String>) {
        self.lock().responses.insert(url.into(), Ok(body.into()));
    }

    /// Every request issued so far, in order.
    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.lock().requests.clone()
    }

    /// URLs of the GET requests issued so far.
    pub fn get_urls(&self) -> Vec<String> {
        self.requests()
            .into_iter()
            .filter_map(|request| match request {
                RecordedRequest::Get(url) => Some(url),
                RecordedRequest::Post(_) => None,
            })
            .collect()
    }

    /// POST requests issued so far.
    pub fn posts(&self) -> Vec<PostRequest> {
        self.requests()
            .into_iter()
            .filter_map(|request| match request {
                RecordedRequest::Post(post) => Some(post),
                RecordedRequest::Get(_) => None,
            })
            .collect()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, StubState> {
        self.state.lock().expect("stub transport lock poisoned")
    }

    fn answer(&self, url: &str) -> Result<String, TransportError> {
        self.lock()
            .responses
            .get(url)
            .cloned()
            .unwrap_or_else(|| {
                Err(TransportError::Http {
                    url: url.to_owned(),
                    status: 404,
                    message: "no stubbed response".to_string(),
                })
            })
    }
}

#[async_trait]
impl HttpTransport for StubTransport {
    async fn get(&self, url: &str) -> Result<String, TransportError> {
        self.lock().requests.push(RecordedRequest::Get(url.to_owned()));
        self.answer(url)
    }

    async fn post(&self, request: PostRequest) -> Result<String, TransportError> {
        let url = request.url.clone();
        self.lock().requests.push(RecordedRequest::Post(request));
        self.answer(&url)
    }
}

/// A feature in the shape served by the national query API and static files.
pub fn geoweb_feature(id: &str, mag: f64, time: &str, lon: f64, lat: f64) -> Value {
    json!({
        "type": "Feature",
        "id": id,
        "geometry": { "type": "Point", "coordinates": [lon, lat] },
        "properties": {
            "mag": mag,
            "time": time,
            "lon": lon,
            "lat": lat,
            "depth": 10.4,
            "maptitle": format!("Erdbeben in  Region {id}"),
            "ldate": "11.01.2016",
            "ltime": "19:02",
            "tz": "MEZ"
        }
    })
}

/// A feature in the shape served by the seismic portal.
pub fn portal_feature(id: &str, mag: f64, time: &str, region: &str) -> Value {
    json!({
        "type": "Feature",
        "id": id,
        "properties": {
            "mag": mag,
            "time": time,
            "lon": 16.3712,
            "lat": 48.2082,
            "depth": 8.0,
            "flynn_region": region
        }
    })
}

/// Wrap features in a feature collection body.
pub fn collection(features: Vec<Value>) -> String {
    json!({ "type": "FeatureCollection", "features": features }).to_string()
}

/// `count` national-style features with descending timestamps.
///
/// Feature `i` has id `"{prefix}{start + i}"` and time
/// `2016-01-11T18:{59 - (start + i)}:00.000Z`, so consecutive pages built
/// with overlapping `start` values share their boundary feature.
pub fn geoweb_page(prefix: &str, start: usize, count: usize) -> String {
    let features = (start..start + count)
        .map(|i| {
            geoweb_feature(
                &format!("{prefix}{i}"),
                3.0 + (i % 5) as f64 * 0.5,
                &page_time(i),
                16.0 + i as f64 * 0.01,
                48.0,
            )
        })
        .collect();
    collection(features)
}

/// Timestamp used for feature `i` of [`geoweb_page`].
pub fn page_time(i: usize) -> String {
    format!("2016-01-11T18:{:02}:00.000Z", 59 - i)
}
