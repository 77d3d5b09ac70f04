//! "Felt it" report drafting and submission.
//!
//! A session owns exactly one [`QuakeReport`]. Report-flow screens mutate its
//! [`ReportDraft`] field by field; the final screen calls
//! [`QuakeReport::submit`], which serializes the draft with the reporting
//! endpoint's wire keys and POSTs it once.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::SecondsFormat;
use log::{info, warn};
use serde::{Deserialize, Serialize};

use crate::cache::LocalCache;
use crate::config::{Endpoints, ReportingCredentials};
use crate::error::{ReportError, TransportError};
use crate::location::PositionFix;
use crate::transport::{HttpTransport, JSON_CONTENT_TYPE, PostRequest};

/// Postal code sent when the user never supplied one.
pub const POSTAL_CODE_UNKNOWN: &str = "unk";

/// Header carrying the per-device API key.
pub const API_KEY_HEADER: &str = "X-QuakeAPIKey";

/// Keys of the structured follow-up questions.
pub mod questions {
    pub const ITEMS_DROPPED: &str = "itemsDropped";
    pub const RAN_AWAY: &str = "ranAway";
    pub const FACADE_DAMAGE: &str = "facade";
    pub const INJURIES: &str = "injuries";
}

/// Drop fractional seconds from an ISO-8601 timestamp.
///
/// `2016-01-11T18:02:04.151Z` becomes `2016-01-11T18:02:04Z`; timestamps
/// without a fraction are returned unchanged.
pub fn truncate_fraction(timestamp: &str) -> String {
    match timestamp.split_once('.') {
        Some((whole_seconds, _)) => format!("{whole_seconds}Z"),
        None => timestamp.to_string(),
    }
}

/// GPS accuracy as sent on the wire: a number that already shows a decimal
/// point, or the integral value rendered with a trailing `.0`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum LocationPrecision {
    Number(f64),
    Text(String),
}

impl LocationPrecision {
    /// Coerce a raw accuracy reading. Missing or non-finite readings become `None`.
    pub fn coerce(precision: Option<f64>) -> Option<Self> {
        let value = precision.filter(|value| value.is_finite())?;
        let rendered = value.to_string();
        if rendered.contains('.') {
            Some(LocationPrecision::Number(value))
        } else {
            Some(LocationPrecision::Text(format!("{rendered}.0")))
        }
    }
}

/// Answer to one follow-up question.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Answer {
    Flag(bool),
    Text(String),
}

/// Structured follow-up answers, keyed by question.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AdditionalAnswers(BTreeMap<String, Answer>);

impl AdditionalAnswers {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_flag(mut self, question: &str, answer: bool) -> Self {
        self.0.insert(question.to_string(), Answer::Flag(answer));
        self
    }

    #[must_use]
    pub fn with_text(mut self, question: &str, answer: impl Into<String>) -> Self {
        self.0.insert(question.to_string(), Answer::Text(answer.into()));
        self
    }

    pub fn get(&self, question: &str) -> Option<&Answer> {
        self.0.get(question)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// The user's observation, serialized with the reporting endpoint's keys.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReportDraft {
    /// Event the report was started from, if any.
    #[serde(rename = "referenzID")]
    pub reference_id: Option<String>,
    #[serde(rename = "locLon")]
    pub longitude: Option<f64>,
    #[serde(rename = "locLat")]
    pub latitude: Option<f64>,
    #[serde(rename = "locPrecision")]
    pub location_precision: Option<LocationPrecision>,
    #[serde(rename = "locLastUpdate")]
    pub location_updated: Option<String>,
    #[serde(rename = "mlocPLZ")]
    pub postal_code: Option<String>,
    #[serde(rename = "mlocOrtsname")]
    pub place_name: String,
    #[serde(rename = "mlocStrasse")]
    pub street: String,
    #[serde(rename = "stockwerk")]
    pub floor: String,
    #[serde(rename = "kommentar")]
    pub comment: Option<String>,
    #[serde(rename = "kontakt")]
    pub contact: Option<String>,
    #[serde(rename = "klassifikation")]
    pub severity_class: Option<u8>,
    #[serde(rename = "verspuert")]
    pub felt_at: Option<String>,
    #[serde(rename = "addquestions")]
    pub additional: Option<AdditionalAnswers>,
}

/// Reporting API calls shared by submission, offline retry and key issuance.
#[derive(Clone)]
pub struct ReportingClient {
    transport: Arc<dyn HttpTransport>,
    endpoints: Endpoints,
    credentials: ReportingCredentials,
}

impl ReportingClient {
    pub fn new(
        transport: Arc<dyn HttpTransport>,
        endpoints: Endpoints,
        credentials: ReportingCredentials,
    ) -> Self {
        Self {
            transport,
            endpoints,
            credentials,
        }
    }

    fn authorized(&self, url: String, body: &str) -> PostRequest {
        PostRequest::new(url, body)
            .header("Content-Type", JSON_CONTENT_TYPE)
            .header("Authorization", self.credentials.authorization())
    }

    /// POST a serialized report. A missing key is logged and the header omitted.
    pub async fn send_report(
        &self,
        api_key: Option<&str>,
        payload: &str,
    ) -> Result<String, TransportError> {
        let mut request = self.authorized(self.endpoints.message_url(), payload);
        match api_key {
            Some(key) => request = request.header(API_KEY_HEADER, key),
            None => warn!("Sending report without a device API key"),
        }
        self.transport.post(request).await
    }

    /// Ask the reporting API for a device key. Returns the raw response body.
    pub async fn request_api_key(&self) -> Result<String, TransportError> {
        let request = self.authorized(self.endpoints.api_key_url(), "");
        self.transport.post(request).await
    }
}

/// Result of [`QuakeReport::submit`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmitOutcome {
    /// The JSON body that was sent.
    pub payload: String,
    /// Whether the endpoint accepted it. Undelivered reports are not cached
    /// automatically; pass `payload` to [`LocalCache::cache_report`] to keep it.
    pub delivered: bool,
}

/// The session's single report draft and its submission.
pub struct QuakeReport {
    draft: Mutex<ReportDraft>,
    submitted: AtomicBool,
    reporting: ReportingClient,
    cache: Arc<LocalCache>,
}

impl QuakeReport {
    pub fn new(reporting: ReportingClient, cache: Arc<LocalCache>) -> Self {
        Self {
            draft: Mutex::new(ReportDraft::default()),
            submitted: AtomicBool::new(false),
            reporting,
            cache,
        }
    }

    fn lock(&self) -> MutexGuard<'_, ReportDraft> {
        self.draft.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Snapshot of the current draft.
    pub fn draft(&self) -> ReportDraft {
        self.lock().clone()
    }

    pub fn set_reference_id(&self, id: Option<String>) {
        self.lock().reference_id = id;
    }

    pub fn set_longitude(&self, longitude: f64) {
        self.lock().longitude = Some(longitude);
    }

    pub fn set_latitude(&self, latitude: f64) {
        self.lock().latitude = Some(latitude);
    }

    pub fn set_location_precision(&self, precision: Option<f64>) {
        self.lock().location_precision = LocationPrecision::coerce(precision);
    }

    pub fn set_location_updated(&self, timestamp: &str) {
        self.lock().location_updated = Some(truncate_fraction(timestamp));
    }

    pub fn set_postal_code(&self, postal_code: impl Into<String>) {
        self.lock().postal_code = Some(postal_code.into());
    }

    /// Store `"<place>, <street>"` as the place name.
    pub fn set_place(&self, place: &str, street: &str) {
        self.lock().place_name = format!("{place}, {street}");
    }

    pub fn set_street(&self, street: impl Into<String>) {
        self.lock().street = street.into();
    }

    pub fn set_floor(&self, floor: impl Into<String>) {
        self.lock().floor = floor.into();
    }

    pub fn set_severity_class(&self, class: u8) {
        self.lock().severity_class = Some(class);
    }

    pub fn set_felt_at(&self, timestamp: &str) {
        self.lock().felt_at = Some(truncate_fraction(timestamp));
    }

    pub fn set_comment(&self, comment: Option<String>) {
        self.lock().comment = comment;
    }

    pub fn set_contact(&self, contact: Option<String>) {
        self.lock().contact = contact;
    }

    pub fn set_additional_answers(&self, answers: AdditionalAnswers) {
        self.lock().additional = Some(answers);
    }

    /// Record a position fix as both the location and the time the quake was felt.
    pub fn apply_position_fix(&self, fix: &PositionFix) {
        let timestamp = fix.timestamp.to_rfc3339_opts(SecondsFormat::Millis, true);
        let mut draft = self.lock();
        draft.longitude = Some(fix.longitude);
        draft.latitude = Some(fix.latitude);
        draft.location_precision = LocationPrecision::coerce(fix.accuracy);
        draft.location_updated = Some(truncate_fraction(&timestamp));
        draft.felt_at = Some(truncate_fraction(&timestamp));
    }

    /// Canonical JSON of the current draft.
    pub fn serialize(&self) -> Result<String, ReportError> {
        Ok(serde_json::to_string(&*self.lock())?)
    }

    /// Send the draft once. Delivery failures are logged, not raised.
    pub async fn submit(&self) -> Result<SubmitOutcome, ReportError> {
        if self.submitted.swap(true, Ordering::SeqCst) {
            return Err(ReportError::AlreadySubmitted);
        }

        let payload = {
            let mut draft = self.lock();
            if draft.postal_code.as_deref().is_none_or(str::is_empty) {
                draft.postal_code = Some(POSTAL_CODE_UNKNOWN.to_string());
            }
            serde_json::to_string(&*draft)?
        };

        let api_key = self.cache.api_key();
        let delivered = match self.reporting.send_report(api_key.as_deref(), &payload).await {
            Ok(_) => {
                info!("Report delivered");
                true
            }
            Err(err) => {
                warn!("Report was not delivered: {}", err);
                false
            }
        };

        Ok(SubmitOutcome { payload, delivered })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryStore;
    use crate::test_support::StubTransport;
    use chrono::{TimeZone, Utc};
    use rstest::{fixture, rstest};

    const GEOWEB: &str = "http://geoweb.test";

    fn message_url() -> String {
        format!("{GEOWEB}/quakeapi/v02/message")
    }

    fn reporting(stub: &StubTransport) -> ReportingClient {
        ReportingClient::new(
            Arc::new(stub.clone()),
            Endpoints::default().with_geoweb(GEOWEB),
            ReportingCredentials::new("reporter", "s3cret"),
        )
    }

    fn report_with_key(stub: &StubTransport, key: Option<&str>) -> QuakeReport {
        let store = MemoryStore::new();
        let cache = LocalCache::new(Box::new(store), reporting(stub));
        if let Some(key) = key {
            cache.set_api_key(key).expect("memory store");
        }
        QuakeReport::new(reporting(stub), Arc::new(cache))
    }

    #[fixture]
    fn stub() -> StubTransport {
        StubTransport::new().with_response(message_url(), "{\"status\":\"ok\"}")
    }

    #[rstest]
    #[case("2016-01-11T18:02:04.151Z", "2016-01-11T18:02:04Z")]
    #[case("2016-01-11T18:02:04Z", "2016-01-11T18:02:04Z")]
    fn timestamps_lose_fractional_seconds(#[case] raw: &str, #[case] stored: &str) {
        let report = report_with_key(&StubTransport::new(), None);

        report.set_felt_at(raw);
        report.set_location_updated(raw);

        let draft = report.draft();
        assert_eq!(draft.felt_at.as_deref(), Some(stored));
        assert_eq!(draft.location_updated.as_deref(), Some(stored));
    }

    #[rstest]
    #[case(Some(10.0), Some(LocationPrecision::Text("10.0".to_string())))]
    #[case(Some(10.5), Some(LocationPrecision::Number(10.5)))]
    #[case(None, None)]
    #[case(Some(f64::NAN), None)]
    fn precision_always_shows_a_decimal_point(
        #[case] raw: Option<f64>,
        #[case] expected: Option<LocationPrecision>,
    ) {
        assert_eq!(LocationPrecision::coerce(raw), expected);
    }

    #[test]
    fn precision_serializes_as_string_or_number() {
        let report = report_with_key(&StubTransport::new(), None);

        report.set_location_precision(Some(10.0));
        assert!(report.serialize().expect("json").contains("\"locPrecision\":\"10.0\""));

        report.set_location_precision(Some(10.5));
        assert!(report.serialize().expect("json").contains("\"locPrecision\":10.5"));

        report.set_location_precision(None);
        assert!(report.serialize().expect("json").contains("\"locPrecision\":null"));
    }

    #[test]
    fn place_joins_place_and_street() {
        let report = report_with_key(&StubTransport::new(), None);

        report.set_place("Wien", "Hohe Warte 38");
        report.set_street("Hohe Warte 38");

        let draft = report.draft();
        assert_eq!(draft.place_name, "Wien, Hohe Warte 38");
        assert_eq!(draft.street, "Hohe Warte 38");
    }

    #[test]
    fn position_fix_fills_location_and_time() {
        let report = report_with_key(&StubTransport::new(), None);
        let timestamp = Utc
            .with_ymd_and_hms(2016, 1, 11, 18, 2, 4)
            .single()
            .expect("valid date")
            + chrono::Duration::milliseconds(151);

        report.apply_position_fix(&PositionFix {
            latitude: 48.25,
            longitude: 16.36,
            accuracy: Some(25.0),
            timestamp,
        });

        let draft = report.draft();
        assert_eq!(draft.latitude, Some(48.25));
        assert_eq!(draft.longitude, Some(16.36));
        assert_eq!(draft.location_precision, Some(LocationPrecision::Text("25.0".to_string())));
        assert_eq!(draft.felt_at.as_deref(), Some("2016-01-11T18:02:04Z"));
        assert_eq!(draft.location_updated.as_deref(), Some("2016-01-11T18:02:04Z"));
    }

    #[test]
    fn serialization_uses_wire_keys() {
        let report = report_with_key(&StubTransport::new(), None);
        report.set_reference_id(Some("at2016abcd".to_string()));
        report.set_floor("3");
        report.set_severity_class(4);
        report.set_comment(Some("Gläser klirrten".to_string()));
        report.set_additional_answers(
            AdditionalAnswers::new()
                .with_flag(questions::ITEMS_DROPPED, true)
                .with_text(questions::FACADE_DAMAGE, "cracks"),
        );

        let json: serde_json::Value =
            serde_json::from_str(&report.serialize().expect("json")).expect("valid json");

        assert_eq!(json["referenzID"], "at2016abcd");
        assert_eq!(json["stockwerk"], "3");
        assert_eq!(json["klassifikation"], 4);
        assert_eq!(json["kommentar"], "Gläser klirrten");
        assert_eq!(json["kontakt"], serde_json::Value::Null);
        assert_eq!(json["addquestions"]["itemsDropped"], true);
        assert_eq!(json["addquestions"]["facade"], "cracks");
        assert_eq!(json["mlocPLZ"], serde_json::Value::Null);
    }

    #[rstest]
    #[tokio::test]
    async fn submit_defaults_missing_postal_code(stub: StubTransport) {
        let report = report_with_key(&stub, Some("device-key"));

        let outcome = report.submit().await.expect("first submit");

        assert!(outcome.delivered);
        assert!(outcome.payload.contains("\"mlocPLZ\":\"unk\""));
        assert_eq!(report.draft().postal_code.as_deref(), Some(POSTAL_CODE_UNKNOWN));
    }

    #[rstest]
    #[tokio::test]
    async fn submit_keeps_a_supplied_postal_code(stub: StubTransport) {
        let report = report_with_key(&stub, Some("device-key"));
        report.set_postal_code("1190");

        let outcome = report.submit().await.expect("first submit");

        assert!(outcome.payload.contains("\"mlocPLZ\":\"1190\""));
    }

    #[rstest]
    #[tokio::test]
    async fn submit_sends_authenticated_json(stub: StubTransport) {
        let report = report_with_key(&stub, Some("device-key"));
        report.set_floor("EG");

        let outcome = report.submit().await.expect("first submit");

        let posts = stub.posts();
        assert_eq!(posts.len(), 1);
        let post = &posts[0];
        assert_eq!(post.url, message_url());
        assert_eq!(post.body, outcome.payload);
        assert_eq!(post.header_value("Content-Type"), Some(JSON_CONTENT_TYPE));
        assert_eq!(
            post.header_value("Authorization"),
            Some(ReportingCredentials::new("reporter", "s3cret").authorization().as_str())
        );
        assert_eq!(post.header_value(API_KEY_HEADER), Some("device-key"));
    }

    #[tokio::test]
    async fn failed_delivery_resolves_undelivered() {
        let stub = StubTransport::new();
        let report = report_with_key(&stub, Some("device-key"));

        let outcome = report.submit().await.expect("never rejects on HTTP failure");

        assert!(!outcome.delivered);
        assert!(outcome.payload.contains("\"mlocPLZ\":\"unk\""));
    }

    #[rstest]
    #[tokio::test]
    async fn missing_api_key_omits_the_header(stub: StubTransport) {
        let report = report_with_key(&stub, None);

        report.submit().await.expect("first submit");

        assert_eq!(stub.posts()[0].header_value(API_KEY_HEADER), None);
    }

    #[rstest]
    #[tokio::test]
    async fn a_session_submits_once(stub: StubTransport) {
        let report = report_with_key(&stub, Some("device-key"));
        report.submit().await.expect("first submit");

        let second = report.submit().await;

        assert!(matches!(second, Err(ReportError::AlreadySubmitted)));
        assert_eq!(stub.posts().len(), 1);
    }
}
