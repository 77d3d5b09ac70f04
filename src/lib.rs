//! Data layer of the QuakeWatch earthquake app.
//!
//! Feeds from three interchangeable sources are normalized into
//! [`QuakeRecord`]s and cached per geographic [`Scope`]. The [`QuakeData`]
//! facade fronts the active provider; [`QuakeReport`] accumulates and submits
//! a "felt it" report; [`LocalCache`] keeps the small amount of state that
//! survives between runs.

pub mod cache;
pub mod config;
pub mod error;
pub mod export;
pub mod facade;
pub mod feed;
pub mod location;
pub mod provider;
pub mod record;
pub mod report;
#[doc(hidden)]
pub mod test_support;
pub mod transport;
pub mod util;

pub use cache::{FileStore, KeyValueStore, LocalCache, MemoryStore};
pub use config::{ClientConfig, Endpoints, ReportingCredentials};
pub use error::{CacheError, FeedError, ReportError, StoreError, TransportError};
pub use facade::QuakeData;
pub use location::{FixedPosition, Geolocation, GeolocationError, PositionFix};
pub use provider::{
    LiveQueryProvider, Prefetch, QuakeProvider, Scope, SeismicPortalProvider, StaticFilesProvider,
};
pub use record::{QuakeRecord, Severity};
pub use report::{QuakeReport, ReportDraft, ReportingClient, SubmitOutcome};
pub use transport::{HttpTransport, ReqwestTransport};
