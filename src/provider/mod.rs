//! Feed providers.
//!
//! A provider fetches raw feeds for the three geographic [`Scope`]s, keeps
//! the normalized records and the per-scope pagination cursor in its own
//! [`ScopeStore`], and answers list, paginate and lookup calls from that
//! store. Three interchangeable implementations exist:
//!
//! - [`StaticFilesProvider`]: pre-rendered `*_latest.json` files, paginated
//!   through the query API.
//! - [`LiveQueryProvider`]: the query API for both first pages and
//!   pagination.
//! - [`SeismicPortalProvider`]: an alternate portal filtered client-side by
//!   region name.

mod live_query;
mod seismic_portal;
mod static_files;

use std::fmt;
use std::str::FromStr;
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use log::{info, warn};
use serde::{Deserialize, Serialize};
use tokio::runtime::Handle;

use crate::config::Endpoints;
use crate::error::FeedError;
use crate::feed::{Feature, FeatureCollection};
use crate::record::QuakeRecord;
use crate::transport::HttpTransport;

pub use live_query::LiveQueryProvider;
pub use seismic_portal::{CONTINENTAL_COUNTRIES, SeismicPortalProvider};
pub use static_files::StaticFilesProvider;

/// Geographic filter over the same underlying event stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scope {
    National,
    Continental,
    Global,
}

impl Scope {
    pub const ALL: [Scope; 3] = [Scope::National, Scope::Continental, Scope::Global];

    /// Order in which [`QuakeProvider::find_by_id`] searches the caches.
    pub const LOOKUP_ORDER: [Scope; 3] = [Scope::National, Scope::Global, Scope::Continental];

    /// The two scopes other than `self`.
    pub fn others(self) -> [Scope; 2] {
        match self {
            Scope::National => [Scope::Continental, Scope::Global],
            Scope::Continental => [Scope::National, Scope::Global],
            Scope::Global => [Scope::National, Scope::Continental],
        }
    }

    fn index(self) -> usize {
        match self {
            Scope::National => 0,
            Scope::Continental => 1,
            Scope::Global => 2,
        }
    }

    /// `location` value understood by the query API.
    fn query_location(self) -> &'static str {
        match self {
            Scope::National => "austria",
            Scope::Continental => "europa",
            Scope::Global => "welt",
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Scope::National => "national",
            Scope::Continental => "continental",
            Scope::Global => "global",
        };
        f.write_str(name)
    }
}

impl FromStr for Scope {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_ascii_lowercase().as_str() {
            "national" | "aut" => Ok(Scope::National),
            "continental" | "eu" => Ok(Scope::Continental),
            "global" | "world" => Ok(Scope::Global),
            other => Err(format!("unknown scope '{other}'")),
        }
    }
}

/// Whether listing a scope should also refresh the other two in the background.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Prefetch {
    #[default]
    None,
    /// Spawn background fetches of the two other scopes. Honoured only by
    /// providers whose scopes come from independent feeds.
    OtherScopes,
}

/// Uniform contract of every feed provider.
#[async_trait]
pub trait QuakeProvider: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// Fetch the national scope. Failure is reported as `false`, never as
    /// an error, so callers can fall back to offline mode.
    async fn startup_fetch(&self) -> bool {
        match self.fetch_scope(Scope::National).await {
            Ok(()) => true,
            Err(err) => {
                warn!("{} startup fetch failed: {}", self.name(), err);
                false
            }
        }
    }

    /// Fetch `scope`, replacing its cached records and cursor.
    async fn fetch_scope(&self, scope: Scope) -> Result<(), FeedError>;

    /// Every cached record of `scope`, in feed order.
    fn list_scope(&self, scope: Scope, prefetch: Prefetch) -> Vec<QuakeRecord>;

    /// Fetch the page older than the scope's cursor, append it and return
    /// only the newly appended records.
    async fn paginate(&self, scope: Scope) -> Result<Vec<QuakeRecord>, FeedError>;

    /// First record with `id`, searching national, global, then continental.
    fn find_by_id(&self, id: &str) -> Option<QuakeRecord>;
}

#[derive(Debug, Default)]
struct ScopeCache {
    records: Vec<QuakeRecord>,
    cursor: Option<String>,
}

/// Per-provider record caches, cursors and pagination gates.
#[derive(Debug, Default)]
pub struct ScopeStore {
    caches: [Mutex<ScopeCache>; 3],
    gates: [tokio::sync::Mutex<()>; 3],
}

impl ScopeStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn cache(&self, scope: Scope) -> MutexGuard<'_, ScopeCache> {
        self.caches[scope.index()]
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Replace the records of `scope` wholesale.
    pub fn replace(&self, scope: Scope, records: Vec<QuakeRecord>, cursor: Option<String>) {
        let mut cache = self.cache(scope);
        cache.records = records;
        cache.cursor = cursor;
    }

    /// Append `records` to `scope`, moving the cursor when a new one is known.
    pub fn append(&self, scope: Scope, records: &[QuakeRecord], cursor: Option<String>) {
        let mut cache = self.cache(scope);
        cache.records.extend_from_slice(records);
        if cursor.is_some() {
            cache.cursor = cursor;
        }
    }

    pub fn records(&self, scope: Scope) -> Vec<QuakeRecord> {
        self.cache(scope).records.clone()
    }

    pub fn len(&self, scope: Scope) -> usize {
        self.cache(scope).records.len()
    }

    pub fn cursor(&self, scope: Scope) -> Option<String> {
        self.cache(scope).cursor.clone()
    }

    pub fn find(&self, id: &str) -> Option<QuakeRecord> {
        Scope::LOOKUP_ORDER.iter().find_map(|&scope| {
            self.cache(scope)
                .records
                .iter()
                .find(|record| record.id == id)
                .cloned()
        })
    }

    /// Serializes fetches and pagination of one scope, so a page is never
    /// appended to a list it was not requested for.
    async fn scope_gate(&self, scope: Scope) -> tokio::sync::MutexGuard<'_, ()> {
        self.gates[scope.index()].lock().await
    }
}

/// GET `url`, select records from its features and replace `scope` with them.
///
/// The cursor always follows the unfiltered page. Waits for any in-flight
/// pagination of `scope` to finish first.
async fn fetch_into<F>(
    transport: &dyn HttpTransport,
    store: &ScopeStore,
    scope: Scope,
    url: &str,
    select: F,
) -> Result<(), FeedError>
where
    F: Fn(&[Feature]) -> Vec<QuakeRecord>,
{
    let _gate = store.scope_gate(scope).await;
    let body = transport.get(url).await?;
    let collection = FeatureCollection::parse(url, &body)?;
    let records = select(&collection.features);
    let cursor = collection.oldest_time().map(str::to_owned);

    info!(
        "Fetched {} {} records ({} features)",
        records.len(),
        scope,
        collection.features.len()
    );
    store.replace(scope, records, cursor);
    Ok(())
}

/// Fetch the page older than `scope`'s cursor and append it.
///
/// The first feature of every follow-up page repeats the last record of the
/// previous page and is dropped before selection.
async fn paginate_into<U, F>(
    transport: &dyn HttpTransport,
    store: &ScopeStore,
    scope: Scope,
    page_url: U,
    select: F,
) -> Result<Vec<QuakeRecord>, FeedError>
where
    U: Fn(&str) -> String,
    F: Fn(&[Feature]) -> Vec<QuakeRecord>,
{
    let _gate = store.scope_gate(scope).await;
    let cursor = store.cursor(scope).ok_or(FeedError::MissingCursor(scope))?;
    let url = page_url(&cursor);

    let body = transport.get(&url).await?;
    let collection = FeatureCollection::parse(&url, &body)?;
    let fresh = collection.features.get(1..).unwrap_or_default();
    let records = select(fresh);
    let next_cursor = collection.oldest_time().map(str::to_owned);

    store.append(scope, &records, next_cursor);
    info!(
        "Appended {} {} records, {} cached",
        records.len(),
        scope,
        store.len(scope)
    );
    Ok(records)
}

/// Query API page older than `cursor`, shared by the static-file and live providers.
fn query_page_url(endpoints: &Endpoints, scope: Scope, cursor: &str) -> String {
    format!(
        "{}/query?endtime={};orderby=time;limit=10;location={}",
        endpoints.query_api,
        cursor,
        scope.query_location()
    )
}

/// Spawn fire-and-forget fetches of `scopes` on the current runtime.
fn spawn_prefetch<P>(provider: &P, scopes: [Scope; 2])
where
    P: QuakeProvider + Clone + 'static,
{
    let Ok(handle) = Handle::try_current() else {
        warn!("{}: no async runtime, skipping prefetch", provider.name());
        return;
    };

    for scope in scopes {
        let provider = provider.clone();
        handle.spawn(async move {
            if let Err(err) = provider.fetch_scope(scope).await {
                warn!("{} prefetch of {} failed: {}", provider.name(), scope, err);
            }
        });
    }
}
