use std::sync::Arc;

use async_trait::async_trait;
use log::{debug, warn};

use super::{Prefetch, QuakeProvider, Scope, ScopeStore, fetch_into, paginate_into};
use crate::config::Endpoints;
use crate::error::FeedError;
use crate::feed::{Feature, NormalizeRule};
use crate::record::QuakeRecord;
use crate::transport::HttpTransport;

const RULE: NormalizeRule = NormalizeRule::SeismicPortal;

/// Region label the portal uses for national events.
const NATIONAL_REGION: &str = "AUSTRIA";

/// Bounding box roughly enclosing the national territory.
const NATIONAL_BOUNDS: &str = "minlat=46.3780&maxlat=49.0171&minlon=9.5359&maxlon=17.1627";

/// Country names matched against the portal's region label for the continental scope.
pub const CONTINENTAL_COUNTRIES: [&str; 51] = [
    "Albania",
    "Andorra",
    "Armenia",
    "Austria",
    "Azerbaijan",
    "Belarus",
    "Belgium",
    "Bosnia and Herzegovina",
    "Bulgaria",
    "Croatia",
    "Cyprus",
    "Czech Republic",
    "Denmark",
    "Estonia",
    "Finland",
    "France",
    "Georgia",
    "Germany",
    "Greece",
    "Hungary",
    "Iceland",
    "Ireland",
    "Italy",
    "Kazakhstan",
    "Kosovo",
    "Latvia",
    "Liechtenstein",
    "Lithuania",
    "Luxembourg",
    "Macedonia",
    "Malta",
    "Moldova",
    "Monaco",
    "Montenegro",
    "Netherlands",
    "Norway",
    "Poland",
    "Portugal",
    "Romania",
    "Russia",
    "San Marino",
    "Serbia",
    "Slovakia",
    "Slovenia",
    "Spain",
    "Sweden",
    "Switzerland",
    "Turkey",
    "Ukraine",
    "United Kingdom",
    "Vatican City (Holy See)",
];

/// Provider for the alternate seismic portal.
///
/// The portal has no named regions, so the national scope is a bounding-box
/// query narrowed to [`NATIONAL_REGION`] and the continental scope is the
/// global feed narrowed to [`CONTINENTAL_COUNTRIES`].
#[derive(Clone)]
pub struct SeismicPortalProvider {
    endpoints: Endpoints,
    transport: Arc<dyn HttpTransport>,
    store: Arc<ScopeStore>,
}

impl SeismicPortalProvider {
    pub fn new(endpoints: Endpoints, transport: Arc<dyn HttpTransport>) -> Self {
        Self {
            endpoints,
            transport,
            store: Arc::new(ScopeStore::new()),
        }
    }

    fn scope_url(&self, scope: Scope) -> String {
        let base = &self.endpoints.seismic_portal;
        match scope {
            Scope::National => format!(
                "{base}/query?orderby=time&limit=50&{NATIONAL_BOUNDS}&format=json&nodata=404"
            ),
            Scope::Continental | Scope::Global => {
                format!("{base}/query?orderby=time&limit=50&format=json&nodata=404")
            }
        }
    }

    fn select(scope: Scope, features: &[Feature]) -> Vec<QuakeRecord> {
        let kept = features.iter().filter(|feature| match scope {
            Scope::National => feature.region() == Some(NATIONAL_REGION),
            Scope::Continental => feature.region().is_some_and(is_continental),
            Scope::Global => true,
        });
        RULE.normalize_all(kept)
    }
}

/// Whether a portal region label names a continental country, ignoring case.
pub fn is_continental(region: &str) -> bool {
    let region = region.to_uppercase();
    CONTINENTAL_COUNTRIES
        .iter()
        .any(|country| region.contains(&country.to_uppercase()))
}

#[async_trait]
impl QuakeProvider for SeismicPortalProvider {
    fn name(&self) -> &'static str {
        "seismic-portal"
    }

    /// Fetch the national scope, then the global feed the other scopes draw on.
    async fn startup_fetch(&self) -> bool {
        if let Err(err) = self.fetch_scope(Scope::National).await {
            warn!("{} startup fetch failed: {}", self.name(), err);
            return false;
        }
        if let Err(err) = self.fetch_scope(Scope::Global).await {
            warn!("{} global fetch failed: {}", self.name(), err);
        }
        true
    }

    async fn fetch_scope(&self, scope: Scope) -> Result<(), FeedError> {
        let url = self.scope_url(scope);
        fetch_into(self.transport.as_ref(), &self.store, scope, &url, |features| {
            Self::select(scope, features)
        })
        .await
    }

    fn list_scope(&self, scope: Scope, prefetch: Prefetch) -> Vec<QuakeRecord> {
        if prefetch == Prefetch::OtherScopes {
            debug!("{} ignores prefetch requests", self.name());
        }
        self.store.records(scope)
    }

    async fn paginate(&self, scope: Scope) -> Result<Vec<QuakeRecord>, FeedError> {
        let scope_url = self.scope_url(scope);
        paginate_into(
            self.transport.as_ref(),
            &self.store,
            scope,
            |cursor| format!("{scope_url}&endtime={cursor}"),
            |features| Self::select(scope, features),
        )
        .await
    }

    fn find_by_id(&self, id: &str) -> Option<QuakeRecord> {
        self.store.find(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{StubTransport, collection, portal_feature};
    use rstest::{fixture, rstest};

    const PORTAL: &str = "http://portal.test/api";

    fn national_url() -> String {
        format!(
            "{PORTAL}/query?orderby=time&limit=50&minlat=46.3780&maxlat=49.0171&minlon=9.5359&maxlon=17.1627&format=json&nodata=404"
        )
    }

    fn world_url() -> String {
        format!("{PORTAL}/query?orderby=time&limit=50&format=json&nodata=404")
    }

    fn world_body() -> String {
        collection(vec![
            portal_feature("w1", 6.8, "2016-01-11T18:05:00Z", "NEAR COAST OF PERU"),
            portal_feature("w2", 4.1, "2016-01-11T18:04:00Z", "NORTHERN ITALY"),
            portal_feature("w3", 3.2, "2016-01-11T18:03:00Z", "AUSTRIA"),
            portal_feature("w4", 5.1, "2016-01-11T18:02:00Z", "GREECE"),
            portal_feature("w5", 2.9, "2016-01-11T18:01:00Z", "FIJI ISLANDS REGION"),
        ])
    }

    #[fixture]
    fn stub() -> StubTransport {
        StubTransport::new()
            .with_response(
                national_url(),
                collection(vec![
                    portal_feature("a1", 2.4, "2016-01-11T18:03:00Z", "AUSTRIA"),
                    portal_feature("s1", 2.0, "2016-01-11T18:02:30Z", "SLOVENIA"),
                    portal_feature("a2", 1.8, "2016-01-11T17:59:00Z", "AUSTRIA"),
                ]),
            )
            .with_response(world_url(), world_body())
    }

    fn provider(stub: &StubTransport) -> SeismicPortalProvider {
        SeismicPortalProvider::new(
            Endpoints::default().with_seismic_portal(PORTAL),
            Arc::new(stub.clone()),
        )
    }

    #[rstest]
    #[tokio::test]
    async fn national_scope_keeps_only_exact_region(stub: StubTransport) {
        let provider = provider(&stub);

        assert!(provider.startup_fetch().await);

        let national = provider.list_scope(Scope::National, Prefetch::None);
        assert_eq!(
            national.iter().map(|r| r.id.as_str()).collect::<Vec<_>>(),
            vec!["a1", "a2"]
        );
        assert_eq!(provider.store.cursor(Scope::National).as_deref(), Some("2016-01-11T17:59:00Z"));
    }

    #[rstest]
    #[tokio::test]
    async fn startup_also_loads_the_global_feed(stub: StubTransport) {
        let provider = provider(&stub);

        provider.startup_fetch().await;

        assert_eq!(stub.get_urls(), vec![national_url(), world_url()]);
        assert_eq!(provider.list_scope(Scope::Global, Prefetch::None).len(), 5);
    }

    #[rstest]
    #[tokio::test]
    async fn continental_scope_filters_by_country_list(stub: StubTransport) {
        let provider = provider(&stub);

        provider.fetch_scope(Scope::Continental).await.expect("fetch");

        let continental = provider.list_scope(Scope::Continental, Prefetch::OtherScopes);
        assert_eq!(
            continental.iter().map(|r| r.id.as_str()).collect::<Vec<_>>(),
            vec!["w2", "w3", "w4"]
        );
        assert_eq!(stub.get_urls(), vec![world_url()]);
    }

    #[rstest]
    #[tokio::test]
    async fn pagination_filters_after_dropping_the_boundary(stub: StubTransport) {
        let provider = provider(&stub);
        provider.fetch_scope(Scope::Continental).await.expect("fetch");
        stub.respond(
            format!("{}&endtime=2016-01-11T18:01:00Z", world_url()),
            collection(vec![
                portal_feature("w5", 2.9, "2016-01-11T18:01:00Z", "FIJI ISLANDS REGION"),
                portal_feature("w6", 3.3, "2016-01-11T17:40:00Z", "SPAIN"),
                portal_feature("w7", 4.4, "2016-01-11T17:30:00Z", "JAPAN"),
            ]),
        );

        let fresh = provider.paginate(Scope::Continental).await.expect("paginate");

        assert_eq!(fresh.len(), 1);
        assert_eq!(fresh[0].id, "w6");
        assert_eq!(provider.list_scope(Scope::Continental, Prefetch::None).len(), 4);
        assert_eq!(
            provider.store.cursor(Scope::Continental).as_deref(),
            Some("2016-01-11T17:30:00Z")
        );
    }

    #[rstest]
    #[tokio::test]
    async fn lookup_searches_global_before_continental(stub: StubTransport) {
        let provider = provider(&stub);
        provider.fetch_scope(Scope::Continental).await.expect("eu");
        provider.fetch_scope(Scope::Global).await.expect("world");

        assert!(provider.find_by_id("w1").is_some());
        assert!(provider.find_by_id("a1").is_none());
    }

    #[rstest]
    #[case("NORTHERN ITALY", true)]
    #[case("BOSNIA AND HERZEGOVINA", true)]
    #[case("CRETE, GREECE", true)]
    #[case("northern italy", true)]
    #[case("Crete, Greece", true)]
    #[case("NEAR COAST OF PERU", false)]
    fn continental_match_ignores_case(#[case] region: &str, #[case] expected: bool) {
        assert_eq!(is_continental(region), expected);
    }

    #[test]
    fn country_list_is_complete() {
        assert_eq!(CONTINENTAL_COUNTRIES.len(), 51);
        assert_eq!(CONTINENTAL_COUNTRIES[0], "Albania");
        assert_eq!(CONTINENTAL_COUNTRIES[50], "Vatican City (Holy See)");
    }
}
