use std::sync::Arc;

use async_trait::async_trait;

use super::{
    Prefetch, QuakeProvider, Scope, ScopeStore, fetch_into, paginate_into, query_page_url,
    spawn_prefetch,
};
use crate::config::Endpoints;
use crate::error::FeedError;
use crate::feed::NormalizeRule;
use crate::record::QuakeRecord;
use crate::transport::HttpTransport;

const RULE: NormalizeRule = NormalizeRule::StaticFiles;

/// Provider reading the pre-rendered `*_latest.json` files.
///
/// First pages come from the static files; follow-up pages come from the
/// query API, bounded by the scope's cursor.
#[derive(Clone)]
pub struct StaticFilesProvider {
    endpoints: Endpoints,
    transport: Arc<dyn HttpTransport>,
    store: Arc<ScopeStore>,
}

impl StaticFilesProvider {
    pub fn new(endpoints: Endpoints, transport: Arc<dyn HttpTransport>) -> Self {
        Self {
            endpoints,
            transport,
            store: Arc::new(ScopeStore::new()),
        }
    }

    fn latest_url(&self, scope: Scope) -> String {
        let file = match scope {
            Scope::National => "at_latest.json",
            Scope::Continental => "eu_latest.json",
            Scope::Global => "web_latest.json",
        };
        format!("{}/{}", self.endpoints.static_files, file)
    }
}

#[async_trait]
impl QuakeProvider for StaticFilesProvider {
    fn name(&self) -> &'static str {
        "static-files"
    }

    async fn fetch_scope(&self, scope: Scope) -> Result<(), FeedError> {
        let url = self.latest_url(scope);
        fetch_into(self.transport.as_ref(), &self.store, scope, &url, |features| {
            RULE.normalize_all(features)
        })
        .await
    }

    fn list_scope(&self, scope: Scope, prefetch: Prefetch) -> Vec<QuakeRecord> {
        if prefetch == Prefetch::OtherScopes {
            spawn_prefetch(self, scope.others());
        }
        self.store.records(scope)
    }

    async fn paginate(&self, scope: Scope) -> Result<Vec<QuakeRecord>, FeedError> {
        paginate_into(
            self.transport.as_ref(),
            &self.store,
            scope,
            |cursor| query_page_url(&self.endpoints, scope, cursor),
            |features| RULE.normalize_all(features),
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
    use crate::error::TransportError;
    use crate::test_support::{StubTransport, collection, geoweb_feature, geoweb_page, page_time};
    use rstest::{fixture, rstest};
    use std::time::Duration;
    use tokio::sync::Notify;

    /// Holds GETs of one URL until released.
    struct HeldTransport {
        inner: StubTransport,
        held_url: String,
        release: Arc<Notify>,
    }

    #[async_trait]
    impl HttpTransport for HeldTransport {
        async fn get(&self, url: &str) -> Result<String, TransportError> {
            if url == self.held_url {
                self.release.notified().await;
            }
            self.inner.get(url).await
        }

        async fn post(
            &self,
            request: crate::transport::PostRequest,
        ) -> Result<String, TransportError> {
            self.inner.post(request).await
        }
    }

    const FILES: &str = "http://files.test/eq_app";
    const QUERY: &str = "http://query.test/app/1";

    fn endpoints() -> Endpoints {
        Endpoints::default()
            .with_static_files(FILES)
            .with_query_api(QUERY)
    }

    fn page_url(cursor: &str, location: &str) -> String {
        format!("{QUERY}/query?endtime={cursor};orderby=time;limit=10;location={location}")
    }

    #[fixture]
    fn stub() -> StubTransport {
        StubTransport::new()
            .with_response(format!("{FILES}/at_latest.json"), geoweb_page("at", 0, 10))
            .with_response(format!("{FILES}/eu_latest.json"), geoweb_page("eu", 0, 4))
            .with_response(format!("{FILES}/web_latest.json"), geoweb_page("web", 0, 6))
            // Page starting at the boundary feature at9.
            .with_response(page_url(&page_time(9), "austria"), geoweb_page("at", 9, 10))
    }

    fn provider(stub: &StubTransport) -> StaticFilesProvider {
        StaticFilesProvider::new(endpoints(), Arc::new(stub.clone()))
    }

    #[rstest]
    #[tokio::test]
    async fn startup_fetch_caches_national_records(stub: StubTransport) {
        let provider = provider(&stub);

        assert!(provider.startup_fetch().await);

        let records = provider.list_scope(Scope::National, Prefetch::None);
        assert_eq!(records.len(), 10);
        assert_eq!(records[0].id, "at0");
        assert_eq!(records[9].id, "at9");
        assert_eq!(stub.get_urls(), vec![format!("{FILES}/at_latest.json")]);
    }

    #[tokio::test]
    async fn startup_fetch_reports_failure_as_false() {
        let stub = StubTransport::new().with_error(
            format!("{FILES}/at_latest.json"),
            TransportError::Network {
                url: format!("{FILES}/at_latest.json"),
                message: "offline".to_string(),
            },
        );

        assert!(!provider(&stub).startup_fetch().await);
    }

    #[rstest]
    #[tokio::test]
    async fn pagination_drops_the_boundary_duplicate(stub: StubTransport) {
        let provider = provider(&stub);
        provider.fetch_scope(Scope::National).await.expect("first page");

        let fresh = provider.paginate(Scope::National).await.expect("second page");

        assert_eq!(fresh.len(), 9);
        assert_eq!(fresh[0].id, "at10");
        let all = provider.list_scope(Scope::National, Prefetch::None);
        assert_eq!(all.len(), 19);
        assert_eq!(all.iter().filter(|r| r.id == "at9").count(), 1);
    }

    #[rstest]
    #[tokio::test]
    async fn pagination_moves_the_cursor(stub: StubTransport) {
        let provider = provider(&stub);
        provider.fetch_scope(Scope::National).await.expect("first page");
        provider.paginate(Scope::National).await.expect("second page");
        stub.respond(page_url(&page_time(18), "austria"), geoweb_page("at", 18, 3));

        let fresh = provider.paginate(Scope::National).await.expect("third page");

        assert_eq!(
            fresh.iter().map(|r| r.id.as_str()).collect::<Vec<_>>(),
            vec!["at19", "at20"]
        );
        assert_eq!(provider.list_scope(Scope::National, Prefetch::None).len(), 21);
    }

    #[rstest]
    #[tokio::test]
    async fn pagination_before_fetch_has_no_cursor(stub: StubTransport) {
        let err = provider(&stub)
            .paginate(Scope::Global)
            .await
            .expect_err("no cursor yet");

        assert!(matches!(err, FeedError::MissingCursor(Scope::Global)));
    }

    #[rstest]
    #[tokio::test]
    async fn concurrent_pagination_is_serialized(stub: StubTransport) {
        let provider = provider(&stub);
        provider.fetch_scope(Scope::National).await.expect("first page");
        stub.respond(page_url(&page_time(18), "austria"), geoweb_page("at", 18, 5));

        let (first, second) = tokio::join!(
            provider.paginate(Scope::National),
            provider.paginate(Scope::National)
        );

        let first = first.expect("first call");
        let second = second.expect("second call");
        assert_eq!(first.len() + second.len(), 13);
        let all = provider.list_scope(Scope::National, Prefetch::None);
        assert_eq!(all.len(), 23);
        let mut ids: Vec<_> = all.iter().map(|r| r.id.clone()).collect();
        ids.dedup();
        assert_eq!(ids.len(), 23);
    }

    #[rstest]
    #[tokio::test]
    async fn refetch_waits_for_inflight_pagination(stub: StubTransport) {
        let release = Arc::new(Notify::new());
        let transport = HeldTransport {
            inner: stub.clone(),
            held_url: page_url(&page_time(9), "austria"),
            release: Arc::clone(&release),
        };
        let provider = StaticFilesProvider::new(endpoints(), Arc::new(transport));
        provider.fetch_scope(Scope::National).await.expect("first page");
        stub.respond(
            format!("{FILES}/at_latest.json"),
            collection(vec![
                geoweb_feature("new0", 3.0, "2016-01-11T20:01:00.000Z", 16.0, 48.0),
                geoweb_feature("new1", 2.0, "2016-01-11T20:00:00.000Z", 16.0, 48.0),
            ]),
        );

        let (paged, refetched, ()) = tokio::join!(
            provider.paginate(Scope::National),
            provider.fetch_scope(Scope::National),
            async {
                for _ in 0..10 {
                    tokio::task::yield_now().await;
                }
                release.notify_one();
            }
        );

        assert_eq!(paged.expect("page").len(), 9);
        refetched.expect("refetch");
        let ids: Vec<_> = provider
            .list_scope(Scope::National, Prefetch::None)
            .into_iter()
            .map(|r| r.id)
            .collect();
        assert_eq!(ids, vec!["new0", "new1"]);
        assert_eq!(
            provider.store.cursor(Scope::National).as_deref(),
            Some("2016-01-11T20:00:00.000Z")
        );
    }

    #[rstest]
    #[tokio::test]
    async fn listing_with_prefetch_fills_other_scopes(stub: StubTransport) {
        let provider = provider(&stub);
        provider.startup_fetch().await;

        provider.list_scope(Scope::National, Prefetch::OtherScopes);
        for _ in 0..50 {
            if provider.store.len(Scope::Continental) == 4 && provider.store.len(Scope::Global) == 6 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        assert_eq!(provider.list_scope(Scope::Continental, Prefetch::None).len(), 4);
        assert_eq!(provider.list_scope(Scope::Global, Prefetch::None).len(), 6);
    }

    #[rstest]
    #[tokio::test]
    async fn listing_without_prefetch_issues_no_requests(stub: StubTransport) {
        let provider = provider(&stub);

        assert!(provider.list_scope(Scope::Global, Prefetch::None).is_empty());
        tokio::task::yield_now().await;
        assert!(stub.requests().is_empty());
    }

    #[rstest]
    #[tokio::test]
    async fn refetch_replaces_appended_pages(stub: StubTransport) {
        let provider = provider(&stub);
        provider.fetch_scope(Scope::National).await.expect("first page");
        provider.paginate(Scope::National).await.expect("second page");

        provider.fetch_scope(Scope::National).await.expect("refetch");

        assert_eq!(provider.list_scope(Scope::National, Prefetch::None).len(), 10);
    }

    #[tokio::test]
    async fn find_by_id_prefers_national_over_continental() {
        let duplicate = |mag| geoweb_feature("shared", mag, "2016-01-11T18:00:00Z", 16.0, 48.0);
        let stub = StubTransport::new()
            .with_response(format!("{FILES}/at_latest.json"), collection(vec![duplicate(3.1)]))
            .with_response(format!("{FILES}/eu_latest.json"), collection(vec![duplicate(6.2)]));
        let provider = provider(&stub);
        provider.fetch_scope(Scope::Continental).await.expect("eu");
        provider.fetch_scope(Scope::National).await.expect("at");

        let found = provider.find_by_id("shared").expect("present");

        assert!((found.magnitude - 3.1).abs() < 1e-9);
        assert!(provider.find_by_id("absent").is_none());
    }
}
