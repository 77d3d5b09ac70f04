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

const RULE: NormalizeRule = NormalizeRule::LiveQuery;

/// Provider querying the live API for every page. Values keep full precision.
#[derive(Clone)]
pub struct LiveQueryProvider {
    endpoints: Endpoints,
    transport: Arc<dyn HttpTransport>,
    store: Arc<ScopeStore>,
}

impl LiveQueryProvider {
    pub fn new(endpoints: Endpoints, transport: Arc<dyn HttpTransport>) -> Self {
        Self {
            endpoints,
            transport,
            store: Arc::new(ScopeStore::new()),
        }
    }

    fn first_page_url(&self, scope: Scope) -> String {
        format!(
            "{}/query?orderby=time;location={};limit=10",
            self.endpoints.query_api,
            scope.query_location()
        )
    }
}

#[async_trait]
impl QuakeProvider for LiveQueryProvider {
    fn name(&self) -> &'static str {
        "live-query"
    }

    async fn fetch_scope(&self, scope: Scope) -> Result<(), FeedError> {
        let url = self.first_page_url(scope);
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
