//! Single entry point the rest of the application depends on.

use std::sync::Mutex;
use std::sync::PoisonError;

use log::{error, info};

use crate::provider::{Prefetch, QuakeProvider, Scope};
use crate::record::QuakeRecord;

/// Pass-through to the active provider plus the application's online flag.
///
/// The provider is fixed at construction.
pub struct QuakeData {
    provider: Box<dyn QuakeProvider>,
    online: Mutex<Option<bool>>,
}

impl QuakeData {
    pub fn new(provider: Box<dyn QuakeProvider>) -> Self {
        Self {
            provider,
            online: Mutex::new(None),
        }
    }

    pub fn provider_name(&self) -> &'static str {
        self.provider.name()
    }

    pub async fn startup_fetch(&self) -> bool {
        self.provider.startup_fetch().await
    }

    /// Run the startup fetch and record its outcome as the online flag.
    pub async fn start(&self) -> bool {
        let online = self.startup_fetch().await;
        self.set_online(online);
        info!(
            "{} started {}",
            self.provider_name(),
            if online { "online" } else { "offline" }
        );
        online
    }

    pub fn set_online(&self, online: bool) {
        *self.online.lock().unwrap_or_else(PoisonError::into_inner) = Some(online);
    }

    /// `None` until the startup fetch has resolved.
    pub fn is_online(&self) -> Option<bool> {
        *self.online.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn list_scope(&self, scope: Scope, prefetch: Prefetch) -> Vec<QuakeRecord> {
        self.provider.list_scope(scope, prefetch)
    }

    /// Next page of `scope`. Failures are logged and yield an empty page.
    pub async fn paginate(&self, scope: Scope) -> Vec<QuakeRecord> {
        match self.provider.paginate(scope).await {
            Ok(records) => records,
            Err(err) => {
                error!("Could not load more {} records: {}", scope, err);
                Vec::new()
            }
        }
    }

    pub fn find_by_id(&self, id: &str) -> Option<QuakeRecord> {
        self.provider.find_by_id(id)
    }

    /// Refetch `scope` and return its fresh list; the cached list on failure.
    pub async fn reload(&self, scope: Scope) -> Vec<QuakeRecord> {
        if let Err(err) = self.provider.fetch_scope(scope).await {
            error!("Could not reload {} records: {}", scope, err);
        }
        self.provider.list_scope(scope, Prefetch::None)
    }

    /// The first `count` cached records of `scope`, in feed order (newest first).
    pub fn latest(&self, scope: Scope, count: usize) -> Vec<QuakeRecord> {
        let mut records = self.provider.list_scope(scope, Prefetch::None);
        records.truncate(count);
        records
    }
}
