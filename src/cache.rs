//! Small on-device persistence: first-run flag, device API key and at most one
//! report waiting to be sent.

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};

use log::{info, warn};
use serde::Deserialize;

use crate::error::{CacheError, StoreError};
use crate::report::ReportingClient;

const INITIAL_RUN_KEY: &str = "initialRun";
const API_KEY_KEY: &str = "apiKey";
const CACHED_REPORT_KEY: &str = "cachedQuake";

/// String-keyed persistence behind [`LocalCache`].
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&self, key: &str, value: &str) -> Result<(), StoreError>;
    fn remove(&self, key: &str) -> Result<(), StoreError>;
}

/// Process-local store. Nothing survives a restart.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<BTreeMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Option<String> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key);
        Ok(())
    }
}

/// Store persisted as a JSON object in a single file.
///
/// Every write rewrites the file. A write that fails leaves the in-memory
/// view unchanged.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    entries: Mutex<BTreeMap<String, String>>,
}

impl FileStore {
    /// Open `path`, starting empty if the file does not exist yet.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        let entries: BTreeMap<String, String> = match fs::read_to_string(&path) {
            Ok(contents) if contents.trim().is_empty() => BTreeMap::new(),
            Ok(contents) => {
                serde_json::from_str(&contents).map_err(|source| StoreError::Corrupt {
                    path: path.display().to_string(),
                    source,
                })?
            }
            Err(err) if err.kind() == io::ErrorKind::NotFound => BTreeMap::new(),
            Err(source) => {
                return Err(StoreError::Io {
                    path: path.display().to_string(),
                    source,
                });
            }
        };
        info!("Loaded {} cache entries from {}", entries.len(), path.display());
        Ok(Self {
            path,
            entries: Mutex::new(entries),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persist(&self, entries: &BTreeMap<String, String>) -> Result<(), StoreError> {
        let io_error = |source| StoreError::Io {
            path: self.path.display().to_string(),
            source,
        };
        let contents = serde_json::to_string_pretty(entries).map_err(|source| {
            StoreError::Corrupt {
                path: self.path.display().to_string(),
                source,
            }
        })?;
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(io_error)?;
        }
        fs::write(&self.path, contents).map_err(io_error)
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Option<String> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        let mut updated = entries.clone();
        updated.insert(key.to_string(), value.to_string());
        self.persist(&updated)?;
        *entries = updated;
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        if !entries.contains_key(key) {
            return Ok(());
        }
        let mut updated = entries.clone();
        updated.remove(key);
        self.persist(&updated)?;
        *entries = updated;
        Ok(())
    }
}

#[derive(Deserialize)]
struct ApiKeyResponse {
    apikey: String,
}

/// Device-local state shared by the report flow.
pub struct LocalCache {
    store: Box<dyn KeyValueStore>,
    reporting: ReportingClient,
    gps_popup_pending: AtomicBool,
}

impl LocalCache {
    pub fn new(store: Box<dyn KeyValueStore>, reporting: ReportingClient) -> Self {
        Self {
            store,
            reporting,
            gps_popup_pending: AtomicBool::new(true),
        }
    }

    /// True unless the flag was explicitly stored as `"false"`.
    pub fn is_initial_run(&self) -> bool {
        self.store.get(INITIAL_RUN_KEY).as_deref() != Some("false")
    }

    pub fn set_initial_run(&self, initial: bool) -> Result<(), StoreError> {
        self.store
            .set(INITIAL_RUN_KEY, if initial { "true" } else { "false" })
    }

    pub fn api_key(&self) -> Option<String> {
        self.store.get(API_KEY_KEY)
    }

    pub fn set_api_key(&self, key: &str) -> Result<(), StoreError> {
        self.store.set(API_KEY_KEY, key)
    }

    /// Request a fresh device key from the reporting API and store it.
    pub async fn generate_api_key(&self) -> Result<String, CacheError> {
        let body = self.reporting.request_api_key().await?;
        let response: ApiKeyResponse =
            serde_json::from_str(&body).map_err(CacheError::KeyResponse)?;
        self.set_api_key(&response.apikey)?;
        info!("Stored a new device API key");
        Ok(response.apikey)
    }

    /// The stored key, or a freshly generated one.
    pub async fn ensure_api_key(&self) -> Result<String, CacheError> {
        match self.api_key() {
            Some(key) => Ok(key),
            None => self.generate_api_key().await,
        }
    }

    /// Keep a serialized report for a later retry, replacing any earlier one.
    pub fn cache_report(&self, payload: &str) -> Result<(), StoreError> {
        if self.has_cached_report() {
            warn!("Replacing the previously cached report");
        }
        self.store.set(CACHED_REPORT_KEY, payload)
    }

    pub fn has_cached_report(&self) -> bool {
        self.store
            .get(CACHED_REPORT_KEY)
            .is_some_and(|payload| !payload.is_empty())
    }

    pub fn cached_report(&self) -> Option<String> {
        self.store
            .get(CACHED_REPORT_KEY)
            .filter(|payload| !payload.is_empty())
    }

    pub fn remove_cached_report(&self) -> Result<(), StoreError> {
        self.store.remove(CACHED_REPORT_KEY)
    }

    /// Send the cached report. It stays cached until [`Self::remove_cached_report`].
    pub async fn report_cached(&self) -> Result<(), CacheError> {
        let payload = self.cached_report().ok_or(CacheError::NothingCached)?;
        let api_key = self.api_key();
        self.reporting
            .send_report(api_key.as_deref(), &payload)
            .await?;
        info!("Cached report delivered");
        Ok(())
    }

    /// True only on the first call in this process.
    pub fn first_time_gps_popup(&self) -> bool {
        self.gps_popup_pending.swap(false, Ordering::SeqCst)
    }
}
