//! Endpoint, client and credential configuration.

use std::time::Duration;

use base64::{Engine as _, engine::general_purpose::STANDARD as b64};

/// Default user agent for feed and report requests.
pub const DEFAULT_USER_AGENT: &str = "quakewatch/0.1";

/// Default request timeout in seconds.
const DEFAULT_TIMEOUT_SECS: u64 = 10;

/// Base URLs of every remote service the client talks to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    /// FDSN-style query API used by the live feed and for pagination.
    pub query_api: String,
    /// Directory of pre-rendered `*_latest.json` feed files.
    pub static_files: String,
    /// Alternate seismic portal query API.
    pub seismic_portal: String,
    /// Host of the report submission and key issuance API.
    pub geoweb: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            query_api: "http://geoweb.zamg.ac.at/fdsnws/app/1".to_string(),
            static_files: "http://geoweb.zamg.ac.at/eq_app".to_string(),
            seismic_portal: "http://localhost:8100/api".to_string(),
            geoweb: "http://geoweb.zamg.ac.at".to_string(),
        }
    }
}

impl Endpoints {
    #[must_use]
    pub fn with_query_api(mut self, url: impl Into<String>) -> Self {
        self.query_api = trim_base(url);
        self
    }

    #[must_use]
    pub fn with_static_files(mut self, url: impl Into<String>) -> Self {
        self.static_files = trim_base(url);
        self
    }

    #[must_use]
    pub fn with_seismic_portal(mut self, url: impl Into<String>) -> Self {
        self.seismic_portal = trim_base(url);
        self
    }

    #[must_use]
    pub fn with_geoweb(mut self, url: impl Into<String>) -> Self {
        self.geoweb = trim_base(url);
        self
    }

    /// Report submission URL.
    pub fn message_url(&self) -> String {
        format!("{}/quakeapi/v02/message", self.geoweb)
    }

    /// Device key issuance URL.
    pub fn api_key_url(&self) -> String {
        format!("{}/quakeapi/v02/getapikey", self.geoweb)
    }
}

fn trim_base(url: impl Into<String>) -> String {
    url.into().trim_end_matches('/').to_string()
}

/// Configuration for the HTTP client.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub timeout: Duration,
    pub user_agent: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

impl ClientConfig {
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }
}

/// Shared secret sent as HTTP Basic authorization on every reporting call.
#[derive(Clone, PartialEq, Eq)]
pub struct ReportingCredentials {
    username: String,
    password: String,
}

impl std::fmt::Debug for ReportingCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReportingCredentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

impl ReportingCredentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    /// Value of the `Authorization` header.
    pub fn authorization(&self) -> String {
        let token = b64.encode(format!("{}:{}", self.username, self.password));
        format!("Basic {token}")
    }
}
