//! HTTP seam between the data layer and the network.
//!
//! Providers, the report accumulator and the local cache only ever see the
//! [`HttpTransport`] trait. [`ReqwestTransport`] is the production
//! implementation; tests use [`crate::test_support::StubTransport`].

use async_trait::async_trait;
use log::debug;
use reqwest::Client;

use crate::config::ClientConfig;
use crate::error::TransportError;

/// `Content-Type` sent with every JSON POST.
pub const JSON_CONTENT_TYPE: &str = "application/json; charset=utf-8";

/// A POST request with an already serialized body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostRequest {
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl PostRequest {
    pub fn new(url: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            headers: Vec::new(),
            body: body.into(),
        }
    }

    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Look up a header by case-insensitive name.
    pub fn header_value(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

#[async_trait]
pub trait HttpTransport: Send + Sync {
    /// GET `url` and return the response body.
    async fn get(&self, url: &str) -> Result<String, TransportError>;
    /// POST `request` and return the response body.
    async fn post(&self, request: PostRequest) -> Result<String, TransportError>;
}

/// [`HttpTransport`] backed by a shared `reqwest` client.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: Client,
    config: ClientConfig,
}

impl ReqwestTransport {
    pub fn new(config: ClientConfig) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .timeout(config.timeout)
            .user_agent(config.user_agent.as_str())
            .build()?;

        Ok(Self { client, config })
    }

    fn convert_error(&self, error: &reqwest::Error, url: &str) -> TransportError {
        if error.is_timeout() {
            return TransportError::Timeout {
                url: url.to_owned(),
                timeout_secs: self.config.timeout.as_secs(),
            };
        }

        if let Some(status) = error.status() {
            return TransportError::Http {
                url: url.to_owned(),
                status: status.as_u16(),
                message: error.to_string(),
            };
        }

        TransportError::Network {
            url: url.to_owned(),
            message: error.to_string(),
        }
    }

    async fn read_body(
        &self,
        response: reqwest::Response,
        url: &str,
    ) -> Result<String, TransportError> {
        let response = response
            .error_for_status()
            .map_err(|err| self.convert_error(&err, url))?;
        response
            .text()
            .await
            .map_err(|err| self.convert_error(&err, url))
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn get(&self, url: &str) -> Result<String, TransportError> {
        debug!("GET {}", url);
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|err| self.convert_error(&err, url))?;
        self.read_body(response, url).await
    }

    async fn post(&self, request: PostRequest) -> Result<String, TransportError> {
        debug!("POST {}", request.url);
        let mut builder = self.client.post(&request.url);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }

        let response = builder
            .body(request.body.clone())
            .send()
            .await
            .map_err(|err| self.convert_error(&err, &request.url))?;
        self.read_body(response, &request.url).await
    }
}
