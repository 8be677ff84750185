//! Page fetching
//!
//! This module handles the network side of one logical page:
//! - Rendering a job's request template for a page index
//! - Building the HTTP client from configuration
//! - Sending requests through a pluggable transport
//! - Classifying failures as transient or permanent

use crate::config::{HttpConfig, HttpMethod, JobConfig};
use crate::state::{JobKey, PageIndex};
use async_trait::async_trait;
use reqwest::{Client, Proxy};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// A fully rendered request for one page
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageRequest {
    pub method: HttpMethod,
    pub url: String,
    pub headers: BTreeMap<String, String>,
    pub body: Option<String>,
}

impl PageRequest {
    /// Creates a plain GET request
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            method: HttpMethod::Get,
            url: url.into(),
            headers: BTreeMap::new(),
            body: None,
        }
    }
}

/// Raw response of a successful request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Payload {
    /// HTTP status code (always 2xx for HTTP transports)
    pub status: u16,
    /// Response body
    pub body: String,
}

/// Classified failure of a single request
#[derive(Debug, Clone, Error)]
pub enum FetchError {
    /// Network errors, timeouts and non-success statuses; worth retrying
    #[error("Transient failure fetching {url}: {reason}")]
    Transient { url: String, reason: String },

    /// The request itself is unusable; retrying cannot help
    #[error("Permanent failure fetching {url}: {reason}")]
    Permanent { url: String, reason: String },
}

impl FetchError {
    pub fn transient(url: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Transient {
            url: url.into(),
            reason: reason.into(),
        }
    }

    pub fn permanent(url: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Permanent {
            url: url.into(),
            reason: reason.into(),
        }
    }

    /// Returns true if the failure may go away on a new attempt
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient { .. })
    }
}

/// Performs the actual network call
///
/// The engine depends only on success or failure and the payload; proxies,
/// headers and cookies are the transport's business.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: &PageRequest) -> Result<Payload, FetchError>;
}

/// Builds an HTTP client with proper configuration
///
/// # Arguments
///
/// * `config` - The HTTP section of the configuration
///
/// # Returns
///
/// * `Ok(Client)` - Successfully built HTTP client
/// * `Err(reqwest::Error)` - Failed to build client (e.g. invalid proxy)
pub fn build_http_client(config: &HttpConfig) -> Result<Client, reqwest::Error> {
    let mut builder = Client::builder()
        .user_agent(config.user_agent.clone())
        .timeout(Duration::from_secs(config.timeout_secs))
        .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
        .gzip(true)
        .brotli(true);

    if let Some(proxy) = &config.proxy {
        builder = builder.proxy(Proxy::all(proxy.as_str())?);
    }

    builder.build()
}

/// Transport backed by a `reqwest` client
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Builds the transport from the HTTP section of the configuration
    pub fn from_config(config: &HttpConfig) -> Result<Self, reqwest::Error> {
        Ok(Self::new(build_http_client(config)?))
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, request: &PageRequest) -> Result<Payload, FetchError> {
        let mut builder = match request.method {
            HttpMethod::Get => self.client.get(&request.url),
            HttpMethod::Post => self.client.post(&request.url),
        };

        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }

        if let Some(body) = &request.body {
            builder = builder.body(body.clone());
        }

        let response = builder
            .send()
            .await
            .map_err(|e| classify_send_error(&request.url, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::transient(
                &request.url,
                format!("HTTP {}", status.as_u16()),
            ));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| FetchError::transient(&request.url, format!("reading body: {}", e)))?;
        let body = String::from_utf8(bytes.to_vec())
            .map_err(|_| FetchError::permanent(&request.url, "response body is not UTF-8"))?;

        Ok(Payload {
            status: status.as_u16(),
            body,
        })
    }
}

/// Classifies a `reqwest` send error
fn classify_send_error(url: &str, error: reqwest::Error) -> FetchError {
    if error.is_builder() {
        FetchError::permanent(url, format!("invalid request: {}", error))
    } else if error.is_timeout() {
        FetchError::transient(url, "request timeout")
    } else if error.is_connect() {
        FetchError::transient(url, format!("connection failed: {}", error))
    } else {
        FetchError::transient(url, error.to_string())
    }
}

/// Request shape of one job with `{base}`, `{key}` and `{page}` placeholders
#[derive(Debug, Clone)]
pub struct RequestTemplate {
    base_url: String,
    key: JobKey,
    method: HttpMethod,
    url_template: String,
    body_template: Option<String>,
    headers: BTreeMap<String, String>,
}

impl RequestTemplate {
    /// Creates a GET template appending `page=N` to `base_url`
    pub fn paged_get(base_url: impl Into<String>, key: JobKey) -> Self {
        let base_url = base_url.into();
        let url_template = default_url_template(&base_url);
        Self {
            base_url,
            key,
            method: HttpMethod::Get,
            url_template,
            body_template: None,
            headers: BTreeMap::new(),
        }
    }

    /// Builds the template of a job
    ///
    /// Job headers override global headers of the same name.
    pub fn from_job(job: &JobConfig, global_headers: &BTreeMap<String, String>) -> Self {
        let mut headers = global_headers.clone();
        headers.extend(job.headers.clone());

        Self {
            base_url: job.base_url.clone(),
            key: job.job_key(),
            method: job.method,
            url_template: job
                .url_template
                .clone()
                .unwrap_or_else(|| default_url_template(&job.base_url)),
            body_template: job.body_template.clone(),
            headers,
        }
    }

    /// Renders the request for `page`
    pub fn render(&self, page: PageIndex) -> PageRequest {
        PageRequest {
            method: self.method,
            url: self.substitute(&self.url_template, page),
            headers: self.headers.clone(),
            body: self
                .body_template
                .as_ref()
                .map(|body| self.substitute(body, page)),
        }
    }

    /// Renders a GET for an arbitrary URL with this job's headers
    pub fn render_url(&self, url: &str) -> PageRequest {
        PageRequest {
            method: HttpMethod::Get,
            url: url.to_string(),
            headers: self.headers.clone(),
            body: None,
        }
    }

    fn substitute(&self, template: &str, page: PageIndex) -> String {
        template
            .replace("{base}", &self.base_url)
            .replace("{key}", self.key.as_str())
            .replace("{page}", &page.to_string())
    }
}

fn default_url_template(base_url: &str) -> String {
    let separator = if base_url.contains('?') { '&' } else { '?' };
    format!("{{base}}{}page={{page}}", separator)
}

/// Fetches the pages of one job
pub struct PageFetcher {
    job_key: JobKey,
    template: RequestTemplate,
    transport: Arc<dyn Transport>,
}

impl PageFetcher {
    pub fn new(job_key: JobKey, template: RequestTemplate, transport: Arc<dyn Transport>) -> Self {
        Self {
            job_key,
            template,
            transport,
        }
    }

    /// Returns the job this fetcher serves
    pub fn job_key(&self) -> &JobKey {
        &self.job_key
    }

    /// Returns the request template
    pub fn template(&self) -> &RequestTemplate {
        &self.template
    }

    /// Fetches the payload of `page`
    pub async fn fetch(&self, page: PageIndex) -> Result<Payload, FetchError> {
        let request = self.template.render(page);
        tracing::debug!("Fetching page {} of {}: {}", page, self.job_key, request.url);
        self.transport.send(&request).await
    }

    /// Sends an arbitrary request through the same transport
    pub async fn send(&self, request: &PageRequest) -> Result<Payload, FetchError> {
        self.transport.send(request).await
    }
}
