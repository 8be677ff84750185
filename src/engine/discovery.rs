//! Page count discovery
//!
//! Before paging, each job determines how many pages its listing has. The
//! count comes from configuration, from the last pagination link of an HTML
//! page, from an item counter divided by the page size, or from a number in
//! a JSON response.

use crate::config::DiscoveryConfig;
use crate::engine::fetcher::{FetchError, PageFetcher, PageRequest};
use crate::engine::retry::{Retryable, RetryError, RetryPolicy};
use crate::extract::compile_selector;
use crate::ConfigError;
use scraper::{Html, Selector};
use serde_json::Value;
use std::fmt;
use thiserror::Error;
use url::Url;

/// Failure to determine a page count
#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error("Malformed discovery response: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Page count not found: {0}")]
    NotFound(String),
}

impl Retryable for DiscoveryError {
    fn is_retryable(&self) -> bool {
        match self {
            Self::Fetch(e) => e.is_transient(),
            Self::Json(_) | Self::NotFound(_) => true,
        }
    }
}

/// Compiled page count strategy of a job
#[derive(Debug, Clone)]
pub enum PageCountDiscovery {
    Fixed(u64),
    LastPageLink { container: Selector, param: String },
    ItemCount { counter: Selector, per_page: u64 },
    JsonTotal { pointer: String, per_page: Option<u64> },
}

impl PageCountDiscovery {
    /// Compiles a strategy from configuration
    pub fn from_config(config: &DiscoveryConfig) -> Result<Self, ConfigError> {
        let discovery = match config {
            DiscoveryConfig::Fixed { pages } => Self::Fixed(*pages),
            DiscoveryConfig::LastPageLink { selector, param } => Self::LastPageLink {
                container: compile_selector(selector)?,
                param: param.clone(),
            },
            DiscoveryConfig::ItemCount { selector, per_page } => Self::ItemCount {
                counter: compile_selector(selector)?,
                per_page: *per_page,
            },
            DiscoveryConfig::JsonTotal { pointer, per_page } => Self::JsonTotal {
                pointer: pointer.clone(),
                per_page: *per_page,
            },
        };
        Ok(discovery)
    }

    /// Reads the total page count from a discovery response
    pub fn page_count(&self, body: &str) -> Result<u64, DiscoveryError> {
        match self {
            Self::Fixed(pages) => Ok(*pages),
            Self::LastPageLink { container, param } => last_page_link(body, container, param),
            Self::ItemCount { counter, per_page } => {
                let count = item_count(body, counter)?;
                Ok(pages_for(count, *per_page))
            }
            Self::JsonTotal { pointer, per_page } => {
                let document: Value = serde_json::from_str(body)?;
                let total = document
                    .pointer(pointer)
                    .and_then(number_of)
                    .ok_or_else(|| DiscoveryError::NotFound(format!("no number at {}", pointer)))?;
                Ok(match per_page {
                    Some(per_page) => pages_for(total, *per_page),
                    None => total,
                })
            }
        }
    }

    /// Determines the page count, fetching `request` when the strategy needs it
    ///
    /// The whole fetch-and-read step is retried under `policy`.
    pub async fn discover(
        &self,
        fetcher: &PageFetcher,
        request: &PageRequest,
        policy: &RetryPolicy,
    ) -> Result<u64, RetryError<DiscoveryError>> {
        if let Self::Fixed(pages) = self {
            return Ok(*pages);
        }

        let label = format!("page count discovery of {}", fetcher.job_key());
        let attempted = policy
            .execute(&label, |_| async {
                let payload = fetcher.send(request).await?;
                self.page_count(&payload.body)
            })
            .await?;

        Ok(attempted.value)
    }
}

impl fmt::Display for PageCountDiscovery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fixed(pages) => write!(f, "fixed ({} pages)", pages),
            Self::LastPageLink { param, .. } => write!(f, "last pagination link (`{}`)", param),
            Self::ItemCount { per_page, .. } => write!(f, "item count / {}", per_page),
            Self::JsonTotal { pointer, per_page } => match per_page {
                Some(per_page) => write!(f, "json total at {} / {}", pointer, per_page),
                None => write!(f, "json page count at {}", pointer),
            },
        }
    }
}

/// Number of pages needed for `count` items
fn pages_for(count: u64, per_page: u64) -> u64 {
    count.div_ceil(per_page.max(1))
}

/// Accepts JSON numbers and numeric strings
fn number_of(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Reads the page parameter of the last link in the pagination container
///
/// A listing without a pagination container, or whose last link carries no
/// page parameter, has a single page.
fn last_page_link(body: &str, container: &Selector, param: &str) -> Result<u64, DiscoveryError> {
    let document = Html::parse_document(body);

    let Some(pagination) = document.select(container).next() else {
        tracing::debug!("No pagination container; assuming a single page");
        return Ok(1);
    };

    let links = Selector::parse("a[href]")
        .map_err(|e| DiscoveryError::NotFound(format!("link selector: {:?}", e)))?;
    let Some(href) = pagination
        .select(&links)
        .filter_map(|link| link.value().attr("href"))
        .last()
    else {
        return Ok(1);
    };

    let page = query_param(href, param);
    match page {
        Some(value) => value.parse().map_err(|_| {
            DiscoveryError::NotFound(format!("{}={} is not a page number", param, value))
        }),
        None => Ok(1),
    }
}

/// Looks up a query parameter of a possibly relative link
fn query_param(href: &str, param: &str) -> Option<String> {
    let base = Url::parse("http://listing.invalid/").ok()?;
    let url = base.join(href).ok()?;
    url.query_pairs()
        .find(|(name, _)| name == param)
        .map(|(_, value)| value.into_owned())
}

/// Reads the first number in the text of the counter element
fn item_count(body: &str, counter: &Selector) -> Result<u64, DiscoveryError> {
    let document = Html::parse_document(body);
    let text = document
        .select(counter)
        .next()
        .map(|element| element.text().collect::<String>())
        .ok_or_else(|| DiscoveryError::NotFound("item counter element missing".to_string()))?;

    let digits: String = text
        .split_whitespace()
        .map(|word| word.replace(',', ""))
        .find(|word| !word.is_empty() && word.chars().all(|c| c.is_ascii_digit()))
        .unwrap_or_default();

    digits
        .parse()
        .map_err(|_| DiscoveryError::NotFound(format!("no item count in '{}'", text.trim())))
}
