//! Detail enrichment
//!
//! Some listings carry only a summary of each item and a link to its detail
//! page. A detail stage follows that link for every record of a page,
//! `batch_size` links at a time, and merges what the detail extractor finds
//! into the record.
//!
//! Enrichment runs inside the page task, so a page is only committed once
//! all of its records are enriched. A detail page that exhausts its retries
//! fails its listing page.

use crate::config::DetailsConfig;
use crate::engine::fetcher::PageFetcher;
use crate::engine::retry::{PageError, RetryError, RetryPolicy};
use crate::extract::{build_extractor, Extractor};
use crate::state::Record;
use crate::ConfigError;
use std::fmt;
use std::sync::Arc;
use tokio::task::JoinSet;
use url::Url;

/// Compiled detail stage of a job
pub struct DetailStage {
    url_field: String,
    base: Option<Url>,
    into: Option<String>,
    batch_size: usize,
    extractor: Arc<dyn Extractor>,
}

impl DetailStage {
    /// Creates a stage reading detail links from `url_field`
    ///
    /// Relative links are resolved against `base`. A batch size of zero is
    /// treated as one.
    pub fn new(
        url_field: impl Into<String>,
        base: Option<Url>,
        batch_size: usize,
        extractor: Arc<dyn Extractor>,
    ) -> Self {
        Self {
            url_field: url_field.into(),
            base,
            into: None,
            batch_size: batch_size.max(1),
            extractor,
        }
    }

    /// Nests all detail records under `field` instead of merging the first
    pub fn nested_into(mut self, field: impl Into<String>) -> Self {
        self.into = Some(field.into());
        self
    }

    /// Compiles a job's `details` section
    ///
    /// `default_batch_size` applies when the section sets none.
    pub fn from_config(
        config: &DetailsConfig,
        base_url: &str,
        default_batch_size: usize,
    ) -> Result<Self, ConfigError> {
        let base = Url::parse(base_url)
            .map_err(|e| ConfigError::InvalidUrl(format!("'{}': {}", base_url, e)))?;
        let stage = Self::new(
            config.url_field.clone(),
            Some(base),
            config.batch_size.unwrap_or(default_batch_size),
            build_extractor(&config.extractor)?,
        );

        Ok(match &config.into {
            Some(field) => stage.nested_into(field.clone()),
            None => stage,
        })
    }

    /// Returns the absolute detail URL of a record, if it has one
    pub fn detail_url(&self, record: &Record) -> Option<String> {
        let raw = record.get(&self.url_field)?.as_str()?.trim();
        if raw.is_empty() {
            return None;
        }

        match &self.base {
            Some(base) => base.join(raw).ok().map(String::from),
            None => Some(raw.to_string()),
        }
    }

    /// Enriches `records` in place
    ///
    /// Returns the number of retried detail requests. Records without a
    /// detail link are kept as they are.
    pub async fn enrich(
        self: Arc<Self>,
        fetcher: Arc<PageFetcher>,
        records: &mut [Record],
        policy: RetryPolicy,
        retry_parse_failures: bool,
    ) -> Result<u32, RetryError<PageError>> {
        let mut retries = 0;

        for chunk_start in (0..records.len()).step_by(self.batch_size) {
            let chunk_end = (chunk_start + self.batch_size).min(records.len());
            let mut tasks = JoinSet::new();

            for (index, record) in records.iter().enumerate().take(chunk_end).skip(chunk_start) {
                let Some(url) = self.detail_url(record) else {
                    tracing::warn!(
                        "Record {} of {} has no '{}' to follow",
                        index,
                        fetcher.job_key(),
                        self.url_field
                    );
                    continue;
                };

                let stage = Arc::clone(&self);
                let fetcher = Arc::clone(&fetcher);
                tasks.spawn(async move {
                    let label = format!("detail {} of {}", url, fetcher.job_key());
                    let result = policy
                        .execute(&label, |_| {
                            stage.fetch_details(&fetcher, &url, retry_parse_failures)
                        })
                        .await;
                    (index, result)
                });
            }

            while let Some(joined) = tasks.join_next().await {
                let (index, result) = joined.map_err(|e| RetryError::Aborted {
                    attempt: 1,
                    source: PageError::Task(e.to_string()),
                })?;
                let attempted = result?;
                retries += attempted.retries();
                self.merge(&mut records[index], attempted.value);
            }
        }

        Ok(retries)
    }

    /// One attempt at a detail page
    async fn fetch_details(
        &self,
        fetcher: &PageFetcher,
        url: &str,
        retry_parse_failures: bool,
    ) -> Result<Vec<Record>, PageError> {
        let request = fetcher.template().render_url(url);
        tracing::debug!("Fetching details of {}: {}", fetcher.job_key(), url);
        let payload = fetcher.send(&request).await?;

        self.extractor
            .extract(&payload.body)
            .map_err(|source| PageError::Extract {
                source,
                retryable: retry_parse_failures,
            })
    }

    /// Listing fields win over detail fields of the same name
    fn merge(&self, record: &mut Record, details: Vec<Record>) {
        let Record::Object(map) = record else {
            return;
        };

        match &self.into {
            Some(field) => {
                map.insert(field.clone(), Record::Array(details));
            }
            None => {
                if let Some(Record::Object(first)) = details.into_iter().next() {
                    for (name, value) in first {
                        map.entry(name).or_insert(value);
                    }
                }
            }
        }
    }
}

impl fmt::Display for DetailStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "follow `{}`, {} at a time", self.url_field, self.batch_size)?;
        if let Some(field) = &self.into {
            write!(f, ", into `{}`", field)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::fetcher::{FetchError, PageRequest, Payload, RequestTemplate, Transport};
    use crate::extract::JsonPointerExtractor;
    use crate::state::JobKey;
    use async_trait::async_trait;
    use serde_json::json;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// Serves `{"detail": {"id": N}}` for `/firms/N`
    #[derive(Default)]
    struct DetailPages {
        requests: Mutex<Vec<String>>,
        failures: Mutex<HashMap<String, u32>>,
    }

    impl DetailPages {
        fn requests(&self) -> Vec<String> {
            self.requests.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Transport for DetailPages {
        async fn send(&self, request: &PageRequest) -> Result<Payload, FetchError> {
            self.requests.lock().unwrap().push(request.url.clone());

            if let Some(left) = self.failures.lock().unwrap().get_mut(&request.url) {
                if *left > 0 {
                    *left -= 1;
                    return Err(FetchError::transient(&request.url, "HTTP 502"));
                }
            }

            let id = request.url.rsplit('/').next().unwrap_or_default();
            let body = json!({ "detail": { "id": id, "phone": format!("+41 {}", id) } });
            Ok(Payload {
                status: 200,
                body: body.to_string(),
            })
        }
    }

    fn fetcher(pages: &Arc<DetailPages>) -> Arc<PageFetcher> {
        let key = JobKey::new("firms");
        Arc::new(PageFetcher::new(
            key.clone(),
            RequestTemplate::paged_get("http://register.test/firms", key),
            Arc::clone(pages) as Arc<dyn Transport>,
        ))
    }

    fn stage(batch_size: usize) -> DetailStage {
        DetailStage::new(
            "url",
            Url::parse("http://register.test/firms").ok(),
            batch_size,
            Arc::new(JsonPointerExtractor::new("/detail", vec![])),
        )
    }

    fn firms(count: usize) -> Vec<Record> {
        (0..count)
            .map(|i| json!({ "name": format!("Firm {}", i), "url": format!("/firms/{}", i) }))
            .collect()
    }

    #[tokio::test]
    async fn test_merges_detail_fields() {
        let pages = Arc::new(DetailPages::default());
        let mut records = firms(5);

        let retries = Arc::new(stage(2))
            .enrich(fetcher(&pages), &mut records, RetryPolicy::new(3), true)
            .await
            .unwrap();

        assert_eq!(retries, 0);
        assert_eq!(pages.requests().len(), 5);
        assert_eq!(
            records[3],
            json!({ "name": "Firm 3", "url": "/firms/3", "id": "3", "phone": "+41 3" })
        );
    }

    #[tokio::test]
    async fn test_listing_fields_win() {
        let pages = Arc::new(DetailPages::default());
        let mut records = vec![json!({ "id": "listed", "url": "http://other.test/firms/7" })];

        Arc::new(stage(5))
            .enrich(fetcher(&pages), &mut records, RetryPolicy::new(1), true)
            .await
            .unwrap();

        assert_eq!(pages.requests(), vec!["http://other.test/firms/7"]);
        assert_eq!(records[0]["id"], "listed");
        assert_eq!(records[0]["phone"], "+41 7");
    }

    #[tokio::test]
    async fn test_nested_details_and_missing_links() {
        let pages = Arc::new(DetailPages::default());
        let mut records = vec![json!({ "url": "/firms/1" }), json!({ "name": "no link" })];

        Arc::new(stage(5).nested_into("details"))
            .enrich(fetcher(&pages), &mut records, RetryPolicy::new(1), true)
            .await
            .unwrap();

        assert_eq!(
            records[0]["details"],
            json!([{ "id": "1", "phone": "+41 1" }])
        );
        assert_eq!(records[1], json!({ "name": "no link" }));
        assert_eq!(pages.requests().len(), 1);
    }

    #[tokio::test]
    async fn test_detail_retries_are_counted() {
        let pages = Arc::new(DetailPages::default());
        pages
            .failures
            .lock()
            .unwrap()
            .insert("http://register.test/firms/1".to_string(), 2);
        let mut records = firms(2);

        let retries = Arc::new(stage(2))
            .enrich(fetcher(&pages), &mut records, RetryPolicy::new(3), true)
            .await
            .unwrap();

        assert_eq!(retries, 2);
        assert_eq!(records[1]["phone"], "+41 1");
    }

    #[tokio::test]
    async fn test_exhausted_detail_fails() {
        let pages = Arc::new(DetailPages::default());
        pages
            .failures
            .lock()
            .unwrap()
            .insert("http://register.test/firms/0".to_string(), u32::MAX);
        let mut records = firms(1);

        let err = Arc::new(stage(2))
            .enrich(fetcher(&pages), &mut records, RetryPolicy::new(2), true)
            .await
            .unwrap_err();

        assert!(matches!(err, RetryError::Exhausted { attempts: 2, .. }));
        assert!(records[0].get("phone").is_none());
    }

    #[test]
    fn test_from_config_and_display() {
        let config: DetailsConfig = toml::from_str(
            r#"
url-field = "url"
into = "individuals"
extractor = { type = "json", pointer = "/people" }
"#,
        )
        .unwrap();

        let stage = DetailStage::from_config(&config, "https://register.example/firms", 4).unwrap();
        assert_eq!(stage.to_string(), "follow `url`, 4 at a time, into `individuals`");
        assert_eq!(
            stage.detail_url(&json!({ "url": "/firms/9" })).as_deref(),
            Some("https://register.example/firms/9")
        );
        assert_eq!(stage.detail_url(&json!({ "url": "  " })), None);
    }
}
