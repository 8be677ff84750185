//! In-process listing used by engine tests

use crate::engine::fetcher::{FetchError, PageFetcher, Payload, PageRequest, RequestTemplate, Transport};
use crate::extract::{Extractor, JsonPointerExtractor};
use crate::state::{JobKey, PageIndex};
use async_trait::async_trait;
use serde_json::json;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

pub(crate) const LISTING_URL: &str = "http://listing.test/items";

#[derive(Default)]
struct ListingState {
    requests: Vec<PageIndex>,
    failures: HashMap<PageIndex, u32>,
    empty: HashSet<PageIndex>,
    malformed: HashSet<PageIndex>,
}

/// Serves `{"items": [...]}` with two records per page
#[derive(Default)]
pub(crate) struct MockListing {
    state: Mutex<ListingState>,
}

impl MockListing {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn state(&self) -> std::sync::MutexGuard<'_, ListingState> {
        self.state.lock().unwrap()
    }

    /// Page answers HTTP 503 on every attempt
    pub(crate) fn fail_always(&self, page: PageIndex) {
        self.fail_times(page, u32::MAX);
    }

    /// Page answers HTTP 503 on its first `times` attempts
    pub(crate) fn fail_times(&self, page: PageIndex, times: u32) {
        self.state().failures.insert(page, times);
    }

    pub(crate) fn empty(&self, page: PageIndex) {
        self.state().empty.insert(page);
    }

    pub(crate) fn malformed(&self, page: PageIndex) {
        self.state().malformed.insert(page);
    }

    /// Distinct pages requested, sorted
    pub(crate) fn requested_pages(&self) -> Vec<PageIndex> {
        let mut pages = self.state().requests.clone();
        pages.sort_unstable();
        pages.dedup();
        pages
    }

    pub(crate) fn request_count(&self) -> usize {
        self.state().requests.len()
    }

    pub(crate) fn attempts(&self, page: PageIndex) -> usize {
        self.state().requests.iter().filter(|p| **p == page).count()
    }
}

#[async_trait]
impl Transport for MockListing {
    async fn send(&self, request: &PageRequest) -> Result<Payload, FetchError> {
        let page: PageIndex = request
            .url
            .rsplit("page=")
            .next()
            .and_then(|value| value.parse().ok())
            .ok_or_else(|| FetchError::permanent(&request.url, "no page parameter"))?;

        let mut state = self.state();
        state.requests.push(page);
        let seen = state.requests.iter().filter(|p| **p == page).count() as u64;

        if let Some(failures) = state.failures.get(&page) {
            if seen <= u64::from(*failures) {
                return Err(FetchError::transient(&request.url, "HTTP 503"));
            }
        }

        let body = if state.malformed.contains(&page) {
            "<html>upstream error</html>".to_string()
        } else if state.empty.contains(&page) {
            json!({ "items": [] }).to_string()
        } else {
            json!({ "items": [
                { "page": page, "item": 0 },
                { "page": page, "item": 1 },
            ] })
            .to_string()
        };

        Ok(Payload { status: 200, body })
    }
}

pub(crate) fn listing_key() -> JobKey {
    JobKey::new("listing")
}

pub(crate) fn listing_fetcher(listing: &Arc<MockListing>) -> Arc<PageFetcher> {
    let transport: Arc<dyn Transport> = Arc::clone(listing) as Arc<dyn Transport>;
    Arc::new(PageFetcher::new(
        listing_key(),
        RequestTemplate::paged_get(LISTING_URL, listing_key()),
        transport,
    ))
}

pub(crate) fn listing_extractor() -> Arc<dyn Extractor> {
    Arc::new(JsonPointerExtractor::new("/items", Vec::new()))
}
