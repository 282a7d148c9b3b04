//! Page-by-page reads that accumulate into one list.

use std::future::Future;

use crate::application::error::ApiError;
use crate::application::pagination::{Page, PageRequest};

use super::client::{QueryClient, QueryState};
use super::keys::QueryKey;

/// Contiguous pages fetched so far, starting at page 1.
#[derive(Debug, Clone)]
pub struct InfiniteQuery<T> {
    page_size: u32,
    key_for: fn(u32, u32) -> QueryKey,
    pages: Vec<Page<T>>,
}

impl<T> InfiniteQuery<T> {
    /// `key_for(page, page_size)` names the cache entry of each page.
    pub fn new(page_size: u32, key_for: fn(u32, u32) -> QueryKey) -> Self {
        Self {
            page_size,
            key_for,
            pages: Vec::new(),
        }
    }

    pub fn next_page(&self) -> u32 {
        u32::try_from(self.pages.len()).map_or(u32::MAX, |len| len.saturating_add(1))
    }

    /// True before the first fetch and while the last page reports more.
    pub fn has_next(&self) -> bool {
        self.pages.last().is_none_or(|page| page.has_next)
    }

    pub fn pages(&self) -> &[Page<T>] {
        &self.pages
    }

    pub fn items(&self) -> impl Iterator<Item = &T> {
        self.pages.iter().flat_map(|page| page.items.iter())
    }

    pub fn reset(&mut self) {
        self.pages.clear();
    }
}

impl<T: Clone + Send + Sync + 'static> InfiniteQuery<T> {
    /// Fetch the next page through `client`. Returns false once exhausted.
    pub async fn fetch_next<F, Fut>(&mut self, client: &QueryClient, fetcher: F) -> Result<bool, ApiError>
    where
        F: FnOnce(PageRequest) -> Fut,
        Fut: Future<Output = Result<Page<T>, ApiError>> + Send + 'static,
    {
        if !self.has_next() {
            return Ok(false);
        }
        let request = PageRequest::new(self.next_page(), self.page_size)?;
        let key = (self.key_for)(request.page(), request.page_size());

        match client.fetch(key, true, move || fetcher(request)).await? {
            QueryState::Ready(page) => {
                self.pages.push(page);
                Ok(true)
            }
            QueryState::Disabled => Ok(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::cache::config::CacheConfig;

    fn numbers(request: PageRequest) -> Page<u32> {
        Page::from_window(request, (1..=5).collect())
    }

    #[tokio::test]
    async fn pages_accumulate_until_exhausted() -> Result<(), ApiError> {
        let client = QueryClient::new(CacheConfig::default());
        let mut query = InfiniteQuery::new(2, QueryKey::explore_page);
        assert_eq!(query.next_page(), 1);
        assert!(query.has_next());

        while query
            .fetch_next(&client, |request| async move { Ok(numbers(request)) })
            .await?
        {}

        assert_eq!(query.pages().len(), 3);
        assert_eq!(query.next_page(), 4);
        assert!(!query.has_next());
        assert_eq!(query.items().copied().collect::<Vec<_>>(), vec![1, 2, 3, 4, 5]);
        Ok(())
    }

    #[tokio::test]
    async fn exhausted_query_does_not_fetch() -> Result<(), ApiError> {
        let client = QueryClient::new(CacheConfig::default());
        let calls = Arc::new(AtomicUsize::new(0));
        let mut query = InfiniteQuery::new(10, QueryKey::explore_page);

        for _ in 0..3 {
            let calls = calls.clone();
            query
                .fetch_next(&client, move |request| async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok(numbers(request))
                })
                .await?;
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(query.pages().len(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn reset_starts_from_page_one() -> Result<(), ApiError> {
        let client = QueryClient::new(CacheConfig::default());
        let mut query = InfiniteQuery::new(2, QueryKey::explore_page);
        query
            .fetch_next(&client, |request| async move { Ok(numbers(request)) })
            .await?;
        query.reset();
        assert_eq!(query.next_page(), 1);
        assert!(query.items().next().is_none());
        Ok(())
    }

    #[tokio::test]
    async fn failed_page_is_not_appended() {
        let client = QueryClient::new(CacheConfig::default());
        let mut query: InfiniteQuery<u32> = InfiniteQuery::new(2, QueryKey::explore_page);
        let result = query
            .fetch_next(&client, |_| async {
                Err(ApiError::Unavailable("offline".to_string()))
            })
            .await;
        assert!(result.is_err());
        assert_eq!(query.next_page(), 1);
    }
}
