//! Home, explore and profile feeds.

use std::collections::HashSet;
use std::sync::Arc;

use futures::future::try_join_all;
use pulse_api_types::{PostDocument, attributes};
use tracing::debug;

use crate::domain::entities::Post;
use crate::domain::error::require_id;
use crate::domain::posts::newest_first;
use crate::infra::remote::{Backend, Collection, Query};

use super::documents::{self, Op};
use super::error::ApiError;
use super::pagination::{Page, PageRequest};
use super::social::SocialService;

const LIST_FEED: Op = Op::new("list_feed_posts", "post");

#[derive(Clone)]
pub struct FeedService {
    backend: Arc<dyn Backend>,
    social: SocialService,
}

impl FeedService {
    pub fn new(backend: Arc<dyn Backend>, social: SocialService) -> Self {
        Self { backend, social }
    }

    /// Posts by the user and everyone they follow, newest first.
    ///
    /// Each author contributes at most `end` posts of its own, which is enough
    /// to fill the merged window for any page.
    pub async fn home_feed(
        &self,
        user_id: &str,
        request: PageRequest,
    ) -> Result<Page<Post>, ApiError> {
        let user_id = require_id("user_id", user_id)?;
        let following = self.social.get_following(user_id).await?;

        let mut seen = HashSet::new();
        let authors: Vec<String> = std::iter::once(user_id.to_string())
            .chain(following.into_iter().map(|record| record.followed_id))
            .filter(|author| seen.insert(author.clone()))
            .collect();
        debug!(user_id, authors = authors.len(), page = request.page(), "home feed fan-out");

        let window = request.end();
        let fetches = authors.iter().map(|author| {
            let queries = [
                Query::equal(attributes::CREATOR, author.as_str()),
                Query::order_desc(attributes::CREATED_AT),
                Query::limit(window),
            ];
            async move {
                documents::list::<PostDocument>(
                    self.backend.as_ref(),
                    LIST_FEED,
                    Collection::Posts,
                    &queries,
                )
                .await
            }
        });
        let results = try_join_all(fetches).await?;

        let mut total = 0_u64;
        let mut merged: Vec<Post> = Vec::new();
        for (author_total, docs) in results {
            total += author_total;
            merged.extend(docs.into_iter().map(Post::from));
        }
        merged.sort_by(newest_first);

        let items = merged
            .into_iter()
            .skip(request.start() as usize)
            .take(request.page_size() as usize)
            .collect();
        Ok(Page::new(request, items, total))
    }

    /// Every post, newest first, paged by the backend.
    pub async fn explore_feed(&self, request: PageRequest) -> Result<Page<Post>, ApiError> {
        self.paged(Vec::new(), request).await
    }

    /// Posts by one creator, newest first, paged by the backend.
    pub async fn profile_feed(
        &self,
        user_id: &str,
        request: PageRequest,
    ) -> Result<Page<Post>, ApiError> {
        let user_id = require_id("user_id", user_id)?;
        self.paged(vec![Query::equal(attributes::CREATOR, user_id)], request)
            .await
    }

    async fn paged(
        &self,
        mut queries: Vec<Query>,
        request: PageRequest,
    ) -> Result<Page<Post>, ApiError> {
        queries.push(Query::order_desc(attributes::CREATED_AT));
        queries.push(Query::offset(request.start()));
        queries.push(Query::limit(request.page_size()));

        let (total, docs) = documents::list::<PostDocument>(
            self.backend.as_ref(),
            LIST_FEED,
            Collection::Posts,
            &queries,
        )
        .await?;
        Ok(Page::new(
            request,
            docs.into_iter().map(Post::from).collect(),
            total,
        ))
    }
}
