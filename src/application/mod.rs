//! API access layer: one async operation per remote call, with typed inputs
//! and normalized results.

pub mod accounts;
mod documents;
pub mod error;
pub mod feed;
pub mod pagination;
pub mod posts;
pub mod session;
pub mod social;
pub mod uploads;

use std::sync::Arc;

use crate::config::FeedSettings;
use crate::infra::remote::Backend;

use self::accounts::AccountService;
use self::feed::FeedService;
use self::posts::PostService;
use self::session::SessionContext;
use self::social::SocialService;
use self::uploads::FileService;

/// Every service wired against one backend and one session.
#[derive(Clone)]
pub struct Services {
    pub session: Arc<SessionContext>,
    pub accounts: AccountService,
    pub posts: PostService,
    pub social: SocialService,
    pub feed: FeedService,
    pub files: FileService,
}

impl Services {
    pub fn new(backend: Arc<dyn Backend>, feed: &FeedSettings) -> Self {
        let session = Arc::new(SessionContext::new(backend.clone()));
        let files = FileService::new(backend.clone());
        let social = SocialService::new(backend.clone());

        Self {
            accounts: AccountService::new(backend.clone(), session.clone(), files.clone()),
            posts: PostService::new(backend.clone(), files.clone(), feed.recent_limit.get()),
            feed: FeedService::new(backend, social.clone()),
            social,
            files,
            session,
        }
    }
}
