//! Query key definitions.
//!
//! A key is an operation kind plus an optional parameter. Used as an
//! invalidation target, a key without a parameter covers every key of its
//! kind.

use std::fmt;

/// Read operations the cache knows about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum QueryKind {
    CurrentUser,
    Users,
    UserById,
    UserPosts,
    UserFollowing,
    UserFollowers,
    PostById,
    /// Home feed and the recent-posts list.
    RecentPosts,
    /// Explore feed pages.
    InfinitePosts,
    SearchPosts,
    SavedPosts,
    LikedPosts,
}

impl QueryKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CurrentUser => "current_user",
            Self::Users => "users",
            Self::UserById => "user_by_id",
            Self::UserPosts => "user_posts",
            Self::UserFollowing => "user_following",
            Self::UserFollowers => "user_followers",
            Self::PostById => "post_by_id",
            Self::RecentPosts => "recent_posts",
            Self::InfinitePosts => "infinite_posts",
            Self::SearchPosts => "search_posts",
            Self::SavedPosts => "saved_posts",
            Self::LikedPosts => "liked_posts",
        }
    }
}

impl fmt::Display for QueryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct QueryKey {
    pub kind: QueryKind,
    pub param: Option<String>,
}

impl QueryKey {
    pub fn new(kind: QueryKind, param: impl Into<String>) -> Self {
        Self {
            kind,
            param: Some(param.into()),
        }
    }

    /// Key without a parameter; as a target it matches the whole kind.
    pub fn all(kind: QueryKind) -> Self {
        Self { kind, param: None }
    }

    /// True when invalidating `self` must also invalidate `stored`.
    pub fn matches(&self, stored: &QueryKey) -> bool {
        if self.kind != stored.kind {
            return false;
        }
        match &self.param {
            None => true,
            Some(param) => stored.param.as_deref() == Some(param.as_str()),
        }
    }

    pub fn current_user() -> Self {
        Self::all(QueryKind::CurrentUser)
    }

    pub fn users(limit: u32) -> Self {
        Self::new(QueryKind::Users, limit.to_string())
    }

    pub fn user_by_id(user_id: &str) -> Self {
        Self::new(QueryKind::UserById, user_id)
    }

    pub fn user_posts(user_id: &str) -> Self {
        Self::new(QueryKind::UserPosts, user_id)
    }

    pub fn user_following(user_id: &str) -> Self {
        Self::new(QueryKind::UserFollowing, user_id)
    }

    pub fn user_followers(user_id: &str) -> Self {
        Self::new(QueryKind::UserFollowers, user_id)
    }

    pub fn post_by_id(post_id: &str) -> Self {
        Self::new(QueryKind::PostById, post_id)
    }

    pub fn home_feed(user_id: &str, page: u32, page_size: u32) -> Self {
        Self::new(
            QueryKind::RecentPosts,
            format!("home:{user_id}:{page}:{page_size}"),
        )
    }

    pub fn recent_posts() -> Self {
        Self::new(QueryKind::RecentPosts, "latest")
    }

    pub fn explore_page(page: u32, page_size: u32) -> Self {
        Self::new(QueryKind::InfinitePosts, format!("{page_size}:{page}"))
    }

    pub fn search_posts(term: &str) -> Self {
        Self::new(QueryKind::SearchPosts, term)
    }

    pub fn saved_posts(user_id: &str) -> Self {
        Self::new(QueryKind::SavedPosts, user_id)
    }

    pub fn liked_posts(user_id: &str) -> Self {
        Self::new(QueryKind::LikedPosts, user_id)
    }
}

impl fmt::Display for QueryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.param {
            Some(param) => write!(f, "{}:{param}", self.kind),
            None => write!(f, "{}:*", self.kind),
        }
    }
}
