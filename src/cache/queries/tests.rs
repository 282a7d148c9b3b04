use std::sync::Arc;

use crate::application::Services;
use crate::application::accounts::{NewUser, UpdateUser};
use crate::application::error::ApiError;
use crate::application::pagination::PageRequest;
use crate::application::posts::NewPost;
use crate::cache::client::{QueryClient, QueryState};
use crate::cache::config::CacheConfig;
use crate::cache::keys::QueryKey;
use crate::config::FeedSettings;
use crate::domain::entities::{FileUpload, Post, User};
use crate::infra::remote::MemoryBackend;

use super::Queries;

struct Fixture {
    backend: Arc<MemoryBackend>,
    queries: Queries,
}

fn fixture_with(config: CacheConfig) -> Fixture {
    let backend = Arc::new(MemoryBackend::new());
    let feed = FeedSettings::default();
    let services = Services::new(backend.clone(), &feed);
    let client = Arc::new(QueryClient::new(config));
    Fixture {
        queries: Queries::new(services, client, &feed),
        backend,
    }
}

/// Long stale time so invalidation is the only thing that makes entries stale.
fn fixture() -> Fixture {
    fixture_with(CacheConfig {
        stale_time_ms: 60_000,
        ..CacheConfig::default()
    })
}

async fn signed_in(fx: &Fixture) -> Result<User, ApiError> {
    fx.queries
        .create_user_account(NewUser {
            name: "Ada Lovelace".into(),
            username: "ada".into(),
            email: "ada@example.com".into(),
            password: "pw-123456".into(),
        })
        .await?;
    fx.queries.sign_in("ada@example.com", "pw-123456").await?;
    fx.queries.services().session.require_user()
}

async fn post_by(fx: &Fixture, user: &User, caption: &str) -> Result<Post, ApiError> {
    fx.queries
        .create_post(NewPost {
            user_id: user.id.clone(),
            caption: caption.into(),
            file: FileUpload::new("photo.jpg", vec![1_u8; 8]),
            location: String::new(),
            tags: "nature, travel".into(),
        })
        .await
}

fn first_page() -> PageRequest {
    PageRequest::first(10).expect("valid page")
}

#[tokio::test]
async fn like_marks_post_feed_and_current_user_stale() -> Result<(), ApiError> {
    let fx = fixture();
    let user = signed_in(&fx).await?;
    let post = post_by(&fx, &user, "sunrise").await?;

    fx.queries.post_by_id(&post.id).await?;
    fx.queries.home_feed(&user.id, first_page()).await?;
    fx.queries.current_user().await?;
    fx.queries.user_by_id(&user.id).await?;

    let client = fx.queries.client();
    let feed_key = QueryKey::home_feed(&user.id, 1, 10);
    assert_eq!(client.is_stale(&QueryKey::post_by_id(&post.id)), Some(false));
    assert_eq!(client.is_stale(&feed_key), Some(false));

    let liked = fx
        .queries
        .like_post(&post.id, vec!["u1".to_string(), "u2".to_string()])
        .await?;
    assert_eq!(liked.likes, vec!["u1", "u2"]);

    assert_eq!(client.is_stale(&QueryKey::post_by_id(&post.id)), Some(true));
    assert_eq!(client.is_stale(&feed_key), Some(true));
    assert_eq!(client.is_stale(&QueryKey::current_user()), Some(true));
    assert_eq!(client.is_stale(&QueryKey::user_by_id(&user.id)), Some(false));

    let reread = fx.queries.post_by_id(&post.id).await?.into_option();
    assert_eq!(reread.map(|post| post.likes), Some(vec!["u1".into(), "u2".into()]));
    Ok(())
}

#[tokio::test]
async fn fresh_reads_skip_the_backend() -> Result<(), ApiError> {
    let fx = fixture();
    let user = signed_in(&fx).await?;
    let post = post_by(&fx, &user, "sunrise").await?;
    fx.backend.clear_calls();

    fx.queries.post_by_id(&post.id).await?;
    fx.queries.post_by_id(&post.id).await?;
    assert_eq!(fx.backend.count_calls("get_document:posts"), 1);
    Ok(())
}

#[tokio::test]
async fn blank_identifiers_issue_no_remote_calls() -> Result<(), ApiError> {
    let fx = fixture();
    fx.backend.clear_calls();

    assert!(fx.queries.user_by_id("").await?.is_disabled());
    assert!(fx.queries.post_by_id("  ").await?.is_disabled());
    assert!(fx.queries.user_posts("").await?.is_disabled());
    assert!(fx.queries.user_following("").await?.is_disabled());
    assert!(fx.queries.search_posts(" ").await?.is_disabled());
    assert!(fx.queries.saved_posts("").await?.is_disabled());
    assert!(fx.queries.liked_posts("").await?.is_disabled());
    assert!(fx.queries.home_feed("", first_page()).await?.is_disabled());
    assert!(fx.backend.calls().is_empty());
    Ok(())
}

#[tokio::test]
async fn failed_mutation_invalidates_nothing() -> Result<(), ApiError> {
    let fx = fixture();
    let user = signed_in(&fx).await?;
    let post = post_by(&fx, &user, "sunrise").await?;
    fx.queries.post_by_id(&post.id).await?;

    fx.backend.fail_next_document_write();
    let result = fx.queries.like_post(&post.id, vec![user.id.clone()]).await;
    assert!(matches!(result, Err(ApiError::Unavailable(_))));
    assert_eq!(
        fx.queries.client().is_stale(&QueryKey::post_by_id(&post.id)),
        Some(false)
    );
    Ok(())
}

#[tokio::test]
async fn create_post_refreshes_home_feed() -> Result<(), ApiError> {
    let fx = fixture();
    let user = signed_in(&fx).await?;
    post_by(&fx, &user, "first").await?;

    let before = fx.queries.home_feed(&user.id, first_page()).await?;
    assert_eq!(before.into_option().map(|page| page.items.len()), Some(1));

    post_by(&fx, &user, "second").await?;
    let after = fx
        .queries
        .home_feed(&user.id, first_page())
        .await?
        .into_option()
        .map(|page| page.items.into_iter().map(|post| post.caption).collect::<Vec<_>>());
    assert_eq!(after, Some(vec!["second".to_string(), "first".to_string()]));
    Ok(())
}

#[tokio::test]
async fn update_user_invalidates_user_entries() -> Result<(), ApiError> {
    let fx = fixture();
    let user = signed_in(&fx).await?;
    fx.queries.current_user().await?;
    fx.queries.user_by_id(&user.id).await?;

    fx.queries
        .update_user(UpdateUser {
            user_id: user.id.clone(),
            name: "Ada King".into(),
            bio: "analyst".into(),
            image_id: user.image_id.clone(),
            image_url: user.image_url.clone(),
            file: None,
        })
        .await?;

    let client = fx.queries.client();
    assert_eq!(client.is_stale(&QueryKey::current_user()), Some(true));
    assert_eq!(client.is_stale(&QueryKey::user_by_id(&user.id)), Some(true));

    let name = fx.queries.user_by_id(&user.id).await?.into_option().map(|u| u.name);
    assert_eq!(name, Some("Ada King".to_string()));
    Ok(())
}

#[tokio::test]
async fn follow_invalidates_following_lists() -> Result<(), ApiError> {
    let fx = fixture();
    let user = signed_in(&fx).await?;
    let before = fx.queries.user_following(&user.id).await?.into_option();
    assert_eq!(before.map(|records| records.len()), Some(0));

    fx.queries.follow_user(&user.id, "someone").await?;
    assert_eq!(
        fx.queries.client().is_stale(&QueryKey::user_following(&user.id)),
        Some(true)
    );
    let after = fx.queries.user_following(&user.id).await?.into_option();
    assert_eq!(after.map(|records| records.len()), Some(1));

    fx.queries.unfollow_user(&user.id, "someone").await?;
    let cleared = fx.queries.user_following(&user.id).await?.into_option();
    assert_eq!(cleared.map(|records| records.len()), Some(0));
    Ok(())
}

#[tokio::test]
async fn save_and_unsave_invalidate_feed_and_current_user() -> Result<(), ApiError> {
    let fx = fixture();
    let user = signed_in(&fx).await?;
    let post = post_by(&fx, &user, "sunrise").await?;
    fx.queries.current_user().await?;
    fx.queries.home_feed(&user.id, first_page()).await?;

    let saved = fx.queries.save_post(&user.id, &post.id).await?;
    let client = fx.queries.client();
    assert_eq!(client.is_stale(&QueryKey::current_user()), Some(true));
    assert_eq!(
        client.is_stale(&QueryKey::home_feed(&user.id, 1, 10)),
        Some(true)
    );

    fx.queries.current_user().await?;
    assert_eq!(client.is_stale(&QueryKey::current_user()), Some(false));
    fx.queries.delete_saved_post(&saved.id).await?;
    assert_eq!(client.is_stale(&QueryKey::current_user()), Some(true));
    Ok(())
}

#[tokio::test]
async fn sign_out_clears_cache() -> Result<(), ApiError> {
    let fx = fixture();
    signed_in(&fx).await?;
    fx.queries.current_user().await?;
    assert!(fx.queries.client().cached_len() > 0);

    fx.queries.sign_out().await?;
    assert_eq!(fx.queries.client().cached_len(), 0);
    assert!(!fx.queries.services().session.is_signed_in());
    Ok(())
}

#[tokio::test]
async fn disabled_cache_always_reaches_backend() -> Result<(), ApiError> {
    let fx = fixture_with(CacheConfig {
        enabled: false,
        stale_time_ms: 60_000,
        ..CacheConfig::default()
    });
    let user = signed_in(&fx).await?;
    let post = post_by(&fx, &user, "sunrise").await?;
    fx.backend.clear_calls();

    fx.queries.post_by_id(&post.id).await?;
    fx.queries.post_by_id(&post.id).await?;
    assert_eq!(fx.backend.count_calls("get_document:posts"), 2);
    assert_eq!(fx.queries.client().cached_len(), 0);
    Ok(())
}

#[tokio::test]
async fn explore_pages_accumulate() -> Result<(), ApiError> {
    let fx = fixture();
    let user = signed_in(&fx).await?;
    for caption in ["a", "b", "c"] {
        post_by(&fx, &user, caption).await?;
    }

    let mut explore = fx.queries.explore_query();
    assert_eq!(explore.next_page(), 1);
    assert!(fx.queries.explore_feed(&mut explore).await?);
    assert_eq!(explore.items().count(), 3);
    assert!(!explore.has_next());
    assert!(!fx.queries.explore_feed(&mut explore).await?);
    Ok(())
}

#[tokio::test]
async fn search_trims_the_term() -> Result<(), ApiError> {
    let fx = fixture();
    let user = signed_in(&fx).await?;
    post_by(&fx, &user, "Golden sunrise").await?;

    let found = fx.queries.search_posts("  sunrise ").await?;
    assert_eq!(found.into_option().map(|posts| posts.len()), Some(1));
    assert_eq!(
        fx.queries.client().is_stale(&QueryKey::search_posts("sunrise")),
        Some(false)
    );
    Ok(())
}

#[tokio::test]
async fn concurrent_reads_share_one_request() -> Result<(), ApiError> {
    let fx = fixture();
    let user = signed_in(&fx).await?;
    let post = post_by(&fx, &user, "sunrise").await?;
    fx.backend.clear_calls();

    let (a, b) = tokio::join!(fx.queries.post_by_id(&post.id), fx.queries.post_by_id(&post.id));
    assert_eq!(a?, b?);
    assert!(matches!(
        fx.queries.post_by_id(&post.id).await?,
        QueryState::Ready(_)
    ));
    assert_eq!(fx.backend.count_calls("get_document:posts"), 1);
    Ok(())
}
