use std::sync::Arc;

use futures::future::try_join_all;
use pulse_api_types::{
    LikesPatch, PostDocument, PostPatch, PostWrite, SaveDocument, SaveWrite, attributes,
};
use tracing::{debug, info};

use crate::domain::entities::{FileUpload, Post, SavedPost};
use crate::domain::error::require_id;
use crate::domain::posts::{parse_tags, validate_caption, validate_location};
use crate::infra::remote::{Backend, Collection, Query, unique_id};

use super::documents::{self, Op};
use super::error::ApiError;
use super::uploads::FileService;

const GET_POST: Op = Op::new("get_post", "post");
const LIST_POSTS: Op = Op::new("list_posts", "post");
const CREATE_POST: Op = Op::new("create_post", "post");
const UPDATE_POST: Op = Op::new("update_post", "post");
const DELETE_POST: Op = Op::new("delete_post", "post");
const LIKE_POST: Op = Op::new("like_post", "post");
const SAVE_POST: Op = Op::new("save_post", "saved post");
const LIST_SAVES: Op = Op::new("list_saves", "saved post");
const DELETE_SAVE: Op = Op::new("delete_saved_post", "saved post");

#[derive(Debug, Clone)]
pub struct NewPost {
    pub user_id: String,
    pub caption: String,
    pub file: FileUpload,
    pub location: String,
    /// Comma-separated tags as typed by the user.
    pub tags: String,
}

#[derive(Debug, Clone)]
pub struct UpdatePost {
    pub post_id: String,
    pub caption: String,
    /// Current image; replaced when `file` is set.
    pub image_id: String,
    pub image_url: String,
    pub file: Option<FileUpload>,
    pub location: String,
    pub tags: String,
}

#[derive(Clone)]
pub struct PostService {
    backend: Arc<dyn Backend>,
    files: FileService,
    recent_limit: u32,
}

impl PostService {
    pub fn new(backend: Arc<dyn Backend>, files: FileService, recent_limit: u32) -> Self {
        Self {
            backend,
            files,
            recent_limit,
        }
    }

    /// Upload the image, then write the post. The upload is removed again when
    /// the preview or the document write fails.
    pub async fn create_post(&self, new_post: NewPost) -> Result<Post, ApiError> {
        let creator = require_id("user_id", &new_post.user_id)?.to_string();
        validate_caption(&new_post.caption)?;
        validate_location(&new_post.location)?;

        let (upload, image) = self.files.upload_image(&new_post.file).await?;
        let write = PostWrite {
            creator,
            caption: new_post.caption,
            image_url: image.url,
            image_id: image.id,
            location: new_post.location,
            tags: parse_tags(&new_post.tags),
            likes: Vec::new(),
        };

        let written = documents::create::<_, PostDocument>(
            self.backend.as_ref(),
            CREATE_POST,
            Collection::Posts,
            &unique_id(),
            &write,
        )
        .await;

        match written {
            Ok(doc) => {
                upload.commit();
                info!(post_id = %doc.id, "post created");
                Ok(Post::from(doc))
            }
            Err(err) => {
                upload.discard().await;
                Err(err)
            }
        }
    }

    /// Update the post, replacing its image when a file is supplied.
    pub async fn update_post(&self, update: UpdatePost) -> Result<Post, ApiError> {
        let post_id = require_id("post_id", &update.post_id)?.to_string();
        validate_caption(&update.caption)?;
        validate_location(&update.location)?;

        let (upload, image_url, image_id) = match update.file.as_ref() {
            Some(file) => {
                let (guard, image) = self.files.upload_image(file).await?;
                (Some(guard), image.url, image.id)
            }
            None => (None, update.image_url.clone(), update.image_id.clone()),
        };

        let patch = PostPatch {
            caption: update.caption,
            image_url,
            image_id,
            location: update.location,
            tags: parse_tags(&update.tags),
        };
        let written = documents::update::<_, PostDocument>(
            self.backend.as_ref(),
            UPDATE_POST,
            Collection::Posts,
            &post_id,
            &patch,
        )
        .await;

        let doc = match written {
            Ok(doc) => doc,
            Err(err) => {
                if let Some(guard) = upload {
                    guard.discard().await;
                }
                return Err(err);
            }
        };

        if let Some(guard) = upload {
            guard.commit();
            if !update.image_id.trim().is_empty() {
                self.files.delete_replaced(&update.image_id).await;
            }
        }
        Ok(Post::from(doc))
    }

    /// Delete the post document, then its image.
    pub async fn delete_post(&self, post_id: &str, image_id: &str) -> Result<(), ApiError> {
        let post_id = require_id("post_id", post_id)?;
        let image_id = require_id("image_id", image_id)?;

        documents::delete(self.backend.as_ref(), DELETE_POST, Collection::Posts, post_id).await?;
        self.files.delete_replaced(image_id).await;
        info!(post_id, "post deleted");
        Ok(())
    }

    /// Store exactly `likes` as the post's like list.
    pub async fn like_post(&self, post_id: &str, likes: Vec<String>) -> Result<Post, ApiError> {
        let post_id = require_id("post_id", post_id)?;
        let doc: PostDocument = documents::update(
            self.backend.as_ref(),
            LIKE_POST,
            Collection::Posts,
            post_id,
            &LikesPatch { likes },
        )
        .await?;
        Ok(Post::from(doc))
    }

    pub async fn save_post(&self, user_id: &str, post_id: &str) -> Result<SavedPost, ApiError> {
        let user_id = require_id("user_id", user_id)?;
        let post_id = require_id("post_id", post_id)?;
        let doc: SaveDocument = documents::create(
            self.backend.as_ref(),
            SAVE_POST,
            Collection::Saves,
            &unique_id(),
            &SaveWrite {
                user: user_id.to_string(),
                post: post_id.to_string(),
            },
        )
        .await?;
        Ok(SavedPost::from(doc))
    }

    pub async fn delete_saved_post(&self, saved_record_id: &str) -> Result<(), ApiError> {
        let id = require_id("saved_record_id", saved_record_id)?;
        documents::delete(self.backend.as_ref(), DELETE_SAVE, Collection::Saves, id).await
    }

    /// Save record linking `user_id` to `post_id`, if any.
    pub async fn find_saved_record(
        &self,
        user_id: &str,
        post_id: &str,
    ) -> Result<Option<SavedPost>, ApiError> {
        let user_id = require_id("user_id", user_id)?;
        let post_id = require_id("post_id", post_id)?;
        let (_, docs) = documents::list::<SaveDocument>(
            self.backend.as_ref(),
            LIST_SAVES,
            Collection::Saves,
            &[
                Query::equal(attributes::USER, user_id),
                Query::equal(attributes::POST, post_id),
                Query::limit(1),
            ],
        )
        .await?;
        Ok(docs.into_iter().next().map(SavedPost::from))
    }

    pub async fn get_post_by_id(&self, post_id: &str) -> Result<Post, ApiError> {
        let post_id = require_id("post_id", post_id)?;
        let doc: PostDocument =
            documents::get(self.backend.as_ref(), GET_POST, Collection::Posts, post_id).await?;
        Ok(Post::from(doc))
    }

    /// Newest posts, bounded by the configured recent limit.
    pub async fn get_recent_posts(&self) -> Result<Vec<Post>, ApiError> {
        self.list_posts(&[
            Query::order_desc(attributes::CREATED_AT),
            Query::limit(self.recent_limit),
        ])
        .await
    }

    /// Full-text search on captions.
    pub async fn search_posts(&self, term: &str) -> Result<Vec<Post>, ApiError> {
        let term = require_id("search_term", term)?;
        self.list_posts(&[Query::search(attributes::CAPTION, term)])
            .await
    }

    pub async fn get_user_posts(&self, user_id: &str) -> Result<Vec<Post>, ApiError> {
        let user_id = require_id("user_id", user_id)?;
        self.list_posts(&[
            Query::equal(attributes::CREATOR, user_id),
            Query::order_desc(attributes::CREATED_AT),
        ])
        .await
    }

    /// Posts the user saved, newest save first. Posts deleted since are
    /// skipped.
    pub async fn get_saved_posts(&self, user_id: &str) -> Result<Vec<Post>, ApiError> {
        let user_id = require_id("user_id", user_id)?;
        let saves: Vec<SaveDocument> = documents::list_all(
            self.backend.as_ref(),
            LIST_SAVES,
            Collection::Saves,
            &[Query::equal(attributes::USER, user_id)],
        )
        .await?;

        let lookups = saves.iter().map(|save| async move {
            match self.get_post_by_id(save.post.id()).await {
                Ok(post) => Ok(Some(post)),
                Err(err) if err.is_not_found() => {
                    debug!(save_id = %save.id, "saved post no longer exists");
                    Ok(None)
                }
                Err(err) => Err(err),
            }
        });
        let posts = try_join_all(lookups).await?;
        Ok(posts.into_iter().flatten().collect())
    }

    /// Posts whose like list contains the user.
    pub async fn get_liked_posts(&self, user_id: &str) -> Result<Vec<Post>, ApiError> {
        let user_id = require_id("user_id", user_id)?;
        let docs: Vec<PostDocument> = documents::list_all(
            self.backend.as_ref(),
            LIST_POSTS,
            Collection::Posts,
            &[Query::contains(attributes::LIKES, user_id)],
        )
        .await?;
        Ok(docs.into_iter().map(Post::from).collect())
    }

    async fn list_posts(&self, queries: &[Query]) -> Result<Vec<Post>, ApiError> {
        let (_, docs) = documents::list::<PostDocument>(
            self.backend.as_ref(),
            LIST_POSTS,
            Collection::Posts,
            queries,
        )
        .await?;
        Ok(docs.into_iter().map(Post::from).collect())
    }
}
