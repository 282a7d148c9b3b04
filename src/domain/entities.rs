//! Domain entities normalized from remote documents.

use bytes::Bytes;
use pulse_api_types::{
    FollowDocument, PostDocument, Relation, SaveDocument, SessionInfo, UserDocument,
};
use serde::Serialize;
use time::OffsetDateTime;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct User {
    pub id: String,
    pub account_id: String,
    pub name: String,
    pub username: String,
    pub email: String,
    pub bio: String,
    pub image_url: Option<String>,
    /// Storage id of an uploaded avatar; absent for generated avatars.
    pub image_id: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl From<UserDocument> for User {
    fn from(doc: UserDocument) -> Self {
        Self {
            id: doc.id,
            account_id: doc.account_id,
            name: doc.name,
            username: doc.username,
            email: doc.email,
            bio: doc.bio.unwrap_or_default(),
            image_url: doc.image_url.filter(|url| !url.is_empty()),
            image_id: doc.image_id.filter(|id| !id.is_empty()),
            created_at: doc.created_at,
        }
    }
}

/// Stored image: storage file id plus its public preview url.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImageRef {
    pub id: String,
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Post {
    pub id: String,
    pub creator_id: String,
    pub caption: String,
    pub image: ImageRef,
    pub location: String,
    pub tags: Vec<String>,
    /// Ids of the users who liked the post.
    pub likes: Vec<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl From<PostDocument> for Post {
    fn from(doc: PostDocument) -> Self {
        Self {
            id: doc.id,
            creator_id: doc.creator.id().to_string(),
            caption: doc.caption,
            image: ImageRef {
                id: doc.image_id,
                url: doc.image_url,
            },
            location: doc.location.unwrap_or_default(),
            tags: doc.tags,
            likes: doc.likes.iter().map(|like| like.id().to_string()).collect(),
            created_at: doc.created_at,
            updated_at: doc.updated_at,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SavedPost {
    pub id: String,
    pub user_id: String,
    pub post_id: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl From<SaveDocument> for SavedPost {
    fn from(doc: SaveDocument) -> Self {
        Self {
            id: doc.id,
            user_id: relation_id(&doc.user),
            post_id: relation_id(&doc.post),
            created_at: doc.created_at,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FollowRecord {
    pub id: String,
    pub follower_id: String,
    pub followed_id: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl From<FollowDocument> for FollowRecord {
    fn from(doc: FollowDocument) -> Self {
        Self {
            id: doc.id,
            follower_id: relation_id(&doc.follower),
            followed_id: relation_id(&doc.followed),
            created_at: doc.created_at,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub id: String,
    pub account_id: String,
    pub secret: String,
}

impl From<SessionInfo> for Session {
    fn from(info: SessionInfo) -> Self {
        Self {
            id: info.id,
            account_id: info.user_id,
            secret: info.secret,
        }
    }
}

/// File contents to be uploaded to storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileUpload {
    pub file_name: String,
    pub content_type: String,
    pub bytes: Bytes,
}

impl FileUpload {
    /// Build an upload, guessing the content type from the file name.
    pub fn new(file_name: impl Into<String>, bytes: impl Into<Bytes>) -> Self {
        let file_name = file_name.into();
        let content_type = mime_guess::from_path(&file_name)
            .first_or_octet_stream()
            .essence_str()
            .to_string();
        Self {
            file_name,
            content_type,
            bytes: bytes.into(),
        }
    }
}

fn relation_id(relation: &Relation) -> String {
    relation.id().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[test]
    fn post_from_document_flattens_relations() {
        let doc = PostDocument {
            id: "p1".into(),
            created_at: datetime!(2024-03-01 10:00 UTC),
            updated_at: datetime!(2024-03-01 10:00 UTC),
            creator: Relation::from("u1"),
            caption: "sunrise".into(),
            image_url: "https://cdn/p1".into(),
            image_id: "f1".into(),
            location: None,
            tags: vec!["nature".into()],
            likes: vec![Relation::from("u2")],
        };

        let post = Post::from(doc);
        assert_eq!(post.creator_id, "u1");
        assert_eq!(post.image.id, "f1");
        assert_eq!(post.location, "");
        assert_eq!(post.likes, vec!["u2".to_string()]);
    }

    #[test]
    fn user_from_document_drops_empty_image_fields() {
        let doc = UserDocument {
            id: "u1".into(),
            created_at: datetime!(2024-03-01 10:00 UTC),
            updated_at: datetime!(2024-03-01 10:00 UTC),
            account_id: "a1".into(),
            name: "Ada".into(),
            username: "ada".into(),
            email: "ada@example.com".into(),
            bio: None,
            image_url: Some("https://avatars/ada".into()),
            image_id: Some(String::new()),
        };

        let user = User::from(doc);
        assert_eq!(user.image_url.as_deref(), Some("https://avatars/ada"));
        assert!(user.image_id.is_none());
        assert_eq!(user.bio, "");
    }

    #[test]
    fn file_upload_guesses_content_type() {
        let upload = FileUpload::new("beach.png", vec![1_u8, 2, 3]);
        assert_eq!(upload.content_type, "image/png");

        let unknown = FileUpload::new("blob", vec![0_u8]);
        assert_eq!(unknown.content_type, "application/octet-stream");
    }
}
