//! Wire document types for the Pulse remote backend.
//!
//! The backend stores four logical collections (users, posts, saves and
//! follows). Documents carry the backend's system attributes (`$id`,
//! `$createdAt`, `$updatedAt`) next to their own attributes. Relationship
//! attributes come back either as a bare document id or as an expanded
//! document, so they are modelled with [`Relation`].

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use time::OffsetDateTime;

/// Attribute names used in queries against the collections.
pub mod attributes {
    pub const ID: &str = "$id";
    pub const CREATED_AT: &str = "$createdAt";
    pub const UPDATED_AT: &str = "$updatedAt";
    pub const ACCOUNT_ID: &str = "accountId";
    pub const CREATOR: &str = "creator";
    pub const CAPTION: &str = "caption";
    pub const LIKES: &str = "likes";
    pub const USER: &str = "user";
    pub const POST: &str = "post";
    pub const FOLLOWER: &str = "follower";
    pub const FOLLOWED: &str = "followed";
}

/// Page of documents returned by a list call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentList<T> {
    pub total: u64,
    pub documents: Vec<T>,
}

/// Reference to another document, either collapsed to its id or expanded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Relation {
    Id(String),
    Document(DocumentRef),
}

impl Relation {
    pub fn id(&self) -> &str {
        match self {
            Relation::Id(id) => id.as_str(),
            Relation::Document(doc) => doc.id.as_str(),
        }
    }
}

impl From<&str> for Relation {
    fn from(id: &str) -> Self {
        Relation::Id(id.to_string())
    }
}

/// Expanded related document. Only the id is interpreted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentRef {
    #[serde(rename = "$id")]
    pub id: String,
    #[serde(flatten)]
    pub attributes: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserDocument {
    #[serde(rename = "$id")]
    pub id: String,
    #[serde(rename = "$createdAt", with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(rename = "$updatedAt", with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
    pub account_id: String,
    pub name: String,
    pub username: String,
    pub email: String,
    #[serde(default)]
    pub bio: Option<String>,
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default)]
    pub image_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostDocument {
    #[serde(rename = "$id")]
    pub id: String,
    #[serde(rename = "$createdAt", with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(rename = "$updatedAt", with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
    pub creator: Relation,
    #[serde(default)]
    pub caption: String,
    pub image_url: String,
    pub image_id: String,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub likes: Vec<Relation>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SaveDocument {
    #[serde(rename = "$id")]
    pub id: String,
    #[serde(rename = "$createdAt", with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    pub user: Relation,
    pub post: Relation,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FollowDocument {
    #[serde(rename = "$id")]
    pub id: String,
    #[serde(rename = "$createdAt", with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    pub follower: Relation,
    pub followed: Relation,
}

/// Identity attached to the active session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountInfo {
    #[serde(rename = "$id")]
    pub id: String,
    pub name: String,
    pub email: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionInfo {
    #[serde(rename = "$id")]
    pub id: String,
    pub user_id: String,
    /// Session secret; only populated on creation.
    #[serde(default)]
    pub secret: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileInfo {
    #[serde(rename = "$id")]
    pub id: String,
    pub bucket_id: String,
    pub name: String,
    pub mime_type: String,
    pub size_original: u64,
}

/// Error envelope returned with non-success statuses.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub message: String,
    #[serde(default)]
    pub code: u16,
    #[serde(default, rename = "type")]
    pub kind: String,
}

// ============================================================================
// Write payloads
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserWrite {
    pub account_id: String,
    pub name: String,
    pub username: String,
    pub email: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserPatch {
    pub name: String,
    pub bio: String,
    pub image_url: Option<String>,
    pub image_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostWrite {
    pub creator: String,
    pub caption: String,
    pub image_url: String,
    pub image_id: String,
    pub location: String,
    pub tags: Vec<String>,
    pub likes: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostPatch {
    pub caption: String,
    pub image_url: String,
    pub image_id: String,
    pub location: String,
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LikesPatch {
    pub likes: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SaveWrite {
    pub user: String,
    pub post: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FollowWrite {
    pub follower: String,
    pub followed: String,
}
