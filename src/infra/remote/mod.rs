//! Contract of the hosted backend: accounts, documents and file storage.
//!
//! Application services only talk to the backend through these traits, so
//! [`HttpBackend`] and [`MemoryBackend`] are interchangeable.

mod http;
mod memory;
mod query;

use std::fmt;

use async_trait::async_trait;
use pulse_api_types::{AccountInfo, DocumentList, ErrorBody, FileInfo, SessionInfo};
use serde::{Serialize, de::DeserializeOwned};
use serde_json::Value;
use thiserror::Error;
use url::Url;
use uuid::Uuid;

use crate::domain::entities::FileUpload;

pub use http::HttpBackend;
pub use memory::MemoryBackend;
pub use query::Query;

/// Logical collections the client reads and writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Collection {
    Users,
    Posts,
    Saves,
    Follows,
}

impl Collection {
    pub fn as_str(self) -> &'static str {
        match self {
            Collection::Users => "users",
            Collection::Posts => "posts",
            Collection::Saves => "saves",
            Collection::Follows => "follows",
        }
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RemoteError {
    #[error("backend unreachable: {0}")]
    Transport(String),
    #[error("backend responded with status {status} ({kind}): {message}")]
    Status {
        status: u16,
        kind: String,
        message: String,
    },
    #[error("failed to decode backend response: {0}")]
    Decode(String),
    #[error("invalid backend request: {0}")]
    InvalidRequest(String),
}

impl RemoteError {
    pub fn status(status: u16, kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Status {
            status,
            kind: kind.into(),
            message: message.into(),
        }
    }

    pub(crate) fn from_error_body(status: u16, body: ErrorBody) -> Self {
        Self::status(status, body.kind, body.message)
    }

    pub fn status_code(&self) -> Option<u16> {
        match self {
            RemoteError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.status_code() == Some(404)
    }
}

impl From<reqwest::Error> for RemoteError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            RemoteError::Decode(err.to_string())
        } else {
            RemoteError::Transport(err.to_string())
        }
    }
}

/// Preview rendition parameters for stored images.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreviewOptions {
    pub width: u32,
    pub height: u32,
    pub gravity: &'static str,
    pub quality: u8,
}

impl Default for PreviewOptions {
    fn default() -> Self {
        Self {
            width: 2000,
            height: 2000,
            gravity: "top",
            quality: 100,
        }
    }
}

#[async_trait]
pub trait Accounts: Send + Sync {
    async fn create_account(
        &self,
        id: &str,
        email: &str,
        password: &str,
        name: &str,
    ) -> Result<AccountInfo, RemoteError>;

    /// Account bound to the active session.
    async fn get_account(&self) -> Result<AccountInfo, RemoteError>;

    async fn create_email_session(
        &self,
        email: &str,
        password: &str,
    ) -> Result<SessionInfo, RemoteError>;

    /// Delete a session by id; `"current"` targets the active one.
    async fn delete_session(&self, session_id: &str) -> Result<(), RemoteError>;

    /// Attach (or detach) the session secret used by subsequent calls.
    fn set_session_secret(&self, secret: Option<String>);

    fn avatar_initials_url(&self, name: &str) -> Result<Url, RemoteError>;
}

#[async_trait]
pub trait Documents: Send + Sync {
    async fn create_document(
        &self,
        collection: Collection,
        id: &str,
        data: Value,
    ) -> Result<Value, RemoteError>;

    async fn get_document(&self, collection: Collection, id: &str) -> Result<Value, RemoteError>;

    async fn list_documents(
        &self,
        collection: Collection,
        queries: &[Query],
    ) -> Result<DocumentList<Value>, RemoteError>;

    async fn update_document(
        &self,
        collection: Collection,
        id: &str,
        data: Value,
    ) -> Result<Value, RemoteError>;

    async fn delete_document(&self, collection: Collection, id: &str) -> Result<(), RemoteError>;
}

#[async_trait]
pub trait Storage: Send + Sync {
    async fn create_file(&self, id: &str, upload: &FileUpload) -> Result<FileInfo, RemoteError>;

    async fn delete_file(&self, id: &str) -> Result<(), RemoteError>;

    fn file_preview_url(&self, id: &str, options: &PreviewOptions) -> Result<Url, RemoteError>;
}

/// Everything the application layer needs from the hosted backend.
pub trait Backend: Accounts + Documents + Storage {}

impl<T: Accounts + Documents + Storage> Backend for T {}

/// Fresh identifier for documents, accounts and files.
pub fn unique_id() -> String {
    Uuid::new_v4().simple().to_string()
}

pub fn encode<T: Serialize>(value: &T) -> Result<Value, RemoteError> {
    serde_json::to_value(value).map_err(|err| RemoteError::InvalidRequest(err.to_string()))
}

pub fn decode<T: DeserializeOwned>(value: Value) -> Result<T, RemoteError> {
    serde_json::from_value(value).map_err(|err| RemoteError::Decode(err.to_string()))
}

pub fn decode_list<T: DeserializeOwned>(list: DocumentList<Value>) -> Result<Vec<T>, RemoteError> {
    list.documents.into_iter().map(decode).collect()
}
