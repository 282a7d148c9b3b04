//! REST adapter for the hosted backend.

use std::sync::RwLock;

use async_trait::async_trait;
use bytes::Bytes;
use pulse_api_types::{AccountInfo, DocumentList, ErrorBody, FileInfo, SessionInfo};
use reqwest::{Client, Method, RequestBuilder, Response, multipart};
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use tracing::debug;
use url::Url;

use crate::config::{BackendSettings, CollectionIds};
use crate::domain::entities::FileUpload;
use crate::util::lock::{rw_read, rw_write};

use super::{Accounts, Collection, Documents, PreviewOptions, Query, RemoteError, Storage};

const SOURCE: &str = "infra::remote::http";
const PROJECT_HEADER: &str = "X-Appwrite-Project";
const SESSION_HEADER: &str = "X-Appwrite-Session";

/// Backend reached over HTTPS with a per-project header and an optional
/// session secret.
pub struct HttpBackend {
    client: Client,
    base: Url,
    project_id: String,
    database_id: String,
    bucket_id: String,
    collections: CollectionIds,
    session: RwLock<Option<String>>,
}

impl HttpBackend {
    pub fn new(settings: &BackendSettings) -> Result<Self, RemoteError> {
        let endpoint = settings.endpoint.as_ref().ok_or_else(|| {
            RemoteError::InvalidRequest("backend endpoint is not configured".to_string())
        })?;
        let client = Client::builder()
            .user_agent(Self::user_agent())
            .timeout(settings.request_timeout)
            .build()?;

        Ok(Self {
            client,
            base: with_trailing_slash(endpoint),
            project_id: settings.project_id.clone(),
            database_id: settings.database_id.clone(),
            bucket_id: settings.bucket_id.clone(),
            collections: settings.collections.clone(),
            session: RwLock::new(None),
        })
    }

    pub fn user_agent() -> &'static str {
        concat!("pulse/", env!("CARGO_PKG_VERSION"))
    }

    fn url(&self, path: &str) -> Result<Url, RemoteError> {
        self.base
            .join(path)
            .map_err(|err| RemoteError::InvalidRequest(format!("invalid path `{path}`: {err}")))
    }

    fn documents_path(&self, collection: Collection) -> String {
        format!(
            "databases/{}/collections/{}/documents",
            self.database_id,
            self.collections.id(collection)
        )
    }

    fn files_path(&self) -> String {
        format!("storage/buckets/{}/files", self.bucket_id)
    }

    fn request(&self, method: Method, url: Url) -> RequestBuilder {
        debug!(target = SOURCE, method = %method, path = url.path(), "backend request");
        let mut builder = self
            .client
            .request(method, url)
            .header(PROJECT_HEADER, &self.project_id);
        if let Some(secret) = rw_read(&self.session, SOURCE, "request").as_ref() {
            builder = builder.header(SESSION_HEADER, secret);
        }
        builder
    }

    async fn send<T: DeserializeOwned>(&self, builder: RequestBuilder) -> Result<T, RemoteError> {
        let bytes = Self::checked_body(builder.send().await?).await?;
        serde_json::from_slice(&bytes).map_err(|err| RemoteError::Decode(err.to_string()))
    }

    async fn send_unit(&self, builder: RequestBuilder) -> Result<(), RemoteError> {
        Self::checked_body(builder.send().await?).await?;
        Ok(())
    }

    async fn checked_body(resp: Response) -> Result<Bytes, RemoteError> {
        let status = resp.status();
        let bytes = resp.bytes().await?;
        if status.is_success() {
            return Ok(bytes);
        }

        let error = match serde_json::from_slice::<ErrorBody>(&bytes) {
            Ok(body) => RemoteError::from_error_body(status.as_u16(), body),
            Err(_) => RemoteError::status(
                status.as_u16(),
                "unknown",
                String::from_utf8_lossy(&bytes).into_owned(),
            ),
        };
        Err(error)
    }
}

fn with_trailing_slash(url: &Url) -> Url {
    let mut url = url.clone();
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    url
}

#[async_trait]
impl Accounts for HttpBackend {
    async fn create_account(
        &self,
        id: &str,
        email: &str,
        password: &str,
        name: &str,
    ) -> Result<AccountInfo, RemoteError> {
        let url = self.url("account")?;
        let body = json!({ "userId": id, "email": email, "password": password, "name": name });
        self.send(self.request(Method::POST, url).json(&body)).await
    }

    async fn get_account(&self) -> Result<AccountInfo, RemoteError> {
        let url = self.url("account")?;
        self.send(self.request(Method::GET, url)).await
    }

    async fn create_email_session(
        &self,
        email: &str,
        password: &str,
    ) -> Result<SessionInfo, RemoteError> {
        let url = self.url("account/sessions/email")?;
        let body = json!({ "email": email, "password": password });
        self.send(self.request(Method::POST, url).json(&body)).await
    }

    async fn delete_session(&self, session_id: &str) -> Result<(), RemoteError> {
        let url = self.url(&format!("account/sessions/{session_id}"))?;
        self.send_unit(self.request(Method::DELETE, url)).await
    }

    fn set_session_secret(&self, secret: Option<String>) {
        *rw_write(&self.session, SOURCE, "set_session_secret") = secret;
    }

    fn avatar_initials_url(&self, name: &str) -> Result<Url, RemoteError> {
        let mut url = self.url("avatars/initials")?;
        url.query_pairs_mut()
            .append_pair("name", name)
            .append_pair("project", &self.project_id);
        Ok(url)
    }
}

#[async_trait]
impl Documents for HttpBackend {
    async fn create_document(
        &self,
        collection: Collection,
        id: &str,
        data: Value,
    ) -> Result<Value, RemoteError> {
        let url = self.url(&self.documents_path(collection))?;
        let body = json!({ "documentId": id, "data": data });
        self.send(self.request(Method::POST, url).json(&body)).await
    }

    async fn get_document(&self, collection: Collection, id: &str) -> Result<Value, RemoteError> {
        let url = self.url(&format!("{}/{id}", self.documents_path(collection)))?;
        self.send(self.request(Method::GET, url)).await
    }

    async fn list_documents(
        &self,
        collection: Collection,
        queries: &[Query],
    ) -> Result<DocumentList<Value>, RemoteError> {
        let mut url = self.url(&self.documents_path(collection))?;
        if !queries.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for query in queries {
                pairs.append_pair("queries[]", &query.to_string());
            }
        }
        self.send(self.request(Method::GET, url)).await
    }

    async fn update_document(
        &self,
        collection: Collection,
        id: &str,
        data: Value,
    ) -> Result<Value, RemoteError> {
        let url = self.url(&format!("{}/{id}", self.documents_path(collection)))?;
        let body = json!({ "data": data });
        self.send(self.request(Method::PATCH, url).json(&body)).await
    }

    async fn delete_document(&self, collection: Collection, id: &str) -> Result<(), RemoteError> {
        let url = self.url(&format!("{}/{id}", self.documents_path(collection)))?;
        self.send_unit(self.request(Method::DELETE, url)).await
    }
}

#[async_trait]
impl Storage for HttpBackend {
    async fn create_file(&self, id: &str, upload: &FileUpload) -> Result<FileInfo, RemoteError> {
        let url = self.url(&self.files_path())?;
        let part = multipart::Part::bytes(upload.bytes.to_vec())
            .file_name(upload.file_name.clone())
            .mime_str(&upload.content_type)
            .map_err(|err| RemoteError::InvalidRequest(err.to_string()))?;
        let form = multipart::Form::new()
            .text("fileId", id.to_string())
            .part("file", part);
        self.send(self.request(Method::POST, url).multipart(form))
            .await
    }

    async fn delete_file(&self, id: &str) -> Result<(), RemoteError> {
        let url = self.url(&format!("{}/{id}", self.files_path()))?;
        self.send_unit(self.request(Method::DELETE, url)).await
    }

    fn file_preview_url(&self, id: &str, options: &PreviewOptions) -> Result<Url, RemoteError> {
        let mut url = self.url(&format!("{}/{id}/preview", self.files_path()))?;
        url.query_pairs_mut()
            .append_pair("width", &options.width.to_string())
            .append_pair("height", &options.height.to_string())
            .append_pair("gravity", options.gravity)
            .append_pair("quality", &options.quality.to_string())
            .append_pair("project", &self.project_id);
        Ok(url)
    }
}
