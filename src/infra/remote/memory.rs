//! In-process backend with the same query semantics as the hosted one.
//!
//! Used by the service and cache tests; failure injection lets them drive the
//! compensating paths (orphaned uploads, unreachable backend) deterministically.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use pulse_api_types::{AccountInfo, DocumentList, FileInfo, SessionInfo, attributes};
use serde_json::{Map, Value};
use time::format_description::well_known::Rfc3339;
use time::macros::datetime;
use time::{Duration, OffsetDateTime};
use url::Url;

use crate::domain::entities::FileUpload;
use crate::util::lock::mutex_lock;

use super::{
    Accounts, Collection, Documents, PreviewOptions, Query, RemoteError, Storage, unique_id,
};

const SOURCE: &str = "infra::remote::memory";
const DEFAULT_LIST_LIMIT: usize = 25;
const BUCKET_ID: &str = "memory";

#[derive(Debug, Clone)]
struct StoredAccount {
    info: AccountInfo,
    password: String,
}

#[derive(Debug, Clone)]
struct StoredSession {
    id: String,
    account_id: String,
}

#[derive(Debug)]
struct State {
    accounts: HashMap<String, StoredAccount>,
    sessions: HashMap<String, StoredSession>,
    current_secret: Option<String>,
    collections: HashMap<Collection, Vec<Map<String, Value>>>,
    files: HashMap<String, FileInfo>,
    clock: OffsetDateTime,
    calls: Vec<String>,
    fail_next_document_write: bool,
    fail_next_preview: bool,
    blank_next_secret: bool,
    empty_next_list: bool,
    offline: bool,
}

impl Default for State {
    fn default() -> Self {
        Self {
            accounts: HashMap::new(),
            sessions: HashMap::new(),
            current_secret: None,
            collections: HashMap::new(),
            files: HashMap::new(),
            clock: datetime!(2024-01-01 00:00 UTC),
            calls: Vec::new(),
            fail_next_document_write: false,
            fail_next_preview: false,
            blank_next_secret: false,
            empty_next_list: false,
            offline: false,
        }
    }
}

impl State {
    /// Strictly increasing timestamps keep ordering deterministic.
    fn tick(&mut self) -> Result<String, RemoteError> {
        self.clock += Duration::seconds(1);
        self.clock
            .format(&Rfc3339)
            .map_err(|err| RemoteError::InvalidRequest(err.to_string()))
    }

    fn record(&mut self, call: String) -> Result<(), RemoteError> {
        self.calls.push(call);
        if self.offline {
            return Err(RemoteError::Transport("memory backend offline".to_string()));
        }
        Ok(())
    }

    fn take_write_failure(&mut self) -> Result<(), RemoteError> {
        if std::mem::take(&mut self.fail_next_document_write) {
            return Err(RemoteError::status(
                500,
                "general_server_error",
                "injected document write failure",
            ));
        }
        Ok(())
    }

    fn documents(&mut self, collection: Collection) -> &mut Vec<Map<String, Value>> {
        self.collections.entry(collection).or_default()
    }

    fn find(&self, collection: Collection, id: &str) -> Option<&Map<String, Value>> {
        self.collections
            .get(&collection)?
            .iter()
            .find(|doc| doc_id(doc) == Some(id))
    }

    fn current_account(&self) -> Result<&StoredAccount, RemoteError> {
        let unauthorized = || {
            RemoteError::status(
                401,
                "general_unauthorized_scope",
                "User (role: guests) missing scope (account)",
            )
        };
        let secret = self.current_secret.as_ref().ok_or_else(unauthorized)?;
        let session = self.sessions.get(secret).ok_or_else(unauthorized)?;
        self.accounts.get(&session.account_id).ok_or_else(unauthorized)
    }

    /// Post creators come back expanded, as the hosted backend does.
    fn render(&self, collection: Collection, doc: &Map<String, Value>) -> Value {
        let mut rendered = doc.clone();
        if collection == Collection::Posts {
            let creator = doc.get(attributes::CREATOR).and_then(relation_id);
            if let Some(user) = creator.and_then(|id| self.find(Collection::Users, id)) {
                rendered.insert(attributes::CREATOR.to_string(), Value::Object(user.clone()));
            }
        }
        Value::Object(rendered)
    }
}

fn not_found(what: &str) -> RemoteError {
    RemoteError::status(
        404,
        format!("{what}_not_found"),
        format!("The requested {what} could not be found."),
    )
}

fn doc_id(doc: &Map<String, Value>) -> Option<&str> {
    doc.get(attributes::ID).and_then(Value::as_str)
}

fn relation_id(value: &Value) -> Option<&str> {
    match value {
        Value::String(id) => Some(id.as_str()),
        Value::Object(map) => doc_id(map),
        _ => None,
    }
}

fn scalar_eq(stored: &Value, expected: &Value) -> bool {
    match (relation_id(stored), expected.as_str()) {
        (Some(id), Some(want)) => id == want,
        _ => stored == expected,
    }
}

fn matches(doc: &Map<String, Value>, query: &Query) -> bool {
    match query {
        Query::Equal { attribute, values } => doc
            .get(attribute)
            .is_some_and(|stored| values.iter().any(|value| scalar_eq(stored, value))),
        Query::Contains { attribute, value } => match doc.get(attribute) {
            Some(Value::Array(items)) => items.iter().any(|item| scalar_eq(item, value)),
            Some(Value::String(text)) => value.as_str().is_some_and(|needle| text.contains(needle)),
            _ => false,
        },
        Query::Search { attribute, term } => doc
            .get(attribute)
            .and_then(Value::as_str)
            .is_some_and(|text| text.to_lowercase().contains(&term.to_lowercase())),
        _ => true,
    }
}

fn compare_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a, b) {
        (Some(Value::String(a)), Some(Value::String(b))) => {
            match (
                OffsetDateTime::parse(a, &Rfc3339),
                OffsetDateTime::parse(b, &Rfc3339),
            ) {
                (Ok(a), Ok(b)) => a.cmp(&b),
                _ => a.cmp(b),
            }
        }
        (Some(Value::Number(a)), Some(Value::Number(b))) => a
            .as_f64()
            .partial_cmp(&b.as_f64())
            .unwrap_or(Ordering::Equal),
        (Some(_), None) => Ordering::Greater,
        (None, Some(_)) => Ordering::Less,
        _ => Ordering::Equal,
    }
}

fn run_queries(
    docs: &[Map<String, Value>],
    queries: &[Query],
) -> Result<(u64, Vec<Map<String, Value>>), RemoteError> {
    let mut selected: Vec<Map<String, Value>> = docs
        .iter()
        .filter(|doc| queries.iter().all(|query| matches(doc, query)))
        .cloned()
        .collect();

    for query in queries.iter().rev() {
        match query {
            Query::OrderAsc(attribute) => {
                selected.sort_by(|a, b| compare_values(a.get(attribute), b.get(attribute)))
            }
            Query::OrderDesc(attribute) => {
                selected.sort_by(|a, b| compare_values(b.get(attribute), a.get(attribute)))
            }
            _ => {}
        }
    }

    let total = selected.len() as u64;

    let mut start = 0;
    for query in queries {
        match query {
            Query::CursorAfter(id) => {
                let position = selected
                    .iter()
                    .position(|doc| doc_id(doc) == Some(id.as_str()))
                    .ok_or_else(|| {
                        RemoteError::status(
                            400,
                            "document_cursor_invalid",
                            format!("Cursor document `{id}` not found"),
                        )
                    })?;
                start = position + 1;
            }
            Query::Offset(offset) => start += *offset as usize,
            _ => {}
        }
    }
    let limit = queries
        .iter()
        .find_map(|query| match query {
            Query::Limit(limit) => Some(*limit as usize),
            _ => None,
        })
        .unwrap_or(DEFAULT_LIST_LIMIT);

    let page = selected.into_iter().skip(start).take(limit).collect();
    Ok((total, page))
}

/// Backend kept entirely in memory.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    state: Mutex<State>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// The next document create/update fails with a server error.
    pub fn fail_next_document_write(&self) {
        self.lock("fail_next_document_write").fail_next_document_write = true;
    }

    /// The next preview url request fails.
    pub fn fail_next_preview(&self) {
        self.lock("fail_next_preview").fail_next_preview = true;
    }

    /// The next session is created without returning its secret.
    pub fn blank_next_session_secret(&self) {
        self.lock("blank_next_session_secret").blank_next_secret = true;
    }

    /// The next list comes back empty, like a read that lost a race with a write.
    pub fn empty_next_list(&self) {
        self.lock("empty_next_list").empty_next_list = true;
    }

    /// While offline every remote call fails as a transport error.
    pub fn set_offline(&self, offline: bool) {
        self.lock("set_offline").offline = offline;
    }

    /// Remote calls in the order they were issued, as `operation:target`.
    pub fn calls(&self) -> Vec<String> {
        self.lock("calls").calls.clone()
    }

    pub fn count_calls(&self, prefix: &str) -> usize {
        self.lock("count_calls")
            .calls
            .iter()
            .filter(|call| call.starts_with(prefix))
            .count()
    }

    pub fn clear_calls(&self) {
        self.lock("clear_calls").calls.clear();
    }

    pub fn file_exists(&self, id: &str) -> bool {
        self.lock("file_exists").files.contains_key(id)
    }

    pub fn file_count(&self) -> usize {
        self.lock("file_count").files.len()
    }

    pub fn document_count(&self, collection: Collection) -> usize {
        self.lock("document_count")
            .collections
            .get(&collection)
            .map_or(0, Vec::len)
    }

    fn lock(&self, op: &'static str) -> std::sync::MutexGuard<'_, State> {
        mutex_lock(&self.state, SOURCE, op)
    }
}

#[async_trait]
impl Accounts for MemoryBackend {
    async fn create_account(
        &self,
        id: &str,
        email: &str,
        password: &str,
        name: &str,
    ) -> Result<AccountInfo, RemoteError> {
        let mut state = self.lock("create_account");
        state.record(format!("create_account:{email}"))?;
        if state.accounts.values().any(|acc| acc.info.email == email) {
            return Err(RemoteError::status(
                409,
                "user_already_exists",
                "A user with the same email already exists.",
            ));
        }
        let info = AccountInfo {
            id: id.to_string(),
            name: name.to_string(),
            email: email.to_string(),
        };
        state.accounts.insert(
            id.to_string(),
            StoredAccount {
                info: info.clone(),
                password: password.to_string(),
            },
        );
        Ok(info)
    }

    async fn get_account(&self) -> Result<AccountInfo, RemoteError> {
        let mut state = self.lock("get_account");
        state.record("get_account".to_string())?;
        Ok(state.current_account()?.info.clone())
    }

    async fn create_email_session(
        &self,
        email: &str,
        password: &str,
    ) -> Result<SessionInfo, RemoteError> {
        let mut state = self.lock("create_email_session");
        state.record(format!("create_email_session:{email}"))?;
        let account_id = state
            .accounts
            .values()
            .find(|acc| acc.info.email == email && acc.password == password)
            .map(|acc| acc.info.id.clone())
            .ok_or_else(|| {
                RemoteError::status(
                    401,
                    "user_invalid_credentials",
                    "Invalid credentials. Please check the email and password.",
                )
            })?;
        let session = StoredSession {
            id: unique_id(),
            account_id: account_id.clone(),
        };
        let secret = unique_id();
        let blank = std::mem::take(&mut state.blank_next_secret);
        let info = SessionInfo {
            id: session.id.clone(),
            user_id: account_id,
            secret: if blank { String::new() } else { secret.clone() },
        };
        state.sessions.insert(secret, session);
        Ok(info)
    }

    async fn delete_session(&self, session_id: &str) -> Result<(), RemoteError> {
        let mut state = self.lock("delete_session");
        state.record(format!("delete_session:{session_id}"))?;
        let secret = if session_id == "current" {
            state.current_secret.clone()
        } else {
            state
                .sessions
                .iter()
                .find(|(_, session)| session.id == session_id)
                .map(|(secret, _)| secret.clone())
        };
        let secret = secret.ok_or_else(|| not_found("session"))?;
        state
            .sessions
            .remove(&secret)
            .ok_or_else(|| not_found("session"))?;
        if state.current_secret.as_deref() == Some(secret.as_str()) {
            state.current_secret = None;
        }
        Ok(())
    }

    fn set_session_secret(&self, secret: Option<String>) {
        self.lock("set_session_secret").current_secret = secret;
    }

    fn avatar_initials_url(&self, name: &str) -> Result<Url, RemoteError> {
        let mut url = Url::parse("memory://pulse/avatars/initials")
            .map_err(|err| RemoteError::InvalidRequest(err.to_string()))?;
        url.query_pairs_mut().append_pair("name", name);
        Ok(url)
    }
}

#[async_trait]
impl Documents for MemoryBackend {
    async fn create_document(
        &self,
        collection: Collection,
        id: &str,
        data: Value,
    ) -> Result<Value, RemoteError> {
        let mut state = self.lock("create_document");
        state.record(format!("create_document:{collection}"))?;
        state.take_write_failure()?;
        let Value::Object(mut doc) = data else {
            return Err(RemoteError::status(
                400,
                "document_invalid_structure",
                "document data must be an object",
            ));
        };
        if state.find(collection, id).is_some() {
            return Err(RemoteError::status(
                409,
                "document_already_exists",
                "Document with the requested ID already exists.",
            ));
        }
        let now = state.tick()?;
        doc.insert(attributes::ID.to_string(), Value::String(id.to_string()));
        doc.insert(attributes::CREATED_AT.to_string(), Value::String(now.clone()));
        doc.insert(attributes::UPDATED_AT.to_string(), Value::String(now));
        let rendered = state.render(collection, &doc);
        state.documents(collection).push(doc);
        Ok(rendered)
    }

    async fn get_document(&self, collection: Collection, id: &str) -> Result<Value, RemoteError> {
        let mut state = self.lock("get_document");
        state.record(format!("get_document:{collection}:{id}"))?;
        let doc = state
            .find(collection, id)
            .ok_or_else(|| not_found("document"))?;
        Ok(state.render(collection, doc))
    }

    async fn list_documents(
        &self,
        collection: Collection,
        queries: &[Query],
    ) -> Result<DocumentList<Value>, RemoteError> {
        let mut state = self.lock("list_documents");
        state.record(format!("list_documents:{collection}"))?;
        if std::mem::take(&mut state.empty_next_list) {
            return Ok(DocumentList {
                total: 0,
                documents: Vec::new(),
            });
        }
        let docs = state
            .collections
            .get(&collection)
            .map(Vec::as_slice)
            .unwrap_or_default();
        let (total, page) = run_queries(docs, queries)?;
        let documents = page
            .iter()
            .map(|doc| state.render(collection, doc))
            .collect();
        Ok(DocumentList { total, documents })
    }

    async fn update_document(
        &self,
        collection: Collection,
        id: &str,
        data: Value,
    ) -> Result<Value, RemoteError> {
        let mut state = self.lock("update_document");
        state.record(format!("update_document:{collection}:{id}"))?;
        state.take_write_failure()?;
        let Value::Object(patch) = data else {
            return Err(RemoteError::status(
                400,
                "document_invalid_structure",
                "document data must be an object",
            ));
        };
        let now = state.tick()?;
        let doc = state
            .documents(collection)
            .iter_mut()
            .find(|doc| doc_id(doc) == Some(id))
            .ok_or_else(|| not_found("document"))?;
        for (key, value) in patch {
            doc.insert(key, value);
        }
        doc.insert(attributes::UPDATED_AT.to_string(), Value::String(now));
        let updated = doc.clone();
        Ok(state.render(collection, &updated))
    }

    async fn delete_document(&self, collection: Collection, id: &str) -> Result<(), RemoteError> {
        let mut state = self.lock("delete_document");
        state.record(format!("delete_document:{collection}:{id}"))?;
        let docs = state.documents(collection);
        let position = docs
            .iter()
            .position(|doc| doc_id(doc) == Some(id))
            .ok_or_else(|| not_found("document"))?;
        docs.remove(position);
        Ok(())
    }
}

#[async_trait]
impl Storage for MemoryBackend {
    async fn create_file(&self, id: &str, upload: &FileUpload) -> Result<FileInfo, RemoteError> {
        let mut state = self.lock("create_file");
        state.record(format!("create_file:{id}"))?;
        let info = FileInfo {
            id: id.to_string(),
            bucket_id: BUCKET_ID.to_string(),
            name: upload.file_name.clone(),
            mime_type: upload.content_type.clone(),
            size_original: upload.bytes.len() as u64,
        };
        state.files.insert(id.to_string(), info.clone());
        Ok(info)
    }

    async fn delete_file(&self, id: &str) -> Result<(), RemoteError> {
        let mut state = self.lock("delete_file");
        state.record(format!("delete_file:{id}"))?;
        state
            .files
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| not_found("storage_file"))
    }

    fn file_preview_url(&self, id: &str, options: &PreviewOptions) -> Result<Url, RemoteError> {
        let mut state = self.lock("file_preview_url");
        state.record(format!("file_preview_url:{id}"))?;
        if std::mem::take(&mut state.fail_next_preview) {
            return Err(RemoteError::status(
                500,
                "storage_preview_failed",
                "injected preview failure",
            ));
        }
        let mut url = Url::parse(&format!("memory://pulse/storage/files/{id}/preview"))
            .map_err(|err| RemoteError::InvalidRequest(err.to_string()))?;
        url.query_pairs_mut()
            .append_pair("width", &options.width.to_string())
            .append_pair("height", &options.height.to_string())
            .append_pair("gravity", options.gravity)
            .append_pair("quality", &options.quality.to_string());
        Ok(url)
    }
}
