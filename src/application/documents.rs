//! Typed document reads and writes shared by the services.

use pulse_api_types::{DocumentList, attributes};
use serde::{Serialize, de::DeserializeOwned};
use serde_json::Value;

use crate::infra::remote::{Backend, Collection, Query, decode, decode_list, encode};

use super::error::ApiError;

/// Batch size used when walking a whole collection slice with cursors.
const LIST_ALL_BATCH: u32 = 100;

/// Operation name plus the entity it touches, for error classification.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Op {
    pub name: &'static str,
    pub entity: &'static str,
}

impl Op {
    pub const fn new(name: &'static str, entity: &'static str) -> Self {
        Self { name, entity }
    }

    fn fail(self, err: crate::infra::remote::RemoteError) -> ApiError {
        ApiError::remote(self.name, self.entity, err)
    }
}

pub(crate) async fn get<T: DeserializeOwned>(
    backend: &dyn Backend,
    op: Op,
    collection: Collection,
    id: &str,
) -> Result<T, ApiError> {
    let value = backend
        .get_document(collection, id)
        .await
        .map_err(|err| op.fail(err))?;
    decode(value).map_err(|err| op.fail(err))
}

pub(crate) async fn list<T: DeserializeOwned>(
    backend: &dyn Backend,
    op: Op,
    collection: Collection,
    queries: &[Query],
) -> Result<(u64, Vec<T>), ApiError> {
    let list: DocumentList<Value> = backend
        .list_documents(collection, queries)
        .await
        .map_err(|err| op.fail(err))?;
    let total = list.total;
    let documents = decode_list(list).map_err(|err| op.fail(err))?;
    Ok((total, documents))
}

/// Every document matching `filters`, fetched in cursor-linked batches.
pub(crate) async fn list_all<T: DeserializeOwned>(
    backend: &dyn Backend,
    op: Op,
    collection: Collection,
    filters: &[Query],
) -> Result<Vec<T>, ApiError> {
    let mut out = Vec::new();
    let mut cursor: Option<String> = None;

    loop {
        let mut queries = filters.to_vec();
        queries.push(Query::order_desc(attributes::CREATED_AT));
        queries.push(Query::limit(LIST_ALL_BATCH));
        if let Some(id) = cursor.as_deref() {
            queries.push(Query::cursor_after(id));
        }

        let batch = backend
            .list_documents(collection, &queries)
            .await
            .map_err(|err| op.fail(err))?;
        let fetched = batch.documents.len();
        cursor = batch
            .documents
            .last()
            .and_then(|doc| doc.get(attributes::ID))
            .and_then(Value::as_str)
            .map(str::to_string);

        out.extend(decode_list::<T>(batch).map_err(|err| op.fail(err))?);

        if fetched < LIST_ALL_BATCH as usize || cursor.is_none() {
            return Ok(out);
        }
    }
}

pub(crate) async fn create<W: Serialize, T: DeserializeOwned>(
    backend: &dyn Backend,
    op: Op,
    collection: Collection,
    id: &str,
    data: &W,
) -> Result<T, ApiError> {
    let data = encode(data).map_err(|err| op.fail(err))?;
    let value = backend
        .create_document(collection, id, data)
        .await
        .map_err(|err| op.fail(err))?;
    decode(value).map_err(|err| op.fail(err))
}

pub(crate) async fn update<W: Serialize, T: DeserializeOwned>(
    backend: &dyn Backend,
    op: Op,
    collection: Collection,
    id: &str,
    data: &W,
) -> Result<T, ApiError> {
    let data = encode(data).map_err(|err| op.fail(err))?;
    let value = backend
        .update_document(collection, id, data)
        .await
        .map_err(|err| op.fail(err))?;
    decode(value).map_err(|err| op.fail(err))
}

pub(crate) async fn delete(
    backend: &dyn Backend,
    op: Op,
    collection: Collection,
    id: &str,
) -> Result<(), ApiError> {
    backend
        .delete_document(collection, id)
        .await
        .map_err(|err| op.fail(err))
}

#[cfg(test)]
mod tests {
    use pulse_api_types::FollowDocument;
    use serde_json::json;

    use super::*;
    use crate::infra::remote::{Documents, MemoryBackend};

    #[tokio::test]
    async fn list_all_walks_every_batch() -> Result<(), ApiError> {
        let backend = MemoryBackend::new();
        for n in 0..(LIST_ALL_BATCH + 5) {
            backend
                .create_document(
                    Collection::Follows,
                    &format!("f{n}"),
                    json!({ "follower": "u1", "followed": format!("u{}", n + 2) }),
                )
                .await
                .map_err(|err| ApiError::remote("seed", "follow", err))?;
        }

        let all: Vec<FollowDocument> = list_all(
            &backend,
            Op::new("list_follows", "follow"),
            Collection::Follows,
            &[Query::equal("follower", "u1")],
        )
        .await?;

        assert_eq!(all.len(), (LIST_ALL_BATCH + 5) as usize);
        assert_eq!(backend.count_calls("list_documents"), 2);
        Ok(())
    }

    #[tokio::test]
    async fn missing_document_maps_to_not_found() {
        let backend = MemoryBackend::new();
        let err = get::<FollowDocument>(
            &backend,
            Op::new("get_follow", "follow"),
            Collection::Follows,
            "nope",
        )
        .await
        .expect_err("missing");
        assert_eq!(err, ApiError::NotFound { entity: "follow" });
    }
}
