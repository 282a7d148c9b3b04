//! File storage helpers and the scoped handle that owns a fresh upload.

use std::sync::Arc;

use tracing::{debug, warn};
use url::Url;

use crate::domain::entities::{FileUpload, ImageRef};
use crate::domain::error::require_id;
use crate::infra::remote::{Backend, PreviewOptions, unique_id};

use super::error::ApiError;

#[derive(Clone)]
pub struct FileService {
    backend: Arc<dyn Backend>,
}

impl FileService {
    pub fn new(backend: Arc<dyn Backend>) -> Self {
        Self { backend }
    }

    /// Upload a file. The returned guard deletes it again unless committed.
    pub async fn upload_file(&self, upload: &FileUpload) -> Result<UploadGuard, ApiError> {
        let id = unique_id();
        let info = self
            .backend
            .create_file(&id, upload)
            .await
            .map_err(|err| ApiError::remote("create_file", "file", err))?;
        debug!(file_id = %info.id, size = info.size_original, "file uploaded");
        Ok(UploadGuard::new(self.backend.clone(), info.id))
    }

    pub fn get_file_preview(&self, file_id: &str) -> Result<Url, ApiError> {
        let file_id = require_id("file_id", file_id)?;
        self.backend
            .file_preview_url(file_id, &PreviewOptions::default())
            .map_err(|err| ApiError::remote("file_preview", "file", err))
    }

    pub async fn delete_file(&self, file_id: &str) -> Result<(), ApiError> {
        let file_id = require_id("file_id", file_id)?;
        self.backend
            .delete_file(file_id)
            .await
            .map_err(|err| ApiError::remote("delete_file", "file", err))
    }

    /// Upload and resolve the preview url; a failed preview removes the file.
    pub(crate) async fn upload_image(
        &self,
        upload: &FileUpload,
    ) -> Result<(UploadGuard, ImageRef), ApiError> {
        let guard = self.upload_file(upload).await?;
        match self.get_file_preview(guard.file_id()) {
            Ok(url) => {
                let image = ImageRef {
                    id: guard.file_id().to_string(),
                    url: url.to_string(),
                };
                Ok((guard, image))
            }
            Err(err) => {
                guard.discard().await;
                Err(err)
            }
        }
    }

    /// Delete a replaced file; failures are logged, not returned.
    pub(crate) async fn delete_replaced(&self, file_id: &str) {
        if let Err(err) = self.delete_file(file_id).await {
            warn!(file_id, error = %err, "failed to delete replaced file");
        }
    }
}

/// Owns an uploaded file until the record referencing it is persisted.
///
/// `commit` disarms the guard. `discard` deletes the file. Dropping an armed
/// guard schedules the delete on the current runtime.
#[must_use = "an uncommitted upload is deleted when dropped"]
pub struct UploadGuard {
    backend: Arc<dyn Backend>,
    file_id: String,
    armed: bool,
}

impl UploadGuard {
    fn new(backend: Arc<dyn Backend>, file_id: String) -> Self {
        Self {
            backend,
            file_id,
            armed: true,
        }
    }

    pub fn file_id(&self) -> &str {
        &self.file_id
    }

    /// Keep the file; returns its id.
    pub fn commit(mut self) -> String {
        self.armed = false;
        std::mem::take(&mut self.file_id)
    }

    /// Delete the file now. Failures are logged and do not mask the caller's
    /// original error.
    pub async fn discard(mut self) {
        self.armed = false;
        if let Err(err) = self.backend.delete_file(&self.file_id).await {
            warn!(
                file_id = %self.file_id,
                error = %err,
                "failed to delete orphaned upload"
            );
        } else {
            debug!(file_id = %self.file_id, "orphaned upload deleted");
        }
    }
}

impl Drop for UploadGuard {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let file_id = std::mem::take(&mut self.file_id);
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                warn!(file_id = %file_id, "upload dropped without commit; deleting");
                let backend = self.backend.clone();
                handle.spawn(async move {
                    if let Err(err) = backend.delete_file(&file_id).await {
                        warn!(file_id = %file_id, error = %err, "failed to delete dropped upload");
                    }
                });
            }
            Err(_) => {
                warn!(file_id = %file_id, "upload dropped outside a runtime; file is orphaned");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infra::remote::MemoryBackend;

    fn service() -> (Arc<MemoryBackend>, FileService) {
        let backend = Arc::new(MemoryBackend::new());
        let files = FileService::new(backend.clone());
        (backend, files)
    }

    fn png() -> FileUpload {
        FileUpload::new("photo.png", vec![1_u8, 2, 3])
    }

    #[tokio::test]
    async fn committed_upload_is_kept() -> Result<(), ApiError> {
        let (backend, files) = service();
        let guard = files.upload_file(&png()).await?;
        let id = guard.commit();
        assert!(backend.file_exists(&id));
        Ok(())
    }

    #[tokio::test]
    async fn discard_deletes_exactly_once() -> Result<(), ApiError> {
        let (backend, files) = service();
        let guard = files.upload_file(&png()).await?;
        let id = guard.file_id().to_string();
        guard.discard().await;

        tokio::task::yield_now().await;
        assert!(!backend.file_exists(&id));
        assert_eq!(backend.count_calls("delete_file"), 1);
        Ok(())
    }

    #[tokio::test]
    async fn dropped_guard_deletes_in_background() -> Result<(), ApiError> {
        let (backend, files) = service();
        let id = {
            let guard = files.upload_file(&png()).await?;
            guard.file_id().to_string()
        };

        for _ in 0..10 {
            if !backend.file_exists(&id) {
                break;
            }
            tokio::task::yield_now().await;
        }
        assert!(!backend.file_exists(&id));
        Ok(())
    }

    #[tokio::test]
    async fn failed_preview_discards_upload() {
        let (backend, files) = service();
        backend.fail_next_preview();

        let err = files.upload_image(&png()).await.err().expect("preview fails");
        assert!(matches!(err, ApiError::Unavailable(_)));
        assert_eq!(backend.file_count(), 0);
        assert_eq!(backend.count_calls("delete_file"), 1);
    }

    #[test]
    fn preview_requires_file_id() {
        let (_, files) = service();
        assert_eq!(
            files.get_file_preview(" ").err(),
            Some(ApiError::Precondition("file_id"))
        );
    }
}
