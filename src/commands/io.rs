use std::path::Path;

use pulse::domain::entities::FileUpload;

use super::CliError;

/// Read an image from disk; the content type is guessed from its name.
pub async fn read_upload(path: &Path) -> Result<FileUpload, CliError> {
    let bytes = tokio::fs::read(path)
        .await
        .map_err(|source| CliError::InputFile {
            path: path.display().to_string(),
            source,
        })?;
    let file_name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "upload".to_string());
    Ok(FileUpload::new(file_name, bytes))
}

pub async fn read_optional_upload(path: Option<&Path>) -> Result<Option<FileUpload>, CliError> {
    match path {
        Some(path) => read_upload(path).await.map(Some),
        None => Ok(None),
    }
}
