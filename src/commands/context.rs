use std::sync::Arc;

use pulse::application::Services;
use pulse::cache::{CacheConfig, Queries, QueryClient};
use pulse::config::Settings;
use pulse::domain::entities::User;
use pulse::infra::remote::{Backend, HttpBackend};
use pulse::infra::session_file::SessionFile;
use tracing::{debug, info};

use super::CliError;

/// Everything a handler needs: the cached query facade and the session file.
pub struct Context {
    pub queries: Queries,
    pub session_file: SessionFile,
}

impl Context {
    pub async fn connect(settings: &Settings) -> Result<Self, CliError> {
        let backend: Arc<dyn Backend> = Arc::new(HttpBackend::new(&settings.backend)?);
        Self::with_backend(backend, settings).await
    }

    /// Wire the services over `backend` and resume any stored session.
    pub async fn with_backend(
        backend: Arc<dyn Backend>,
        settings: &Settings,
    ) -> Result<Self, CliError> {
        let services = Services::new(backend, &settings.feed);
        let client = Arc::new(QueryClient::new(CacheConfig::from(&settings.cache)));
        let queries = Queries::new(services, client, &settings.feed);
        let session_file = SessionFile::new(settings.session.file.clone());

        if let Some(secret) = session_file.load().await? {
            match queries.services().session.restore(secret).await? {
                Some(user) => debug!(user_id = %user.id, "session restored"),
                None => {
                    info!(path = %session_file.path().display(), "stored session expired");
                    session_file.clear().await?;
                }
            }
        }

        Ok(Self {
            queries,
            session_file,
        })
    }

    pub fn require_user(&self) -> Result<User, CliError> {
        self.queries
            .services()
            .session
            .current_user()
            .ok_or(CliError::NotSignedIn)
    }
}
