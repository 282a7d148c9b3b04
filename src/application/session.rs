//! Identity of the signed-in user, threaded through every operation.

use std::sync::{Arc, RwLock};

use pulse_api_types::{UserDocument, attributes};
use tracing::{debug, info, warn};

use crate::domain::entities::{Session, User};
use crate::infra::remote::{Backend, Collection, Query, decode_list};
use crate::util::lock::{rw_read, rw_write};

use super::error::ApiError;

const SOURCE: &str = "application::session";

#[derive(Debug, Default)]
struct SessionState {
    secret: Option<String>,
    user: Option<User>,
}

/// Holds the active session secret and the resolved user.
///
/// Constructed once at startup; services read the identity from here instead
/// of from ambient state.
pub struct SessionContext {
    backend: Arc<dyn Backend>,
    state: RwLock<SessionState>,
}

impl SessionContext {
    pub fn new(backend: Arc<dyn Backend>) -> Self {
        Self {
            backend,
            state: RwLock::new(SessionState::default()),
        }
    }

    /// Resume a session from a stored secret and resolve its user.
    pub async fn restore(&self, secret: String) -> Result<Option<User>, ApiError> {
        self.attach_secret(Some(secret));
        self.init().await
    }

    /// Resolve the user behind the current session.
    ///
    /// An expired or missing session is not an error: local state is cleared
    /// and `None` is returned.
    pub async fn init(&self) -> Result<Option<User>, ApiError> {
        match fetch_current_user(self.backend.as_ref()).await {
            Ok(user) => {
                debug!(user_id = %user.id, "session resolved");
                rw_write(&self.state, SOURCE, "init").user = Some(user.clone());
                Ok(Some(user))
            }
            Err(ApiError::Unauthorized) => {
                self.clear();
                Ok(None)
            }
            Err(err) => Err(err),
        }
    }

    pub fn current_user(&self) -> Option<User> {
        rw_read(&self.state, SOURCE, "current_user").user.clone()
    }

    pub fn require_user(&self) -> Result<User, ApiError> {
        self.current_user().ok_or(ApiError::Unauthorized)
    }

    pub fn is_signed_in(&self) -> bool {
        self.current_user().is_some()
    }

    pub fn secret(&self) -> Option<String> {
        rw_read(&self.state, SOURCE, "secret").secret.clone()
    }

    /// Delete the remote session. Local state is cleared even when the
    /// remote call fails.
    pub async fn sign_out(&self) -> Result<(), ApiError> {
        let result = self
            .backend
            .delete_session("current")
            .await
            .map_err(|err| ApiError::remote("delete_session", "session", err));
        self.clear();
        info!("signed out");
        result
    }

    pub(crate) fn begin(&self, session: &Session) {
        self.attach_secret(Some(session.secret.clone()));
    }

    /// Drop a session that could not be resolved, deleting it remotely by id.
    pub(crate) async fn abandon(&self, session: &Session) {
        if let Err(err) = self.backend.delete_session(&session.id).await {
            warn!(session_id = %session.id, error = %err, "failed to delete abandoned session");
        }
        self.clear();
    }

    /// Replace the cached identity after the user's own profile changed.
    pub(crate) fn refresh_user(&self, user: &User) {
        let mut state = rw_write(&self.state, SOURCE, "refresh_user");
        if state.user.as_ref().is_some_and(|current| current.id == user.id) {
            state.user = Some(user.clone());
        }
    }

    fn attach_secret(&self, secret: Option<String>) {
        self.backend.set_session_secret(secret.clone());
        rw_write(&self.state, SOURCE, "attach_secret").secret = secret;
    }

    fn clear(&self) {
        self.backend.set_session_secret(None);
        *rw_write(&self.state, SOURCE, "clear") = SessionState::default();
    }
}

/// Account of the active session, then the user document bound to it.
pub(crate) async fn fetch_current_user(backend: &dyn Backend) -> Result<User, ApiError> {
    let account = backend
        .get_account()
        .await
        .map_err(|err| ApiError::remote("get_account", "account", err))?;

    let list = backend
        .list_documents(
            Collection::Users,
            &[
                Query::equal(attributes::ACCOUNT_ID, account.id.as_str()),
                Query::limit(1),
            ],
        )
        .await
        .map_err(|err| ApiError::remote("list_users", "user", err))?;

    decode_list::<UserDocument>(list)
        .map_err(|err| ApiError::remote("list_users", "user", err))?
        .into_iter()
        .next()
        .map(User::from)
        .ok_or(ApiError::NotFound { entity: "user" })
}
