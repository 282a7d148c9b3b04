use std::sync::Arc;

use pulse_api_types::{UserDocument, UserPatch, UserWrite, attributes};
use tracing::{info, warn};

use crate::domain::entities::{FileUpload, Session, User};
use crate::domain::error::{DomainError, require_id};
use crate::infra::remote::{Backend, Collection, Query, unique_id};

use super::documents::{self, Op};
use super::error::ApiError;
use super::session::{SessionContext, fetch_current_user};
use super::uploads::FileService;

const GET_USER: Op = Op::new("get_user", "user");
const LIST_USERS: Op = Op::new("list_users", "user");
const CREATE_USER: Op = Op::new("create_user", "user");
const UPDATE_USER: Op = Op::new("update_user", "user");

#[derive(Debug, Clone)]
pub struct NewUser {
    pub name: String,
    pub username: String,
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone)]
pub struct UpdateUser {
    pub user_id: String,
    pub name: String,
    pub bio: String,
    /// Current avatar; replaced when `file` is set.
    pub image_id: Option<String>,
    pub image_url: Option<String>,
    pub file: Option<FileUpload>,
}

#[derive(Clone)]
pub struct AccountService {
    backend: Arc<dyn Backend>,
    session: Arc<SessionContext>,
    files: FileService,
}

impl AccountService {
    pub fn new(
        backend: Arc<dyn Backend>,
        session: Arc<SessionContext>,
        files: FileService,
    ) -> Self {
        Self {
            backend,
            session,
            files,
        }
    }

    /// Create the account, then the user document with a generated avatar.
    pub async fn create_user_account(&self, new_user: NewUser) -> Result<User, ApiError> {
        let NewUser {
            name,
            username,
            email,
            password,
        } = new_user;
        let name = require_id("name", &name)?;
        let username = require_id("username", &username)?;
        let email = require_id("email", &email)?;
        if password.is_empty() {
            return Err(DomainError::missing("password").into());
        }

        let account = self
            .backend
            .create_account(&unique_id(), email, &password, name)
            .await
            .map_err(|err| ApiError::remote("create_account", "account", err))?;

        let avatar = self
            .backend
            .avatar_initials_url(&account.name)
            .map_err(|err| ApiError::remote("avatar_initials", "avatar", err))?;

        let write = UserWrite {
            account_id: account.id,
            name: account.name,
            username: username.to_string(),
            email: account.email,
            image_url: Some(avatar.to_string()),
        };
        let doc: UserDocument = documents::create(
            self.backend.as_ref(),
            CREATE_USER,
            Collection::Users,
            &unique_id(),
            &write,
        )
        .await?;

        info!(user_id = %doc.id, "user account created");
        Ok(User::from(doc))
    }

    /// Create an email session and resolve the signed-in user.
    pub async fn sign_in_account(&self, email: &str, password: &str) -> Result<Session, ApiError> {
        let email = require_id("email", email)?;
        if password.is_empty() {
            return Err(DomainError::missing("password").into());
        }

        let session = Session::from(
            self.backend
                .create_email_session(email, password)
                .await
                .map_err(|err| ApiError::remote("create_email_session", "session", err))?,
        );
        if session.secret.is_empty() {
            warn!(session_id = %session.id, "session created without a secret");
            self.session.abandon(&session).await;
            return Err(ApiError::Unauthorized);
        }

        self.session.begin(&session);
        match self.session.init().await {
            Ok(Some(user)) => {
                info!(account_id = %session.account_id, user_id = %user.id, "signed in");
                Ok(session)
            }
            Ok(None) => {
                self.session.abandon(&session).await;
                Err(ApiError::Unauthorized)
            }
            Err(err) => {
                self.session.abandon(&session).await;
                Err(err)
            }
        }
    }

    pub async fn sign_out_account(&self) -> Result<(), ApiError> {
        self.session.sign_out().await
    }

    pub async fn get_current_user(&self) -> Result<User, ApiError> {
        fetch_current_user(self.backend.as_ref()).await
    }

    /// Newest users first.
    pub async fn get_users(&self, limit: u32) -> Result<Vec<User>, ApiError> {
        let (_, docs) = documents::list::<UserDocument>(
            self.backend.as_ref(),
            LIST_USERS,
            Collection::Users,
            &[
                Query::order_desc(attributes::CREATED_AT),
                Query::limit(limit),
            ],
        )
        .await?;
        Ok(docs.into_iter().map(User::from).collect())
    }

    pub async fn get_user_by_id(&self, user_id: &str) -> Result<User, ApiError> {
        let user_id = require_id("user_id", user_id)?;
        let doc: UserDocument =
            documents::get(self.backend.as_ref(), GET_USER, Collection::Users, user_id).await?;
        Ok(User::from(doc))
    }

    /// Update the profile, replacing the avatar when a file is supplied.
    ///
    /// A new avatar is removed again if the document write fails; the old one
    /// is removed only after the write succeeded.
    pub async fn update_user(&self, update: UpdateUser) -> Result<User, ApiError> {
        let user_id = require_id("user_id", &update.user_id)?.to_string();

        let (upload, image_url, image_id) = match update.file.as_ref() {
            Some(file) => {
                let (guard, image) = self.files.upload_image(file).await?;
                (Some(guard), Some(image.url), Some(image.id))
            }
            None => (None, update.image_url.clone(), update.image_id.clone()),
        };

        let patch = UserPatch {
            name: update.name,
            bio: update.bio,
            image_url,
            image_id,
        };
        let written = documents::update::<_, UserDocument>(
            self.backend.as_ref(),
            UPDATE_USER,
            Collection::Users,
            &user_id,
            &patch,
        )
        .await;

        let doc = match written {
            Ok(doc) => doc,
            Err(err) => {
                if let Some(guard) = upload {
                    guard.discard().await;
                }
                return Err(err);
            }
        };

        if let Some(guard) = upload {
            guard.commit();
            if let Some(old) = update.image_id.as_deref().filter(|id| !id.is_empty()) {
                self.files.delete_replaced(old).await;
            }
        }

        let user = User::from(doc);
        self.session.refresh_user(&user);
        Ok(user)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infra::remote::MemoryBackend;

    struct Fixture {
        backend: Arc<MemoryBackend>,
        session: Arc<SessionContext>,
        accounts: AccountService,
    }

    fn fixture() -> Fixture {
        let backend = Arc::new(MemoryBackend::new());
        let session = Arc::new(SessionContext::new(backend.clone()));
        let files = FileService::new(backend.clone());
        let accounts = AccountService::new(backend.clone(), session.clone(), files);
        Fixture {
            backend,
            session,
            accounts,
        }
    }

    fn ada() -> NewUser {
        NewUser {
            name: "Ada Lovelace".into(),
            username: "ada".into(),
            email: "ada@example.com".into(),
            password: "pw-123456".into(),
        }
    }

    #[tokio::test]
    async fn sign_up_then_sign_in() -> Result<(), ApiError> {
        let fx = fixture();
        let user = fx.accounts.create_user_account(ada()).await?;
        assert_eq!(user.username, "ada");
        assert!(
            user.image_url
                .as_deref()
                .is_some_and(|url| url.contains("avatars/initials"))
        );

        fx.accounts
            .sign_in_account("ada@example.com", "pw-123456")
            .await?;
        assert_eq!(fx.session.require_user()?.id, user.id);
        assert_eq!(fx.accounts.get_current_user().await?.id, user.id);

        fx.accounts.sign_out_account().await?;
        assert!(!fx.session.is_signed_in());
        Ok(())
    }

    #[tokio::test]
    async fn wrong_password_is_unauthorized() -> Result<(), ApiError> {
        let fx = fixture();
        fx.accounts.create_user_account(ada()).await?;
        let err = fx
            .accounts
            .sign_in_account("ada@example.com", "nope")
            .await
            .expect_err("bad password");
        assert_eq!(err, ApiError::Unauthorized);
        Ok(())
    }

    #[tokio::test]
    async fn session_without_secret_is_rejected() -> Result<(), ApiError> {
        let fx = fixture();
        fx.accounts.create_user_account(ada()).await?;
        fx.backend.blank_next_session_secret();

        let err = fx
            .accounts
            .sign_in_account("ada@example.com", "pw-123456")
            .await
            .expect_err("blank secret");
        assert_eq!(err, ApiError::Unauthorized);
        assert!(!fx.session.is_signed_in());
        assert_eq!(fx.session.secret(), None);
        assert_eq!(fx.backend.count_calls("delete_session"), 1);
        assert_eq!(fx.backend.count_calls("get_account"), 0);
        Ok(())
    }

    #[tokio::test]
    async fn account_without_user_document_is_signed_back_out() -> Result<(), ApiError> {
        use crate::infra::remote::Accounts;

        let fx = fixture();
        fx.backend
            .create_account("a1", "orphan@example.com", "pw-123456", "Orphan")
            .await
            .expect("account");

        let err = fx
            .accounts
            .sign_in_account("orphan@example.com", "pw-123456")
            .await
            .expect_err("no user document");
        assert_eq!(err, ApiError::NotFound { entity: "user" });
        assert!(!fx.session.is_signed_in());
        assert_eq!(fx.session.secret(), None);
        assert_eq!(fx.backend.count_calls("delete_session"), 1);
        Ok(())
    }

    #[tokio::test]
    async fn duplicate_email_is_a_validation_error() -> Result<(), ApiError> {
        let fx = fixture();
        fx.accounts.create_user_account(ada()).await?;
        let err = fx
            .accounts
            .create_user_account(ada())
            .await
            .expect_err("duplicate");
        assert!(matches!(err, ApiError::Validation(_)));
        Ok(())
    }

    #[tokio::test]
    async fn empty_user_id_issues_no_remote_call() {
        let fx = fixture();
        let err = fx.accounts.get_user_by_id("").await.expect_err("precondition");
        assert_eq!(err, ApiError::Precondition("user_id"));
        assert!(fx.backend.calls().is_empty());
    }

    #[tokio::test]
    async fn avatar_replacement_deletes_old_file_after_write() -> Result<(), ApiError> {
        let fx = fixture();
        let user = fx.accounts.create_user_account(ada()).await?;

        let first = fx
            .accounts
            .update_user(UpdateUser {
                user_id: user.id.clone(),
                name: user.name.clone(),
                bio: "hello".into(),
                image_id: None,
                image_url: user.image_url.clone(),
                file: Some(FileUpload::new("a.png", vec![1_u8])),
            })
            .await?;
        let old_id = first.image_id.clone().expect("uploaded avatar");
        assert!(fx.backend.file_exists(&old_id));

        let second = fx
            .accounts
            .update_user(UpdateUser {
                user_id: user.id.clone(),
                name: user.name.clone(),
                bio: "hello".into(),
                image_id: first.image_id.clone(),
                image_url: first.image_url.clone(),
                file: Some(FileUpload::new("b.png", vec![2_u8])),
            })
            .await?;
        let new_id = second.image_id.clone().expect("replacement avatar");

        assert!(fx.backend.file_exists(&new_id));
        assert!(!fx.backend.file_exists(&old_id));
        assert_eq!(second.bio, "hello");
        Ok(())
    }

    #[tokio::test]
    async fn failed_write_keeps_old_avatar_and_drops_new() -> Result<(), ApiError> {
        let fx = fixture();
        let user = fx.accounts.create_user_account(ada()).await?;
        let first = fx
            .accounts
            .update_user(UpdateUser {
                user_id: user.id.clone(),
                name: user.name.clone(),
                bio: String::new(),
                image_id: None,
                image_url: None,
                file: Some(FileUpload::new("a.png", vec![1_u8])),
            })
            .await?;
        let old_id = first.image_id.clone().expect("uploaded avatar");

        fx.backend.fail_next_document_write();
        let err = fx
            .accounts
            .update_user(UpdateUser {
                user_id: user.id.clone(),
                name: user.name.clone(),
                bio: String::new(),
                image_id: first.image_id.clone(),
                image_url: first.image_url.clone(),
                file: Some(FileUpload::new("b.png", vec![2_u8])),
            })
            .await
            .expect_err("write fails");

        assert!(matches!(err, ApiError::Unavailable(_)));
        assert!(fx.backend.file_exists(&old_id));
        assert_eq!(fx.backend.file_count(), 1);
        Ok(())
    }
}
