use super::{
    auth::CredentialsHasher, AuthToken, AuthTokenValue, UserAuthCredentials,
    UserAuthCredentialsStore, UserAuthTokenStore, UserStore, UsernamePasswordCredentials,
};
use anyhow::{bail, Context, Result};
use std::{sync::Arc, time::SystemTime};
use thiserror::Error;
use tracing::{debug, info, warn};

pub const MAX_USER_HANDLE_LENGTH: usize = 64;
pub const MIN_PASSWORD_LENGTH: usize = 4;

#[derive(Debug, Error)]
pub enum RegistrationError {
    #[error("{0}")]
    InvalidInput(String),

    #[error("User handle {0} already exists")]
    HandleTaken(String),

    #[error("Store error: {0}")]
    Store(#[from] anyhow::Error),
}

fn validate_user_handle(user_handle: &str) -> Result<(), RegistrationError> {
    if user_handle.is_empty() {
        return Err(RegistrationError::InvalidInput(
            "The user handle cannot be empty.".to_owned(),
        ));
    }
    if user_handle.chars().count() > MAX_USER_HANDLE_LENGTH
        || user_handle.chars().any(char::is_whitespace)
    {
        return Err(RegistrationError::InvalidInput(format!(
            "The user handle must be at most {} characters long and contain no spaces.",
            MAX_USER_HANDLE_LENGTH
        )));
    }
    Ok(())
}

pub struct UserManager {
    user_store: Arc<dyn UserStore>,
}

impl UserManager {
    pub fn new(user_store: Arc<dyn UserStore>) -> Self {
        Self { user_store }
    }

    pub fn add_user<T: AsRef<str>>(&self, user_handle: T) -> Result<usize, RegistrationError> {
        let user_handle = user_handle.as_ref();
        validate_user_handle(user_handle)?;

        if self.user_store.get_user_id(user_handle)?.is_some() {
            return Err(RegistrationError::HandleTaken(user_handle.to_owned()));
        }

        Ok(self.user_store.create_user(user_handle)?)
    }

    /// Creates a user together with its password credentials.
    pub fn register_user(
        &self,
        user_handle: &str,
        password: &str,
    ) -> Result<usize, RegistrationError> {
        validate_user_handle(user_handle)?;
        if password.chars().count() < MIN_PASSWORD_LENGTH {
            return Err(RegistrationError::InvalidInput(format!(
                "The password must be at least {} characters long.",
                MIN_PASSWORD_LENGTH
            )));
        }

        let user_id = self.add_user(user_handle)?;
        if let Err(err) = self.create_password_credentials(user_handle, password) {
            if let Err(rollback_err) = self.user_store.delete_user(user_id) {
                warn!(
                    "Failed to roll back user {} after a failed registration: {}",
                    user_handle, rollback_err
                );
            }
            return Err(RegistrationError::Store(err));
        }
        info!("Registered user {}", user_handle);
        Ok(user_id)
    }

    pub fn delete_user(&self, user_handle: &str) -> Result<()> {
        let user_id = self
            .user_store
            .get_user_id(user_handle)?
            .with_context(|| format!("User with handle {} not found.", user_handle))?;
        if !self.user_store.delete_user(user_id)? {
            bail!("User with handle {} not found.", user_handle);
        }
        info!("Deleted user {} ({})", user_handle, user_id);
        Ok(())
    }

    /// Returns the token if it exists, refreshing its last use timestamp.
    pub fn get_auth_token(&self, value: &AuthTokenValue) -> Result<Option<AuthToken>> {
        let token = self.user_store.get_user_auth_token(value)?;
        if token.is_some() {
            self.user_store
                .update_user_auth_token_last_used_timestamp(value)?;
        }
        Ok(token)
    }

    pub fn generate_auth_token(&self, credentials: &UserAuthCredentials) -> Result<AuthToken> {
        let token = AuthToken {
            user_id: credentials.user_id,
            value: AuthTokenValue::generate(),
            created: SystemTime::now(),
            last_used: None,
        };
        self.user_store.add_user_auth_token(token.clone())?;
        Ok(token)
    }

    /// Checks the password of a user. Returns false for unknown users and
    /// users without password credentials.
    pub fn check_password(&self, user_handle: &str, password: &str) -> Result<bool> {
        let credentials = match self.get_user_credentials(user_handle)? {
            Some(credentials) => credentials,
            None => return Ok(false),
        };
        let password_credentials = match credentials.username_password {
            Some(password_credentials) => password_credentials,
            None => return Ok(false),
        };
        let matches = password_credentials
            .hasher
            .verify(password, &password_credentials.hash)?;
        self.user_store
            .mark_password_tried(credentials.user_id, matches)?;
        Ok(matches)
    }

    /// Verifies the password and issues a new session token.
    /// Returns Ok(None) when the credentials do not match.
    pub fn login(&self, user_handle: &str, password: &str) -> Result<Option<AuthToken>> {
        if !self.check_password(user_handle, password)? {
            debug!("Rejected login for {}", user_handle);
            return Ok(None);
        }
        let credentials = self
            .get_user_credentials(user_handle)?
            .with_context(|| format!("User with handle {} vanished.", user_handle))?;
        let token = self.generate_auth_token(&credentials)?;
        info!("User {} logged in", user_handle);
        Ok(Some(token))
    }

    fn create_hashed_password(
        user_id: usize,
        password: &str,
    ) -> Result<UsernamePasswordCredentials> {
        let hasher = CredentialsHasher::Argon2;
        let salt = hasher.generate_b64_salt();
        let hash = hasher.hash(password.as_bytes(), &salt)?;
        Ok(UsernamePasswordCredentials {
            user_id,
            salt,
            hash,
            hasher,
            created: SystemTime::now(),
            last_tried: None,
            last_used: None,
        })
    }

    pub fn create_password_credentials(&self, user_handle: &str, password: &str) -> Result<()> {
        let mut credentials = self
            .user_store
            .get_user_auth_credentials(user_handle)?
            .with_context(|| format!("User with handle {} not found.", user_handle))?;
        if credentials.username_password.is_some() {
            bail!(
                "User with handle {} already has password credentials method. Maybe you want to modify it?",
                user_handle
            );
        }
        credentials.username_password =
            Some(Self::create_hashed_password(credentials.user_id, password)?);
        self.user_store.update_user_auth_credentials(credentials)
    }

    pub fn update_password_credentials(&self, user_handle: &str, password: &str) -> Result<()> {
        let mut credentials = self
            .user_store
            .get_user_auth_credentials(user_handle)?
            .with_context(|| format!("User with handle {} not found.", user_handle))?;
        if credentials.username_password.is_none() {
            bail!(
                "Cannot update password of user with handle {} since it never had one.",
                user_handle
            );
        }
        credentials.username_password =
            Some(Self::create_hashed_password(credentials.user_id, password)?);
        self.user_store.update_user_auth_credentials(credentials)
    }

    pub fn get_user_credentials(&self, user_handle: &str) -> Result<Option<UserAuthCredentials>> {
        self.user_store.get_user_auth_credentials(user_handle)
    }

    /// Deletes a token, only when it belongs to `user_id`.
    pub fn delete_auth_token(&self, user_id: usize, token_value: &AuthTokenValue) -> Result<()> {
        let token = self
            .user_store
            .get_user_auth_token(token_value)?
            .with_context(|| format!("Did not find auth token {}", token_value.0))?;
        if token.user_id != user_id {
            bail!(
                "Tried to delete auth token of user {}, but the authenticated user {} is not its owner.",
                token.user_id,
                user_id
            );
        }
        self.user_store.delete_user_auth_token(token_value)?;
        Ok(())
    }

    pub fn get_user_tokens(&self, user_handle: &str) -> Result<Vec<AuthToken>> {
        self.user_store.get_all_user_auth_tokens(user_handle)
    }

    pub fn get_user_handle(&self, user_id: usize) -> Result<Option<String>> {
        self.user_store.get_user_handle(user_id)
    }

    pub fn get_all_user_handles(&self) -> Result<Vec<String>> {
        self.user_store.get_all_user_handles()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{AuthorDirectory, AuthorId, AuthorRecord};
    use crate::user::SqliteUserStore;
    use tempfile::TempDir;

    /// Delegates to SQLite, failing credential writes and optionally deletes.
    struct FailingCredentialsStore {
        inner: SqliteUserStore,
        fail_delete: bool,
    }

    impl UserAuthCredentialsStore for FailingCredentialsStore {
        fn get_user_auth_credentials(
            &self,
            user_handle: &str,
        ) -> Result<Option<UserAuthCredentials>> {
            self.inner.get_user_auth_credentials(user_handle)
        }

        fn update_user_auth_credentials(&self, _credentials: UserAuthCredentials) -> Result<()> {
            bail!("disk full")
        }

        fn mark_password_tried(&self, user_id: usize, succeeded: bool) -> Result<()> {
            self.inner.mark_password_tried(user_id, succeeded)
        }
    }

    impl UserAuthTokenStore for FailingCredentialsStore {
        fn get_user_auth_token(&self, token: &AuthTokenValue) -> Result<Option<AuthToken>> {
            self.inner.get_user_auth_token(token)
        }

        fn delete_user_auth_token(&self, token: &AuthTokenValue) -> Result<Option<AuthToken>> {
            self.inner.delete_user_auth_token(token)
        }

        fn update_user_auth_token_last_used_timestamp(&self, token: &AuthTokenValue) -> Result<()> {
            self.inner.update_user_auth_token_last_used_timestamp(token)
        }

        fn add_user_auth_token(&self, token: AuthToken) -> Result<()> {
            self.inner.add_user_auth_token(token)
        }

        fn get_all_user_auth_tokens(&self, user_handle: &str) -> Result<Vec<AuthToken>> {
            self.inner.get_all_user_auth_tokens(user_handle)
        }
    }

    impl AuthorDirectory for FailingCredentialsStore {
        fn get_authors(&self, ids: &[AuthorId]) -> Result<Vec<AuthorRecord>> {
            self.inner.get_authors(ids)
        }

        fn get_author(&self, id: AuthorId) -> Result<Option<AuthorRecord>> {
            self.inner.get_author(id)
        }

        fn find_author_by_username(&self, username: &str) -> Result<Option<AuthorRecord>> {
            self.inner.find_author_by_username(username)
        }
    }

    impl UserStore for FailingCredentialsStore {
        fn create_user(&self, user_handle: &str) -> Result<usize> {
            self.inner.create_user(user_handle)
        }

        fn delete_user(&self, user_id: usize) -> Result<bool> {
            if self.fail_delete {
                bail!("database is locked")
            }
            self.inner.delete_user(user_id)
        }

        fn get_user_handle(&self, user_id: usize) -> Result<Option<String>> {
            self.inner.get_user_handle(user_id)
        }

        fn get_all_user_handles(&self) -> Result<Vec<String>> {
            self.inner.get_all_user_handles()
        }

        fn get_user_id(&self, user_handle: &str) -> Result<Option<usize>> {
            self.inner.get_user_id(user_handle)
        }
    }

    fn create_failing_manager(fail_delete: bool) -> (UserManager, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let inner = SqliteUserStore::new(temp_dir.path().join("user.db")).unwrap();
        let store = FailingCredentialsStore { inner, fail_delete };
        (UserManager::new(Arc::new(store)), temp_dir)
    }

    #[test]
    fn failed_registration_releases_handle() {
        let (manager, _dir) = create_failing_manager(false);

        assert!(matches!(
            manager.register_user("alice", "s3cret"),
            Err(RegistrationError::Store(_))
        ));
        assert!(manager.get_all_user_handles().unwrap().is_empty());
    }

    #[test]
    fn failed_rollback_still_reports_store_error() {
        let (manager, _dir) = create_failing_manager(true);

        let err = manager.register_user("alice", "s3cret").unwrap_err();
        assert!(matches!(&err, RegistrationError::Store(e) if e.to_string() == "disk full"));
        assert_eq!(manager.get_all_user_handles().unwrap(), vec!["alice"]);
    }

    fn create_manager() -> (UserManager, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let store = SqliteUserStore::new(temp_dir.path().join("user.db")).unwrap();
        (UserManager::new(Arc::new(store)), temp_dir)
    }

    #[test]
    fn registers_and_logs_in() {
        let (manager, _dir) = create_manager();
        let user_id = manager.register_user("alice", "s3cret").unwrap();

        assert!(manager.login("alice", "wrong").unwrap().is_none());
        assert!(manager.login("bob", "s3cret").unwrap().is_none());

        let token = manager.login("alice", "s3cret").unwrap().unwrap();
        assert_eq!(token.user_id, user_id);
        let fetched = manager.get_auth_token(&token.value).unwrap().unwrap();
        assert_eq!(fetched.user_id, user_id);
        assert_eq!(
            manager.get_user_handle(user_id).unwrap(),
            Some("alice".to_owned())
        );
    }

    #[test]
    fn rejects_invalid_registrations() {
        let (manager, _dir) = create_manager();
        manager.register_user("alice", "s3cret").unwrap();

        assert!(matches!(
            manager.register_user("alice", "another"),
            Err(RegistrationError::HandleTaken(_))
        ));
        assert!(matches!(
            manager.register_user("", "s3cret"),
            Err(RegistrationError::InvalidInput(_))
        ));
        assert!(matches!(
            manager.register_user("with space", "s3cret"),
            Err(RegistrationError::InvalidInput(_))
        ));
        assert!(matches!(
            manager.register_user("bob", "abc"),
            Err(RegistrationError::InvalidInput(_))
        ));
        assert_eq!(manager.get_all_user_handles().unwrap(), vec!["alice"]);
    }

    #[test]
    fn manages_password_credentials() {
        let (manager, _dir) = create_manager();
        manager.add_user("alice").unwrap();

        assert!(!manager.check_password("alice", "anything").unwrap());
        assert!(manager
            .update_password_credentials("alice", "first")
            .is_err());

        manager.create_password_credentials("alice", "first").unwrap();
        assert!(manager.create_password_credentials("alice", "again").is_err());
        assert!(manager.check_password("alice", "first").unwrap());

        manager
            .update_password_credentials("alice", "second")
            .unwrap();
        assert!(!manager.check_password("alice", "first").unwrap());
        assert!(manager.check_password("alice", "second").unwrap());
    }

    #[test]
    fn only_owner_deletes_token() {
        let (manager, _dir) = create_manager();
        let alice = manager.register_user("alice", "s3cret").unwrap();
        let bob = manager.register_user("bob", "s3cret").unwrap();
        let token = manager.login("alice", "s3cret").unwrap().unwrap();

        assert!(manager.delete_auth_token(bob, &token.value).is_err());
        assert!(manager.get_auth_token(&token.value).unwrap().is_some());

        manager.delete_auth_token(alice, &token.value).unwrap();
        assert!(manager.get_auth_token(&token.value).unwrap().is_none());
        assert!(manager.delete_auth_token(alice, &token.value).is_err());
    }

    #[test]
    fn deletes_users() {
        let (manager, _dir) = create_manager();
        manager.register_user("alice", "s3cret").unwrap();

        manager.delete_user("alice").unwrap();
        assert!(manager.delete_user("alice").is_err());
        assert!(manager.get_all_user_handles().unwrap().is_empty());
        assert!(manager.login("alice", "s3cret").unwrap().is_none());
    }
}
