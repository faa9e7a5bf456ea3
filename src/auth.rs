//! Email/password authentication and request-scoped sessions.
//!
//! Passwords are hashed with Argon2id and stored as PHC strings. Admin access
//! is the same credential check followed by a role check against the store;
//! there are no built-in admin credentials.
//!
//! A [`Session`] is acquired at the start of a request and handed to whatever
//! needs the caller's identity. It is released when dropped and is never kept in
//! global state.

use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use serde::Serialize;
use thiserror::Error;

use crate::{
    store::{DuplicateEmail, UserStore},
    user::{NewUser, Role, User, normalize_email},
};

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("All fields are required")]
    MissingFields,
    #[error("User already exists with this email")]
    EmailTaken,
    #[error("Invalid email or password")]
    InvalidCredentials,
    #[error("Administrator access required")]
    NotAdmin,
    #[error("Password hashing failed: {0}")]
    Hash(String),
    #[error("Storage error: {0}")]
    Store(#[from] anyhow::Error),
}

/// Hash a password using Argon2id. Returns a PHC-format string.
pub fn hash_password(password: &str) -> Result<String, AuthError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| AuthError::Hash(e.to_string()))
}

/// Verify a password against a PHC-format hash string.
pub fn verify_password(password: &str, hash: &str) -> Result<bool, AuthError> {
    let parsed = PasswordHash::new(hash).map_err(|e| AuthError::Hash(e.to_string()))?;
    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok())
}

#[derive(Debug, Clone)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

impl Credentials {
    pub fn new(email: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            password: password.into(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SignupRequest {
    pub name: String,
    pub email: String,
    pub password: String,
    pub profile_image_url: Option<String>,
}

/// Authenticated identity for the duration of one request.
#[derive(Debug, Serialize)]
pub struct Session {
    pub user_id: i32,
    pub email: String,
    pub name: String,
    pub profile_image_url: Option<String>,
    pub role: Role,
}

impl Session {
    fn from_user(user: User) -> Self {
        tracing::debug!(user_id = user.id, role = %user.role, "session acquired");
        Self {
            user_id: user.id,
            email: user.email,
            name: user.name,
            profile_image_url: user.profile_image_url,
            role: user.role,
        }
    }

    /// Acquire a session by logging in.
    pub async fn acquire<S: UserStore>(
        auth: &AuthService<S>,
        credentials: &Credentials,
    ) -> Result<Self, AuthError> {
        auth.login(credentials).await
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    pub fn require_admin(&self) -> Result<(), AuthError> {
        if self.is_admin() {
            Ok(())
        } else {
            Err(AuthError::NotAdmin)
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        tracing::debug!(user_id = self.user_id, "session released");
    }
}

pub struct AuthService<S> {
    store: S,
    bootstrap_admins: Vec<String>,
}

impl<S: UserStore> AuthService<S> {
    /// `bootstrap_admins` lists emails that receive the admin role at signup.
    pub fn new(store: S, bootstrap_admins: &[String]) -> Self {
        Self {
            store,
            bootstrap_admins: bootstrap_admins.iter().map(|e| normalize_email(e)).collect(),
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub async fn signup(&self, request: &SignupRequest) -> Result<User, AuthError> {
        let name = request.name.trim();
        let email = normalize_email(&request.email);
        if name.is_empty() || email.is_empty() || request.password.is_empty() {
            return Err(AuthError::MissingFields);
        }

        if self.store.find_user_by_email(&email).await?.is_some() {
            return Err(AuthError::EmailTaken);
        }

        let role = if self.bootstrap_admins.contains(&email) {
            Role::Admin
        } else {
            Role::User
        };

        let new_user = NewUser {
            email,
            name: name.to_string(),
            password_hash: hash_password(&request.password)?,
            profile_image_url: request
                .profile_image_url
                .as_ref()
                .map(|url| url.trim().to_string())
                .filter(|url| !url.is_empty()),
            role,
        };

        // A concurrent signup can still win between the lookup and the insert.
        let user = self.store.create_user(&new_user).await.map_err(|e| {
            if e.is::<DuplicateEmail>() {
                tracing::info!("signup rejected: email registered concurrently");
                AuthError::EmailTaken
            } else {
                AuthError::Store(e)
            }
        })?;
        tracing::info!(user_id = user.id, role = %user.role, "user signed up");
        Ok(user)
    }

    pub async fn login(&self, credentials: &Credentials) -> Result<Session, AuthError> {
        let email = normalize_email(&credentials.email);
        if email.is_empty() || credentials.password.is_empty() {
            return Err(AuthError::MissingFields);
        }

        let Some(stored) = self.store.find_user_by_email(&email).await? else {
            tracing::info!("login rejected: unknown email");
            return Err(AuthError::InvalidCredentials);
        };

        if !verify_password(&credentials.password, &stored.password_hash)? {
            tracing::info!(user_id = stored.user.id, "login rejected: wrong password");
            return Err(AuthError::InvalidCredentials);
        }

        Ok(Session::from_user(stored.user))
    }

    /// Log in and require the admin role.
    pub async fn admin_login(&self, credentials: &Credentials) -> Result<Session, AuthError> {
        let session = self.login(credentials).await?;
        if let Err(e) = session.require_admin() {
            tracing::warn!(user_id = session.user_id, "admin login rejected: not an admin");
            return Err(e);
        }
        Ok(session)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn signup_request(email: &str) -> SignupRequest {
        SignupRequest {
            name: "Ayesha".to_string(),
            email: email.to_string(),
            password: "s3cret".to_string(),
            profile_image_url: None,
        }
    }

    fn service() -> AuthService<MemoryStore> {
        AuthService::new(MemoryStore::new(), &["Admin@Clinic.example".to_string()])
    }

    // ==================== Password Hashing Tests ====================

    #[test]
    fn test_hash_and_verify() {
        let hash = hash_password("correct horse").unwrap();
        assert!(hash.starts_with("$argon2"));
        assert!(verify_password("correct horse", &hash).unwrap());
        assert!(!verify_password("battery staple", &hash).unwrap());
    }

    #[test]
    fn test_verify_malformed_hash_errors() {
        assert!(matches!(
            verify_password("x", "not-a-hash"),
            Err(AuthError::Hash(_))
        ));
    }

    // ==================== Signup Tests ====================

    #[tokio::test]
    async fn test_signup_requires_fields() {
        let auth = service();
        let mut request = signup_request("a@example.com");
        request.name = "  ".to_string();
        assert!(matches!(
            auth.signup(&request).await,
            Err(AuthError::MissingFields)
        ));
    }

    #[tokio::test]
    async fn test_signup_rejects_duplicate_email_case_insensitive() {
        let auth = service();
        auth.signup(&signup_request("a@example.com")).await.unwrap();
        assert!(matches!(
            auth.signup(&signup_request("A@Example.com")).await,
            Err(AuthError::EmailTaken)
        ));
    }

    #[tokio::test]
    async fn test_signup_assigns_roles() {
        let auth = service();
        let user = auth.signup(&signup_request("a@example.com")).await.unwrap();
        assert_eq!(user.role, Role::User);

        let admin = auth
            .signup(&signup_request("admin@clinic.example"))
            .await
            .unwrap();
        assert_eq!(admin.role, Role::Admin);
    }

    /// Store whose lookups never see existing users, so duplicates are only
    /// caught by the insert.
    struct LateDuplicateStore(MemoryStore);

    impl UserStore for LateDuplicateStore {
        async fn create_user(&self, user: &NewUser) -> anyhow::Result<User> {
            self.0.create_user(user).await
        }

        async fn find_user_by_email(
            &self,
            _email: &str,
        ) -> anyhow::Result<Option<crate::user::UserCredentials>> {
            Ok(None)
        }

        async fn find_user_by_id(&self, id: i32) -> anyhow::Result<Option<User>> {
            self.0.find_user_by_id(id).await
        }

        async fn list_users(&self) -> anyhow::Result<Vec<User>> {
            self.0.list_users().await
        }
    }

    #[tokio::test]
    async fn test_signup_duplicate_caught_at_insert_is_email_taken() {
        let auth = AuthService::new(LateDuplicateStore(MemoryStore::new()), &[]);
        auth.signup(&signup_request("a@example.com")).await.unwrap();
        assert!(matches!(
            auth.signup(&signup_request("a@example.com")).await,
            Err(AuthError::EmailTaken)
        ));
    }

        // ==================== Login Tests ====================

    #[tokio::test]
    async fn test_login_success_and_failures_look_alike() {
        let auth = service();
        auth.signup(&signup_request("a@example.com")).await.unwrap();

        let session = auth
            .login(&Credentials::new(" a@example.com ", "s3cret"))
            .await
            .unwrap();
        assert_eq!(session.email, "a@example.com");
        assert!(!session.is_admin());

        let wrong_password = auth
            .login(&Credentials::new("a@example.com", "nope"))
            .await
            .unwrap_err();
        let unknown_email = auth
            .login(&Credentials::new("b@example.com", "s3cret"))
            .await
            .unwrap_err();
        assert_eq!(wrong_password.to_string(), unknown_email.to_string());
    }

    #[tokio::test]
    async fn test_admin_login_checks_role() {
        let auth = service();
        auth.signup(&signup_request("a@example.com")).await.unwrap();
        auth.signup(&signup_request("admin@clinic.example"))
            .await
            .unwrap();

        assert!(matches!(
            auth.admin_login(&Credentials::new("a@example.com", "s3cret"))
                .await,
            Err(AuthError::NotAdmin)
        ));

        let session = auth
            .admin_login(&Credentials::new("admin@clinic.example", "s3cret"))
            .await
            .unwrap();
        assert!(session.require_admin().is_ok());
    }

    #[tokio::test]
    async fn test_session_acquire_uses_login() {
        let auth = service();
        auth.signup(&signup_request("a@example.com")).await.unwrap();
        let session = Session::acquire(&auth, &Credentials::new("a@example.com", "s3cret"))
            .await
            .unwrap();
        assert!(matches!(session.require_admin(), Err(AuthError::NotAdmin)));
    }
}
