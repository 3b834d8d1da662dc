use std::collections::HashMap;
use std::sync::Arc;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use pajak_storage::NewUser;
use pajak_storage::Store;
use pajak_storage::User;
use rand::RngCore;
use sha2::Digest;
use sha2::Sha256;
use thiserror::Error;
use tokio::sync::RwLock;

pub type AuthResult<T> = Result<T, AuthError>;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("validation error: {0}")]
    Validation(String),
    #[error("invalid credentials")]
    InvalidCredentials,
    #[error("account disabled")]
    AccountDisabled,
    #[error("missing or invalid token")]
    Unauthorized,
    #[error("internal error: {0}")]
    Internal(String),
}

const RESERVED_USERNAMES: [&str; 9] = [
    "admin",
    "root",
    "system",
    "administrator",
    "moderator",
    "support",
    "api",
    "null",
    "undefined",
];

const WEAK_PASSWORDS: [&str; 13] = [
    "password",
    "password123",
    "password1",
    "12345678",
    "qwerty123",
    "admin123",
    "letmein123",
    "welcome123",
    "abc12345",
    "Password1",
    "Password123",
    "Qwerty123",
    "Admin123",
];

const SPECIAL_CHARACTERS: &str = "!@#$%^&*(),.?\":{}|<>_-+=[]\\;/~`";

/// Registration, login and bearer-token sessions. Tokens are opaque random
/// strings held in process memory; the wider session machinery lives
/// outside this service.
pub struct AuthService {
    store: Arc<dyn Store>,
    sessions: RwLock<HashMap<String, String>>,
}

impl AuthService {
    #[must_use]
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self {
            store,
            sessions: RwLock::new(HashMap::new()),
        }
    }

    pub async fn register(
        &self,
        username: &str,
        email: &str,
        password: &str,
        full_name: &str,
    ) -> AuthResult<User> {
        let username = validate_username(username)?;
        let email = validate_email(email)?;
        validate_password(password)?;

        let user = self
            .store
            .create_user(NewUser {
                username,
                email,
                password_hash: hash_password(password),
                full_name: full_name.trim().to_string(),
                is_admin: false,
            })
            .await
            .map_err(|err| match err {
                pajak_storage::StorageError::Conflict(message) => AuthError::Validation(message),
                pajak_storage::StorageError::Validation(message) => AuthError::Validation(message),
                other => AuthError::Internal(other.to_string()),
            })?;
        Ok(user)
    }

    pub async fn login(&self, username: &str, password: &str) -> AuthResult<(String, User)> {
        let user = self
            .store
            .find_user_by_username(username)
            .await
            .map_err(|err| AuthError::Internal(err.to_string()))?
            .ok_or(AuthError::InvalidCredentials)?;
        if !verify_password(password, &user.password_hash) {
            return Err(AuthError::InvalidCredentials);
        }
        if !user.is_active {
            return Err(AuthError::AccountDisabled);
        }

        let user = self
            .store
            .record_login(&user.id)
            .await
            .map_err(|err| AuthError::Internal(err.to_string()))?;

        let token = generate_token();
        self.sessions
            .write()
            .await
            .insert(token.clone(), user.id.clone());
        Ok((token, user))
    }

    pub async fn authenticate(&self, token: &str) -> AuthResult<User> {
        let user_id = self
            .sessions
            .read()
            .await
            .get(token)
            .cloned()
            .ok_or(AuthError::Unauthorized)?;
        let user = self
            .store
            .get_user(&user_id)
            .await
            .map_err(|_| AuthError::Unauthorized)?;
        if !user.is_active {
            return Err(AuthError::AccountDisabled);
        }
        Ok(user)
    }

    pub async fn logout(&self, token: &str) {
        self.sessions.write().await.remove(token);
    }
}

fn validate_username(username: &str) -> AuthResult<String> {
    let username = username.trim();
    if username.len() < 3 {
        return Err(AuthError::Validation(
            "username must be at least 3 characters".into(),
        ));
    }
    if username.len() > 50 {
        return Err(AuthError::Validation(
            "username cannot exceed 50 characters".into(),
        ));
    }
    if !username
        .chars()
        .all(|ch| ch.is_ascii_alphanumeric() || ch == '_' || ch == '-')
    {
        return Err(AuthError::Validation(
            "username may only contain letters, digits, underscore and hyphen".into(),
        ));
    }
    if RESERVED_USERNAMES.contains(&username.to_ascii_lowercase().as_str()) {
        return Err(AuthError::Validation("this username is reserved".into()));
    }
    Ok(username.to_string())
}

fn validate_email(email: &str) -> AuthResult<String> {
    let email = email.trim().to_ascii_lowercase();
    if email.len() > 254 {
        return Err(AuthError::Validation("email address too long".into()));
    }
    let Some((local, domain)) = email.split_once('@') else {
        return Err(AuthError::Validation("invalid email format".into()));
    };
    if local.is_empty() || domain.is_empty() || !domain.contains('.') {
        return Err(AuthError::Validation("invalid email format".into()));
    }
    Ok(email)
}

fn validate_password(password: &str) -> AuthResult<()> {
    if password.len() < 8 {
        return Err(AuthError::Validation(
            "password must be at least 8 characters long".into(),
        ));
    }
    if password.len() > 128 {
        return Err(AuthError::Validation("password too long".into()));
    }
    if !password.chars().any(|ch| ch.is_ascii_uppercase()) {
        return Err(AuthError::Validation(
            "password must contain an uppercase letter".into(),
        ));
    }
    if !password.chars().any(|ch| ch.is_ascii_lowercase()) {
        return Err(AuthError::Validation(
            "password must contain a lowercase letter".into(),
        ));
    }
    if !password.chars().any(|ch| ch.is_ascii_digit()) {
        return Err(AuthError::Validation(
            "password must contain a digit".into(),
        ));
    }
    if !password.chars().any(|ch| SPECIAL_CHARACTERS.contains(ch)) {
        return Err(AuthError::Validation(
            "password must contain a special character".into(),
        ));
    }
    if WEAK_PASSWORDS.contains(&password) {
        return Err(AuthError::Validation(
            "this password is too common".into(),
        ));
    }
    Ok(())
}

/// `salt$digest` with a random per-user salt.
fn hash_password(password: &str) -> String {
    let mut salt = [0u8; 16];
    rand::rng().fill_bytes(&mut salt);
    let salt = URL_SAFE_NO_PAD.encode(salt);
    format!("{salt}${}", digest_password(&salt, password))
}

fn verify_password(password: &str, stored: &str) -> bool {
    let Some((salt, digest)) = stored.split_once('$') else {
        return false;
    };
    let computed = digest_password(salt, password);
    // Constant-time comparison over the hex digests.
    computed.len() == digest.len()
        && computed
            .bytes()
            .zip(digest.bytes())
            .fold(0u8, |acc, (a, b)| acc | (a ^ b))
            == 0
}

fn digest_password(salt: &str, password: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(salt.as_bytes());
    hasher.update(b"$");
    hasher.update(password.as_bytes());
    format!("{:x}", hasher.finalize())
}

fn generate_token() -> String {
    let mut bytes = [0u8; 32];
    rand::rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pajak_storage::InMemoryStore;
    use pretty_assertions::assert_eq;

    fn service() -> AuthService {
        AuthService::new(Arc::new(InMemoryStore::new()))
    }

    #[tokio::test]
    async fn register_login_authenticate_round_trip() {
        let service = service();
        let user = service
            .register("budi", "budi@example.com", "Rahasia123!", "Budi Santoso")
            .await
            .expect("register");
        assert_eq!(user.username, "budi");
        assert!(user.last_login.is_none());

        let (token, logged_in) = service
            .login("budi", "Rahasia123!")
            .await
            .expect("login");
        assert!(logged_in.last_login.is_some());

        let authenticated = service.authenticate(&token).await.expect("authenticate");
        assert_eq!(authenticated.id, user.id);

        service.logout(&token).await;
        assert!(service.authenticate(&token).await.is_err());
    }

    #[tokio::test]
    async fn wrong_password_is_rejected() {
        let service = service();
        service
            .register("budi", "budi@example.com", "Rahasia123!", "Budi")
            .await
            .expect("register");
        let err = service.login("budi", "salah-total").await.unwrap_err();
        assert!(matches!(err, AuthError::InvalidCredentials));
    }

    #[tokio::test]
    async fn weak_passwords_are_rejected() {
        let service = service();
        for candidate in [
            "pendek",
            "alllowercase1!",
            "NOLOWER123!",
            "password123",
            // No special character.
            "Rahasia123",
            // Common-password list entries.
            "Password123",
            "Qwerty123",
        ] {
            let result = service
                .register("budi", "budi@example.com", candidate, "Budi")
                .await;
            assert!(result.is_err(), "{candidate} should be rejected");
        }
    }

    #[tokio::test]
    async fn reserved_usernames_are_rejected() {
        let service = service();
        let err = service
            .register("admin", "a@example.com", "Rahasia123!", "A")
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::Validation(_)));
    }

    #[test]
    fn password_hashes_are_salted() {
        let first = hash_password("Rahasia123!");
        let second = hash_password("Rahasia123!");
        assert_ne!(first, second);
        assert!(verify_password("Rahasia123!", &first));
        assert!(verify_password("Rahasia123!", &second));
        assert!(!verify_password("other", &first));
    }
}
