//! Argon2id password hashing.
//!
//! Hashing is CPU-bound, so the async entry points run it on the blocking
//! pool instead of a runtime worker. User files written by older installs
//! hold bcrypt hashes; those still verify and are upgraded to Argon2id on
//! the next successful login.

use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use secrecy::{ExposeSecret, SecretString};

use super::AuthError;

/// Hash a password with a fresh random salt.
///
/// The result is a PHC string that embeds algorithm, parameters, and salt.
///
/// # Errors
///
/// Returns `Hashing` if argon2 rejects the input.
pub fn hash_password(password: &SecretString) -> Result<String, AuthError> {
    let salt = SaltString::generate(&mut OsRng);

    Argon2::default()
        .hash_password(password.expose_secret().as_bytes(), &salt)
        .map(|h| h.to_string())
        .map_err(|e| AuthError::Hashing(format!("Password hashing failed: {e}")))
}

/// Check a password against a stored hash, Argon2id or bcrypt.
///
/// A malformed hash never matches.
#[must_use]
pub fn verify_password(password: &SecretString, hash: &str) -> bool {
    if is_bcrypt(hash) {
        return bcrypt::verify(password.expose_secret(), hash).unwrap_or_else(|e| {
            tracing::warn!(error = %e, "Stored bcrypt hash is malformed");
            false
        });
    }

    let parsed = match PasswordHash::new(hash) {
        Ok(parsed) => parsed,
        Err(e) => {
            tracing::warn!(error = %e, "Stored password hash is malformed");
            return false;
        }
    };

    Argon2::default()
        .verify_password(password.expose_secret().as_bytes(), &parsed)
        .is_ok()
}

/// Whether a stored hash should be replaced with an Argon2id one.
#[must_use]
pub fn needs_rehash(hash: &str) -> bool {
    is_bcrypt(hash)
}

fn is_bcrypt(hash: &str) -> bool {
    ["$2a$", "$2b$", "$2y$"].iter().any(|p| hash.starts_with(p))
}

/// [`hash_password`] on the blocking pool.
///
/// # Errors
///
/// Returns `Hashing` on failure.
pub async fn hash(password: SecretString) -> Result<String, AuthError> {
    tokio::task::spawn_blocking(move || hash_password(&password))
        .await
        .map_err(|e| AuthError::Hashing(format!("Hashing task failed: {e}")))?
}

/// [`verify_password`] on the blocking pool.
///
/// # Errors
///
/// Returns `Hashing` only if the task itself fails; a mismatch is `Ok(false)`.
pub async fn verify(password: SecretString, hash: String) -> Result<bool, AuthError> {
    tokio::task::spawn_blocking(move || verify_password(&password, &hash))
        .await
        .map_err(|e| AuthError::Hashing(format!("Verification task failed: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn secret(s: &str) -> SecretString {
        SecretString::from(s.to_string())
    }

    #[test]
    fn test_hash_and_verify() {
        let hash = hash_password(&secret("correct-horse-battery")).unwrap();
        assert!(hash.starts_with("$argon2id$"));
        assert!(!hash.contains("correct-horse-battery"));

        assert!(verify_password(&secret("correct-horse-battery"), &hash));
        assert!(!verify_password(&secret("wrong-password"), &hash));
    }

    #[test]
    fn test_salts_differ() {
        let a = hash_password(&secret("same-password")).unwrap();
        let b = hash_password(&secret("same-password")).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_malformed_hash() {
        assert!(!verify_password(&secret("anything"), "not-a-hash"));
        assert!(!verify_password(&secret("anything"), ""));
    }

    #[test]
    fn test_verifies_bcrypt_hashes() {
        let hash = bcrypt::hash("correct-horse-battery", 4).unwrap();
        assert!(hash.starts_with("$2b$"));
        assert!(needs_rehash(&hash));

        assert!(verify_password(&secret("correct-horse-battery"), &hash));
        assert!(!verify_password(&secret("wrong-password"), &hash));
        assert!(!verify_password(&secret("anything"), "$2b$04$truncated"));

        let upgraded = hash_password(&secret("correct-horse-battery")).unwrap();
        assert!(!needs_rehash(&upgraded));
    }

    #[tokio::test]
    async fn test_async_roundtrip() {
        let hash = hash(secret("correct-horse-battery")).await.unwrap();
        assert!(verify(secret("correct-horse-battery"), hash.clone()).await.unwrap());
        assert!(!verify(secret("incorrect"), hash).await.unwrap());
    }
}
