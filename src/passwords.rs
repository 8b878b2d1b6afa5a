//! bcrypt hashing, run off the async runtime.

use bcrypt::{hash, verify, DEFAULT_COST};

use crate::error::AppError;

/// Hash of a password nobody has, so an unknown username costs as much as a
/// wrong password.
const UNKNOWN_USER_HASH: &str = "$2b$12$C6UzMDM.H6dfI/f/IKcEeO5z5mH6G5yG8mZt0F6E5I4c9W0.xZ7eG";

pub async fn hash_password(password: String) -> Result<String, AppError> {
    match tokio::task::spawn_blocking(move || hash(&password, DEFAULT_COST)).await {
        Ok(Ok(h)) => Ok(h),
        Ok(Err(e)) => Err(AppError::internal(format!("Failed to hash password: {}", e))),
        Err(e) => Err(AppError::internal(format!(
            "spawn_blocking panic during hash: {}",
            e
        ))),
    }
}

/// False on mismatch and on any hashing failure. `None` burns the same time
/// against a dummy hash.
pub async fn verify_password(password: String, password_hash: Option<String>) -> bool {
    let known = password_hash.is_some();
    let hash = password_hash.unwrap_or_else(|| UNKNOWN_USER_HASH.to_string());
    let matched = tokio::task::spawn_blocking(move || verify(&password, &hash).unwrap_or(false))
        .await
        .unwrap_or(false);
    known && matched
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_hash_then_verify() {
        let hashed = hash_password("pass1234word".to_string()).await.unwrap();
        assert!(verify_password("pass1234word".to_string(), Some(hashed.clone())).await);
        assert!(!verify_password("wrong".to_string(), Some(hashed)).await);
    }

    #[tokio::test]
    async fn test_unknown_user_never_verifies() {
        assert!(!verify_password("anything".to_string(), None).await);
    }
}
