use crate::application_port::{AccountError, CredentialHasher};
use argon2::password_hash::rand_core::OsRng;
use argon2::{Argon2, PasswordHash, PasswordHasher, PasswordVerifier};
use constant_time_eq::constant_time_eq;
use sha2::{Digest, Sha256};

pub struct Argon2PasswordHasher;

#[async_trait::async_trait]
impl CredentialHasher for Argon2PasswordHasher {
    async fn hash_password(&self, password: &str) -> Result<String, AccountError> {
        let salt = argon2::password_hash::SaltString::generate(&mut OsRng);
        let hash = Argon2::default()
            .hash_password(password.as_bytes(), &salt)
            .map_err(|e| AccountError::Internal(e.to_string()))?
            .to_string();
        Ok(hash)
    }

    async fn verify_password(
        &self,
        password: &str,
        password_digest: &str,
    ) -> Result<bool, AccountError> {
        let parsed = PasswordHash::new(password_digest)
            .map_err(|e| AccountError::Internal(format!("invalid PHC hash: {e}")))?;

        match Argon2::default().verify_password(password.as_bytes(), &parsed) {
            Ok(_) => Ok(true),
            Err(argon2::password_hash::Error::Password) => Ok(false),
            Err(e) => Err(AccountError::Internal(format!("verify error: {e}"))),
        }
    }
}

/// Compare a hex digest against freshly computed bytes without leaking how
/// many leading bytes matched. Malformed hex never matches.
fn digest_matches(computed: &[u8], password_digest: &str) -> bool {
    match hex::decode(password_digest) {
        Ok(stored) => constant_time_eq(computed, &stored),
        Err(_) => false,
    }
}

/// Unsalted MD5 hex digest, the format of rows written by legacy deployments.
///
/// Only for reading existing rows; new deployments use `Argon2PasswordHasher`.
pub struct Md5DigestHasher;

impl Md5DigestHasher {
    fn digest(password: &str) -> Vec<u8> {
        <md5::Md5 as md5::Digest>::digest(password.as_bytes()).to_vec()
    }
}

#[async_trait::async_trait]
impl CredentialHasher for Md5DigestHasher {
    async fn hash_password(&self, password: &str) -> Result<String, AccountError> {
        Ok(hex::encode(Self::digest(password)))
    }

    async fn verify_password(
        &self,
        password: &str,
        password_digest: &str,
    ) -> Result<bool, AccountError> {
        Ok(digest_matches(&Self::digest(password), password_digest))
    }
}

/// Unsalted SHA-256 hex digest. Fast, so development settings and tests use it.
pub struct Sha256DigestHasher;

impl Sha256DigestHasher {
    fn digest(password: &str) -> Vec<u8> {
        Sha256::digest(password.as_bytes()).to_vec()
    }
}

#[async_trait::async_trait]
impl CredentialHasher for Sha256DigestHasher {
    async fn hash_password(&self, password: &str) -> Result<String, AccountError> {
        Ok(hex::encode(Self::digest(password)))
    }

    async fn verify_password(
        &self,
        password: &str,
        password_digest: &str,
    ) -> Result<bool, AccountError> {
        Ok(digest_matches(&Self::digest(password), password_digest))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn argon2_round_trip() {
        let hasher = Argon2PasswordHasher;
        let digest = hasher.hash_password("secret").await.unwrap();
        assert!(digest.starts_with("$argon2"));
        assert!(hasher.verify_password("secret", &digest).await.unwrap());
        assert!(!hasher.verify_password("Secret", &digest).await.unwrap());
    }

    #[tokio::test]
    async fn argon2_rejects_malformed_digest() {
        let result = Argon2PasswordHasher
            .verify_password("secret", "not-a-phc-string")
            .await;
        assert!(matches!(result, Err(AccountError::Internal(_))));
    }

    #[tokio::test]
    async fn sha256_known_vector() {
        let digest = Sha256DigestHasher.hash_password("hello").await.unwrap();
        assert_eq!(
            digest,
            "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824"
        );
        assert!(
            Sha256DigestHasher
                .verify_password("hello", &digest.to_uppercase())
                .await
                .unwrap()
        );
    }

    #[tokio::test]
    async fn md5_known_vector() {
        let digest = Md5DigestHasher.hash_password("hello").await.unwrap();
        assert_eq!(digest, "5d41402abc4b2a76b9719d911017c592");
        assert!(
            Md5DigestHasher
                .verify_password("hello", "5D41402ABC4B2A76B9719D911017C592")
                .await
                .unwrap()
        );
        assert!(!Md5DigestHasher.verify_password("hell0", &digest).await.unwrap());
    }

    #[tokio::test]
    async fn malformed_or_truncated_digests_never_match() {
        let digest = Md5DigestHasher.hash_password("hello").await.unwrap();
        for stored in ["", "not hex at all", &digest[..30], "5d41402abc4b2a76b9719d911017c59"] {
            assert!(!Md5DigestHasher.verify_password("hello", stored).await.unwrap());
            assert!(!Sha256DigestHasher.verify_password("hello", stored).await.unwrap());
        }
    }

    #[test]
    fn digest_comparison_needs_equal_bytes() {
        assert!(digest_matches(&[0xab, 0xcd], "abcd"));
        assert!(digest_matches(&[0xab, 0xcd], "ABCD"));
        assert!(!digest_matches(&[0xab, 0xcd], "abce"));
        assert!(!digest_matches(&[0xab, 0xcd], "abcd00"));
    }
}
