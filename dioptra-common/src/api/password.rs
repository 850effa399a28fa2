//! Salted password hashing
//!
//! Hashes are stored as `pbkdf2:sha256:<iterations>$<salt>$<hex digest>`.
//! The digest is PBKDF2-HMAC-SHA256 with a 32 byte output and a 16
//! character alphanumeric salt.

use crate::{Error, Result};
use hmac::{Hmac, Mac};
use rand::distributions::Alphanumeric;
use rand::Rng;
use sha2::Sha256;
use subtle::ConstantTimeEq;

type HmacSha256 = Hmac<Sha256>;

const METHOD_PREFIX: &str = "pbkdf2:sha256:";
const SALT_LENGTH: usize = 16;
const DIGEST_LENGTH: usize = 32;

/// Hash a password with a fresh random salt
///
/// # Examples
///
/// ```
/// use dioptra_common::api::password::{hash_password, verify_password};
///
/// let hash = hash_password("hunter2", 1000).unwrap();
/// assert!(hash.starts_with("pbkdf2:sha256:1000$"));
/// assert!(verify_password(&hash, "hunter2"));
/// assert!(!verify_password(&hash, "hunter3"));
/// ```
pub fn hash_password(password: &str, iterations: u32) -> Result<String> {
    if iterations == 0 {
        return Err(Error::InvalidInput(
            "password hash iterations must be positive".to_string(),
        ));
    }

    let salt: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(SALT_LENGTH)
        .map(char::from)
        .collect();

    let digest = pbkdf2_sha256(password.as_bytes(), salt.as_bytes(), iterations)?;

    Ok(format!(
        "{}{}${}${}",
        METHOD_PREFIX,
        iterations,
        salt,
        hex::encode(digest)
    ))
}

/// Check a password against a stored hash
///
/// Malformed hashes never verify.
pub fn verify_password(hash: &str, password: &str) -> bool {
    let mut parts = hash.splitn(3, '$');
    let (Some(method), Some(salt), Some(expected_hex)) = (parts.next(), parts.next(), parts.next())
    else {
        return false;
    };

    let Some(iterations) = method
        .strip_prefix(METHOD_PREFIX)
        .and_then(|s| s.parse::<u32>().ok())
        .filter(|n| *n > 0)
    else {
        return false;
    };

    let Ok(expected) = hex::decode(expected_hex) else {
        return false;
    };

    match pbkdf2_sha256(password.as_bytes(), salt.as_bytes(), iterations) {
        Ok(actual) => actual[..].ct_eq(&expected[..]).into(),
        Err(_) => false,
    }
}

/// PBKDF2-HMAC-SHA256 producing a single 32 byte block
fn pbkdf2_sha256(password: &[u8], salt: &[u8], iterations: u32) -> Result<[u8; DIGEST_LENGTH]> {
    let prf = HmacSha256::new_from_slice(password)
        .map_err(|e| Error::Internal(format!("HMAC key error: {}", e)))?;

    let mut mac = prf.clone();
    mac.update(salt);
    mac.update(&1u32.to_be_bytes());

    let mut block = [0u8; DIGEST_LENGTH];
    block.copy_from_slice(&mac.finalize().into_bytes());
    let mut output = block;

    for _ in 1..iterations {
        let mut mac = prf.clone();
        mac.update(&block);
        block.copy_from_slice(&mac.finalize().into_bytes());
        for (out, b) in output.iter_mut().zip(block.iter()) {
            *out ^= b;
        }
    }

    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pbkdf2_known_vectors() {
        let one = pbkdf2_sha256(b"password", b"salt", 1).unwrap();
        assert_eq!(
            hex::encode(one),
            "120fb6cffcf8b32c43e7225256c4f837a86548c92ccc35480805987cb70be17b"
        );

        let two = pbkdf2_sha256(b"password", b"salt", 2).unwrap();
        assert_eq!(
            hex::encode(two),
            "ae4d0c95af6b46d32d0adff928f06dd02a303f8ef3c251dfd6e2d85a95474c43"
        );
    }

    #[test]
    fn test_hash_format() {
        let hash = hash_password("password", 10).unwrap();
        let parts: Vec<&str> = hash.split('$').collect();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0], "pbkdf2:sha256:10");
        assert_eq!(parts[1].len(), SALT_LENGTH);
        assert_eq!(parts[2].len(), DIGEST_LENGTH * 2);
    }

    #[test]
    fn test_salts_differ() {
        let a = hash_password("password", 10).unwrap();
        let b = hash_password("password", 10).unwrap();
        assert_ne!(a, b);
        assert!(verify_password(&a, "password"));
        assert!(verify_password(&b, "password"));
    }

    #[test]
    fn test_zero_iterations_rejected() {
        assert!(hash_password("password", 0).is_err());
    }

    #[test]
    fn test_malformed_hashes_do_not_verify() {
        assert!(!verify_password("", "password"));
        assert!(!verify_password("plaintext", "plaintext"));
        assert!(!verify_password("pbkdf2:sha256:0$salt$00", "password"));
        assert!(!verify_password("pbkdf2:sha256:10$salt$not-hex", "password"));
        assert!(!verify_password("scrypt:32768:8:1$salt$00", "password"));
    }
}
