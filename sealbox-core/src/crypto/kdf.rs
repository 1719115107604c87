use hmac::Hmac;
use sha3::digest::{ExtendableOutput, Update, XofReader};
use sha3::{Sha3_512, Shake256};
use subtle::ConstantTimeEq;

use super::{CryptoError, Result};
use crate::constants::{KEY_LEN, PBKDF2_ITERATIONS, SALT_LEN, VERIFIER_LEN};

/// A key derived from a secret plus per-aspect salt, with the verifier that
/// is stored in place of the key.
pub struct DerivedKey {
    /// AES-256 key. Never persisted.
    pub key: [u8; KEY_LEN],
    /// SHAKE-256 over `key ∥ salt`. Persisted next to the salt; a match on
    /// recomputation authenticates the secret without revealing the key.
    pub verifier: [u8; VERIFIER_LEN],
}

/// Generate a fresh per-aspect salt.
pub fn generate_salt() -> Result<[u8; SALT_LEN]> {
    let mut salt = [0u8; SALT_LEN];
    getrandom::getrandom(&mut salt).map_err(|e| CryptoError::Random(e.to_string()))?;
    Ok(salt)
}

/// Derive the per-aspect key and verifier from a secret and salt.
///
/// PBKDF2 with an HMAC-SHA3-512 PRF and a fixed iteration count; the
/// verifier is SHAKE-256 squeezed to 32 bytes over `key ∥ salt`.
pub fn derive(secret: &str, salt: &[u8]) -> Result<DerivedKey> {
    if salt.len() < SALT_LEN {
        return Err(CryptoError::SaltTooShort {
            expected: SALT_LEN,
            got: salt.len(),
        });
    }

    let mut key = [0u8; KEY_LEN];
    pbkdf2::pbkdf2::<Hmac<Sha3_512>>(secret.as_bytes(), salt, PBKDF2_ITERATIONS, &mut key)
        .map_err(|e| CryptoError::Pbkdf2Derive(e.to_string()))?;

    let mut hasher = Shake256::default();
    hasher.update(&key);
    hasher.update(salt);
    let mut verifier = [0u8; VERIFIER_LEN];
    hasher.finalize_xof().read(&mut verifier);

    Ok(DerivedKey { key, verifier })
}

/// Re-derive the key for `secret` and check it against a stored verifier in
/// constant time. Returns the key on a match, `WrongSecret` otherwise.
pub fn verify(secret: &str, salt: &[u8], stored_verifier: &[u8]) -> Result<[u8; KEY_LEN]> {
    let derived = derive(secret, salt)?;
    if bool::from(derived.verifier.as_slice().ct_eq(stored_verifier)) {
        Ok(derived.key)
    } else {
        Err(CryptoError::WrongSecret)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_derive_deterministic() {
        let salt = [0x42u8; SALT_LEN];
        let a = derive("secret", &salt).unwrap();
        let b = derive("secret", &salt).unwrap();
        assert_eq!(a.key, b.key);
        assert_eq!(a.verifier, b.verifier);
    }

    #[test]
    fn test_derive_different_secrets() {
        let salt = [0x42u8; SALT_LEN];
        let a = derive("secret-1", &salt).unwrap();
        let b = derive("secret-2", &salt).unwrap();
        assert_ne!(a.key, b.key);
        assert_ne!(a.verifier, b.verifier);
    }

    #[test]
    fn test_derive_different_salts() {
        let a = derive("secret", &[0x01; SALT_LEN]).unwrap();
        let b = derive("secret", &[0x02; SALT_LEN]).unwrap();
        assert_ne!(a.key, b.key);
    }

    #[test]
    fn test_derive_salt_too_short() {
        let result = derive("secret", &[0x01; 16]);
        assert!(matches!(result, Err(CryptoError::SaltTooShort { .. })));
    }

    #[test]
    fn test_verify_roundtrip() {
        let salt = generate_salt().unwrap();
        let derived = derive("pw", &salt).unwrap();
        let key = verify("pw", &salt, &derived.verifier).unwrap();
        assert_eq!(key, derived.key);
    }

    #[test]
    fn test_verify_wrong_secret() {
        let salt = generate_salt().unwrap();
        let derived = derive("pw", &salt).unwrap();
        let result = verify("other", &salt, &derived.verifier);
        assert!(matches!(result, Err(CryptoError::WrongSecret)));
    }

    #[test]
    fn test_salts_are_unique() {
        let a = generate_salt().unwrap();
        let b = generate_salt().unwrap();
        assert_ne!(a[..], b[..]);
    }
}
