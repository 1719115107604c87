//! Per-aspect sealing: each stored aspect (text, file metadata, file key)
//! carries its own salt and verifier so that a compromise of one field's
//! crypto material says nothing about the others.

use super::{kdf, text, Result};
use crate::constants::KEY_LEN;

/// An encrypted value together with the hex-encoded salt and verifier that
/// must be persisted with it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sealed {
    /// Hex of `IV ∥ cipher text`.
    pub value: String,
    /// Hex of the 128-byte KDF salt.
    pub salt: String,
    /// Hex of the 32-byte verifier.
    pub hash: String,
}

/// Key material for the streaming file cipher: the key itself plus the
/// salt/verifier pair that is stored in its place.
pub struct FileKey {
    pub key: [u8; KEY_LEN],
    pub salt: String,
    pub hash: String,
}

/// Encrypt a short text under a fresh salt derived from `secret`.
pub fn seal_text(secret: &str, plaintext: &str) -> Result<Sealed> {
    let salt = kdf::generate_salt()?;
    let derived = kdf::derive(secret, &salt)?;
    let value = text::encrypt(plaintext, &derived.key)?;
    Ok(Sealed {
        value,
        salt: hex::encode(salt),
        hash: hex::encode(derived.verifier),
    })
}

/// Verify `secret` against the sealed salt/verifier and decrypt the value.
pub fn open_text(secret: &str, sealed: &Sealed) -> Result<String> {
    let key = open_key(secret, &sealed.salt, &sealed.hash)?;
    text::decrypt(&sealed.value, &key)
}

/// Derive a fresh file-cipher key for `secret`.
pub fn seal_file_key(secret: &str) -> Result<FileKey> {
    let salt = kdf::generate_salt()?;
    let derived = kdf::derive(secret, &salt)?;
    Ok(FileKey {
        key: derived.key,
        salt: hex::encode(salt),
        hash: hex::encode(derived.verifier),
    })
}

/// Recover the file-cipher key from stored salt and verifier hex.
pub fn open_key(secret: &str, salt_hex: &str, hash_hex: &str) -> Result<[u8; KEY_LEN]> {
    let salt = hex::decode(salt_hex).map_err(|e| super::CryptoError::HexDecode(e.to_string()))?;
    let hash = hex::decode(hash_hex).map_err(|e| super::CryptoError::HexDecode(e.to_string()))?;
    kdf::verify(secret, &salt, &hash)
}
