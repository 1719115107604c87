pub mod kdf;
pub mod seal;
pub mod stream;
pub mod text;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CryptoError {
    #[error("random generation failed: {0}")]
    Random(String),
    #[error("PBKDF2 derivation failed: {0}")]
    Pbkdf2Derive(String),
    #[error("salt too short: expected at least {expected}, got {got}")]
    SaltTooShort { expected: usize, got: usize },
    #[error("wrong secret")]
    WrongSecret,
    #[error("empty text")]
    EmptyText,
    #[error("hex decode failed: {0}")]
    HexDecode(String),
    #[error("cipher text too short: {0} bytes")]
    CipherTooShort(usize),
    #[error("decrypted text is not valid UTF-8")]
    NotUtf8,
}

pub type Result<T> = std::result::Result<T, CryptoError>;
