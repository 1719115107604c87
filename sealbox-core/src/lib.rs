//! Cryptographic core for sealbox, a self-destructing secret-sharing service.
//!
//! Key derivation, per-aspect sealing (salt + verifier bookkeeping), the text
//! and file ciphers, and the password generator live here so that the server
//! and any future client share identical byte-level behavior.

pub mod constants;
pub mod crypto;
pub mod password;

pub use crypto::CryptoError;
