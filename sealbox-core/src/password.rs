//! Auto-generated passwords for uploads that leave the password field blank.

use crate::constants::PASSWORD_ALPHABET;
use crate::crypto::{CryptoError, Result};

/// Generate a uniform random password of `len` characters from the
/// unambiguous alphabet.
///
/// Bytes are drawn from the OS CSPRNG; samples that would bias the modulo
/// reduction are rejected and redrawn, so every alphabet character is
/// equally likely.
pub fn generate(len: usize) -> Result<String> {
    let n = PASSWORD_ALPHABET.len();
    // Largest multiple of the alphabet size that fits in a byte.
    let limit = 256 - (256 % n);

    let mut password = String::with_capacity(len);
    let mut buf = [0u8; 64];
    while password.len() < len {
        getrandom::getrandom(&mut buf).map_err(|e| CryptoError::Random(e.to_string()))?;
        for &b in &buf {
            if (b as usize) < limit {
                password.push(PASSWORD_ALPHABET[b as usize % n] as char);
                if password.len() == len {
                    break;
                }
            }
        }
    }
    Ok(password)
}
