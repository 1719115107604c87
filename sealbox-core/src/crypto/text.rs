use aes::Aes256;
use cfb_mode::cipher::{AsyncStreamCipher, KeyIvInit};

use super::{CryptoError, Result};
use crate::constants::{IV_LEN, KEY_LEN};

type Aes256CfbEnc = cfb_mode::Encryptor<Aes256>;
type Aes256CfbDec = cfb_mode::Decryptor<Aes256>;

/// Encrypt a short text with AES-256-CFB.
///
/// A fresh random 16-byte IV is prepended to the cipher text and the whole
/// buffer is hex-encoded for database storage, so the stored value is
/// `2 * (16 + len)` characters.
pub fn encrypt(plaintext: &str, key: &[u8; KEY_LEN]) -> Result<String> {
    if plaintext.is_empty() {
        return Err(CryptoError::EmptyText);
    }

    let mut buf = vec![0u8; IV_LEN + plaintext.len()];
    getrandom::getrandom(&mut buf[..IV_LEN]).map_err(|e| CryptoError::Random(e.to_string()))?;
    buf[IV_LEN..].copy_from_slice(plaintext.as_bytes());

    let iv: [u8; IV_LEN] = buf[..IV_LEN].try_into().expect("iv slice length");
    Aes256CfbEnc::new(key.into(), &iv.into()).encrypt(&mut buf[IV_LEN..]);

    Ok(hex::encode(buf))
}

/// Decrypt a hex-encoded `IV ∥ cipher text` value produced by [`encrypt`].
pub fn decrypt(value: &str, key: &[u8; KEY_LEN]) -> Result<String> {
    if value.is_empty() {
        return Err(CryptoError::EmptyText);
    }
    let mut buf = hex::decode(value).map_err(|e| CryptoError::HexDecode(e.to_string()))?;
    if buf.len() <= IV_LEN {
        return Err(CryptoError::CipherTooShort(buf.len()));
    }

    let iv: [u8; IV_LEN] = buf[..IV_LEN].try_into().expect("iv slice length");
    Aes256CfbDec::new(key.into(), &iv.into()).decrypt(&mut buf[IV_LEN..]);

    String::from_utf8(buf.split_off(IV_LEN)).map_err(|_| CryptoError::NotUtf8)
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY: [u8; KEY_LEN] = [0x42; KEY_LEN];

    #[test]
    fn test_roundtrip() {
        let cipher = encrypt("a short secret note", &KEY).unwrap();
        assert_eq!(cipher.len(), 2 * (IV_LEN + "a short secret note".len()));
        let plain = decrypt(&cipher, &KEY).unwrap();
        assert_eq!(plain, "a short secret note");
    }

    #[test]
    fn test_fresh_iv_per_message() {
        let a = encrypt("same text", &KEY).unwrap();
        let b = encrypt("same text", &KEY).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_empty_text_rejected() {
        assert!(matches!(encrypt("", &KEY), Err(CryptoError::EmptyText)));
        assert!(matches!(decrypt("", &KEY), Err(CryptoError::EmptyText)));
    }

    #[test]
    fn test_bad_hex() {
        let result = decrypt("not hex at all", &KEY);
        assert!(matches!(result, Err(CryptoError::HexDecode(_))));
    }

    #[test]
    fn test_cipher_too_short() {
        let result = decrypt(&hex::encode([0u8; IV_LEN]), &KEY);
        assert!(matches!(result, Err(CryptoError::CipherTooShort(_))));
    }

    #[test]
    fn test_unicode_roundtrip() {
        let cipher = encrypt("пароль 🔑", &KEY).unwrap();
        assert_eq!(decrypt(&cipher, &KEY).unwrap(), "пароль 🔑");
    }
}
