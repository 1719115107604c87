use aes::Aes256;
use ofb::cipher::{KeyIvInit, StreamCipher};
use ofb::Ofb;

use crate::constants::{IV_LEN, KEY_LEN};

type Aes256Ofb = Ofb<Aes256>;

/// Streaming file cipher: AES-256-OFB with an all-zero IV.
///
/// The zero IV is sound only because every item derives a unique key from a
/// fresh 128-byte salt; keys are never reused across items. OFB keeps the
/// blob exactly as long as the plaintext, and applying the keystream twice
/// restores the input, so one type serves both directions.
pub struct FileCipher {
    inner: Aes256Ofb,
}

impl FileCipher {
    pub fn new(key: &[u8; KEY_LEN]) -> Self {
        let iv = [0u8; IV_LEN];
        Self {
            inner: Aes256Ofb::new(key.into(), &iv.into()),
        }
    }

    /// XOR the next keystream bytes into `buf`, in place. Successive calls
    /// continue the stream, so chunk boundaries do not matter.
    pub fn apply(&mut self, buf: &mut [u8]) {
        self.inner.apply_keystream(buf);
    }
}
