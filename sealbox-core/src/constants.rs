/// Per-aspect KDF salt length in bytes.
pub const SALT_LEN: usize = 128;

/// PBKDF2 iterations for per-aspect key derivation.
///
/// Compile-time constant: changing it invalidates every stored item, because
/// the verifier of an existing row can no longer be recomputed.
pub const PBKDF2_ITERATIONS: u32 = 65_536;

/// Derived key length in bytes (AES-256).
pub const KEY_LEN: usize = 32;

/// Stored verifier length in bytes (SHAKE-256 output).
pub const VERIFIER_LEN: usize = 32;

/// AES block size, also the CFB IV length.
pub const IV_LEN: usize = 16;

/// Password alphabet without visually ambiguous glyphs (0/O/o, 1/l/I).
pub const PASSWORD_ALPHABET: &[u8] = b"23456789ABCDEFGHJKLMNPQRSTUVWXYZabcdefghijkmnpqrstuvwxyz";
