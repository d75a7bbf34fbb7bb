use rand::Rng;
use sha2::{Digest, Sha256};

/// RFC 4648 base32 alphabet; 26 characters carry the entropy of 16 random
/// bytes, matching the token length shown to users in emails.
const BASE32_ALPHABET: &[u8; 32] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ234567";
pub const PLAINTEXT_LEN: usize = 26;

/// Generates a fresh action-token plaintext and the SHA-256 digest that gets
/// persisted. The plaintext leaves the system exactly once, via email.
pub fn generate() -> (String, [u8; 32]) {
    let mut rng = rand::thread_rng();
    let plaintext: String = (0..PLAINTEXT_LEN)
        .map(|_| BASE32_ALPHABET[rng.gen_range(0..BASE32_ALPHABET.len())] as char)
        .collect();
    let hash = digest(&plaintext);
    (plaintext, hash)
}

pub fn digest(plaintext: &str) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(plaintext.as_bytes());
    hasher.finalize().into()
}

pub fn is_well_formed(plaintext: &str) -> bool {
    plaintext.len() == PLAINTEXT_LEN
        && plaintext.bytes().all(|b| BASE32_ALPHABET.contains(&b))
}
