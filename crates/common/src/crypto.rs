use sha2::{Digest, Sha256};

/// Hex SHA-256 digest of `input`, lower-case.
pub fn sha256_hex(input: &str) -> String {
    hex::encode(Sha256::digest(input.as_bytes()))
}

/// Short, stable tag for an identifier: the first `len` hex digits of its
/// digest, upper-cased.
pub fn short_tag(input: &str, len: usize) -> String {
    let mut tag = sha256_hex(input);
    tag.truncate(len);
    tag.to_uppercase()
}
