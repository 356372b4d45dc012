//! Username validation.
//!
//! A username is valid when it is 1-20 bytes long and every byte is an ASCII
//! letter, digit, underscore, or hyphen. The check is byte-wise, not
//! Unicode-aware, matching what lightweight browser clients actually send.

use std::sync::OnceLock;

const MIN_LEN: usize = 1;
const MAX_LEN: usize = 20;

fn allowed_table() -> &'static [bool; 256] {
    static TABLE: OnceLock<[bool; 256]> = OnceLock::new();
    TABLE.get_or_init(|| {
        let mut table = [false; 256];
        for b in b'A'..=b'Z' {
            table[b as usize] = true;
        }
        for b in b'a'..=b'z' {
            table[b as usize] = true;
        }
        for b in b'0'..=b'9' {
            table[b as usize] = true;
        }
        table[b'_' as usize] = true;
        table[b'-' as usize] = true;
        table
    })
}

/// Returns `true` iff `username` is 1-20 bytes and every byte is in
/// `[A-Za-z0-9_-]`.
pub fn validate(username: &str) -> bool {
    let bytes = username.as_bytes();
    if bytes.len() < MIN_LEN || bytes.len() > MAX_LEN {
        return false;
    }
    let table = allowed_table();
    bytes.iter().all(|&b| table[b as usize])
}
