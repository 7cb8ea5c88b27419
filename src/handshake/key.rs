//! Key exchange.

use super::GUID;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use sha1::{Digest, Sha1};

/// Generate a new `sec-websocket-key`: 16 random bytes, standard
/// Base64.
#[inline]
pub fn new_sec_key() -> [u8; 24] {
    let input: [u8; 16] = rand::random();
    let mut output = [0_u8; 24];
    Engine::encode_slice(&STANDARD, input, &mut output).unwrap();
    output
}

/// Derive `sec-websocket-accept` from `sec-websocket-key`:
/// Base64(SHA-1(key ++ GUID)).
#[inline]
pub fn derive_accept_key(sec_key: &[u8]) -> [u8; 28] {
    let mut sha1 = Sha1::default();
    sha1.update(sec_key);
    sha1.update(GUID);
    let input = sha1.finalize();
    let mut output = [0_u8; 28];
    Engine::encode_slice(&STANDARD, input, &mut output).unwrap();
    output
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn generate_sec_key() {
        for _ in 0..=1024 {
            // should not panic, and must be valid base64 of 16 bytes
            let key = new_sec_key();
            let decoded = STANDARD.decode(key).unwrap();
            assert_eq!(decoded.len(), 16);
        }
    }

    #[test]
    fn derive_sec_key() {
        assert_eq!(
            &derive_accept_key(b"dGhlIHNhbXBsZSBub25jZQ=="),
            b"s3pPLMBiTxaQ9kYGzzhZRbK+xOo="
        );
    }
}
