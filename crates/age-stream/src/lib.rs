//! Chunked ChaCha20-Poly1305 streaming AEAD for the age payload format.
//!
//! A payload is one or more `ENCRYPTED_CHUNK_SIZE`-byte ciphertext chunks,
//! each sealed under a per-chunk nonce derived from a monotonically
//! increasing counter plus a terminal-chunk marker byte. Exactly the last
//! chunk carries the marker.

mod error;
mod reader;
mod random_access;
mod writer;

pub use error::{Error, Result};
pub use reader::StreamReader;
pub use random_access::RandomAccessReader;
pub use writer::StreamWriter;

use chacha20poly1305::Nonce;
use hkdf::Hkdf;
use sha2::Sha256;

/// Plaintext bytes per chunk before the last.
pub const CHUNK_SIZE: usize = 65_536;
/// ChaCha20-Poly1305 tag length appended to each chunk.
pub const AEAD_OVERHEAD: usize = 16;
/// Ciphertext size of a full (non-final) chunk.
pub const ENCRYPTED_CHUNK_SIZE: usize = CHUNK_SIZE + AEAD_OVERHEAD;

/// Derives the payload stream key from the file key and the 16-byte
/// payload nonce written immediately after the header (spec.md §4.8):
/// `K_s = HKDF-SHA256(file_key, salt=nonce16, info="payload")[0..32]`.
pub fn derive_stream_key(file_key: &[u8; 16], nonce16: &[u8; 16]) -> [u8; 32] {
    let hk = Hkdf::<Sha256>::new(Some(nonce16), file_key);
    let mut key = [0u8; 32];
    hk.expand(b"payload", &mut key).expect("32 is a valid HKDF-SHA256 output length");
    key
}

/// Builds the 12-byte chunk nonce: an 11-byte big-endian counter (only the
/// low 8 bytes are ever non-zero — 2^64 chunks is already far beyond any
/// file this engine will stream) followed by the terminal marker byte.
pub(crate) fn chunk_nonce(counter: u64, terminal: bool) -> Nonce {
    let mut bytes = [0u8; 12];
    bytes[3..11].copy_from_slice(&counter.to_be_bytes());
    bytes[11] = u8::from(terminal);
    Nonce::from(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nonce_distinguishes_terminal_marker() {
        let a = chunk_nonce(3, false);
        let b = chunk_nonce(3, true);
        assert_ne!(a, b);
        assert_eq!(a[11], 0x00);
        assert_eq!(b[11], 0x01);
    }

    #[test]
    fn nonce_distinguishes_counters() {
        let a = chunk_nonce(0, false);
        let b = chunk_nonce(1, false);
        assert_ne!(a, b);
    }

    #[test]
    fn stream_key_is_deterministic() {
        let file_key = [7u8; 16];
        let nonce16 = [9u8; 16];
        let k1 = derive_stream_key(&file_key, &nonce16);
        let k2 = derive_stream_key(&file_key, &nonce16);
        assert_eq!(k1, k2);
        let k3 = derive_stream_key(&file_key, &[0u8; 16]);
        assert_ne!(k1, k3);
    }
}
