use std::io::SeekFrom;

use aead::{Aead, KeyInit};
use chacha20poly1305::ChaCha20Poly1305;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncSeek, AsyncSeekExt};
use tokio::sync::Mutex;

use crate::{chunk_nonce, Error, Result, AEAD_OVERHEAD, CHUNK_SIZE, ENCRYPTED_CHUNK_SIZE};

struct State<R> {
    inner: R,
    cache_index: Option<u64>,
    cache_plaintext: Vec<u8>,
}

/// Random access over an encrypted payload of known total ciphertext
/// size. The final chunk is authenticated eagerly at construction, which
/// both establishes the stream is well-formed and seeds the one-chunk
/// cache. All reads — including concurrent ones — go through a single
/// lock guarding both the cache and the AEAD invocation (spec.md §5:
/// "one lock around cache + AEAD invocations is sufficient").
pub struct RandomAccessReader<R> {
    state: Mutex<State<R>>,
    cipher: ChaCha20Poly1305,
    ciphertext_len: u64,
    plaintext_len: u64,
    last_chunk_index: u64,
}

impl<R: AsyncRead + AsyncSeek + Unpin> RandomAccessReader<R> {
    pub async fn new(mut inner: R, stream_key: [u8; 32], ciphertext_len: u64) -> Result<Self> {
        let cipher = ChaCha20Poly1305::new_from_slice(&stream_key).expect("32-byte key");
        if ciphertext_len < AEAD_OVERHEAD as u64 {
            return Err(Error::MalformedCiphertext("ciphertext shorter than one AEAD tag"));
        }

        let last_chunk_index = (ciphertext_len - 1) / ENCRYPTED_CHUNK_SIZE as u64;
        let last_chunk_offset = last_chunk_index * ENCRYPTED_CHUNK_SIZE as u64;
        let last_chunk_ct_len = (ciphertext_len - last_chunk_offset) as usize;

        // An empty non-first terminal chunk (AEAD_OVERHEAD bytes only) is
        // malformed unless it is the sole chunk (empty plaintext).
        if last_chunk_ct_len == AEAD_OVERHEAD && last_chunk_index != 0 {
            return Err(Error::MalformedCiphertext("empty non-first terminal chunk"));
        }

        inner.seek(SeekFrom::Start(last_chunk_offset)).await?;
        let mut frame = vec![0u8; last_chunk_ct_len];
        inner
            .read_exact(&mut frame)
            .await
            .map_err(|_| Error::UnexpectedEof)?;

        let nonce = chunk_nonce(last_chunk_index, true);
        let plaintext = cipher
            .decrypt(&nonce, frame.as_slice())
            .map_err(|_| Error::CiphertextTampered)?;

        let plaintext_len = last_chunk_index * CHUNK_SIZE as u64 + plaintext.len() as u64;

        Ok(RandomAccessReader {
            state: Mutex::new(State {
                inner,
                cache_index: Some(last_chunk_index),
                cache_plaintext: plaintext,
            }),
            cipher,
            ciphertext_len,
            plaintext_len,
            last_chunk_index,
        })
    }

    pub fn plaintext_len(&self) -> u64 {
        self.plaintext_len
    }

    /// Reads into `buf` starting at plaintext offset `off`, returning the
    /// number of bytes written and whether the read reached end-of-stream.
    pub async fn read_at(&self, buf: &mut [u8], off: u64) -> Result<(usize, bool)> {
        if off > self.plaintext_len {
            return Err(Error::OffsetOutOfRange);
        }
        if off == self.plaintext_len {
            return Ok((0, true));
        }
        if buf.is_empty() {
            return Ok((0, false));
        }

        let mut written = 0usize;
        let mut cursor = off;
        while written < buf.len() && cursor < self.plaintext_len {
            let chunk_index = cursor / CHUNK_SIZE as u64;
            let intra = (cursor - chunk_index * CHUNK_SIZE as u64) as usize;
            let chunk = self.fetch_chunk(chunk_index).await?;
            let available = chunk.len() - intra;
            let n = available.min(buf.len() - written);
            buf[written..written + n].copy_from_slice(&chunk[intra..intra + n]);
            written += n;
            cursor += n as u64;
        }
        let eof = cursor == self.plaintext_len;
        Ok((written, eof))
    }

    async fn fetch_chunk(&self, index: u64) -> Result<Vec<u8>> {
        let mut state = self.state.lock().await;
        if state.cache_index == Some(index) {
            return Ok(state.cache_plaintext.clone());
        }

        let offset = index * ENCRYPTED_CHUNK_SIZE as u64;
        let len = if index == self.last_chunk_index {
            (self.ciphertext_len - offset) as usize
        } else {
            ENCRYPTED_CHUNK_SIZE
        };

        state.inner.seek(SeekFrom::Start(offset)).await?;
        let mut frame = vec![0u8; len];
        state
            .inner
            .read_exact(&mut frame)
            .await
            .map_err(|_| Error::UnexpectedEof)?;

        let terminal = index == self.last_chunk_index;
        let nonce = chunk_nonce(index, terminal);
        let plaintext = self
            .cipher
            .decrypt(&nonce, frame.as_slice())
            .map_err(|_| Error::CiphertextTampered)?;

        state.cache_index = Some(index);
        state.cache_plaintext = plaintext.clone();
        Ok(plaintext)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::writer::StreamWriter;
    use std::io::Cursor;

    async fn seal(plaintext: &[u8], key: [u8; 32]) -> Vec<u8> {
        let mut ct = Vec::new();
        let mut w = StreamWriter::new(&mut ct, key);
        w.write_all(plaintext).await.unwrap();
        w.close().await.unwrap();
        ct
    }

    #[tokio::test]
    async fn read_at_matches_plaintext_across_chunk_boundary() {
        let key = [4u8; 32];
        let len = 2 * CHUNK_SIZE + 500;
        let pt: Vec<u8> = (0..len).map(|i| (i % 253) as u8).collect();
        let ct = seal(&pt, key).await;
        let total = ct.len() as u64;
        let reader = RandomAccessReader::new(Cursor::new(ct), key, total).await.unwrap();

        let mut buf = [0u8; 1000];
        let (n, eof) = reader.read_at(&mut buf, (2 * CHUNK_SIZE + 400) as u64).await.unwrap();
        assert_eq!(n, 100);
        assert!(eof);
        assert_eq!(&buf[..n], &pt[2 * CHUNK_SIZE + 400..2 * CHUNK_SIZE + 500]);
    }

    #[tokio::test]
    async fn read_at_offset_equal_to_len_is_eof() {
        let key = [1u8; 32];
        let pt = vec![0x9u8; 10];
        let ct = seal(&pt, key).await;
        let total = ct.len() as u64;
        let reader = RandomAccessReader::new(Cursor::new(ct), key, total).await.unwrap();
        let mut buf = [0u8; 4];
        let (n, eof) = reader.read_at(&mut buf, 10).await.unwrap();
        assert_eq!(n, 0);
        assert!(eof);
    }

    #[tokio::test]
    async fn read_at_offset_beyond_len_errors() {
        let key = [1u8; 32];
        let pt = vec![0x9u8; 10];
        let ct = seal(&pt, key).await;
        let total = ct.len() as u64;
        let reader = RandomAccessReader::new(Cursor::new(ct), key, total).await.unwrap();
        let mut buf = [0u8; 4];
        assert!(reader.read_at(&mut buf, 11).await.is_err());
    }

    #[tokio::test]
    async fn truncating_last_chunk_to_empty_is_malformed_unless_sole_chunk() {
        let key = [1u8; 32];
        let pt = vec![0x22u8; CHUNK_SIZE + 5];
        let mut ct = seal(&pt, key).await;
        // Truncate so the second (terminal) chunk becomes AEAD_OVERHEAD-only.
        ct.truncate(ENCRYPTED_CHUNK_SIZE + crate::AEAD_OVERHEAD);
        let total = ct.len() as u64;
        let err = RandomAccessReader::new(Cursor::new(ct), key, total).await.unwrap_err();
        assert!(matches!(err, Error::MalformedCiphertext(_)));
    }

    #[tokio::test]
    async fn empty_plaintext_is_a_single_chunk() {
        let key = [1u8; 32];
        let ct = seal(&[], key).await;
        let total = ct.len() as u64;
        let reader = RandomAccessReader::new(Cursor::new(ct), key, total).await.unwrap();
        assert_eq!(reader.plaintext_len(), 0);
    }
}
