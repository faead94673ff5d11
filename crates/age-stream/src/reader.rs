use aead::{Aead, KeyInit};
use chacha20poly1305::ChaCha20Poly1305;
use tokio::io::{AsyncRead, AsyncReadExt};

use crate::{chunk_nonce, Error, Result, ENCRYPTED_CHUNK_SIZE};

/// Decrypts one chunk per advance. The trailing nonce byte is never read
/// off the wire — the decoder tries the non-terminal nonce first and
/// falls back to the terminal one, per spec.md §4.8's explicit allowance
/// ("implementations MAY always try both and pick the succeeding one").
pub struct StreamReader<R> {
    inner: R,
    cipher: ChaCha20Poly1305,
    counter: u64,
    finished: bool,
}

impl<R> std::fmt::Debug for StreamReader<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamReader")
            .field("counter", &self.counter)
            .field("finished", &self.finished)
            .finish_non_exhaustive()
    }
}

impl<R: AsyncRead + Unpin> StreamReader<R> {
    pub fn new(inner: R, stream_key: [u8; 32]) -> Self {
        let cipher = ChaCha20Poly1305::new_from_slice(&stream_key).expect("32-byte key");
        StreamReader {
            inner,
            cipher,
            counter: 0,
            finished: false,
        }
    }

    /// Returns the next decrypted chunk, or `None` once the terminal
    /// chunk has already been returned.
    pub async fn next_chunk(&mut self) -> Result<Option<Vec<u8>>> {
        if self.finished {
            return Ok(None);
        }

        let mut frame = vec![0u8; ENCRYPTED_CHUNK_SIZE];
        let n = read_fill(&mut self.inner, &mut frame).await?;
        if n == 0 {
            return Err(Error::UnexpectedEof);
        }
        frame.truncate(n);

        let nonce_nt = chunk_nonce(self.counter, false);
        if let Ok(plaintext) = self.cipher.decrypt(&nonce_nt, frame.as_slice()) {
            self.counter = self.counter.checked_add(1).ok_or(Error::CounterOverflow)?;
            return Ok(Some(plaintext));
        }

        let nonce_t = chunk_nonce(self.counter, true);
        match self.cipher.decrypt(&nonce_t, frame.as_slice()) {
            Ok(plaintext) => {
                self.finished = true;
                Ok(Some(plaintext))
            }
            Err(_) => Err(Error::CiphertextTampered),
        }
    }
}

async fn read_fill(r: &mut (impl AsyncRead + Unpin), buf: &mut [u8]) -> Result<usize> {
    let mut total = 0;
    while total < buf.len() {
        let n = r.read(&mut buf[total..]).await?;
        if n == 0 {
            break;
        }
        total += n;
    }
    Ok(total)
}
