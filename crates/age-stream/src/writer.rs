use aead::{Aead, KeyInit};
use chacha20poly1305::ChaCha20Poly1305;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use zeroize::Zeroize;

use crate::{chunk_nonce, Error, Result, CHUNK_SIZE};

/// Buffers plaintext into `CHUNK_SIZE` windows and emits sealed chunks to
/// `inner`, marking exactly the final chunk as terminal on `close`.
///
/// A chunk is only emitted once the buffer holds MORE than `CHUNK_SIZE`
/// bytes — a buffer sitting at exactly `CHUNK_SIZE` is held back, since it
/// might turn out to be the final (terminal) chunk.
pub struct StreamWriter<W> {
    inner: W,
    cipher: ChaCha20Poly1305,
    buf: Vec<u8>,
    counter: u64,
    closed: bool,
}

impl<W> std::fmt::Debug for StreamWriter<W> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamWriter")
            .field("counter", &self.counter)
            .field("closed", &self.closed)
            .finish_non_exhaustive()
    }
}

impl<W: AsyncWrite + Unpin> StreamWriter<W> {
    pub fn new(inner: W, stream_key: [u8; 32]) -> Self {
        let cipher = ChaCha20Poly1305::new_from_slice(&stream_key).expect("32-byte key");
        StreamWriter {
            inner,
            cipher,
            buf: Vec::with_capacity(CHUNK_SIZE),
            counter: 0,
            closed: false,
        }
    }

    /// Buffers `data`, flushing any now-full non-terminal chunks.
    pub async fn write_all(&mut self, data: &[u8]) -> Result<()> {
        if self.closed {
            return Err(Error::MalformedCiphertext("write after close"));
        }
        self.buf.extend_from_slice(data);
        while self.buf.len() > CHUNK_SIZE {
            self.seal_and_emit(CHUNK_SIZE, false).await?;
        }
        Ok(())
    }

    /// Flushes the buffered remainder (possibly empty, possibly a full
    /// `CHUNK_SIZE`) as the terminal chunk, and returns the inner sink.
    pub async fn close(mut self) -> Result<W> {
        let remaining = self.buf.len();
        self.seal_and_emit(remaining, true).await?;
        self.closed = true;
        self.inner.flush().await?;
        Ok(self.inner)
    }

    async fn seal_and_emit(&mut self, take: usize, terminal: bool) -> Result<()> {
        let nonce = chunk_nonce(self.counter, terminal);
        let mut plaintext: Vec<u8> = self.buf.drain(..take).collect();
        let ciphertext = self
            .cipher
            .encrypt(&nonce, plaintext.as_slice())
            .map_err(|_| Error::MalformedCiphertext("chunk seal failure"))?;
        plaintext.zeroize();
        self.inner.write_all(&ciphertext).await?;
        self.counter = self.counter.checked_add(1).ok_or(Error::CounterOverflow)?;
        Ok(())
    }
}
