//! Encrypt/Decrypt (spec.md §4.10): the dispatch loop that turns a set
//! of recipients/identities plus an I/O sink/source into a ready-to-use
//! [`age_stream::StreamWriter`]/[`age_stream::StreamReader`]. All
//! blocking happens inside the caller-provided `AsyncRead`/`AsyncWrite`
//! — this module owns no file paths.

use std::io::Cursor;

use age_stream::{derive_stream_key, RandomAccessReader, StreamReader, StreamWriter};
use rand_core::{OsRng, RngCore};
use secrecy::{ExposeSecret, Secret};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncSeek, AsyncWrite, AsyncWriteExt, Chain};

use crate::error::{Error, Result};
use crate::header::{self, Header, ParsedHeader};
use crate::recipient::{Identity, Match, Recipient};
use crate::stanza::Stanza;

const POSTQUANTUM_LABEL: &str = "postquantum";
const SCRYPT_KIND: &str = "scrypt";
/// Read granularity while growing the header probe buffer. Any realistic
/// 20-stanza header fits in a handful of these.
const HEADER_PROBE_SIZE: usize = 4096;

/// §4.10 Encrypt steps 1-6: validates the recipient set, wraps a fresh
/// file key under each recipient, writes the header and payload nonce,
/// and returns a writer ready to stream plaintext chunks into `dst`.
pub async fn encrypt<W: AsyncWrite + Unpin>(
    mut dst: W,
    recipients: &[&dyn Recipient],
) -> Result<StreamWriter<W>> {
    if recipients.is_empty() {
        return Err(Error::NoRecipients);
    }
    if recipients.iter().any(|r| r.kind() == SCRYPT_KIND) && recipients.len() > 1 {
        return Err(Error::ScryptMustBeSole);
    }
    check_label_mix(recipients)?;

    let mut file_key_bytes = [0u8; 16];
    OsRng.fill_bytes(&mut file_key_bytes);
    let file_key = Secret::new(file_key_bytes);

    let mut stanzas = Vec::with_capacity(recipients.len());
    for recipient in recipients {
        stanzas.push(recipient.wrap(file_key.expose_secret())?);
    }
    let header = Header::new(stanzas)?;

    let header_bytes = header::serialize(&header, file_key.expose_secret());
    dst.write_all(&header_bytes).await?;

    let mut nonce16 = [0u8; 16];
    OsRng.fill_bytes(&mut nonce16);
    dst.write_all(&nonce16).await?;

    let stream_key = derive_stream_key(file_key.expose_secret(), &nonce16);
    Ok(StreamWriter::new(dst, stream_key))
}

/// §4.10 Decrypt over a forward-only source. Any bytes read past the
/// payload nonce while probing for the header's end are payload bytes
/// already consumed from `src`; they are prepended back via [`Chain`]
/// so the returned reader sees the exact same byte stream `src` would
/// have produced.
pub async fn decrypt<R: AsyncRead + Unpin>(
    mut src: R,
    identities: &[&dyn Identity],
) -> Result<StreamReader<Chain<Cursor<Vec<u8>>, R>>> {
    let (file_key, nonce16, leftover, _header_and_nonce_len) =
        read_header(&mut src, identities).await?;
    let stream_key = derive_stream_key(file_key.expose_secret(), &nonce16);
    let chained = Cursor::new(leftover).chain(src);
    Ok(StreamReader::new(chained, stream_key))
}

/// Like [`decrypt`], but for sources that support seeking: builds a
/// [`RandomAccessReader`] instead of a sequential one (spec.md §4.8's
/// random-access reader scenario). The header probe may read ahead of
/// the payload nonce, but since `src` can seek, there is no need to
/// preserve the leftover bytes — `PayloadView` simply re-bases every
/// seek the random-access reader issues to the payload's real offset.
pub async fn decrypt_seekable<R: AsyncRead + AsyncSeek + Unpin>(
    mut src: R,
    identities: &[&dyn Identity],
    ciphertext_len: u64,
) -> Result<RandomAccessReader<PayloadView<R>>> {
    let (file_key, nonce16, _leftover, header_and_nonce_len) =
        read_header(&mut src, identities).await?;
    let stream_key = derive_stream_key(file_key.expose_secret(), &nonce16);

    let payload_len = ciphertext_len
        .checked_sub(header_and_nonce_len)
        .ok_or(Error::MalformedHeader("ciphertext shorter than its own header"))?;

    let view = PayloadView {
        inner: src,
        base: header_and_nonce_len,
    };
    Ok(RandomAccessReader::new(view, stream_key, payload_len).await?)
}

fn check_label_mix(recipients: &[&dyn Recipient]) -> Result<()> {
    let postquantum_count = recipients
        .iter()
        .filter(|r| r.labels().contains(&POSTQUANTUM_LABEL))
        .count();
    if postquantum_count > 0 && postquantum_count < recipients.len() {
        return Err(Error::LabelMixViolation);
    }
    Ok(())
}

/// Grows a probe buffer until [`header::parse`] succeeds, unwraps the
/// file key, verifies the MAC, and reads the 16-byte payload nonce that
/// immediately follows. Returns `(file_key, nonce16, leftover,
/// header_and_nonce_len)` where `leftover` is whatever payload bytes
/// were over-read past the nonce and `header_and_nonce_len` is the
/// absolute byte offset at which the payload begins.
async fn read_header<R: AsyncRead + Unpin>(
    src: &mut R,
    identities: &[&dyn Identity],
) -> Result<(Secret<[u8; 16]>, [u8; 16], Vec<u8>, u64)> {
    if identities.is_empty() {
        return Err(Error::NoMatchingIdentity);
    }

    let mut buf = Vec::new();
    let parsed: ParsedHeader = loop {
        let mut chunk = [0u8; HEADER_PROBE_SIZE];
        let n = src.read(&mut chunk).await?;
        if n == 0 {
            return Err(Error::MalformedHeader(
                "input ended before a complete header",
            ));
        }
        buf.extend_from_slice(&chunk[..n]);
        match header::parse(&buf) {
            Ok(parsed) => break parsed,
            Err(Error::MalformedHeader(
                "unterminated header line" | "header ended before the MAC line",
            )) => continue,
            Err(e) => return Err(e),
        }
    };

    let file_key = Secret::new(unwrap_file_key(&parsed.header.stanzas, identities)?);
    parsed.verify_mac(file_key.expose_secret())?;

    while buf.len() < parsed.consumed + 16 {
        let mut chunk = [0u8; HEADER_PROBE_SIZE];
        let n = src.read(&mut chunk).await?;
        if n == 0 {
            return Err(Error::MalformedHeader("input ended before the payload nonce"));
        }
        buf.extend_from_slice(&chunk[..n]);
    }

    let mut nonce16 = [0u8; 16];
    nonce16.copy_from_slice(&buf[parsed.consumed..parsed.consumed + 16]);
    let leftover = buf[parsed.consumed + 16..].to_vec();
    let header_and_nonce_len = (parsed.consumed + 16) as u64;

    Ok((file_key, nonce16, leftover, header_and_nonce_len))
}

fn unwrap_file_key(stanzas: &[Stanza], identities: &[&dyn Identity]) -> Result<[u8; 16]> {
    for stanza in stanzas {
        for identity in identities {
            if identity.kind() != stanza.kind {
                continue;
            }
            match identity.matches(stanza)? {
                Match::Incorrect => continue,
                Match::Ok => {}
            }
            match identity.unwrap(stanza) {
                Ok(file_key) => return Ok(file_key),
                Err(Error::IncorrectIdentity) => continue,
                Err(e) => return Err(e),
            }
        }
    }
    Err(Error::NoMatchingIdentity)
}

/// Re-bases every seek an inner [`AsyncSeek`] receives by a fixed
/// offset, so position 0 reads as the start of the payload even though
/// the underlying source also carries the header ahead of it.
pub struct PayloadView<R> {
    inner: R,
    base: u64,
}

impl<R: AsyncRead + Unpin> AsyncRead for PayloadView<R> {
    fn poll_read(
        self: std::pin::Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
        buf: &mut tokio::io::ReadBuf<'_>,
    ) -> std::task::Poll<std::io::Result<()>> {
        let this = self.get_mut();
        std::pin::Pin::new(&mut this.inner).poll_read(cx, buf)
    }
}

impl<R: AsyncSeek + Unpin> AsyncSeek for PayloadView<R> {
    fn start_seek(self: std::pin::Pin<&mut Self>, position: std::io::SeekFrom) -> std::io::Result<()> {
        let this = self.get_mut();
        let adjusted = match position {
            std::io::SeekFrom::Start(n) => std::io::SeekFrom::Start(this.base + n),
            other => other,
        };
        std::pin::Pin::new(&mut this.inner).start_seek(adjusted)
    }

    fn poll_complete(
        self: std::pin::Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<std::io::Result<u64>> {
        let this = self.get_mut();
        let base = this.base;
        match std::pin::Pin::new(&mut this.inner).poll_complete(cx) {
            std::task::Poll::Ready(Ok(absolute)) => {
                std::task::Poll::Ready(Ok(absolute.saturating_sub(base)))
            }
            other => other,
        }
    }
}
