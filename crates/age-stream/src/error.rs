use thiserror::Error;

/// Errors surfaced by the streaming AEAD payload engine.
///
/// `IncorrectIdentity`-style recovery does not apply here: every variant
/// is a hard failure of the payload stream itself, to be surfaced to the
/// caller verbatim (spec.md §7 propagation policy).
#[derive(Debug, Error)]
pub enum Error {
    #[error("ciphertext chunk failed authentication")]
    CiphertextTampered,

    #[error("payload ended before a terminal chunk was seen")]
    UnexpectedEof,

    #[error("stream framing invariant violated: {0}")]
    MalformedCiphertext(&'static str),

    #[error("requested offset is out of range")]
    OffsetOutOfRange,

    #[error("chunk counter exhausted")]
    CounterOverflow,

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
