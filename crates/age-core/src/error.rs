use thiserror::Error;

/// The error taxonomy of spec.md §7. `IncorrectIdentity` is the only
/// variant ever recovered locally — by the dispatch loop in
/// [`crate::orchestrator::decrypt`] — every other variant surfaces to the
/// caller verbatim or with one layer of context.
#[derive(Debug, Error)]
pub enum Error {
    #[error("identity does not match this stanza")]
    IncorrectIdentity,

    #[error("no identity unwrapped any stanza")]
    NoMatchingIdentity,

    #[error("header MAC does not match: tampered or wrong file key")]
    HeaderMacMismatch,

    #[error("malformed header: {0}")]
    MalformedHeader(&'static str),

    #[error("a scrypt stanza must be the only stanza in the header")]
    ScryptMustBeSole,

    #[error("postquantum recipient mixed with a non-postquantum recipient")]
    LabelMixViolation,

    #[error("scrypt work factor exceeds the configured maximum")]
    WorkFactorTooLarge,

    #[error("ciphertext chunk failed authentication")]
    CiphertextTampered,

    #[error("payload ended before the terminal chunk arrived")]
    UnexpectedEof,

    #[error("stream framing invariant broken: {0}")]
    MalformedCiphertext(&'static str),

    #[error("primitive failure: {0}")]
    PrimitiveFailure(String),

    #[error("encryption requires at least one recipient")]
    NoRecipients,

    #[error("header carries more than 20 stanzas")]
    TooManyRecipients,

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

impl From<age_stream::Error> for Error {
    fn from(e: age_stream::Error) -> Self {
        match e {
            age_stream::Error::CiphertextTampered => Error::CiphertextTampered,
            age_stream::Error::UnexpectedEof => Error::UnexpectedEof,
            age_stream::Error::MalformedCiphertext(why) => Error::MalformedCiphertext(why),
            age_stream::Error::OffsetOutOfRange => {
                Error::MalformedCiphertext("offset out of range")
            }
            age_stream::Error::CounterOverflow => Error::PrimitiveFailure("chunk counter overflow".into()),
            age_stream::Error::Io(io) => Error::Io(io),
        }
    }
}
