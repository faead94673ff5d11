//! Header codec, recipient/identity dispatch, and bech32 key encoding
//! for the age file format. The streaming AEAD payload engine lives in
//! the sibling `age-stream` crate; this crate wires it to a header and
//! a set of [`Recipient`]/[`Identity`] implementations.
//!
//! ```no_run
//! # async fn example() -> age_core::Result<()> {
//! use age_core::recipient::x25519::{X25519Identity, X25519Recipient};
//! use x25519_dalek::{PublicKey, StaticSecret};
//!
//! let secret = StaticSecret::random_from_rng(rand_core::OsRng);
//! let recipient = X25519Recipient::new(PublicKey::from(&secret));
//!
//! let mut ciphertext = Vec::new();
//! let mut writer = age_core::encrypt(&mut ciphertext, &[&recipient]).await?;
//! writer.write_all(b"plaintext").await?;
//! writer.close().await?;
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod header;
pub mod keys;
pub mod orchestrator;
pub mod pq;
pub mod recipient;
pub mod stanza;

pub use error::{Error, Result};
pub use orchestrator::{decrypt, decrypt_seekable, encrypt, PayloadView};
pub use recipient::{Identity, Match, Recipient};
