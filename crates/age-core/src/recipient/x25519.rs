use chacha20poly1305::aead::{Aead, KeyInit};
use chacha20poly1305::{ChaCha20Poly1305, Nonce};
use hkdf::Hkdf;
use rand_core::OsRng;
use sha2::Sha256;
use x25519_dalek::{EphemeralSecret, PublicKey, StaticSecret};
use zeroize::Zeroize;

use crate::error::{Error, Result};
use crate::recipient::{Identity, Recipient};
use crate::stanza::{self, Stanza};

const STANZA_TYPE: &str = "X25519";
const WRAP_INFO: &[u8] = b"age-encryption.org/v1/X25519";
const ZERO_NONCE: [u8; 12] = [0u8; 12];

/// §4.3: wraps under an ephemeral-static Diffie-Hellman exchange.
pub struct X25519Recipient {
    public: PublicKey,
}

impl X25519Recipient {
    pub fn new(public: PublicKey) -> Self {
        X25519Recipient { public }
    }
}

impl Recipient for X25519Recipient {
    fn kind(&self) -> &'static str {
        STANZA_TYPE
    }

    fn wrap(&self, file_key: &[u8; 16]) -> Result<Stanza> {
        let ephemeral = EphemeralSecret::random_from_rng(OsRng);
        let ephemeral_public = PublicKey::from(&ephemeral);
        let shared = ephemeral.diffie_hellman(&self.public);
        if shared.as_bytes() == &[0u8; 32] {
            return Err(Error::PrimitiveFailure(
                "X25519 ECDH produced a degenerate (low-order) shared secret".into(),
            ));
        }

        let wrap_key = derive_wrap_key(
            shared.as_bytes(),
            ephemeral_public.as_bytes(),
            self.public.as_bytes(),
        );
        let cipher = ChaCha20Poly1305::new_from_slice(&wrap_key).expect("32-byte key");
        let ciphertext = cipher
            .encrypt(Nonce::from_slice(&ZERO_NONCE), file_key.as_slice())
            .map_err(|_| Error::PrimitiveFailure("X25519 wrap seal failure".into()))?;

        Ok(Stanza::new(
            STANZA_TYPE,
            vec![stanza::encode(ephemeral_public.as_bytes())],
            ciphertext,
        ))
    }
}

/// §4.3 identity side: the scalar that unwraps `X25519Recipient` stanzas.
pub struct X25519Identity {
    secret: StaticSecret,
    public: PublicKey,
}

impl X25519Identity {
    pub fn new(secret: StaticSecret) -> Self {
        let public = PublicKey::from(&secret);
        X25519Identity { secret, public }
    }
}

impl Identity for X25519Identity {
    fn kind(&self) -> &'static str {
        STANZA_TYPE
    }

    fn unwrap(&self, stanza: &Stanza) -> Result<[u8; 16]> {
        if stanza.kind != STANZA_TYPE {
            return Err(Error::IncorrectIdentity);
        }
        let [arg] = stanza.args.as_slice() else {
            return Err(Error::IncorrectIdentity);
        };
        let ephemeral_bytes = stanza::decode_strict(arg).map_err(|_| Error::IncorrectIdentity)?;
        let ephemeral_bytes: [u8; 32] = ephemeral_bytes
            .try_into()
            .map_err(|_| Error::IncorrectIdentity)?;
        let ephemeral_public = PublicKey::from(ephemeral_bytes);

        let shared = self.secret.diffie_hellman(&ephemeral_public);
        if shared.as_bytes() == &[0u8; 32] {
            return Err(Error::IncorrectIdentity);
        }

        let wrap_key = derive_wrap_key(shared.as_bytes(), &ephemeral_bytes, self.public.as_bytes());
        let cipher = ChaCha20Poly1305::new_from_slice(&wrap_key).expect("32-byte key");
        let mut plaintext = cipher
            .decrypt(Nonce::from_slice(&ZERO_NONCE), stanza.body.as_slice())
            .map_err(|_| Error::IncorrectIdentity)?;

        if plaintext.len() != 16 {
            plaintext.zeroize();
            return Err(Error::IncorrectIdentity);
        }
        let mut file_key = [0u8; 16];
        file_key.copy_from_slice(&plaintext);
        plaintext.zeroize();
        Ok(file_key)
    }
}

fn derive_wrap_key(shared: &[u8], ephemeral_public: &[u8], recipient_public: &[u8]) -> [u8; 32] {
    let mut salt = Vec::with_capacity(64);
    salt.extend_from_slice(ephemeral_public);
    salt.extend_from_slice(recipient_public);
    let hk = Hkdf::<Sha256>::new(Some(&salt), shared);
    let mut key = [0u8; 32];
    hk.expand(WRAP_INFO, &mut key)
        .expect("32 is a valid HKDF-SHA256 output length");
    key
}
