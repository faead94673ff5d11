use chacha20poly1305::aead::{Aead, KeyInit};
use chacha20poly1305::{ChaCha20Poly1305, Nonce};
use curve25519_dalek::edwards::CompressedEdwardsY;
use hkdf::Hkdf;
use rand_core::{OsRng, RngCore};
use sha2::{Digest, Sha256, Sha512};
use x25519_dalek::{x25519, X25519_BASEPOINT_BYTES};
use zeroize::Zeroize;

use crate::error::{Error, Result};
use crate::recipient::{Identity, Recipient};
use crate::stanza::{self, Stanza};

const STANZA_TYPE: &str = "ssh-ed25519";
const LABEL: &[u8] = b"age-encryption.org/v1/ssh-ed25519";
const ZERO_NONCE: [u8; 12] = [0u8; 12];

/// §4.6: wraps under X25519 after converting the Ed25519 public key to
/// its Montgomery form and folding in a per-key tweak, so the same
/// stanza layout and AEAD as [`crate::recipient::x25519`] apply once
/// the shared secret is derived.
pub struct SshEd25519Recipient {
    ssh_wire: Vec<u8>,
    montgomery_public: [u8; 32],
}

impl SshEd25519Recipient {
    pub fn new(ed25519_public: &[u8; 32]) -> Result<Self> {
        let montgomery_public = edwards_to_montgomery(ed25519_public)?;
        Ok(SshEd25519Recipient {
            ssh_wire: ssh_wire_pubkey(ed25519_public),
            montgomery_public,
        })
    }
}

impl Recipient for SshEd25519Recipient {
    fn kind(&self) -> &'static str {
        STANZA_TYPE
    }

    fn wrap(&self, file_key: &[u8; 16]) -> Result<Stanza> {
        let tweak = derive_tweak(&self.ssh_wire);

        let mut ephemeral_scalar = [0u8; 32];
        OsRng.fill_bytes(&mut ephemeral_scalar);
        let ephemeral_public = x25519(ephemeral_scalar, X25519_BASEPOINT_BYTES);

        let dh = x25519(ephemeral_scalar, self.montgomery_public);
        ephemeral_scalar.zeroize();
        let shared = x25519(tweak, dh);
        if shared == [0u8; 32] {
            return Err(Error::PrimitiveFailure(
                "ssh-ed25519 ECDH produced a degenerate (low-order) shared secret".into(),
            ));
        }

        let wrap_key = derive_wrap_key(&shared, &ephemeral_public, &self.montgomery_public);
        let cipher = ChaCha20Poly1305::new_from_slice(&wrap_key).expect("32-byte key");
        let ciphertext = cipher
            .encrypt(Nonce::from_slice(&ZERO_NONCE), file_key.as_slice())
            .map_err(|_| Error::PrimitiveFailure("ssh-ed25519 wrap seal failure".into()))?;

        Ok(Stanza::new(
            STANZA_TYPE,
            vec![
                stanza::encode(&tag_of(&self.ssh_wire)),
                stanza::encode(&ephemeral_public),
            ],
            ciphertext,
        ))
    }
}

/// §4.6 identity side. The secret scalar is `SHA-512(seed)[0..32]`,
/// the same expansion Ed25519 itself uses before clamping.
pub struct SshEd25519Identity {
    ssh_wire: Vec<u8>,
    tag: [u8; 4],
    montgomery_secret: [u8; 32],
    montgomery_public: [u8; 32],
}

impl SshEd25519Identity {
    pub fn new(seed: &[u8; 32], ed25519_public: &[u8; 32]) -> Result<Self> {
        let ssh_wire = ssh_wire_pubkey(ed25519_public);
        let tag = tag_of(&ssh_wire);
        let hash = Sha512::digest(seed);
        let mut montgomery_secret = [0u8; 32];
        montgomery_secret.copy_from_slice(&hash[..32]);
        let montgomery_public = edwards_to_montgomery(ed25519_public)?;
        Ok(SshEd25519Identity {
            ssh_wire,
            tag,
            montgomery_secret,
            montgomery_public,
        })
    }
}

impl Identity for SshEd25519Identity {
    fn kind(&self) -> &'static str {
        STANZA_TYPE
    }

    fn unwrap(&self, stanza: &Stanza) -> Result<[u8; 16]> {
        if stanza.kind != STANZA_TYPE {
            return Err(Error::IncorrectIdentity);
        }
        let [tag_arg, ephemeral_arg] = stanza.args.as_slice() else {
            return Err(Error::IncorrectIdentity);
        };
        let tag = stanza::decode_strict(tag_arg).map_err(|_| Error::IncorrectIdentity)?;
        if tag.as_slice() != self.tag {
            return Err(Error::IncorrectIdentity);
        }
        let ephemeral_bytes =
            stanza::decode_strict(ephemeral_arg).map_err(|_| Error::IncorrectIdentity)?;
        let ephemeral_public: [u8; 32] = ephemeral_bytes
            .try_into()
            .map_err(|_| Error::IncorrectIdentity)?;

        let tweak = derive_tweak(&self.ssh_wire);
        let dh = x25519(self.montgomery_secret, ephemeral_public);
        let shared = x25519(tweak, dh);
        if shared == [0u8; 32] {
            return Err(Error::IncorrectIdentity);
        }

        let wrap_key = derive_wrap_key(&shared, &ephemeral_public, &self.montgomery_public);
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

/// `T = HKDF-SHA256(salt=SSH_pubkey_wire, ikm=∅, info=LABEL)[0..32]`.
fn derive_tweak(ssh_wire: &[u8]) -> [u8; 32] {
    let hk = Hkdf::<Sha256>::new(Some(ssh_wire), &[]);
    let mut tweak = [0u8; 32];
    hk.expand(LABEL, &mut tweak)
        .expect("32 is a valid HKDF-SHA256 output length");
    tweak
}

fn derive_wrap_key(shared: &[u8], ephemeral_public: &[u8], recipient_public: &[u8]) -> [u8; 32] {
    let mut salt = Vec::with_capacity(64);
    salt.extend_from_slice(ephemeral_public);
    salt.extend_from_slice(recipient_public);
    let hk = Hkdf::<Sha256>::new(Some(&salt), shared);
    let mut key = [0u8; 32];
    hk.expand(LABEL, &mut key)
        .expect("32 is a valid HKDF-SHA256 output length");
    key
}

fn tag_of(ssh_wire: &[u8]) -> [u8; 4] {
    let digest = Sha256::digest(ssh_wire);
    let mut tag = [0u8; 4];
    tag.copy_from_slice(&digest[..4]);
    tag
}

/// The birational map `u = (1+y)/(1-y) mod p` is exactly what
/// `EdwardsPoint::to_montgomery` computes from the curve point's
/// y-coordinate.
fn edwards_to_montgomery(ed25519_public: &[u8; 32]) -> Result<[u8; 32]> {
    let point = CompressedEdwardsY(*ed25519_public)
        .decompress()
        .ok_or_else(|| Error::PrimitiveFailure("invalid Ed25519 public key encoding".into()))?;
    Ok(point.to_montgomery().to_bytes())
}

/// RFC 4253 §6.6 wire format: `string "ssh-ed25519"`, `string pubkey`.
fn ssh_wire_pubkey(ed25519_public: &[u8; 32]) -> Vec<u8> {
    let mut out = Vec::new();
    write_ssh_string(&mut out, b"ssh-ed25519");
    write_ssh_string(&mut out, ed25519_public);
    out
}

fn write_ssh_string(out: &mut Vec<u8>, bytes: &[u8]) {
    out.extend_from_slice(&(bytes.len() as u32).to_be_bytes());
    out.extend_from_slice(bytes);
}

#[cfg(test)]
mod tests {
    use super::*;
    use ed25519_dalek::SigningKey;

    fn keypair() -> ([u8; 32], [u8; 32]) {
        let signing = SigningKey::generate(&mut rand::rngs::OsRng);
        (signing.to_bytes(), signing.verifying_key().to_bytes())
    }

    #[test]
    fn wrap_then_unwrap_recovers_the_file_key() {
        let (seed, public) = keypair();
        let recipient = SshEd25519Recipient::new(&public).unwrap();
        let identity = SshEd25519Identity::new(&seed, &public).unwrap();

        let file_key = [11u8; 16];
        let stanza = recipient.wrap(&file_key).unwrap();
        assert_eq!(stanza.args.len(), 2);
        assert_eq!(identity.unwrap(&stanza).unwrap(), file_key);
    }

    #[test]
    fn wrong_identity_is_incorrect_not_fatal() {
        let (_seed, public) = keypair();
        let recipient = SshEd25519Recipient::new(&public).unwrap();
        let (other_seed, other_public) = keypair();
        let other_identity = SshEd25519Identity::new(&other_seed, &other_public).unwrap();

        let stanza = recipient.wrap(&[1u8; 16]).unwrap();
        assert!(matches!(
            other_identity.unwrap(&stanza),
            Err(Error::IncorrectIdentity)
        ));
    }
}
