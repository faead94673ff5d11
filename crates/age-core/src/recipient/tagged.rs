use hkdf::Hkdf;
use hpke::aead::ChaCha20Poly1305 as HpkeChaCha20Poly1305;
use hpke::kdf::HkdfSha256 as HpkeHkdfSha256;
use hpke::kem::DhP256HkdfSha256;
use hpke::{Deserializable, Kem as KemTrait, OpModeR, OpModeS, Serializable};
use sha2::Sha256;
use subtle::ConstantTimeEq;
use zeroize::Zeroize;

use crate::error::{Error, Result};
use crate::recipient::{Identity, Recipient};
use crate::stanza::{self, Stanza};

type Kem = DhP256HkdfSha256;

const STANZA_TYPE: &str = "p256tag";
const HPKE_INFO: &[u8] = b"age-encryption.org/p256tag";

/// §4.7 classical tagged recipient: HPKE `DHKEM(P-256, HKDF-SHA256)` with
/// `ChaCha20-Poly1305`. The 4-byte tag is a correlation identifier for a
/// plugin holding the matching secret on hardware, not a privacy feature
/// (spec.md §4.7 notes it intentionally weakens recipient privacy).
pub struct TaggedRecipient {
    public: <Kem as KemTrait>::PublicKey,
}

impl TaggedRecipient {
    pub fn from_sec1_bytes(uncompressed: &[u8]) -> Result<Self> {
        let public = <Kem as KemTrait>::PublicKey::from_bytes(uncompressed)
            .map_err(|e| Error::PrimitiveFailure(format!("invalid P-256 public key: {e}")))?;
        Ok(TaggedRecipient { public })
    }
}

impl Recipient for TaggedRecipient {
    fn kind(&self) -> &'static str {
        STANZA_TYPE
    }

    fn wrap(&self, file_key: &[u8; 16]) -> Result<Stanza> {
        let mut rng = hpke::rand_core::UnwrapErr(hpke::rand_core::OsRng);
        let (encapped, ciphertext) = hpke::single_shot_seal::<HpkeChaCha20Poly1305, HpkeHkdfSha256, Kem, _>(
            &OpModeS::Base,
            &self.public,
            HPKE_INFO,
            file_key.as_slice(),
            &[],
            &mut rng,
        )
        .map_err(|e| Error::PrimitiveFailure(format!("HPKE seal failure: {e}")))?;

        let enc_bytes = encapped.to_bytes();
        let tag = tag_of(&enc_bytes, &self.public.to_bytes());

        Ok(Stanza::new(
            STANZA_TYPE,
            vec![stanza::encode(&tag), stanza::encode(&enc_bytes)],
            ciphertext,
        ))
    }

    fn labels(&self) -> &[&'static str] {
        &[]
    }
}

/// §4.7 identity side of [`TaggedRecipient`].
pub struct TaggedIdentity {
    secret: <Kem as KemTrait>::PrivateKey,
    public_uncompressed: Vec<u8>,
}

impl TaggedIdentity {
    pub fn new(secret: <Kem as KemTrait>::PrivateKey, public: <Kem as KemTrait>::PublicKey) -> Self {
        TaggedIdentity {
            secret,
            public_uncompressed: public.to_bytes().to_vec(),
        }
    }
}

impl Identity for TaggedIdentity {
    fn kind(&self) -> &'static str {
        STANZA_TYPE
    }

    fn unwrap(&self, stanza: &Stanza) -> Result<[u8; 16]> {
        if stanza.kind != STANZA_TYPE {
            return Err(Error::IncorrectIdentity);
        }
        let [tag_arg, enc_arg] = stanza.args.as_slice() else {
            return Err(Error::IncorrectIdentity);
        };
        let tag = stanza::decode_strict(tag_arg).map_err(|_| Error::IncorrectIdentity)?;
        let enc_bytes = stanza::decode_strict(enc_arg).map_err(|_| Error::IncorrectIdentity)?;

        let expected_tag = tag_of(&enc_bytes, &self.public_uncompressed);
        if tag.len() != 4 || !bool::from(tag.as_slice().ct_eq(&expected_tag[..])) {
            return Err(Error::IncorrectIdentity);
        }

        let encapped = <Kem as KemTrait>::EncappedKey::from_bytes(&enc_bytes)
            .map_err(|_| Error::IncorrectIdentity)?;
        let mut plaintext = hpke::single_shot_open::<HpkeChaCha20Poly1305, HpkeHkdfSha256, Kem>(
            &OpModeR::Base,
            &self.secret,
            &encapped,
            HPKE_INFO,
            &stanza.body,
            &[],
        )
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

/// `HKDF-Extract(key=enc‖P_recip_uncompressed, salt=info)[0..4]`
/// (spec.md §4.7).
fn tag_of(enc: &[u8], recipient_uncompressed: &[u8]) -> [u8; 4] {
    let mut ikm = Vec::with_capacity(enc.len() + recipient_uncompressed.len());
    ikm.extend_from_slice(enc);
    ikm.extend_from_slice(recipient_uncompressed);
    let (prk, _) = Hkdf::<Sha256>::extract(Some(HPKE_INFO), &ikm);
    let mut tag = [0u8; 4];
    tag.copy_from_slice(&prk[..4]);
    tag
}
