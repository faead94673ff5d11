use chacha20poly1305::aead::{Aead, KeyInit};
use chacha20poly1305::{ChaCha20Poly1305, Nonce};
use hkdf::Hkdf;
use hpke::kem::DhP256HkdfSha256;
use hpke::{Deserializable, Kem as KemTrait, Serializable};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use zeroize::Zeroize;

use crate::error::{Error, Result};
use crate::pq::mlkem;
use crate::recipient::{Identity, Recipient};
use crate::stanza::{self, Stanza};

type ClassicalKem = DhP256HkdfSha256;

const STANZA_TYPE: &str = "mlkem768p256tag";
const INFO: &[u8] = b"age-encryption.org/mlkem768p256tag";
const ZERO_NONCE: [u8; 12] = [0u8; 12];
const POSTQUANTUM_LABEL: &str = "postquantum";

/// §4.7 QSF-P256-MLKEM768 combined KEM: an ML-KEM-768 encapsulation run
/// alongside a P-256 ECDH, both shared secrets folded together with
/// HKDF-SHA256 before the usual ChaCha20-Poly1305 file-key wrap. Emits
/// the `postquantum` label (spec.md §4.7, §4.10) so the orchestrator
/// can reject mixing it with a recipient that lacks post-quantum
/// resistance.
pub struct HybridRecipient {
    mlkem_public: mlkem::PublicKey,
    classical_public: <ClassicalKem as KemTrait>::PublicKey,
}

impl HybridRecipient {
    pub fn new(
        mlkem_public: mlkem::PublicKey,
        classical_public: <ClassicalKem as KemTrait>::PublicKey,
    ) -> Self {
        HybridRecipient {
            mlkem_public,
            classical_public,
        }
    }
}

impl Recipient for HybridRecipient {
    fn kind(&self) -> &'static str {
        STANZA_TYPE
    }

    fn wrap(&self, file_key: &[u8; 16]) -> Result<Stanza> {
        use pqcrypto_traits::kem::{Ciphertext as _, SharedSecret as _};

        let (mlkem_shared, mlkem_ct) = mlkem::encapsulate(&self.mlkem_public);
        let (classical_shared, classical_encapped) = ClassicalKem::encap(
            &self.classical_public,
            None,
            &mut hpke::rand_core::UnwrapErr(hpke::rand_core::OsRng),
        )
        .map_err(|e| Error::PrimitiveFailure(format!("P-256 KEM encap failure: {e}")))?;

        let mlkem_ct_bytes = mlkem_ct.as_bytes().to_vec();
        let classical_encapped_bytes = classical_encapped.to_bytes();

        let wrap_key = derive_wrap_key(
            mlkem_shared.as_bytes(),
            classical_shared.0.as_slice(),
            &mlkem_ct_bytes,
            &classical_encapped_bytes,
        );
        let cipher = ChaCha20Poly1305::new_from_slice(&wrap_key).expect("32-byte key");
        let ciphertext = cipher
            .encrypt(Nonce::from_slice(&ZERO_NONCE), file_key.as_slice())
            .map_err(|_| Error::PrimitiveFailure("hybrid wrap seal failure".into()))?;

        let mut enc = Vec::with_capacity(mlkem_ct_bytes.len() + classical_encapped_bytes.len());
        enc.extend_from_slice(&mlkem_ct_bytes);
        enc.extend_from_slice(&classical_encapped_bytes);
        let tag = tag_of(&enc, &self.classical_public.to_bytes());

        Ok(Stanza::new(
            STANZA_TYPE,
            vec![
                stanza::encode(&tag),
                stanza::encode(&mlkem_ct_bytes),
                stanza::encode(&classical_encapped_bytes),
            ],
            ciphertext,
        ))
    }

    fn labels(&self) -> &[&'static str] {
        &[POSTQUANTUM_LABEL]
    }
}

/// §4.7 identity side of [`HybridRecipient`].
pub struct HybridIdentity {
    mlkem_secret: mlkem::SecretKey,
    classical_secret: <ClassicalKem as KemTrait>::PrivateKey,
    classical_public_uncompressed: Vec<u8>,
}

impl HybridIdentity {
    pub fn new(
        mlkem_secret: mlkem::SecretKey,
        classical_secret: <ClassicalKem as KemTrait>::PrivateKey,
        classical_public: <ClassicalKem as KemTrait>::PublicKey,
    ) -> Self {
        HybridIdentity {
            mlkem_secret,
            classical_secret,
            classical_public_uncompressed: classical_public.to_bytes().to_vec(),
        }
    }
}

impl Identity for HybridIdentity {
    fn kind(&self) -> &'static str {
        STANZA_TYPE
    }

    fn unwrap(&self, stanza: &Stanza) -> Result<[u8; 16]> {
        use pqcrypto_traits::kem::{Ciphertext as _, SharedSecret as _};

        if stanza.kind != STANZA_TYPE {
            return Err(Error::IncorrectIdentity);
        }
        let [tag_arg, mlkem_ct_arg, classical_enc_arg] = stanza.args.as_slice() else {
            return Err(Error::IncorrectIdentity);
        };
        let tag = stanza::decode_strict(tag_arg).map_err(|_| Error::IncorrectIdentity)?;
        let mlkem_ct_bytes =
            stanza::decode_strict(mlkem_ct_arg).map_err(|_| Error::IncorrectIdentity)?;
        let classical_encapped_bytes =
            stanza::decode_strict(classical_enc_arg).map_err(|_| Error::IncorrectIdentity)?;

        let mut enc = Vec::with_capacity(mlkem_ct_bytes.len() + classical_encapped_bytes.len());
        enc.extend_from_slice(&mlkem_ct_bytes);
        enc.extend_from_slice(&classical_encapped_bytes);
        let expected_tag = tag_of(&enc, &self.classical_public_uncompressed);
        if tag.len() != 4 || !bool::from(tag.as_slice().ct_eq(&expected_tag[..])) {
            return Err(Error::IncorrectIdentity);
        }

        let mlkem_ct = mlkem::Ciphertext::from_bytes(&mlkem_ct_bytes)
            .map_err(|_| Error::IncorrectIdentity)?;
        let classical_encapped =
            <ClassicalKem as KemTrait>::EncappedKey::from_bytes(&classical_encapped_bytes)
                .map_err(|_| Error::IncorrectIdentity)?;

        let mlkem_shared = mlkem::decapsulate(&mlkem_ct, &self.mlkem_secret);
        let classical_shared =
            ClassicalKem::decap(&self.classical_secret, None, &classical_encapped)
                .map_err(|_| Error::IncorrectIdentity)?;

        let wrap_key = derive_wrap_key(
            mlkem_shared.as_bytes(),
            classical_shared.0.as_slice(),
            &mlkem_ct_bytes,
            &classical_encapped_bytes,
        );
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

/// Folds the two KEMs' shared secrets together the way the stream
/// engine's own KEK derivation concatenates and extracts (see
/// `age-stream`'s `derive_stream_key`), except with both encapsulated
/// values bound into the info string for domain separation.
fn derive_wrap_key(
    mlkem_shared: &[u8],
    classical_shared: &[u8],
    mlkem_ct: &[u8],
    classical_encapped: &[u8],
) -> [u8; 32] {
    let mut ikm = Vec::with_capacity(mlkem_shared.len() + classical_shared.len());
    ikm.extend_from_slice(mlkem_shared);
    ikm.extend_from_slice(classical_shared);

    let mut context = Vec::with_capacity(INFO.len() + mlkem_ct.len() + classical_encapped.len());
    context.extend_from_slice(INFO);
    context.extend_from_slice(mlkem_ct);
    context.extend_from_slice(classical_encapped);

    let hk = Hkdf::<Sha256>::new(None, &ikm);
    let mut key = [0u8; 32];
    hk.expand(&context, &mut key)
        .expect("32 is a valid HKDF-SHA256 output length");
    key
}

/// `HKDF-Extract(key=enc∥SHA256(P_recip)[0..4], salt=info)[0..4]`
/// (spec.md §4.7), where `enc` is the ML-KEM ciphertext followed by the
/// P-256 encapsulated key.
fn tag_of(enc: &[u8], recipient_uncompressed: &[u8]) -> [u8; 4] {
    let recipient_hash = Sha256::digest(recipient_uncompressed);
    let mut ikm = Vec::with_capacity(enc.len() + 4);
    ikm.extend_from_slice(enc);
    ikm.extend_from_slice(&recipient_hash[..4]);
    let (prk, _) = Hkdf::<Sha256>::extract(Some(INFO), &ikm);
    let mut tag = [0u8; 4];
    tag.copy_from_slice(&prk[..4]);
    tag
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wrap_then_unwrap_recovers_the_file_key() {
        let (mlkem_public, mlkem_secret) = mlkem::keypair();
        let (classical_secret, classical_public) =
            ClassicalKem::gen_keypair(&mut hpke::rand_core::UnwrapErr(hpke::rand_core::OsRng));

        let recipient = HybridRecipient::new(mlkem_public, classical_public.clone());
        let identity = HybridIdentity::new(mlkem_secret, classical_secret, classical_public);

        assert_eq!(recipient.labels(), &["postquantum"]);
        let file_key = [19u8; 16];
        let stanza = recipient.wrap(&file_key).unwrap();
        assert_eq!(identity.unwrap(&stanza).unwrap(), file_key);
    }

    #[test]
    fn wrong_identity_is_incorrect_not_fatal() {
        let (mlkem_public, _mlkem_secret) = mlkem::keypair();
        let (_classical_secret, classical_public) =
            ClassicalKem::gen_keypair(&mut hpke::rand_core::UnwrapErr(hpke::rand_core::OsRng));
        let recipient = HybridRecipient::new(mlkem_public, classical_public);

        let (other_mlkem_public, other_mlkem_secret) = mlkem::keypair();
        let (other_classical_secret, other_classical_public) =
            ClassicalKem::gen_keypair(&mut hpke::rand_core::UnwrapErr(hpke::rand_core::OsRng));
        let _ = other_mlkem_public;
        let other_identity = HybridIdentity::new(
            other_mlkem_secret,
            other_classical_secret,
            other_classical_public,
        );

        let stanza = recipient.wrap(&[1u8; 16]).unwrap();
        assert!(matches!(
            other_identity.unwrap(&stanza),
            Err(Error::IncorrectIdentity)
        ));
    }
}
