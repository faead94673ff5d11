use rsa::traits::PublicKeyParts;
use rsa::{Oaep, RsaPrivateKey, RsaPublicKey};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use zeroize::Zeroize;

use crate::error::{Error, Result};
use crate::recipient::{Identity, Match, Recipient};
use crate::stanza::{self, Stanza};

const STANZA_TYPE: &str = "ssh-rsa";
const OAEP_LABEL: &str = "age-encryption.org/v1/ssh-rsa";
const SSH_KEY_TYPE: &[u8] = b"ssh-rsa";

/// §4.5: wraps under RSAES-OAEP(SHA-256) with the recipient identified
/// by a 4-byte prefix of the SHA-256 of its SSH wire-format public key,
/// rather than the key itself.
pub struct SshRsaRecipient {
    public: RsaPublicKey,
}

impl SshRsaRecipient {
    pub fn new(public: RsaPublicKey) -> Self {
        SshRsaRecipient { public }
    }
}

impl Recipient for SshRsaRecipient {
    fn kind(&self) -> &'static str {
        STANZA_TYPE
    }

    fn wrap(&self, file_key: &[u8; 16]) -> Result<Stanza> {
        let wire = ssh_wire_pubkey(&self.public);
        let tag = tag_of(&wire);

        let mut rng = rand::thread_rng();
        let padding = Oaep::new_with_label::<Sha256, _>(OAEP_LABEL);
        let ciphertext = self
            .public
            .encrypt(&mut rng, padding, file_key.as_slice())
            .map_err(|e| Error::PrimitiveFailure(format!("RSA-OAEP wrap failure: {e}")))?;

        Ok(Stanza::new(
            STANZA_TYPE,
            vec![stanza::encode(&tag)],
            ciphertext,
        ))
    }
}

/// §4.5 identity side: the RSA private key that unwraps `SshRsaRecipient`
/// stanzas whose tag matches this key's SSH fingerprint prefix.
pub struct SshRsaIdentity {
    secret: RsaPrivateKey,
    tag: [u8; 4],
}

impl SshRsaIdentity {
    pub fn new(secret: RsaPrivateKey) -> Self {
        let public = RsaPublicKey::from(&secret);
        let wire = ssh_wire_pubkey(&public);
        let tag = tag_of(&wire);
        SshRsaIdentity { secret, tag }
    }
}

impl Identity for SshRsaIdentity {
    fn kind(&self) -> &'static str {
        STANZA_TYPE
    }

    fn matches(&self, stanza: &Stanza) -> Result<Match> {
        if stanza.kind != STANZA_TYPE {
            return Ok(Match::Incorrect);
        }
        let Some(arg) = stanza.args.first() else {
            return Ok(Match::Incorrect);
        };
        let Ok(tag) = stanza::decode_strict(arg) else {
            return Ok(Match::Incorrect);
        };
        if tag.len() == 4 && bool::from(tag.as_slice().ct_eq(&self.tag[..])) {
            Ok(Match::Ok)
        } else {
            Ok(Match::Incorrect)
        }
    }

    fn unwrap(&self, stanza: &Stanza) -> Result<[u8; 16]> {
        if self.matches(stanza)? == Match::Incorrect {
            return Err(Error::IncorrectIdentity);
        }

        let padding = Oaep::new_with_label::<Sha256, _>(OAEP_LABEL);
        let mut plaintext = self
            .secret
            .decrypt(padding, &stanza.body)
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

fn tag_of(ssh_wire_pubkey: &[u8]) -> [u8; 4] {
    let digest = Sha256::digest(ssh_wire_pubkey);
    let mut tag = [0u8; 4];
    tag.copy_from_slice(&digest[..4]);
    tag
}

/// RFC 4253 §6.6 wire format: `string "ssh-rsa"`, `mpint e`, `mpint n`.
fn ssh_wire_pubkey(public: &RsaPublicKey) -> Vec<u8> {
    let mut out = Vec::new();
    write_ssh_string(&mut out, SSH_KEY_TYPE);
    write_ssh_mpint(&mut out, &public.e().to_bytes_be());
    write_ssh_mpint(&mut out, &public.n().to_bytes_be());
    out
}

fn write_ssh_string(out: &mut Vec<u8>, bytes: &[u8]) {
    out.extend_from_slice(&(bytes.len() as u32).to_be_bytes());
    out.extend_from_slice(bytes);
}

/// mpints are prefixed with a zero byte when the high bit of the first
/// byte is set, so they are never misread as negative.
fn write_ssh_mpint(out: &mut Vec<u8>, be_bytes: &[u8]) {
    let trimmed = {
        let mut i = 0;
        while i < be_bytes.len() - 1 && be_bytes[i] == 0 {
            i += 1;
        }
        &be_bytes[i..]
    };
    if trimmed.first().is_some_and(|b| b & 0x80 != 0) {
        let mut padded = Vec::with_capacity(trimmed.len() + 1);
        padded.push(0);
        padded.extend_from_slice(trimmed);
        write_ssh_string(out, &padded);
    } else {
        write_ssh_string(out, trimmed);
    }
}
