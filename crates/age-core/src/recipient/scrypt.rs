use chacha20poly1305::aead::{Aead, KeyInit};
use chacha20poly1305::{ChaCha20Poly1305, Nonce};
use rand_core::{OsRng, RngCore};
use scrypt::Params;
use zeroize::Zeroize;

use crate::error::{Error, Result};
use crate::recipient::{Identity, Recipient};
use crate::stanza::{self, Stanza};

const STANZA_TYPE: &str = "scrypt";
const LABEL: &[u8] = b"age-encryption.org/v1/scrypt";
const ZERO_NONCE: [u8; 12] = [0u8; 12];

/// Default work factor used when wrapping (spec.md §4.4: "default 18").
pub const DEFAULT_LOG_N: u8 = 18;
/// Default cap enforced when unwrapping (spec.md §4.4: "default 22").
pub const DEFAULT_MAX_WORK_FACTOR: u8 = 22;

/// §4.4: password-based wrap. A header MUST NOT carry this stanza
/// alongside any other (enforced by the orchestrator, not here).
pub struct ScryptRecipient {
    passphrase: Vec<u8>,
    log_n: u8,
}

impl ScryptRecipient {
    pub fn new(passphrase: impl Into<Vec<u8>>) -> Self {
        ScryptRecipient {
            passphrase: passphrase.into(),
            log_n: DEFAULT_LOG_N,
        }
    }

    pub fn with_work_factor(passphrase: impl Into<Vec<u8>>, log_n: u8) -> Self {
        ScryptRecipient {
            passphrase: passphrase.into(),
            log_n,
        }
    }
}

impl Recipient for ScryptRecipient {
    fn kind(&self) -> &'static str {
        STANZA_TYPE
    }

    fn wrap(&self, file_key: &[u8; 16]) -> Result<Stanza> {
        let mut salt = [0u8; 16];
        OsRng.fill_bytes(&mut salt);
        let key = derive_key(&self.passphrase, &salt, self.log_n)?;
        let cipher = ChaCha20Poly1305::new_from_slice(&key).expect("32-byte key");
        let ciphertext = cipher
            .encrypt(Nonce::from_slice(&ZERO_NONCE), file_key.as_slice())
            .map_err(|_| Error::PrimitiveFailure("scrypt wrap seal failure".into()))?;
        Ok(Stanza::new(
            STANZA_TYPE,
            vec![stanza::encode(&salt), self.log_n.to_string()],
            ciphertext,
        ))
    }
}

/// §4.4 identity side: the passphrase that unwraps `ScryptRecipient`
/// stanzas.
pub struct ScryptIdentity {
    passphrase: Vec<u8>,
    max_work_factor: u8,
}

impl ScryptIdentity {
    pub fn new(passphrase: impl Into<Vec<u8>>) -> Self {
        ScryptIdentity {
            passphrase: passphrase.into(),
            max_work_factor: DEFAULT_MAX_WORK_FACTOR,
        }
    }

    pub fn with_max_work_factor(passphrase: impl Into<Vec<u8>>, max_work_factor: u8) -> Self {
        ScryptIdentity {
            passphrase: passphrase.into(),
            max_work_factor,
        }
    }
}

impl Identity for ScryptIdentity {
    fn kind(&self) -> &'static str {
        STANZA_TYPE
    }

    fn unwrap(&self, stanza: &Stanza) -> Result<[u8; 16]> {
        if stanza.kind != STANZA_TYPE {
            return Err(Error::IncorrectIdentity);
        }
        let [salt_arg, log_n_arg] = stanza.args.as_slice() else {
            return Err(Error::IncorrectIdentity);
        };
        let salt = stanza::decode_strict(salt_arg).map_err(|_| Error::IncorrectIdentity)?;
        let salt: [u8; 16] = salt.try_into().map_err(|_| Error::IncorrectIdentity)?;
        let log_n: u8 = log_n_arg.parse().map_err(|_| Error::IncorrectIdentity)?;

        if log_n == 0 {
            return Err(Error::IncorrectIdentity);
        }
        // A too-large work factor is fatal, not a soft mismatch: it
        // would make the decryption attempt itself a denial of service.
        if log_n > self.max_work_factor {
            return Err(Error::WorkFactorTooLarge);
        }

        let key = derive_key(&self.passphrase, &salt, log_n)?;
        let cipher = ChaCha20Poly1305::new_from_slice(&key).expect("32-byte key");
        let mut plaintext = cipher
            .decrypt(Nonce::from_slice(&ZERO_NONCE), stanza.body.as_slice())
            .map_err(|_| Error::IncorrectIdentity)?;

        let mut file_key = [0u8; 16];
        file_key.copy_from_slice(&plaintext);
        plaintext.zeroize();
        Ok(file_key)
    }
}

fn derive_key(passphrase: &[u8], salt16: &[u8; 16], log_n: u8) -> Result<[u8; 32]> {
    let mut full_salt = Vec::with_capacity(LABEL.len() + 16);
    full_salt.extend_from_slice(LABEL);
    full_salt.extend_from_slice(salt16);

    let params = Params::new(log_n, 8, 1, 32)
        .map_err(|e| Error::PrimitiveFailure(format!("invalid scrypt parameters: {e}")))?;
    let mut out = [0u8; 32];
    scrypt::scrypt(passphrase, &full_salt, &params, &mut out)
        .map_err(|e| Error::PrimitiveFailure(format!("scrypt failure: {e}")))?;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wrap_then_unwrap_recovers_the_file_key() {
        let recipient = ScryptRecipient::with_work_factor("correct horse battery staple", 12);
        let identity = ScryptIdentity::new("correct horse battery staple");
        let file_key = [5u8; 16];
        let stanza = recipient.wrap(&file_key).unwrap();
        assert_eq!(identity.unwrap(&stanza).unwrap(), file_key);
    }

    #[test]
    fn wrong_password_is_incorrect_identity() {
        let recipient = ScryptRecipient::with_work_factor("twitch.tv/filosottile", 12);
        let identity = ScryptIdentity::new("wrong password");
        let stanza = recipient.wrap(&[1u8; 16]).unwrap();
        assert!(matches!(identity.unwrap(&stanza), Err(Error::IncorrectIdentity)));
    }

    #[test]
    fn work_factor_above_cap_is_fatal() {
        let recipient = ScryptRecipient::with_work_factor("pw", 23);
        let identity = ScryptIdentity::new("pw");
        let stanza = recipient.wrap(&[1u8; 16]).unwrap();
        assert!(matches!(
            identity.unwrap(&stanza),
            Err(Error::WorkFactorTooLarge)
        ));
    }
}
