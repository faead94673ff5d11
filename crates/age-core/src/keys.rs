//! Bech32 encoding for the textual key forms (spec.md §4.9, §6).
//!
//! Secret keys use the (checksum-only, non-m) Bech32 variant with HRP
//! `AGE-SECRET-KEY-`, rendered fully uppercase. Public keys use HRP
//! `age`. Tagged recipients embed a one-byte subtype marker ahead of
//! the payload rather than reverse-engineering the exact vanity bytes
//! that would make the encoded string literally start with `tag1`/
//! `tagpq1` — the marker round-trips the same information (spec.md's
//! own design notes leave the encoding of this detail unspecified).

use bech32::{Bech32, Hrp};

use crate::error::{Error, Result};

const SECRET_KEY_HRP: &str = "AGE-SECRET-KEY-";
const PUBLIC_KEY_HRP: &str = "age";

const TAGGED_CLASSICAL_MARKER: u8 = 0x01;
const TAGGED_HYBRID_MARKER: u8 = 0x02;

pub fn encode_secret_key(secret: &[u8; 32]) -> String {
    let hrp = Hrp::parse(SECRET_KEY_HRP).expect("HRP is a valid bech32 prefix");
    bech32::encode::<Bech32>(hrp, secret)
        .expect("32-byte payload always encodes")
        .to_ascii_uppercase()
}

pub fn decode_secret_key(s: &str) -> Result<[u8; 32]> {
    let (hrp, data) = bech32::decode(&s.to_ascii_lowercase())
        .map_err(|_| Error::MalformedHeader("invalid bech32 secret key"))?;
    if !hrp.as_str().eq_ignore_ascii_case(SECRET_KEY_HRP) {
        return Err(Error::MalformedHeader("unexpected secret key HRP"));
    }
    data.try_into()
        .map_err(|_| Error::MalformedHeader("secret key payload is not 32 bytes"))
}

pub fn encode_public_key(public: &[u8; 32]) -> String {
    let hrp = Hrp::parse(PUBLIC_KEY_HRP).expect("HRP is a valid bech32 prefix");
    bech32::encode::<Bech32>(hrp, public).expect("32-byte payload always encodes")
}

pub fn decode_public_key(s: &str) -> Result<[u8; 32]> {
    let (hrp, data) = bech32::decode(&s.to_ascii_lowercase())
        .map_err(|_| Error::MalformedHeader("invalid bech32 public key"))?;
    if !hrp.as_str().eq_ignore_ascii_case(PUBLIC_KEY_HRP) {
        return Err(Error::MalformedHeader("unexpected public key HRP"));
    }
    data.try_into()
        .map_err(|_| Error::MalformedHeader("public key payload is not 32 bytes"))
}

/// Whether a tagged public key identifies a classical or post-quantum
/// hybrid recipient, recovered from [`decode_tagged_public_key`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaggedKind {
    Classical,
    Hybrid,
}

pub fn encode_tagged_public_key(kind: TaggedKind, payload: &[u8]) -> String {
    let marker = match kind {
        TaggedKind::Classical => TAGGED_CLASSICAL_MARKER,
        TaggedKind::Hybrid => TAGGED_HYBRID_MARKER,
    };
    let mut data = Vec::with_capacity(payload.len() + 1);
    data.push(marker);
    data.extend_from_slice(payload);

    let hrp = Hrp::parse(PUBLIC_KEY_HRP).expect("HRP is a valid bech32 prefix");
    bech32::encode::<Bech32>(hrp, &data).expect("marker-prefixed payload always encodes")
}

pub fn decode_tagged_public_key(s: &str) -> Result<(TaggedKind, Vec<u8>)> {
    let (hrp, data) = bech32::decode(&s.to_ascii_lowercase())
        .map_err(|_| Error::MalformedHeader("invalid bech32 tagged public key"))?;
    if !hrp.as_str().eq_ignore_ascii_case(PUBLIC_KEY_HRP) {
        return Err(Error::MalformedHeader("unexpected tagged public key HRP"));
    }
    let (marker, payload) = data
        .split_first()
        .ok_or(Error::MalformedHeader("tagged public key payload is empty"))?;
    let kind = match *marker {
        TAGGED_CLASSICAL_MARKER => TaggedKind::Classical,
        TAGGED_HYBRID_MARKER => TaggedKind::Hybrid,
        _ => return Err(Error::MalformedHeader("unrecognized tagged public key marker")),
    };
    Ok((kind, payload.to_vec()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn secret_key_round_trips_uppercase() {
        let secret = [7u8; 32];
        let encoded = encode_secret_key(&secret);
        assert!(encoded.starts_with("AGE-SECRET-KEY-1"));
        assert_eq!(encoded, encoded.to_ascii_uppercase());
        assert_eq!(decode_secret_key(&encoded).unwrap(), secret);
    }

    #[test]
    fn public_key_round_trips() {
        let public = [3u8; 32];
        let encoded = encode_public_key(&public);
        assert!(encoded.starts_with("age1"));
        assert_eq!(decode_public_key(&encoded).unwrap(), public);
    }

    #[test]
    fn tagged_public_key_round_trips_its_kind() {
        let payload = [9u8; 37];
        let encoded = encode_tagged_public_key(TaggedKind::Hybrid, &payload);
        let (kind, decoded) = decode_tagged_public_key(&encoded).unwrap();
        assert_eq!(kind, TaggedKind::Hybrid);
        assert_eq!(decoded, payload);
    }

    #[test]
    fn wrong_hrp_is_rejected() {
        let public = encode_public_key(&[1u8; 32]);
        assert!(decode_secret_key(&public).is_err());
    }
}
