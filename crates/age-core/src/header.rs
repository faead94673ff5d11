use hkdf::Hkdf;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;

use crate::error::{Error, Result};
use crate::stanza::{self, Stanza, LINE_WIDTH, MAX_STANZAS};

pub const VERSION_LINE: &str = "age-encryption.org/v1";

/// The ordered sequence of recipient stanzas. The header MAC is handled
/// separately by [`parse`]/[`serialize`] since it must cover the exact
/// on-wire bytes, not a re-derived canonical form.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Header {
    pub stanzas: Vec<Stanza>,
}

impl Header {
    pub fn new(stanzas: Vec<Stanza>) -> Result<Self> {
        if stanzas.len() > MAX_STANZAS {
            return Err(Error::TooManyRecipients);
        }
        Ok(Header { stanzas })
    }
}

/// A header parsed from the wire, retaining the exact bytes the MAC
/// covers so `verify_mac` never has to trust a re-serialization.
pub struct ParsedHeader {
    pub header: Header,
    mac_covered: Vec<u8>,
    mac: [u8; 32],
    /// Byte offset in the input immediately after the header's trailing
    /// newline — where the 16-byte payload nonce begins.
    pub consumed: usize,
}

impl ParsedHeader {
    pub fn verify_mac(&self, file_key: &[u8; 16]) -> Result<()> {
        let expected = compute_mac(file_key, &self.mac_covered);
        if expected.ct_eq(&self.mac).into() {
            Ok(())
        } else {
            Err(Error::HeaderMacMismatch)
        }
    }
}

/// Serializes the version line, stanzas, and MAC line. `file_key` seeds
/// the MAC key via `HKDF-SHA256(file_key, salt=∅, info="header")`.
pub fn serialize(header: &Header, file_key: &[u8; 16]) -> Vec<u8> {
    let mut out = String::new();
    out.push_str(VERSION_LINE);
    out.push('\n');
    for s in &header.stanzas {
        s.write_to(&mut out);
    }
    out.push_str("---");

    let mac = compute_mac(file_key, out.as_bytes());
    out.push(' ');
    out.push_str(&stanza::encode(&mac));
    out.push('\n');
    out.into_bytes()
}

/// Parses a header from the front of `input`. The remaining bytes from
/// `consumed` onward are the payload nonce followed by the chunk stream.
pub fn parse(input: &[u8]) -> Result<ParsedHeader> {
    let mut pos = 0usize;

    let version = read_line(input, &mut pos)?;
    if version != VERSION_LINE {
        return Err(Error::MalformedHeader("unrecognized version line"));
    }

    let mut stanzas = Vec::new();
    loop {
        let line_start = pos;
        let line = read_line(input, &mut pos)?;

        if let Some(mac_b64) = line.strip_prefix("--- ") {
            let mac_bytes = stanza::decode_strict(mac_b64)?;
            if mac_bytes.len() != 32 {
                return Err(Error::MalformedHeader("MAC is not 32 bytes"));
            }
            let mut mac = [0u8; 32];
            mac.copy_from_slice(&mac_bytes);

            // Covers up to and including the three dashes, excluding the
            // separating space and the MAC's own base64 (spec.md §4.1).
            let mac_covered = input[..line_start + 3].to_vec();

            return Ok(ParsedHeader {
                header: Header::new(stanzas)?,
                mac_covered,
                mac,
                consumed: pos,
            });
        }

        let rest = line
            .strip_prefix("-> ")
            .ok_or(Error::MalformedHeader("expected a stanza or MAC line"))?;
        let mut parts = rest.split(' ');
        let kind = parts
            .next()
            .ok_or(Error::MalformedHeader("stanza line missing a type"))?;
        stanza::validate_type(kind)?;

        let mut args = Vec::new();
        for arg in parts {
            stanza::validate_arg(arg)?;
            args.push(arg.to_string());
        }

        let mut body_b64 = String::new();
        loop {
            let body_line = read_line(input, &mut pos)?;
            if body_line.len() > LINE_WIDTH {
                return Err(Error::MalformedHeader("stanza body line exceeds 64 columns"));
            }
            let terminal = body_line.len() < LINE_WIDTH;
            body_b64.push_str(body_line);
            if terminal {
                break;
            }
        }
        let body = stanza::decode_strict(&body_b64)?;
        stanzas.push(Stanza::new(kind, args, body));
        if stanzas.len() > MAX_STANZAS {
            return Err(Error::TooManyRecipients);
        }
    }
}

fn compute_mac(file_key: &[u8; 16], covered: &[u8]) -> [u8; 32] {
    let hk = Hkdf::<Sha256>::new(None, file_key);
    let mut mac_key = [0u8; 32];
    hk.expand(b"header", &mut mac_key)
        .expect("32 is a valid HKDF-SHA256 output length");

    let mut mac = Hmac::<Sha256>::new_from_slice(&mac_key).expect("any length key is valid for HMAC");
    mac.update(covered);
    let tag = mac.finalize().into_bytes();
    let mut out = [0u8; 32];
    out.copy_from_slice(&tag);
    out
}

fn read_line<'a>(input: &'a [u8], pos: &mut usize) -> Result<&'a str> {
    let start = *pos;
    if start >= input.len() {
        return Err(Error::MalformedHeader("header ended before the MAC line"));
    }
    let rel = input[start..]
        .iter()
        .position(|&b| b == b'\n')
        .ok_or(Error::MalformedHeader("unterminated header line"))?;
    let line = &input[start..start + rel];
    *pos = start + rel + 1;
    std::str::from_utf8(line).map_err(|_| Error::MalformedHeader("header line is not valid UTF-8"))
}
