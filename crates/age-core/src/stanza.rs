use base64::{engine::general_purpose::STANDARD_NO_PAD, Engine};

use crate::error::{Error, Result};

/// Maximum stanza body line width (spec.md §4.1).
pub const LINE_WIDTH: usize = 64;
/// Maximum number of stanzas a header may carry (spec.md §3).
pub const MAX_STANZAS: usize = 20;

/// One recipient's entry in the header: `-> TYPE ARG*` followed by a
/// wrapped, unpadded base64 body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stanza {
    pub kind: String,
    pub args: Vec<String>,
    pub body: Vec<u8>,
}

impl Stanza {
    pub fn new(kind: impl Into<String>, args: Vec<String>, body: Vec<u8>) -> Self {
        Stanza {
            kind: kind.into(),
            args,
            body,
        }
    }

    /// Appends this stanza's canonical textual form to `out`.
    pub fn write_to(&self, out: &mut String) {
        out.push_str("-> ");
        out.push_str(&self.kind);
        for arg in &self.args {
            out.push(' ');
            out.push_str(arg);
        }
        out.push('\n');

        let encoded = STANDARD_NO_PAD.encode(&self.body);
        let bytes = encoded.as_bytes();
        if bytes.is_empty() {
            out.push('\n');
            return;
        }
        for chunk in bytes.chunks(LINE_WIDTH) {
            out.push_str(std::str::from_utf8(chunk).expect("base64 output is ASCII"));
            out.push('\n');
        }
        if bytes.len() % LINE_WIDTH == 0 {
            out.push('\n');
        }
    }
}

/// Decodes strict unpadded standard-alphabet base64, rejecting padding
/// and any byte outside the alphabet (spec.md §4.2).
pub fn decode_strict(s: &str) -> Result<Vec<u8>> {
    if s.as_bytes().contains(&b'=') {
        return Err(Error::MalformedHeader("base64 padding is not permitted"));
    }
    STANDARD_NO_PAD
        .decode(s)
        .map_err(|_| Error::MalformedHeader("invalid base64 in stanza body"))
}

pub fn encode(bytes: &[u8]) -> String {
    STANDARD_NO_PAD.encode(bytes)
}

/// `type` must match `[a-zA-Z0-9-_]+`.
pub fn validate_type(s: &str) -> Result<()> {
    if !s.is_empty()
        && s.bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
    {
        Ok(())
    } else {
        Err(Error::MalformedHeader("invalid stanza type"))
    }
}

/// Each `arg` must match `[A-Za-z0-9+/]+`.
pub fn validate_arg(s: &str) -> Result<()> {
    if !s.is_empty()
        && s.bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'+' || b == b'/')
    {
        Ok(())
    } else {
        Err(Error::MalformedHeader("invalid stanza argument"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_body_is_single_empty_line() {
        let s = Stanza::new("X25519", vec!["abc".into()], vec![]);
        let mut out = String::new();
        s.write_to(&mut out);
        assert_eq!(out, "-> X25519 abc\n\n");
    }

    #[test]
    fn body_exact_multiple_of_48_bytes_gets_trailing_empty_line() {
        let s = Stanza::new("scrypt", vec![], vec![0u8; 48]);
        let mut out = String::new();
        s.write_to(&mut out);
        let lines: Vec<&str> = out.lines().collect();
        // header line + one full 64-col body line + one empty terminator
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[1].len(), LINE_WIDTH);
        assert_eq!(lines[2].len(), 0);
    }

    #[test]
    fn rejects_padded_base64() {
        assert!(decode_strict("YWJj=").is_err());
    }

    #[test]
    fn type_rejects_non_alphanumeric() {
        assert!(validate_type("ssh rsa").is_err());
        assert!(validate_type("ssh-rsa").is_ok());
    }

    #[test]
    fn arg_rejects_whitespace() {
        assert!(validate_arg("has space").is_err());
        assert!(validate_arg("CJM36AHmTbdHSuOQL+NESqyVQE75f2e610iRdLPEN20").is_ok());
    }
}
