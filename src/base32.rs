//! RFC 4648 Base32 handling for user-entered secrets.
//!
//! Users paste secrets in all sorts of shapes (lower case, grouped with spaces or
//! hyphens, with or without `=` padding). Those are normalized away, anything else
//! outside the Base32 alphabet is rejected rather than silently skipped.

use std::sync::OnceLock;

use data_encoding::{Encoding, BASE32_NOPAD};

use crate::OtpError;

const ALPHABET: &str = "ABCDEFGHIJKLMNOPQRSTUVWXYZ234567";

/// BASE32_NOPAD that tolerates non-zero bits in the final partial group
fn lenient_base32() -> &'static Encoding {
    static LENIENT: OnceLock<Encoding> = OnceLock::new();

    LENIENT.get_or_init(|| {
        let mut spec = BASE32_NOPAD.specification();
        spec.check_trailing_bits = false;
        spec.encoding()
            .expect("BASE32_NOPAD is valid without the trailing bits check")
    })
}

/// Strips padding and formatting, upper-cases the rest and validates it
/// against the Base32 alphabet.
///
/// Error positions are character indices into `secret`.
pub fn sanitize_secret(secret: &str) -> Result<String, OtpError> {
    let body = secret.trim_end_matches(|c: char| c == '=' || c.is_ascii_whitespace());

    let mut sanitized = String::with_capacity(body.len());
    for (position, character) in body.chars().enumerate() {
        if character.is_ascii_whitespace() || character == '-' {
            continue;
        }

        let upper = character.to_ascii_uppercase();
        if !ALPHABET.contains(upper) {
            return Err(OtpError::InvalidBase32Character {
                character,
                position,
            });
        }

        sanitized.push(upper);
    }

    Ok(sanitized)
}

/// Decodes a secret (given as an RFC4648 base32-encoded ASCII string)
/// into a byte string
///
/// Bits left over after the last complete byte are dropped. An empty secret
/// decodes to an empty byte string.
pub fn decode_secret(secret: &str) -> Result<Vec<u8>, OtpError> {
    let sanitized = sanitize_secret(secret)?;

    // 1, 3 and 6 trailing symbols never complete a byte on their own
    let usable = match sanitized.len() % 8 {
        1 | 3 | 6 => sanitized.len() - 1,
        _ => sanitized.len(),
    };

    lenient_base32()
        .decode(&sanitized.as_bytes()[..usable])
        .map_err(OtpError::SecretDecode)
}

/// Encodes raw secret bytes as unpadded RFC4648 base32
pub fn encode_secret(secret: &[u8]) -> String {
    BASE32_NOPAD.encode(secret)
}
