use hmac::{digest::KeyInit, Hmac, Mac};
use sha1::Sha1;
use sha2::{Sha256, Sha512};

use crate::{OtpCode, OtpError, OtpHashAlgorithm};

/// Largest digit count whose modulus `10^digits` still fits in a u64
pub const MAX_DIGITS: u32 = 19;

/// Computes the [HMAC-based One-time Password](http://en.wikipedia.org/wiki/HMAC-based_One-time_Password_Algorithm)
/// (HOTP, RFC 4226) for the raw secret bytes and counter,
/// truncated to the specified number of digits
///
/// An empty secret is hashed like any other key, callers decide whether that is meaningful.
pub fn compute(
    secret: &[u8],
    counter: u64,
    algorithm: OtpHashAlgorithm,
    digits: u32,
) -> Result<OtpCode, OtpError> {
    let digest = calc_digest(secret, algorithm, counter)?;
    let code = encode_digest_truncated(digest.as_slice(), digits)?;

    Ok(OtpCode { code, digits })
}

/// Calculates the HMAC digest of the 8-byte big-endian counter keyed by the secret.
pub fn calc_digest(
    decoded_secret: &[u8],
    algorithm: OtpHashAlgorithm,
    counter: u64,
) -> Result<Vec<u8>, OtpError> {
    let data = counter.to_be_bytes();

    match algorithm {
        OtpHashAlgorithm::SHA1 => sign::<Hmac<Sha1>>(decoded_secret, &data),
        OtpHashAlgorithm::SHA256 => sign::<Hmac<Sha256>>(decoded_secret, &data),
        OtpHashAlgorithm::SHA512 => sign::<Hmac<Sha512>>(decoded_secret, &data),
    }
}

fn sign<M: Mac + KeyInit>(key: &[u8], data: &[u8]) -> Result<Vec<u8>, OtpError> {
    let mut mac = <M as KeyInit>::new_from_slice(key)
        .map_err(|_| OtpError::InvalidKeyLength(key.len()))?;
    mac.update(data);

    Ok(mac.finalize().into_bytes().to_vec())
}

/// Encodes the HMAC digest into a truncated integer.
pub fn encode_digest_truncated(digest: &[u8], target_digits_count: u32) -> Result<u64, OtpError> {
    if target_digits_count == 0 || target_digits_count > MAX_DIGITS {
        return Err(OtpError::InvalidDigits(target_digits_count));
    }

    // While sometimes this is a hardcoded 19
    // the last byte tells us the offset for any algorithm
    let offset = match digest.last() {
        Some(x) => *x & 0xf,
        None => return Err(OtpError::InvalidDigest(Vec::from(digest))),
    } as usize;

    // Gets the 4 bytes that will compose the code
    let code_bytes: [u8; 4] = match digest
        .get(offset..offset + 4)
        .and_then(|bytes| bytes.try_into().ok())
    {
        Some(x) => x,
        None => return Err(OtpError::InvalidDigest(Vec::from(digest))),
    };

    let code = u64::from(u32::from_be_bytes(code_bytes) & 0x7fff_ffff);
    let truncation_factor = 10u64.pow(target_digits_count);

    Ok(code % truncation_factor)
}
