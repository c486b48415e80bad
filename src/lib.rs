pub mod base32;
pub mod hotp;
pub mod scheduler;
pub mod time_source;
pub mod totp;
pub mod uri_helper;

use core::num;
use std::{fmt::Display, str::FromStr};

pub use scheduler::{DisplayScheduler, DisplaySink, Recomputation};
pub use time_source::{SyncError, TimeSource, TimeSourceKind};
pub use totp::{CodePair, Totp};

#[derive(Debug, thiserror::Error)]
pub enum OtpError {
    #[error("Invalid Base32 character {character:?} at position {position}")]
    InvalidBase32Character { character: char, position: usize },
    #[error("Secret decode error")]
    SecretDecode(data_encoding::DecodeError),
    #[error("Invalid digest")]
    InvalidDigest(Vec<u8>),
    #[error("Invalid HMAC key of {0} bytes")]
    InvalidKeyLength(usize),
    #[error("Invalid hashing algorithm, found {0}. Expected one of: SHA1, SHA256 or SHA512")]
    InvalidHashingAlgorithm(String),
    #[error("Invalid digit count {0}. Expected a value between 1 and 19")]
    InvalidDigits(u32),
    #[error("The period must be at least one second")]
    InvalidPeriod,
    #[error("Instant {0}ms lies before the Unix epoch")]
    InstantBeforeEpoch(i64),
    #[error("Instant is out of the representable range")]
    InstantOutOfRange,
    #[error("Invalid time source, found {0}. Expected one of: device or online")]
    InvalidTimeSource(String),
    #[error("Could not parse the URI")]
    UriParseError(url::ParseError),
    #[error("Could not parse an integer. Failed parsing: {1}")]
    IntegerParseError(num::ParseIntError, String),
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum OtpHashAlgorithm {
    #[default]
    SHA1,
    SHA256,
    SHA512,
}

impl Display for OtpHashAlgorithm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::SHA1 => write!(f, "SHA1"),
            Self::SHA256 => write!(f, "SHA256"),
            Self::SHA512 => write!(f, "SHA512"),
        }
    }
}

impl FromStr for OtpHashAlgorithm {
    type Err = OtpError;

    /// Accepts both the plain (`SHA256`) and the Web Crypto (`SHA-256`) spelling
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_uppercase().replace('-', "");

        match normalized.as_str() {
            "SHA1" => Ok(Self::SHA1),
            "SHA256" => Ok(Self::SHA256),
            "SHA512" => Ok(Self::SHA512),
            _ => Err(OtpError::InvalidHashingAlgorithm(s.to_string())),
        }
    }
}

/// A generated one-time password.
///
/// Renders as a decimal string left-padded with zeros to exactly `digits` characters.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct OtpCode {
    code: u64,
    digits: u32,
}

impl OtpCode {
    pub fn integer(&self) -> u64 {
        self.code
    }

    pub fn digits(&self) -> u32 {
        self.digits
    }
}

impl Display for OtpCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{:0padding$}",
            self.code,
            padding = (self.digits as usize)
        )
    }
}
