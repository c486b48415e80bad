//! Shareable links carrying a generator configuration in their query string,
//! e.g. `https://host/?secret=...&digits=6&period=30&algorithm=SHA1&timeSource=device`.

use std::str::FromStr;

use crate::{OtpError, OtpHashAlgorithm, TimeSourceKind, Totp};

const URI_SECRET_QUERY: &str = "secret";
const URI_DIGITS_QUERY: &str = "digits";
const URI_PERIOD_QUERY: &str = "period";
const URI_HASH_QUERY: &str = "algorithm";
const URI_TIME_SOURCE_QUERY: &str = "timeSource";

#[derive(Debug, Clone, PartialEq)]
pub struct ShareLink {
    pub totp: Totp,
    pub time_source: TimeSourceKind,
}

/// Reads the configuration from a link. Missing parameters keep their defaults,
/// unknown ones are ignored.
pub fn config_from_uri(uri: &str) -> Result<ShareLink, OtpError> {
    let uri = url::Url::parse(uri).map_err(OtpError::UriParseError)?;

    let mut totp = Totp::default();
    let mut time_source = TimeSourceKind::default();

    for (key, value) in uri.query_pairs() {
        match &*key {
            URI_SECRET_QUERY => {
                totp.with_secret(value.trim().to_string());
            }
            URI_DIGITS_QUERY => {
                totp.with_digits(
                    u32::from_str(value.trim())
                        .map_err(|e| OtpError::IntegerParseError(e, URI_DIGITS_QUERY.into()))?,
                );
            }
            URI_PERIOD_QUERY => {
                totp.with_period(
                    u64::from_str(value.trim())
                        .map_err(|e| OtpError::IntegerParseError(e, URI_PERIOD_QUERY.into()))?,
                );
            }
            URI_HASH_QUERY => {
                totp.with_algorithm(OtpHashAlgorithm::from_str(&value)?);
            }
            URI_TIME_SOURCE_QUERY => time_source = TimeSourceKind::from_str(&value)?,
            _ => (),
        }
    }

    Ok(ShareLink { totp, time_source })
}

/// Writes the configuration into the query string of `base`, replacing any query it had
pub fn config_to_uri(base: &str, link: &ShareLink) -> Result<String, OtpError> {
    let mut uri = url::Url::parse(base).map_err(OtpError::UriParseError)?;
    uri.set_query(None);

    uri.query_pairs_mut()
        .append_pair(URI_SECRET_QUERY, link.totp.secret())
        .append_pair(URI_DIGITS_QUERY, &link.totp.digits().to_string())
        .append_pair(URI_PERIOD_QUERY, &link.totp.period().to_string())
        .append_pair(URI_HASH_QUERY, &link.totp.algorithm().to_string())
        .append_pair(URI_TIME_SOURCE_QUERY, &link.time_source.to_string());

    Ok(uri.to_string())
}
