use crate::{base32, hotp, OtpCode, OtpError, OtpHashAlgorithm};

pub const DEFAULT_DIGITS: u32 = 6;
pub const DEFAULT_PERIOD: u64 = 30;

/// Configuration of a [Time-based One-time Password](http://en.wikipedia.org/wiki/Time-based_One-time_Password_Algorithm)
/// generator, along with the queries evaluated against it every tick.
///
/// Instants are milliseconds since the Unix epoch, as handed out by
/// [`TimeSource::now`](crate::TimeSource::now).
#[derive(Debug, Clone, PartialEq)]
pub struct Totp {
    pub(crate) secret: String,
    pub(crate) algorithm: OtpHashAlgorithm,
    pub(crate) period: u64,
    pub(crate) digits: u32,
}

/// Codes for the current and the following time step
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CodePair {
    pub current: OtpCode,
    pub next: OtpCode,
    /// Whole seconds until `next` becomes current, in `1..=period`
    pub seconds_remaining: u64,
}

impl Default for Totp {
    fn default() -> Self {
        Self::new(String::new())
    }
}

impl Totp {
    /// Creates the config for the given RFC4648 base32 encoded secret.
    ///
    /// Obs.: This method defaults to the SHA1 hash, a 6-digit code and a period of 30 seconds
    pub fn new(secret: String) -> Self {
        Self {
            secret,
            algorithm: OtpHashAlgorithm::SHA1,
            period: DEFAULT_PERIOD,
            digits: DEFAULT_DIGITS,
        }
    }

    ///  Replaces the base32 secret text
    pub fn with_secret(&mut self, secret: String) -> &mut Self {
        self.secret = secret;

        self
    }

    ///  Sets hashing algorithm
    pub fn with_algorithm(&mut self, algorithm: OtpHashAlgorithm) -> &mut Self {
        self.algorithm = algorithm;

        self
    }

    ///  Sets the period in seconds
    pub fn with_period(&mut self, period: u64) -> &mut Self {
        self.period = period;

        self
    }

    ///  Sets the number of digits to generate
    pub fn with_digits(&mut self, digits: u32) -> &mut Self {
        self.digits = digits;

        self
    }

    pub fn secret(&self) -> &str {
        &self.secret
    }

    pub fn algorithm(&self) -> OtpHashAlgorithm {
        self.algorithm
    }

    pub fn period(&self) -> u64 {
        self.period
    }

    pub fn digits(&self) -> u32 {
        self.digits
    }

    /// Whether digits, period and algorithm are all left at their defaults
    pub fn is_default_profile(&self) -> bool {
        self.digits == DEFAULT_DIGITS
            && self.period == DEFAULT_PERIOD
            && self.algorithm == OtpHashAlgorithm::default()
    }

    pub fn validate(&self) -> Result<(), OtpError> {
        if self.period == 0 {
            return Err(OtpError::InvalidPeriod);
        }
        if self.digits == 0 || self.digits > hotp::MAX_DIGITS {
            return Err(OtpError::InvalidDigits(self.digits));
        }

        Ok(())
    }

    /// The time step counter for the instant
    pub fn counter_at(&self, instant_ms: i64) -> Result<u64, OtpError> {
        self.validate()?;

        Ok(epoch_seconds(instant_ms)? / self.period)
    }

    /// Start of the step following the one containing the instant, in seconds since the epoch
    pub fn next_step_start(&self, instant_ms: i64) -> Result<u64, OtpError> {
        self.counter_at(instant_ms)?
            .checked_add(1)
            .and_then(|step| step.checked_mul(self.period))
            .ok_or(OtpError::InstantOutOfRange)
    }

    /// Whole seconds left in the step containing the instant
    pub fn seconds_remaining(&self, instant_ms: i64) -> Result<u64, OtpError> {
        Ok(self.next_step_start(instant_ms)? - epoch_seconds(instant_ms)?)
    }

    /// Generates the code valid for the step containing the instant.
    ///
    /// Returns `None` when no secret is configured.
    pub fn code_at(&self, instant_ms: i64) -> Result<Option<OtpCode>, OtpError> {
        let secret = base32::decode_secret(&self.secret)?;
        if secret.is_empty() {
            return Ok(None);
        }

        self.generate(&secret, instant_ms).map(Some)
    }

    /// Generates the current code, the code of the following step and the countdown
    /// between them.
    ///
    /// Returns `None` when no secret is configured.
    pub fn code_pair_at(&self, instant_ms: i64) -> Result<Option<CodePair>, OtpError> {
        let secret = base32::decode_secret(&self.secret)?;
        if secret.is_empty() {
            return Ok(None);
        }

        let next_start = self.next_step_start(instant_ms)?;
        let next_instant_ms = next_start
            .checked_mul(1000)
            .and_then(|ms| i64::try_from(ms).ok())
            .ok_or(OtpError::InstantOutOfRange)?;

        Ok(Some(CodePair {
            current: self.generate(&secret, instant_ms)?,
            next: self.generate(&secret, next_instant_ms)?,
            seconds_remaining: next_start - epoch_seconds(instant_ms)?,
        }))
    }

    fn generate(&self, secret: &[u8], instant_ms: i64) -> Result<OtpCode, OtpError> {
        let counter = self.counter_at(instant_ms)?;

        hotp::compute(secret, counter, self.algorithm, self.digits)
    }
}

fn epoch_seconds(instant_ms: i64) -> Result<u64, OtpError> {
    u64::try_from(instant_ms)
        .map(|ms| ms / 1000)
        .map_err(|_| OtpError::InstantBeforeEpoch(instant_ms))
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    use crate::{totp::Totp, OtpError, OtpHashAlgorithm};

    const SHA1_SECRET: &str = "GEZDGNBVGY3TQOJQGEZDGNBVGY3TQOJQ";
    const SHA256_SECRET: &str = "GEZDGNBVGY3TQOJQGEZDGNBVGY3TQOJQGEZDGNBVGY3TQOJQGEZA";
    const SHA512_SECRET: &str = "GEZDGNBVGY3TQOJQGEZDGNBVGY3TQOJQGEZDGNBVGY3TQOJQGEZDGNBVGY3TQOJQGEZDGNBVGY3TQOJQGEZDGNBVGY3TQOJQGEZDGNA";

    fn rfc6238(secret: &str, algorithm: OtpHashAlgorithm, digits: u32) -> Totp {
        let mut totp = Totp::new(secret.to_string());
        totp.with_algorithm(algorithm).with_digits(digits);

        totp
    }

    #[rstest]
    #[case(SHA1_SECRET, "sha1", 59, "94287082")]
    #[case(SHA256_SECRET, "sha256", 59, "46119246")]
    #[case(SHA512_SECRET, "sha512", 59, "90693936")]
    #[case(SHA1_SECRET, "sha1", 1111111109, "07081804")]
    #[case(SHA256_SECRET, "sha256", 1111111109, "68084774")]
    #[case(SHA512_SECRET, "sha512", 1111111109, "25091201")]
    #[case(SHA1_SECRET, "sha1", 1111111111, "14050471")]
    #[case(SHA256_SECRET, "sha256", 1111111111, "67062674")]
    #[case(SHA512_SECRET, "sha512", 1111111111, "99943326")]
    #[case(SHA1_SECRET, "sha1", 1234567890, "89005924")]
    #[case(SHA256_SECRET, "sha256", 1234567890, "91819424")]
    #[case(SHA512_SECRET, "sha512", 1234567890, "93441116")]
    #[case(SHA1_SECRET, "sha1", 2000000000, "69279037")]
    #[case(SHA256_SECRET, "sha256", 2000000000, "90698825")]
    #[case(SHA512_SECRET, "sha512", 2000000000, "38618901")]
    #[case(SHA1_SECRET, "sha1", 20000000000, "65353130")]
    #[case(SHA256_SECRET, "sha256", 20000000000, "77737706")]
    #[case(SHA512_SECRET, "sha512", 20000000000, "47863826")]
    #[case(SHA1_SECRET, "sha1", 20000000000, "353130")]
    #[case(SHA256_SECRET, "sha256", 20000000000, "737706")]
    #[case(SHA512_SECRET, "sha512", 20000000000, "863826")]
    fn totp_test(
        #[case] secret: &str,
        #[case] hash: OtpHashAlgorithm,
        #[case] timestamp: i64,
        #[case] expected: &str,
    ) {
        let totp = rfc6238(secret, hash, expected.len() as u32);

        let generated_otp = totp.code_at(timestamp * 1000).unwrap().unwrap();
        assert_eq!(expected, generated_otp.to_string());
    }

    #[test]
    fn code_pair_at_rfc_instant() {
        let totp = rfc6238(SHA1_SECRET, OtpHashAlgorithm::SHA1, 8);

        let pair = totp.code_pair_at(59_000).unwrap().unwrap();

        assert_eq!("94287082", pair.current.to_string());
        // Counter 2 of the RFC 4226 table, reduced to 8 digits
        assert_eq!("37359152", pair.next.to_string());
        assert_eq!(1, pair.seconds_remaining);
    }

    #[test]
    fn next_code_is_the_code_at_next_step_start() {
        let totp = rfc6238(SHA1_SECRET, OtpHashAlgorithm::SHA256, 6);
        let instant = 1_111_111_109_250;

        let pair = totp.code_pair_at(instant).unwrap().unwrap();
        let next_start = totp.next_step_start(instant).unwrap();

        assert_eq!(1_111_111_110, next_start);
        assert_eq!(
            totp.code_at(next_start as i64 * 1000).unwrap().unwrap(),
            pair.next
        );
    }

    #[rstest]
    #[case(0, 30)]
    #[case(999, 30)]
    #[case(1_000, 29)]
    #[case(29_999, 1)]
    #[case(30_000, 30)]
    #[case(59_000, 1)]
    fn countdown_stays_within_period(#[case] instant_ms: i64, #[case] expected: u64) {
        let totp = Totp::new(SHA1_SECRET.to_string());

        assert_eq!(expected, totp.seconds_remaining(instant_ms).unwrap());
    }

    #[test]
    fn countdown_bound_holds_for_odd_periods() {
        let mut totp = Totp::new(SHA1_SECRET.to_string());
        totp.with_period(7);

        for instant_ms in (0..50_000).step_by(333) {
            let remaining = totp.seconds_remaining(instant_ms).unwrap();
            assert!(remaining > 0 && remaining <= 7, "{remaining} at {instant_ms}");
        }
    }

    #[test]
    fn counter_is_monotonic() {
        let mut totp = Totp::new(SHA1_SECRET.to_string());
        totp.with_period(45);

        let mut previous = 0;
        for instant_ms in (0..10_000_000).step_by(7_919) {
            let counter = totp.counter_at(instant_ms).unwrap();
            assert!(counter >= previous);
            previous = counter;
        }
    }

    #[test]
    fn counter_beyond_32_bits() {
        let mut totp = Totp::new(SHA1_SECRET.to_string());
        totp.with_period(1);
        let instant_ms = ((1i64 << 32) + 5) * 1000;

        assert_eq!((1u64 << 32) + 5, totp.counter_at(instant_ms).unwrap());
        assert_ne!(
            totp.code_at(instant_ms).unwrap(),
            totp.code_at(5_000).unwrap()
        );
    }

    #[rstest]
    #[case("")]
    #[case("   ")]
    #[case("====")]
    fn empty_secret_yields_no_code(#[case] secret: &str) {
        let totp = Totp::new(secret.to_string());

        assert_eq!(None, totp.code_at(59_000).unwrap());
        assert_eq!(None, totp.code_pair_at(59_000).unwrap());
    }

    #[test]
    fn surfaces_decode_errors() {
        let totp = Totp::new("GEZD1234".to_string());

        assert!(matches!(
            totp.code_pair_at(59_000),
            Err(OtpError::InvalidBase32Character {
                character: '1',
                position: 4
            })
        ));
    }

    #[test]
    fn rejects_invalid_configuration() {
        let mut totp = Totp::new(SHA1_SECRET.to_string());

        totp.with_period(0);
        assert!(matches!(totp.code_at(59_000), Err(OtpError::InvalidPeriod)));

        totp.with_period(30).with_digits(0);
        assert!(matches!(
            totp.code_pair_at(59_000),
            Err(OtpError::InvalidDigits(0))
        ));
    }

    #[test]
    fn rejects_instants_before_epoch() {
        let totp = Totp::new(SHA1_SECRET.to_string());

        assert!(matches!(
            totp.code_at(-1),
            Err(OtpError::InstantBeforeEpoch(-1))
        ));
    }

    #[test]
    fn default_profile_detection() {
        let mut totp = Totp::new(SHA1_SECRET.to_string());
        assert!(totp.is_default_profile());

        totp.with_algorithm(OtpHashAlgorithm::SHA512);
        assert!(!totp.is_default_profile());
    }
}
