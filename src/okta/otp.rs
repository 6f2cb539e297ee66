//! Software TOTP codes from a pre-shared seed
//!
//! Okta Verify and Google Authenticator factors are plain RFC 6238 TOTP:
//! SHA1, 6 digits, 30 second step, base32 seed.

use crate::error::LoginError;

#[cfg(feature = "totp")]
use totp_rs::{Algorithm, Secret, TOTP};

const DIGITS: usize = 6;
const STEP_SECS: u64 = 30;

pub struct OtpGenerator {
    #[cfg(feature = "totp")]
    totp: TOTP,
}

impl OtpGenerator {
    /// Validate `seed` and build a generator for it
    ///
    /// Fails with `LoginError::Configuration` when the seed is not base32 or
    /// the crate was built without the `totp` feature.
    #[cfg(feature = "totp")]
    pub fn from_seed(seed: &str) -> Result<Self, LoginError> {
        let normalized: String = seed
            .chars()
            .filter(|c| !c.is_whitespace() && *c != '=' && *c != '-')
            .map(|c| c.to_ascii_uppercase())
            .collect();

        let secret = Secret::Encoded(normalized)
            .to_bytes()
            .map_err(|_| LoginError::Configuration("TOTP key is not valid base32".to_string()))?;
        if secret.is_empty() {
            return Err(LoginError::Configuration("TOTP key is empty".to_string()));
        }

        // Okta seeds are often 80 bits, below the 128 bit minimum `TOTP::new` enforces
        let totp = TOTP::new_unchecked(Algorithm::SHA1, DIGITS, 1, STEP_SECS, secret);
        Ok(Self { totp })
    }

    #[cfg(not(feature = "totp"))]
    pub fn from_seed(_seed: &str) -> Result<Self, LoginError> {
        Err(LoginError::Configuration(
            "--totp-key requires building with the `totp` feature".to_string(),
        ))
    }

    /// Code for the 30 second window containing `unix_secs`
    #[cfg(feature = "totp")]
    pub fn code_at(&self, unix_secs: u64) -> String {
        self.totp.generate(unix_secs)
    }

    #[cfg(not(feature = "totp"))]
    pub fn code_at(&self, _unix_secs: u64) -> String {
        unreachable!("OtpGenerator cannot be constructed without the totp feature")
    }

    pub fn current(&self) -> Result<String, LoginError> {
        let now = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map_err(|e| LoginError::Configuration(format!("system clock before epoch: {}", e)))?;
        Ok(self.code_at(now.as_secs()))
    }
}


#[cfg(all(test, not(feature = "totp")))]
mod tests_without_totp {
    use super::*;

    #[test]
    fn test_seed_rejected_without_feature() {
        assert!(matches!(
            OtpGenerator::from_seed("GEZDGNBVGY3TQOJQGEZDGNBVGY3TQOJQ"),
            Err(LoginError::Configuration(_))
        ));
    }
}
