//! MFA factors offered by Okta and how one is chosen

use crate::error::LoginError;
use serde::Deserialize;

const SOFTWARE_TOTP: &str = "token:software:totp";

/// Factor types we know how to drive
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FactorKind {
    Push,
    Sms,
    /// `token:software:totp`, computed locally when a seed is available
    SoftwareTotp,
    /// Any other `token` / `token:*` factor (hardware tokens, RSA, ...)
    OtherToken,
    /// Parsed but never selected (`question`, `email`, `webauthn`, ...)
    Unsupported,
}

impl FactorKind {
    pub fn from_type(factor_type: &str) -> Self {
        match factor_type {
            "push" => FactorKind::Push,
            "sms" => FactorKind::Sms,
            SOFTWARE_TOTP => FactorKind::SoftwareTotp,
            t if t == "token" || t.starts_with("token:") => FactorKind::OtherToken,
            _ => FactorKind::Unsupported,
        }
    }

    /// Lower ranks first. A software TOTP factor only jumps the queue when we
    /// can answer it without the user.
    fn priority(&self, have_seed: bool) -> u8 {
        match self {
            FactorKind::SoftwareTotp if have_seed => 0,
            FactorKind::Push => 1,
            _ => 2,
        }
    }
}

#[derive(Debug, Deserialize)]
struct Link {
    href: String,
}

#[derive(Debug, Deserialize)]
struct FactorLinks {
    verify: Option<Link>,
}

/// One entry of `_embedded.factors`
#[derive(Debug, Clone, Deserialize)]
#[serde(from = "FactorJson")]
pub struct Factor {
    pub kind: FactorKind,
    pub factor_type: String,
    pub verify_url: Option<String>,
    pub provider: Option<String>,
    pub vendor_name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FactorJson {
    #[serde(rename = "factorType")]
    factor_type: String,
    #[serde(default)]
    provider: Option<String>,
    #[serde(rename = "vendorName", default)]
    vendor_name: Option<String>,
    #[serde(rename = "_links", default)]
    links: Option<FactorLinks>,
}

impl From<FactorJson> for Factor {
    fn from(json: FactorJson) -> Self {
        Self {
            kind: FactorKind::from_type(&json.factor_type),
            verify_url: json.links.and_then(|l| l.verify).map(|l| l.href),
            factor_type: json.factor_type,
            provider: json.provider,
            vendor_name: json.vendor_name,
        }
    }
}

impl Factor {
    pub fn verify_url(&self) -> Result<&str, LoginError> {
        self.verify_url
            .as_deref()
            .ok_or_else(|| LoginError::missing(format!("_links.verify.href for {}", self.factor_type)))
    }
}

/// Pick the single factor to pursue
///
/// Ties keep the server's order. Unsupported factor types are skipped.
pub fn select_factor(factors: &[Factor], have_seed: bool) -> Result<&Factor, LoginError> {
    factors
        .iter()
        .filter(|f| f.kind != FactorKind::Unsupported)
        .min_by_key(|f| f.kind.priority(have_seed))
        .ok_or(LoginError::NoSupportedFactor)
}
