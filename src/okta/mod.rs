/// Okta side of the login
///
/// Okta is reached through the SAML request the gateway hands out. We skip
/// the browser: authenticate through the authn API, then let Okta's
/// session-cookie redirect produce the SAML response form.
pub mod authn;
pub mod factor;
pub mod otp;
pub mod saml;

pub use authn::{AuthState, AuthStatus, OktaAuth, PushPolicy};
pub use factor::{Factor, FactorKind, select_factor};
pub use otp::OtpGenerator;
pub use saml::{idp_domain, okta_saml};
