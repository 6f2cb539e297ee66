/// GlobalProtect gateway side of the login
///
/// The gateway only appears at both ends of the flow: `prelogin` hands us
/// the SAML request that points at Okta, and `complete_saml` trades Okta's
/// SAML response for the prelogin cookie OpenConnect logs in with.
pub mod prelogin;
pub mod saml;

pub use prelogin::prelogin;
pub use saml::{CredentialHandoff, complete_saml};
