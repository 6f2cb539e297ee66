//! SAML completion against the gateway
//!
//! Posting Okta's SAML response to the gateway's ACS endpoint answers with
//! two headers, `saml-username` and `prelogin-cookie`. OpenConnect then logs
//! in with `--usergroup=gateway:prelogin-cookie` and the cookie as password.

use crate::error::LoginError;
use crate::form::FormDescriptor;
use crate::http::HttpSession;
use reqwest::header::HeaderMap;
use std::fmt;
use tracing::info;

const SAML_USERNAME: &str = "saml-username";
const PRELOGIN_COOKIE: &str = "prelogin-cookie";

/// Final output of a login, consumed by the VPN client
///
/// The cookie is a short-lived password. It is never logged and `Debug`
/// redacts it.
#[derive(Clone, PartialEq, Eq)]
pub struct CredentialHandoff {
    pub saml_username: String,
    prelogin_cookie: String,
}

impl CredentialHandoff {
    pub fn new(saml_username: impl Into<String>, prelogin_cookie: impl Into<String>) -> Self {
        Self {
            saml_username: saml_username.into(),
            prelogin_cookie: prelogin_cookie.into(),
        }
    }

    pub fn prelogin_cookie(&self) -> &str {
        &self.prelogin_cookie
    }
}

impl fmt::Debug for CredentialHandoff {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialHandoff")
            .field("saml_username", &self.saml_username)
            .field("prelogin_cookie", &"<redacted>")
            .finish()
    }
}

/// Submit the SAML response form to the gateway
pub async fn complete_saml(
    session: &HttpSession,
    saml_response: &FormDescriptor,
) -> Result<CredentialHandoff, LoginError> {
    info!("Completing SAML login at {}", crate::http::redact(&saml_response.action));

    let response = session
        .post_form(&saml_response.action, &saml_response.fields)
        .await?;
    let handoff = handoff_from_headers(response.headers())?;

    info!("Gateway accepted SAML login for {}", handoff.saml_username);
    Ok(handoff)
}

fn handoff_from_headers(headers: &HeaderMap) -> Result<CredentialHandoff, LoginError> {
    let header = |name: &str| -> Result<String, LoginError> {
        headers
            .get(name)
            .ok_or_else(|| LoginError::missing(format!("header {}", name)))?
            .to_str()
            .map(str::to_string)
            .map_err(|_| LoginError::MalformedResponse(format!("non-ASCII header {}", name)))
    };

    Ok(CredentialHandoff::new(
        header(SAML_USERNAME)?,
        header(PRELOGIN_COOKIE)?,
    ))
}
