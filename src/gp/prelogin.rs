//! GlobalProtect prelogin
//!
//! For SAML gateways the prelogin response carries the IdP redirect as a
//! base64-encoded HTML form inside `<saml-request>`:
//!
//! ```xml
//! <prelogin-response>
//!   <status>Success</status>
//!   <saml-auth-method>REDIRECT</saml-auth-method>
//!   <saml-request>PGh0bWw+...</saml-request>
//! </prelogin-response>
//! ```

use crate::error::LoginError;
use crate::form::extract_form;
use crate::http::HttpSession;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::Deserialize;
use tracing::{debug, info};

#[derive(Debug, Deserialize)]
#[serde(rename = "prelogin-response")]
struct PreloginXml {
    #[serde(default)]
    status: Option<String>,
    #[serde(rename = "saml-auth-method", default)]
    saml_auth_method: Option<String>,
    #[serde(rename = "saml-request", default)]
    saml_request: Option<String>,
}

/// Ask the gateway where to authenticate
///
/// # Arguments
/// * `gateway` - Gateway host, optionally with a port
///
/// # Returns
/// The IdP URL with the SAML request form fields as its query string
pub async fn prelogin(session: &HttpSession, gateway: &str) -> Result<String, LoginError> {
    let url = session.url(gateway, "/ssl-vpn/prelogin.esp");
    info!("Sending prelogin request to {}", gateway);

    let response = session.post(&url).await?;
    let body = response.text().await?;

    let request_url = saml_request_url(&body)?;
    info!("Gateway redirects to {}", crate::http::redact(&request_url));
    Ok(request_url)
}

fn saml_request_url(body: &str) -> Result<String, LoginError> {
    let prelogin: PreloginXml = quick_xml::de::from_str(body)?;
    debug!(
        "Prelogin status={:?} saml-auth-method={:?}",
        prelogin.status, prelogin.saml_auth_method
    );

    let encoded = prelogin.saml_request.ok_or_else(|| {
        LoginError::missing(format!(
            "<saml-request> in prelogin response (status {})",
            prelogin.status.as_deref().unwrap_or("unknown")
        ))
    })?;

    let compact: String = encoded.chars().filter(|c| !c.is_whitespace()).collect();
    let html = STANDARD.decode(compact)?;

    let form = extract_form(&String::from_utf8_lossy(&html))?;
    form.require_field("SAMLRequest")?;
    form.to_get_url()
}
