//! Okta SAML response retrieval

use crate::error::LoginError;
use crate::form::{FormDescriptor, extract_form};
use crate::http::redact;
use crate::okta::authn::OktaAuth;
use tracing::{debug, info};
use url::Url;

/// Okta host (with port, if any) the SAML request points at
pub fn idp_domain(saml_request_url: &str) -> Result<String, LoginError> {
    let url = Url::parse(saml_request_url).map_err(|e| {
        LoginError::MalformedResponse(format!("invalid SAML request URL: {}", e))
    })?;
    let host = url
        .host_str()
        .ok_or_else(|| LoginError::missing("host in SAML request URL"))?;

    Ok(match url.port() {
        Some(port) => format!("{}:{}", host, port),
        None => host.to_string(),
    })
}

/// Authenticate with Okta and fetch the SAML response form for the gateway
///
/// `auth` must target the domain returned by [`idp_domain`] for
/// `saml_request_url`.
pub async fn okta_saml(
    auth: &OktaAuth<'_>,
    saml_request_url: &str,
    username: &str,
    password: &str,
) -> Result<FormDescriptor, LoginError> {
    let session = auth.session();

    // Only sets the DT cookie
    session.get(saml_request_url).await?;
    debug!("Visited {}", redact(saml_request_url));

    let token = auth.authenticate(username, password).await?;

    let redirect = session.url(auth.domain(), "/login/sessionCookieRedirect");
    let response = session
        .get_with_query(&redirect, &[("token", token.as_str()), ("redirectUrl", saml_request_url)])
        .await?;
    let body = response.text().await?;

    let form = extract_form(&body)?;
    form.require_field("SAMLResponse")?;
    info!("Received SAML response for {}", redact(&form.action));
    Ok(form)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::DeviceToken;
    use crate::http::HttpSession;
    use crate::prompt::Prompter;
    use serde_json::json;
    use std::io;
    use wiremock::{Mock, MockServer, ResponseTemplate, matchers};

    struct NoPrompt;

    impl Prompter for NoPrompt {
        fn username(&self) -> io::Result<String> {
            Err(io::ErrorKind::Unsupported.into())
        }
        fn password(&self, _prompt: &str) -> io::Result<String> {
            Err(io::ErrorKind::Unsupported.into())
        }
        fn one_time_code(&self, _prompt: &str) -> io::Result<String> {
            Err(io::ErrorKind::Unsupported.into())
        }
    }

    #[test]
    fn test_idp_domain() {
        assert_eq!(
            idp_domain("https://example.okta.com/app/gp/abc/sso/saml?SAMLRequest=x").unwrap(),
            "example.okta.com"
        );
        assert_eq!(
            idp_domain("http://127.0.0.1:8080/app/sso/saml").unwrap(),
            "127.0.0.1:8080"
        );
        assert!(idp_domain("/relative/path").is_err());
    }

    async fn mount_login(server: &MockServer, saml_response_page: &str) {
        Mock::given(matchers::method("GET"))
            .and(matchers::path("/app/sso/saml"))
            .respond_with(ResponseTemplate::new(200).insert_header("set-cookie", "DT=dt-cookie; Path=/"))
            .expect(1)
            .mount(server)
            .await;
        Mock::given(matchers::method("POST"))
            .and(matchers::path("/api/v1/authn"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "status": "SUCCESS",
                "sessionToken": "T"
            })))
            .expect(1)
            .mount(server)
            .await;
        Mock::given(matchers::method("GET"))
            .and(matchers::path("/login/sessionCookieRedirect"))
            .and(matchers::query_param("token", "T"))
            .and(matchers::query_param(
                "redirectUrl",
                format!("{}/app/sso/saml?SAMLRequest=abc", server.uri()),
            ))
            .and(matchers::header("cookie", "DT=dt-cookie"))
            .respond_with(ResponseTemplate::new(200).set_body_string(saml_response_page))
            .expect(1)
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn test_okta_saml_returns_response_form() {
        let server = MockServer::start().await;
        mount_login(
            &server,
            r#"<html><body><form method="POST" action="https://gw.example.com/SAML20/SP/ACS">
                <input type="hidden" name="SAMLResponse" value="xyz"/>
                <input type="hidden" name="RelayState" value=""/>
            </form></body></html>"#,
        )
        .await;

        let session = HttpSession::new(DeviceToken::new("dev")).unwrap().with_scheme("http");
        let saml_request_url = format!("{}/app/sso/saml?SAMLRequest=abc", server.uri());
        let auth = OktaAuth::new(&session, idp_domain(&saml_request_url).unwrap(), &NoPrompt);

        let form = okta_saml(&auth, &saml_request_url, "alice", "hunter2").await.unwrap();
        assert_eq!(form.action, "https://gw.example.com/SAML20/SP/ACS");
        assert_eq!(form.fields["SAMLResponse"], "xyz");
    }

    #[tokio::test]
    async fn test_okta_saml_without_saml_response() {
        let server = MockServer::start().await;
        mount_login(&server, r#"<form action="/login"><input name="error" value="1"></form>"#).await;

        let session = HttpSession::new(DeviceToken::new("dev")).unwrap().with_scheme("http");
        let saml_request_url = format!("{}/app/sso/saml?SAMLRequest=abc", server.uri());
        let auth = OktaAuth::new(&session, idp_domain(&saml_request_url).unwrap(), &NoPrompt);

        let err = okta_saml(&auth, &saml_request_url, "alice", "hunter2").await.unwrap_err();
        assert!(err.to_string().contains("SAMLResponse"));
    }
}
