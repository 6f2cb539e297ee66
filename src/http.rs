//! HTTP session shared by every login stage
//!
//! One `HttpSession` lives for one login attempt. It owns the cookie jar
//! (Okta's `DT` cookie and the gateway's SAML cookies travel through it) and
//! the device token sent with every JSON body.

use crate::device::DeviceToken;
use crate::error::LoginError;
use indexmap::IndexMap;
use reqwest::{Client, Response};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use tracing::debug;

const USER_AGENT: &str = "PAN GlobalProtect";

pub struct HttpSession {
    client: Client,
    scheme: String,
    device_token: DeviceToken,
}

impl HttpSession {
    pub fn new(device_token: DeviceToken) -> Result<Self, LoginError> {
        let client = Client::builder()
            .danger_accept_invalid_certs(false)
            .cookie_store(true)
            .user_agent(USER_AGENT)
            .build()?;

        Ok(Self {
            client,
            scheme: "https".to_string(),
            device_token,
        })
    }

    /// Use a different scheme for host-relative URLs (plain `http` for local test servers)
    pub fn with_scheme(mut self, scheme: &str) -> Self {
        self.scheme = scheme.to_string();
        self
    }

    /// Build `<scheme>://<host><path>`
    pub fn url(&self, host: &str, path: &str) -> String {
        format!("{}://{}{}", self.scheme, host, path)
    }

    pub fn device_token(&self) -> &DeviceToken {
        &self.device_token
    }

    pub async fn get(&self, url: &str) -> Result<Response, LoginError> {
        debug!("GET {}", redact(url));
        check(self.client.get(url).send().await?)
    }

    pub async fn get_with_query(
        &self,
        url: &str,
        query: &[(&str, &str)],
    ) -> Result<Response, LoginError> {
        debug!("GET {}", redact(url));
        check(self.client.get(url).query(query).send().await?)
    }

    pub async fn post(&self, url: &str) -> Result<Response, LoginError> {
        debug!("POST {}", redact(url));
        check(self.client.post(url).send().await?)
    }

    pub async fn post_form(
        &self,
        url: &str,
        fields: &IndexMap<String, String>,
    ) -> Result<Response, LoginError> {
        debug!("POST {} (form, {} fields)", redact(url), fields.len());
        check(self.client.post(url).form(fields).send().await?)
    }

    /// POST a JSON object with `context.deviceToken` added, and decode the JSON reply
    pub async fn post_json<B, R>(&self, url: &str, body: &B) -> Result<R, LoginError>
    where
        B: Serialize,
        R: DeserializeOwned,
    {
        debug!("POST {} (json)", redact(url));
        let body = with_device_context(serde_json::to_value(body)?, &self.device_token);
        let response = check(self.client.post(url).json(&body).send().await?)?;
        let bytes = response.bytes().await?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}

fn with_device_context(mut body: Value, token: &DeviceToken) -> Value {
    if let Value::Object(map) = &mut body {
        map.insert(
            "context".to_string(),
            json!({ "deviceToken": token.as_str() }),
        );
    }
    body
}

/// Reject any non-2xx response
fn check(response: Response) -> Result<Response, LoginError> {
    let status = response.status();
    if status.is_success() {
        Ok(response)
    } else {
        Err(LoginError::HttpStatus {
            status,
            url: redact(response.url().as_str()),
        })
    }
}

/// Drop query and fragment, which may carry tokens
pub(crate) fn redact(url: &str) -> String {
    match url::Url::parse(url) {
        Ok(mut parsed) => {
            parsed.set_query(None);
            parsed.set_fragment(None);
            parsed.to_string()
        }
        Err(_) => url.split(['?', '#']).next().unwrap_or_default().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::{Mock, MockServer, ResponseTemplate, matchers};

    fn session() -> HttpSession {
        HttpSession::new(DeviceToken::new("test-device"))
            .unwrap()
            .with_scheme("http")
    }

    #[test]
    fn test_redact_strips_query() {
        assert_eq!(
            redact("https://idp.example.com/login/sessionCookieRedirect?token=secret"),
            "https://idp.example.com/login/sessionCookieRedirect"
        );
        assert_eq!(redact("not a url?token=x"), "not a url");
    }

    #[test]
    fn test_device_context_added() {
        let body = with_device_context(
            json!({ "stateToken": "abc" }),
            &DeviceToken::new("dev-1"),
        );
        assert_eq!(body["stateToken"], "abc");
        assert_eq!(body["context"]["deviceToken"], "dev-1");
    }

    #[tokio::test]
    async fn test_non_success_status_is_error() {
        let server = MockServer::start().await;
        Mock::given(matchers::method("GET"))
            .and(matchers::path("/missing"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let session = session();
        let url = format!("{}/missing?token=secret", server.uri());
        let err = session.get(&url).await.unwrap_err();

        match err {
            LoginError::HttpStatus { status, url } => {
                assert_eq!(status, reqwest::StatusCode::NOT_FOUND);
                assert!(!url.contains("secret"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_post_json_sends_device_token() {
        let server = MockServer::start().await;
        Mock::given(matchers::method("POST"))
            .and(matchers::path("/api/v1/authn"))
            .and(matchers::body_json(json!({
                "username": "alice",
                "context": { "deviceToken": "test-device" }
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "status": "SUCCESS" })))
            .expect(1)
            .mount(&server)
            .await;

        let session = session();
        let reply: Value = session
            .post_json(
                &session.url(&server.address().to_string(), "/api/v1/authn"),
                &json!({ "username": "alice" }),
            )
            .await
            .unwrap();
        assert_eq!(reply["status"], "SUCCESS");
    }

    #[tokio::test]
    async fn test_cookies_are_shared_between_requests() {
        let server = MockServer::start().await;
        Mock::given(matchers::method("GET"))
            .and(matchers::path("/set"))
            .respond_with(ResponseTemplate::new(200).insert_header("set-cookie", "DT=device; Path=/"))
            .mount(&server)
            .await;
        Mock::given(matchers::method("GET"))
            .and(matchers::path("/check"))
            .and(matchers::header("cookie", "DT=device"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let session = session();
        session.get(&format!("{}/set", server.uri())).await.unwrap();
        session.get(&format!("{}/check", server.uri())).await.unwrap();
    }
}
