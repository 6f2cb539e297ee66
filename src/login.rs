//! End-to-end login: gateway prelogin, Okta, SAML completion, VPN client
//!
//! Stages run strictly in order and each one needs the previous result:
//!
//! ```text
//! prelogin ──> okta_saml (authn + MFA) ──> complete_saml ──> VPN client
//! ```

use crate::credentials::SecretStore;
use crate::error::LoginError;
use crate::gp::{CredentialHandoff, complete_saml, prelogin};
use crate::http::HttpSession;
use crate::okta::{OktaAuth, OtpGenerator, PushPolicy, idp_domain, okta_saml};
use crate::openconnect::{ClientSettings, SupervisorError, exit_code, run_with_secret};
use crate::prompt::Prompter;
use thiserror::Error;
use tracing::{info, warn};

#[derive(Error, Debug)]
pub enum ConnectError {
    #[error(transparent)]
    Login(#[from] LoginError),
    #[error(transparent)]
    Supervisor(#[from] SupervisorError),
    #[error("Failed to start async runtime: {0}")]
    Runtime(#[source] std::io::Error),
}

/// Who logs in where
pub struct LoginRequest {
    /// Gateway host, optionally with a port
    pub gateway: String,
    pub username: String,
    pub password: String,
    /// Base32 seed for the software TOTP factor
    pub totp_key: Option<String>,
    pub push: PushPolicy,
}

impl LoginRequest {
    /// Generator for `totp_key`, if one was given
    ///
    /// Fails with `LoginError::Configuration` on a bad seed or when built
    /// without the `totp` feature.
    pub fn otp_generator(&self) -> Result<Option<OtpGenerator>, LoginError> {
        self.totp_key
            .as_deref()
            .map(OtpGenerator::from_seed)
            .transpose()
    }
}

/// Run every HTTP stage and return the credentials for the VPN client
pub async fn login(
    session: &HttpSession,
    request: &LoginRequest,
    prompter: &dyn Prompter,
    otp: Option<&OtpGenerator>,
) -> Result<CredentialHandoff, LoginError> {
    let saml_request_url = prelogin(session, &request.gateway).await?;

    let auth = OktaAuth::new(session, idp_domain(&saml_request_url)?, prompter)
        .with_otp(otp)
        .with_push_policy(request.push);
    let saml_response = okta_saml(&auth, &saml_request_url, &request.username, &request.password).await?;

    complete_saml(session, &saml_response).await
}

/// Log in, then run the VPN client until it exits
///
/// The TOTP seed is checked before any request is sent. The HTTP phase runs on a current-thread runtime that is shut down before
/// the client starts, so signal handling happens in a single-threaded
/// process. `on_login` runs between the two phases.
///
/// # Returns
/// The exit code to propagate from the VPN client
pub fn connect<F>(
    session: HttpSession,
    request: &LoginRequest,
    prompter: &dyn Prompter,
    client: &ClientSettings,
    on_login: F,
) -> Result<i32, ConnectError>
where
    F: FnOnce(&CredentialHandoff),
{
    let otp = request.otp_generator()?;

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(ConnectError::Runtime)?;
    let handoff = runtime.block_on(async move {
        let handoff = login(&session, request, prompter, otp.as_ref()).await;
        drop(session);
        handoff
    })?;
    drop(runtime);

    on_login(&handoff);

    let command = client.command(&request.gateway, &handoff.saml_username);
    let status = run_with_secret(command, handoff.prelogin_cookie().as_bytes())?;
    Ok(exit_code(status))
}

/// Where the password came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PasswordSource {
    CommandLine,
    Keyring,
    Prompt,
}

/// Command line value, else the secret store, else a non-echoing prompt
///
/// A failing secret store is logged and treated as empty.
pub fn resolve_password(
    explicit: Option<String>,
    store: &dyn SecretStore,
    prompter: &dyn Prompter,
    gateway: &str,
    username: &str,
) -> Result<(String, PasswordSource), LoginError> {
    if let Some(password) = explicit {
        return Ok((password, PasswordSource::CommandLine));
    }

    match store.get_password(gateway, username) {
        Ok(Some(password)) => {
            info!("Using stored password for {}", username);
            return Ok((password, PasswordSource::Keyring));
        }
        Ok(None) => {}
        Err(e) => warn!("Could not read stored password: {}", e),
    }

    let password = prompter.password("Password: ").map_err(LoginError::Prompt)?;
    Ok((password, PasswordSource::Prompt))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credentials::{CredentialError, NoSecretStore};
    use std::io;

    struct FixedPrompter(&'static str);

    impl Prompter for FixedPrompter {
        fn username(&self) -> io::Result<String> {
            Ok(self.0.to_string())
        }
        fn password(&self, _prompt: &str) -> io::Result<String> {
            Ok(self.0.to_string())
        }
        fn one_time_code(&self, _prompt: &str) -> io::Result<String> {
            Ok(self.0.to_string())
        }
    }

    struct FixedStore(Option<&'static str>);

    impl SecretStore for FixedStore {
        fn get_password(&self, service: &str, account: &str) -> Result<Option<String>, CredentialError> {
            assert_eq!(service, "vpn.example.com");
            assert_eq!(account, "alice");
            Ok(self.0.map(str::to_string))
        }
        fn set_password(&self, _: &str, _: &str, _: &str) -> Result<(), CredentialError> {
            Ok(())
        }
    }

    #[test]
    fn test_explicit_password_wins() {
        let (password, source) = resolve_password(
            Some("cli".to_string()),
            &FixedStore(Some("stored")),
            &FixedPrompter("typed"),
            "vpn.example.com",
            "alice",
        )
        .unwrap();
        assert_eq!(password, "cli");
        assert_eq!(source, PasswordSource::CommandLine);
    }

    #[test]
    fn test_keyring_before_prompt() {
        let (password, source) = resolve_password(
            None,
            &FixedStore(Some("stored")),
            &FixedPrompter("typed"),
            "vpn.example.com",
            "alice",
        )
        .unwrap();
        assert_eq!(password, "stored");
        assert_eq!(source, PasswordSource::Keyring);
    }

    #[test]
    fn test_prompt_when_nothing_stored() {
        let (password, source) = resolve_password(
            None,
            &NoSecretStore,
            &FixedPrompter("typed"),
            "vpn.example.com",
            "alice",
        )
        .unwrap();
        assert_eq!(password, "typed");
        assert_eq!(source, PasswordSource::Prompt);
    }

    fn request(totp_key: Option<&str>) -> LoginRequest {
        LoginRequest {
            gateway: "vpn.example.com".to_string(),
            username: "alice".to_string(),
            password: "hunter2".to_string(),
            totp_key: totp_key.map(str::to_string),
            push: PushPolicy::default(),
        }
    }

    #[test]
    fn test_no_totp_key_no_generator() {
        assert!(request(None).otp_generator().unwrap().is_none());
    }

    #[test]
    fn test_invalid_totp_key_is_configuration_error() {
        assert!(matches!(
            request(Some("not base32!")).otp_generator(),
            Err(LoginError::Configuration(_))
        ));
    }
}
