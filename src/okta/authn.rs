//! Okta primary authentication and MFA
//!
//! Drives the `/api/v1/authn` state machine:
//! 1. POST username/password
//! 2. `SUCCESS` ends immediately; `MFA_REQUIRED` lists the factors
//! 3. exactly one factor is verified (push, SMS, or a token code)
//! 4. the final state must be `SUCCESS` and carries the session token
//!
//! A factor that fails is never followed by another one.

use crate::error::LoginError;
use crate::http::HttpSession;
use crate::okta::factor::{Factor, FactorKind, select_factor};
use crate::okta::otp::OtpGenerator;
use crate::prompt::Prompter;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info};

const DEFAULT_PUSH_INTERVAL: Duration = Duration::from_secs(2);

/// Transaction status reported by Okta
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthStatus {
    Success,
    MfaRequired,
    MfaChallenge,
    /// Anything else (`LOCKED_OUT`, `PASSWORD_EXPIRED`, ...) is fatal here
    Other(String),
}

impl AuthStatus {
    fn parse(status: &str) -> Self {
        match status {
            "SUCCESS" => AuthStatus::Success,
            "MFA_REQUIRED" => AuthStatus::MfaRequired,
            "MFA_CHALLENGE" => AuthStatus::MfaChallenge,
            other => AuthStatus::Other(other.to_string()),
        }
    }

    fn as_str(&self) -> &str {
        match self {
            AuthStatus::Success => "SUCCESS",
            AuthStatus::MfaRequired => "MFA_REQUIRED",
            AuthStatus::MfaChallenge => "MFA_CHALLENGE",
            AuthStatus::Other(s) => s,
        }
    }
}

/// One authn transaction response
#[derive(Debug, Deserialize)]
pub struct AuthState {
    #[serde(deserialize_with = "status_from_str")]
    pub status: AuthStatus,
    #[serde(rename = "stateToken", default)]
    state_token: Option<String>,
    #[serde(rename = "sessionToken", default)]
    session_token: Option<String>,
    #[serde(rename = "factorResult", default)]
    factor_result: Option<String>,
    #[serde(rename = "_embedded", default)]
    embedded: Option<Embedded>,
}

#[derive(Debug, Deserialize)]
struct Embedded {
    #[serde(default)]
    factors: Vec<Factor>,
}

fn status_from_str<'de, D>(deserializer: D) -> Result<AuthStatus, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    Ok(AuthStatus::parse(&raw))
}

impl AuthState {
    fn state_token(&self) -> Result<&str, LoginError> {
        self.state_token
            .as_deref()
            .ok_or_else(|| LoginError::missing("stateToken"))
    }

    fn factors(&self) -> &[Factor] {
        self.embedded
            .as_ref()
            .map(|e| e.factors.as_slice())
            .unwrap_or_default()
    }

    fn expect_status(&self, step: &'static str, expected: AuthStatus) -> Result<(), LoginError> {
        if self.status == expected {
            Ok(())
        } else {
            Err(LoginError::ProtocolAssertion {
                step,
                expected: expected.as_str().to_string(),
                actual: self.status.as_str().to_string(),
            })
        }
    }

    fn into_session_token(self) -> Result<String, LoginError> {
        self.expect_status("authentication", AuthStatus::Success)?;
        self.session_token
            .ok_or_else(|| LoginError::missing("sessionToken"))
    }
}

#[derive(Serialize)]
struct PrimaryAuthRequest<'a> {
    username: &'a str,
    password: &'a str,
}

#[derive(Serialize)]
struct VerifyRequest<'a> {
    #[serde(rename = "stateToken")]
    state_token: &'a str,
    #[serde(rename = "passCode", skip_serializing_if = "Option::is_none")]
    pass_code: Option<&'a str>,
}

/// How the push factor is polled
#[derive(Debug, Clone, Copy)]
pub struct PushPolicy {
    /// Delay between consecutive verify calls
    pub interval: Duration,
    /// Give up after this many verify calls; `None` polls until Okta answers
    pub max_polls: Option<u32>,
}

impl Default for PushPolicy {
    fn default() -> Self {
        Self {
            interval: DEFAULT_PUSH_INTERVAL,
            max_polls: None,
        }
    }
}

/// Where a push verification stands after one poll
#[derive(Debug)]
enum PushPoll {
    /// `MFA_CHALLENGE` with `factorResult == WAITING`
    Waiting(AuthState),
    /// Left the challenge state; success is checked by the caller
    Finished(AuthState),
}

impl PushPoll {
    fn classify(state: AuthState) -> Result<Self, LoginError> {
        if state.status != AuthStatus::MfaChallenge {
            return Ok(PushPoll::Finished(state));
        }
        match state.factor_result.as_deref() {
            Some("WAITING") => Ok(PushPoll::Waiting(state)),
            other => Err(LoginError::ProtocolAssertion {
                step: "push verify",
                expected: "WAITING".to_string(),
                actual: other.unwrap_or("none").to_string(),
            }),
        }
    }
}

/// Authn client for one Okta org
pub struct OktaAuth<'a> {
    session: &'a HttpSession,
    domain: String,
    prompter: &'a dyn Prompter,
    otp: Option<&'a OtpGenerator>,
    push: PushPolicy,
}

impl<'a> OktaAuth<'a> {
    /// # Arguments
    /// * `domain` - Okta host, optionally with a port (e.g. "example.okta.com")
    pub fn new(session: &'a HttpSession, domain: impl Into<String>, prompter: &'a dyn Prompter) -> Self {
        Self {
            session,
            domain: domain.into(),
            prompter,
            otp: None,
            push: PushPolicy::default(),
        }
    }

    /// Answer `token:software:totp` locally instead of prompting
    pub fn with_otp(mut self, otp: Option<&'a OtpGenerator>) -> Self {
        self.otp = otp;
        self
    }

    pub fn with_push_policy(mut self, push: PushPolicy) -> Self {
        self.push = push;
        self
    }

    pub fn session(&self) -> &'a HttpSession {
        self.session
    }

    pub fn domain(&self) -> &str {
        &self.domain
    }

    /// Run the full authn transaction and return the session token
    pub async fn authenticate(&self, username: &str, password: &str) -> Result<String, LoginError> {
        info!("Authenticating {} with Okta at {}", username, self.domain);

        let url = self.session.url(&self.domain, "/api/v1/authn");
        let state: AuthState = self
            .session
            .post_json(&url, &PrimaryAuthRequest { username, password })
            .await?;
        debug!("Primary authentication status: {}", state.status.as_str());

        let state = match state.status {
            AuthStatus::Success => state,
            AuthStatus::MfaRequired => {
                let factor = select_factor(state.factors(), self.otp.is_some())?;
                info!("Using MFA factor {}", factor.factor_type);
                self.verify_factor(factor, &state).await?
            }
            _ => {
                return Err(LoginError::ProtocolAssertion {
                    step: "primary authentication",
                    expected: "SUCCESS or MFA_REQUIRED".to_string(),
                    actual: state.status.as_str().to_string(),
                });
            }
        };

        let token = state.into_session_token()?;
        info!("Okta authentication succeeded");
        Ok(token)
    }

    async fn verify_factor(&self, factor: &Factor, state: &AuthState) -> Result<AuthState, LoginError> {
        match factor.kind {
            FactorKind::Push => self.verify_push(factor, state).await,
            FactorKind::Sms => self.verify_sms(factor, state).await,
            FactorKind::SoftwareTotp | FactorKind::OtherToken => self.verify_token(factor, state).await,
            FactorKind::Unsupported => Err(LoginError::NoSupportedFactor),
        }
    }

    async fn verify(&self, url: &str, state: &AuthState, pass_code: Option<&str>) -> Result<AuthState, LoginError> {
        let request = VerifyRequest {
            state_token: state.state_token()?,
            pass_code,
        };
        self.session.post_json(url, &request).await
    }

    async fn verify_push(&self, factor: &Factor, state: &AuthState) -> Result<AuthState, LoginError> {
        let url = factor.verify_url()?;
        info!("Waiting for push notification approval");

        let mut polls: u32 = 1;
        let mut current = PushPoll::classify(self.verify(url, state, None).await?)?;

        loop {
            match current {
                PushPoll::Finished(state) => {
                    debug!("Push verification left challenge after {} polls", polls);
                    return Ok(state);
                }
                PushPoll::Waiting(state) => {
                    if self.push.max_polls.is_some_and(|max| polls >= max) {
                        return Err(LoginError::PushTimeout { polls });
                    }
                    tokio::time::sleep(self.push.interval).await;
                    polls += 1;
                    debug!("Push poll {}", polls);
                    current = PushPoll::classify(self.verify(url, &state, None).await?)?;
                }
            }
        }
    }

    async fn verify_sms(&self, factor: &Factor, state: &AuthState) -> Result<AuthState, LoginError> {
        let url = factor.verify_url()?;

        let challenge = self.verify(url, state, None).await?;
        challenge.expect_status("sms send", AuthStatus::MfaChallenge)?;

        let code = self
            .prompter
            .one_time_code("SMS code: ")
            .map_err(LoginError::Prompt)?;
        self.verify(url, &challenge, Some(&code)).await
    }

    async fn verify_token(&self, factor: &Factor, state: &AuthState) -> Result<AuthState, LoginError> {
        let url = factor.verify_url()?;

        let challenge = self.verify(url, state, None).await?;
        challenge.expect_status("token challenge", AuthStatus::MfaChallenge)?;

        let code = match (&factor.kind, self.otp) {
            (FactorKind::SoftwareTotp, Some(otp)) => {
                debug!("Computing TOTP code from pre-shared key");
                otp.current()?
            }
            _ => {
                let prompt = format!(
                    "One-time code for {} ({}): ",
                    factor.provider.as_deref().unwrap_or("unknown"),
                    factor.vendor_name.as_deref().unwrap_or("unknown")
                );
                self.prompter
                    .one_time_code(&prompt)
                    .map_err(LoginError::Prompt)?
            }
        };
        self.verify(url, &challenge, Some(&code)).await
    }
}
