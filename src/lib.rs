//! gp-okta - GlobalProtect VPN login through Okta
//!
//! Logs in to a GlobalProtect gateway whose SAML identity provider is Okta,
//! answering Okta's MFA without a browser, then starts OpenConnect with the
//! resulting prelogin cookie.
//!
//! # Architecture
//!
//! - `http`: Shared HTTP session (cookies, device token)
//! - `form`: SAML form extraction from HTML
//! - `gp`: Gateway prelogin and SAML completion
//! - `okta`: Okta authn state machine, MFA factors, TOTP
//! - `openconnect`: VPN client command line and process supervision
//! - `login`: The stages wired together
//! - `config`: Configuration file handling (TOML)
//!
//! # Usage
//!
//! ```bash
//! gp-okta vpn.example.com --username alice -- --os=linux-64
//! ```

pub mod config;
pub mod credentials;
pub mod device;
pub mod error;
pub mod form;
pub mod gp;
pub mod http;
pub mod login;
pub mod okta;
pub mod openconnect;
pub mod prompt;

pub use config::Config;
pub use error::LoginError;
pub use gp::CredentialHandoff;
pub use login::{ConnectError, LoginRequest, connect, login};
