//! OpenConnect integration module
//!
//! OpenConnect does the actual tunnelling. We hand it the SAML username and
//! the gateway's prelogin cookie:
//!
//! ```bash
//! openconnect GATEWAY --protocol=gp --user=USER \
//!   --usergroup=gateway:prelogin-cookie --passwd-on-stdin
//! ```
//!
//! with the cookie written to its stdin.

pub mod supervisor;

pub use supervisor::{SupervisorError, exit_code, run_with_secret};

use std::ffi::OsString;
use std::process::Command;

/// How to invoke the VPN client
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientSettings {
    /// Client binary
    pub client: String,
    pub protocol: String,
    /// Appended after our own arguments
    pub extra_args: Vec<String>,
    /// Prefix with `sudo`
    pub elevate: bool,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            client: "openconnect".to_string(),
            protocol: "gp".to_string(),
            extra_args: Vec::new(),
            elevate: false,
        }
    }
}

impl ClientSettings {
    pub fn args(&self, gateway: &str, saml_username: &str) -> Vec<OsString> {
        let mut args: Vec<OsString> = Vec::new();
        if self.elevate {
            args.push("sudo".into());
        }
        args.push(self.client.clone().into());
        args.push(gateway.into());
        args.push(format!("--protocol={}", self.protocol).into());
        args.push(format!("--user={}", saml_username).into());
        args.push("--usergroup=gateway:prelogin-cookie".into());
        args.push("--passwd-on-stdin".into());
        args.extend(self.extra_args.iter().map(OsString::from));
        args
    }

    pub fn command(&self, gateway: &str, saml_username: &str) -> Command {
        let args = self.args(gateway, saml_username);
        let mut command = Command::new(&args[0]);
        command.args(&args[1..]);
        command
    }
}
