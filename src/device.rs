//! Device token sent to Okta as `context.deviceToken`
//!
//! Okta uses it as a device fingerprint for its risk signals. It only needs
//! to be stable per machine, so it is derived from the systemd/dbus machine
//! id where one exists and from the hostname otherwise. The raw machine id is
//! confidential and never leaves the host; Okta sees an HMAC of it keyed with
//! this application's name.

use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::fs;
use std::path::Path;

type HmacSha256 = Hmac<Sha256>;

/// Okta accepts at most 32 characters
const MAX_LEN: usize = 32;

const APP_KEY: &[u8] = b"gp-okta";

const MACHINE_ID_PATHS: &[&str] = &["/etc/machine-id", "/var/lib/dbus/machine-id"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceToken(String);

impl DeviceToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// Discover a stable identifier for this machine
    pub fn from_machine() -> Self {
        let raw = read_machine_id(MACHINE_ID_PATHS)
            .or_else(|| hostname::get().ok().and_then(|h| h.into_string().ok()))
            .unwrap_or_else(|| "unknown".to_string());

        Self::from_identifier(&raw)
    }

    /// App-specific token for a machine identifier
    fn from_identifier(raw: &str) -> Self {
        let Ok(mut mac) = <HmacSha256 as Mac>::new_from_slice(APP_KEY) else {
            return Self("unknown".to_string());
        };
        mac.update(raw.trim().as_bytes());
        let mut token = hex::encode(mac.finalize().into_bytes());
        token.truncate(MAX_LEN);
        Self(token)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// First non-empty machine id among `paths`
fn read_machine_id<P: AsRef<Path>>(paths: &[P]) -> Option<String> {
    paths.iter().find_map(|path| {
        fs::read_to_string(path)
            .ok()
            .filter(|id| !id.trim().is_empty())
    })
}
