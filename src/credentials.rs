//! Password lookup in the OS credential store
//!
//! Entries are keyed by gateway host (service) and username (account).

use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug)]
pub enum CredentialError {
    #[error("Keyring access failed: {0}")]
    Keyring(#[from] keyring::Error),
}

/// Secret lookup service
pub trait SecretStore {
    /// `Ok(None)` when no entry exists
    fn get_password(&self, service: &str, account: &str) -> Result<Option<String>, CredentialError>;

    fn set_password(&self, service: &str, account: &str, password: &str) -> Result<(), CredentialError>;
}

/// Windows Credential Manager, macOS Keychain, or Linux keyutils
pub struct KeyringStore;

impl SecretStore for KeyringStore {
    fn get_password(&self, service: &str, account: &str) -> Result<Option<String>, CredentialError> {
        let entry = keyring::Entry::new(service, account)?;
        match entry.get_password() {
            Ok(password) => {
                debug!("Found stored password for {}@{}", account, service);
                Ok(Some(password))
            }
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn set_password(&self, service: &str, account: &str, password: &str) -> Result<(), CredentialError> {
        keyring::Entry::new(service, account)?.set_password(password)?;
        debug!("Stored password for {}@{}", account, service);
        Ok(())
    }
}

/// Store that never has anything, for `--password` runs and tests
pub struct NoSecretStore;

impl SecretStore for NoSecretStore {
    fn get_password(&self, _service: &str, _account: &str) -> Result<Option<String>, CredentialError> {
        Ok(None)
    }

    fn set_password(&self, _service: &str, _account: &str, _password: &str) -> Result<(), CredentialError> {
        Ok(())
    }
}
