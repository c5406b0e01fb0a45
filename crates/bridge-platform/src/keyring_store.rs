use keyring::Entry;

use crate::{SecretStore, SecretStoreError};

/// Secrets in the OS credential manager (Keychain, Secret Service, Windows
/// Credential Manager).
#[derive(Debug, Default, Clone, Copy)]
pub struct OsKeyringSecretStore;

fn entry(service: &str, account: &str) -> Result<Entry, SecretStoreError> {
    Entry::new(service, account).map_err(map_keyring_error)
}

fn map_keyring_error(err: keyring::Error) -> SecretStoreError {
    match err {
        keyring::Error::NoEntry => SecretStoreError::NotFound,
        keyring::Error::NoStorageAccess(inner) | keyring::Error::PlatformFailure(inner) => {
            SecretStoreError::Unavailable(inner.to_string())
        }
        other => SecretStoreError::Backend(other.to_string()),
    }
}

impl SecretStore for OsKeyringSecretStore {
    fn set_secret(
        &self,
        service: &str,
        account: &str,
        secret: &str,
    ) -> Result<(), SecretStoreError> {
        entry(service, account)?
            .set_password(secret)
            .map_err(map_keyring_error)
    }

    fn get_secret(&self, service: &str, account: &str) -> Result<String, SecretStoreError> {
        entry(service, account)?
            .get_password()
            .map_err(map_keyring_error)
    }

    fn delete_secret(&self, service: &str, account: &str) -> Result<(), SecretStoreError> {
        entry(service, account)?
            .delete_credential()
            .map_err(map_keyring_error)
    }
}
