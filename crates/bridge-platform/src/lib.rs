//! Secret stores used to persist backend sessions between launches.
//!
//! Every store keys secrets by `(service, account)`. `ScopedSecretStore` pins
//! the service so callers only deal in account names.

use std::{collections::BTreeMap, sync::Arc};

use thiserror::Error;

mod file_store;
#[cfg(feature = "os-keyring")]
mod keyring_store;
mod memory;

pub use file_store::FileSecretStore;
#[cfg(feature = "os-keyring")]
pub use keyring_store::OsKeyringSecretStore;
pub use memory::InMemorySecretStore;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SecretStoreError {
    #[error("secret not found")]
    NotFound,
    #[error("secret store unavailable: {0}")]
    Unavailable(String),
    #[error("secret store backend failure: {0}")]
    Backend(String),
}

pub trait SecretStore: Send + Sync {
    fn set_secret(
        &self,
        service: &str,
        account: &str,
        secret: &str,
    ) -> Result<(), SecretStoreError>;

    fn get_secret(&self, service: &str, account: &str) -> Result<String, SecretStoreError>;

    fn delete_secret(&self, service: &str, account: &str) -> Result<(), SecretStoreError>;
}

impl<S: SecretStore + ?Sized> SecretStore for Arc<S> {
    fn set_secret(
        &self,
        service: &str,
        account: &str,
        secret: &str,
    ) -> Result<(), SecretStoreError> {
        (**self).set_secret(service, account, secret)
    }

    fn get_secret(&self, service: &str, account: &str) -> Result<String, SecretStoreError> {
        (**self).get_secret(service, account)
    }

    fn delete_secret(&self, service: &str, account: &str) -> Result<(), SecretStoreError> {
        (**self).delete_secret(service, account)
    }
}

/// `{service: {account: secret}}`, the layout shared by the in-memory and
/// file stores.
pub(crate) type SecretMap = BTreeMap<String, BTreeMap<String, String>>;

pub(crate) fn insert_secret(map: &mut SecretMap, service: &str, account: &str, secret: &str) {
    map.entry(service.to_owned())
        .or_default()
        .insert(account.to_owned(), secret.to_owned());
}

pub(crate) fn lookup_secret(
    map: &SecretMap,
    service: &str,
    account: &str,
) -> Result<String, SecretStoreError> {
    map.get(service)
        .and_then(|accounts| accounts.get(account))
        .cloned()
        .ok_or(SecretStoreError::NotFound)
}

/// Remove one secret, pruning the service entry once it is empty.
pub(crate) fn remove_secret(
    map: &mut SecretMap,
    service: &str,
    account: &str,
) -> Result<(), SecretStoreError> {
    let accounts = map.get_mut(service).ok_or(SecretStoreError::NotFound)?;
    accounts.remove(account).ok_or(SecretStoreError::NotFound)?;
    if accounts.is_empty() {
        map.remove(service);
    }
    Ok(())
}

/// Store view pinned to one service name.
#[derive(Clone)]
pub struct ScopedSecretStore<S: SecretStore> {
    inner: S,
    service: String,
}

impl<S: SecretStore> ScopedSecretStore<S> {
    pub fn new(inner: S, service: impl Into<String>) -> Self {
        Self {
            inner,
            service: service.into(),
        }
    }

    pub fn service(&self) -> &str {
        &self.service
    }

    pub fn set(&self, account: &str, secret: &str) -> Result<(), SecretStoreError> {
        self.inner.set_secret(&self.service, account, secret)
    }

    /// Fetch a secret; a missing one is `Ok(None)`.
    pub fn get_optional(&self, account: &str) -> Result<Option<String>, SecretStoreError> {
        match self.inner.get_secret(&self.service, account) {
            Ok(secret) => Ok(Some(secret)),
            Err(SecretStoreError::NotFound) => Ok(None),
            Err(err) => Err(err),
        }
    }

    /// Delete a secret; deleting a missing one succeeds.
    pub fn delete(&self, account: &str) -> Result<(), SecretStoreError> {
        match self.inner.delete_secret(&self.service, account) {
            Ok(()) | Err(SecretStoreError::NotFound) => Ok(()),
            Err(err) => Err(err),
        }
    }
}
