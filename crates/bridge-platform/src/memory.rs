use std::sync::{Arc, Mutex, MutexGuard};

use crate::{SecretMap, SecretStore, SecretStoreError, insert_secret, lookup_secret, remove_secret};

/// Process-local store; sessions do not survive a restart. Clones share state.
#[derive(Clone, Default)]
pub struct InMemorySecretStore {
    secrets: Arc<Mutex<SecretMap>>,
}

impl InMemorySecretStore {
    fn secrets(&self) -> Result<MutexGuard<'_, SecretMap>, SecretStoreError> {
        self.secrets
            .lock()
            .map_err(|_| SecretStoreError::Backend("poisoned lock".to_owned()))
    }
}

impl SecretStore for InMemorySecretStore {
    fn set_secret(
        &self,
        service: &str,
        account: &str,
        secret: &str,
    ) -> Result<(), SecretStoreError> {
        insert_secret(&mut *self.secrets()?, service, account, secret);
        Ok(())
    }

    fn get_secret(&self, service: &str, account: &str) -> Result<String, SecretStoreError> {
        lookup_secret(&*self.secrets()?, service, account)
    }

    fn delete_secret(&self, service: &str, account: &str) -> Result<(), SecretStoreError> {
        remove_secret(&mut *self.secrets()?, service, account)
    }
}
