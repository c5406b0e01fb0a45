use std::{
    fs, io,
    path::{Path, PathBuf},
    sync::Mutex,
    time::{SystemTime, UNIX_EPOCH},
};

use tracing::debug;

use crate::{SecretMap, SecretStore, SecretStoreError, insert_secret, lookup_secret, remove_secret};

/// JSON-file store, `{service: {account: secret}}`.
///
/// Every write replaces the file through a temp file + rename so a crash never
/// leaves a half-written session behind.
pub struct FileSecretStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl FileSecretStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(&self) -> Result<SecretMap, SecretStoreError> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(SecretMap::new()),
            Err(err) => {
                return Err(SecretStoreError::Unavailable(format!(
                    "failed reading {}: {err}",
                    self.path.display()
                )));
            }
        };

        serde_json::from_str(&raw).map_err(|err| {
            SecretStoreError::Backend(format!("failed parsing {}: {err}", self.path.display()))
        })
    }

    fn save(&self, map: &SecretMap) -> Result<(), SecretStoreError> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent).map_err(|err| {
                SecretStoreError::Unavailable(format!(
                    "failed creating directory {}: {err}",
                    parent.display()
                ))
            })?;
        }

        let encoded =
            serde_json::to_vec(map).map_err(|err| SecretStoreError::Backend(err.to_string()))?;
        let temp_path = temp_path_for(&self.path);
        fs::write(&temp_path, encoded).map_err(|err| {
            SecretStoreError::Backend(format!("failed writing {}: {err}", temp_path.display()))
        })?;

        if let Err(rename_err) = fs::rename(&temp_path, &self.path) {
            // Windows refuses to rename over an existing file.
            match fs::remove_file(&self.path) {
                Ok(()) => {}
                Err(err) if err.kind() == io::ErrorKind::NotFound => {}
                Err(err) => {
                    let _ = fs::remove_file(&temp_path);
                    return Err(SecretStoreError::Backend(format!(
                        "failed replacing {} after rename error ({rename_err}): {err}",
                        self.path.display()
                    )));
                }
            }
            fs::rename(&temp_path, &self.path).map_err(|err| {
                let _ = fs::remove_file(&temp_path);
                SecretStoreError::Backend(format!(
                    "failed writing {} after temp write: {err}",
                    self.path.display()
                ))
            })?;
        }

        debug!(path = %self.path.display(), "secret file updated");
        Ok(())
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, ()>, SecretStoreError> {
        self.write_lock
            .lock()
            .map_err(|_| SecretStoreError::Backend("poisoned lock".to_owned()))
    }
}

impl SecretStore for FileSecretStore {
    fn set_secret(
        &self,
        service: &str,
        account: &str,
        secret: &str,
    ) -> Result<(), SecretStoreError> {
        let _guard = self.lock()?;
        let mut map = self.load()?;
        insert_secret(&mut map, service, account, secret);
        self.save(&map)
    }

    fn get_secret(&self, service: &str, account: &str) -> Result<String, SecretStoreError> {
        let _guard = self.lock()?;
        lookup_secret(&self.load()?, service, account)
    }

    fn delete_secret(&self, service: &str, account: &str) -> Result<(), SecretStoreError> {
        let _guard = self.lock()?;
        let mut map = self.load()?;
        remove_secret(&mut map, service, account)?;
        self.save(&map)
    }
}

fn temp_path_for(path: &Path) -> PathBuf {
    let parent = path.parent().unwrap_or_else(|| Path::new("."));
    let file_name = path
        .file_name()
        .and_then(|value| value.to_str())
        .unwrap_or("secrets.json");
    let now_nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|duration| duration.as_nanos())
        .unwrap_or(0);
    parent.join(format!(".{file_name}.{now_nanos}.tmp"))
}
