use keyring::credential::{CredentialBuilderApi, CredentialPersistence};
use keyring::Entry;
use tracing::debug;

use super::{CredentialStorage, StorageError};

/// Keychain service name every entry is filed under
const SERVICE_NAME: &str = "gatekeep";

/// Credentials kept in the OS keychain, one entry per storage key.
pub struct KeyringStorage {
    service: String,
}

impl KeyringStorage {
    pub fn new() -> Self {
        Self {
            service: SERVICE_NAME.to_string(),
        }
    }

    /// How long the platform keychain keeps what is written to it
    fn persistence() -> CredentialPersistence {
        keyring::default::default_credential_builder().persistence()
    }

    /// Whether stored credentials outlive this process. False when keyring
    /// has no native store for the platform and falls back to its mock.
    pub fn is_durable() -> bool {
        matches!(
            Self::persistence(),
            CredentialPersistence::UntilReboot | CredentialPersistence::UntilDelete
        )
    }

    fn entry(&self, key: &str) -> Result<Entry, StorageError> {
        Entry::new(&self.service, key)
            .map_err(|e| StorageError::Keyring(format!("Failed to create keyring entry: {}", e)))
    }
}

impl Default for KeyringStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl CredentialStorage for KeyringStorage {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        match self.entry(key)?.get_password() {
            Ok(value) => Ok(Some(value)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(StorageError::Keyring(format!(
                "Failed to retrieve {} from keychain: {}",
                key, e
            ))),
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.entry(key)?.set_password(value).map_err(|e| {
            StorageError::Keyring(format!("Failed to store {} in keychain: {}", key, e))
        })
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        match self.entry(key)?.delete_credential() {
            Ok(()) => Ok(()),
            Err(keyring::Error::NoEntry) => {
                debug!(key, "No keychain entry to delete");
                Ok(())
            }
            Err(e) => Err(StorageError::Keyring(format!(
                "Failed to delete {} from keychain: {}",
                key, e
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[cfg(any(target_os = "linux", target_os = "macos", target_os = "windows"))]
    #[test]
    fn test_native_keychain_is_used() {
        assert!(KeyringStorage::is_durable());
    }

    // Needs a reachable keychain; containers usually block keyctl
    #[test]
    #[ignore]
    fn test_values_survive_a_new_instance() {
        let key = "gatekeep_keychain_test";
        let storage = KeyringStorage::new();
        storage.set(key, "value-1").unwrap();

        let reopened = KeyringStorage::new();
        assert_eq!(reopened.get(key).unwrap().as_deref(), Some("value-1"));

        reopened.remove(key).unwrap();
        assert_eq!(storage.get(key).unwrap(), None);
        assert!(storage.remove(key).is_ok());
    }
}
