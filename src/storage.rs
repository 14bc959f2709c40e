/// Durable key-value storage backing the token store
use keyring::Entry;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

/// String key-value capability used to persist the access token
pub trait TokenStorage: Send + Sync {
    /// Get a value by key
    fn get(&self, key: &str) -> Result<Option<String>, String>;

    /// Store a value, replacing any previous one
    fn set(&self, key: &str, value: &str) -> Result<(), String>;

    /// Remove a value; removing a missing key is not an error
    fn remove(&self, key: &str) -> Result<(), String>;
}

impl<S: TokenStorage + ?Sized> TokenStorage for Arc<S> {
    fn get(&self, key: &str) -> Result<Option<String>, String> {
        (**self).get(key)
    }

    fn set(&self, key: &str, value: &str) -> Result<(), String> {
        (**self).set(key, value)
    }

    fn remove(&self, key: &str) -> Result<(), String> {
        (**self).remove(key)
    }
}

/// In-memory storage implementation
///
/// Clones share the same map, so a test can keep a handle and inspect what
/// the token store persisted.
#[derive(Debug, Default, Clone)]
pub struct MemoryStorage {
    values: Arc<RwLock<HashMap<String, String>>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create storage pre-populated with one entry
    pub fn with_value(key: &str, value: &str) -> Self {
        let storage = Self::new();
        storage.values.write().insert(key.to_string(), value.to_string());
        storage
    }
}

impl TokenStorage for MemoryStorage {
    fn get(&self, key: &str) -> Result<Option<String>, String> {
        Ok(self.values.read().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), String> {
        self.values.write().insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), String> {
        self.values.write().remove(key);
        Ok(())
    }
}

/// File-based storage using XDG conventions
///
/// All entries live in a single `storage.json` object under the data
/// directory, the way a browser keeps one local store per origin.
#[derive(Debug, Clone)]
pub struct FileStorage {
    base_path: PathBuf,
}

impl FileStorage {
    /// Create a file storage instance for an application
    ///
    /// Checks `$XDG_DATA_HOME` first, then falls back to the platform data
    /// directory. Data is kept in `<data_dir>/<app_name>/`.
    ///
    /// ```no_run
    /// use riegel::storage::FileStorage;
    ///
    /// let storage = FileStorage::new("my-app").unwrap();
    /// ```
    pub fn new(app_name: &str) -> Result<Self, String> {
        let base_dir = if let Ok(xdg_data) = std::env::var("XDG_DATA_HOME") {
            PathBuf::from(xdg_data)
        } else {
            dirs::data_dir().ok_or_else(|| "Could not determine data directory".to_string())?
        };

        Self::with_path(base_dir.join(app_name))
    }

    /// Create a file storage instance rooted at `path`
    pub fn with_path(path: PathBuf) -> Result<Self, String> {
        fs::create_dir_all(&path)
            .map_err(|e| format!("Failed to create storage directory: {}", e))?;

        Ok(Self { base_path: path })
    }

    fn store_path(&self) -> PathBuf {
        self.base_path.join("storage.json")
    }

    fn load(&self) -> Result<HashMap<String, String>, String> {
        let path = self.store_path();
        if !path.exists() {
            return Ok(HashMap::new());
        }

        let content =
            fs::read_to_string(&path).map_err(|e| format!("Failed to read storage file: {}", e))?;

        serde_json::from_str(&content).map_err(|e| format!("Failed to parse storage file: {}", e))
    }

    fn save(&self, values: &HashMap<String, String>) -> Result<(), String> {
        let content = serde_json::to_string_pretty(values)
            .map_err(|e| format!("Failed to serialize storage: {}", e))?;

        fs::write(self.store_path(), content)
            .map_err(|e| format!("Failed to write storage file: {}", e))
    }
}

impl TokenStorage for FileStorage {
    fn get(&self, key: &str) -> Result<Option<String>, String> {
        Ok(self.load()?.remove(key))
    }

    fn set(&self, key: &str, value: &str) -> Result<(), String> {
        let mut values = self.load()?;
        values.insert(key.to_string(), value.to_string());
        self.save(&values)
    }

    fn remove(&self, key: &str) -> Result<(), String> {
        let mut values = self.load()?;
        if values.remove(key).is_some() {
            self.save(&values)?;
        }
        Ok(())
    }
}

/// Storage in the OS credential manager
///
/// - macOS: Keychain
/// - Windows: Credential Manager
/// - Linux: Secret Service API (libsecret)
#[derive(Debug, Clone)]
pub struct SecureStorage {
    service: String,
}

impl SecureStorage {
    /// ```
    /// use riegel::storage::SecureStorage;
    ///
    /// let storage = SecureStorage::new("my-app");
    /// ```
    pub fn new(app_name: &str) -> Self {
        Self {
            service: format!("riegel-{}", app_name),
        }
    }

    fn entry(&self, key: &str) -> Result<Entry, String> {
        Entry::new(&self.service, key).map_err(|e| format!("Failed to create keyring entry: {}", e))
    }
}

impl TokenStorage for SecureStorage {
    fn get(&self, key: &str) -> Result<Option<String>, String> {
        match self.entry(key)?.get_password() {
            Ok(value) => Ok(Some(value)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(format!("Failed to read from keyring: {}", e)),
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<(), String> {
        self.entry(key)?
            .set_password(value)
            .map_err(|e| format!("Failed to save to keyring: {}", e))
    }

    fn remove(&self, key: &str) -> Result<(), String> {
        match self.entry(key)?.delete_credential() {
            Ok(()) => Ok(()),
            Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(format!("Failed to delete from keyring: {}", e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_storage_operations() {
        let storage = MemoryStorage::new();

        storage.set("token", "abc").unwrap();
        assert_eq!(storage.get("token").unwrap(), Some("abc".to_string()));

        storage.set("token", "def").unwrap();
        assert_eq!(storage.get("token").unwrap(), Some("def".to_string()));

        storage.remove("token").unwrap();
        assert!(storage.get("token").unwrap().is_none());

        // Removing twice is fine
        storage.remove("token").unwrap();
    }

    #[test]
    fn test_memory_storage_clones_share_state() {
        let storage = MemoryStorage::with_value("token", "abc");
        let handle = storage.clone();

        storage.remove("token").unwrap();
        assert!(handle.get("token").unwrap().is_none());
    }

    #[test]
    fn test_file_storage_operations() {
        let temp_dir = std::env::temp_dir().join(format!("riegel_test_{}", rand::random::<u32>()));
        let storage = FileStorage::with_path(temp_dir.clone()).unwrap();

        assert!(storage.get("token").unwrap().is_none());

        storage.set("token", "file-token").unwrap();
        storage.set("other", "value").unwrap();
        assert!(temp_dir.join("storage.json").exists());

        // A fresh instance sees the persisted value
        let reopened = FileStorage::with_path(temp_dir.clone()).unwrap();
        assert_eq!(reopened.get("token").unwrap(), Some("file-token".to_string()));

        reopened.remove("token").unwrap();
        assert!(storage.get("token").unwrap().is_none());
        assert_eq!(storage.get("other").unwrap(), Some("value".to_string()));

        fs::remove_dir_all(temp_dir).ok();
    }

    #[test]
    fn test_file_storage_rejects_corrupt_file() {
        let temp_dir = std::env::temp_dir().join(format!("riegel_test_{}", rand::random::<u32>()));
        let storage = FileStorage::with_path(temp_dir.clone()).unwrap();
        fs::write(temp_dir.join("storage.json"), "not json").unwrap();

        assert!(storage.get("token").is_err());

        fs::remove_dir_all(temp_dir).ok();
    }

    #[test]
    fn test_xdg_data_home_respected() {
        use std::env;

        let original_xdg = env::var("XDG_DATA_HOME").ok();

        let temp_dir = env::temp_dir().join(format!("riegel_xdg_{}", rand::random::<u32>()));
        env::set_var("XDG_DATA_HOME", &temp_dir);

        let storage = FileStorage::new("test-app").unwrap();
        assert_eq!(storage.base_path, temp_dir.join("test-app"));

        if let Some(original) = original_xdg {
            env::set_var("XDG_DATA_HOME", original);
        } else {
            env::remove_var("XDG_DATA_HOME");
        }
        let _ = fs::remove_dir_all(temp_dir);
    }

    #[test]
    fn test_secure_storage_operations() {
        let storage = SecureStorage::new(&format!("test-{}", rand::random::<u32>()));

        // Skip when no keyring backend is available (headless CI)
        if let Err(e) = storage.set("token", "secure-token") {
            eprintln!("Skipping secure storage test: {}", e);
            return;
        }

        match storage.get("token") {
            Ok(Some(value)) => assert_eq!(value, "secure-token"),
            _ => {
                eprintln!("Skipping secure storage test: keyring does not persist here");
                let _ = storage.remove("token");
                return;
            }
        }

        storage.remove("token").unwrap();
        assert!(storage.get("token").unwrap().is_none());
    }
}
