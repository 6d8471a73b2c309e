use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde_json::{Map, Value};
use tokio::fs;
use tokio::sync::Mutex;
use tracing::debug;

use super::{RelayError, RelayResult};

/// String key/value storage that survives restarts.
#[async_trait]
pub trait DurableStorage: Send + Sync {
    async fn get(&self, key: &str) -> RelayResult<Option<String>>;
    async fn set(&self, key: &str, value: &str) -> RelayResult<()>;
}

/// A single JSON object on disk. Writes go to a temp file and are renamed
/// into place, so a crash mid-write leaves the previous contents intact.
pub struct JsonFileStorage {
    path: PathBuf,
    // serializes read-modify-write cycles
    write_lock: Mutex<()>,
}

impl JsonFileStorage {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into(), write_lock: Mutex::new(()) }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read_all(&self) -> RelayResult<Map<String, Value>> {
        let raw = match fs::read_to_string(&self.path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Map::new()),
            Err(e) => return Err(e.into()),
        };
        if raw.trim().is_empty() {
            return Ok(Map::new());
        }
        match serde_json::from_str::<Value>(&raw)? {
            Value::Object(map) => Ok(map),
            _ => Err(RelayError::Format(serde::de::Error::custom(
                "storage file is not a JSON object",
            ))),
        }
    }
}

#[async_trait]
impl DurableStorage for JsonFileStorage {
    async fn get(&self, key: &str) -> RelayResult<Option<String>> {
        let map = self.read_all().await?;
        Ok(map.get(key).and_then(Value::as_str).map(str::to_owned))
    }

    async fn set(&self, key: &str, value: &str) -> RelayResult<()> {
        let _guard = self.write_lock.lock().await;
        let mut map = self.read_all().await?;
        map.insert(key.to_string(), Value::String(value.to_string()));

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).await?;
        }
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, serde_json::to_vec_pretty(&Value::Object(map))?).await?;
        fs::rename(&tmp, &self.path).await?;
        debug!(path = %self.path.display(), key, "storage updated");
        Ok(())
    }
}

/// In-process storage, for tests and throwaway runs.
#[derive(Default)]
pub struct MemoryStorage {
    values: Mutex<HashMap<String, String>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_value(key: &str, value: &str) -> Self {
        let mut values = HashMap::new();
        values.insert(key.to_string(), value.to_string());
        Self { values: Mutex::new(values) }
    }
}

#[async_trait]
impl DurableStorage for MemoryStorage {
    async fn get(&self, key: &str) -> RelayResult<Option<String>> {
        Ok(self.values.lock().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> RelayResult<()> {
        self.values.lock().await.insert(key.to_string(), value.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("liverelay-storage-{}-{}", name, std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        dir.join("store.json")
    }

    #[tokio::test]
    async fn test_missing_file_reads_as_empty() {
        let storage = JsonFileStorage::new(scratch("missing"));
        assert_eq!(storage.get("apiUrl").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_set_then_get_survives_reopen() {
        let path = scratch("reopen");
        JsonFileStorage::new(&path).set("apiUrl", "http://a/data").await.unwrap();
        JsonFileStorage::new(&path).set("other", "x").await.unwrap();

        let reopened = JsonFileStorage::new(&path);
        assert_eq!(reopened.get("apiUrl").await.unwrap().as_deref(), Some("http://a/data"));
        assert_eq!(reopened.get("other").await.unwrap().as_deref(), Some("x"));
        std::fs::remove_dir_all(path.parent().unwrap()).ok();
    }

    #[tokio::test]
    async fn test_non_object_file_is_format_error() {
        let path = scratch("garbage");
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, "[1,2,3]").unwrap();

        let storage = JsonFileStorage::new(&path);
        assert!(matches!(storage.get("apiUrl").await, Err(RelayError::Format(_))));
        std::fs::remove_dir_all(path.parent().unwrap()).ok();
    }

    #[tokio::test]
    async fn test_memory_storage() {
        let storage = MemoryStorage::with_value("apiUrl", "http://x");
        assert_eq!(storage.get("apiUrl").await.unwrap().as_deref(), Some("http://x"));
        storage.set("apiUrl", "http://y").await.unwrap();
        assert_eq!(storage.get("apiUrl").await.unwrap().as_deref(), Some("http://y"));
    }
}
