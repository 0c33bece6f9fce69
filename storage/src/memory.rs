use dashmap::DashMap;

use storage_driver::{Driver, StorageError};

/// Storage driver that keeps entries in a concurrent in-memory map.
#[derive(Debug)]
pub struct MemoryDriver<V> {
    entries: DashMap<String, V>,
}

impl<V> Default for MemoryDriver<V> {
    fn default() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }
}

impl<V> MemoryDriver<V> {
    /// Create a new, empty `MemoryDriver`.
    pub fn new() -> Self {
        Self::default()
    }

    /// The number of entries held.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no entries are held.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait::async_trait]
impl<V> Driver<V> for MemoryDriver<V>
where
    V: Clone + std::fmt::Debug + Send + Sync + 'static,
{
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn get(&self, key: &str) -> Result<Option<V>, StorageError> {
        Ok(self.entries.get(key).map(|entry| entry.value().clone()))
    }

    async fn put(&self, key: &str, value: V) -> Result<(), StorageError> {
        self.entries.insert(key.to_owned(), value);
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<Option<V>, StorageError> {
        Ok(self.entries.remove(key).map(|(_, value)| value))
    }

    async fn keys(&self, prefix: Option<&str>) -> Result<Vec<String>, StorageError> {
        let mut keys: Vec<String> = self
            .entries
            .iter()
            .map(|entry| entry.key().clone())
            .filter(|key| prefix.is_none_or(|prefix| key.starts_with(prefix)))
            .collect();
        keys.sort();
        Ok(keys)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    #[tokio::test]
    async fn put_get_remove() {
        let driver = MemoryDriver::new();
        assert_eq!(driver.get("/v2/a").await.unwrap(), None::<String>);

        driver.put("/v2/a", "one".to_owned()).await.unwrap();
        driver.put("/v2/a", "two".to_owned()).await.unwrap();
        assert_eq!(driver.get("/v2/a").await.unwrap().as_deref(), Some("two"));
        assert_eq!(driver.len(), 1);
        assert!(driver.contains("/v2/a").await.unwrap());

        assert_eq!(driver.remove("/v2/a").await.unwrap().as_deref(), Some("two"));
        assert!(driver.is_empty());
    }

    #[tokio::test]
    async fn list_keys_by_prefix() {
        let driver = MemoryDriver::new();
        for key in ["/v2/a/blobs/1", "/v2/b/blobs/2", "/v2/a/manifests/latest"] {
            driver.put(key, 0u8).await.unwrap();
        }

        assert_eq!(
            driver.keys(Some("/v2/a/")).await.unwrap(),
            vec!["/v2/a/blobs/1", "/v2/a/manifests/latest"]
        );
        assert_eq!(driver.keys(None).await.unwrap().len(), 3);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_writers() {
        let driver = Arc::new(MemoryDriver::new());
        let tasks: Vec<_> = (0..32u32)
            .map(|i| {
                let driver = driver.clone();
                tokio::spawn(async move {
                    driver.put(&format!("/k/{}", i % 4), i).await.unwrap();
                    driver.get(&format!("/k/{}", i % 4)).await.unwrap()
                })
            })
            .collect();

        for task in tasks {
            assert!(task.await.unwrap().is_some());
        }
        assert_eq!(driver.len(), 4);
    }
}
