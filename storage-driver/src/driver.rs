use std::fmt;

use crate::error::StorageError;

/// A key-value driver, which provides the backing map for a content cache.
///
/// Keys are string paths and each path holds a single entry. Implementations
/// must be safe to use from many tasks at once: operations on different keys
/// must not block each other, and a read racing a write for the same key must
/// observe either the previous or the new value, never a partial one.
///
/// Absence of a key is reported as `Ok(None)`. Errors are reserved for
/// failures of the backing store itself.
#[async_trait::async_trait]
pub trait Driver<V>: fmt::Debug + Send + Sync
where
    V: Clone + Send + Sync + 'static,
{
    /// The name of the driver.
    fn name(&self) -> &'static str;

    /// Get the entry stored at `key`, if any.
    async fn get(&self, key: &str) -> Result<Option<V>, StorageError>;

    /// Store `value` at `key`, replacing any previous entry.
    async fn put(&self, key: &str, value: V) -> Result<(), StorageError>;

    /// Remove the entry stored at `key`, returning it if it was present.
    async fn remove(&self, key: &str) -> Result<Option<V>, StorageError>;

    /// List the keys held by the driver, optionally filtered by a prefix.
    async fn keys(&self, prefix: Option<&str>) -> Result<Vec<String>, StorageError>;

    /// Check whether an entry is stored at `key`.
    async fn contains(&self, key: &str) -> Result<bool, StorageError> {
        tracing::trace!(%key, driver = self.name(), "contains");
        Ok(self.get(key).await?.is_some())
    }
}
