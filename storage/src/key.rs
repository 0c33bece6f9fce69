//! Deduplicating keys over digest stores.

use std::fmt;
use std::hash::{Hash, Hasher};

use bytes::Bytes;
use storage_driver::StorageError;

use crate::store::DigestStore;

/// A key identifying a [`DigestStore`] by its digest alone.
///
/// Two keys are equal when their targets have the same digest, whatever the
/// variant or location of the targets. Used to collapse duplicate loads of
/// the same content.
#[derive(Debug, Clone)]
pub struct DigestKey {
    target: DigestStore,
}

impl DigestKey {
    /// Key `store` by its digest.
    pub fn of(store: DigestStore) -> Self {
        Self { target: store }
    }

    /// The store this key was created from.
    pub fn target(&self) -> &DigestStore {
        &self.target
    }

    /// Unwrap the store.
    pub fn into_target(self) -> DigestStore {
        self.target
    }

    /// Read the content of the target.
    pub async fn read_all_bytes(&self) -> Result<Bytes, StorageError> {
        self.target.get_bytes().await
    }
}

impl From<DigestStore> for DigestKey {
    fn from(store: DigestStore) -> Self {
        DigestKey::of(store)
    }
}

impl PartialEq for DigestKey {
    fn eq(&self, other: &Self) -> bool {
        self.target.digest() == other.target.digest()
    }
}

impl Eq for DigestKey {}

impl Hash for DigestKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.target.digest().hash(state);
    }
}

impl fmt::Display for DigestKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DigestKey[{}]", self.target)
    }
}
