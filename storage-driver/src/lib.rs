//! Shared contracts for content caches: the error taxonomy used by every
//! reader, store and cache, and the key-value [`Driver`] that backs a cache.

mod driver;
mod error;

pub use driver::Driver;
pub use error::StorageError;
pub use error::StorageErrorBuilder;
pub use error::StorageErrorKind;
