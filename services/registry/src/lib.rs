//! # Container registry model
//!
//! Decodes the manifest, configuration and index documents served by Docker
//! and OCI registries into one normalized model, and caches registry content
//! by request path on top of the `storage` crate.
//!
//! ## Example
//!
//! ```no_run
//! use api_client::{HttpClient, RetryConfig};
//! use registry::RegistryStorage;
//! use storage::{ContentReaderFactory, Storage};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let readers = ContentReaderFactory::new(HttpClient::new(RetryConfig::default()));
//! let registry = RegistryStorage::new(Storage::memory(), readers);
//!
//! let spec = registry
//!     .inspect("docker.io", "https://registry-1.docker.io", "library/ubuntu", "latest")
//!     .await?;
//! # Ok(())
//! # }
//! ```

mod config;
mod container;
mod error;
mod index;
pub mod json;
mod manifest;
mod storage;

pub use self::config::{Config, ConfigSpec, Rootfs};
pub use self::container::{ContainerOrIndexSpec, ContainerSpec};
pub use self::error::{ErrorResponse, RegistryError, RegistryResult};
pub use self::index::{IndexSpec, ManifestRef, PlatformSpec};
pub use self::manifest::{ManifestSpec, ObjectRef, detect_media_type, validate_manifest_type};
pub use self::storage::{RegistryStorage, blob_path, manifest_path};

/// Media types, re-exported from the storage crate.
pub use ::storage::media_type;
