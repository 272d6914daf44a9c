//! cmf-store: the content-addressed object store consumed by manifests
//!
//! - `traits`: the `ObjectStore` contract and `ObjectStream` reader handle
//! - `memory`: `RwLock<HashMap>` backend for tests and dry runs
//! - `fs`: zstd-compressed loose objects on disk

pub mod error;
pub mod fs;
pub mod memory;
pub mod traits;

pub use error::StoreError;
pub use fs::FsStore;
pub use memory::MemoryStore;
pub use traits::{ObjectStore, ObjectStream};
