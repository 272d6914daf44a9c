pub mod config;
pub mod error;
pub mod types;

pub use error::{CmfError, CmfResult};
pub use types::{HashAlgo, ObjectId, ObjectKind, MAX_RAW_LEN};
