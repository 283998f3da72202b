//! Host system access for a managed-language runtime: files, directories,
//! metadata, environment variables and clocks, exposed to Rust callers and
//! through a C ABI.

pub mod clock;
pub mod config;
pub mod env;
pub mod error;
pub mod ffi;
pub mod file;
pub mod fs;
pub mod logging;
pub mod platform;
pub mod record;

mod handle;

pub use crate::env::Environment;
pub use crate::error::Error;
pub use crate::error::ErrorKind;
pub use crate::error::Result;
pub use crate::file::HostFile;
pub use crate::fs::HostFs;
pub use crate::platform::NativeFs;
pub use crate::record::FileKind;
pub use crate::record::StatRecord;
