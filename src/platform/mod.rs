//! Per-OS implementations of [`HostFs`](crate::fs::HostFs).
//!
//! `NativeFs` names the backend for the build target.

#[cfg(unix)]
mod unix;
#[cfg(windows)]
mod win32;

#[cfg(unix)]
pub use self::unix::UnixFs;
#[cfg(unix)]
pub type NativeFs = UnixFs;

#[cfg(windows)]
pub use self::win32::WindowsFs;
#[cfg(windows)]
pub type NativeFs = WindowsFs;
