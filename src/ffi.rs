//! C ABI entry points.
//!
//! Strings and buffers come in as `(ptr, len)` pairs and are never assumed to
//! be NUL-terminated. Data handed back is owned by the caller and released
//! with [`hostsys_bytes_free`] or [`hostsys_bytes_array_free`].
//!
//! Failures return a sentinel (`-1`, `0`, a null buffer) and park an error
//! in a thread-local slot, read with [`hostsys_last_error_kind`] and
//! [`hostsys_last_error_message`].

use libc::c_char;
use libc::c_int;
use std::cell::RefCell;
use std::ffi::OsStr;
use std::ffi::OsString;
use std::panic;
use std::panic::AssertUnwindSafe;
use std::path::PathBuf;
use std::ptr;
use std::slice;
use std::sync::OnceLock;
use crate::clock;
use crate::config::LogFormat;
use crate::env;
use crate::env::Environment;
use crate::env::ProcessEnv;
use crate::error::Error;
use crate::error::ErrorKind;
use crate::error::Result;
use crate::file::HostFile;
use crate::fs::HostFs;
use crate::handle;
use crate::handle::HandleRef;
use crate::logging;
use crate::platform::NativeFs;
use crate::record::STAT_RECORD_LEN;

thread_local! {
    static LAST_ERROR: RefCell<Option<Error>> = RefCell::new(None);
}

fn update_last_error(err: Error) {
    tracing::debug!(%err, "call failed");
    LAST_ERROR.with(|prev| {
        *prev.borrow_mut() = Some(err);
    });
}

fn take_last_error() -> Option<Error> {
    LAST_ERROR.with(|prev| prev.borrow_mut().take())
}

fn native_fs() -> &'static NativeFs {
    static FS: OnceLock<NativeFs> = OnceLock::new();
    FS.get_or_init(NativeFs::default)
}

/// Runs `f`, turning errors and panics into `fallback` plus a last error.
fn call<T, F>(fallback: T, f: F) -> T
where
    F: FnOnce() -> Result<T>,
{
    match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(Ok(value)) => value,
        Ok(Err(err)) => {
            update_last_error(err);
            fallback
        }
        Err(_) => {
            tracing::error!("panic caught at the C boundary");
            update_last_error(Error::invalid("internal panic"));
            fallback
        }
    }
}

fn status(result: Result<()>) -> Result<c_int> {
    result.map(|()| 0)
}

unsafe fn bytes_arg<'a>(ptr: *const u8, len: usize) -> Result<&'a [u8]> {
    if ptr.is_null() {
        if len == 0 {
            return Ok(&[]);
        }
        return Err(Error::invalid("null buffer with non-zero length"));
    }
    Ok(slice::from_raw_parts(ptr, len))
}

unsafe fn os_arg(ptr: *const u8, len: usize) -> Result<OsString> {
    let bytes = bytes_arg(ptr, len)?;
    if bytes.contains(&0) {
        return Err(Error::invalid("argument contains a NUL byte"));
    }
    os_from_bytes(bytes)
}

#[cfg(unix)]
fn os_from_bytes(bytes: &[u8]) -> Result<OsString> {
    use std::os::unix::ffi::OsStrExt;
    Ok(OsStr::from_bytes(bytes).to_owned())
}

#[cfg(not(unix))]
fn os_from_bytes(bytes: &[u8]) -> Result<OsString> {
    std::str::from_utf8(bytes)
        .map(OsString::from)
        .map_err(|_| Error::invalid("argument is not valid UTF-8"))
}

#[cfg(unix)]
fn os_to_bytes(s: &OsStr) -> Vec<u8> {
    use std::os::unix::ffi::OsStrExt;
    s.as_bytes().to_vec()
}

#[cfg(not(unix))]
fn os_to_bytes(s: &OsStr) -> Vec<u8> {
    s.to_string_lossy().into_owned().into_bytes()
}

unsafe fn path_arg(ptr: *const u8, len: usize) -> Result<PathBuf> {
    os_arg(ptr, len).map(PathBuf::from)
}

// ==== buffers ====

/// A caller-owned byte buffer. A null `ptr` signals failure or absence.
#[repr(C)]
pub struct HostBytes {
    pub ptr: *mut u8,
    pub len: usize,
}

impl HostBytes {
    fn null() -> Self {
        Self {
            ptr: ptr::null_mut(),
            len: 0,
        }
    }

    fn from_vec(v: Vec<u8>) -> Self {
        let b = v.into_boxed_slice();
        let len = b.len();
        let ptr = Box::into_raw(b) as *mut u8;
        Self { ptr, len }
    }

    unsafe fn free(self) {
        if !self.ptr.is_null() {
            drop(Box::from_raw(ptr::slice_from_raw_parts_mut(self.ptr, self.len)));
        }
    }
}

/// A caller-owned array of [`HostBytes`].
#[repr(C)]
pub struct HostBytesArray {
    pub ptr: *mut HostBytes,
    pub len: usize,
}

impl HostBytesArray {
    fn null() -> Self {
        Self {
            ptr: ptr::null_mut(),
            len: 0,
        }
    }

    fn from_vec(v: Vec<HostBytes>) -> Self {
        let b = v.into_boxed_slice();
        let len = b.len();
        let ptr = Box::into_raw(b) as *mut HostBytes;
        Self { ptr, len }
    }
}

/// Releases a buffer returned by this library.
///
/// # Safety
///
/// `bytes` must come from this library and must not be freed twice.
#[no_mangle]
pub unsafe extern "C" fn hostsys_bytes_free(bytes: HostBytes) {
    bytes.free();
}

/// Releases an array returned by this library, including every element.
///
/// # Safety
///
/// `array` must come from this library and must not be freed twice.
#[no_mangle]
pub unsafe extern "C" fn hostsys_bytes_array_free(array: HostBytesArray) {
    if array.ptr.is_null() {
        return;
    }
    let items = Box::from_raw(ptr::slice_from_raw_parts_mut(array.ptr, array.len));
    for item in Vec::from(items) {
        item.free();
    }
}

// ==== errors and logging ====

/// Installs the stderr log subscriber (`RUST_LOG` filtered). Returns `1` if
/// it was installed by this call and `0` if one already existed.
#[no_mangle]
pub extern "C" fn hostsys_init_logging(json: c_int) -> c_int {
    let format = if json != 0 {
        LogFormat::Json
    } else {
        LogFormat::Text
    };
    logging::init(format) as c_int
}

/// Class of the pending error on this thread, see [`ErrorKind`]. Does not
/// clear it.
#[no_mangle]
pub extern "C" fn hostsys_last_error_kind() -> c_int {
    LAST_ERROR.with(|prev| match *prev.borrow() {
        Some(ref err) => err.kind() as c_int,
        None => ErrorKind::None as c_int,
    })
}

/// Bytes needed to hold the pending error message, including the trailing
/// NUL; `0` if there is none.
#[no_mangle]
pub extern "C" fn hostsys_last_error_length() -> c_int {
    LAST_ERROR.with(|prev| match *prev.borrow() {
        Some(ref err) => err.to_string().len() as c_int + 1,
        None => 0,
    })
}

/// Copies the pending error message into `buffer` as a C string and clears
/// it.
///
/// Returns the number of bytes written including the NUL, `0` if there was
/// no error, or `-1` if `buffer` is null or too small (the error is then
/// kept).
///
/// # Safety
///
/// `buffer` must be valid for `length` bytes of writes.
#[no_mangle]
pub unsafe extern "C" fn hostsys_last_error_message(buffer: *mut c_char, length: c_int) -> c_int {
    if buffer.is_null() || length < 0 {
        return -1;
    }

    let message = match LAST_ERROR.with(|prev| prev.borrow().as_ref().map(|e| e.to_string())) {
        Some(message) => message,
        None => return 0,
    };

    let length = length as usize;
    if message.len() >= length {
        return -1;
    }

    let buffer = slice::from_raw_parts_mut(buffer as *mut u8, length);
    buffer[..message.len()].copy_from_slice(message.as_bytes());
    buffer[message.len()] = 0;
    take_last_error();

    message.len() as c_int + 1
}

// ==== file handles ====

/// Opens `path` with an fopen-style `mode` (`r`, `w`, `a`, `+`, `b`).
/// Returns a handle, or `0` on failure.
///
/// # Safety
///
/// Both buffers must be valid for their lengths.
#[no_mangle]
pub unsafe extern "C" fn hostsys_file_open(
    path: *const u8,
    path_len: usize,
    mode: *const u8,
    mode_len: usize,
) -> u64 {
    call(handle::NO_HANDLE, || {
        let path = path_arg(path, path_len)?;
        let mode = std::str::from_utf8(bytes_arg(mode, mode_len)?)
            .map_err(|_| Error::invalid("open mode is not valid UTF-8"))?;
        let file = HostFile::open(path, mode)?;
        Ok(handle::into_handle(Box::new(file)))
    })
}

#[no_mangle]
pub extern "C" fn hostsys_is_null(handle: u64) -> c_int {
    (handle == handle::NO_HANDLE) as c_int
}

unsafe fn file_ref(handle: u64) -> Result<HandleRef<HostFile>> {
    HandleRef::from_handle(handle).ok_or_else(|| Error::invalid("null file handle"))
}

/// Reads up to `len` bytes; fewer means end of file. `-1` on failure.
///
/// # Safety
///
/// `handle` must be open and `buf` valid for `len` bytes of writes.
#[no_mangle]
pub unsafe extern "C" fn hostsys_file_read(handle: u64, buf: *mut u8, len: usize) -> i64 {
    call(-1, || {
        let mut file = file_ref(handle)?;
        if len == 0 {
            return Ok(0);
        }
        if buf.is_null() {
            return Err(Error::invalid("null buffer with non-zero length"));
        }
        let buf = slice::from_raw_parts_mut(buf, len);
        Ok(file.read(buf)? as i64)
    })
}

/// Writes all `len` bytes. Returns `len`, or `-1` on failure.
///
/// # Safety
///
/// `handle` must be open and `buf` valid for `len` bytes.
#[no_mangle]
pub unsafe extern "C" fn hostsys_file_write(handle: u64, buf: *const u8, len: usize) -> i64 {
    call(-1, || {
        let mut file = file_ref(handle)?;
        let buf = bytes_arg(buf, len)?;
        Ok(file.write(buf)? as i64)
    })
}

/// `whence` is 0 (start), 1 (current) or 2 (end). Returns `0` or `-1`.
///
/// # Safety
///
/// `handle` must be open.
#[no_mangle]
pub unsafe extern "C" fn hostsys_file_seek(handle: u64, offset: i64, whence: c_int) -> c_int {
    call(-1, || {
        let mut file = file_ref(handle)?;
        file.seek(offset, whence)?;
        Ok(0)
    })
}

/// Current offset, or `-1` on failure.
///
/// # Safety
///
/// `handle` must be open.
#[no_mangle]
pub unsafe extern "C" fn hostsys_file_tell(handle: u64) -> i64 {
    call(-1, || {
        let mut file = file_ref(handle)?;
        let pos = file.tell()?;
        i64::try_from(pos).map_err(|_| Error::invalid("offset does not fit in i64"))
    })
}

/// # Safety
///
/// `handle` must be open.
#[no_mangle]
pub unsafe extern "C" fn hostsys_file_flush(handle: u64) -> c_int {
    call(-1, || {
        let mut file = file_ref(handle)?;
        status(file.flush())
    })
}

/// Closes and releases the handle, whether or not the close succeeds.
///
/// # Safety
///
/// `handle` must be open and is invalid after this call.
#[no_mangle]
pub unsafe extern "C" fn hostsys_file_close(handle: u64) -> c_int {
    call(-1, || {
        let file = handle::from_handle::<HostFile>(handle)
            .ok_or_else(|| Error::invalid("null file handle"))?;
        status(file.close())
    })
}

// ==== paths ====

/// `1` if `path` exists, else `0`.
///
/// # Safety
///
/// `path` must be valid for `path_len` bytes.
#[no_mangle]
pub unsafe extern "C" fn hostsys_path_exists(path: *const u8, path_len: usize) -> c_int {
    call(0, || {
        let path = path_arg(path, path_len)?;
        Ok(native_fs().exists(&path) as c_int)
    })
}

/// Type code of `path` itself (0 regular, 1 directory, 2 symlink,
/// 3 other), or `-1` on failure.
///
/// # Safety
///
/// `path` must be valid for `path_len` bytes.
#[no_mangle]
pub unsafe extern "C" fn hostsys_stat_path(path: *const u8, path_len: usize) -> c_int {
    call(-1, || {
        let path = path_arg(path, path_len)?;
        Ok(native_fs().stat_kind(&path)?.code() as c_int)
    })
}

/// Fills `out` with the 160-byte stat record of `path`. Returns `0` or `-1`.
///
/// # Safety
///
/// `path` must be valid for `path_len` bytes and `out` for `out_len` bytes of
/// writes.
#[no_mangle]
pub unsafe extern "C" fn hostsys_stat_details(
    path: *const u8,
    path_len: usize,
    out: *mut u8,
    out_len: usize,
) -> c_int {
    call(-1, || {
        if out.is_null() || out_len < STAT_RECORD_LEN {
            return Err(Error::invalid(format!(
                "stat buffer must hold {} bytes",
                STAT_RECORD_LEN
            )));
        }
        let path = path_arg(path, path_len)?;
        let record = native_fs().stat_details(&path)?;
        let out = slice::from_raw_parts_mut(out, STAT_RECORD_LEN);
        out.copy_from_slice(&record.to_bytes());
        Ok(0)
    })
}

/// `1` if `path` is a directory, else `0`.
///
/// # Safety
///
/// `path` must be valid for `path_len` bytes.
#[no_mangle]
pub unsafe extern "C" fn hostsys_is_dir(path: *const u8, path_len: usize) -> c_int {
    call(0, || {
        let path = path_arg(path, path_len)?;
        Ok(native_fs().is_dir(&path) as c_int)
    })
}

/// `1` if `path` is a regular file, else `0`.
///
/// # Safety
///
/// `path` must be valid for `path_len` bytes.
#[no_mangle]
pub unsafe extern "C" fn hostsys_is_file(path: *const u8, path_len: usize) -> c_int {
    call(0, || {
        let path = path_arg(path, path_len)?;
        Ok(native_fs().is_file(&path) as c_int)
    })
}

/// `0` file, `1` directory, `3` something else, `-1` missing.
///
/// # Safety
///
/// `path` must be valid for `path_len` bytes.
#[no_mangle]
pub unsafe extern "C" fn hostsys_path_kind(path: *const u8, path_len: usize) -> c_int {
    call(-1, || {
        let path = path_arg(path, path_len)?;
        Ok(native_fs().path_kind(&path).code())
    })
}

/// # Safety
///
/// `path` must be valid for `path_len` bytes.
#[no_mangle]
pub unsafe extern "C" fn hostsys_create_dir(path: *const u8, path_len: usize) -> c_int {
    call(-1, || {
        let path = path_arg(path, path_len)?;
        status(native_fs().create_dir(&path))
    })
}

/// # Safety
///
/// `path` must be valid for `path_len` bytes.
#[no_mangle]
pub unsafe extern "C" fn hostsys_remove_dir(path: *const u8, path_len: usize) -> c_int {
    call(-1, || {
        let path = path_arg(path, path_len)?;
        status(native_fs().remove_dir(&path))
    })
}

/// # Safety
///
/// `path` must be valid for `path_len` bytes.
#[no_mangle]
pub unsafe extern "C" fn hostsys_remove_file(path: *const u8, path_len: usize) -> c_int {
    call(-1, || {
        let path = path_arg(path, path_len)?;
        status(native_fs().remove_file(&path))
    })
}

/// Names in the directory, without `.` and `..`. Null array on failure.
///
/// # Safety
///
/// `path` must be valid for `path_len` bytes.
#[no_mangle]
pub unsafe extern "C" fn hostsys_list_dir(path: *const u8, path_len: usize) -> HostBytesArray {
    call(HostBytesArray::null(), || {
        let path = path_arg(path, path_len)?;
        let names = native_fs()
            .list_dir(&path)?
            .into_iter()
            .map(|entry| HostBytes::from_vec(os_to_bytes(&entry.name)))
            .collect();
        Ok(HostBytesArray::from_vec(names))
    })
}

/// Whole content of the file. Null buffer on failure.
///
/// # Safety
///
/// `path` must be valid for `path_len` bytes.
#[no_mangle]
pub unsafe extern "C" fn hostsys_read_file(path: *const u8, path_len: usize) -> HostBytes {
    call(HostBytes::null(), || {
        let path = path_arg(path, path_len)?;
        native_fs().read_file(&path).map(HostBytes::from_vec)
    })
}

/// Replaces the file content with exactly `content_len` bytes.
///
/// # Safety
///
/// Both buffers must be valid for their lengths.
#[no_mangle]
pub unsafe extern "C" fn hostsys_write_file(
    path: *const u8,
    path_len: usize,
    content: *const u8,
    content_len: usize,
) -> c_int {
    call(-1, || {
        let path = path_arg(path, path_len)?;
        let content = bytes_arg(content, content_len)?;
        status(native_fs().write_file(&path, content))
    })
}

// ==== environment ====

/// Flat `key, value, key, value, ...` array of the process environment.
#[no_mangle]
pub extern "C" fn hostsys_env_vars() -> HostBytesArray {
    call(HostBytesArray::null(), || {
        let mut flat = vec![];
        for entry in ProcessEnv.vars() {
            flat.push(HostBytes::from_vec(os_to_bytes(&entry.key)));
            flat.push(HostBytes::from_vec(os_to_bytes(&entry.value)));
        }
        Ok(HostBytesArray::from_vec(flat))
    })
}

/// Value of `key`, or a null buffer if it is unset. A malformed key also
/// gives a null buffer, with an `InvalidArgument` last error.
///
/// # Safety
///
/// `key` must be valid for `key_len` bytes.
#[no_mangle]
pub unsafe extern "C" fn hostsys_env_get(key: *const u8, key_len: usize) -> HostBytes {
    call(HostBytes::null(), || {
        let key = os_arg(key, key_len)?;
        env::check_key(&key)?;
        Ok(ProcessEnv
            .var(&key)
            .map(|value| HostBytes::from_vec(os_to_bytes(&value)))
            .unwrap_or_else(HostBytes::null))
    })
}

/// # Safety
///
/// Both buffers must be valid for their lengths.
#[no_mangle]
pub unsafe extern "C" fn hostsys_env_set(
    key: *const u8,
    key_len: usize,
    value: *const u8,
    value_len: usize,
) -> c_int {
    call(-1, || {
        let key = os_arg(key, key_len)?;
        let value = os_arg(value, value_len)?;
        status(ProcessEnv.set_var(&key, &value))
    })
}

/// # Safety
///
/// `key` must be valid for `key_len` bytes.
#[no_mangle]
pub unsafe extern "C" fn hostsys_env_unset(key: *const u8, key_len: usize) -> c_int {
    call(-1, || {
        let key = os_arg(key, key_len)?;
        status(ProcessEnv.remove_var(&key))
    })
}

// ==== clock ====

/// Monotonic ticks (nanoseconds since a process-wide epoch).
#[no_mangle]
pub extern "C" fn hostsys_instant_now() -> u64 {
    clock::Instant::now().as_nanos()
}

#[no_mangle]
pub extern "C" fn hostsys_instant_as_secs(ticks: u64) -> f64 {
    clock::Instant::from_nanos(ticks).as_secs_f64()
}

/// Seconds elapsed since `ticks` was taken.
#[no_mangle]
pub extern "C" fn hostsys_elapsed_seconds(ticks: u64) -> f64 {
    clock::Instant::from_nanos(ticks).elapsed_seconds()
}

/// Wall-clock start mark, in seconds since the Unix epoch.
#[no_mangle]
pub extern "C" fn hostsys_timer_start() -> f64 {
    clock::WallTimer::start().started_at()
}

#[no_mangle]
pub extern "C" fn hostsys_timer_elapsed(start: f64) -> f64 {
    clock::WallTimer::from_started_at(start).elapsed_seconds()
}

#[no_mangle]
pub extern "C" fn hostsys_sleep_seconds(secs: f64) {
    clock::sleep_seconds(secs)
}
