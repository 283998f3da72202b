//! Environment adapter.
//!
//! Callers receive an [`Environment`] instead of reaching for the process
//! table, so tests can substitute a [`MemoryEnv`].

use std::ffi::OsStr;
use std::ffi::OsString;
use std::sync::Mutex;
use std::sync::PoisonError;
use crate::error::Error;
use crate::error::Result;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EnvEntry {
    pub key: OsString,
    pub value: OsString,
}

impl EnvEntry {
    pub fn new<K: Into<OsString>, V: Into<OsString>>(key: K, value: V) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }

    /// Splits a raw `KEY=VALUE` entry on the first `=`.
    ///
    /// A leading `=` is part of the key (Windows keeps per-drive working
    /// directories as `=C:=C:\dir`). Entries without a separator yield `None`.
    pub fn parse(raw: &str) -> Option<Self> {
        let first = raw.chars().next()?.len_utf8();
        let split = raw[first..].find('=')? + first;
        Some(Self::new(&raw[..split], &raw[split + 1..]))
    }
}

pub trait Environment {
    /// Snapshot of every variable, in the order the table holds them.
    fn vars(&self) -> Vec<EnvEntry>;

    fn var(&self, key: &OsStr) -> Option<OsString>;

    fn set_var(&self, key: &OsStr, value: &OsStr) -> Result<()>;

    /// Removes `key`; absent keys are not an error.
    fn remove_var(&self, key: &OsStr) -> Result<()>;
}

pub(crate) fn check_key(key: &OsStr) -> Result<()> {
    let s = key.to_string_lossy();
    if s.is_empty() {
        return Err(Error::invalid("environment key is empty"));
    }
    if s.contains(|c: char| c == '=' || c == '\0') {
        return Err(Error::invalid(format!(
            "environment key {:?} contains '=' or NUL",
            key
        )));
    }
    Ok(())
}

fn check_value(key: &OsStr, value: &OsStr) -> Result<()> {
    if value.to_string_lossy().contains('\0') {
        return Err(Error::invalid(format!(
            "value of environment key {:?} contains NUL",
            key
        )));
    }
    Ok(())
}

/// The environment table of the current process.
///
/// The table is shared by every thread; interleaved updates and snapshots
/// from several threads need outside coordination.
#[derive(Clone, Copy, Debug, Default)]
pub struct ProcessEnv;

impl Environment for ProcessEnv {
    fn vars(&self) -> Vec<EnvEntry> {
        std::env::vars_os()
            .map(|(key, value)| EnvEntry { key, value })
            .collect()
    }

    fn var(&self, key: &OsStr) -> Option<OsString> {
        check_key(key).ok()?;
        std::env::var_os(key)
    }

    #[tracing::instrument(level = "debug", skip(self, value))]
    fn set_var(&self, key: &OsStr, value: &OsStr) -> Result<()> {
        check_key(key)?;
        check_value(key, value)?;
        std::env::set_var(key, value);
        Ok(())
    }

    #[tracing::instrument(level = "debug", skip(self))]
    fn remove_var(&self, key: &OsStr) -> Result<()> {
        check_key(key)?;
        std::env::remove_var(key);
        Ok(())
    }
}

/// A private environment table that never touches the process.
#[derive(Debug, Default)]
pub struct MemoryEnv {
    entries: Mutex<Vec<EnvEntry>>,
}

impl MemoryEnv {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a table from raw `KEY=VALUE` entries, skipping malformed ones.
    pub fn from_block<'a, I>(block: I) -> Self
    where
        I: IntoIterator<Item = &'a str>,
    {
        let entries = block.into_iter().filter_map(EnvEntry::parse).collect();
        Self {
            entries: Mutex::new(entries),
        }
    }

    fn entries(&self) -> std::sync::MutexGuard<'_, Vec<EnvEntry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Environment for MemoryEnv {
    fn vars(&self) -> Vec<EnvEntry> {
        self.entries().clone()
    }

    fn var(&self, key: &OsStr) -> Option<OsString> {
        self.entries()
            .iter()
            .find(|e| e.key.as_os_str() == key)
            .map(|e| e.value.clone())
    }

    fn set_var(&self, key: &OsStr, value: &OsStr) -> Result<()> {
        check_key(key)?;
        check_value(key, value)?;

        let mut entries = self.entries();
        match entries.iter_mut().find(|e| e.key.as_os_str() == key) {
            Some(entry) => entry.value = value.to_owned(),
            None => entries.push(EnvEntry::new(key, value)),
        }
        Ok(())
    }

    fn remove_var(&self, key: &OsStr) -> Result<()> {
        check_key(key)?;
        self.entries().retain(|e| e.key.as_os_str() != key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    fn os(s: &str) -> &OsStr {
        OsStr::new(s)
    }

    #[test]
    fn parse_splits_on_first_equals() {
        assert_eq!(EnvEntry::parse("A=b=c"), Some(EnvEntry::new("A", "b=c")));
        assert_eq!(EnvEntry::parse("EMPTY="), Some(EnvEntry::new("EMPTY", "")));
        assert_eq!(EnvEntry::parse("=C:=C:\\dir"), Some(EnvEntry::new("=C:", "C:\\dir")));
        assert_eq!(EnvEntry::parse("NOSEP"), None);
        assert_eq!(EnvEntry::parse(""), None);
        assert_eq!(EnvEntry::parse("="), None);
    }

    #[test]
    fn block_skips_malformed_entries() {
        let env = MemoryEnv::from_block(["A=1", "junk", "B=2"]);
        assert_eq!(
            env.vars(),
            vec![EnvEntry::new("A", "1"), EnvEntry::new("B", "2")]
        );
    }

    #[test]
    fn memory_env_set_overwrite_remove() {
        let env = MemoryEnv::new();
        env.set_var(os("K"), os("V")).unwrap();
        assert!(env.vars().contains(&EnvEntry::new("K", "V")));

        env.set_var(os("K"), os("W")).unwrap();
        assert_eq!(env.var(os("K")), Some("W".into()));
        assert_eq!(env.vars().len(), 1);

        env.remove_var(os("K")).unwrap();
        assert!(env.vars().is_empty());
        env.remove_var(os("K")).unwrap();
    }

    #[test]
    fn bad_keys_and_values_are_rejected() {
        let env = MemoryEnv::new();
        for key in ["", "A=B", "A\0B"] {
            let err = env.set_var(os(key), os("v")).unwrap_err();
            assert_eq!(err.kind(), crate::error::ErrorKind::InvalidArgument);
        }
        assert!(env.set_var(os("K"), os("a\0b")).is_err());
        assert!(env.remove_var(os("")).is_err());
        assert!(env.vars().is_empty());
    }

    #[test]
    #[serial]
    fn process_env_round_trip() {
        let env = ProcessEnv;
        let key = os("HOSTSYS_TEST_PROCESS_ENV");

        env.set_var(key, os("V")).unwrap();
        assert!(env.vars().contains(&EnvEntry::new(key, "V")));
        assert_eq!(env.var(key), Some("V".into()));

        env.remove_var(key).unwrap();
        assert!(!env.vars().iter().any(|e| e.key.as_os_str() == key));
        assert_eq!(env.var(key), None);
    }

    #[test]
    #[serial]
    fn process_env_rejects_what_std_would_panic_on() {
        let env = ProcessEnv;
        assert!(env.set_var(os("A=B"), os("v")).is_err());
        assert!(env.set_var(os("HOSTSYS_TEST_NUL"), os("a\0b")).is_err());
        assert_eq!(env.var(os("")), None);
    }
}
