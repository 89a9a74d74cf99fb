//! Port counter persistence.
//!
//! The counter is a single line holding one port number. Stores hand back
//! the raw line; interpreting it (and recovering from garbage) is the
//! allocator's job.

use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::debug;

use crate::error::{StateError, StateResult};

/// Durable home of the next allocatable port.
pub trait PortStore: Send + Sync {
    /// The persisted line, or `None` if nothing was ever saved.
    fn load(&self) -> StateResult<Option<String>>;

    fn save(&self, port: u16) -> StateResult<()>;
}

/// Single-line text file (`NodePortAllocation.txt`).
///
/// Writes go to a sibling temp file first and are renamed into place, so a
/// crash mid-write leaves the previous value intact.
#[derive(Debug, Clone)]
pub struct FilePortStore {
    path: PathBuf,
}

impl FilePortStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

impl PortStore for FilePortStore {
    fn load(&self) -> StateResult<Option<String>> {
        match std::fs::read_to_string(&self.path) {
            Ok(content) => {
                let line = content.lines().next().unwrap_or("").trim().to_string();
                debug!(path = %self.path.display(), %line, "port counter read");
                Ok(Some(line))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(source) => Err(StateError::Read {
                path: self.path.clone(),
                source,
            }),
        }
    }

    fn save(&self, port: u16) -> StateResult<()> {
        let tmp = self.temp_path();
        let write_err = |source: std::io::Error| StateError::Write {
            path: self.path.clone(),
            source,
        };
        std::fs::write(&tmp, format!("{port}\n")).map_err(write_err)?;
        std::fs::rename(&tmp, &self.path).map_err(write_err)?;
        debug!(path = %self.path.display(), port, "port counter persisted");
        Ok(())
    }
}

/// Process-local store for tests and dry runs.
#[derive(Debug, Default)]
pub struct MemoryPortStore {
    value: Mutex<Option<String>>,
    fail_next_save: AtomicBool,
}

impl MemoryPortStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start with `line` as the persisted content.
    pub fn with_line(line: impl Into<String>) -> Self {
        Self {
            value: Mutex::new(Some(line.into())),
            fail_next_save: AtomicBool::new(false),
        }
    }

    /// The currently persisted line.
    pub fn persisted(&self) -> Option<String> {
        self.value.lock().ok().and_then(|v| v.clone())
    }

    /// Make the next `save` fail once.
    pub fn fail_next_save(&self) {
        self.fail_next_save.store(true, Ordering::SeqCst);
    }
}

impl PortStore for MemoryPortStore {
    fn load(&self) -> StateResult<Option<String>> {
        let value = self
            .value
            .lock()
            .map_err(|e| StateError::Unavailable(e.to_string()))?;
        Ok(value.clone())
    }

    fn save(&self, port: u16) -> StateResult<()> {
        if self.fail_next_save.swap(false, Ordering::SeqCst) {
            return Err(StateError::Unavailable("injected save failure".to_string()));
        }
        let mut value = self
            .value
            .lock()
            .map_err(|e| StateError::Unavailable(e.to_string()))?;
        *value = Some(port.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_loads_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = FilePortStore::new(dir.path().join("NodePortAllocation.txt"));
        assert_eq!(store.load().unwrap(), None);
    }

    #[test]
    fn file_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let store = FilePortStore::new(dir.path().join("NodePortAllocation.txt"));
        store.save(30005).unwrap();
        assert_eq!(store.load().unwrap().as_deref(), Some("30005"));
        assert!(!dir.path().join("NodePortAllocation.txt.tmp").exists());
    }

    #[test]
    fn file_load_reads_first_line_trimmed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ports.txt");
        std::fs::write(&path, "  30010 \nleftover\n").unwrap();
        let store = FilePortStore::new(&path);
        assert_eq!(store.load().unwrap().as_deref(), Some("30010"));
    }

    #[test]
    fn file_save_into_missing_directory_fails() {
        let dir = tempfile::tempdir().unwrap();
        let store = FilePortStore::new(dir.path().join("absent").join("ports.txt"));
        assert!(matches!(store.save(30001), Err(StateError::Write { .. })));
    }

    #[test]
    fn memory_store_injected_failure_is_one_shot() {
        let store = MemoryPortStore::with_line("30001");
        store.fail_next_save();
        assert!(store.save(30002).is_err());
        assert_eq!(store.persisted().as_deref(), Some("30001"));
        store.save(30002).unwrap();
        assert_eq!(store.persisted().as_deref(), Some("30002"));
    }
}
