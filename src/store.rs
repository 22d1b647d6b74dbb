//! ICC profile store: directory watching, checksum-based dedup, and the
//! three standard search-location kinds.

use crate::error::{ErrorKind, Result};
use crate::icc::Profile;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// A location the store can search, in priority order within its kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchKind {
    User,
    Machine,
    System,
}

/// Candidate directories for a search kind, most-preferred first. Callers
/// combine this with `create_location` to auto-create the first candidate
/// that doesn't yet exist.
#[must_use]
pub fn search_paths(kind: SearchKind, home: &Path) -> Vec<PathBuf> {
    match kind {
        SearchKind::User => vec![
            home.join(".local/share/icc"),
            home.join(".color/icc"),
        ],
        SearchKind::Machine => vec![PathBuf::from("/var/lib/color/icc")],
        SearchKind::System => vec![
            PathBuf::from("/usr/share/color/icc"),
            PathBuf::from("/usr/local/share/color/icc"),
        ],
    }
}

/// A create/delete event the watcher reports.
#[derive(Debug, Clone)]
pub enum Event {
    Added(PathBuf, [u8; 16]),
    Removed(PathBuf),
}

/// Temp-file markers the store refuses to index: GIO's
/// `.goutputstream-XXXXXX` rename-in-progress siblings, `.part` download
/// partials, and `~` backup/rename siblings.
const DEFAULT_TEMPFILE_MARKERS: &[&str] = &[".goutputstream", ".part", "~"];

fn is_tempfile(path: &Path, markers: &[&str]) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|name| markers.iter().any(|m| name.contains(m)))
}

/// The in-memory profile table: checksum-keyed, so inserting the same bytes
/// twice (even under different paths) is a no-op.
#[derive(Default)]
pub struct Store {
    by_checksum: Mutex<HashMap<[u8; 16], PathBuf>>,
    tempfile_markers: Vec<String>,
}

impl Store {
    #[must_use]
    pub fn new() -> Self {
        Self { by_checksum: Mutex::new(HashMap::new()), tempfile_markers: DEFAULT_TEMPFILE_MARKERS.iter().map(|s| s.to_string()).collect() }
    }

    pub fn with_tempfile_marker(mut self, marker: impl Into<String>) -> Self {
        self.tempfile_markers.push(marker.into());
        self
    }

    fn markers(&self) -> Vec<&str> {
        self.tempfile_markers.iter().map(String::as_str).collect()
    }

    /// Recurses a directory up to 2 levels deep, loading every file whose
    /// MIME type looks like an ICC profile (binary-sniffed: `acsp` at the
    /// expected header offset, since content-type sniffing isn't available
    /// standalone). Duplicate checksums emit no event for the repeat.
    pub fn scan(&self, root: &Path) -> Result<Vec<Event>> {
        let mut events = Vec::new();
        self.scan_level(root, 2, &mut events)?;
        Ok(events)
    }

    fn scan_level(&self, dir: &Path, depth: u32, events: &mut Vec<Event>) -> Result<()> {
        if depth == 0 {
            return Ok(());
        }
        let read_dir = match std::fs::read_dir(dir) {
            Ok(rd) => rd,
            Err(e) => return Err(ErrorKind::from(e)),
        };
        for entry in read_dir {
            let entry = entry.map_err(ErrorKind::from)?;
            let path = entry.path();
            if is_tempfile(&path, &self.markers()) {
                continue;
            }
            let file_type = entry.file_type().map_err(ErrorKind::from)?;
            if file_type.is_dir() {
                self.scan_level(&path, depth - 1, events)?;
                continue;
            }
            if !file_type.is_file() {
                continue;
            }
            if let Some(event) = self.try_add_file(&path)? {
                events.push(event);
            }
        }
        Ok(())
    }

    fn try_add_file(&self, path: &Path) -> Result<Option<Event>> {
        let bytes = std::fs::read(path).map_err(ErrorKind::from)?;
        if !looks_like_icc(&bytes) {
            return Ok(None);
        }
        let profile = Profile::load(&bytes)?;
        let checksum = profile.checksum()?;
        let mut table = self.by_checksum.lock().unwrap();
        if table.contains_key(&checksum) {
            return Ok(None);
        }
        table.insert(checksum, path.to_path_buf());
        Ok(Some(Event::Added(path.to_path_buf(), checksum)))
    }

    /// Handles a watcher-reported creation: loads and inserts (deduping by
    /// checksum), returning the `Added` event if it was new.
    pub fn on_created(&self, path: &Path) -> Result<Option<Event>> {
        if is_tempfile(path, &self.markers()) {
            return Ok(None);
        }
        self.try_add_file(path)
    }

    /// Handles a watcher-reported deletion: removes every profile whose
    /// recorded path matches `path` (by prefix, so a directory delete drops
    /// everything beneath it) and reports each removal.
    pub fn on_removed(&self, path: &Path) -> Vec<Event> {
        let mut table = self.by_checksum.lock().unwrap();
        let removed: Vec<[u8; 16]> = table
            .iter()
            .filter(|(_, p)| p.starts_with(path) || p.as_path() == path)
            .map(|(c, _)| *c)
            .collect();
        removed
            .into_iter()
            .map(|c| {
                let p = table.remove(&c).unwrap();
                Event::Removed(p)
            })
            .collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.by_checksum.lock().unwrap().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn looks_like_icc(bytes: &[u8]) -> bool {
    bytes.len() >= 40 && &bytes[36..40] == b"acsp"
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_minimal_profile(path: &Path) {
        let profile = Profile::new();
        let bytes = profile.save().unwrap();
        let mut f = std::fs::File::create(path).unwrap();
        f.write_all(&bytes).unwrap();
    }

    #[test]
    fn scanning_dedupes_identical_content() {
        let dir = tempfile::tempdir().unwrap();
        write_minimal_profile(&dir.path().join("a.icc"));
        write_minimal_profile(&dir.path().join("b.icc"));
        let store = Store::new();
        let events = store.scan(dir.path()).unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn tempfile_markers_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        write_minimal_profile(&dir.path().join(".goutputstream-XYZ123"));
        let store = Store::new();
        let events = store.scan(dir.path()).unwrap();
        assert!(events.is_empty());
        assert!(store.is_empty());
    }

    #[test]
    fn non_icc_files_are_ignored() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("readme.txt"), b"not a profile").unwrap();
        let store = Store::new();
        let events = store.scan(dir.path()).unwrap();
        assert!(events.is_empty());
    }

    #[test]
    fn removal_drops_by_path_prefix() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.icc");
        write_minimal_profile(&path);
        let store = Store::new();
        store.scan(dir.path()).unwrap();
        assert_eq!(store.len(), 1);
        let events = store.on_removed(dir.path());
        assert_eq!(events.len(), 1);
        assert!(store.is_empty());
    }
}
