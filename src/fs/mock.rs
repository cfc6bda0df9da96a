// src/fs/mock.rs

use super::FileSystem;
use anyhow::{anyhow, Result};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime};

#[derive(Debug, Clone)]
pub enum MockEntry {
    File(Vec<u8>),
    Dir(Vec<String>), // child names
}

#[derive(Debug, Default)]
struct MockState {
    entries: HashMap<PathBuf, MockEntry>,
    created: HashMap<PathBuf, SystemTime>,
}

/// In-memory filesystem for catalog and result tests.
///
/// Parent directories are created implicitly. Creation times default to the
/// Unix epoch unless set with [`MockFileSystem::set_created`].
#[derive(Debug, Clone, Default)]
pub struct MockFileSystem {
    state: Arc<Mutex<MockState>>,
}

impl MockFileSystem {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_file(&self, path: impl AsRef<Path>, content: impl Into<Vec<u8>>) {
        let path = path.as_ref().to_path_buf();
        let mut state = self.state.lock().unwrap();
        if let Some(parent) = path.parent() {
            ensure_dir(&mut state, parent);
        }
        link_into_parent(&mut state, &path);
        state.entries.insert(path, MockEntry::File(content.into()));
    }

    pub fn add_dir(&self, path: impl AsRef<Path>) {
        let mut state = self.state.lock().unwrap();
        ensure_dir(&mut state, path.as_ref());
    }

    /// Set the creation time as seconds after the Unix epoch.
    pub fn set_created(&self, path: impl AsRef<Path>, secs: u64) {
        let mut state = self.state.lock().unwrap();
        state.created.insert(
            path.as_ref().to_path_buf(),
            SystemTime::UNIX_EPOCH + Duration::from_secs(secs),
        );
    }
}

fn ensure_dir(state: &mut MockState, path: &Path) {
    if path.as_os_str().is_empty() || state.entries.contains_key(path) {
        return;
    }
    if let Some(parent) = path.parent() {
        ensure_dir(state, parent);
    }
    link_into_parent(state, path);
    state
        .entries
        .insert(path.to_path_buf(), MockEntry::Dir(Vec::new()));
}

fn link_into_parent(state: &mut MockState, path: &Path) {
    let (Some(parent), Some(name)) = (path.parent(), path.file_name().and_then(|n| n.to_str()))
    else {
        return;
    };
    if let Some(MockEntry::Dir(children)) = state.entries.get_mut(parent) {
        if !children.iter().any(|c| c == name) {
            children.push(name.to_string());
        }
    }
}

impl FileSystem for MockFileSystem {
    fn read_to_string(&self, path: &Path) -> Result<String> {
        let state = self.state.lock().unwrap();
        match state.entries.get(path) {
            Some(MockEntry::File(content)) => {
                String::from_utf8(content.clone()).map_err(|e| anyhow!("Invalid UTF-8: {}", e))
            }
            Some(MockEntry::Dir(_)) => Err(anyhow!("Is a directory: {:?}", path)),
            None => Err(anyhow!("File not found: {:?}", path)),
        }
    }

    fn is_file(&self, path: &Path) -> bool {
        let state = self.state.lock().unwrap();
        matches!(state.entries.get(path), Some(MockEntry::File(_)))
    }

    fn is_dir(&self, path: &Path) -> bool {
        let state = self.state.lock().unwrap();
        matches!(state.entries.get(path), Some(MockEntry::Dir(_)))
    }

    fn read_dir(&self, path: &Path) -> Result<Vec<PathBuf>> {
        let state = self.state.lock().unwrap();
        match state.entries.get(path) {
            Some(MockEntry::Dir(children)) => {
                Ok(children.iter().map(|name| path.join(name)).collect())
            }
            _ => Err(anyhow!("Not a directory or not found: {:?}", path)),
        }
    }

    fn created(&self, path: &Path) -> Result<SystemTime> {
        let state = self.state.lock().unwrap();
        if !state.entries.contains_key(path) {
            return Err(anyhow!("File not found: {:?}", path));
        }
        Ok(state
            .created
            .get(path)
            .copied()
            .unwrap_or(SystemTime::UNIX_EPOCH))
    }

    fn remove_dir_all(&self, path: &Path) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if !matches!(state.entries.get(path), Some(MockEntry::Dir(_))) {
            return Err(anyhow!("Not a directory or not found: {:?}", path));
        }

        state.entries.retain(|p, _| !p.starts_with(path));
        state.created.retain(|p, _| !p.starts_with(path));

        if let (Some(parent), Some(name)) = (path.parent(), path.file_name()) {
            if let Some(MockEntry::Dir(children)) = state.entries.get_mut(parent) {
                children.retain(|c| c.as_str() != name);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn files_create_parent_directories() {
        let fs = MockFileSystem::new();
        fs.add_file("/runs/r1/run.json", "{}");

        assert!(fs.is_dir(Path::new("/runs")));
        assert!(fs.is_dir(Path::new("/runs/r1")));
        assert_eq!(
            fs.read_dir(Path::new("/runs")).unwrap(),
            vec![PathBuf::from("/runs/r1")]
        );
    }

    #[test]
    fn remove_dir_all_drops_subtree_only() {
        let fs = MockFileSystem::new();
        fs.add_file("/runs/r1/html/index.html", "<html/>");
        fs.add_dir("/runs/r2");

        fs.remove_dir_all(Path::new("/runs/r1")).unwrap();

        assert!(!fs.is_file(Path::new("/runs/r1/html/index.html")));
        assert!(fs.is_dir(Path::new("/runs/r2")));
        assert_eq!(
            fs.read_dir(Path::new("/runs")).unwrap(),
            vec![PathBuf::from("/runs/r2")]
        );
    }
}
