//! Filesystem-backed resource provider.

use std::collections::HashSet;
use std::fs;
use std::path::Path;
use std::sync::Mutex;

use ruleguard_engine::ResourceProvider;
use tracing::debug;

/// Resources are files keyed by their path; text is read fresh on every
/// request so the engine always sees what is on disk.
#[derive(Default)]
pub struct FsResources {
    tracked: Mutex<HashSet<String>>,
}

impl FsResources {
    pub fn track(&self, key: &str) -> bool {
        self.tracked
            .lock()
            .expect("resources lock poisoned")
            .insert(key.to_string())
    }

    pub fn untrack(&self, key: &str) -> bool {
        self.tracked
            .lock()
            .expect("resources lock poisoned")
            .remove(key)
    }

    pub fn len(&self) -> usize {
        self.tracked.lock().expect("resources lock poisoned").len()
    }
}

impl ResourceProvider for FsResources {
    fn text(&self, key: &str) -> Option<String> {
        if !self.is_tracked(key) {
            return None;
        }
        match fs::read_to_string(Path::new(key)) {
            Ok(text) => Some(text),
            Err(e) => {
                debug!(key = %key, error = %e, "resource unreadable");
                None
            }
        }
    }

    fn is_tracked(&self, key: &str) -> bool {
        self.tracked
            .lock()
            .expect("resources lock poisoned")
            .contains(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn reads_only_tracked_files() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a.rs");
        fs::write(&path, "fn main() {}").unwrap();
        let key = path.to_string_lossy().to_string();

        let resources = FsResources::default();
        assert_eq!(resources.text(&key), None);

        assert!(resources.track(&key));
        assert!(!resources.track(&key));
        assert_eq!(resources.text(&key).as_deref(), Some("fn main() {}"));

        fs::write(&path, "changed").unwrap();
        assert_eq!(resources.text(&key).as_deref(), Some("changed"));

        assert!(resources.untrack(&key));
        assert!(!resources.is_tracked(&key));
        assert_eq!(resources.len(), 0);
    }

    #[test]
    fn deleted_file_is_unavailable() {
        let dir = TempDir::new().unwrap();
        let key = dir.path().join("gone.rs").to_string_lossy().to_string();

        let resources = FsResources::default();
        resources.track(&key);
        assert_eq!(resources.text(&key), None);
        assert!(resources.is_tracked(&key));
    }
}
