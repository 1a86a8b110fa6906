//! Application descriptor watching.
//!
//! Polls the application-configuration directory for YAML descriptors and
//! reports files that appeared or changed since the previous poll. A
//! malformed descriptor is skipped with a diagnostic; it never fails the
//! poll.

use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::collaborators::{WatchError, Watcher};
use crate::types::AppDescriptor;

/// Directory-polling watcher over YAML application descriptors.
pub struct DirWatcher {
    dir: PathBuf,
    seen: Mutex<HashMap<PathBuf, SystemTime>>,
}

impl DirWatcher {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            seen: Mutex::new(HashMap::new()),
        }
    }

    fn is_descriptor(path: &Path) -> bool {
        matches!(
            path.extension().and_then(|ext| ext.to_str()),
            Some("yaml") | Some("yml")
        )
    }
}

#[async_trait]
impl Watcher for DirWatcher {
    async fn poll_changes(&self) -> Result<Vec<AppDescriptor>, WatchError> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!(dir = %self.dir.display(), "configuration directory absent");
                return Ok(Vec::new());
            }
            Err(source) => {
                return Err(WatchError::Io {
                    path: self.dir.display().to_string(),
                    source,
                })
            }
        };

        let mut seen = self.seen.lock().await;
        let mut changed = Vec::new();

        for entry in entries.flatten() {
            let path = entry.path();
            if !Self::is_descriptor(&path) {
                continue;
            }

            let modified = match entry.metadata().and_then(|m| m.modified()) {
                Ok(modified) => modified,
                Err(e) => {
                    warn!(file = %path.display(), error = %e, "unreadable descriptor metadata");
                    continue;
                }
            };

            if seen.get(&path) == Some(&modified) {
                continue;
            }

            let contents = match fs::read_to_string(&path) {
                Ok(contents) => contents,
                Err(e) => {
                    warn!(file = %path.display(), error = %e, "unreadable descriptor");
                    continue;
                }
            };

            match serde_yaml::from_str::<AppDescriptor>(&contents) {
                Ok(descriptor) => {
                    debug!(file = %path.display(), app = %descriptor.name, "descriptor loaded");
                    changed.push(descriptor);
                    seen.insert(path, modified);
                }
                Err(e) => {
                    warn!(file = %path.display(), error = %e, "skipping malformed descriptor");
                    // Remember the mtime anyway so a broken file is reported once,
                    // not on every poll.
                    seen.insert(path, modified);
                }
            }
        }

        Ok(changed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_descriptor(dir: &Path, file: &str, contents: &str) -> PathBuf {
        let path = dir.join(file);
        fs::write(&path, contents).unwrap();
        path
    }

    #[tokio::test]
    async fn test_reports_new_descriptors_once() {
        let dir = tempfile::tempdir().unwrap();
        write_descriptor(
            dir.path(),
            "hello.yaml",
            "name: hello\nexecution_type: rpm\ncommand: [hello-world]\n",
        );

        let watcher = DirWatcher::new(dir.path());

        let first = watcher.poll_changes().await.unwrap();
        assert_eq!(first.len(), 1);
        assert_eq!(first[0].name, "hello");
        assert_eq!(first[0].command, vec!["hello-world"]);

        let second = watcher.poll_changes().await.unwrap();
        assert!(second.is_empty());
    }

    #[tokio::test]
    async fn test_skips_malformed_and_non_yaml_files() {
        let dir = tempfile::tempdir().unwrap();
        write_descriptor(dir.path(), "broken.yaml", "not: [valid: descriptor");
        write_descriptor(dir.path(), "notes.txt", "name: ignored\n");
        write_descriptor(
            dir.path(),
            "good.yml",
            "name: good\nexecution_type: rpm\n",
        );

        let watcher = DirWatcher::new(dir.path());

        let changed = watcher.poll_changes().await.unwrap();
        assert_eq!(changed.len(), 1);
        assert_eq!(changed[0].name, "good");
        assert!(changed[0].command.is_empty());
    }

    #[tokio::test]
    async fn test_missing_directory_is_empty_not_error() {
        let watcher = DirWatcher::new("/nonexistent/edged/apps");
        assert!(watcher.poll_changes().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_malformed_descriptor_reported_once() {
        let dir = tempfile::tempdir().unwrap();
        write_descriptor(dir.path(), "broken.yaml", "not: [valid: descriptor");

        let watcher = DirWatcher::new(dir.path());
        assert!(watcher.poll_changes().await.unwrap().is_empty());
        assert!(watcher.poll_changes().await.unwrap().is_empty());
    }
}
