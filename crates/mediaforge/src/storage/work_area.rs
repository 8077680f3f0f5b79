use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use log::{debug, info, warn};
use tempfile::TempDir;
use walkdir::WalkDir;

use crate::error::StorageError;

const JOB_DIR_PREFIX: &str = "job_";

/// Scratch space for downloads, partitioned into one directory per job
/// attempt so concurrent jobs never share file names.
#[derive(Debug, Clone)]
pub struct WorkArea {
    root: PathBuf,
}

impl WorkArea {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn ensure(&self) -> Result<(), StorageError> {
        std::fs::create_dir_all(&self.root).map_err(|e| StorageError::CreateDirectory {
            path: self.root.clone(),
            source: e,
        })
    }

    /// Creates `job_{id}_{attempt}_*` under the root. The directory and
    /// everything in it is removed when the returned guard drops.
    pub fn job_scope(&self, job_id: &str, attempt: u32) -> Result<TempDir, StorageError> {
        self.ensure()?;
        tempfile::Builder::new()
            .prefix(&format!("{}{}_{}_", JOB_DIR_PREFIX, job_id, attempt))
            .tempdir_in(&self.root)
            .map_err(|e| StorageError::CreateDirectory {
                path: self.root.clone(),
                source: e,
            })
    }

    /// Best-effort removal of every scratch directory a job ever owned.
    /// Failures are logged and skipped. Returns how many were removed.
    pub fn remove_job_dirs(&self, job_id: &str) -> usize {
        let prefix = format!("{}{}_", JOB_DIR_PREFIX, job_id);
        self.remove_matching(|name, _| name.starts_with(&prefix))
    }

    /// Removes job scratch directories whose last modification is older
    /// than `max_age`. These are leftovers from processes that died before
    /// their guards ran.
    pub fn sweep_stale(&self, max_age: Duration, now: SystemTime) -> usize {
        let removed = self.remove_matching(|name, modified| {
            name.starts_with(JOB_DIR_PREFIX)
                && modified
                    .and_then(|m| now.duration_since(m).ok())
                    .is_some_and(|age| age > max_age)
        });
        if removed > 0 {
            info!(
                "Swept {} stale job directories from {}",
                removed,
                self.root.display()
            );
        }
        removed
    }

    fn remove_matching<F>(&self, predicate: F) -> usize
    where
        F: Fn(&str, Option<SystemTime>) -> bool,
    {
        if !self.root.exists() {
            return 0;
        }

        let mut removed = 0;
        for entry in WalkDir::new(&self.root)
            .min_depth(1)
            .max_depth(1)
            .into_iter()
            .filter_map(|e| e.ok())
        {
            if !entry.file_type().is_dir() {
                continue;
            }
            let name = entry.file_name().to_string_lossy();
            let modified = entry.metadata().ok().and_then(|m| m.modified().ok());
            if !predicate(&name, modified) {
                continue;
            }

            match std::fs::remove_dir_all(entry.path()) {
                Ok(()) => {
                    debug!("Removed scratch directory {}", entry.path().display());
                    removed += 1;
                }
                Err(e) => {
                    let err = StorageError::RemoveDirectory {
                        path: entry.path().to_path_buf(),
                        source: e,
                    };
                    warn!("{}", err);
                }
            }
        }
        removed
    }
}
