//! Artifact store: path allocation and best-effort cleanup.
//!
//! The working directory is scratch space, not state. Allocation hands out
//! collision-proof paths without checking the disk; release sweeps every
//! tracked extension for a base name and swallows failures. Orphans left by
//! a crash mid-pipeline are acceptable — there is no journal and no
//! recovery, only housekeeping.

use std::path::{Path, PathBuf};

use uuid::Uuid;

use crate::language::TRACKED_EXTENSIONS;

/// Allocates and releases transient artifact paths inside one working
/// directory. Cheap to clone; every request/session gets its own handle.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    work_dir: PathBuf,
}

impl ArtifactStore {
    /// Create a store over an existing working directory. The directory is
    /// created at server startup, not here.
    pub fn new(work_dir: impl Into<PathBuf>) -> Self {
        Self {
            work_dir: work_dir.into(),
        }
    }

    /// The directory all artifacts live in.
    pub fn work_dir(&self) -> &Path {
        &self.work_dir
    }

    /// Allocate a fresh path with the given extension.
    ///
    /// Base names combine a millisecond timestamp with a random token:
    /// sortable for operators, collision-proof for concurrent requests.
    /// Nothing is written and no existence check is made.
    pub fn allocate(&self, extension: &str) -> PathBuf {
        let base = format!(
            "{}-{}",
            chrono::Utc::now().timestamp_millis(),
            Uuid::new_v4().simple()
        );
        self.work_dir.join(format!("{base}.{extension}"))
    }

    /// Delete every tracked-extension sibling of `path`'s base name, except
    /// extensions listed in `keep`.
    ///
    /// Best-effort and fire-and-forget: missing files are skipped, any other
    /// failure is logged at warn level and never propagated. Cleanup must
    /// never block or fail a response.
    pub async fn release(&self, path: &Path, keep: &[&str]) {
        for ext in TRACKED_EXTENSIONS {
            if keep.contains(ext) {
                continue;
            }
            let candidate = path.with_extension(ext);
            match tokio::fs::remove_file(&candidate).await {
                Ok(()) => log::debug!("removed artifact {}", candidate.display()),
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
                Err(err) => {
                    log::warn!("failed to remove artifact {}: {}", candidate.display(), err)
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch_store() -> (tempfile::TempDir, ArtifactStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(dir.path());
        (dir, store)
    }

    #[test]
    fn allocate_stays_inside_the_working_directory() {
        let (dir, store) = scratch_store();
        let path = store.allocate("py");
        assert_eq!(path.parent().unwrap(), dir.path());
        assert_eq!(path.extension().unwrap(), "py");
    }

    #[test]
    fn allocate_never_collides() {
        let (_dir, store) = scratch_store();
        let a = store.allocate("c");
        let b = store.allocate("c");
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn release_sweeps_all_tracked_extensions() {
        let (dir, store) = scratch_store();
        let source = store.allocate("c");
        tokio::fs::write(&source, "int main(void) {}").await.unwrap();
        tokio::fs::write(source.with_extension("exe"), b"\x7fELF")
            .await
            .unwrap();

        store.release(&source, &[]).await;

        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn release_honors_the_keep_list() {
        let (_dir, store) = scratch_store();
        let source = store.allocate("ts");
        tokio::fs::write(&source, "console.log(1)").await.unwrap();
        tokio::fs::write(source.with_extension("js"), "console.log(1)")
            .await
            .unwrap();

        store.release(&source, &["js"]).await;

        assert!(!source.exists());
        assert!(source.with_extension("js").exists());
    }

    #[tokio::test]
    async fn release_of_a_missing_base_name_is_a_no_op() {
        let (_dir, store) = scratch_store();
        let never_written = store.allocate("py");
        // Must not panic or error.
        store.release(&never_written, &[]).await;
    }
}
