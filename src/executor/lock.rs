//! Exclusive per-target build lock.

use anyhow::{Context, Result};
use fs2::FileExt;
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};

pub fn lock_path(lock_dir: &Path, target: &str) -> PathBuf {
    lock_dir.join(format!(".cheri-crossbuild-{target}.lock"))
}

/// Held for the duration of a build; released on drop.
#[derive(Debug)]
pub struct BuildLock {
    _file: File,
    path: PathBuf,
}

impl BuildLock {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Lock `target` so a second process cannot build it concurrently.
pub fn acquire(lock_dir: &Path, target: &str) -> Result<BuildLock> {
    fs::create_dir_all(lock_dir)
        .with_context(|| format!("creating lock directory {}", lock_dir.display()))?;
    let path = lock_path(lock_dir, target);

    // Never unlink a lock file: a second process could then lock a fresh
    // file at the same path while the first still holds the old one.
    let file = OpenOptions::new()
        .create(true)
        .read(true)
        .write(true)
        .truncate(false)
        .open(&path)
        .with_context(|| format!("Failed to create lock file: {}", path.display()))?;

    if file.try_lock_exclusive().is_err() {
        drop(file);
        return Err(anyhow::anyhow!(
            "{} is locked by another build: {}",
            target,
            path.display()
        ));
    }

    Ok(BuildLock { _file: file, path })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_lock_fails_until_released() {
        let temp = tempfile::tempdir().unwrap();
        let build_root = temp.path().join("build");

        let first = acquire(&build_root, "bbl-baremetal-riscv64").unwrap();
        assert_eq!(
            first.path(),
            build_root.join(".cheri-crossbuild-bbl-baremetal-riscv64.lock")
        );
        assert!(first.path().exists());

        let err = acquire(&build_root, "bbl-baremetal-riscv64")
            .unwrap_err()
            .to_string();
        assert!(err.contains("bbl-baremetal-riscv64 is locked by another build"));

        drop(first);
        assert!(acquire(&build_root, "bbl-baremetal-riscv64").is_ok());
    }

    #[test]
    fn test_targets_lock_independently() {
        let temp = tempfile::tempdir().unwrap();
        let _bbl = acquire(temp.path(), "bbl-baremetal-riscv64").unwrap();
        assert!(acquire(temp.path(), "elftoolchain").is_ok());
    }
}
