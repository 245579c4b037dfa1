//! Build lock.
//!
//! An advisory exclusive lock on the state directory prevents two builds of
//! the same project from interleaving signature writes.

use anyhow::{Context as _, Result};
use fs2::FileExt;
use std::fs::{File, OpenOptions};

use crate::path::Fpath;

/// Acquire the exclusive build lock. Returns a guard releasing the lock
/// when dropped.
pub fn acquire_build_lock(state_dir: &Fpath) -> Result<BuildLock> {
    std::fs::create_dir_all(state_dir.as_std())
        .with_context(|| format!("cannot create state directory {}", state_dir))?;
    let lock_path = state_dir.join("lock");

    // Do not delete the lock file on contention; another process may
    // legitimately hold it. Stale files are harmless, locks die with their
    // holder.
    let lock_file = OpenOptions::new()
        .create(true)
        .read(true)
        .write(true)
        .truncate(false)
        .open(lock_path.as_std())
        .with_context(|| format!("cannot open lock file {}", lock_path))?;

    if let Err(e) = lock_file.try_lock_exclusive() {
        anyhow::bail!(
            "another build is already running in this project (lock: '{}'): {}",
            lock_path,
            e
        );
    }
    Ok(BuildLock { _file: lock_file })
}

/// RAII guard; dropping it releases the advisory lock.
#[derive(Debug)]
pub struct BuildLock {
    _file: File,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lock_acquired_and_released() {
        let dir = tempfile::tempdir().unwrap();
        let state = Fpath::from(dir.path().join(".mason"));
        {
            let _lock = acquire_build_lock(&state).unwrap();
            assert!(state.join("lock").exists());
        }
        // released on drop, a second acquisition succeeds
        assert!(acquire_build_lock(&state).is_ok());
    }

    #[test]
    fn test_concurrent_lock_refused() {
        let dir = tempfile::tempdir().unwrap();
        let state = Fpath::from(dir.path().join(".mason"));
        let _held = acquire_build_lock(&state).unwrap();
        let second = acquire_build_lock(&state);
        assert!(second.is_err());
        assert!(
            second
                .unwrap_err()
                .to_string()
                .contains("already running")
        );
    }
}
