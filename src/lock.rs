use crate::error::{Result, TransferError};
use crate::transport::Transport;
use fs2::FileExt;
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

const SENTINEL_NAME: &str = ".do-not-touch";

/// Mutual exclusion between this process and any other uploader touching the
/// same item, enforced on both endpoints. Holding a `TwinLock` keeps the
/// local sentinel file locked (and therefore present) for the guard's
/// lifetime; dropping the guard releases both sides, regardless of the path
/// that led there.
pub struct TwinLock {
    local_file: File,
    local_sentinel: PathBuf,
    remote_dir: String,
    released: bool,
}

impl TwinLock {
    /// Acquire the lock for `local_dir`/`remote_dir`. If the remote `touch`
    /// fails, the local lock and sentinel are torn down before the error is
    /// propagated, so a failed acquire never leaves debris.
    pub fn acquire(local_dir: &Path, remote_dir: &str, transport: &dyn Transport) -> Result<Self> {
        let local_sentinel = local_dir.join(SENTINEL_NAME);
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .open(&local_sentinel)
            .map_err(|e| TransferError::io(&local_sentinel, e))?;

        file.try_lock_exclusive().map_err(|_| TransferError::AlreadyRunning(local_sentinel.clone()))?;

        let touch_command = format!("touch {remote_dir}/{SENTINEL_NAME}");
        if let Err(e) = transport.run(&touch_command) {
            let _ = FileExt::unlock(&file);
            let _ = fs::remove_file(&local_sentinel);
            return Err(TransferError::Transport(e.to_string()));
        }

        Ok(TwinLock {
            local_file: file,
            local_sentinel,
            remote_dir: remote_dir.to_string(),
            released: false,
        })
    }

    /// Remove the remote sentinel, release the local advisory lock, and
    /// remove the local sentinel file. Safe to call more than once; only the
    /// first call does anything.
    pub fn release(&mut self, transport: &dyn Transport) {
        if self.released {
            return;
        }
        self.released = true;

        let rm_command = format!("rm -f {}/{SENTINEL_NAME}", self.remote_dir);
        let _ = transport.run(&rm_command);
        let _ = FileExt::unlock(&self.local_file);
        let _ = fs::remove_file(&self.local_sentinel);
    }
}

impl Drop for TwinLock {
    fn drop(&mut self) {
        if !self.released {
            let _ = FileExt::unlock(&self.local_file);
            let _ = fs::remove_file(&self.local_sentinel);
        }
    }
}

/// Recursively scan `source_root` for any `.do-not-touch` sentinel whose OS
/// advisory lock is currently held by another process. Stale, unlocked
/// sentinels are debris from a crashed run and do not block.
pub fn pre_run_check(source_root: &Path) -> Result<()> {
    for entry in WalkDir::new(source_root) {
        let entry = entry.map_err(|e| {
            TransferError::io(e.path().unwrap_or(source_root).to_path_buf(), std::io::Error::other(e.to_string()))
        })?;
        if entry.file_name() != SENTINEL_NAME {
            continue;
        }

        let file = match File::open(entry.path()) {
            Ok(f) => f,
            Err(_) => continue,
        };
        match file.try_lock_exclusive() {
            Ok(()) => {
                let _ = FileExt::unlock(&file);
            }
            Err(_) => {
                return Err(TransferError::AlreadyRunning(entry.path().to_path_buf()));
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::CommandOutput;
    use tempfile::TempDir;

    struct FakeTransport {
        fail_touch: bool,
    }

    impl Transport for FakeTransport {
        fn run(&self, command: &str) -> std::result::Result<CommandOutput, crate::transport::TransportError> {
            if self.fail_touch && command.starts_with("touch") {
                return Err(crate::transport::TransportError::Connect("refused".to_string()));
            }
            Ok(CommandOutput { stdout: String::new(), stderr: String::new(), exit_code: 0 })
        }
        fn put(&self, _local: &Path, _remote: &str) -> std::result::Result<(), crate::transport::TransportError> {
            Ok(())
        }
    }

    #[test]
    fn test_acquire_and_release_cleans_up_sentinel() {
        let dir = TempDir::new().unwrap();
        let transport = FakeTransport { fail_touch: false };
        let mut lock = TwinLock::acquire(dir.path(), "/srv/dst", &transport).unwrap();
        assert!(dir.path().join(SENTINEL_NAME).exists());
        lock.release(&transport);
        assert!(!dir.path().join(SENTINEL_NAME).exists());
    }

    #[test]
    fn test_acquire_fails_cleanly_when_remote_touch_fails() {
        let dir = TempDir::new().unwrap();
        let transport = FakeTransport { fail_touch: true };
        let result = TwinLock::acquire(dir.path(), "/srv/dst", &transport);
        assert!(result.is_err());
        assert!(!dir.path().join(SENTINEL_NAME).exists());
    }

    #[test]
    fn test_pre_run_check_passes_with_no_sentinels() {
        let dir = TempDir::new().unwrap();
        assert!(pre_run_check(dir.path()).is_ok());
    }

    #[test]
    fn test_pre_run_check_ignores_stale_unlocked_sentinel() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join(SENTINEL_NAME), b"").unwrap();
        assert!(pre_run_check(dir.path()).is_ok());
    }

    #[test]
    fn test_pre_run_check_fails_on_live_lock() {
        let dir = TempDir::new().unwrap();
        let transport = FakeTransport { fail_touch: false };
        let _lock = TwinLock::acquire(dir.path(), "/srv/dst", &transport).unwrap();
        assert!(pre_run_check(dir.path()).is_err());
    }
}
