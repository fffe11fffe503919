use crate::diff;
use crate::error::{Result, TransferError};
use crate::inventory::{self, Directory, File};
use crate::lock::TwinLock;
use crate::model::CallbackSurface;
use crate::transport::Transport;
use std::collections::BTreeSet;
use std::fs;
use std::path::Path;
use std::time::{Duration, Instant};

const PROGRESS_LOG_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferOutcome {
    Successful,
    Failed,
    Aborted,
    NoFilesFound,
}

/// Upload one date-stamped item end to end: screen, diff, lock, upload,
/// re-verify, release, and (conditionally) delete the local copy. An "item"
/// is either a date-named subdirectory (`kind=directories`) or a single
/// date-named file at the source root (`kind=files`); both shapes share the
/// lock/upload/verify core and differ only in how they're screened.
pub struct TransferEngine<'a> {
    transport: &'a dyn Transport,
    callbacks: &'a CallbackSurface,
    max_depth: Option<usize>,
    remove_after_upload: bool,
}

impl<'a> TransferEngine<'a> {
    pub fn new(
        transport: &'a dyn Transport,
        callbacks: &'a CallbackSurface,
        max_depth: Option<usize>,
        remove_after_upload: bool,
    ) -> Self {
        TransferEngine { transport, callbacks, max_depth, remove_after_upload }
    }

    /// Directory-item algorithm: `item` is a subdirectory of `src_root`,
    /// mirrored at `<dst_root>/<item>`.
    ///
    /// `TransportError`/`AlreadyRunningError` propagate to abort the whole
    /// session; every other per-item error (remote command, verification,
    /// local i/o) is captured here and reported as a `Failed` outcome so the
    /// session can continue with the next item.
    pub fn transfer_directory_item(&self, src_root: &Path, dst_root: &str, item: &str) -> Result<TransferOutcome> {
        let src_dir = src_root.join(item);
        let dst_dir = format!("{dst_root}/{item}");

        let ensure_remote = |engine: &Self| -> Result<()> {
            engine
                .transport
                .run(&format!("mkdir -p {dst_dir}"))
                .map_err(|e| TransferError::Transport(e.to_string()))?;
            Ok(())
        };
        let screen_local = |engine: &Self| -> Result<Directory> {
            inventory::screen_local(&src_dir, engine.max_depth)
        };
        let screen_remote = |engine: &Self| -> Result<Directory> {
            inventory::screen_remote(&dst_dir, engine.transport, engine.max_depth)
        };

        self.dispatch(self.run(&src_dir, &dst_dir, item, ensure_remote, screen_local, screen_remote), item)
    }

    /// File-item algorithm: `item` is a single date-named file directly
    /// under `src_root`, mirrored at `<dst_root>/<item>`. Structurally
    /// identical to the directory algorithm minus the subdirectory
    /// pre-creation step, since a lone file has no nested prefixes.
    pub fn transfer_file_item(&self, src_root: &Path, dst_root: &str, item: &str) -> Result<TransferOutcome> {
        let dst_dir = dst_root.to_string();

        // The destination root itself is verified to exist once, at session
        // startup; a lone file item has no nested subdirectory to create.
        let ensure_remote = |_engine: &Self| -> Result<()> { Ok(()) };
        let screen_local = |_engine: &Self| -> Result<Directory> { inventory::single_file_local(src_root, item) };
        let screen_remote =
            |engine: &Self| -> Result<Directory> { inventory::single_file_remote(&dst_dir, item, engine.transport) };

        self.dispatch(self.run(src_root, dst_root, item, ensure_remote, screen_local, screen_remote), item)
    }

    fn dispatch(&self, result: Result<TransferOutcome>, item: &str) -> Result<TransferOutcome> {
        match result {
            Ok(outcome) => Ok(outcome),
            Err(e @ (TransferError::Transport(_) | TransferError::AlreadyRunning(_))) => Err(e),
            Err(e) => {
                self.callbacks.log_error(&format!("item {item} failed: {e}"));
                Ok(TransferOutcome::Failed)
            }
        }
    }

    fn run(
        &self,
        src_dir: &Path,
        dst_dir: &str,
        item: &str,
        ensure_remote: impl Fn(&Self) -> Result<()>,
        screen_local: impl Fn(&Self) -> Result<Directory>,
        screen_remote: impl Fn(&Self) -> Result<Directory>,
    ) -> Result<TransferOutcome> {
        let local = screen_local(self)?;
        ensure_remote(self)?;

        if local.is_empty() {
            self.apply_removal_policy(src_dir, item, TransferOutcome::NoFilesFound);
            return Ok(TransferOutcome::NoFilesFound);
        }

        let remote = screen_remote(self)?;
        let (_in_sync, missing_remote) = diff::diff(&local, &remote);
        if missing_remote.is_empty() {
            self.callbacks.log_info(&format!("item {item}: already fully synced"));
            self.apply_removal_policy(src_dir, item, TransferOutcome::Successful);
            return Ok(TransferOutcome::Successful);
        }

        let mut missing: Vec<File> = missing_remote.into_iter().collect();
        missing.sort_by(|a, b| a.relative_path.cmp(&b.relative_path));

        self.precreate_subdirectories(dst_dir, &missing)?;

        let mut lock = TwinLock::acquire(src_dir, dst_dir, self.transport)?;

        let total = missing.len();
        let mut uploaded = 0usize;
        let mut last_log = Instant::now() - PROGRESS_LOG_INTERVAL;
        let mut aborted = false;

        for file in &missing {
            let local_path = src_dir.join(&file.relative_path);
            let remote_path = format!("{dst_dir}/{}", file.relative_path);
            if let Err(e) = self.transport.put(&local_path, &remote_path) {
                lock.release(self.transport);
                return Err(TransferError::Transport(e.to_string()));
            }
            uploaded += 1;

            let is_last = uploaded == total;
            if is_last || last_log.elapsed() >= PROGRESS_LOG_INTERVAL {
                let pct = (uploaded as f64 / total as f64) * 100.0;
                self.callbacks
                    .log_info(&format!("{pct:.1} % ({uploaded}/{total}) uploaded"));
                last_log = Instant::now();
            }

            if !is_last && self.callbacks.should_abort() {
                aborted = true;
                break;
            }
        }

        if aborted {
            lock.release(self.transport);
            return Ok(TransferOutcome::Aborted);
        }

        let remote_after = screen_remote(self)?;
        let (_, still_missing) = diff::diff(&local, &remote_after);
        if !still_missing.is_empty() {
            lock.release(self.transport);
            let offenders: Vec<String> = still_missing.iter().map(|f| f.relative_path.clone()).collect();
            return Err(TransferError::Verification {
                item: item.to_string(),
                detail: format!("still missing after upload: {}", offenders.join(", ")),
            });
        }

        lock.release(self.transport);
        self.apply_removal_policy(src_dir, item, TransferOutcome::Successful);
        Ok(TransferOutcome::Successful)
    }

    fn precreate_subdirectories(&self, dst_dir: &str, missing: &[File]) -> Result<()> {
        let mut prefixes: BTreeSet<String> = BTreeSet::new();
        for file in missing {
            if let Some((dir, _)) = file.relative_path.rsplit_once('/') {
                prefixes.insert(format!("{dst_dir}/{dir}"));
            }
        }
        if prefixes.is_empty() {
            return Ok(());
        }

        let joined = prefixes.into_iter().collect::<Vec<_>>().join(" ");
        self.transport
            .run(&format!("mkdir -p {joined}"))
            .map_err(|e| TransferError::Transport(e.to_string()))?;
        Ok(())
    }

    /// Never deletes remote artifacts; only removes the local source when
    /// `remove_after_upload` is set and the upload is either fully verified
    /// or turned out to have nothing to send.
    fn apply_removal_policy(&self, src_dir: &Path, item: &str, outcome: TransferOutcome) {
        if !self.remove_after_upload {
            return;
        }
        if !matches!(outcome, TransferOutcome::Successful | TransferOutcome::NoFilesFound) {
            return;
        }
        let remove_result = if src_dir.is_dir() {
            fs::remove_dir_all(src_dir)
        } else {
            fs::remove_file(src_dir)
        };
        if let Err(e) = remove_result {
            self.callbacks
                .log_error(&format!("could not remove local source for {item} after upload: {e}"));
        }
    }
}
