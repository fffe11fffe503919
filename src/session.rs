use crate::error::{Result, TransferError};
use crate::inventory;
use crate::item;
use crate::lock;
use crate::model::{Args, CallbackSurface, ItemKind};
use crate::transfer::{TransferEngine, TransferOutcome};
use crate::transport::Transport;
use chrono::Utc;
use std::path::Path;

/// Top-level driver: lists eligible items and dispatches each one to the
/// transfer engine in sorted order, stopping early on abort.
pub struct UploadSession<'a> {
    source: &'a Path,
    destination: String,
    kind: ItemKind,
    max_depth: Option<usize>,
    transport: &'a dyn Transport,
    callbacks: &'a CallbackSurface,
}

impl<'a> UploadSession<'a> {
    /// Verifies the destination root itself exists remotely before any
    /// item-level work, so a typo'd `--destination` fails fast with a
    /// configuration error instead of surfacing as per-item mkdir failures.
    ///
    /// Reuses the same canonical `find`-based command [`inventory::screen_remote`]
    /// issues rather than a bespoke `test -d`: if `$destination` doesn't exist,
    /// the command's `cd` fails, no sentinel is produced, and `screen_remote`
    /// surfaces that as an error, which we interpret as a missing destination.
    /// A genuine transport failure (connection lost, etc.) still propagates
    /// as-is so it aborts the session per its own kind rather than being
    /// reported as a configuration problem.
    pub fn new(args: &'a Args, transport: &'a dyn Transport, callbacks: &'a CallbackSurface) -> Result<Self> {
        let destination = args.destination.to_string_lossy().trim_end_matches('/').to_string();
        if let Err(e) = inventory::screen_remote(&destination, transport, Some(0)) {
            return match e {
                TransferError::Transport(_) => Err(e),
                other => Err(TransferError::Config(format!(
                    "destination root does not exist on the remote host: {destination} ({other})"
                ))),
            };
        }

        Ok(UploadSession {
            source: &args.source,
            destination,
            kind: args.kind,
            max_depth: args.max_depth,
            transport,
            callbacks,
        })
    }

    pub fn run(&self, remove_after_upload: bool) -> Result<()> {
        lock::pre_run_check(self.source)?;

        let now = Utc::now();
        let max_date = crate::date::max_date(now);
        let items = item::list(self.source, self.kind, &self.callbacks.dated_regex, max_date)?;

        self.callbacks
            .log_info(&format!("discovered {} eligible item(s): {}", items.len(), items.join(", ")));

        let engine = TransferEngine::new(self.transport, self.callbacks, self.max_depth, remove_after_upload);

        for item_name in &items {
            if self.callbacks.should_abort() {
                self.callbacks.log_info("abort requested, stopping before next item");
                break;
            }

            let outcome = match self.kind {
                ItemKind::Directories => {
                    engine.transfer_directory_item(self.source, &self.destination, item_name)?
                }
                ItemKind::Files => engine.transfer_file_item(self.source, &self.destination, item_name)?,
            };

            self.callbacks.log_info(&format!("item {item_name}: {}", describe(outcome)));

            if outcome == TransferOutcome::Aborted {
                break;
            }
        }

        Ok(())
    }
}

fn describe(outcome: TransferOutcome) -> &'static str {
    match outcome {
        TransferOutcome::Successful => "successful",
        TransferOutcome::Failed => "failed",
        TransferOutcome::Aborted => "aborted",
        TransferOutcome::NoFilesFound => "no_files_found",
    }
}
