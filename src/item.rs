use crate::date::{self, DateSpec, ParseOutcome};
use crate::error::{Result, TransferError};
use crate::model::ItemKind;
use chrono::NaiveDate;
use std::fs;
use std::path::Path;

/// List the direct children of `root` that are eligible items: the right
/// [`ItemKind`] shape, not a symlink, with a name that parses as a date no
/// later than `max_date`. Returned names are sorted ascending.
///
/// Any name whose match is ambiguous aborts the whole listing with an
/// [`TransferError::AmbiguousDate`] naming every offending entry, rather than
/// silently skipping them.
pub fn list(root: &Path, kind: ItemKind, spec: &DateSpec, max_date: NaiveDate) -> Result<Vec<String>> {
    let mut names = Vec::new();
    let mut ambiguous = Vec::new();

    for entry in fs::read_dir(root).map_err(|e| TransferError::io(root, e))? {
        let entry = entry.map_err(|e| TransferError::io(root, e))?;
        let file_type = entry
            .file_type()
            .map_err(|e| TransferError::io(entry.path(), e))?;
        if file_type.is_symlink() {
            continue;
        }
        match kind {
            ItemKind::Directories if !file_type.is_dir() => continue,
            ItemKind::Files if !file_type.is_file() => continue,
            _ => {}
        }

        let name = entry.file_name().to_string_lossy().into_owned();
        match date::parse(&name, spec, max_date) {
            ParseOutcome::Date(_) => names.push(name),
            ParseOutcome::Ambiguous => ambiguous.push(name),
            ParseOutcome::None => {}
        }
    }

    if !ambiguous.is_empty() {
        ambiguous.sort();
        return Err(TransferError::AmbiguousDate(ambiguous));
    }

    names.sort();
    Ok(names)
}
