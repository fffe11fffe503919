use crate::error::{Result, TransferError};
use crate::transport::Transport;
use md5::{Digest, Md5};
use std::fs::File as StdFile;
use std::io::Read;
use std::path::Path;
use walkdir::WalkDir;

const RESERVED_NAMES: [&str; 2] = [".do-not-touch", "upload-meta.json"];

/// A single regular file, content-addressed by path, size and MD5. Equality
/// and ordering are over all three fields, matching the canonical form used
/// by the diff engine and by the remote inventory wire format.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct File {
    pub relative_path: String,
    pub size: u64,
    pub md5: String,
}

/// A lexicographically-ordered listing of files under some root.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Directory {
    pub files: Vec<File>,
}

impl Directory {
    fn from_unsorted(mut files: Vec<File>) -> Self {
        files.sort_by(|a, b| a.relative_path.cmp(&b.relative_path));
        Directory { files }
    }

    #[cfg(test)]
    pub fn from_unsorted_for_test(files: Vec<File>) -> Self {
        Self::from_unsorted(files)
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &File> {
        self.files.iter()
    }
}

fn is_reserved(name: &str) -> bool {
    RESERVED_NAMES.contains(&name)
}

fn md5_of(path: &Path) -> Result<String> {
    let mut file = StdFile::open(path).map_err(|e| TransferError::io(path, e))?;
    let mut hasher = Md5::new();
    let mut buf = [0u8; 64 * 1024];
    loop {
        let n = file.read(&mut buf).map_err(|e| TransferError::io(path, e))?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(format!("{:x}", hasher.finalize()))
}

/// Walk `root` with native filesystem APIs, streaming MD5 of every regular
/// file up to `max_depth`, excluding the reserved sentinel/ledger names.
pub fn screen_local(root: &Path, max_depth: Option<usize>) -> Result<Directory> {
    let mut walker = WalkDir::new(root).follow_links(false);
    if let Some(depth) = max_depth {
        walker = walker.max_depth(depth);
    }

    let mut files = Vec::new();
    for entry in walker {
        let entry = entry.map_err(|e| {
            TransferError::io(e.path().unwrap_or(root).to_path_buf(), std::io::Error::other(e.to_string()))
        })?;
        if !entry.file_type().is_file() {
            continue;
        }
        let name = entry.file_name().to_string_lossy();
        if is_reserved(&name) {
            continue;
        }

        let relative_path = entry
            .path()
            .strip_prefix(root)
            .unwrap_or(entry.path())
            .to_string_lossy()
            .replace('\\', "/");
        let size = entry
            .metadata()
            .map_err(|e| TransferError::io(entry.path(), std::io::Error::other(e.to_string())))?
            .len();
        let md5 = md5_of(entry.path())?;

        files.push(File { relative_path, size, md5 });
    }

    Ok(Directory::from_unsorted(files))
}

const SENTINEL_LINE: &str = "--- done ---";

/// Issue the canonical remote inventory command over `transport` and parse
/// its strict wire format: data lines of `<size>  <md5>  ./<relative_path>`
/// terminated by a sentinel line, required as the last non-empty line.
pub fn screen_remote(root: &str, transport: &dyn Transport, max_depth: Option<usize>) -> Result<Directory> {
    let depth = max_depth.map(|d| d.to_string()).unwrap_or_else(|| "999999".to_string());
    let command = format!(
        "cd {root} && find . -maxdepth {depth} -type f -exec sh -c 'echo \"$(stat -c %s {{}})  $(md5sum {{}})\"' \\; && echo '{SENTINEL_LINE}'"
    );

    let output = transport
        .run(&command)
        .map_err(|e| TransferError::Transport(e.to_string()))?;
    if output.exit_code != 0 {
        return Err(TransferError::RemoteCommand(format!(
            "inventory command exited with status {}: {}",
            output.exit_code, output.stderr
        )));
    }

    let lines: Vec<&str> = output.stdout.lines().filter(|l| !l.trim().is_empty()).collect();
    let Some((sentinel, data_lines)) = lines.split_last() else {
        return Err(TransferError::RemoteCommand(
            "remote inventory produced no output".to_string(),
        ));
    };
    if *sentinel != SENTINEL_LINE {
        return Err(TransferError::RemoteCommand(
            "remote inventory output missing '--- done ---' sentinel; output may be truncated".to_string(),
        ));
    }

    let mut files = Vec::with_capacity(data_lines.len());
    for line in data_lines {
        let parts: Vec<&str> = line.splitn(3, "  ").collect();
        let [size_str, md5, raw_path] = parts.as_slice() else {
            return Err(TransferError::RemoteCommand(format!(
                "unparsable remote inventory line: {line}"
            )));
        };
        let size = size_str.parse::<u64>().map_err(|_| {
            TransferError::RemoteCommand(format!("non-numeric size in remote inventory line: {line}"))
        })?;
        if md5.len() != 32 || !md5.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(TransferError::RemoteCommand(format!(
                "malformed md5 hash in remote inventory line: {line}"
            )));
        }
        let relative_path = raw_path.strip_prefix("./").unwrap_or(raw_path).to_string();

        files.push(File { relative_path, size, md5: md5.to_string() });
    }

    Ok(Directory::from_unsorted(files))
}

/// Build a single-entry local `Directory` for a file-kind item, where the
/// "item" is one date-named file at the root rather than a subtree.
pub fn single_file_local(root: &Path, name: &str) -> Result<Directory> {
    let path = root.join(name);
    let size = std::fs::metadata(&path)
        .map_err(|e| TransferError::io(&path, e))?
        .len();
    let md5 = md5_of(&path)?;
    Ok(Directory::from_unsorted(vec![File {
        relative_path: name.to_string(),
        size,
        md5,
    }]))
}

/// Remote counterpart of [`single_file_local`]: reuses the same canonical
/// `find`-based inventory command as [`screen_remote`] (scoped to direct
/// children of `root`) and filters client-side down to `name`, rather than
/// issuing a bespoke remote shell shape for a single file. Tolerates the
/// file's absence by returning an empty `Directory`.
pub fn single_file_remote(root: &str, name: &str, transport: &dyn Transport) -> Result<Directory> {
    let dir = screen_remote(root, transport, Some(1))?;
    let matched: Vec<File> = dir.files.into_iter().filter(|f| f.relative_path == name).collect();
    Ok(Directory::from_unsorted(matched))
}
