use duskferry::transport::{CommandOutput, Transport, TransportError};
use md5::{Digest, Md5};
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::Path;
use std::sync::Mutex;

/// An in-memory stand-in for an SSH endpoint: a `HashMap<remote_path, bytes>`
/// plus a set of currently-touched sentinel paths, enough to exercise the
/// full upload/verify/lock cycle without a network.
pub struct MemoryTransport {
    pub files: Mutex<HashMap<String, Vec<u8>>>,
    pub sentinels: Mutex<HashSet<String>>,
    pub existing_dirs: Mutex<HashSet<String>>,
}

impl MemoryTransport {
    pub fn new() -> Self {
        MemoryTransport {
            files: Mutex::new(HashMap::new()),
            sentinels: Mutex::new(HashSet::new()),
            existing_dirs: Mutex::new(HashSet::from(["/srv/dst".to_string()])),
        }
    }

    fn inventory_line(path: &str, data: &[u8]) -> String {
        let mut hasher = Md5::new();
        hasher.update(data);
        format!("{}  {:x}  ./{path}", data.len(), hasher.finalize())
    }
}

impl Transport for MemoryTransport {
    fn run(&self, command: &str) -> Result<CommandOutput, TransportError> {
        if let Some(rest) = command.strip_prefix("touch ") {
            self.sentinels.lock().unwrap().insert(rest.trim().to_string());
            return Ok(CommandOutput { stdout: String::new(), stderr: String::new(), exit_code: 0 });
        }
        if let Some(rest) = command.strip_prefix("rm -f ") {
            self.sentinels.lock().unwrap().remove(rest.trim());
            return Ok(CommandOutput { stdout: String::new(), stderr: String::new(), exit_code: 0 });
        }
        if let Some(rest) = command.strip_prefix("mkdir -p") {
            for dir in rest.split_whitespace() {
                self.existing_dirs.lock().unwrap().insert(dir.to_string());
            }
            return Ok(CommandOutput { stdout: String::new(), stderr: String::new(), exit_code: 0 });
        }
        if let Some(rest) = command.strip_prefix("cd ") {
            let dir = rest.split(" &&").next().unwrap_or("").trim();
            if !self.existing_dirs.lock().unwrap().contains(dir) {
                return Ok(CommandOutput {
                    stdout: String::new(),
                    stderr: format!("cd: {dir}: No such file or directory"),
                    exit_code: 1,
                });
            }
            let files = self.files.lock().unwrap();
            let prefix = format!("{dir}/");
            let mut lines: Vec<String> = files
                .iter()
                .filter_map(|(path, data)| path.strip_prefix(&prefix).map(|rel| Self::inventory_line(rel, data)))
                .collect();
            lines.sort();
            lines.push("--- done ---".to_string());
            return Ok(CommandOutput { stdout: lines.join("\n"), stderr: String::new(), exit_code: 0 });
        }
        Ok(CommandOutput { stdout: "--- done ---".to_string(), stderr: String::new(), exit_code: 0 })
    }

    fn put(&self, local: &Path, remote: &str) -> Result<(), TransportError> {
        let data = fs::read(local)?;
        self.files.lock().unwrap().insert(remote.to_string(), data);
        Ok(())
    }
}
