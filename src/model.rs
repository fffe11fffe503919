use crate::date::DateSpec;
use crate::error::{Result, TransferError};
use clap::{Parser, ValueEnum};
use std::path::PathBuf;

/// Which shape of "item" the source root contains.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ItemKind {
    /// An item is a subdirectory whose basename parses as a date.
    Directories,
    /// An item is a file at the source root whose basename contains a date match.
    Files,
}

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    #[arg(short, long, required = true, value_name = "PATH", help = "Local source root containing date-named items")]
    pub source: PathBuf,

    #[arg(short, long, required = true, value_name = "PATH", help = "Remote destination root (must already exist on the server)")]
    pub destination: PathBuf,

    #[arg(short, long, value_enum, default_value = "directories", help = "Whether items are date-named directories or date-named files")]
    pub kind: ItemKind,

    #[arg(long, default_value = "^.*%Y%m%d.*$", value_name = "SPEC", help = "Date spec: exactly one each of %Y, %m, %d, anchored with ^ and $")]
    pub dated_regex: String,

    #[arg(long, default_value = "false", help = "Remove local source items after a successful, verified upload")]
    pub remove_after_upload: bool,

    #[arg(long, value_name = "DEPTH", help = "Maximum recursion depth when screening a directory tree")]
    pub max_depth: Option<usize>,

    #[arg(long, required = true, value_name = "HOST", help = "Remote host to connect to over SSH")]
    pub host: String,

    #[arg(long, required = true, value_name = "USER", help = "SSH username")]
    pub username: String,

    #[arg(long, value_name = "PASSWORD", help = "SSH password (prefer --identity-file)")]
    pub password: Option<String>,

    #[arg(long, value_name = "PATH", help = "Path to an SSH private key")]
    pub identity_file: Option<PathBuf>,

    #[arg(long, default_value_t = 22, help = "SSH port")]
    pub port: u16,

    #[arg(short, long, default_value = "false", help = "Emit debug-level diagnostics")]
    pub verbose: bool,
}

pub fn validate_arguments(args: &Args) -> Result<()> {
    if !args.source.exists() {
        return Err(TransferError::Config(format!(
            "source directory does not exist: {}",
            args.source.display()
        )));
    }
    if !args.source.is_dir() {
        return Err(TransferError::Config(format!(
            "source path is not a directory: {}",
            args.source.display()
        )));
    }
    if args.password.is_none() && args.identity_file.is_none() {
        return Err(TransferError::Config(
            "either --password or --identity-file must be provided".to_string(),
        ));
    }
    Ok(())
}

/// Enumerate every rule violated by a candidate `dated_regex`, rather than
/// stopping at the first failure, so configuration errors can be reported in
/// one shot.
fn validate_dated_regex(spec: &str) -> Vec<String> {
    let mut violations = Vec::new();

    if !spec.starts_with('^') {
        violations.push("must start with '^'".to_string());
    }
    if !spec.ends_with('$') {
        violations.push("must end with '$'".to_string());
    }
    if spec.contains('(') || spec.contains(')') {
        violations.push("must not contain '(' or ')'".to_string());
    }

    let mut tokens = Vec::new();
    let mut rest = spec;
    let mut percent_count = 0;
    while !rest.is_empty() {
        if rest.starts_with('%') {
            percent_count += 1;
        }
        if let Some(tail) = rest.strip_prefix("%Y") {
            tokens.push("%Y");
            rest = tail;
        } else if let Some(tail) = rest.strip_prefix("%m") {
            tokens.push("%m");
            rest = tail;
        } else if let Some(tail) = rest.strip_prefix("%d") {
            tokens.push("%d");
            rest = tail;
        } else {
            let c = rest.chars().next().unwrap();
            rest = &rest[c.len_utf8()..];
        }
    }

    if percent_count != 3 {
        violations.push(format!(
            "must contain exactly three '%'-tokens, found {percent_count}"
        ));
    }
    for required in ["%Y", "%m", "%d"] {
        if tokens.iter().filter(|t| **t == required).count() != 1 {
            violations.push(format!("must contain exactly one {required}"));
        }
    }

    violations
}

/// Injected logging and cooperative-abort hook, polled between items and
/// between files. The default surface mirrors the original tool's defaults:
/// print to stdout and never abort.
pub struct CallbackSurface {
    pub dated_regex: DateSpec,
    log_info: Box<dyn Fn(&str)>,
    log_error: Box<dyn Fn(&str)>,
    should_abort: Box<dyn Fn() -> bool>,
}

impl CallbackSurface {
    pub fn new(
        dated_regex: &str,
        log_info: impl Fn(&str) + 'static,
        log_error: impl Fn(&str) + 'static,
        should_abort: impl Fn() -> bool + 'static,
    ) -> Result<Self> {
        let violations = validate_dated_regex(dated_regex);
        if !violations.is_empty() {
            return Err(TransferError::Config(format!(
                "invalid dated_regex '{dated_regex}': {}",
                violations.join("; ")
            )));
        }

        Ok(CallbackSurface {
            dated_regex: DateSpec::new(dated_regex)?,
            log_info: Box::new(log_info),
            log_error: Box::new(log_error),
            should_abort: Box::new(should_abort),
        })
    }

    pub fn default_for(dated_regex: &str) -> Result<Self> {
        Self::new(
            dated_regex,
            |msg| println!("INFO - {msg}"),
            |msg| println!("ERROR - {msg}"),
            || false,
        )
    }

    pub fn log_info(&self, msg: &str) {
        (self.log_info)(msg);
        log::info!("{msg}");
    }

    pub fn log_error(&self, msg: &str) {
        (self.log_error)(msg);
        log::error!("{msg}");
    }

    pub fn should_abort(&self) -> bool {
        (self.should_abort)()
    }
}

impl std::fmt::Debug for CallbackSurface {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallbackSurface")
            .field("dated_regex", &self.dated_regex.as_str())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_dated_regex_accepts_default() {
        assert!(validate_dated_regex("^.*%Y%m%d.*$").is_empty());
    }

    #[test]
    fn test_validate_dated_regex_collects_every_violation() {
        let violations = validate_dated_regex("%Y%m(");
        assert!(violations.iter().any(|v| v.contains("start with '^'")));
        assert!(violations.iter().any(|v| v.contains("end with '$'")));
        assert!(violations.iter().any(|v| v.contains("'(' or ')'")));
        assert!(violations.iter().any(|v| v.contains("%d")));
    }

    #[test]
    fn test_validate_dated_regex_rejects_duplicate_token() {
        let violations = validate_dated_regex("^%Y%Y%m%d$");
        assert!(violations.iter().any(|v| v.contains("exactly one %Y")));
    }

    #[test]
    fn test_callback_surface_rejects_invalid_spec() {
        assert!(CallbackSurface::new("not-anchored", |_| {}, |_| {}, || false).is_err());
    }

    #[test]
    fn test_callback_surface_accepts_default_spec() {
        assert!(CallbackSurface::default_for("^.*%Y%m%d.*$").is_ok());
    }
}
