use std::path::Path;

use crate::error::Result;
use crate::recipe::HostTarget;

pub mod dry_run;
pub mod ssh;

pub use dry_run::{DryRunRemote, RemoteCall};
pub use ssh::SshRemote;

/// How a remote command's outcome and output are reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecOptions {
    /// Turn a non-zero exit status into an error.
    pub bail_on_failure: bool,
    pub show_command: bool,
    pub show_output: bool,
    pub show_error: bool,
}

impl Default for ExecOptions {
    fn default() -> Self {
        Self {
            bail_on_failure: true,
            show_command: true,
            show_output: true,
            show_error: true,
        }
    }
}

impl ExecOptions {
    pub fn quiet() -> Self {
        Self {
            show_command: false,
            ..Self::default()
        }
    }

    /// Report a failure but hand the exit code back instead of erroring.
    pub fn best_effort() -> Self {
        Self {
            bail_on_failure: false,
            show_command: false,
            ..Self::default()
        }
    }
}

/// Opens shell sessions on deployment hosts.
pub trait Remote {
    /// `label` prefixes the session's log lines (the recipe name).
    fn connect(&self, label: &str, target: &HostTarget) -> Result<Box<dyn RemoteSession>>;
}

pub trait RemoteSession {
    /// Run `cmd` through the remote shell, blocking until it exits and its
    /// output is drained. Returns the exit code.
    fn execute(&mut self, cmd: &str, opts: ExecOptions) -> Result<i32>;

    /// Copy a local file or directory tree to `remote_path`.
    fn upload(&mut self, local: &Path, remote_path: &str) -> Result<()>;
}

pub(crate) fn sh_quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', "'\\''"))
}
