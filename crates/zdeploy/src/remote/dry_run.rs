use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use tracing::info;

use crate::error::Result;
use crate::recipe::HostTarget;
use crate::remote::{ExecOptions, Remote, RemoteSession};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteCall {
    Connect { label: String, host: String },
    Execute { label: String, command: String },
    Upload { label: String, local: PathBuf, remote: String },
}

/// Logs what would run on each host without touching the network.
///
/// Every call is also kept in order so callers can inspect the plan.
#[derive(Debug, Clone, Default)]
pub struct DryRunRemote {
    calls: Arc<Mutex<Vec<RemoteCall>>>,
}

impl DryRunRemote {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> Vec<RemoteCall> {
        self.calls.lock().map(|g| g.clone()).unwrap_or_default()
    }

    fn push(calls: &Mutex<Vec<RemoteCall>>, call: RemoteCall) {
        if let Ok(mut g) = calls.lock() {
            g.push(call);
        }
    }
}

impl Remote for DryRunRemote {
    fn connect(&self, label: &str, target: &HostTarget) -> Result<Box<dyn RemoteSession>> {
        info!("DRY-RUN: connect {} ({label})", target.destination());
        Self::push(
            &self.calls,
            RemoteCall::Connect {
                label: label.to_string(),
                host: target.host.clone(),
            },
        );
        Ok(Box::new(DryRunSession {
            label: label.to_string(),
            calls: Arc::clone(&self.calls),
        }))
    }
}

struct DryRunSession {
    label: String,
    calls: Arc<Mutex<Vec<RemoteCall>>>,
}

impl RemoteSession for DryRunSession {
    fn execute(&mut self, cmd: &str, _opts: ExecOptions) -> Result<i32> {
        info!("DRY-RUN: {}: {cmd}", self.label);
        DryRunRemote::push(
            &self.calls,
            RemoteCall::Execute {
                label: self.label.clone(),
                command: cmd.to_string(),
            },
        );
        Ok(0)
    }

    fn upload(&mut self, local: &Path, remote_path: &str) -> Result<()> {
        info!(
            "DRY-RUN: {}: upload {} -> {remote_path}",
            self.label,
            local.display()
        );
        DryRunRemote::push(
            &self.calls,
            RemoteCall::Upload {
                label: self.label.clone(),
                local: local.to_path_buf(),
                remote: remote_path.to_string(),
            },
        );
        Ok(())
    }
}
