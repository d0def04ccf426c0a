use std::io::{BufRead, BufReader, Read};
use std::path::Path;
use std::process::{Command, Output, Stdio};
use std::sync::mpsc;

use tracing::{error, info};

use crate::error::{Error, Result};
use crate::log_sanitize::sanitize_remote_line;
use crate::recipe::HostTarget;
use crate::remote::{ExecOptions, Remote, RemoteSession};

const PASSWORD_ENV: &str = "SSHPASS";

/// [`Remote`] backed by the OpenSSH `ssh` and `scp` binaries.
///
/// Key-based auth runs in batch mode. When a password is configured the
/// commands are wrapped in `sshpass -e` and the password travels through the
/// environment, never the argument list.
#[derive(Debug, Clone)]
pub struct SshRemote {
    connect_timeout: u64,
}

impl SshRemote {
    pub fn new(connect_timeout: u64) -> Self {
        Self { connect_timeout }
    }
}

impl Default for SshRemote {
    fn default() -> Self {
        Self::new(30)
    }
}

impl Remote for SshRemote {
    fn connect(&self, label: &str, target: &HostTarget) -> Result<Box<dyn RemoteSession>> {
        let session = SshSession {
            label: label.to_string(),
            target: target.clone(),
            connect_timeout: self.connect_timeout,
        };
        session.check_reachable()?;
        Ok(Box::new(session))
    }
}

#[derive(Debug)]
struct SshSession {
    label: String,
    target: HostTarget,
    connect_timeout: u64,
}

impl SshSession {
    fn base_cmd(&self, program: &str, scp_style: bool) -> Command {
        let mut cmd = match self.target.password.as_deref() {
            Some(password) => {
                let mut c = Command::new("sshpass");
                c.arg("-e").arg(program).env(PASSWORD_ENV, password);
                c
            }
            None => Command::new(program),
        };
        if scp_style {
            cmd.arg("-P").arg(self.target.port.to_string());
        } else {
            cmd.arg("-p").arg(self.target.port.to_string());
        }
        cmd.arg("-o")
            .arg(format!("ConnectTimeout={}", self.connect_timeout))
            .arg("-o")
            .arg("StrictHostKeyChecking=accept-new");
        if self.target.password.is_none() {
            cmd.arg("-o").arg("BatchMode=yes");
        }
        cmd.stdin(Stdio::null());
        cmd
    }

    fn check_reachable(&self) -> Result<()> {
        let mut cmd = self.base_cmd("ssh", false);
        cmd.arg(self.target.destination()).arg("true");
        let out = run_command_output(&mut cmd)?;
        if out.status.success() {
            return Ok(());
        }
        Err(Error::remote(format!(
            "failed to connect to {}:{}: {}",
            self.target.host,
            self.target.port,
            command_summary(&out)
        )))
    }
}

impl RemoteSession for SshSession {
    fn execute(&mut self, command: &str, opts: ExecOptions) -> Result<i32> {
        if opts.show_command {
            info!("running {command}");
        }
        let mut cmd = self.base_cmd("ssh", false);
        cmd.arg(self.target.destination())
            .arg(format!("{command} 2>&1"))
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let mut child = cmd
            .spawn()
            .map_err(|e| Error::remote(format!("failed to spawn ssh: {e}")))?;

        let (tx, rx) = mpsc::channel::<String>();
        if let Some(out) = child.stdout.take() {
            let tx = tx.clone();
            std::thread::spawn(move || forward_lines(out, tx));
        }
        if let Some(err) = child.stderr.take() {
            let tx = tx.clone();
            std::thread::spawn(move || forward_lines(err, tx));
        }
        drop(tx);

        let secrets: Vec<&str> = self.target.password.as_deref().into_iter().collect();
        for line in rx {
            let line = sanitize_remote_line(&line, &secrets);
            if opts.show_output && !line.is_empty() {
                info!("{}: {line}", self.label);
            }
        }

        let status = child
            .wait()
            .map_err(|e| Error::remote(format!("wait failed: {e}")))?;
        // ssh reports transport failures as 255; a signal leaves no code.
        let rc = status.code().unwrap_or(-1);
        if rc != 0 {
            if opts.show_error {
                error!("failed to run '{command}' on {}: exit code {rc}", self.target.host);
            }
            if opts.bail_on_failure {
                return Err(Error::remote(format!(
                    "failed to execute '{command}' (exit code {rc})"
                )));
            }
        }
        Ok(rc)
    }

    fn upload(&mut self, local: &Path, remote_path: &str) -> Result<()> {
        let mut cmd = self.base_cmd("scp", true);
        if local.is_dir() {
            cmd.arg("-r");
        }
        cmd.arg(local)
            .arg(format!("{}:{}", self.target.destination(), remote_path));
        let out = run_command_output(&mut cmd)?;
        if out.status.success() {
            return Ok(());
        }
        Err(Error::remote(format!(
            "failed to upload {} to {}:{}: {}",
            local.display(),
            self.target.host,
            remote_path,
            command_summary(&out)
        )))
    }
}

fn run_command_output(cmd: &mut Command) -> Result<Output> {
    cmd.output()
        .map_err(|e| Error::remote(format!("failed to run command {:?}: {e}", cmd.get_program())))
}

// First non-empty of stderr and stdout, else the exit status.
fn command_summary(out: &Output) -> String {
    [&out.stderr, &out.stdout]
        .into_iter()
        .map(|bytes| String::from_utf8_lossy(bytes).trim().to_string())
        .find(|text| !text.is_empty())
        .unwrap_or_else(|| format!("status {}", out.status))
}

/// Send every non-empty line of `reader` to `tx`. Carriage returns split
/// lines too, so progress bars arrive as separate updates. A line longer
/// than the read cap is delivered in pieces.
fn forward_lines<R: Read>(reader: R, tx: mpsc::Sender<String>) {
    const MAX_READ_BYTES: u64 = 16 * 1024;
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::with_capacity(1024);
    loop {
        buf.clear();
        match (&mut reader).take(MAX_READ_BYTES).read_until(b'\n', &mut buf) {
            Ok(0) | Err(_) => return,
            Ok(_) => {}
        }
        for part in buf.split(|b| *b == b'\n' || *b == b'\r') {
            if part.is_empty() {
                continue;
            }
            if tx.send(String::from_utf8_lossy(part).into_owned()).is_err() {
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session(password: Option<&str>) -> SshSession {
        SshSession {
            label: "web".into(),
            target: HostTarget::new("10.0.0.9", "deploy", password.map(str::to_string), 2222),
            connect_timeout: 5,
        }
    }

    fn args(cmd: &Command) -> Vec<String> {
        cmd.get_args()
            .map(|a| a.to_string_lossy().to_string())
            .collect()
    }

    #[test]
    fn key_auth_uses_batch_mode_and_port_flag() {
        let cmd = session(None).base_cmd("ssh", false);
        assert_eq!(cmd.get_program(), "ssh");
        let a = args(&cmd);
        assert_eq!(&a[..2], &["-p", "2222"]);
        assert!(a.contains(&"ConnectTimeout=5".to_string()));
        assert!(a.contains(&"BatchMode=yes".to_string()));
    }

    #[test]
    fn password_auth_wraps_in_sshpass() {
        let cmd = session(Some("s3cret")).base_cmd("scp", true);
        assert_eq!(cmd.get_program(), "sshpass");
        let a = args(&cmd);
        assert_eq!(&a[..4], &["-e", "scp", "-P", "2222"]);
        assert!(!a.iter().any(|x| x.contains("s3cret")));
        assert!(!a.contains(&"BatchMode=yes".to_string()));
        let env: Vec<_> = cmd
            .get_envs()
            .filter_map(|(k, v)| Some((k.to_string_lossy().to_string(), v?.to_string_lossy().to_string())))
            .collect();
        assert_eq!(env, vec![(PASSWORD_ENV.to_string(), "s3cret".to_string())]);
    }

    #[cfg(unix)]
    #[test]
    fn summary_prefers_stderr_then_stdout() {
        use std::os::unix::process::ExitStatusExt;
        let out = |stderr: &str, stdout: &str| Output {
            status: std::process::ExitStatus::from_raw(256),
            stdout: stdout.as_bytes().to_vec(),
            stderr: stderr.as_bytes().to_vec(),
        };
        assert_eq!(command_summary(&out(" denied\n", "x")), "denied");
        assert_eq!(command_summary(&out("", "only out")), "only out");
        assert!(command_summary(&out("", "")).starts_with("status "));
    }

    #[test]
    fn output_stream_splits_lines() {
        let (tx, rx) = mpsc::channel();
        forward_lines(&b"one\r\ntwo\n\nthree"[..], tx);
        let got: Vec<String> = rx.into_iter().collect();
        assert_eq!(got, vec!["one", "two", "three"]);
    }
}
