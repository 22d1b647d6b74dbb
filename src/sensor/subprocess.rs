//! Subprocess runner, used by
//! the Argyll adapter to drive `spotread`.

use crate::error::{ErrorKind, Result};
use std::collections::BTreeMap;
use std::io::{BufRead, BufReader, Write};
use std::path::Path;
use std::process::{Child, ChildStdin, Command, Stdio};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    Quit,
    Kill,
}

/// How the child ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Exit {
    Success(i32),
    Sigquit,
    Sigkill,
    Failed(i32),
}

/// A running (or about-to-run) child process. `read_line` never blocks past
/// its timeout; a timeout is reported as `Ok(None)` so callers can
/// distinguish "nothing yet" (poll `try_exit`, keep waiting) from a true
/// EOF, which also comes back `Ok(None)` but leaves `try_exit` non-`None`.
pub trait Subprocess: Send {
    fn write_line(&mut self, line: &str) -> Result<()>;
    fn read_line(&mut self, timeout: Duration) -> Result<Option<String>>;
    fn send_signal(&mut self, signal: Signal) -> Result<()>;
    fn try_exit(&mut self) -> Option<Exit>;
}

/// A real child process, stdout streamed line-by-line off a background
/// reader thread so `read_line` can honor a timeout.
pub struct ChildProcess {
    child: Child,
    stdin: ChildStdin,
    rx: mpsc::Receiver<String>,
    _reader: std::thread::JoinHandle<()>,
}

impl ChildProcess {
    pub fn spawn(program: &str, args: &[&str], env: &BTreeMap<String, String>, cwd: Option<&Path>) -> Result<Self> {
        let mut cmd = Command::new(program);
        cmd.args(args).stdin(Stdio::piped()).stdout(Stdio::piped()).stderr(Stdio::piped());
        for (k, v) in env {
            cmd.env(k, v);
        }
        if let Some(dir) = cwd {
            cmd.current_dir(dir);
        }
        let mut child = cmd.spawn().map_err(|e| ErrorKind::FailedToOpen(e.to_string()))?;
        let stdin = child.stdin.take().ok_or_else(|| ErrorKind::Internal("child has no stdin".into()))?;
        let stdout = child.stdout.take().ok_or_else(|| ErrorKind::Internal("child has no stdout".into()))?;

        let (tx, rx) = mpsc::channel();
        let reader = std::thread::spawn(move || {
            let mut lines = BufReader::new(stdout).lines();
            while let Some(Ok(line)) = lines.next() {
                if tx.send(line).is_err() {
                    break;
                }
            }
        });

        Ok(Self { child, stdin, rx, _reader: reader })
    }
}

impl Subprocess for ChildProcess {
    fn write_line(&mut self, line: &str) -> Result<()> {
        writeln!(self.stdin, "{line}").map_err(|e| ErrorKind::FailedToWrite(e.to_string()))
    }

    fn read_line(&mut self, timeout: Duration) -> Result<Option<String>> {
        match self.rx.recv_timeout(timeout) {
            Ok(line) => Ok(Some(line)),
            Err(RecvTimeoutError::Timeout) => Ok(None),
            Err(RecvTimeoutError::Disconnected) => Ok(None),
        }
    }

    fn send_signal(&mut self, signal: Signal) -> Result<()> {
        let sig = match signal {
            Signal::Quit => libc::SIGQUIT,
            Signal::Kill => libc::SIGKILL,
        };
        let rc = unsafe { libc::kill(self.child.id() as libc::pid_t, sig) };
        if rc != 0 {
            return Err(ErrorKind::Internal(std::io::Error::last_os_error().to_string()));
        }
        Ok(())
    }

    fn try_exit(&mut self) -> Option<Exit> {
        let status = self.child.try_wait().ok()??;
        Some(classify_exit(status))
    }
}

fn classify_exit(status: std::process::ExitStatus) -> Exit {
    use std::os::unix::process::ExitStatusExt;
    if let Some(code) = status.code() {
        if code == 0 {
            Exit::Success(code)
        } else {
            Exit::Failed(code)
        }
    } else if let Some(sig) = status.signal() {
        if sig == libc::SIGQUIT {
            Exit::Sigquit
        } else if sig == libc::SIGKILL {
            Exit::Sigkill
        } else {
            Exit::Failed(-sig)
        }
    } else {
        Exit::Failed(-1)
    }
}
