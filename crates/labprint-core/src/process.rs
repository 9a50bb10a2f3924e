// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Bounded external-process execution.
//
// Every external tool (spooler, converter, Ghostscript) runs through here so
// that no invocation can block a worker for longer than its timeout.

use std::io::Read;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::error::{LabprintError, Result};

const POLL_INTERVAL: Duration = Duration::from_millis(25);

/// Captured result of a finished process.
#[derive(Debug)]
pub struct CommandOutput {
    pub status: ExitStatus,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.status.success()
    }

    /// Stderr if present, otherwise stdout, otherwise the exit status.
    pub fn failure_detail(&self) -> String {
        let stderr = self.stderr.trim();
        if !stderr.is_empty() {
            return stderr.to_string();
        }
        let stdout = self.stdout.trim();
        if !stdout.is_empty() {
            return stdout.to_string();
        }
        match self.status.code() {
            Some(code) => format!("exit status {code}"),
            None => "terminated by signal".into(),
        }
    }
}

fn program_name(cmd: &Command) -> String {
    cmd.get_program().to_string_lossy().into_owned()
}

fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> thread::JoinHandle<String> {
    thread::spawn(move || {
        let mut buf = Vec::new();
        if let Some(mut pipe) = pipe {
            let _ = pipe.read_to_end(&mut buf);
        }
        String::from_utf8_lossy(&buf).into_owned()
    })
}

fn wait_deadline(child: &mut Child, timeout: Duration) -> std::io::Result<Option<ExitStatus>> {
    let deadline = Instant::now() + timeout;
    loop {
        if let Some(status) = child.try_wait()? {
            return Ok(Some(status));
        }
        if Instant::now() >= deadline {
            return Ok(None);
        }
        thread::sleep(POLL_INTERVAL);
    }
}

/// Run `cmd` to completion or until `timeout` elapses.
///
/// A timed-out child is killed and reported as `LabprintError::Timeout`.
/// A missing executable is reported as `LabprintError::Command`. A non-zero
/// exit is *not* an error here; see [`run_checked`].
pub fn run_with_timeout(cmd: &mut Command, timeout: Duration) -> Result<CommandOutput> {
    let program = program_name(cmd);
    debug!(%program, args = ?cmd.get_args().collect::<Vec<_>>(), "spawning");

    let mut child = cmd
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| LabprintError::Command {
            program: program.clone(),
            detail: format!("could not start: {e}"),
        })?;

    let stdout = drain(child.stdout.take());
    let stderr = drain(child.stderr.take());

    let status = match wait_deadline(&mut child, timeout) {
        Ok(Some(status)) => status,
        Ok(None) => {
            warn!(%program, timeout_secs = timeout.as_secs(), "killing timed-out process");
            let _ = child.kill();
            let _ = child.wait();
            return Err(LabprintError::Timeout {
                program,
                seconds: timeout.as_secs(),
            });
        }
        Err(e) => {
            let _ = child.kill();
            let _ = child.wait();
            return Err(LabprintError::Command {
                program,
                detail: format!("wait failed: {e}"),
            });
        }
    };

    Ok(CommandOutput {
        status,
        stdout: stdout.join().unwrap_or_default(),
        stderr: stderr.join().unwrap_or_default(),
    })
}

/// Like [`run_with_timeout`] but a non-zero exit becomes `LabprintError::Command`.
pub fn run_checked(cmd: &mut Command, timeout: Duration) -> Result<CommandOutput> {
    let program = program_name(cmd);
    let output = run_with_timeout(cmd, timeout)?;
    if output.success() {
        Ok(output)
    } else {
        Err(LabprintError::Command {
            program,
            detail: output.failure_detail(),
        })
    }
}
