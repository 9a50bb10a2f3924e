// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Primary print path: one silent command-line print.

use std::path::Path;
use std::process::Command;
use std::time::Duration;

use labprint_core::config::PrimaryCommand;
use labprint_core::error::Result;
use labprint_core::process::run_checked;
use tracing::{info, instrument};

use crate::directives::{Directive, lp_args, sumatra_settings};

/// Builds and runs the configured silent-print command.
pub struct PrimaryPrinter {
    command: PrimaryCommand,
    timeout: Duration,
}

impl PrimaryPrinter {
    pub fn new(command: PrimaryCommand, timeout: Duration) -> Self {
        Self { command, timeout }
    }

    /// The full command for printing `file` on `printer`.
    pub fn build_command(&self, printer: &str, directives: &[Directive], file: &Path) -> Command {
        match &self.command {
            PrimaryCommand::Lp { command } => {
                let mut cmd = Command::new(command);
                cmd.arg("-d").arg(printer).args(lp_args(directives)).arg(file);
                cmd
            }
            PrimaryCommand::Sumatra { executable } => {
                let mut cmd = Command::new(executable);
                cmd.arg("-print-to").arg(printer);
                let settings = sumatra_settings(directives);
                if !settings.is_empty() {
                    cmd.arg("-print-settings").arg(settings);
                }
                cmd.arg("-silent").arg(file);
                cmd
            }
        }
    }

    /// Print and return the spool handle.
    #[instrument(skip(self, directives), fields(file = %file.display()))]
    pub fn print(&self, printer: &str, directives: &[Directive], file: &Path) -> Result<String> {
        let mut cmd = self.build_command(printer, directives, file);
        let output = run_checked(&mut cmd, self.timeout)?;
        let handle = match &self.command {
            PrimaryCommand::Lp { .. } => parse_request_id(&output.stdout)
                .unwrap_or_else(|| format!("lp-job-{}", file_label(file))),
            PrimaryCommand::Sumatra { .. } => format!("print-job-{}", file_label(file)),
        };
        info!(printer, handle = %handle, "submitted through primary path");
        Ok(handle)
    }
}

pub(crate) fn file_label(file: &Path) -> String {
    file.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "document".into())
}

/// `lp` prints "request id is QUEUE-42 (1 file(s))".
pub fn parse_request_id(stdout: &str) -> Option<String> {
    stdout.lines().find_map(|line| {
        let (_, rest) = line.split_once("request id is ")?;
        rest.split_whitespace().next().map(String::from)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use labprint_core::types::PaperSize;

    fn args_of(cmd: &Command) -> Vec<String> {
        cmd.get_args().map(|a| a.to_string_lossy().into_owned()).collect()
    }

    #[test]
    fn lp_command_line() {
        let printer = PrimaryPrinter::new(PrimaryCommand::default(), Duration::from_secs(60));
        let cmd = printer.build_command(
            "lab-laser",
            &[Directive::Copies(3), Directive::Paper(PaperSize::Letter)],
            Path::new("/tmp/labprint/job.pdf"),
        );
        assert_eq!(cmd.get_program(), "lp");
        assert_eq!(
            args_of(&cmd),
            vec!["-d", "lab-laser", "-n", "3", "-o", "media=Letter", "/tmp/labprint/job.pdf"]
        );
    }

    #[test]
    fn sumatra_command_line() {
        let printer = PrimaryPrinter::new(
            PrimaryCommand::Sumatra {
                executable: "SumatraPDF.exe".into(),
            },
            Duration::from_secs(120),
        );
        let cmd = printer.build_command(
            "Lab Laser",
            &[Directive::Copies(2), Directive::Monochrome],
            Path::new("job.pdf"),
        );
        assert_eq!(
            args_of(&cmd),
            vec!["-print-to", "Lab Laser", "-print-settings", "2x,monochrome", "-silent", "job.pdf"]
        );

        let plain = printer.build_command("Lab Laser", &[], Path::new("job.pdf"));
        assert_eq!(args_of(&plain), vec!["-print-to", "Lab Laser", "-silent", "job.pdf"]);
    }

    #[test]
    fn request_id_parsing() {
        assert_eq!(
            parse_request_id("request id is lab-laser-42 (1 file(s))\n"),
            Some("lab-laser-42".into())
        );
        assert_eq!(parse_request_id(""), None);
    }
}
