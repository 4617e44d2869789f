//! Thin wrapper around `std::process::Command` for running host tools.
//!
//! Every external program the builder touches (`make`, `git`, `zip`, the
//! toolchain binaries) goes through [`Cmd`], so failures carry the full
//! command line and captured stderr.

use anyhow::{bail, Context, Result};
use std::ffi::{OsStr, OsString};
use std::fs::{self, OpenOptions};
use std::io::{BufRead, BufReader, Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::mpsc;

/// Output of a finished command.
#[derive(Debug, Clone)]
pub struct CommandResult {
    pub stdout: String,
    pub stderr: String,
    /// `None` when the process was killed by a signal.
    pub exit_code: Option<i32>,
}

impl CommandResult {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }
}

/// Builder for a single external command.
#[derive(Debug)]
pub struct Cmd {
    program: String,
    args: Vec<OsString>,
    envs: Vec<(String, OsString)>,
    dir: Option<PathBuf>,
    allow_fail: bool,
    error_msg: Option<String>,
}

impl Cmd {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            envs: Vec::new(),
            dir: None,
            allow_fail: false,
            error_msg: None,
        }
    }

    pub fn arg(mut self, arg: impl Into<OsString>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn arg_path(mut self, path: &Path) -> Self {
        self.args.push(path.as_os_str().to_os_string());
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<OsString>) -> Self {
        self.envs.push((key.into(), value.into()));
        self
    }

    pub fn current_dir(mut self, dir: &Path) -> Self {
        self.dir = Some(dir.to_path_buf());
        self
    }

    /// Don't treat a non-zero exit as an error.
    pub fn allow_fail(mut self) -> Self {
        self.allow_fail = true;
        self
    }

    /// Replace the generic failure message.
    pub fn error_msg(mut self, msg: impl Into<String>) -> Self {
        self.error_msg = Some(msg.into());
        self
    }

    /// Human-readable command line, used in logs and errors.
    pub fn display(&self) -> String {
        let mut line = self.program.clone();
        for arg in &self.args {
            line.push(' ');
            line.push_str(&arg.to_string_lossy());
        }
        line
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args);
        for (key, value) in &self.envs {
            cmd.env(key, value);
        }
        if let Some(dir) = &self.dir {
            cmd.current_dir(dir);
        }
        cmd
    }

    /// Run to completion, capturing stdout and stderr.
    pub fn run(self) -> Result<CommandResult> {
        tracing::debug!(command = %self.display(), "running");

        let output = self
            .command()
            .stdin(Stdio::null())
            .output()
            .with_context(|| format!("Failed to execute {}", self.program))?;

        let result = CommandResult {
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            exit_code: output.status.code(),
        };

        if !result.success() && !self.allow_fail {
            bail!(
                "{}\n  Command: {}\n  Exit: {}\n{}",
                self.error_msg
                    .as_deref()
                    .unwrap_or("Command failed"),
                self.display(),
                exit_label(result.exit_code),
                result.stderr.trim_end()
            );
        }

        Ok(result)
    }

    /// Run while echoing combined output to the terminal and appending it to `log`.
    ///
    /// stdout and stderr are pumped by two reader threads into one channel so
    /// the log keeps the interleaving the terminal shows.
    pub fn run_logged(self, log: &Path) -> Result<CommandResult> {
        tracing::debug!(command = %self.display(), log = %log.display(), "running (logged)");

        if let Some(parent) = log.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut log_file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(log)
            .with_context(|| format!("Failed to open log file {}", log.display()))?;
        writeln!(log_file, "$ {}", self.display())?;

        let mut child = self
            .command()
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .with_context(|| format!("Failed to spawn {}", self.program))?;

        let (tx, rx) = mpsc::channel::<(bool, String)>();
        let mut readers = Vec::new();
        if let Some(stdout) = child.stdout.take() {
            let tx = tx.clone();
            readers.push(std::thread::spawn(move || pump_lines(stdout, false, &tx)));
        }
        if let Some(stderr) = child.stderr.take() {
            let tx = tx.clone();
            readers.push(std::thread::spawn(move || pump_lines(stderr, true, &tx)));
        }
        drop(tx);

        // A failed log write must not stop draining the pipes.
        let mut log_error = None;
        let mut stdout = String::new();
        let mut stderr = String::new();
        for (is_err, line) in rx {
            if log_error.is_none() {
                if let Err(e) = writeln!(log_file, "{}", line) {
                    tracing::warn!(log = %log.display(), "log write failed: {}", e);
                    log_error = Some(e);
                }
            }
            if is_err {
                eprintln!("{}", line);
                stderr.push_str(&line);
                stderr.push('\n');
            } else {
                println!("{}", line);
                stdout.push_str(&line);
                stdout.push('\n');
            }
        }
        for reader in readers {
            let _ = reader.join();
        }

        let status = child
            .wait()
            .with_context(|| format!("Failed to wait for {}", self.program))?;
        let result = CommandResult {
            stdout,
            stderr,
            exit_code: status.code(),
        };

        if !result.success() && !self.allow_fail {
            bail!(
                "{}\n  Command: {}\n  Exit: {}\n  Log: {}",
                self.error_msg
                    .as_deref()
                    .unwrap_or("Command failed"),
                self.display(),
                exit_label(result.exit_code),
                log.display()
            );
        }

        Ok(result)
    }
}

fn exit_label(code: Option<i32>) -> String {
    match code {
        Some(code) => code.to_string(),
        None => "killed by signal".to_string(),
    }
}

/// Forward every line of `reader` until EOF. Invalid UTF-8 is replaced, never fatal.
fn pump_lines(reader: impl Read, is_err: bool, tx: &mpsc::Sender<(bool, String)>) {
    for chunk in BufReader::new(reader).split(b'\n') {
        let Ok(mut bytes) = chunk else {
            break;
        };
        if bytes.last() == Some(&b'\r') {
            bytes.pop();
        }
        let line = String::from_utf8_lossy(&bytes).into_owned();
        if tx.send((is_err, line)).is_err() {
            break;
        }
    }
}

/// Locate `tool` on `PATH`, returning its full path.
pub fn which(tool: &str) -> Option<String> {
    which::which(tool).ok().map(|p| p.display().to_string())
}

/// Locate `tool` in an explicit search path.
pub fn which_in(tool: &str, search_path: impl AsRef<OsStr>) -> Option<String> {
    let cwd = std::env::current_dir().ok()?;
    which::which_in(tool, Some(search_path), cwd)
        .ok()
        .map(|p| p.display().to_string())
}

/// Whether `tool` is on `PATH`.
pub fn exists(tool: &str) -> bool {
    which(tool).is_some()
}
