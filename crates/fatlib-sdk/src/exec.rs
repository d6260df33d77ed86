//! External command execution.
//!
//! Every tool fatlib drives (`xcodebuild`, `tar`, `configure`, `make`, `lipo`)
//! is described by a [`CommandSpec`] and executed through a [`CommandRunner`].
//! A `CommandSpec` carries its own working directory and environment overrides, so
//! per-architecture settings never leak into the fatlib process environment.

use std::ffi::OsString;
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Command;

use crate::types::BuildError;

/// A fully described external command invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: OsString,
    pub args: Vec<OsString>,
    /// Working directory; inherits the current one when `None`.
    pub cwd: Option<PathBuf>,
    /// Environment overrides applied on top of the inherited environment.
    pub env: Vec<(String, String)>,
    /// Human-readable description used in progress output and error messages.
    pub description: String,
}

impl CommandSpec {
    pub fn new(program: impl Into<OsString>, description: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            cwd: None,
            env: Vec::new(),
            description: description.into(),
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

    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    pub fn envs<I>(mut self, vars: I) -> Self
    where
        I: IntoIterator<Item = (String, String)>,
    {
        self.env.extend(vars);
        self
    }

    /// Returns the value this command sets for `key`, if any (last one wins).
    pub fn env_value(&self, key: &str) -> Option<&str> {
        self.env
            .iter()
            .rev()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Returns true if any argument equals `needle`.
    pub fn has_arg(&self, needle: &str) -> bool {
        self.args.iter().any(|a| a == needle)
    }

    /// Returns the program file name (`configure` for `./configure`).
    pub fn program_name(&self) -> String {
        Path::new(&self.program)
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.program.to_string_lossy().into_owned())
    }

    fn to_command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args);
        if let Some(cwd) = &self.cwd {
            cmd.current_dir(cwd);
        }
        for (key, value) in &self.env {
            cmd.env(key, value);
        }
        cmd
    }
}

impl fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program.to_string_lossy())?;
        for arg in &self.args {
            let arg = arg.to_string_lossy();
            if arg.contains(' ') {
                write!(f, " '{}'", arg)?;
            } else {
                write!(f, " {}", arg)?;
            }
        }
        Ok(())
    }
}

/// Executes [`CommandSpec`]s.
///
/// The production implementation is [`SystemRunner`]; tests substitute a
/// recording fake.
pub trait CommandRunner {
    /// Runs the command to completion, failing on a non-zero exit status.
    fn run(&self, cmd: &CommandSpec) -> Result<(), BuildError>;

    /// Runs the command and returns its stdout, failing on a non-zero exit status.
    fn capture(&self, cmd: &CommandSpec) -> Result<String, BuildError>;
}

/// Runs commands as child processes of the current process.
#[derive(Debug, Clone, Default)]
pub struct SystemRunner {
    verbose: bool,
}

impl SystemRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Logs each command line at `info` level instead of `debug`.
    pub fn verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    fn announce(&self, cmd: &CommandSpec) {
        if self.verbose {
            log::info!("Running: {}", cmd);
        } else {
            log::debug!("Running: {}", cmd);
        }
        for (key, value) in &cmd.env {
            log::trace!("  {}={}", key, value);
        }
    }
}

impl CommandRunner for SystemRunner {
    fn run(&self, cmd: &CommandSpec) -> Result<(), BuildError> {
        self.announce(cmd);
        let output = cmd.to_command().output().map_err(|e| {
            BuildError::Command(format!(
                "Failed to start {}.\n\n\
                 Error: {}\n\n\
                 Ensure the tool is installed and available on PATH.",
                cmd.description, e
            ))
        })?;

        if !output.status.success() {
            let stdout = String::from_utf8_lossy(&output.stdout);
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(BuildError::Command(format!(
                "{} failed.\n\n\
                 Command: {}\n\
                 Exit status: {}\n\n\
                 Stdout:\n{}\n\n\
                 Stderr:\n{}",
                cmd.description,
                cmd,
                output.status,
                tail(&stdout, 40),
                tail(&stderr, 40)
            )));
        }
        Ok(())
    }

    fn capture(&self, cmd: &CommandSpec) -> Result<String, BuildError> {
        self.announce(cmd);
        let output = cmd.to_command().output().map_err(|e| {
            BuildError::Toolchain(format!(
                "Failed to start {}: {}. Ensure Xcode and its command line tools are installed",
                cmd.description, e
            ))
        })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(BuildError::Toolchain(format!(
                "{} exited with {}: {}",
                cmd.description,
                output.status,
                stderr.trim()
            )));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

/// Keeps the last `max_lines` lines of a tool's output; configure and make
/// logs easily run to thousands of lines.
fn tail(text: &str, max_lines: usize) -> String {
    let lines: Vec<&str> = text.lines().collect();
    if lines.len() <= max_lines {
        return text.trim_end().to_string();
    }
    let skipped = lines.len() - max_lines;
    format!(
        "[... {} earlier lines omitted ...]\n{}",
        skipped,
        lines[skipped..].join("\n")
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_quotes_arguments_with_spaces() {
        let cmd = CommandSpec::new("./configure", "configure")
            .arg("--host=arm-apple-darwin")
            .arg("CFLAGS=-arch armv7");
        assert_eq!(
            cmd.to_string(),
            "./configure --host=arm-apple-darwin 'CFLAGS=-arch armv7'"
        );
    }

    #[test]
    fn env_value_prefers_last_override() {
        let cmd = CommandSpec::new("make", "make")
            .env("CFLAGS", "-O0")
            .env("CFLAGS", "-O2");
        assert_eq!(cmd.env_value("CFLAGS"), Some("-O2"));
        assert_eq!(cmd.env_value("LDFLAGS"), None);
    }

    #[test]
    fn program_name_strips_directories() {
        let cmd = CommandSpec::new("/tmp/src/libzmq/configure", "configure");
        assert_eq!(cmd.program_name(), "configure");
    }

    #[test]
    fn run_reports_missing_tool() {
        let cmd = CommandSpec::new("nonexistent-command-12345", "test command");
        let err = SystemRunner::new().run(&cmd).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("Failed to start test command"));
    }

    #[test]
    fn capture_reports_missing_toolchain() {
        let cmd = CommandSpec::new("nonexistent-xcodebuild-12345", "xcodebuild -showsdks");
        let err = SystemRunner::new().capture(&cmd).unwrap_err();
        assert!(matches!(err, BuildError::Toolchain(_)));
    }

    #[test]
    fn tail_keeps_last_lines() {
        let text = (1..=5).map(|i| i.to_string()).collect::<Vec<_>>().join("\n");
        assert_eq!(tail(&text, 10), text);
        let clipped = tail(&text, 2);
        assert!(clipped.starts_with("[... 3 earlier lines omitted ...]"));
        assert!(clipped.ends_with("4\n5"));
    }
}
