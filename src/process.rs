//! Command execution helpers.
//!
//! [`Cmd`] wraps [`std::process::Command`] with the error reporting every
//! recipe wants: a failing command turns into an `anyhow` error carrying the
//! command line, the exit code and the tail of its output.

use anyhow::{bail, Context, Result};
use std::collections::VecDeque;
use std::ffi::{OsStr, OsString};
use std::fs::{self, File};
use std::io::{self, BufRead, BufReader, Write};
use std::path::PathBuf;
use std::process::{ChildStderr, Command, Stdio};

/// Lines of command output quoted in a failure error.
const ERROR_TAIL_LINES: usize = 20;

/// Builder for an external command.
#[derive(Debug, Clone)]
pub struct Cmd {
    program: OsString,
    args: Vec<OsString>,
    envs: Vec<(OsString, OsString)>,
    cwd: Option<PathBuf>,
    log_file: Option<PathBuf>,
    error_msg: Option<String>,
}

impl Cmd {
    pub fn new(program: impl AsRef<OsStr>) -> Self {
        Self {
            program: program.as_ref().to_os_string(),
            args: Vec::new(),
            envs: Vec::new(),
            cwd: None,
            log_file: None,
            error_msg: None,
        }
    }

    pub fn arg(mut self, arg: impl AsRef<OsStr>) -> Self {
        self.args.push(arg.as_ref().to_os_string());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        self.args
            .extend(args.into_iter().map(|a| a.as_ref().to_os_string()));
        self
    }

    pub fn env(mut self, key: impl AsRef<OsStr>, value: impl AsRef<OsStr>) -> Self {
        self.envs
            .push((key.as_ref().to_os_string(), value.as_ref().to_os_string()));
        self
    }

    pub fn envs<I, K, V>(mut self, vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<OsStr>,
        V: AsRef<OsStr>,
    {
        for (k, v) in vars {
            self = self.env(k, v);
        }
        self
    }

    pub fn dir(mut self, cwd: impl Into<PathBuf>) -> Self {
        self.cwd = Some(cwd.into());
        self
    }

    /// Send stdout and stderr of [`Cmd::run_interactive`] to a log file.
    pub fn log_to(mut self, path: impl Into<PathBuf>) -> Self {
        self.log_file = Some(path.into());
        self
    }

    /// Message used as the head of the error when the command fails.
    pub fn error_msg(mut self, msg: impl Into<String>) -> Self {
        self.error_msg = Some(msg.into());
        self
    }

    /// Shell-like rendering of the command, used for progress and pretend output.
    pub fn display(&self) -> String {
        let mut parts = Vec::new();
        for (k, v) in &self.envs {
            parts.push(format!(
                "{}={}",
                k.to_string_lossy(),
                quote(&v.to_string_lossy())
            ));
        }
        parts.push(quote(&self.program.to_string_lossy()));
        for a in &self.args {
            parts.push(quote(&a.to_string_lossy()));
        }
        parts.join(" ")
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args);
        for (k, v) in &self.envs {
            cmd.env(k, v);
        }
        if let Some(cwd) = &self.cwd {
            cmd.current_dir(cwd);
        }
        cmd
    }

    /// Run with stdout inherited (or sent to the log file), so long builds
    /// show progress.
    ///
    /// On failure the error quotes the last lines of the log file, or of
    /// stderr when there is no log. Unlogged stderr is still passed through
    /// to the terminal as it arrives.
    pub fn run_interactive(&self) -> Result<()> {
        let mut cmd = self.command();

        let (status, output_section) = if let Some(log) = &self.log_file {
            let out = File::create(log)
                .with_context(|| format!("Failed to create log file {}", log.display()))?;
            let err = out
                .try_clone()
                .with_context(|| format!("Failed to clone log handle {}", log.display()))?;
            cmd.stdout(Stdio::from(out)).stderr(Stdio::from(err));

            let status = cmd
                .status()
                .with_context(|| format!("Failed to execute {}", self.display()))?;
            if status.success() {
                return Ok(());
            }
            let tail = fs::read(log)
                .map(|bytes| tail_lines(&String::from_utf8_lossy(&bytes)))
                .unwrap_or_default();
            (status, format!("\n  Log: {}{}", log.display(), indent(&tail)))
        } else {
            cmd.stdout(Stdio::inherit()).stderr(Stdio::piped());
            let mut child = cmd
                .spawn()
                .with_context(|| format!("Failed to execute {}", self.display()))?;
            let stderr = child
                .stderr
                .take()
                .map(tee_stderr)
                .unwrap_or_default();
            let status = child
                .wait()
                .with_context(|| format!("Failed to wait for {}", self.display()))?;
            (status, format!("\n  stderr:{}", indent(&stderr)))
        };

        if !status.success() {
            bail!(
                "{}\n  Command: {}\n  Exit code: {}{}",
                self.error_msg
                    .clone()
                    .unwrap_or_else(|| format!("command failed: {}", self.display())),
                self.display(),
                status.code().unwrap_or(-1),
                output_section
            );
        }
        Ok(())
    }
}

/// Copy a child's stderr to ours, keeping the last lines for error reports.
fn tee_stderr(stderr: ChildStderr) -> Vec<String> {
    let mut reader = BufReader::new(stderr);
    let mut tail = VecDeque::with_capacity(ERROR_TAIL_LINES);
    let mut line = Vec::new();
    loop {
        line.clear();
        match reader.read_until(b'\n', &mut line) {
            Ok(0) | Err(_) => break,
            Ok(_) => {
                let _ = io::stderr().write_all(&line);
                if tail.len() == ERROR_TAIL_LINES {
                    tail.pop_front();
                }
                tail.push_back(String::from_utf8_lossy(&line).trim_end().to_string());
            }
        }
    }
    tail.into()
}

fn tail_lines(text: &str) -> Vec<String> {
    let lines: Vec<&str> = text.lines().collect();
    let skip = lines.len().saturating_sub(ERROR_TAIL_LINES);
    lines[skip..].iter().map(|l| l.to_string()).collect()
}

fn indent(lines: &[String]) -> String {
    lines.iter().map(|l| format!("\n    {l}")).collect()
}

fn quote(s: &str) -> String {
    if !s.is_empty()
        && s
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_./=:,+@%".contains(c))
    {
        s.to_string()
    } else {
        format!("'{}'", s.replace('\'', "'\\''"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_quotes_only_when_needed() {
        let cmd = Cmd::new("make")
            .env("CFLAGS", "-O2 -g")
            .arg("bbl")
            .arg("OBJCOPY=/sdk/bin/llvm-objcopy");
        assert_eq!(
            cmd.display(),
            "CFLAGS='-O2 -g' make bbl OBJCOPY=/sdk/bin/llvm-objcopy"
        );
    }

    #[test]
    fn test_failure_quotes_stderr() {
        let err = Cmd::new("sh")
            .args(["-c", "echo compiling; echo 'bbl.c:12: error: boom' >&2; exit 2"])
            .error_msg("make bbl failed")
            .run_interactive()
            .unwrap_err()
            .to_string();
        assert!(err.starts_with("make bbl failed"));
        assert!(err.contains("Exit code: 2"));
        // Only stderr is quoted; stdout went to the terminal.
        assert!(err.ends_with("stderr:\n    bbl.c:12: error: boom"));
    }

    #[test]
    fn test_stderr_tail_is_bounded() {
        let err = Cmd::new("sh")
            .args(["-c", "i=0; while [ $i -lt 50 ]; do echo line$i >&2; i=$((i+1)); done; exit 1"])
            .run_interactive()
            .unwrap_err()
            .to_string();
        assert!(err.contains("line49"));
        assert!(err.contains("line30"));
        assert!(!err.contains("line29"));
    }

    #[test]
    fn test_run_interactive_writes_log() {
        let temp = tempfile::tempdir().unwrap();
        let log = temp.path().join("build.common.log");
        Cmd::new("sh")
            .args(["-c", "echo building"])
            .dir(temp.path())
            .log_to(&log)
            .run_interactive()
            .unwrap();
        assert_eq!(std::fs::read_to_string(&log).unwrap().trim(), "building");
    }

    #[test]
    fn test_logged_failure_quotes_log_tail() {
        let temp = tempfile::tempdir().unwrap();
        let log = temp.path().join("build.libelf.log");
        let err = Cmd::new("sh")
            .args(["-c", "echo 'cc -c elf.c'; echo 'elf.c:3: error: boom' >&2; exit 1"])
            .log_to(&log)
            .run_interactive()
            .unwrap_err()
            .to_string();
        assert!(err.contains(&format!("Log: {}", log.display())));
        assert!(err.contains("\n    cc -c elf.c"));
        assert!(err.contains("\n    elf.c:3: error: boom"));
    }

    #[test]
    fn test_env_and_dir_are_passed() {
        let temp = tempfile::tempdir().unwrap();
        Cmd::new("sh")
            .args(["-c", "printf %s \"$OBJCOPY\" > objcopy"])
            .env("OBJCOPY", "/sdk/bin/llvm-objcopy")
            .dir(temp.path())
            .run_interactive()
            .unwrap();
        assert_eq!(
            std::fs::read_to_string(temp.path().join("objcopy")).unwrap(),
            "/sdk/bin/llvm-objcopy"
        );
    }

    #[test]
    fn test_missing_program_is_error() {
        let err = Cmd::new("definitely_not_a_real_command_12345")
            .run_interactive()
            .unwrap_err()
            .to_string();
        assert!(err.contains("Failed to execute"));
    }
}
