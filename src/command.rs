//! External process invocation.
//!
//! Command lines are handed to the platform shell (`cmd /S /C` on Windows,
//! `sh -c` elsewhere) and waited on synchronously. There is no timeout.

use crate::{log, logging::describe_exit_code};
use std::{
    fmt, io,
    path::Path,
    process::{Command, Output, Stdio},
};

/// A command ran but exited unsuccessfully.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandFailed {
    pub command: String,
    /// Exit code, `None` when the process was killed by a signal.
    pub code: Option<i32>,
}

impl fmt::Display for CommandFailed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "command failed [{}]: {}", describe_exit_code(self.code), self.command)
    }
}

impl std::error::Error for CommandFailed {}

impl CommandFailed {
    /// Finds a `CommandFailed` wrapped inside an `io::Error`.
    pub fn from_io(err: &io::Error) -> Option<&CommandFailed> {
        err.get_ref().and_then(|inner| inner.downcast_ref::<CommandFailed>())
    }
}

/// The raw argument string handed to `cmd.exe` for `command_line`.
///
/// With `/S`, cmd strips exactly the outer quote pair and runs the rest
/// verbatim, so lines that both start and end with a quoted path survive.
#[cfg_attr(not(windows), allow(dead_code))]
pub fn cmd_arguments(command_line: &str) -> String {
    format!("/S /C \"{}\"", command_line)
}

/// Builds the shell invocation for `command_line`.
pub fn shell_command(command_line: &str) -> Command {
    #[cfg(windows)]
    {
        use std::os::windows::process::CommandExt;
        let mut cmd = Command::new("cmd");
        cmd.raw_arg(cmd_arguments(command_line));
        cmd
    }
    #[cfg(not(windows))]
    {
        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg(command_line);
        cmd
    }
}

/// Runs `command_line` in `working_dir`, inheriting stdio, and waits for it.
///
/// # Errors
/// Spawn failures propagate the OS error. A non-zero exit becomes a
/// [`CommandFailed`] wrapped in `io::Error`.
pub fn run(command_line: &str, working_dir: &Path) -> io::Result<()> {
    log!(">> Running {}", command_line);
    let status = shell_command(command_line).current_dir(working_dir).status()?;
    if status.success() {
        Ok(())
    } else {
        Err(io::Error::other(CommandFailed {
            command: command_line.to_string(),
            code: status.code(),
        }))
    }
}

/// Runs a prepared command and returns its stdout. `display` names it in errors.
///
/// Stderr is passed through to ours.
#[cfg_attr(not(windows), allow(dead_code))]
pub fn capture_output(mut cmd: Command, display: &str) -> io::Result<Vec<u8>> {
    let Output { status, stdout, .. } = cmd.stdin(Stdio::null()).stderr(Stdio::inherit()).output()?;
    if status.success() {
        Ok(stdout)
    } else {
        Err(io::Error::other(CommandFailed {
            command: display.to_string(),
            code: status.code(),
        }))
    }
}
