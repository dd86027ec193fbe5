//! Shared subprocess execution for the external tools.
//!
//! Every collaborator builds a [`tokio::process::Command`] for its tool and
//! delegates spawning, output routing and exit-status checking to
//! [`run_command`].

use std::process::{ExitStatus, Stdio};
use std::time::Instant;

use tokio::process::Command;

use crate::error::WorkspaceError;

/// How much subprocess output reaches the terminal.
///
/// | Level | stdout | stderr |
/// |-------|--------|--------|
/// | 0     | hidden | hidden |
/// | 1     | shown  | hidden |
/// | 2+    | shown  | shown  |
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord)]
pub struct Verbosity(pub u8);

impl Verbosity {
    pub const QUIET: Self = Self(0);

    pub fn shows_stdout(self) -> bool {
        self.0 > 0
    }

    pub fn shows_stderr(self) -> bool {
        self.0 > 1
    }

    fn stdio(shown: bool) -> Stdio {
        if shown {
            Stdio::inherit()
        } else {
            Stdio::null()
        }
    }
}

/// Name of the program a command runs, for logs and errors.
pub fn program_name(cmd: &Command) -> String {
    cmd.as_std().get_program().to_string_lossy().into_owned()
}

/// Run `cmd` to completion and fail unless it exits successfully.
///
/// The child's stdin is closed and its output is routed according to
/// `verbosity`. The child is killed if the returned future is dropped.
pub async fn run_command(cmd: &mut Command, verbosity: Verbosity) -> Result<(), WorkspaceError> {
    let program = prepare(cmd, verbosity);
    cmd.stdout(Verbosity::stdio(verbosity.shows_stdout()));

    let start = Instant::now();
    let status = cmd
        .status()
        .await
        .map_err(|source| WorkspaceError::Spawn {
            program: program.clone(),
            source,
        })?;
    check_status(program, status, start)
}

/// Run `cmd` to completion and return what it printed on stdout.
///
/// stderr follows `verbosity`; failures are reported as by
/// [`run_command`].
pub async fn command_output(
    cmd: &mut Command,
    verbosity: Verbosity,
) -> Result<String, WorkspaceError> {
    let program = prepare(cmd, verbosity);
    cmd.stdout(Stdio::piped());

    let start = Instant::now();
    let output = cmd
        .output()
        .await
        .map_err(|source| WorkspaceError::Spawn {
            program: program.clone(),
            source,
        })?;
    check_status(program, output.status, start)?;
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

fn prepare(cmd: &mut Command, verbosity: Verbosity) -> String {
    let program = program_name(cmd);
    cmd.stdin(Stdio::null())
        .stderr(Verbosity::stdio(verbosity.shows_stderr()))
        .kill_on_drop(true);

    let args: Vec<String> = cmd
        .as_std()
        .get_args()
        .map(|a| a.to_string_lossy().into_owned())
        .collect();
    tracing::debug!(program = %program, args = ?args, "Running command");
    program
}

fn check_status(program: String, status: ExitStatus, start: Instant) -> Result<(), WorkspaceError> {
    let duration_ms = start.elapsed().as_millis() as u64;

    if !status.success() {
        // `-1` if killed by signal.
        let exit_code = status.code().unwrap_or(-1);
        tracing::error!(program = %program, exit_code, duration_ms, "Command failed");
        return Err(WorkspaceError::CommandFailed { program, exit_code });
    }

    tracing::debug!(program = %program, duration_ms, "Command finished");
    Ok(())
}
