//! Executes one snapshot's command and announces completion.
//!
//! The runner returns as soon as the child is handed off to a waiter task,
//! so overlapping executions (clockwork mode) never block the controller.
//! On completion the waiter fires the snapshot's one-shot finish signal and
//! then sends the id on the shared finished queue.

use std::io;
use std::io::Read;
use std::process::Stdio;
use std::sync::Arc;

use chrono::Local;
use portable_pty::CommandBuilder;
use portable_pty::PtySize;
use portable_pty::native_pty_system;
use tokio::process::Command;
use tokio::sync::mpsc;
use tracing::debug;
use tracing::warn;

use crate::error::Result;
use crate::error::VidError;
use crate::snapshot::RunOutcome;
use crate::snapshot::Snapshot;
use crate::snapshot::SnapshotId;

/// Start the snapshot's command. Completion — including failure to spawn —
/// always marks the snapshot completed and fires both completion signals, so
/// the schedulers never deadlock on a broken command.
pub fn start(
    snapshot: Arc<Snapshot>,
    finished_tx: mpsc::Sender<SnapshotId>,
    width: u16,
    use_pty: bool,
) {
    tokio::spawn(async move {
        snapshot.mark_started(Local::now());

        let outcome = if use_pty {
            run_on_pty(&snapshot, width).await
        } else {
            run_piped(&snapshot).await
        };

        match outcome {
            Ok(outcome) => snapshot.complete(outcome),
            Err(err) => {
                debug!(id = snapshot.id(), %err, "command failed to run");
                snapshot.complete(RunOutcome {
                    stdout: Vec::new(),
                    stderr: err.to_string().into_bytes(),
                    exit_code: -1,
                    error: Some(err.to_string()),
                });
            }
        }

        if finished_tx.send(snapshot.id()).await.is_err() {
            warn!(id = snapshot.id(), "finished queue is closed");
        }
    });
}

/// `[command, args…]` wrapped for the platform shell: POSIX runs
/// `shell [shell_options…] -c "command args…"`, Windows runs
/// `%COMSPEC% /c "command args…"` and ignores the shell settings.
fn assemble(snapshot: &Snapshot) -> (String, Vec<String>) {
    let joined = snapshot.command_line();

    if cfg!(windows) {
        let comspec = std::env::var("COMSPEC").unwrap_or_else(|_| "cmd".to_owned());
        (comspec, vec!["/c".to_owned(), joined])
    } else {
        let mut args: Vec<String> = snapshot
            .shell_options()
            .split_whitespace()
            .map(str::to_owned)
            .collect();
        args.push("-c".to_owned());
        args.push(joined);
        (snapshot.shell().to_owned(), args)
    }
}

async fn run_piped(snapshot: &Snapshot) -> Result<RunOutcome> {
    let (program, args) = assemble(snapshot);

    let mut command = Command::new(program);
    command
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    let child = command.spawn().map_err(VidError::CommandStartFailed)?;
    let output = child
        .wait_with_output()
        .await
        .map_err(VidError::ChildWaitFailed)?;

    Ok(RunOutcome {
        stdout: output.stdout,
        stderr: output.stderr,
        exit_code: exit_code_of(&output.status),
        error: None,
    })
}

/// Attach the child to a pseudo-terminal as wide as the body view and capture
/// its combined output as stdout. Runs on the blocking pool; the pty stack is
/// synchronous.
async fn run_on_pty(snapshot: &Snapshot, width: u16) -> Result<RunOutcome> {
    let (program, args) = assemble(snapshot);

    let joined = tokio::task::spawn_blocking(move || -> Result<RunOutcome> {
        let pty_system = native_pty_system();
        let pair = pty_system
            .openpty(PtySize {
                rows: 24,
                cols: width.max(1),
                pixel_width: 0,
                pixel_height: 0,
            })
            .map_err(|err| VidError::CommandStartFailed(io::Error::other(err)))?;

        let mut builder = CommandBuilder::new(program);
        builder.args(args);

        let mut child = pair
            .slave
            .spawn_command(builder)
            .map_err(|err| VidError::CommandStartFailed(io::Error::other(err)))?;
        // The child owns its copies of the slave end now; dropping ours lets
        // the reader observe EOF when the child exits.
        drop(pair.slave);

        let mut reader = pair
            .master
            .try_clone_reader()
            .map_err(|err| VidError::CommandStartFailed(io::Error::other(err)))?;

        let mut stdout = Vec::new();
        let _ = reader.read_to_end(&mut stdout);

        let status = child
            .wait()
            .map_err(|err| VidError::ChildWaitFailed(io::Error::other(err)))?;

        Ok(RunOutcome {
            stdout,
            stderr: Vec::new(),
            exit_code: status.exit_code() as i32,
            error: None,
        })
    })
    .await;

    match joined {
        Ok(outcome) => outcome,
        Err(err) => Err(VidError::ChildWaitFailed(io::Error::other(err))),
    }
}

#[cfg(unix)]
fn exit_code_of(status: &std::process::ExitStatus) -> i32 {
    use std::os::unix::process::ExitStatusExt;

    match status.code() {
        Some(code) => code,
        // Conventional shell mapping for signal deaths: 128 + signal.
        None => status.signal().map_or(-1, |signal| 128 + signal),
    }
}

#[cfg(not(unix))]
fn exit_code_of(status: &std::process::ExitStatus) -> i32 {
    status.code().unwrap_or(-1)
}
