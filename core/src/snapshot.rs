//! One command execution: inputs, captured outputs, timing, completion
//! signalling, and the lazily computed diff against the predecessor.

use std::io::Write;
use std::sync::Mutex;
use std::sync::PoisonError;
use std::sync::RwLock;
use std::sync::Weak;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;

use anstyle::AnsiColor;
use anstyle::Color;
use anstyle::Style;
use chrono::DateTime;
use chrono::Local;
use tokio::sync::oneshot;

use crate::diff;
use crate::diff::DiffSpan;
use crate::error::Result;
use crate::error::VidError;

/// Millisecond offset from the session begin timestamp. Strictly increasing
/// across snapshots in one session.
pub type SnapshotId = i64;

const ERROR_STYLE: Style = Style::new().fg_color(Some(Color::Ansi(AnsiColor::Red)));
const QUERY_STYLE: Style = Style::new()
    .fg_color(Some(Color::Ansi(AnsiColor::Black)))
    .bg_color(Some(Color::Ansi(AnsiColor::Yellow)));

/// Final outputs of one execution, written exactly once by the runner.
#[derive(Debug, Default)]
struct ExecState {
    stdout: Vec<u8>,
    stderr: Vec<u8>,
    exit_code: i32,
    error: Option<String>,
    start: Option<DateTime<Local>>,
    end: Option<DateTime<Local>>,
}

/// Captured outcome handed over by the runner on completion.
#[derive(Debug, Default)]
pub struct RunOutcome {
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub exit_code: i32,
    pub error: Option<String>,
}

#[derive(Debug)]
struct DiffCache {
    spans: Vec<DiffSpan>,
    addition_bytes: usize,
    deletion_bytes: usize,
}

/// Immutable record of one execution. Once `completed` is set, every field
/// except the diff cache is final.
pub struct Snapshot {
    id: SnapshotId,

    command: String,
    args: Vec<String>,
    shell: String,
    shell_options: String,

    /// Weak so the chain of predecessors never owns older snapshots; the
    /// store is the only owner.
    before: Option<Weak<Snapshot>>,

    state: RwLock<ExecState>,
    completed: AtomicBool,
    finish: Mutex<Option<oneshot::Sender<()>>>,
    diff: RwLock<Option<DiffCache>>,
}

impl Snapshot {
    pub fn new(
        id: SnapshotId,
        command: &str,
        args: &[String],
        shell: &str,
        shell_options: &str,
        before: Option<Weak<Snapshot>>,
        finish: oneshot::Sender<()>,
    ) -> Self {
        Self {
            id,
            command: command.to_owned(),
            args: args.to_vec(),
            shell: shell.to_owned(),
            shell_options: shell_options.to_owned(),
            before,
            state: RwLock::new(ExecState::default()),
            completed: AtomicBool::new(false),
            finish: Mutex::new(Some(finish)),
            diff: RwLock::new(None),
        }
    }

    pub fn id(&self) -> SnapshotId {
        self.id
    }

    pub fn shell(&self) -> &str {
        &self.shell
    }

    pub fn shell_options(&self) -> &str {
        &self.shell_options
    }

    /// The command and its arguments joined the way the shell will see them.
    pub fn command_line(&self) -> String {
        let mut parts = Vec::with_capacity(1 + self.args.len());
        parts.push(self.command.clone());
        parts.extend(self.args.iter().cloned());
        parts.join(" ")
    }

    pub fn predecessor(&self) -> Option<std::sync::Arc<Snapshot>> {
        self.before.as_ref().and_then(Weak::upgrade)
    }

    pub fn completed(&self) -> bool {
        self.completed.load(Ordering::Acquire)
    }

    pub fn mark_started(&self, at: DateTime<Local>) {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        state.start = Some(at);
    }

    /// Record the outcome, mark the snapshot completed, and fire the one-shot
    /// finish signal. The signal fires before the caller announces the id on
    /// the shared finished queue, so every waiter observes final fields.
    pub fn complete(&self, outcome: RunOutcome) {
        {
            let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
            state.stdout = outcome.stdout;
            state.stderr = outcome.stderr;
            state.exit_code = outcome.exit_code;
            state.error = outcome.error;
            state.end = Some(Local::now());
        }
        self.completed.store(true, Ordering::Release);

        let sender = {
            let mut finish = self.finish.lock().unwrap_or_else(PoisonError::into_inner);
            finish.take()
        };
        if let Some(sender) = sender {
            // The receiver may be gone (clockwork ignores completion).
            let _ = sender.send(());
        }
    }

    pub fn start_time(&self) -> Option<DateTime<Local>> {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .start
    }

    pub fn end_time(&self) -> Option<DateTime<Local>> {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .end
    }

    pub fn exit_code(&self) -> i32 {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .exit_code
    }

    pub fn error(&self) -> Option<String> {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .error
            .clone()
    }

    pub fn stdout_lossy(&self) -> String {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        String::from_utf8_lossy(&state.stdout).into_owned()
    }

    pub fn stderr_lossy(&self) -> String {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        String::from_utf8_lossy(&state.stderr).into_owned()
    }

    pub fn diff_prepared(&self) -> bool {
        self.diff
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// `(addition_bytes, deletion_bytes)` once the diff has been prepared.
    pub fn diff_counts(&self) -> Option<(usize, usize)> {
        self.diff
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(|cache| (cache.addition_bytes, cache.deletion_bytes))
    }

    /// Diff this snapshot's stdout against the predecessor's and cache the
    /// result. Fails with [`VidError::NotCompletedYet`] while the predecessor
    /// is still running; the diff worker retries later.
    pub fn compare_from_before(&self) -> Result<()> {
        let before_stdout = match self.before.as_ref().and_then(Weak::upgrade) {
            Some(before) => {
                if !before.completed() {
                    return Err(VidError::NotCompletedYet);
                }
                before.stdout_lossy()
            }
            None => String::new(),
        };

        let spans = diff::diff_main(&before_stdout, &self.stdout_lossy());
        let cache = DiffCache {
            addition_bytes: diff::addition_bytes(&spans),
            deletion_bytes: diff::deletion_bytes(&spans),
            spans,
        };

        let mut slot = self.diff.write().unwrap_or_else(PoisonError::into_inner);
        *slot = Some(cache);

        Ok(())
    }

    /// Write this snapshot's body as an ANSI-annotated byte stream.
    ///
    /// All-whitespace stdout falls back to stderr styled as an error region.
    /// With `show_diff`, the pretty diff text is used once the predecessor's
    /// completion allows it; otherwise plain stdout. A non-empty `query`
    /// wraps each occurrence in a highlight region.
    pub fn render(&self, w: &mut dyn Write, show_diff: bool, query: &str) -> Result<()> {
        let stdout = self.stdout_lossy();

        if stdout.chars().all(char::is_whitespace) {
            let stderr = self.stderr_lossy();
            write!(
                w,
                "{}{stderr}{}",
                ERROR_STYLE.render(),
                ERROR_STYLE.render_reset()
            )?;
            return Ok(());
        }

        let mut src = stdout;
        if show_diff {
            if !self.diff_prepared() {
                let _ = self.compare_from_before();
            }
            let pretty = self
                .diff
                .read()
                .unwrap_or_else(PoisonError::into_inner)
                .as_ref()
                .map(|cache| diff::pretty_text(&cache.spans));
            if let Some(pretty) = pretty {
                src = pretty;
            }
        }

        if !query.is_empty() {
            src = src.replace(
                query,
                &format!(
                    "{}{query}{}",
                    QUERY_STYLE.render(),
                    QUERY_STYLE.render_reset()
                ),
            );
        }

        w.write_all(src.as_bytes())?;
        Ok(())
    }
}

impl std::fmt::Debug for Snapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Snapshot")
            .field("id", &self.id)
            .field("command", &self.command)
            .field("completed", &self.completed())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use pretty_assertions::assert_eq;

    use super::*;

    fn snapshot(id: SnapshotId, before: Option<&Arc<Snapshot>>) -> Arc<Snapshot> {
        let (finish, _) = oneshot::channel();
        Arc::new(Snapshot::new(
            id,
            "echo",
            &["hello".to_owned()],
            "sh",
            "",
            before.map(Arc::downgrade),
            finish,
        ))
    }

    fn complete_with_stdout(s: &Snapshot, stdout: &str) {
        s.complete(RunOutcome {
            stdout: stdout.as_bytes().to_vec(),
            ..RunOutcome::default()
        });
    }

    #[test]
    fn command_line_joins_args() {
        let s = snapshot(0, None);
        assert_eq!(s.command_line(), "echo hello");
    }

    #[test]
    fn compare_without_predecessor_counts_everything_as_insertion() {
        let s = snapshot(0, None);
        complete_with_stdout(&s, "hello\n");

        s.compare_from_before().expect("diff should succeed");
        assert_eq!(s.diff_counts(), Some((6, 0)));
    }

    #[test]
    fn compare_fails_until_predecessor_completes() {
        let first = snapshot(0, None);
        let second = snapshot(1000, Some(&first));
        complete_with_stdout(&second, "hello\n");

        assert!(matches!(
            second.compare_from_before(),
            Err(VidError::NotCompletedYet)
        ));

        complete_with_stdout(&first, "hello\n");
        second.compare_from_before().expect("diff should succeed");
        assert_eq!(second.diff_counts(), Some((0, 0)));
    }

    #[test]
    fn compare_tracks_additions_and_deletions() {
        let first = snapshot(0, None);
        complete_with_stdout(&first, "hello world");
        let second = snapshot(1000, Some(&first));
        complete_with_stdout(&second, "hello world!");

        second.compare_from_before().expect("diff should succeed");
        assert_eq!(second.diff_counts(), Some((1, 0)));
    }

    #[test]
    fn complete_fires_finish_signal() {
        let (finish, mut rx) = oneshot::channel();
        let s = Snapshot::new(0, "true", &[], "sh", "", None, finish);
        assert!(rx.try_recv().is_err());

        s.complete(RunOutcome::default());
        assert!(s.completed());
        assert!(rx.try_recv().is_ok());
    }

    #[test]
    fn render_prefers_stderr_when_stdout_is_blank() {
        let s = snapshot(0, None);
        s.complete(RunOutcome {
            stdout: b"  \n".to_vec(),
            stderr: b"boom".to_vec(),
            exit_code: 1,
            error: None,
        });

        let mut out = Vec::new();
        s.render(&mut out, false, "").expect("render should succeed");
        let text = String::from_utf8(out).expect("utf8");
        assert!(text.contains("boom"));
        assert!(text.contains("\u{1b}[31m"));
    }

    #[test]
    fn render_highlights_query_matches() {
        let s = snapshot(0, None);
        complete_with_stdout(&s, "alpha beta alpha\n");

        let mut out = Vec::new();
        s.render(&mut out, false, "alpha")
            .expect("render should succeed");
        let text = String::from_utf8(out).expect("utf8");
        assert_eq!(text.matches("\u{1b}[30m\u{1b}[43m").count(), 2);
    }

    #[test]
    fn render_is_idempotent_for_fixed_inputs() {
        let first = snapshot(0, None);
        complete_with_stdout(&first, "one\ntwo\n");
        let second = snapshot(1000, Some(&first));
        complete_with_stdout(&second, "one\nthree\n");

        let mut a = Vec::new();
        let mut b = Vec::new();
        second
            .render(&mut a, true, "three")
            .expect("render should succeed");
        second
            .render(&mut b, true, "three")
            .expect("render should succeed");
        assert_eq!(a, b);
    }

    #[test]
    fn render_falls_back_to_stdout_while_diff_unavailable() {
        let first = snapshot(0, None);
        let second = snapshot(1000, Some(&first));
        complete_with_stdout(&second, "body\n");

        let mut out = Vec::new();
        second
            .render(&mut out, true, "")
            .expect("render should succeed");
        assert_eq!(String::from_utf8(out).expect("utf8"), "body\n");
    }
}
