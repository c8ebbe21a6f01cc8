//! Couples scheduler, runner, store, diff worker, and the UI-facing
//! selection model.
//!
//! One loop multiplexes the four queues; it is the only writer of the store
//! and the mode toggles. The renderer and the diff worker read through
//! shared handles. UI interaction funnels in as [`Command`] messages so
//! every mutation stays on the loop.

use std::io::Write;
use std::sync::Arc;
use std::sync::PoisonError;
use std::sync::RwLock;
use std::sync::atomic::AtomicU16;
use std::sync::atomic::Ordering;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::mpsc;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::warn;

use crate::config::Config;
use crate::error::Result;
use crate::error::VidError;
use crate::runner;
use crate::scheduler;
use crate::scheduler::SnapshotFactory;
use crate::snapshot::Snapshot;
use crate::snapshot::SnapshotId;
use crate::store::HistoryStore;

const DIFF_QUEUE_CAPACITY: usize = 100;
const DIFF_RETRY_BACKOFF: Duration = Duration::from_secs(1);
const DEFAULT_BODY_WIDTH: u16 = 80;

/// UI-facing mode toggles. Orthogonal; changing any of them triggers a
/// re-render of the selected snapshot.
#[derive(Clone, Debug)]
pub struct Modes {
    pub is_time_machine: bool,
    pub is_suspend: bool,
    pub is_show_diff: bool,
    pub is_ring_bell: bool,
    pub is_no_title: bool,
    pub is_edit_query: bool,
    pub show_help: bool,
    pub show_log: bool,
    pub unfold: bool,
    pub pty: bool,
    pub skip_empty_diffs: bool,
    pub query: String,
}

impl Modes {
    fn from_config(config: &Config) -> Self {
        Self {
            is_time_machine: false,
            is_suspend: false,
            is_show_diff: config.general.differences,
            is_ring_bell: config.general.bell,
            is_no_title: config.general.no_title,
            is_edit_query: false,
            show_help: false,
            show_log: false,
            unfold: config.general.unfold,
            pty: config.general.pty,
            skip_empty_diffs: config.general.skip_empty_diffs,
            query: String::new(),
        }
    }
}

/// Notifications for the UI; every one of them warrants a redraw.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EngineEvent {
    SnapshotAdded(SnapshotId),
    SnapshotFinished { id: SnapshotId, exit_code: i32 },
    DiffComputed { id: SnapshotId, additions: usize, deletions: usize },
    SelectionChanged(SnapshotId),
}

/// One line of the history table, newest first.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HistoryRow {
    pub id: SnapshotId,
    pub completed: bool,
    pub additions: Option<usize>,
    pub deletions: Option<usize>,
    pub exit_code: Option<i32>,
}

#[derive(Debug)]
enum Command {
    ToggleTimeMachine,
    ToggleSuspend,
    ToggleShowDiff,
    ToggleRingBell,
    ToggleNoTitle,
    ToggleUnfold,
    SetQuery(String),
    SetEditQuery(bool),
    SetShowHelp(bool),
    SetShowLog(bool),
    GoToPast(usize),
    GoToFuture(usize),
    GoToNow,
    GoToOldest,
}

pub struct Controller {
    store: Arc<RwLock<HistoryStore>>,
    modes: Arc<RwLock<Modes>>,
    suspend_tx: watch::Sender<bool>,
    events_tx: mpsc::UnboundedSender<EngineEvent>,

    snapshot_rx: mpsc::Receiver<Arc<Snapshot>>,
    new_tx: mpsc::UnboundedSender<SnapshotId>,
    new_rx: mpsc::UnboundedReceiver<SnapshotId>,
    finished_tx: mpsc::Sender<SnapshotId>,
    finished_rx: mpsc::Receiver<SnapshotId>,
    diff_tx: mpsc::Sender<SnapshotId>,
    commands_rx: mpsc::UnboundedReceiver<Command>,

    body_width: Arc<AtomicU16>,
    cancel: CancellationToken,
}

/// Cloneable read/command surface for the UI thread.
#[derive(Clone)]
pub struct ControllerHandle {
    store: Arc<RwLock<HistoryStore>>,
    modes: Arc<RwLock<Modes>>,
    commands_tx: mpsc::UnboundedSender<Command>,
    body_width: Arc<AtomicU16>,
    cancel: CancellationToken,
}

impl Controller {
    /// Wire up the whole pipeline: scheduler, queues, and the diff worker.
    /// The returned controller still has to be driven with [`Controller::run`].
    pub fn new(
        config: &Config,
    ) -> (Self, ControllerHandle, mpsc::UnboundedReceiver<EngineEvent>) {
        let store = Arc::new(RwLock::new(HistoryStore::new()));
        let modes = Arc::new(RwLock::new(Modes::from_config(config)));
        let body_width = Arc::new(AtomicU16::new(DEFAULT_BODY_WIDTH));
        let cancel = CancellationToken::new();

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (new_tx, new_rx) = mpsc::unbounded_channel();
        let (finished_tx, finished_rx) = mpsc::channel(1);
        let (diff_tx, diff_rx) = mpsc::channel(DIFF_QUEUE_CAPACITY);
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let (suspend_tx, suspend_rx) = watch::channel(false);

        let factory: SnapshotFactory = {
            let command = config.command.clone();
            let args = config.args.clone();
            let shell = config.general.shell.clone();
            let shell_options = config.general.shell_options.clone();
            Arc::new(move |id, before, finish| {
                Arc::new(Snapshot::new(
                    id,
                    &command,
                    &args,
                    &shell,
                    &shell_options,
                    before,
                    finish,
                ))
            })
        };

        let snapshot_rx = scheduler::spawn(
            config.mode,
            Utc::now(),
            factory,
            config.interval,
            suspend_rx,
            cancel.clone(),
        );

        tokio::spawn(diff_worker(
            Arc::clone(&store),
            Arc::clone(&modes),
            diff_rx,
            diff_tx.clone(),
            events_tx.clone(),
            cancel.clone(),
        ));

        let handle = ControllerHandle {
            store: Arc::clone(&store),
            modes: Arc::clone(&modes),
            commands_tx,
            body_width: Arc::clone(&body_width),
            cancel: cancel.clone(),
        };

        let controller = Self {
            store,
            modes,
            suspend_tx,
            events_tx,
            snapshot_rx,
            new_tx,
            new_rx,
            finished_tx,
            finished_rx,
            diff_tx,
            commands_rx,
            body_width,
            cancel,
        };

        (controller, handle, events_rx)
    }

    /// The event loop. Exits when the cancellation token fires.
    pub async fn run(mut self) {
        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => break,
                Some(snapshot) = self.snapshot_rx.recv() => self.on_snapshot(snapshot),
                Some(id) = self.new_rx.recv() => self.on_new(id),
                Some(id) = self.finished_rx.recv() => self.on_finished(id),
                Some(command) = self.commands_rx.recv() => self.on_command(command),
            }
        }
    }

    fn modes_snapshot(&self) -> Modes {
        self.modes
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn emit(&self, event: EngineEvent) {
        let _ = self.events_tx.send(event);
    }

    fn select(&self, id: SnapshotId) {
        {
            let mut store = self.store.write().unwrap_or_else(PoisonError::into_inner);
            store.set_selected_id(id);
        }
        self.emit(EngineEvent::SelectionChanged(id));
    }

    /// Re-apply the selection rules after the history changed.
    fn update_selection(&self) {
        let is_time_machine = self.modes_snapshot().is_time_machine;
        let (latest, selected) = {
            let store = self.store.read().unwrap_or_else(PoisonError::into_inner);
            (store.latest_finished_id(), store.selected_id())
        };

        if is_time_machine {
            if let Some(selected) = selected {
                self.emit(EngineEvent::SelectionChanged(selected));
            }
        } else if let Some(latest) = latest {
            self.select(latest);
        }
    }

    fn on_snapshot(&self, snapshot: Arc<Snapshot>) {
        let id = snapshot.id();

        {
            let mut store = self.store.write().unwrap_or_else(PoisonError::into_inner);
            if !store.append(Arc::clone(&snapshot)) {
                warn!(id, "dropping snapshot with stale id");
                return;
            }
        }

        let _ = self.new_tx.send(id);

        let pty = self.modes_snapshot().pty;
        let width = self.body_width.load(Ordering::Relaxed);
        runner::start(snapshot, self.finished_tx.clone(), width, pty);
    }

    fn on_new(&self, id: SnapshotId) {
        self.emit(EngineEvent::SnapshotAdded(id));

        let is_time_machine = self.modes_snapshot().is_time_machine;
        if is_time_machine {
            self.update_selection();
        } else {
            let target = {
                let store = self.store.read().unwrap_or_else(PoisonError::into_inner);
                store.latest_finished_id().unwrap_or(id)
            };
            self.select(target);
        }
    }

    fn on_finished(&self, id: SnapshotId) {
        let Some(snapshot) = self
            .store
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
        else {
            debug!(id, "finished snapshot is not in the store");
            return;
        };

        self.emit(EngineEvent::SnapshotFinished {
            id,
            exit_code: snapshot.exit_code(),
        });

        // Bounded and non-blocking; a full queue only delays the counts.
        if self.diff_tx.try_send(id).is_err() {
            warn!(id, "diff queue is full, dropping request");
        }

        let is_newest = {
            let store = self.store.read().unwrap_or_else(PoisonError::into_inner);
            match store.latest_finished_id().and_then(|latest| store.get(latest)) {
                Some(latest) => snapshot.start_time() > latest.start_time(),
                None => true,
            }
        };

        if is_newest {
            {
                let mut store = self.store.write().unwrap_or_else(PoisonError::into_inner);
                store.set_latest_finished_id(id);
            }
            self.update_selection();
        }
    }

    fn on_command(&self, command: Command) {
        match command {
            Command::ToggleTimeMachine => {
                let enabled = {
                    let mut modes = self.modes.write().unwrap_or_else(PoisonError::into_inner);
                    modes.is_time_machine = !modes.is_time_machine;
                    modes.is_time_machine
                };
                if enabled {
                    self.refresh_selected();
                } else {
                    // Snap back to the freshest finished snapshot.
                    self.update_selection();
                }
            }
            Command::ToggleSuspend => {
                let suspended = {
                    let mut modes = self.modes.write().unwrap_or_else(PoisonError::into_inner);
                    modes.is_suspend = !modes.is_suspend;
                    modes.is_suspend
                };
                let _ = self.suspend_tx.send(suspended);
                self.refresh_selected();
            }
            Command::ToggleShowDiff => {
                self.with_modes(|modes| modes.is_show_diff = !modes.is_show_diff);
            }
            Command::ToggleRingBell => {
                self.with_modes(|modes| modes.is_ring_bell = !modes.is_ring_bell);
            }
            Command::ToggleNoTitle => {
                self.with_modes(|modes| modes.is_no_title = !modes.is_no_title);
            }
            Command::ToggleUnfold => {
                self.with_modes(|modes| modes.unfold = !modes.unfold);
            }
            Command::SetQuery(query) => {
                self.with_modes(|modes| modes.query = query);
            }
            Command::SetEditQuery(editing) => {
                self.with_modes(|modes| modes.is_edit_query = editing);
            }
            Command::SetShowHelp(show) => {
                self.with_modes(|modes| modes.show_help = show);
            }
            Command::SetShowLog(show) => {
                self.with_modes(|modes| modes.show_log = show);
            }
            Command::GoToPast(rows) => self.navigate(rows as isize),
            Command::GoToFuture(rows) => self.navigate(-(rows as isize)),
            Command::GoToNow => self.go_to_row(0),
            Command::GoToOldest => {
                let count = self.visible_ids().len();
                if count > 0 {
                    self.go_to_row((count - 1) as isize);
                }
            }
        }
    }

    fn with_modes(&self, apply: impl FnOnce(&mut Modes)) {
        {
            let mut modes = self.modes.write().unwrap_or_else(PoisonError::into_inner);
            apply(&mut modes);
        }
        self.refresh_selected();
    }

    /// Re-emit the current selection so the UI re-renders with fresh modes.
    fn refresh_selected(&self) {
        let selected = self
            .store
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .selected_id();
        if let Some(selected) = selected {
            self.emit(EngineEvent::SelectionChanged(selected));
        }
    }

    fn visible_ids(&self) -> Vec<SnapshotId> {
        let skip_empty = self.modes_snapshot().skip_empty_diffs;
        let store = self.store.read().unwrap_or_else(PoisonError::into_inner);
        visible_ids_newest_first(&store, skip_empty)
    }

    fn navigate(&self, delta: isize) {
        let rows = self.visible_ids();
        if rows.is_empty() {
            return;
        }

        let selected = self
            .store
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .selected_id();
        let current = selected
            .and_then(|id| rows.iter().position(|row| *row == id))
            .unwrap_or(0) as isize;
        self.go_to_row(current + delta);
    }

    fn go_to_row(&self, row: isize) {
        let rows = self.visible_ids();
        if rows.is_empty() {
            return;
        }

        let row = row.clamp(0, (rows.len() - 1) as isize) as usize;
        self.select(rows[row]);
    }
}

/// Rows of the history table, newest first; with `skip_empty` set, snapshots
/// whose diff came out empty are hidden (they stay in the store).
fn visible_ids_newest_first(store: &HistoryStore, skip_empty: bool) -> Vec<SnapshotId> {
    store
        .iter()
        .rev()
        .filter(|snapshot| !(skip_empty && snapshot.diff_counts() == Some((0, 0))))
        .map(|snapshot| snapshot.id())
        .collect()
}

/// Computes diffs for finished snapshots. Retries after a fixed backoff while
/// the predecessor is still running; retries are re-enqueued from a side task
/// so other diff work is never starved.
async fn diff_worker(
    store: Arc<RwLock<HistoryStore>>,
    modes: Arc<RwLock<Modes>>,
    mut diff_rx: mpsc::Receiver<SnapshotId>,
    diff_tx: mpsc::Sender<SnapshotId>,
    events_tx: mpsc::UnboundedSender<EngineEvent>,
    cancel: CancellationToken,
) {
    loop {
        let id = tokio::select! {
            _ = cancel.cancelled() => return,
            id = diff_rx.recv() => match id {
                Some(id) => id,
                None => return,
            },
        };

        let Some(snapshot) = store
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
        else {
            continue;
        };

        match snapshot.compare_from_before() {
            Ok(()) => {
                let (additions, deletions) = snapshot.diff_counts().unwrap_or((0, 0));

                if additions > 0 || deletions > 0 {
                    let ring = modes
                        .read()
                        .unwrap_or_else(PoisonError::into_inner)
                        .is_ring_bell;
                    if ring {
                        ring_bell();
                    }
                }

                let _ = events_tx.send(EngineEvent::DiffComputed {
                    id,
                    additions,
                    deletions,
                });
            }
            Err(VidError::NotCompletedYet) => {
                let tx = diff_tx.clone();
                let retry_cancel = cancel.clone();
                tokio::spawn(async move {
                    tokio::select! {
                        _ = retry_cancel.cancelled() => {}
                        _ = tokio::time::sleep(DIFF_RETRY_BACKOFF) => {
                            let _ = tx.send(id).await;
                        }
                    }
                });
            }
            Err(err) => warn!(id, %err, "diff failed"),
        }
    }
}

/// The bell bypasses the widget layer on purpose: a raw 0x07 on the terminal,
/// emitted away from the draw loop.
fn ring_bell() {
    let mut stdout = std::io::stdout();
    let _ = stdout.write_all(&[0x07]);
    let _ = stdout.flush();
}

impl ControllerHandle {
    pub fn modes(&self) -> Modes {
        self.modes
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn selected_id(&self) -> Option<SnapshotId> {
        self.store
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .selected_id()
    }

    pub fn latest_finished_id(&self) -> Option<SnapshotId> {
        self.store
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .latest_finished_id()
    }

    pub fn snapshot_count(&self) -> usize {
        self.store
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .count()
    }

    pub fn start_time_of(&self, id: SnapshotId) -> Option<chrono::DateTime<chrono::Local>> {
        self.store
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
            .and_then(|snapshot| snapshot.start_time())
    }

    /// History rows, newest first, honoring `skip_empty_diffs`.
    pub fn history_rows(&self) -> Vec<HistoryRow> {
        let skip_empty = self.modes().skip_empty_diffs;
        let store = self.store.read().unwrap_or_else(PoisonError::into_inner);
        store
            .iter()
            .rev()
            .filter(|snapshot| !(skip_empty && snapshot.diff_counts() == Some((0, 0))))
            .map(|snapshot| {
                let completed = snapshot.completed();
                let (additions, deletions) = match snapshot.diff_counts() {
                    Some((additions, deletions)) => (Some(additions), Some(deletions)),
                    None => (None, None),
                };
                HistoryRow {
                    id: snapshot.id(),
                    completed,
                    additions,
                    deletions,
                    exit_code: (completed && snapshot.exit_code() > 0)
                        .then(|| snapshot.exit_code()),
                }
            })
            .collect()
    }

    /// Produce the annotated byte stream for a snapshot, honoring the current
    /// diff and query modes. The caller clears the body on error.
    pub fn render_snapshot(&self, id: SnapshotId, sink: &mut dyn Write) -> Result<()> {
        let snapshot = self
            .store
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
            .ok_or(VidError::SnapshotMissing(id))?;

        if !snapshot.completed() {
            return Err(VidError::NotCompletedYet);
        }

        let (show_diff, query) = {
            let modes = self.modes.read().unwrap_or_else(PoisonError::into_inner);
            (modes.is_show_diff, modes.query.clone())
        };

        snapshot.render(sink, show_diff, &query)
    }

    pub fn set_body_width(&self, width: u16) {
        self.body_width.store(width, Ordering::Relaxed);
    }

    pub fn body_width(&self) -> u16 {
        self.body_width.load(Ordering::Relaxed)
    }

    pub fn toggle_time_machine(&self) {
        self.send(Command::ToggleTimeMachine);
    }

    pub fn toggle_suspend(&self) {
        self.send(Command::ToggleSuspend);
    }

    pub fn toggle_show_diff(&self) {
        self.send(Command::ToggleShowDiff);
    }

    pub fn toggle_ring_bell(&self) {
        self.send(Command::ToggleRingBell);
    }

    pub fn toggle_no_title(&self) {
        self.send(Command::ToggleNoTitle);
    }

    pub fn toggle_unfold(&self) {
        self.send(Command::ToggleUnfold);
    }

    pub fn set_query(&self, query: String) {
        self.send(Command::SetQuery(query));
    }

    pub fn set_edit_query(&self, editing: bool) {
        self.send(Command::SetEditQuery(editing));
    }

    pub fn set_show_help(&self, show: bool) {
        self.send(Command::SetShowHelp(show));
    }

    pub fn set_show_log(&self, show: bool) {
        self.send(Command::SetShowLog(show));
    }

    pub fn go_to_past(&self) {
        self.send(Command::GoToPast(1));
    }

    pub fn go_to_future(&self) {
        self.send(Command::GoToFuture(1));
    }

    pub fn go_to_more_past(&self) {
        self.send(Command::GoToPast(10));
    }

    pub fn go_to_more_future(&self) {
        self.send(Command::GoToFuture(10));
    }

    pub fn go_to_now(&self) {
        self.send(Command::GoToNow);
    }

    pub fn go_to_oldest(&self) {
        self.send(Command::GoToOldest);
    }

    /// Stop the pipeline: schedulers exit at their next iteration, running
    /// children are left to finish, the loop drains and returns.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }

    fn send(&self, command: Command) {
        if self.commands_tx.send(command).is_err() {
            debug!("controller loop is gone");
        }
    }
}
