//! The three interval schedulers. Each one is a task emitting freshly
//! constructed snapshots into a rendezvous-sized queue; backpressure from the
//! consumer is intentional.

use std::sync::Arc;
use std::sync::Weak;
use std::time::Duration;

use chrono::DateTime;
use chrono::Utc;
use tokio::sync::mpsc;
use tokio::sync::oneshot;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::snapshot::Snapshot;
use crate::snapshot::SnapshotId;

/// How executions are paced.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum IntervalMode {
    /// Fire on fixed wall-clock ticks; missed ticks are dropped and
    /// executions may overlap.
    Clockwork,
    /// Wait for completion, then top the elapsed time up to one interval.
    Precise,
    /// Wait for completion, then sleep the full interval.
    #[default]
    Sequential,
}

/// Builds one snapshot for the scheduler: the scheduler supplies only the id,
/// the predecessor link, and the finish signal, and knows nothing about the
/// command being run.
pub type SnapshotFactory =
    Arc<dyn Fn(SnapshotId, Option<Weak<Snapshot>>, oneshot::Sender<()>) -> Arc<Snapshot> + Send + Sync>;

/// Spawn the scheduler for `mode`. While `suspended` holds `true` no new
/// snapshots are emitted; the flag is sampled once per iteration without
/// blocking. Cancelling `cancel` stops the task at its next iteration.
pub fn spawn(
    mode: IntervalMode,
    begin: DateTime<Utc>,
    factory: SnapshotFactory,
    interval: Duration,
    suspended: watch::Receiver<bool>,
    cancel: CancellationToken,
) -> mpsc::Receiver<Arc<Snapshot>> {
    let (tx, rx) = mpsc::channel(1);

    match mode {
        IntervalMode::Clockwork => {
            tokio::spawn(clockwork(begin, factory, interval, suspended, cancel, tx));
        }
        IntervalMode::Precise => {
            tokio::spawn(paced(begin, factory, interval, suspended, cancel, tx, true));
        }
        IntervalMode::Sequential => {
            tokio::spawn(paced(begin, factory, interval, suspended, cancel, tx, false));
        }
    }

    rx
}

/// Wall-clock millisecond offset from the session begin. Two snapshots
/// created within the same millisecond would collide, so ids are bumped to
/// stay strictly increasing.
fn next_id(begin: DateTime<Utc>, last_id: SnapshotId) -> SnapshotId {
    let raw = Utc::now().signed_duration_since(begin).num_milliseconds();
    raw.max(last_id + 1)
}

async fn clockwork(
    begin: DateTime<Utc>,
    factory: SnapshotFactory,
    interval: Duration,
    suspended: watch::Receiver<bool>,
    cancel: CancellationToken,
    tx: mpsc::Sender<Arc<Snapshot>>,
) {
    let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + interval, interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    let mut prev: Option<Arc<Snapshot>> = None;
    let mut last_id: SnapshotId = -1;

    loop {
        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = ticker.tick() => {}
        }

        if *suspended.borrow() {
            continue;
        }

        let id = next_id(begin, last_id);
        last_id = id;

        // Completion of previous snapshots is ignored in this mode.
        let (finish_tx, _finish_rx) = oneshot::channel();
        let snapshot = factory(id, prev.as_ref().map(Arc::downgrade), finish_tx);
        prev = Some(Arc::clone(&snapshot));

        tokio::select! {
            _ = cancel.cancelled() => return,
            sent = tx.send(snapshot) => {
                if sent.is_err() {
                    return;
                }
            }
        }
    }
}

async fn paced(
    begin: DateTime<Utc>,
    factory: SnapshotFactory,
    interval: Duration,
    suspended: watch::Receiver<bool>,
    cancel: CancellationToken,
    tx: mpsc::Sender<Arc<Snapshot>>,
    precise: bool,
) {
    let mut prev: Option<Arc<Snapshot>> = None;
    let mut last_id: SnapshotId = -1;

    loop {
        if cancel.is_cancelled() {
            return;
        }

        if *suspended.borrow() {
            // Sleep one interval per suspended iteration instead of spinning.
            tokio::select! {
                _ = cancel.cancelled() => return,
                _ = tokio::time::sleep(interval) => {}
            }
            continue;
        }

        let started = tokio::time::Instant::now();
        let id = next_id(begin, last_id);
        last_id = id;

        let (finish_tx, finish_rx) = oneshot::channel();
        let snapshot = factory(id, prev.as_ref().map(Arc::downgrade), finish_tx);
        prev = Some(Arc::clone(&snapshot));

        tokio::select! {
            _ = cancel.cancelled() => return,
            sent = tx.send(snapshot) => {
                if sent.is_err() {
                    return;
                }
            }
        }

        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = finish_rx => {}
        }

        let sleep_for = if precise {
            match interval.checked_sub(started.elapsed()) {
                Some(remaining) => remaining,
                // Elapsed exceeded the interval: start the next one now.
                None => continue,
            }
        } else {
            interval
        };

        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = tokio::time::sleep(sleep_for) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::time::Duration;

    use super::*;
    use crate::snapshot::RunOutcome;

    struct Made {
        snapshot: Arc<Snapshot>,
        finish: oneshot::Sender<()>,
    }

    /// Factory that parks every finish sender so tests can complete
    /// snapshots on their own schedule.
    fn parked_factory() -> (SnapshotFactory, Arc<Mutex<Vec<Made>>>) {
        let made: Arc<Mutex<Vec<Made>>> = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&made);
        let factory: SnapshotFactory = Arc::new(move |id, before, finish| {
            let snapshot = Arc::new(Snapshot::new(id, "true", &[], "sh", "", before, finish));
            let (parked_tx, parked_rx) = oneshot::channel();
            let emitted = Arc::clone(&snapshot);
            sink.lock().expect("lock").push(Made {
                snapshot: Arc::clone(&snapshot),
                finish: parked_tx,
            });
            // Forward the parked signal to the scheduler's receiver.
            tokio::spawn(async move {
                if parked_rx.await.is_ok() {
                    emitted.complete(RunOutcome::default());
                }
            });
            snapshot
        });
        (factory, made)
    }

    /// Plain factory whose snapshots keep their finish sender; completing
    /// the snapshot fires it.
    fn plain_factory() -> SnapshotFactory {
        Arc::new(|id, before, finish| {
            Arc::new(Snapshot::new(id, "true", &[], "sh", "", before, finish))
        })
    }

    #[tokio::test(start_paused = true)]
    async fn clockwork_emits_on_every_tick_without_waiting() {
        let (_suspend_tx, suspend_rx) = watch::channel(false);
        let cancel = CancellationToken::new();
        let mut rx = spawn(
            IntervalMode::Clockwork,
            Utc::now(),
            plain_factory(),
            Duration::from_secs(2),
            suspend_rx,
            cancel.clone(),
        );

        // Nothing before the first tick.
        tokio::time::sleep(Duration::from_millis(1900)).await;
        assert!(rx.try_recv().is_err());

        let first = tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .expect("first tick")
            .expect("open channel");
        // No snapshot completed, yet the next ticks still fire.
        let second = tokio::time::timeout(Duration::from_secs(3), rx.recv())
            .await
            .expect("second tick")
            .expect("open channel");
        assert!(first.id() < second.id());
        assert!(second.predecessor().is_some_and(|p| p.id() == first.id()));

        cancel.cancel();
    }

    #[tokio::test(start_paused = true)]
    async fn sequential_waits_for_completion_then_sleeps_full_interval() {
        let (factory, made) = parked_factory();
        let (_suspend_tx, suspend_rx) = watch::channel(false);
        let cancel = CancellationToken::new();
        let mut rx = spawn(
            IntervalMode::Sequential,
            Utc::now(),
            factory,
            Duration::from_secs(1),
            suspend_rx,
            cancel.clone(),
        );

        let first = rx.recv().await.expect("first snapshot");

        // The command is still running: even well past the interval no new
        // snapshot shows up.
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert!(rx.try_recv().is_err());

        // Complete it; the scheduler sleeps one interval, then emits.
        let parked = made.lock().expect("lock").remove(0);
        parked.finish.send(()).expect("scheduler is waiting");
        tokio::time::sleep(Duration::from_millis(900)).await;
        assert!(rx.try_recv().is_err());
        let second = tokio::time::timeout(Duration::from_millis(200), rx.recv())
            .await
            .expect("second snapshot")
            .expect("open channel");
        assert!(second.id() > first.id());

        cancel.cancel();
    }

    #[tokio::test(start_paused = true)]
    async fn precise_restarts_immediately_when_run_outlasts_interval() {
        let (factory, made) = parked_factory();
        let (_suspend_tx, suspend_rx) = watch::channel(false);
        let cancel = CancellationToken::new();
        let mut rx = spawn(
            IntervalMode::Precise,
            Utc::now(),
            factory,
            Duration::from_secs(1),
            suspend_rx,
            cancel.clone(),
        );

        let _first = rx.recv().await.expect("first snapshot");

        // Let the "command" run for three intervals before completing.
        tokio::time::sleep(Duration::from_secs(3)).await;
        let parked = made.lock().expect("lock").remove(0);
        parked.finish.send(()).expect("scheduler is waiting");

        // Elapsed >= interval: the next snapshot starts without extra sleep.
        let _second = tokio::time::timeout(Duration::from_millis(50), rx.recv())
            .await
            .expect("immediate restart")
            .expect("open channel");

        cancel.cancel();
    }

    #[tokio::test(start_paused = true)]
    async fn suspended_scheduler_emits_nothing() {
        let (suspend_tx, suspend_rx) = watch::channel(true);
        let cancel = CancellationToken::new();
        let mut rx = spawn(
            IntervalMode::Sequential,
            Utc::now(),
            plain_factory(),
            Duration::from_millis(100),
            suspend_rx,
            cancel.clone(),
        );

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert!(rx.try_recv().is_err());

        // Lowering the flag resumes emission at the next iteration.
        suspend_tx.send(false).expect("receiver alive");
        let resumed = tokio::time::timeout(Duration::from_millis(300), rx.recv())
            .await
            .expect("resumed")
            .expect("open channel");
        assert!(resumed.id() >= 0);

        cancel.cancel();
    }

    #[tokio::test(start_paused = true)]
    async fn ids_are_strictly_increasing() {
        let (factory, made) = parked_factory();
        let (_suspend_tx, suspend_rx) = watch::channel(false);
        let cancel = CancellationToken::new();
        let mut rx = spawn(
            IntervalMode::Sequential,
            Utc::now(),
            factory,
            Duration::from_millis(20),
            suspend_rx,
            cancel.clone(),
        );

        let mut last = -1;
        for _ in 0..5 {
            let snapshot = rx.recv().await.expect("snapshot");
            assert!(snapshot.id() > last);
            last = snapshot.id();
            let parked = made.lock().expect("lock").remove(0);
            assert_eq!(parked.snapshot.id(), snapshot.id());
            parked.finish.send(()).expect("scheduler is waiting");
        }

        cancel.cancel();
    }
}
