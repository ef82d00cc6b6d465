//! Background loop driving the tracker's reminders.
//!
//! One tokio task waits on whichever comes first: the next armed timer,
//! the reconciliation tick, a re-arm signal from the tracker, or
//! cancellation. The tracker lock is only taken between awaits.

use crate::tracker::{SharedTracker, TaskTracker};
use std::sync::{Arc, MutexGuard};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

pub struct ReminderService {
    tracker: SharedTracker,
    interval: Duration,
    rearm: Arc<Notify>,
    cancel: CancellationToken,
}

impl ReminderService {
    /// Attach a service to `tracker` and register its re-arm signal.
    #[must_use]
    pub fn new(tracker: SharedTracker, interval: Duration) -> Self {
        let rearm = Arc::new(Notify::new());
        match tracker.lock() {
            Ok(mut guard) => guard.set_rearm_signal(Arc::clone(&rearm)),
            Err(e) => warn!("tracker lock poisoned, timers will wait for the next tick: {e}"),
        }
        Self {
            tracker,
            interval,
            rearm,
            cancel: CancellationToken::new(),
        }
    }

    #[must_use]
    pub fn rearm_handle(&self) -> Arc<Notify> {
        Arc::clone(&self.rearm)
    }

    /// Token that stops the loop when cancelled.
    #[must_use]
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Spawn the loop. The first reconciliation pass runs immediately.
    pub fn run(self) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            info!("reminder service started, reconciling every {:?}", self.interval);
            let mut ticker = tokio::time::interval(self.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                let wait = self.until_next_timer();
                tokio::select! {
                    () = self.cancel.cancelled() => break,
                    _ = ticker.tick() => self.on_tick(),
                    () = sleep_for(wait) => self.on_timer(),
                    () = self.rearm.notified() => debug!("timers re-armed"),
                }
            }
            info!("reminder service stopped");
        })
    }

    fn lock(&self) -> Option<MutexGuard<'_, TaskTracker>> {
        match self.tracker.lock() {
            Ok(guard) => Some(guard),
            Err(e) => {
                error!("tracker lock poisoned: {e}");
                None
            }
        }
    }

    fn until_next_timer(&self) -> Option<Duration> {
        let tracker = self.lock()?;
        let deadline = tracker.next_timer_deadline()?;
        Some((deadline - tracker.now()).to_std().unwrap_or(Duration::ZERO))
    }

    fn on_tick(&self) {
        let Some(mut tracker) = self.lock() else {
            return;
        };
        if let Err(e) = tracker.reconcile() {
            error!("reconciliation pass failed: {e}");
        }
        match tracker.backup_if_due() {
            Ok(Some(info)) => info!("daily backup written for {}", info.date),
            Ok(None) => {}
            Err(e) => error!("daily backup failed: {e}"),
        }
    }

    fn on_timer(&self) {
        let Some(mut tracker) = self.lock() else {
            return;
        };
        if let Err(e) = tracker.fire_due_timers() {
            error!("reminder timer delivery failed: {e}");
        }
    }
}

async fn sleep_for(wait: Option<Duration>) {
    match wait {
        Some(duration) => tokio::time::sleep(duration).await,
        None => std::future::pending().await,
    }
}
