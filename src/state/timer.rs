//! Countdown timers driving the match phases.
//!
//! [`Countdown`] is the pure tick model; [`PhaseTimer`] runs one on a Tokio
//! interval, reports every tick and resolves with a [`TimerOutcome`].

use std::{fmt, time::Duration};

use tokio::{
    sync::watch,
    task::JoinHandle,
    time::{Instant, MissedTickBehavior, interval, sleep_until},
};
use tracing::warn;

const MIN_STEP: Duration = Duration::from_millis(1);

/// Remaining time as displayed by timer views.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Remaining {
    /// Whole seconds left.
    pub seconds: u32,
    /// Tenths of the current second left.
    pub tenths: u32,
}

impl fmt::Display for Remaining {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.seconds, self.tenths)
    }
}

/// Countdown advanced in fixed steps of real time.
///
/// Time left is tracked as a duration, so any step length keeps the displayed
/// seconds aligned with real seconds.
#[derive(Debug, Clone)]
pub struct Countdown {
    remaining: Duration,
    step: Duration,
}

impl Countdown {
    /// Start a countdown of `seconds`, consuming `step` per tick.
    pub fn new(seconds: u32, step: Duration) -> Self {
        Self {
            remaining: Duration::from_secs(u64::from(seconds)),
            step: step.max(MIN_STEP),
        }
    }

    /// Consume one step and return what is left.
    pub fn tick(&mut self) -> Remaining {
        self.remaining = self.remaining.saturating_sub(self.step);
        self.remaining()
    }

    /// Drop whatever is left of the last, partial step.
    pub fn finish(&mut self) -> Remaining {
        self.remaining = Duration::ZERO;
        self.remaining()
    }

    /// Time left without advancing.
    pub fn remaining(&self) -> Remaining {
        Remaining {
            seconds: u32::try_from(self.remaining.as_secs()).unwrap_or(u32::MAX),
            tenths: self.remaining.subsec_millis() / 100,
        }
    }

    /// Whether the countdown reached zero.
    pub fn is_finished(&self) -> bool {
        self.remaining.is_zero()
    }
}

/// Owner side of a cancellation flag.
#[derive(Debug)]
pub struct Canceller {
    tx: watch::Sender<bool>,
}

impl Default for Canceller {
    fn default() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx }
    }
}

impl Canceller {
    /// Create a flag that is not cancelled yet.
    pub fn new() -> Self {
        Self::default()
    }

    /// Hand out a receiver observing this flag.
    pub fn signal(&self) -> CancelSignal {
        CancelSignal {
            rx: self.tx.subscribe(),
        }
    }

    /// Raise the flag. Idempotent.
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }

    /// Whether [`Canceller::cancel`] has been called.
    pub fn is_cancelled(&self) -> bool {
        *self.tx.borrow()
    }
}

/// Receiver side of a [`Canceller`]. Dropping the owner counts as cancellation.
#[derive(Debug, Clone)]
pub struct CancelSignal {
    rx: watch::Receiver<bool>,
}

impl CancelSignal {
    /// Current value of the flag.
    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolve once the flag is raised or its owner is gone.
    pub async fn cancelled(&mut self) {
        loop {
            if *self.rx.borrow_and_update() {
                return;
            }
            if self.rx.changed().await.is_err() {
                return;
            }
        }
    }
}

/// How a phase timer stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerOutcome {
    /// Reached zero; the completion callback (if any) ran.
    Completed,
    /// Stopped early; the completion callback did not run.
    Cancelled,
}

/// Handle to a running [`PhaseTimer`].
#[derive(Debug)]
pub struct TimerHandle {
    own: Canceller,
    join: JoinHandle<TimerOutcome>,
}

impl TimerHandle {
    /// Stop this timer without running its completion callback.
    pub fn cancel(&self) {
        self.own.cancel();
    }

    /// Wait for the timer to stop and report how it stopped.
    pub async fn finished(self) -> TimerOutcome {
        match self.join.await {
            Ok(outcome) => outcome,
            Err(err) => {
                warn!(error = %err, "phase timer task failed");
                TimerOutcome::Cancelled
            }
        }
    }
}

/// Restartable countdown bound to a tick interval.
#[derive(Debug, Clone, Copy)]
pub struct PhaseTimer {
    seconds: u32,
    tick_interval: Duration,
}

impl PhaseTimer {
    /// Describe a countdown of `seconds` ticking every `tick_interval`.
    pub fn new(seconds: u32, tick_interval: Duration) -> Self {
        Self {
            seconds,
            tick_interval: tick_interval.max(MIN_STEP),
        }
    }

    /// Spawn the countdown.
    ///
    /// `on_tick` runs after every tick with the remaining time. `on_complete`
    /// runs exactly once when zero is reached, never after cancellation through
    /// the returned handle or `match_cancel`.
    pub fn start<T, C>(
        self,
        mut on_tick: T,
        on_complete: Option<C>,
        mut match_cancel: CancelSignal,
    ) -> TimerHandle
    where
        T: FnMut(Remaining) + Send + 'static,
        C: FnOnce() + Send + 'static,
    {
        let own = Canceller::new();
        let mut own_signal = own.signal();
        let tick_interval = self.tick_interval;
        let seconds = self.seconds;

        let join = tokio::spawn(async move {
            let mut countdown = Countdown::new(seconds, tick_interval);
            let deadline = Instant::now() + Duration::from_secs(u64::from(seconds));
            let expiry = sleep_until(deadline);
            tokio::pin!(expiry);
            let mut ticker = interval(tick_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick of a Tokio interval fires immediately.
            ticker.tick().await;

            while !countdown.is_finished() {
                tokio::select! {
                    biased;
                    _ = match_cancel.cancelled() => return TimerOutcome::Cancelled,
                    _ = own_signal.cancelled() => return TimerOutcome::Cancelled,
                    _ = ticker.tick() => on_tick(countdown.tick()),
                    // Steps that do not divide the length leave a partial last step.
                    _ = &mut expiry => on_tick(countdown.finish()),
                }
            }

            if match_cancel.is_cancelled() || own_signal.is_cancelled() {
                return TimerOutcome::Cancelled;
            }
            if let Some(on_complete) = on_complete {
                on_complete();
            }
            TimerOutcome::Completed
        });

        TimerHandle { own, join }
    }
}
