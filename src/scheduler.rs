use crate::fetch::Fetcher;
use crate::sink::LogSink;
use std::future::Future;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

/// Lifecycle of a [`Scheduler`]. Transitions only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    Idle,
    Running,
    ShuttingDown,
    Stopped,
}

/// Fixed-period loop driving one fetch + deliver cycle per tick.
///
/// Ticks are handled inline, so a slow cycle delays the next tick rather
/// than overlapping with it. Cycle failures are logged and counted on the
/// sink's instruments; they never stop the loop.
pub struct Scheduler {
    period: Duration,
    state: watch::Sender<SchedulerState>,
}

impl Scheduler {
    pub fn new(period: Duration) -> Self {
        let (state, _) = watch::channel(SchedulerState::Idle);
        Scheduler { period, state }
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    pub fn state(&self) -> SchedulerState {
        *self.state.borrow()
    }

    /// Observe state transitions.
    pub fn subscribe(&self) -> watch::Receiver<SchedulerState> {
        self.state.subscribe()
    }

    /// Run until `shutdown` resolves or `cancel` fires.
    ///
    /// Resolving `shutdown` cancels `cancel` right away, even mid-tick, so an
    /// in-flight cycle sharing the token is abandoned. That cycle is still
    /// awaited to completion before the loop exits. The first tick fires one
    /// full period after start.
    pub async fn run<F, S>(
        &self,
        fetcher: &F,
        sink: &dyn LogSink,
        cancel: &CancellationToken,
        shutdown: S,
    ) where
        F: Fetcher + ?Sized,
        S: Future<Output = ()>,
    {
        self.state.send_replace(SchedulerState::Running);

        let mut ticker = interval_at(Instant::now() + self.period, self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tokio::pin!(shutdown);
        let mut signalled = false;

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    info!("context cancelled, stopping scheduler");
                    break;
                }
                _ = &mut shutdown, if !signalled => {
                    info!("received shutdown signal, exiting");
                    cancel.cancel();
                    break;
                }
                _ = ticker.tick() => {
                    let tick = self.tick(fetcher, sink, cancel);
                    tokio::pin!(tick);
                    tokio::select! {
                        biased;
                        _ = &mut tick => {}
                        _ = &mut shutdown, if !signalled => {
                            info!("received shutdown signal during delivery cycle, cancelling");
                            signalled = true;
                            cancel.cancel();
                            tick.await;
                        }
                    }
                }
            }
        }

        self.state.send_replace(SchedulerState::ShuttingDown);
        self.state.send_replace(SchedulerState::Stopped);
    }

    async fn tick<F>(&self, fetcher: &F, sink: &dyn LogSink, cancel: &CancellationToken)
    where
        F: Fetcher + ?Sized,
    {
        let start = Instant::now();
        let result = fetcher.fetch_and_deliver(cancel, sink).await;
        let elapsed = start.elapsed();

        match result {
            Ok(()) => {
                debug!(?elapsed, "delivery cycle finished");
                if let Some(instruments) = sink.instruments() {
                    instruments.record_fetch_duration(elapsed);
                }
            }
            Err(e) => {
                error!(error = %e, ?elapsed, "error fetching and pushing data");
                if let Some(instruments) = sink.instruments() {
                    instruments.record_push_error();
                }
            }
        }
    }
}
