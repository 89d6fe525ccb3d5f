use anyhow::{bail, Result};
use serde::Serialize;
use std::{
    sync::{Arc, Mutex, MutexGuard},
    time::Duration,
};
use tokio::{
    sync::oneshot,
    task::JoinHandle,
    time::{self, Instant, MissedTickBehavior},
};
use tokio_util::sync::CancellationToken;

// Sampling runs every few milliseconds; keep per-sample logs muted unless debugging
const ENABLE_LOGS: bool = false;

use crate::log_debug;

/// Progress of the press-and-hold gesture. Exists only while the finger is down.
#[derive(Debug, Clone, Copy, Default, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct OverrideHold {
    pub active: bool,
    pub elapsed_fraction: f64,
}

impl OverrideHold {
    pub fn percent(&self) -> u8 {
        (self.elapsed_fraction.clamp(0.0, 1.0) * 100.0).round() as u8
    }
}

pub type SampleSink = Arc<dyn Fn(OverrideHold) + Send + Sync>;

struct HoldRun {
    cancel_token: CancellationToken,
    handle: JoinHandle<()>,
    sink: SampleSink,
}

/// Press-and-hold confirmation. Progress accumulates monotonic-clock deltas
/// between fixed-interval samples; the completion receiver resolves only when
/// the accumulator reaches the full duration.
pub struct OverrideTimer {
    total: Duration,
    sample_interval: Duration,
    current: Arc<Mutex<OverrideHold>>,
    run: Option<HoldRun>,
}

impl OverrideTimer {
    pub fn new(total: Duration, sample_interval: Duration) -> Self {
        Self {
            total,
            sample_interval,
            current: Arc::new(Mutex::new(OverrideHold::default())),
            run: None,
        }
    }

    pub fn current(&self) -> OverrideHold {
        *lock(&self.current)
    }

    pub fn is_active(&self) -> bool {
        self.current().active
    }

    /// Starts sampling. The returned receiver yields once on completion; on
    /// cancel its sender is dropped, so awaiting it returns an error.
    pub fn start(&mut self, sink: SampleSink) -> Result<oneshot::Receiver<()>> {
        if self.is_active() {
            bail!("override hold already active");
        }
        if let Some(previous) = self.run.take() {
            previous.handle.abort();
        }

        let cancel_token = CancellationToken::new();
        let (done_tx, done_rx) = oneshot::channel();

        {
            let mut hold = lock(&self.current);
            *hold = OverrideHold {
                active: true,
                elapsed_fraction: 0.0,
            };
            sink(*hold);
        }

        let handle = tokio::spawn(hold_loop(
            self.total,
            self.sample_interval,
            self.current.clone(),
            sink.clone(),
            cancel_token.clone(),
            done_tx,
        ));

        self.run = Some(HoldRun {
            cancel_token,
            handle,
            sink,
        });
        Ok(done_rx)
    }

    /// Stops sampling and zeroes progress immediately. Returns false when no
    /// hold was in progress.
    pub fn cancel(&mut self) -> bool {
        let Some(run) = self.run.take() else {
            return false;
        };

        // The token must be set before taking the lock: the loop re-checks it
        // under the same lock before every write.
        run.cancel_token.cancel();
        run.handle.abort();

        let mut hold = lock(&self.current);
        let was_active = hold.active;
        *hold = OverrideHold::default();
        if was_active {
            (run.sink)(*hold);
        }
        was_active
    }
}

impl Drop for OverrideTimer {
    fn drop(&mut self) {
        if let Some(run) = self.run.take() {
            run.cancel_token.cancel();
            run.handle.abort();
        }
    }
}

async fn hold_loop(
    total: Duration,
    sample_interval: Duration,
    current: Arc<Mutex<OverrideHold>>,
    sink: SampleSink,
    cancel_token: CancellationToken,
    done_tx: oneshot::Sender<()>,
) {
    let mut ticker = time::interval(sample_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // First tick of a tokio interval fires immediately.
    ticker.tick().await;

    let mut elapsed = Duration::ZERO;
    let mut last_sample = Instant::now();

    loop {
        tokio::select! {
            biased;
            _ = cancel_token.cancelled() => return,
            _ = ticker.tick() => {}
        }

        let now = Instant::now();
        elapsed += now.saturating_duration_since(last_sample);
        last_sample = now;
        let finished = elapsed >= total;

        {
            let mut hold = lock(&current);
            if cancel_token.is_cancelled() {
                return;
            }
            let fraction = if finished {
                1.0
            } else {
                (elapsed.as_secs_f64() / total.as_secs_f64()).min(1.0)
            };
            // Never report less than an earlier sample.
            hold.elapsed_fraction = hold.elapsed_fraction.max(fraction);
            sink(*hold);
            log_debug!("override hold at {}%", hold.percent());

            if finished {
                let _ = done_tx.send(());
                *hold = OverrideHold::default();
                sink(*hold);
                return;
            }
        }
    }
}

fn lock(current: &Mutex<OverrideHold>) -> MutexGuard<'_, OverrideHold> {
    match current.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
