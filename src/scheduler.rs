//! Per-target probe loops.
//!
//! Each target gets its own task that fires an attempt, sleeps the full
//! interval, and fires again. Attempts run as separate tasks and never gate
//! the next tick: a target that answers slower than its interval accumulates
//! in-flight attempts without bound (visible as the in-flight gauge). Each
//! loop keeps its attempts in a `JoinSet`, so stopping a loop abandons its
//! in-flight attempts with it.

use std::sync::Arc;

use tokio::task::{JoinHandle, JoinSet};
use tokio::time::sleep;

use crate::config::Target;
use crate::http_probe::prelude::*;

pub struct Scheduler {
    prober: Arc<Prober>,
    targets: Vec<Arc<Target>>,
}

impl Scheduler {
    pub fn new(prober: Arc<Prober>, targets: Vec<Target>) -> Self {
        Self {
            prober,
            targets: targets.into_iter().map(Arc::new).collect(),
        }
    }

    /// Start one loop per target. With no targets nothing is started.
    pub fn start(self) -> SchedulerHandle {
        let loops = self
            .targets
            .into_iter()
            .map(|target| tokio::spawn(run_target(self.prober.clone(), target)))
            .collect();
        SchedulerHandle { loops }
    }
}

/// Handle to the running probe loops.
pub struct SchedulerHandle {
    loops: Vec<JoinHandle<()>>,
}

impl SchedulerHandle {
    pub fn target_count(&self) -> usize {
        self.loops.len()
    }

    /// Stop every loop. In-flight attempts are abandoned, not drained:
    /// they are neither counted nor logged.
    pub fn shutdown(&self) {
        for handle in &self.loops {
            handle.abort();
        }
    }

    /// Wait until every loop has stopped after [`shutdown`](Self::shutdown).
    pub async fn join(self) {
        for handle in self.loops {
            let _ = handle.await;
        }
    }
}

async fn run_target(prober: Arc<Prober>, target: Arc<Target>) {
    tracing::info!(
        url = %target.name,
        interval = ?target.interval,
        timeout = ?target.deadline(),
        "Starting probe loop"
    );

    let mut attempts = JoinSet::new();
    loop {
        let in_flight = prober.sink().track_in_flight(&target.name);
        let attempt_prober = prober.clone();
        let attempt_target = target.clone();
        attempts.spawn(async move {
            let _in_flight = in_flight;
            attempt_prober.probe(&attempt_target).await;
        });

        let next_tick = sleep(target.interval);
        tokio::pin!(next_tick);
        loop {
            tokio::select! {
                _ = &mut next_tick => break,
                Some(joined) = attempts.join_next() => {
                    if let Err(err) = joined {
                        if err.is_panic() {
                            tracing::error!(url = %target.name, error = %err, "Probe attempt panicked");
                        }
                    }
                }
            }
        }
    }
}
