use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use unicode_truncate::UnicodeTruncateStr;

use super::phase::ConnectionPhase;

/// Longest detail text kept per event; resolver answers and error chains
/// can get long and only end up in a log line.
const MAX_DETAIL_WIDTH: usize = 160;

/// A phase observed during one attempt, with the time since the attempt
/// started.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhaseEvent {
    pub phase: ConnectionPhase,
    pub elapsed: Duration,
    pub detail: Option<String>,
}

impl fmt::Display for PhaseEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}@{:.3}ms",
            self.phase,
            self.elapsed.as_secs_f64() * 1000.0
        )?;
        if let Some(detail) = &self.detail {
            write!(f, "({detail})")?;
        }
        Ok(())
    }
}

/// Append-only log of the phases reached by a single attempt.
///
/// Each phase is recorded at most once; a repeated phase is ignored so the
/// first occurrence keeps its timestamp. Ordering is whatever order the
/// caller observes the phases in.
#[derive(Debug, Clone)]
pub struct TraceRecorder {
    started: Instant,
    seen: u16,
    events: Vec<PhaseEvent>,
}

impl TraceRecorder {
    pub fn new() -> Self {
        Self::starting_at(Instant::now())
    }

    pub fn starting_at(started: Instant) -> Self {
        Self {
            started,
            seen: 0,
            events: Vec::with_capacity(ConnectionPhase::ALL.len()),
        }
    }

    /// Record `phase` at the current instant. Returns `false` when the phase
    /// was already recorded or is `NotStarted`.
    pub fn record(&mut self, phase: ConnectionPhase) -> bool {
        let elapsed = self.started.elapsed();
        self.push(phase, elapsed, None)
    }

    pub fn record_with(&mut self, phase: ConnectionPhase, detail: impl AsRef<str>) -> bool {
        let elapsed = self.started.elapsed();
        self.push(phase, elapsed, Some(truncate_detail(detail.as_ref())))
    }

    /// Record `phase` at the current instant, building its detail only
    /// afterwards so the detail's cost never shows up in the timestamp.
    pub fn record_lazy<F, S>(&mut self, phase: ConnectionPhase, detail: F) -> bool
    where
        F: FnOnce() -> S,
        S: AsRef<str>,
    {
        if !self.accepts(phase) {
            return false;
        }
        let elapsed = self.started.elapsed();
        let detail = truncate_detail(detail().as_ref());
        self.push(phase, elapsed, Some(detail))
    }

    fn accepts(&self, phase: ConnectionPhase) -> bool {
        phase != ConnectionPhase::NotStarted && !self.contains(phase)
    }

    fn push(&mut self, phase: ConnectionPhase, elapsed: Duration, detail: Option<String>) -> bool {
        if !self.accepts(phase) {
            return false;
        }
        self.seen |= 1u16 << (phase as u16);
        self.events.push(PhaseEvent {
            phase,
            elapsed,
            detail,
        });
        true
    }

    pub fn contains(&self, phase: ConnectionPhase) -> bool {
        self.seen & (1u16 << (phase as u16)) != 0
    }

    /// The most recently recorded phase, or `NotStarted` if nothing was
    /// recorded.
    pub fn last_recorded(&self) -> ConnectionPhase {
        self.events
            .last()
            .map(|event| event.phase)
            .unwrap_or(ConnectionPhase::NotStarted)
    }

    pub fn events(&self) -> &[PhaseEvent] {
        &self.events
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }
}

fn truncate_detail(detail: &str) -> String {
    let (detail, _) = detail.unicode_truncate(MAX_DETAIL_WIDTH);
    detail.to_string()
}

impl Default for TraceRecorder {
    fn default() -> Self {
        Self::new()
    }
}

/// Hook handle for one attempt's recorder.
///
/// The prober and the stream wrapper of the same attempt each hold a clone;
/// both run inside the attempt's own task, so the lock is never contended.
/// The handle outlives a timed-out request future, which is what lets the
/// prober still read how far the request got.
#[derive(Debug, Clone)]
pub struct Tracer {
    recorder: Arc<Mutex<TraceRecorder>>,
}

impl Tracer {
    pub fn new() -> Self {
        Self {
            recorder: Arc::new(Mutex::new(TraceRecorder::new())),
        }
    }

    pub fn record(&self, phase: ConnectionPhase) {
        self.with_recorder(|recorder| recorder.record(phase));
    }

    /// Record `phase` with a detail string. The timestamp is taken first and
    /// the detail is only built when the phase has not been recorded yet.
    pub fn record_with<F, S>(&self, phase: ConnectionPhase, detail: F)
    where
        F: FnOnce() -> S,
        S: AsRef<str>,
    {
        self.with_recorder(|recorder| recorder.record_lazy(phase, detail));
    }

    pub fn last_recorded(&self) -> ConnectionPhase {
        self.with_recorder(|recorder| recorder.last_recorded())
    }

    /// Take the recorder back once the request is over.
    pub fn into_recorder(self) -> TraceRecorder {
        match Arc::try_unwrap(self.recorder) {
            Ok(mutex) => mutex.into_inner().unwrap_or_else(PoisonError::into_inner),
            Err(shared) => shared
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .clone(),
        }
    }

    fn with_recorder<T>(&self, f: impl FnOnce(&mut TraceRecorder) -> T) -> T {
        let mut recorder = self.recorder.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut recorder)
    }
}

impl Default for Tracer {
    fn default() -> Self {
        Self::new()
    }
}
