pub mod classify;
pub mod phase;
pub mod probe;
pub mod result;
pub mod stream;
pub mod trace;

pub mod prelude {
    pub use super::classify::classify;
    pub use super::phase::{ConnectionPhase, ReachedState};
    pub use super::probe::Prober;
    pub use super::result::{ProbeReport, TransportError};
    pub use super::trace::{PhaseEvent, TraceRecorder, Tracer};
}

use std::fmt::Write;

/// Flatten an error and its `source()` chain into one log-friendly line.
pub fn report(mut err: &(dyn std::error::Error + 'static)) -> String {
    let mut s = format!("{}", err);
    while let Some(src) = err.source() {
        let _ = write!(s, ": caused by: {}", src);
        err = src;
    }
    s
}
