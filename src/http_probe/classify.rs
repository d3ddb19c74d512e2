use hyper::StatusCode;

use super::phase::{ConnectionPhase, ReachedState};

/// Turn a finished attempt into its reached-state label.
///
/// A transport failure is labelled with the deepest phase recorded before
/// it surfaced (`NotStarted` if none was). A received response is
/// `Completed` for 200 and `NonOkResponse` for anything else, whatever
/// phases were recorded on the way.
pub fn classify<E>(outcome: &Result<StatusCode, E>, last_recorded: ConnectionPhase) -> ReachedState {
    match outcome {
        Ok(status) if *status == StatusCode::OK => ReachedState::Completed,
        Ok(_) => ReachedState::NonOkResponse,
        Err(_) => ReachedState::Phase(last_recorded),
    }
}
