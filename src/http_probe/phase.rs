use std::fmt;

/// Connection-establishment milestones of a single HTTP request, in the
/// order they occur. `NotStarted` is the implicit state before any
/// milestone has been recorded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ConnectionPhase {
    NotStarted,
    GetConn,
    DnsStart,
    DnsDone,
    ConnectStart,
    ConnectDone,
    TlsHandshakeStart,
    TlsHandshakeDone,
    GotConn,
    WroteHeaderField,
    WroteHeaders,
    WroteRequest,
    GotFirstResponseByte,
}

impl ConnectionPhase {
    /// All phases in lifecycle order.
    pub const ALL: [ConnectionPhase; 13] = [
        ConnectionPhase::NotStarted,
        ConnectionPhase::GetConn,
        ConnectionPhase::DnsStart,
        ConnectionPhase::DnsDone,
        ConnectionPhase::ConnectStart,
        ConnectionPhase::ConnectDone,
        ConnectionPhase::TlsHandshakeStart,
        ConnectionPhase::TlsHandshakeDone,
        ConnectionPhase::GotConn,
        ConnectionPhase::WroteHeaderField,
        ConnectionPhase::WroteHeaders,
        ConnectionPhase::WroteRequest,
        ConnectionPhase::GotFirstResponseByte,
    ];

    /// Label value used in metrics and logs. These match the hook names
    /// operators already have dashboards for.
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionPhase::NotStarted => "notstarted",
            ConnectionPhase::GetConn => "GetConn",
            ConnectionPhase::DnsStart => "DNSStart",
            ConnectionPhase::DnsDone => "DNSDone",
            ConnectionPhase::ConnectStart => "ConnectStart",
            ConnectionPhase::ConnectDone => "ConnectDone",
            ConnectionPhase::TlsHandshakeStart => "TLSHandshakeStart",
            ConnectionPhase::TlsHandshakeDone => "TLSHandshakeDone",
            ConnectionPhase::GotConn => "GotConn",
            ConnectionPhase::WroteHeaderField => "WroteHeaderField",
            ConnectionPhase::WroteHeaders => "WroteHeaders",
            ConnectionPhase::WroteRequest => "WroteRequest",
            ConnectionPhase::GotFirstResponseByte => "GotFirstResponseByte",
        }
    }
}

impl fmt::Display for ConnectionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The single label assigned to a finished attempt: the deepest phase it
/// reached, or one of the two terminal outcomes for a received response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReachedState {
    Phase(ConnectionPhase),
    /// Response received with status 200.
    Completed,
    /// Response received with any other status.
    NonOkResponse,
}

impl ReachedState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReachedState::Phase(phase) => phase.as_str(),
            ReachedState::Completed => "Completed",
            ReachedState::NonOkResponse => "Non-200-Response",
        }
    }

    pub fn is_completed(&self) -> bool {
        matches!(self, ReachedState::Completed)
    }

    /// Every label an attempt can be classified as.
    pub fn all() -> impl Iterator<Item = ReachedState> {
        ConnectionPhase::ALL
            .into_iter()
            .map(ReachedState::Phase)
            .chain([ReachedState::Completed, ReachedState::NonOkResponse])
    }
}

impl From<ConnectionPhase> for ReachedState {
    fn from(phase: ConnectionPhase) -> Self {
        ReachedState::Phase(phase)
    }
}

impl fmt::Display for ReachedState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn phases_are_declared_in_lifecycle_order() {
        for pair in ConnectionPhase::ALL.windows(2) {
            assert!(pair[0] < pair[1], "{} should precede {}", pair[0], pair[1]);
        }
    }

    #[test]
    fn labels_are_unique() {
        let labels: HashSet<&str> = ReachedState::all().map(|s| s.as_str()).collect();
        assert_eq!(labels.len(), 15);
        assert!(labels.contains("notstarted"));
        assert!(labels.contains("Non-200-Response"));
        assert!(labels.contains("TLSHandshakeDone"));
    }
}
