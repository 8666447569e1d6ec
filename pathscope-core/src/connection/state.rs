//! Connection state machine

/// Where the adapter is in its connect/reconnect cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
}

/// Input to the connection state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Trigger {
    /// Initial connect request
    Open,
    /// Handshake completed
    Opened,
    /// Connect attempt failed or an open link dropped
    Closed,
    /// Fixed reconnect delay has passed
    BackoffElapsed,
}

impl ConnectionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
        }
    }

    /// Next state for `trigger`, or `None` when the pair is not a valid
    /// transition.
    pub fn on(self, trigger: Trigger) -> Option<ConnectionState> {
        use ConnectionState::*;

        match (self, trigger) {
            (Disconnected, Trigger::Open) => Some(Connecting),
            (Disconnected, Trigger::BackoffElapsed) => Some(Connecting),
            (Connecting, Trigger::Opened) => Some(Connected),
            (Connecting, Trigger::Closed) => Some(Disconnected),
            (Connected, Trigger::Closed) => Some(Disconnected),
            _ => None,
        }
    }

    pub fn is_connected(&self) -> bool {
        *self == ConnectionState::Connected
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connect_cycle() {
        let state = ConnectionState::default();
        assert_eq!(state, ConnectionState::Disconnected);

        let state = state.on(Trigger::Open).unwrap();
        assert_eq!(state, ConnectionState::Connecting);
        let state = state.on(Trigger::Opened).unwrap();
        assert!(state.is_connected());
        let state = state.on(Trigger::Closed).unwrap();
        assert_eq!(state, ConnectionState::Disconnected);
        let state = state.on(Trigger::BackoffElapsed).unwrap();
        assert_eq!(state, ConnectionState::Connecting);
        // Failed attempt goes straight back to waiting
        assert_eq!(
            state.on(Trigger::Closed),
            Some(ConnectionState::Disconnected)
        );
    }

    #[test]
    fn test_invalid_transitions() {
        assert_eq!(ConnectionState::Disconnected.on(Trigger::Opened), None);
        assert_eq!(ConnectionState::Disconnected.on(Trigger::Closed), None);
        assert_eq!(ConnectionState::Connecting.on(Trigger::Open), None);
        assert_eq!(ConnectionState::Connected.on(Trigger::Open), None);
        assert_eq!(ConnectionState::Connected.on(Trigger::BackoffElapsed), None);
    }
}
