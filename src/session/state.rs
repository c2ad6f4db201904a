//! Session lifecycle states and the transitions allowed between them.

use std::fmt;

/// Lifecycle of one voice session.
///
/// ```text
/// Idle ──start──▶ Connecting ──opened──▶ Active
///  ▲               │      │               │    │
///  │             stop   error           error stop
///  │               │      ▼               │    │
///  │               │   Error(msg) ◀───────┘    │
///  │               ▼      │                    │
///  └────────── Closed ◀───┴────────────────────┘
/// ```
///
/// `stop` releases and closes directly; only failures pass through `Error`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SessionState {
    #[default]
    Idle,
    Connecting,
    Active,
    Error(String),
    Closed,
}

impl SessionState {
    /// Short lowercase name, used in logs and error messages.
    pub fn name(&self) -> &'static str {
        match self {
            SessionState::Idle => "idle",
            SessionState::Connecting => "connecting",
            SessionState::Active => "active",
            SessionState::Error(_) => "error",
            SessionState::Closed => "closed",
        }
    }

    /// Status line shown to the user.
    pub fn status_text(&self) -> &'static str {
        match self {
            SessionState::Idle => "Idle",
            SessionState::Connecting => "Connecting...",
            SessionState::Active => "Active",
            SessionState::Error(_) => "Error",
            SessionState::Closed => "Disconnected",
        }
    }

    /// True while the session holds the microphone or a connection.
    pub fn is_live(&self) -> bool {
        matches!(self, SessionState::Connecting | SessionState::Active)
    }

    pub fn error_message(&self) -> Option<&str> {
        match self {
            SessionState::Error(message) => Some(message),
            _ => None,
        }
    }

    /// Whether the state machine allows moving from `self` to `next`.
    pub fn can_transition_to(&self, next: &SessionState) -> bool {
        use SessionState::*;
        matches!(
            (self, next),
            (Idle, Connecting)
                | (Connecting, Active)
                | (Connecting, Error(_))
                | (Connecting, Closed)
                | (Active, Error(_))
                | (Active, Closed)
                | (Error(_), Closed)
                | (Closed, Idle)
        )
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionState::Error(message) => write!(f, "error: {}", message),
            other => f.write_str(other.name()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_idle() {
        assert_eq!(SessionState::default(), SessionState::Idle);
    }

    #[test]
    fn test_only_connecting_and_active_are_live() {
        assert!(!SessionState::Idle.is_live());
        assert!(SessionState::Connecting.is_live());
        assert!(SessionState::Active.is_live());
        assert!(!SessionState::Error("x".into()).is_live());
        assert!(!SessionState::Closed.is_live());
    }

    #[test]
    fn test_transition_table() {
        use SessionState::*;
        let error = Error("boom".to_string());

        assert!(Idle.can_transition_to(&Connecting));
        assert!(Connecting.can_transition_to(&Active));
        assert!(Connecting.can_transition_to(&error));
        assert!(Active.can_transition_to(&Closed));
        assert!(error.can_transition_to(&Closed));
        assert!(Closed.can_transition_to(&Idle));

        assert!(!Idle.can_transition_to(&Active));
        assert!(!Active.can_transition_to(&Connecting));
        assert!(!Closed.can_transition_to(&Active));
        assert!(!error.can_transition_to(&Idle));
    }

    #[test]
    fn test_stop_closes_without_passing_through_error() {
        use SessionState::*;
        let error = Error("boom".to_string());

        assert!(Connecting.can_transition_to(&Closed));
        assert!(Active.can_transition_to(&Closed));
        assert!(Active.can_transition_to(&error));
        assert!(!error.can_transition_to(&Active));
        assert!(!error.can_transition_to(&Connecting));
    }

    #[test]
    fn test_display_and_status_text() {
        assert_eq!(SessionState::Connecting.to_string(), "connecting");
        assert_eq!(
            SessionState::Error("socket reset".into()).to_string(),
            "error: socket reset"
        );
        assert_eq!(SessionState::Connecting.status_text(), "Connecting...");
        assert_eq!(SessionState::Closed.status_text(), "Disconnected");
        assert_eq!(
            SessionState::Error("socket reset".into()).error_message(),
            Some("socket reset")
        );
    }
}
