//! The pattern instance state machine (§3 Pattern Instance).

use std::fmt;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PatternState {
    Unregistered,
    Registered,
    Initialized,
    Running,
    Stopping,
    Stopped,
    Failed,
}

impl fmt::Display for PatternState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PatternState::Unregistered => "unregistered",
            PatternState::Registered => "registered",
            PatternState::Initialized => "initialized",
            PatternState::Running => "running",
            PatternState::Stopping => "stopping",
            PatternState::Stopped => "stopped",
            PatternState::Failed => "failed",
        };
        f.write_str(s)
    }
}

impl PatternState {
    /// Whether `command` is legal to process from this state (§4.2: "command for
    /// unknown state ... response `{success=false, error=InvalidState}`").
    ///
    /// `Failed` is absorbing: nothing is legal once reached. `HealthCheck` is legal
    /// any time after `Initialize`, matching the driver-level `Lifecycle::health`
    /// contract it delegates to.
    pub fn accepts(self, command: CommandKind) -> bool {
        use CommandKind::*;
        use PatternState::*;
        match (self, command) {
            (Failed, _) => false,
            (Registered, Initialize) => true,
            (Initialized, Start) => true,
            (Initialized | Running, HealthCheck) => true,
            (Initialized | Running, Configure) => true,
            (Initialized | Running, Stop) => true,
            _ => false,
        }
    }

    pub fn advance(self, command: CommandKind) -> PatternState {
        use CommandKind::*;
        use PatternState::*;
        match (self, command) {
            (Registered, Initialize) => Initialized,
            (Initialized, Start) => Running,
            (Initialized | Running, Stop) => Stopping,
            (state, _) => state,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CommandKind {
    Initialize,
    Start,
    Stop,
    HealthCheck,
    Configure,
}
