use crate::bus::{BusRole, LinkEvent};
use std::fmt;

/// Connection state of one bus as tracked by the supervisor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    /// Client reports a session but the broker endpoint does not answer
    ConnectedButUnhealthy,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::ConnectedButUnhealthy => "connected-unhealthy",
        };
        f.write_str(name)
    }
}

/// Input to the state machine
#[derive(Debug, Clone, PartialEq)]
pub enum Signal {
    Link(LinkEvent),
    ProbeOk,
    ProbeFailed,
}

/// Side effect the supervisor must carry out after a transition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    None,
    /// Let the driver poll again after the reconnect delay
    Reconnect,
    /// Ask the host to restart the broker process
    RestartBroker,
}

/// Per-bus state machine.
///
/// Pure: transitions return the action to take and never perform I/O.
#[derive(Debug, Clone)]
pub struct LinkMonitor {
    role: BusRole,
    state: ConnectionState,
    can_restart: bool,
}

impl LinkMonitor {
    /// `can_restart` enables broker restarts when the endpoint disappears
    pub fn new(role: BusRole, can_restart: bool) -> Self {
        Self {
            role,
            state: ConnectionState::Disconnected,
            can_restart,
        }
    }

    pub fn role(&self) -> BusRole {
        self.role
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Enable or disable broker restarts without touching the state
    pub fn set_can_restart(&mut self, can_restart: bool) {
        self.can_restart = can_restart;
    }

    pub fn on_signal(&mut self, signal: &Signal) -> Action {
        use ConnectionState::*;

        let (next, action) = match (self.state, signal) {
            (_, Signal::Link(LinkEvent::Connecting)) => (Connecting, Action::None),
            (_, Signal::Link(LinkEvent::Connected)) => (Connected, Action::None),
            (_, Signal::Link(LinkEvent::Disconnected { expected: true, .. })) => {
                (Disconnected, Action::None)
            }
            (_, Signal::Link(LinkEvent::Disconnected { expected: false, .. })) => {
                (Connecting, Action::Reconnect)
            }
            (ConnectedButUnhealthy, Signal::ProbeOk) => (Connected, Action::None),
            (state, Signal::ProbeOk) => (state, Action::None),
            (Connected | ConnectedButUnhealthy, Signal::ProbeFailed) => {
                (ConnectedButUnhealthy, self.restart_action())
            }
            (state, Signal::ProbeFailed) => (state, self.restart_action()),
        };

        self.state = next;
        action
    }

    fn restart_action(&self) -> Action {
        if self.can_restart {
            Action::RestartBroker
        } else {
            Action::None
        }
    }
}
