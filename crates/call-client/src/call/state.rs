//! Call state machine.
//!
//! Pure transition function; timers and side effects live in the
//! controller.

use common::call::CallStatus;
use serde::Serialize;
use std::fmt;

/// State of an outbound call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CallState {
    Ringing,
    Accepted,
    Declined,
    Canceled,
    Timeout,
}

impl CallState {
    /// Terminal states never change again.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        !matches!(self, CallState::Ringing)
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            CallState::Ringing => "ringing",
            CallState::Accepted => "accepted",
            CallState::Declined => "declined",
            CallState::Canceled => "canceled",
            CallState::Timeout => "timeout",
        }
    }
}

impl fmt::Display for CallState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Inputs that may move a call out of `Ringing`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallEvent {
    /// Status update relayed by the other party.
    Status(CallStatus),
    /// The ring deadline passed.
    Timeout,
    /// The caller hung up.
    LocalCancel,
}

/// Next state for `event`, or `None` if the event is ignored.
#[must_use]
pub fn transition(state: CallState, event: CallEvent) -> Option<CallState> {
    if state.is_terminal() {
        return None;
    }
    let next = match event {
        CallEvent::Status(CallStatus::Accepted) => CallState::Accepted,
        CallEvent::Status(CallStatus::Declined) => CallState::Declined,
        CallEvent::Status(CallStatus::Canceled) | CallEvent::LocalCancel => CallState::Canceled,
        CallEvent::Timeout => CallState::Timeout,
    };
    Some(next)
}
