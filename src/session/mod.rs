//! Session runtime: one bounded attempt by the agent at one feature.
//!
//! The runtime is polymorphic over the transport ([`AgentTransport`]): the
//! default launches the agent CLI as a subprocess and reads stream-json
//! transcript lines; tests drive the same runtime with a scripted stream.

mod events;
mod runtime;
mod transport;

pub use events::{parse_transcript_line, TranscriptEvent};
pub use runtime::{RuntimeConfig, SessionResult, SessionRuntime};
pub use transport::{AgentStream, AgentTransport, SessionRequest, StreamExit, SubprocessTransport, TransportError};

use serde::{Deserialize, Serialize};

/// What kind of agent a session ran.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentKind {
    Initializer,
    Coding,
}

impl AgentKind {
    pub fn label(self) -> &'static str {
        match self {
            AgentKind::Initializer => "initializer",
            AgentKind::Coding => "coding",
        }
    }
}

/// Terminal condition of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionOutcome {
    /// Agent signalled completion. Provisional until verification passes.
    Success,
    /// Context usage crossed the threshold before completion.
    Handoff,
    /// A classified error was raised.
    Failure,
    /// Hard timeout or stall.
    Timeout,
    /// External cancellation.
    Interrupted,
    /// Subprocess exited nonzero with no completion signal.
    Crashed,
}

impl SessionOutcome {
    pub fn label(self) -> &'static str {
        match self {
            SessionOutcome::Success => "success",
            SessionOutcome::Handoff => "handoff",
            SessionOutcome::Failure => "failure",
            SessionOutcome::Timeout => "timeout",
            SessionOutcome::Interrupted => "interrupted",
            SessionOutcome::Crashed => "crashed",
        }
    }
}
