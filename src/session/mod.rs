//! Chat sessions: transcript, state machine and the actor that runs it.

mod actor;
mod history;
mod orchestrator;
mod state;

pub use actor::{SessionActor, SessionCommand, SessionHandle};
pub use history::{ChatHistory, ChatTurn, TurnRole};
pub use orchestrator::Session;
pub use state::{SessionPhase, SessionSettings, SessionSnapshot, SessionState};
