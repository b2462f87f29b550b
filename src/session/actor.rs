//! Actor that owns a [`Session`] and serializes every operation on it.
//!
//! Callers hold a cloneable [`SessionHandle`]. Each call sends one command
//! over an mpsc channel and waits for its reply on a oneshot channel, so
//! operations run one at a time in arrival order.

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, warn};

use crate::connection::ConnectionProfile;
use crate::error::{ChatError, Result};
use crate::schema::SchemaSummary;
use crate::session::{ChatTurn, Session, SessionPhase, SessionSnapshot};

/// Capacity of the command channel.
const COMMAND_BUFFER: usize = 32;

type Reply<T> = oneshot::Sender<Result<T>>;

/// Commands sent from a handle to the session actor.
#[derive(Debug)]
pub enum SessionCommand {
    Connect {
        profile: ConnectionProfile,
        reply: Reply<()>,
    },
    Switch {
        database: String,
        reply: Reply<()>,
    },
    Submit {
        text: String,
        reply: Reply<Option<ChatTurn>>,
    },
    Refresh {
        reply: Reply<()>,
    },
    ClearHistory {
        reply: Reply<()>,
    },
    History {
        reply: Reply<Vec<ChatTurn>>,
    },
    Schema {
        reply: Reply<Arc<SchemaSummary>>,
    },
    Snapshot {
        reply: Reply<SessionSnapshot>,
    },
    Disconnect {
        reply: Reply<()>,
    },
    /// Closes the connection and stops the actor.
    Shutdown,
}

/// The actor task that owns one session.
pub struct SessionActor {
    session: Session,
    receiver: mpsc::Receiver<SessionCommand>,
}

impl SessionActor {
    /// Creates an actor and the handle used to reach it.
    ///
    /// The actor does nothing until [`SessionActor::run`] is polled,
    /// typically through `tokio::spawn(actor.run())`.
    pub fn spawn(session: Session) -> (SessionHandle, Self) {
        let (sender, receiver) = mpsc::channel(COMMAND_BUFFER);
        let phase = session.phase_receiver();
        let handle = SessionHandle { sender, phase };
        (handle, Self { session, receiver })
    }

    /// Processes commands until shutdown or until every handle is dropped.
    pub async fn run(mut self) {
        while let Some(command) = self.receiver.recv().await {
            if matches!(command, SessionCommand::Shutdown) {
                debug!("Session actor shutting down");
                break;
            }
            self.handle(command).await;
        }

        if let Err(e) = self.session.disconnect().await {
            warn!("Error closing session: {e}");
        }
    }

    async fn handle(&mut self, command: SessionCommand) {
        let session = &mut self.session;
        match command {
            SessionCommand::Connect { profile, reply } => {
                let _ = reply.send(session.connect(profile).await);
            }
            SessionCommand::Switch { database, reply } => {
                let _ = reply.send(session.switch_database(&database).await);
            }
            SessionCommand::Submit { text, reply } => {
                let _ = reply.send(session.submit(&text).await);
            }
            SessionCommand::Refresh { reply } => {
                let _ = reply.send(session.refresh().await);
            }
            SessionCommand::ClearHistory { reply } => {
                session.clear_history();
                let _ = reply.send(Ok(()));
            }
            SessionCommand::History { reply } => {
                let _ = reply.send(Ok(session.history().turns().to_vec()));
            }
            SessionCommand::Schema { reply } => {
                let _ = reply.send(session.schema().await);
            }
            SessionCommand::Snapshot { reply } => {
                let _ = reply.send(Ok(session.snapshot()));
            }
            SessionCommand::Disconnect { reply } => {
                let _ = reply.send(session.disconnect().await);
            }
            SessionCommand::Shutdown => {}
        }
    }
}

/// Handle for talking to a session actor.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    sender: mpsc::Sender<SessionCommand>,
    phase: watch::Receiver<SessionPhase>,
}

impl SessionHandle {
    /// Opens a connection and starts a fresh session on it.
    pub async fn connect(&self, profile: ConnectionProfile) -> Result<()> {
        self.request(|reply| SessionCommand::Connect { profile, reply })
            .await
    }

    /// Switches the session to another database.
    pub async fn switch_database(&self, database: impl Into<String>) -> Result<()> {
        let database = database.into();
        self.request(|reply| SessionCommand::Switch { database, reply })
            .await
    }

    /// Submits a question; returns the assistant turn, or None for blank input.
    pub async fn submit(&self, text: impl Into<String>) -> Result<Option<ChatTurn>> {
        let text = text.into();
        self.request(|reply| SessionCommand::Submit { text, reply })
            .await
    }

    pub async fn refresh(&self) -> Result<()> {
        self.request(|reply| SessionCommand::Refresh { reply }).await
    }

    pub async fn clear_history(&self) -> Result<()> {
        self.request(|reply| SessionCommand::ClearHistory { reply })
            .await
    }

    /// Returns a copy of the transcript.
    pub async fn history(&self) -> Result<Vec<ChatTurn>> {
        self.request(|reply| SessionCommand::History { reply }).await
    }

    /// Returns the schema summary of the active database.
    pub async fn schema(&self) -> Result<Arc<SchemaSummary>> {
        self.request(|reply| SessionCommand::Schema { reply }).await
    }

    pub async fn snapshot(&self) -> Result<SessionSnapshot> {
        self.request(|reply| SessionCommand::Snapshot { reply })
            .await
    }

    pub async fn disconnect(&self) -> Result<()> {
        self.request(|reply| SessionCommand::Disconnect { reply })
            .await
    }

    /// Returns the phase the session is in right now.
    pub fn phase(&self) -> SessionPhase {
        *self.phase.borrow()
    }

    /// Subscribes to phase changes.
    pub fn phase_receiver(&self) -> watch::Receiver<SessionPhase> {
        self.phase.clone()
    }

    /// Signals the actor to close its connection and stop.
    pub async fn close(&self) -> Result<()> {
        self.sender
            .send(SessionCommand::Shutdown)
            .await
            .map_err(|_| ChatError::internal("Session actor already closed"))
    }

    async fn request<T>(
        &self,
        command: impl FnOnce(Reply<T>) -> SessionCommand,
    ) -> Result<T> {
        let (reply, response) = oneshot::channel();
        self.sender
            .send(command(reply))
            .await
            .map_err(|_| ChatError::internal("Session actor closed"))?;
        response
            .await
            .map_err(|_| ChatError::internal("Session actor dropped the request"))?
    }
}
