//! Channels between the UI and the download session loop.
//!
//! Events flow one way, from the loop to the UI. Commands and process output
//! share a single inbox so the loop handles them strictly one at a time.

use tokio::sync::mpsc;
use tracing::debug;

use crate::credentials::CredentialBundle;
use crate::dependencies::DependencyPaths;
use crate::domain::{DownloadRequest, SessionFailure};
use crate::parser::{FragmentProgress, PercentProgress};

pub type RunId = u64;

#[derive(Debug, Clone, PartialEq)]
pub enum ProgressUpdate {
    Percent(PercentProgress),
    Fragment(FragmentProgress),
}

impl ProgressUpdate {
    /// Overall progress in percent, 0..=100.
    pub fn overall(&self) -> f64 {
        match self {
            ProgressUpdate::Percent(p) => p.overall,
            ProgressUpdate::Fragment(p) => p.percent(),
        }
    }

    pub fn details(&self) -> String {
        match self {
            ProgressUpdate::Percent(p) => format!(
                "Part {}/{} | {} at {} (ETA: {})",
                p.current_part, p.total_parts, p.size, p.speed, p.eta
            ),
            ProgressUpdate::Fragment(p) => {
                format!("Frag: {}/{} | {} (ETA: {})", p.current, p.total, p.speed, p.eta)
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Completion {
    /// Exit code as reported by the OS; `None` when killed by a signal.
    pub exit_code: Option<i32>,
}

impl Completion {
    pub fn is_success(&self) -> bool {
        self.exit_code == Some(0)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    DependencyStatus(DependencyPaths),
    Progress(ProgressUpdate),
    Finalizing,
    AuthRequired,
    Output(String),
    Completed(Completion),
    Cancelled,
    Failed(SessionFailure),
}

pub type EventReceiver = mpsc::UnboundedReceiver<SessionEvent>;

#[derive(Debug, Clone)]
pub struct EventSender {
    tx: mpsc::UnboundedSender<SessionEvent>,
}

impl EventSender {
    pub fn emit(&self, event: SessionEvent) {
        if self.tx.send(event).is_err() {
            debug!("event dropped, nobody is listening");
        }
    }

    /// Resolves once the receiving side is gone.
    pub async fn closed(&self) {
        self.tx.closed().await
    }
}

pub fn event_channel() -> (EventSender, EventReceiver) {
    let (tx, rx) = mpsc::unbounded_channel();
    (EventSender { tx }, rx)
}

#[derive(Debug, Clone)]
pub enum SessionCommand {
    Submit(DownloadRequest),
    Cancel,
    /// Sent once the user has signed in again; the bundle replaces the
    /// stored credentials and the request that hit the sign-in wall is rerun.
    AcknowledgeAuthRetry(CredentialBundle),
    CheckDependencies,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessOutput {
    Stdout(Vec<u8>),
    Stderr(Vec<u8>),
    Exited(Option<i32>),
}

#[derive(Debug)]
pub enum SessionInput {
    Command(SessionCommand),
    Process { run: RunId, output: ProcessOutput },
}

pub type Inbox = mpsc::UnboundedReceiver<SessionInput>;

/// Command side of the session loop. Cheap to clone.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    tx: mpsc::UnboundedSender<SessionInput>,
}

impl SessionHandle {
    pub fn submit(&self, request: DownloadRequest) -> bool {
        self.command(SessionCommand::Submit(request))
    }

    pub fn cancel(&self) -> bool {
        self.command(SessionCommand::Cancel)
    }

    pub fn acknowledge_auth_retry(&self, credentials: CredentialBundle) -> bool {
        self.command(SessionCommand::AcknowledgeAuthRetry(credentials))
    }

    pub fn check_dependencies(&self) -> bool {
        self.command(SessionCommand::CheckDependencies)
    }

    /// Returns false when the session loop has shut down.
    pub fn command(&self, command: SessionCommand) -> bool {
        self.send(SessionInput::Command(command))
    }

    pub(crate) fn send(&self, input: SessionInput) -> bool {
        self.tx.send(input).is_ok()
    }

    /// A handle that does not keep the session loop alive.
    pub fn downgrade(&self) -> WeakSessionHandle {
        WeakSessionHandle {
            tx: self.tx.downgrade(),
        }
    }
}

/// Held by the loop itself and by process sinks, so the loop ends once the
/// last `SessionHandle` is dropped.
#[derive(Debug, Clone)]
pub struct WeakSessionHandle {
    tx: mpsc::WeakUnboundedSender<SessionInput>,
}

impl WeakSessionHandle {
    pub(crate) fn send(&self, input: SessionInput) -> bool {
        self.tx
            .upgrade()
            .is_some_and(|tx| tx.send(input).is_ok())
    }
}

pub fn session_channel() -> (SessionHandle, Inbox) {
    let (tx, rx) = mpsc::unbounded_channel();
    (SessionHandle { tx }, rx)
}
