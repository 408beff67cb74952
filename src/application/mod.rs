pub mod events;
pub mod installer;
pub mod launcher;
pub mod orchestrator;

pub use events::{
    event_channel, session_channel, Completion, EventReceiver, ProgressUpdate, SessionEvent,
    SessionHandle,
};
pub use installer::{DependencyInstaller, InstallEvent};
pub use launcher::TokioLauncher;
pub use orchestrator::{Orchestrator, OrchestratorParts};
