pub mod error;
pub mod model;

pub use error::{AppError, SessionFailure};
pub use model::{DownloadPhase, DownloadRequest, MediaKind, ProgressMode, QualityPreset};
