use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AppError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("API error: {0}")]
    Api(String),

    #[error("I/O error: {0}")]
    Io(String),

    #[error("Credential error: {0}")]
    Credentials(String),
}

/// Why a download session could not start or finish normally.
///
/// A non-zero exit code is not a failure in this sense; it arrives as a
/// completion event carrying the code.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SessionFailure {
    #[error("Missing dependencies (yt-dlp: {}, FFmpeg: {})", found(.downloader), found(.muxer))]
    MissingDependencies { downloader: bool, muxer: bool },

    #[error("Failed to start yt-dlp process: {0}")]
    Spawn(String),

    #[error("There is no download to retry")]
    NothingToRetry,

    #[error("Sign-in did not produce any cookies")]
    EmptyCredentials,

    #[error("Could not store sign-in cookies: {0}")]
    CredentialStore(String),
}

fn found(present: &bool) -> &'static str {
    if *present {
        "found"
    } else {
        "missing"
    }
}
