//! The download session loop.
//!
//! Owns the single "current download" slot. Everything here runs on one task
//! and handles inputs one at a time, so the slot needs no locking.

use std::collections::BTreeSet;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tracing::{debug, error, info, warn};

use super::events::{
    Completion, EventSender, Inbox, ProcessOutput, ProgressUpdate, RunId, SessionCommand,
    SessionEvent, SessionHandle, SessionInput, WeakSessionHandle,
};
use super::launcher::{ProcessLauncher, ProcessSink, RunningProcess};
use crate::config::AppConfig;
use crate::credentials::{self, CredentialBundle, CredentialStore};
use crate::dependencies::{DependencyLocator, DependencyPaths};
use crate::domain::{DownloadPhase, DownloadRequest, MediaKind, SessionFailure};
use crate::parser::{LineNormalizer, OutputEvent, OutputParser, OutputStream};
use crate::utils::part_file;

const OUTPUT_TEMPLATE: &str = "%(title)s [%(id)s].%(ext)s";

#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub cookie_file: PathBuf,
    pub user_agent: String,
    pub downloader_name: String,
    pub muxer_name: String,
}

impl From<&AppConfig> for SessionSettings {
    fn from(config: &AppConfig) -> Self {
        Self {
            cookie_file: config.cookie_file.clone(),
            user_agent: config.user_agent.clone(),
            downloader_name: config.downloader_name.clone(),
            muxer_name: config.muxer_name.clone(),
        }
    }
}

/// Collaborators the orchestrator is built from.
pub struct OrchestratorParts {
    pub settings: SessionSettings,
    pub locator: DependencyLocator,
    pub credentials: CredentialStore,
    pub launcher: Box<dyn ProcessLauncher>,
}

impl OrchestratorParts {
    pub fn from_config(config: &AppConfig, launcher: Box<dyn ProcessLauncher>) -> Self {
        Self {
            settings: SessionSettings::from(config),
            locator: DependencyLocator::from_env(&config.managed_bin_dir),
            credentials: CredentialStore::new(&config.credentials_file),
            launcher,
        }
    }
}

struct DownloadSession {
    run: RunId,
    request: DownloadRequest,
    process: Box<dyn RunningProcess>,
    parser: OutputParser,
    stdout: LineNormalizer,
    stderr: LineNormalizer,
    tracked_files: BTreeSet<PathBuf>,
    cookie_file: Option<PathBuf>,
    phase: DownloadPhase,
    cancelled: bool,
    auth_required: bool,
    exited: bool,
}

impl DownloadSession {
    fn new(
        run: RunId,
        request: DownloadRequest,
        process: Box<dyn RunningProcess>,
        cookie_file: Option<PathBuf>,
    ) -> Self {
        Self {
            run,
            request,
            process,
            parser: OutputParser::new(),
            stdout: LineNormalizer::new(),
            stderr: LineNormalizer::new(),
            tracked_files: BTreeSet::new(),
            cookie_file,
            phase: DownloadPhase::Running,
            cancelled: false,
            auth_required: false,
            exited: false,
        }
    }

    fn dispose_cookie_file(&mut self) {
        if let Some(path) = self.cookie_file.take() {
            if let Err(e) = credentials::dispose(&path) {
                warn!(path = %path.display(), "failed to remove cookie file: {}", e);
            }
        }
    }
}

pub struct Orchestrator {
    settings: SessionSettings,
    locator: DependencyLocator,
    credentials: CredentialStore,
    launcher: Box<dyn ProcessLauncher>,
    inbox: WeakSessionHandle,
    events: EventSender,
    session: Option<DownloadSession>,
    next_run: RunId,
    awaiting_auth: Option<DownloadRequest>,
    last_phase: DownloadPhase,
}

impl Orchestrator {
    pub fn new(parts: OrchestratorParts, inbox: &SessionHandle, events: EventSender) -> Self {
        Self {
            settings: parts.settings,
            locator: parts.locator,
            credentials: parts.credentials,
            launcher: parts.launcher,
            inbox: inbox.downgrade(),
            events,
            session: None,
            next_run: 1,
            awaiting_auth: None,
            last_phase: DownloadPhase::Idle,
        }
    }

    /// Runs until every `SessionHandle` is gone or nobody listens for
    /// events any more. Dropping the orchestrator then stops a running
    /// download.
    pub async fn run(mut self, mut inbox: Inbox) {
        info!("download session loop started");
        loop {
            let input = tokio::select! {
                input = inbox.recv() => input,
                () = self.events.closed() => {
                    debug!("event receiver dropped");
                    None
                }
            };
            let Some(input) = input else {
                break;
            };
            self.dispatch(input);
        }
        info!("download session loop stopped");
    }

    pub fn dispatch(&mut self, input: SessionInput) {
        match input {
            SessionInput::Command(SessionCommand::Submit(request)) => self.submit(request),
            SessionInput::Command(SessionCommand::Cancel) => self.cancel(),
            SessionInput::Command(SessionCommand::AcknowledgeAuthRetry(bundle)) => {
                self.retry_after_auth(bundle)
            }
            SessionInput::Command(SessionCommand::CheckDependencies) => {
                let deps = self.check_dependencies();
                self.events.emit(SessionEvent::DependencyStatus(deps));
            }
            SessionInput::Process { run, output } => self.on_process_output(run, output),
        }
    }

    pub fn phase(&self) -> DownloadPhase {
        self.session
            .as_ref()
            .map_or(self.last_phase, |session| session.phase)
    }

    pub fn is_active(&self) -> bool {
        self.session.is_some()
    }

    pub fn tracked_files(&self) -> Vec<PathBuf> {
        self.session
            .as_ref()
            .map(|session| session.tracked_files.iter().cloned().collect())
            .unwrap_or_default()
    }

    fn check_dependencies(&self) -> DependencyPaths {
        let deps = self
            .locator
            .check(&self.settings.downloader_name, &self.settings.muxer_name);
        info!(
            downloader = deps.downloader.is_some(),
            muxer = deps.muxer.is_some(),
            "dependency check"
        );
        deps
    }

    fn submit(&mut self, request: DownloadRequest) {
        let deps = self.check_dependencies();
        let program = match deps.downloader.clone() {
            Some(program) if deps.muxer.is_some() => program,
            _ => {
                warn!("refusing to start download, dependencies missing");
                let failure = SessionFailure::MissingDependencies {
                    downloader: deps.downloader.is_some(),
                    muxer: deps.muxer.is_some(),
                };
                self.events.emit(SessionEvent::DependencyStatus(deps));
                self.events.emit(SessionEvent::Failed(failure));
                return;
            }
        };

        self.awaiting_auth = None;
        self.replace_running();
        self.last_phase = DownloadPhase::Preparing;

        let cookie_file = self.prepare_cookie_file();
        let args = build_arguments(
            &request,
            deps.muxer_dir(),
            cookie_file.as_deref(),
            &self.settings.user_agent,
        );

        let run = self.next_run;
        self.next_run += 1;
        let sink = ProcessSink::new(run, self.inbox.clone());

        match self.launcher.launch(&program, &args, sink) {
            Ok(process) => {
                info!(
                    run,
                    pid = ?process.pid(),
                    kind = %request.kind(),
                    args = args.len(),
                    "yt-dlp started"
                );
                self.session = Some(DownloadSession::new(run, request, process, cookie_file));
            }
            Err(e) => {
                error!(run, program = %program.display(), "failed to start yt-dlp: {}", e);
                if let Some(path) = cookie_file {
                    if let Err(e) = credentials::dispose(&path) {
                        warn!("failed to remove cookie file: {}", e);
                    }
                }
                self.last_phase = DownloadPhase::Failed;
                self.events
                    .emit(SessionEvent::Failed(SessionFailure::Spawn(e.to_string())));
            }
        }
    }

    /// A new download replaces the running one outright: the old tree is
    /// killed and its remaining output and exit are ignored.
    fn replace_running(&mut self) {
        if let Some(mut old) = self.session.take() {
            info!(run = old.run, "replacing running download");
            if !old.exited {
                old.process.terminate_tree();
            }
        }
    }

    fn prepare_cookie_file(&self) -> Option<PathBuf> {
        let path = &self.settings.cookie_file;
        match self.credentials.load() {
            Ok(Some(bundle)) if !bundle.is_empty() => match credentials::materialize(&bundle, path)
            {
                Ok(()) => return Some(path.clone()),
                Err(e) => warn!("continuing without cookies: {}", e),
            },
            Ok(_) => {}
            Err(e) => {
                warn!("discarding unreadable stored credentials: {}", e);
                if let Err(e) = self.credentials.clear() {
                    warn!("failed to remove stored credentials: {}", e);
                }
            }
        }
        // Never hand a stale file from an earlier session to yt-dlp
        if let Err(e) = credentials::dispose(path) {
            warn!(path = %path.display(), "failed to remove stale cookie file: {}", e);
        }
        None
    }

    fn cancel(&mut self) {
        let Some(session) = self.session.as_mut() else {
            debug!("cancel requested with no active download");
            return;
        };
        if session.cancelled || session.auth_required {
            debug!(run = session.run, "download already stopping");
            return;
        }

        info!(
            run = session.run,
            part = session.parser.current_part(),
            "cancelling download"
        );
        session.cancelled = true;
        session.phase = DownloadPhase::Cancelling;
        session.process.terminate_tree();
    }

    fn retry_after_auth(&mut self, bundle: CredentialBundle) {
        if bundle.is_empty() {
            self.events
                .emit(SessionEvent::Failed(SessionFailure::EmptyCredentials));
            return;
        }
        if let Err(e) = self.credentials.save(&bundle) {
            error!("could not store sign-in cookies: {}", e);
            self.events
                .emit(SessionEvent::Failed(SessionFailure::CredentialStore(e.to_string())));
            return;
        }
        let Some(request) = self.awaiting_auth.take() else {
            self.events
                .emit(SessionEvent::Failed(SessionFailure::NothingToRetry));
            return;
        };

        info!("retrying download after sign-in");
        self.submit(request);
    }

    fn on_process_output(&mut self, run: RunId, output: ProcessOutput) {
        let Some(session) = self.session.as_mut().filter(|session| session.run == run) else {
            debug!(run, "ignoring output from a replaced run");
            return;
        };

        let (stream, lines) = match output {
            ProcessOutput::Stdout(chunk) => (OutputStream::Stdout, session.stdout.feed(&chunk)),
            ProcessOutput::Stderr(chunk) => (OutputStream::Stderr, session.stderr.feed(&chunk)),
            ProcessOutput::Exited(code) => {
                self.finish_run(code);
                return;
            }
        };

        for line in lines {
            if !self.handle_line(stream, &line) {
                break;
            }
        }
    }

    /// Returns false once the run should not see any more output.
    fn handle_line(&mut self, stream: OutputStream, line: &str) -> bool {
        let Some(session) = self.session.as_mut() else {
            return false;
        };
        if session.auth_required {
            return false;
        }

        for event in session.parser.parse_line(stream, line) {
            match event {
                OutputEvent::FragmentProgress(progress) => self
                    .events
                    .emit(SessionEvent::Progress(ProgressUpdate::Fragment(progress))),
                OutputEvent::PercentProgress(progress) => self
                    .events
                    .emit(SessionEvent::Progress(ProgressUpdate::Percent(progress))),
                OutputEvent::PartsAnnounced { current, total } => {
                    debug!(run = session.run, current, total, "multi-part download");
                }
                OutputEvent::FinalizingStarted => {
                    if session.phase == DownloadPhase::Running {
                        session.phase = DownloadPhase::Finalizing;
                    }
                    self.events.emit(SessionEvent::Finalizing);
                }
                OutputEvent::AuthRequired => {
                    if session.cancelled {
                        continue;
                    }
                    warn!(run = session.run, "yt-dlp needs sign-in cookies, stopping run");
                    session.auth_required = true;
                    if !session.exited {
                        session.process.terminate_tree();
                    }
                    self.awaiting_auth = Some(session.request.clone());
                    self.events.emit(SessionEvent::AuthRequired);
                }
                OutputEvent::OutputFile(path) => {
                    if session.tracked_files.insert(path.clone()) {
                        debug!(run = session.run, path = %path.display(), "tracking output file");
                    }
                }
                OutputEvent::RawOutput(text) => self.events.emit(SessionEvent::Output(text)),
            }
        }

        !session.auth_required
    }

    fn finish_run(&mut self, code: Option<i32>) {
        let tails = match self.session.as_mut() {
            Some(session) => {
                session.exited = true;
                [
                    (OutputStream::Stdout, session.stdout.finish()),
                    (OutputStream::Stderr, session.stderr.finish()),
                ]
            }
            None => return,
        };
        for (stream, tail) in tails {
            if let Some(line) = tail {
                self.handle_line(stream, &line);
            }
        }

        let Some(mut session) = self.session.take() else {
            return;
        };
        session.dispose_cookie_file();

        if session.auth_required {
            debug!(run = session.run, "run stopped for sign-in, nothing to report");
            self.last_phase = DownloadPhase::Idle;
            return;
        }

        if session.cancelled {
            remove_partial_output(&session.tracked_files);
            info!(run = session.run, "download cancelled");
            self.last_phase = DownloadPhase::Cancelled;
            self.events.emit(SessionEvent::Cancelled);
            return;
        }

        let completion = Completion { exit_code: code };
        info!(
            run = session.run,
            ?code,
            mode = ?session.parser.mode(),
            parts = session.parser.total_parts(),
            "download finished"
        );
        self.last_phase = if completion.is_success() {
            DownloadPhase::Completed
        } else {
            DownloadPhase::Failed
        };
        self.events.emit(SessionEvent::Completed(completion));
    }
}

impl Drop for Orchestrator {
    fn drop(&mut self) {
        if let Some(session) = self.session.as_mut() {
            if !session.exited {
                session.process.terminate_tree();
            }
            session.dispose_cookie_file();
        }
    }
}

/// Deletes each tracked file and its `.part` variant. Failures are logged
/// and otherwise ignored.
fn remove_partial_output(files: &BTreeSet<PathBuf>) {
    for file in files {
        for candidate in [file.clone(), part_file(file)] {
            match std::fs::remove_file(&candidate) {
                Ok(()) => debug!(path = %candidate.display(), "removed partial output"),
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => warn!(path = %candidate.display(), "failed to remove partial output: {}", e),
            }
        }
    }
}

/// yt-dlp arguments for one request. The URL is always last.
pub fn build_arguments(
    request: &DownloadRequest,
    muxer_dir: Option<&Path>,
    cookie_file: Option<&Path>,
    user_agent: &str,
) -> Vec<String> {
    let kind = request.kind();
    let mut args: Vec<String> = match kind {
        MediaKind::Video => vec![
            "-f".into(),
            request.quality().into(),
            "--merge-output-format".into(),
            "mp4".into(),
        ],
        MediaKind::Audio => vec![
            "-x".into(),
            "--audio-format".into(),
            "mp3".into(),
            "--audio-quality".into(),
            request.quality().into(),
        ],
        MediaKind::Thumbnail => vec!["--write-thumbnail".into(), "--skip-download".into()],
    };

    if kind != MediaKind::Thumbnail {
        if let Some(dir) = muxer_dir {
            args.push("--ffmpeg-location".into());
            args.push(dir.to_string_lossy().into_owned());
        }
        // No percent stream exists for thumbnails
        args.push("--progress".into());
    }

    let template = request.output_dir().join(OUTPUT_TEMPLATE);
    args.extend([
        "--no-playlist".to_string(),
        "--user-agent".to_string(),
        user_agent.to_string(),
        "--geo-bypass".to_string(),
        "--no-mtime".to_string(),
        "-o".to_string(),
        template.to_string_lossy().into_owned(),
    ]);

    if let Some(cookies) = cookie_file {
        args.push("--cookies".into());
        args.push(cookies.to_string_lossy().into_owned());
    }

    args.push(request.source_url().into());
    args
}
