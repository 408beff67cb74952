use std::path::PathBuf;

use futures::{channel::mpsc, SinkExt, Stream, StreamExt};
use iced::{Subscription, Task};
use tracing::{info, warn};

use crate::api::{ReleaseClient, UpdateStatus};
use crate::application::{
    event_channel, session_channel, DependencyInstaller, InstallEvent, Orchestrator,
    OrchestratorParts, SessionEvent, SessionHandle, TokioLauncher,
};
use crate::config::AppConfig;
use crate::credentials::CredentialBundle;
use crate::dependencies::binary_file_name;
use crate::domain::{AppError, DownloadRequest};
use crate::ui::{DownloadMessage, DownloadView};

pub struct DownloadApp {
    view: DownloadView,
    config: AppConfig,
    installer: DependencyInstaller,
    session: Option<SessionHandle>,
    update_checked: bool,
}

impl Default for DownloadApp {
    fn default() -> Self {
        Self::new(AppConfig::default())
    }
}

impl DownloadApp {
    pub fn new(config: AppConfig) -> Self {
        let installer = DependencyInstaller::new(ReleaseClient::new(config.release.clone()));
        let mut view = DownloadView::default();
        if let Some(downloads) = dirs::download_dir() {
            view.output_dir = downloads.display().to_string();
        }

        Self {
            view,
            config,
            installer,
            session: None,
            update_checked: false,
        }
    }

    fn managed_binary(&self) -> PathBuf {
        self.config
            .managed_bin_dir
            .join(binary_file_name(&self.config.downloader_name))
    }

    fn send(&mut self, action: impl FnOnce(&SessionHandle) -> bool) {
        let delivered = self.session.as_ref().is_some_and(action);
        if !delivered {
            warn!("download session is not running");
            self.view.is_downloading = false;
            self.view.status_message = "Error: download session is not running".to_string();
        }
    }
}

#[derive(Debug, Clone)]
pub enum Message {
    UiMessage(DownloadMessage),
    SessionReady(SessionHandle),
    Session(SessionEvent),
    OutputDirSelected(Option<PathBuf>),
    /// `Ok(None)` when the file dialog was dismissed
    CookiesImported(Result<Option<CredentialBundle>, AppError>),
    UpdateChecked(Result<UpdateStatus, AppError>),
    Install(InstallEvent),
}

pub fn update(app: &mut DownloadApp, message: Message) -> Task<Message> {
    match message {
        Message::UiMessage(ui_msg) => {
            app.view.update(ui_msg.clone());

            match ui_msg {
                DownloadMessage::DownloadPressed => {
                    if app.view.is_downloading {
                        if !app.view.cancelling {
                            app.view.cancelling = true;
                            app.view.status_message = "Cancelling...".to_string();
                            app.send(SessionHandle::cancel);
                        }
                    } else {
                        let selector = app
                            .view
                            .quality
                            .as_ref()
                            .map(|preset| preset.selector.clone())
                            .unwrap_or_default();
                        match DownloadRequest::new(
                            app.view.url.clone(),
                            app.view.kind,
                            selector,
                            app.view.output_dir.clone(),
                        ) {
                            Ok(request) => {
                                app.view.is_downloading = true;
                                app.view.needs_sign_in = false;
                                app.view.progress = 0.0;
                                app.view.last_output.clear();
                                app.view.status_message = "Initializing download...".to_string();
                                app.send(|session| session.submit(request));
                            }
                            Err(e) => {
                                app.view.status_message = e.to_string();
                            }
                        }
                    }
                }
                DownloadMessage::BrowsePressed => {
                    return Task::perform(
                        async {
                            rfd::AsyncFileDialog::new()
                                .set_title("Select output folder")
                                .pick_folder()
                                .await
                                .map(|handle| handle.path().to_path_buf())
                        },
                        Message::OutputDirSelected,
                    );
                }
                DownloadMessage::SignInPressed => {
                    app.view.status_message = "Select an exported cookies.txt file...".to_string();
                    return Task::perform(import_cookies(), Message::CookiesImported);
                }
                DownloadMessage::InstallPressed => {
                    if !app.view.installing {
                        app.view.installing = true;
                        app.view.update_available = false;
                        app.view.progress = 0.0;
                        app.view.status_message = "Downloading yt-dlp...".to_string();
                        let target = app.managed_binary();
                        info!(path = %target.display(), "installing yt-dlp");
                        return Task::stream(
                            app.installer.install_stream(target).map(Message::Install),
                        );
                    }
                }
                _ => {}
            }
        }
        Message::SessionReady(handle) => {
            app.session = Some(handle);
        }
        Message::Session(event) => return on_session_event(app, event),
        Message::OutputDirSelected(Some(path)) => {
            app.view.output_dir = path.display().to_string();
        }
        Message::OutputDirSelected(None) => {}
        Message::CookiesImported(result) => match result {
            Ok(Some(bundle)) => {
                app.view.needs_sign_in = false;
                app.view.is_downloading = true;
                app.view.progress = 0.0;
                app.view.status_message = "Sign-in complete. Retrying download...".to_string();
                app.send(|session| session.acknowledge_auth_retry(bundle));
            }
            Ok(None) => {
                app.view.status_message = "Sign-in cancelled.".to_string();
            }
            Err(e) => {
                app.view.status_message = format!("Error: {}", e);
            }
        },
        Message::UpdateChecked(result) => match result {
            Ok(UpdateStatus::Available { .. }) => {
                app.view.update_available = true;
            }
            Ok(_) => {}
            Err(e) => warn!("update check failed: {}", e),
        },
        Message::Install(event) => match event {
            InstallEvent::Progress(fraction) => {
                app.view.progress = fraction * 100.0;
                app.view.status_message =
                    format!("Downloading yt-dlp: {:.1}%", fraction * 100.0);
            }
            InstallEvent::Completed(path) => {
                app.view.installing = false;
                app.view.status_message = format!("Installed yt-dlp to {}", path.display());
                app.send(SessionHandle::check_dependencies);
            }
            InstallEvent::Failed(e) => {
                app.view.installing = false;
                app.view.progress = 0.0;
                app.view.status_message = format!("Error: {}", e);
            }
        },
    }
    Task::none()
}

fn on_session_event(app: &mut DownloadApp, event: SessionEvent) -> Task<Message> {
    let view = &mut app.view;
    match event {
        SessionEvent::DependencyStatus(deps) => {
            let downloader = deps.downloader.clone();
            view.dependencies = Some(deps);
            if let Some(path) = downloader.filter(|_| !app.update_checked) {
                app.update_checked = true;
                let installer = app.installer.clone();
                return Task::perform(
                    async move { installer.check_for_update(path).await },
                    Message::UpdateChecked,
                );
            }
        }
        SessionEvent::Progress(update) => {
            view.progress = update.overall() as f32;
            view.status_message = update.details();
        }
        SessionEvent::Finalizing => {
            view.progress = 100.0;
            view.status_message = "Finalizing...".to_string();
        }
        SessionEvent::AuthRequired => {
            view.is_downloading = false;
            view.cancelling = false;
            view.needs_sign_in = true;
            view.status_message = "This video requires you to be signed in.".to_string();
        }
        SessionEvent::Output(line) => {
            if let Some(message) = line.strip_prefix("[STDERR] ") {
                if !view.needs_sign_in && message.starts_with("ERROR") {
                    view.status_message = format!("Error: {}", message);
                }
            }
            view.last_output = line;
        }
        SessionEvent::Completed(completion) => {
            view.is_downloading = false;
            view.cancelling = false;
            if completion.is_success() {
                view.progress = 100.0;
                view.status_message = "Download completed successfully!".to_string();
            } else if !view.status_message.starts_with("Error:") {
                view.status_message = match completion.exit_code {
                    Some(code) => format!("Download failed (exit code {}).", code),
                    None => "Download failed (process was killed).".to_string(),
                };
            }
        }
        SessionEvent::Cancelled => {
            view.is_downloading = false;
            view.cancelling = false;
            view.progress = 0.0;
            view.status_message = "Download cancelled.".to_string();
        }
        SessionEvent::Failed(failure) => {
            view.is_downloading = false;
            view.cancelling = false;
            view.status_message = format!("Error: {}", failure);
        }
    }
    Task::none()
}

async fn import_cookies() -> Result<Option<CredentialBundle>, AppError> {
    let Some(path) = rfd::AsyncFileDialog::new()
        .set_title("Select exported cookies.txt")
        .add_filter("Cookies", &["txt"])
        .pick_file()
        .await
        .map(|handle| handle.path().to_path_buf())
    else {
        return Ok(None);
    };

    let text = tokio::fs::read_to_string(&path)
        .await
        .map_err(|e| AppError::Io(format!("Failed to read cookies: {}", e)))?;
    Ok(Some(CredentialBundle::parse_netscape(&text)))
}

pub fn view(app: &DownloadApp) -> iced::Element<'_, Message> {
    app.view.view().map(Message::UiMessage)
}

pub fn subscription(_app: &DownloadApp) -> Subscription<Message> {
    Subscription::run(session_worker)
}

/// Runs the orchestrator loop for the lifetime of the window and forwards
/// its events.
fn session_worker() -> impl Stream<Item = Message> {
    iced::stream::channel(100, |mut output: mpsc::Sender<Message>| async move {
        let config = AppConfig::default();
        let (handle, inbox) = session_channel();
        let (events, mut event_rx) = event_channel();

        let parts = OrchestratorParts::from_config(&config, Box::new(TokioLauncher));
        let orchestrator = Orchestrator::new(parts, &handle, events);
        tokio::spawn(orchestrator.run(inbox));

        handle.check_dependencies();
        if output.send(Message::SessionReady(handle)).await.is_err() {
            return;
        }

        while let Some(event) = event_rx.recv().await {
            if output.send(Message::Session(event)).await.is_err() {
                break;
            }
        }
        info!("download session stopped");
    })
}
