use iced::{
    widget::{button, column, pick_list, progress_bar, row, text, text_input, Space},
    Element, Length,
};

use crate::dependencies::DependencyPaths;
use crate::domain::{MediaKind, QualityPreset};

/// Main view state
pub struct DownloadView {
    pub url: String,
    pub kind: MediaKind,
    pub presets: Vec<QualityPreset>,
    pub quality: Option<QualityPreset>,
    pub output_dir: String,
    pub status_message: String,
    /// 0..=100
    pub progress: f32,
    pub is_downloading: bool,
    pub cancelling: bool,
    pub needs_sign_in: bool,
    pub dependencies: Option<DependencyPaths>,
    pub update_available: bool,
    pub installing: bool,
    pub last_output: String,
}

impl Default for DownloadView {
    fn default() -> Self {
        let kind = MediaKind::default();
        let presets = kind.presets();
        Self {
            url: String::new(),
            kind,
            quality: presets.first().cloned(),
            presets,
            output_dir: String::new(),
            status_message: "Paste a link and choose where to save it".to_string(),
            progress: 0.0,
            is_downloading: false,
            cancelling: false,
            needs_sign_in: false,
            dependencies: None,
            update_available: false,
            installing: false,
            last_output: String::new(),
        }
    }
}

#[derive(Debug, Clone)]
pub enum DownloadMessage {
    UrlChanged(String),
    KindSelected(MediaKind),
    QualitySelected(QualityPreset),
    BrowsePressed,
    DownloadPressed,
    SignInPressed,
    InstallPressed,
    DismissUpdate,
}

impl DownloadView {
    pub fn update(&mut self, message: DownloadMessage) {
        match message {
            DownloadMessage::UrlChanged(url) => {
                self.url = url;
            }
            DownloadMessage::KindSelected(kind) => {
                self.kind = kind;
                self.presets = kind.presets();
                self.quality = self.presets.first().cloned();
            }
            DownloadMessage::QualitySelected(preset) => {
                self.quality = Some(preset);
            }
            DownloadMessage::DismissUpdate => {
                self.update_available = false;
            }
            // Will be handled by the app
            DownloadMessage::BrowsePressed
            | DownloadMessage::DownloadPressed
            | DownloadMessage::SignInPressed
            | DownloadMessage::InstallPressed => {}
        }
    }

    fn form_enabled(&self) -> bool {
        self.dependencies
            .as_ref()
            .is_some_and(DependencyPaths::is_ready)
    }

    fn dependency_banner(&self) -> Option<Element<'_, DownloadMessage>> {
        let deps = self.dependencies.as_ref()?;
        let message = match (deps.downloader.is_some(), deps.muxer.is_some()) {
            (true, true) => return None,
            (false, false) => "yt-dlp and FFmpeg are missing. Both are needed to download and merge videos.",
            (false, true) => "yt-dlp was not found. It is needed to download videos.",
            (true, false) => "FFmpeg was not found on PATH. It is needed to merge video and audio.",
        };

        let install = (deps.downloader.is_none() && !self.installing)
            .then_some(DownloadMessage::InstallPressed);
        Some(
            column![
                text(message).size(14),
                button(if self.installing {
                    "Installing..."
                } else {
                    "Install yt-dlp"
                })
                .on_press_maybe(install)
                .padding([6, 12]),
            ]
            .spacing(6)
            .into(),
        )
    }

    pub fn view(&self) -> Element<'_, DownloadMessage> {
        let enabled = self.form_enabled() && !self.cancelling;

        let action = if self.is_downloading {
            if self.cancelling {
                "Cancelling..."
            } else {
                "Cancel"
            }
        } else {
            "Download"
        };

        let mut content = column![text("yt-dlp Desk").size(32)].spacing(10).padding(20);

        if let Some(banner) = self.dependency_banner() {
            content = content.push(banner);
        }

        if self.update_available {
            content = content.push(
                row![
                    text("A yt-dlp update is available.").size(14),
                    button("Update now")
                        .on_press_maybe(
                            (!self.installing).then_some(DownloadMessage::InstallPressed)
                        )
                        .padding([6, 12]),
                    button("Later")
                        .on_press(DownloadMessage::DismissUpdate)
                        .padding([6, 12]),
                ]
                .spacing(10),
            );
        }

        content = content
            .push(Space::new().height(Length::Fixed(10.0)))
            .push(text("Video URL:").size(16))
            .push(
                text_input("https://www.youtube.com/watch?v=...", &self.url)
                    .on_input(DownloadMessage::UrlChanged)
                    .padding(10),
            )
            .push(
                row![
                    pick_list(MediaKind::ALL, Some(self.kind), DownloadMessage::KindSelected),
                    pick_list(
                        self.presets.as_slice(),
                        self.quality.as_ref(),
                        DownloadMessage::QualitySelected
                    ),
                ]
                .spacing(10),
            )
            .push(
                row![
                    text_input("Output folder", &self.output_dir).padding(10),
                    button("Browse")
                        .on_press(DownloadMessage::BrowsePressed)
                        .padding([10, 20]),
                ]
                .spacing(10),
            )
            .push(Space::new().height(Length::Fixed(10.0)))
            .push(progress_bar(0.0..=100.0, self.progress))
            .push(text(format!("{:.1}%", self.progress)).size(14))
            .push(text(&self.status_message).size(14));

        if self.needs_sign_in {
            content = content.push(
                row![
                    text("Cookies error. Sign in through your browser, export cookies.txt, then").size(14),
                    button("Sign In")
                        .on_press(DownloadMessage::SignInPressed)
                        .padding([6, 12]),
                ]
                .spacing(10),
            );
        }

        content
            .push(Space::new().height(Length::Fixed(20.0)))
            .push(
                button(action)
                    .on_press_maybe(enabled.then_some(DownloadMessage::DownloadPressed))
                    .padding([10, 20]),
            )
            .push(text(&self.last_output).size(12))
            .into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_change_resets_quality() {
        let mut view = DownloadView::default();
        view.update(DownloadMessage::KindSelected(MediaKind::Audio));
        assert_eq!(view.presets, MediaKind::Audio.presets());
        assert_eq!(view.quality.as_ref().map(|q| q.selector.as_str()), Some("0"));
    }

    #[test]
    fn test_form_disabled_until_dependencies_ready() {
        let mut view = DownloadView::default();
        assert!(!view.form_enabled());
        view.dependencies = Some(DependencyPaths {
            downloader: Some("yt-dlp".into()),
            muxer: Some("ffmpeg".into()),
        });
        assert!(view.form_enabled());
    }
}
