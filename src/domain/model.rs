use std::fmt;
use std::path::{Path, PathBuf};

use super::AppError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum MediaKind {
    #[default]
    Video,
    Audio,
    Thumbnail,
}

impl MediaKind {
    pub const ALL: [MediaKind; 3] = [MediaKind::Video, MediaKind::Audio, MediaKind::Thumbnail];

    /// Quality choices offered for this kind, best first.
    pub fn presets(self) -> Vec<QualityPreset> {
        match self {
            MediaKind::Video => {
                let mut presets = vec![QualityPreset::new(
                    "Best Available",
                    "bestvideo[ext=mp4]+bestaudio[ext=m4a]/best",
                )];
                for (label, height) in [
                    ("4K (2160p)", 2160),
                    ("1440p", 1440),
                    ("1080p", 1080),
                    ("720p", 720),
                    ("480p", 480),
                    ("360p", 360),
                    ("240p", 240),
                ] {
                    presets.push(QualityPreset::new(
                        label,
                        format!(
                            "bestvideo[height<={height}][ext=mp4]+bestaudio[ext=m4a]/best[height<={height}]"
                        ),
                    ));
                }
                presets
            }
            MediaKind::Audio => vec![
                QualityPreset::new("Best Quality (MP3)", "0"),
                QualityPreset::new("High Quality (MP3)", "3"),
                QualityPreset::new("Medium Quality (MP3)", "5"),
                QualityPreset::new("Low Quality (MP3)", "7"),
            ],
            MediaKind::Thumbnail => vec![
                QualityPreset::new("Max Resolution", "maxresdefault"),
                QualityPreset::new("High Quality", "hqdefault"),
                QualityPreset::new("Medium Quality", "mqdefault"),
                QualityPreset::new("Standard", "sddefault"),
            ],
        }
    }
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            MediaKind::Video => "Video",
            MediaKind::Audio => "Audio",
            MediaKind::Thumbnail => "Thumbnail",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QualityPreset {
    pub label: String,
    pub selector: String,
}

impl QualityPreset {
    fn new(label: impl Into<String>, selector: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            selector: selector.into(),
        }
    }
}

impl fmt::Display for QualityPreset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label)
    }
}

/// A validated download request. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadRequest {
    source_url: String,
    kind: MediaKind,
    quality: String,
    output_dir: PathBuf,
}

impl DownloadRequest {
    pub fn new(
        source_url: impl Into<String>,
        kind: MediaKind,
        quality: impl Into<String>,
        output_dir: impl Into<PathBuf>,
    ) -> Result<Self, AppError> {
        let source_url = source_url.into().trim().to_string();
        let quality = quality.into().trim().to_string();
        let output_dir = output_dir.into();

        if source_url.is_empty() {
            return Err(AppError::InvalidInput("URL is empty".to_string()));
        }
        if quality.is_empty() {
            return Err(AppError::InvalidInput("No quality selected".to_string()));
        }
        if output_dir.as_os_str().to_string_lossy().trim().is_empty() {
            return Err(AppError::InvalidInput(
                "No output directory selected".to_string(),
            ));
        }

        Ok(Self {
            source_url,
            kind,
            quality,
            output_dir,
        })
    }

    pub fn source_url(&self) -> &str {
        &self.source_url
    }

    pub fn kind(&self) -> MediaKind {
        self.kind
    }

    pub fn quality(&self) -> &str {
        &self.quality
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DownloadPhase {
    #[default]
    Idle,
    Preparing,
    Running,
    Finalizing,
    Cancelling,
    Completed,
    Cancelled,
    Failed,
}

/// Which kind of progress line the downloader has been printing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProgressMode {
    #[default]
    Unknown,
    Percent,
    Fragment,
}
