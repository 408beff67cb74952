/// Configuration for the release client
#[derive(Debug, Clone)]
pub struct ReleaseConfig {
    pub base_url: String,
    pub asset_name: String,
    pub checksums_name: String,
    pub max_redirects: usize,
}

impl Default for ReleaseConfig {
    fn default() -> Self {
        Self {
            base_url: "https://github.com/yt-dlp/yt-dlp/releases/latest/download".to_string(),
            asset_name: platform_asset().to_string(),
            checksums_name: "SHA2-256SUMS".to_string(),
            max_redirects: 10,
        }
    }
}

/// Release asset matching the running platform
pub fn platform_asset() -> &'static str {
    if cfg!(target_os = "windows") {
        "yt-dlp.exe"
    } else if cfg!(target_os = "macos") {
        "yt-dlp_macos"
    } else {
        "yt-dlp"
    }
}

/// Outcome of comparing the installed binary against the latest release
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateStatus {
    UpToDate,
    Available { local: String, remote: String },
    /// The checksums file does not list our asset
    Unknown,
}
