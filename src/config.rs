use std::path::PathBuf;

use crate::api::ReleaseConfig;

const APP_DIR_NAME: &str = "ytdlp-desk";
const HOME_ENV: &str = "YTDLP_DESK_HOME";

pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/108.0.0.0 Safari/537.36";

/// Application-wide settings. Every path hangs off `data_dir`.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub data_dir: PathBuf,
    pub managed_bin_dir: PathBuf,
    pub credentials_file: PathBuf,
    /// Session-scoped; only exists while a download is running.
    pub cookie_file: PathBuf,
    pub user_agent: String,
    pub downloader_name: String,
    pub muxer_name: String,
    pub release: ReleaseConfig,
}

impl AppConfig {
    pub fn with_data_dir(data_dir: impl Into<PathBuf>) -> Self {
        let data_dir = data_dir.into();
        Self {
            managed_bin_dir: data_dir.join("bin"),
            credentials_file: data_dir.join("credentials.json"),
            cookie_file: data_dir.join("cookies.txt"),
            data_dir,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            downloader_name: "yt-dlp".to_string(),
            muxer_name: "ffmpeg".to_string(),
            release: ReleaseConfig::default(),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        let data_dir = std::env::var_os(HOME_ENV)
            .filter(|value| !value.is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(|| {
                dirs::data_local_dir()
                    .unwrap_or_else(std::env::temp_dir)
                    .join(APP_DIR_NAME)
            });
        Self::with_data_dir(data_dir)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_paths_follow_data_dir() {
        let config = AppConfig::with_data_dir("/data/app");
        assert_eq!(config.managed_bin_dir, PathBuf::from("/data/app/bin"));
        assert_eq!(config.cookie_file, PathBuf::from("/data/app/cookies.txt"));
        assert_eq!(
            config.credentials_file,
            PathBuf::from("/data/app/credentials.json")
        );
        assert_eq!(config.data_dir, PathBuf::from("/data/app"));
    }
}
