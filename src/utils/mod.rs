use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

/// Get current Unix timestamp in seconds
pub fn get_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

/// The in-progress variant yt-dlp writes before renaming: `name.ext.part`
pub fn part_file(path: &Path) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(".part");
    PathBuf::from(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timestamp() {
        let ts = get_timestamp();
        assert!(ts > 1700000000); // Sanity check
    }

    #[test]
    fn test_part_file() {
        assert_eq!(
            part_file(Path::new("/out/Song [abc].mp4")),
            PathBuf::from("/out/Song [abc].mp4.part")
        );
    }
}
