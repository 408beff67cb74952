//! Reusable sign-in cookies and the Netscape cookie file yt-dlp reads.

use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use crate::utils::get_timestamp;

const NETSCAPE_HEADER: &str = "# Netscape HTTP Cookie File";
const HTTP_ONLY_PREFIX: &str = "#HttpOnly_";

#[derive(Error, Debug)]
pub enum CredentialError {
    #[error("Credential file I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("Credential file is corrupt: {0}")]
    Format(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, CredentialError>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CookieRecord {
    pub domain: String,
    pub path: String,
    pub secure: bool,
    /// Unix seconds; `None` for session cookies.
    pub expires_at: Option<i64>,
    pub name: String,
    pub value: String,
}

impl CookieRecord {
    fn to_netscape_line(&self) -> String {
        let domain = if self.domain.starts_with('.') {
            self.domain.clone()
        } else {
            format!(".{}", self.domain)
        };
        let expiry = self.expires_at.unwrap_or(0).to_string();
        [
            domain.as_str(),
            "TRUE",
            self.path.as_str(),
            if self.secure { "TRUE" } else { "FALSE" },
            expiry.as_str(),
            self.name.as_str(),
            self.value.as_str(),
        ]
        .join("\t")
    }

    fn from_netscape_line(line: &str) -> Option<Self> {
        let line = line.strip_prefix(HTTP_ONLY_PREFIX).unwrap_or(line);
        let fields: Vec<&str> = line.split('\t').collect();
        if fields.len() != 7 {
            return None;
        }
        let expiry: i64 = fields[4].trim().parse().ok()?;
        Some(Self {
            domain: fields[0].to_string(),
            path: fields[2].to_string(),
            secure: fields[3].eq_ignore_ascii_case("TRUE"),
            expires_at: (expiry > 0).then_some(expiry),
            name: fields[5].to_string(),
            value: fields[6].to_string(),
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialBundle {
    pub cookies: Vec<CookieRecord>,
}

impl CredentialBundle {
    pub fn new(cookies: Vec<CookieRecord>) -> Self {
        Self { cookies }
    }

    pub fn is_empty(&self) -> bool {
        self.cookies.is_empty()
    }

    pub fn to_netscape(&self) -> String {
        let mut out = String::from(NETSCAPE_HEADER);
        out.push('\n');
        for cookie in &self.cookies {
            out.push_str(&cookie.to_netscape_line());
            out.push('\n');
        }
        out
    }

    /// Reads a browser-exported cookies.txt. Malformed lines are skipped.
    pub fn parse_netscape(text: &str) -> Self {
        let cookies = text
            .lines()
            .map(str::trim_end)
            .filter(|line| !line.trim().is_empty())
            .filter(|line| line.starts_with(HTTP_ONLY_PREFIX) || !line.starts_with('#'))
            .filter_map(CookieRecord::from_netscape_line)
            .collect();
        Self { cookies }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct StoredCredentials {
    saved_at: u64,
    cookies: Vec<CookieRecord>,
}

/// Persists the last successful sign-in. A new save replaces the old bundle.
#[derive(Debug, Clone)]
pub struct CredentialStore {
    file: PathBuf,
}

impl CredentialStore {
    pub fn new(file: impl Into<PathBuf>) -> Self {
        Self { file: file.into() }
    }

    pub fn save(&self, bundle: &CredentialBundle) -> Result<()> {
        if let Some(parent) = self.file.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let stored = StoredCredentials {
            saved_at: get_timestamp(),
            cookies: bundle.cookies.clone(),
        };
        write_private(&self.file, &serde_json::to_vec_pretty(&stored)?)?;
        info!(cookies = bundle.cookies.len(), "saved sign-in cookies");
        Ok(())
    }

    pub fn load(&self) -> Result<Option<CredentialBundle>> {
        let bytes = match std::fs::read(&self.file) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let stored: StoredCredentials = serde_json::from_slice(&bytes)?;
        Ok(Some(CredentialBundle::new(stored.cookies)))
    }

    pub fn clear(&self) -> Result<()> {
        remove_if_present(&self.file)
    }
}

/// Writes the bundle where yt-dlp's `--cookies` flag will read it.
pub fn materialize(bundle: &CredentialBundle, destination: &Path) -> Result<()> {
    if let Some(parent) = destination.parent() {
        std::fs::create_dir_all(parent)?;
    }
    write_private(destination, bundle.to_netscape().as_bytes())?;
    debug!(path = %destination.display(), "cookie file written");
    Ok(())
}

pub fn dispose(path: &Path) -> Result<()> {
    remove_if_present(path)
}

/// Cookies are live session secrets: owner read/write only on unix.
fn write_private(path: &Path, contents: &[u8]) -> Result<()> {
    let mut options = std::fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    let mut file = options.open(path)?;

    // `mode` only applies on creation; tighten a file left by an older run
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        file.set_permissions(std::fs::Permissions::from_mode(0o600))?;
    }
    file.write_all(contents)?;
    Ok(())
}

fn remove_if_present(path: &Path) -> Result<()> {
    match std::fs::remove_file(path) {
        Ok(()) => {
            debug!(path = %path.display(), "removed");
            Ok(())
        }
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cookie(domain: &str, secure: bool, expires_at: Option<i64>) -> CookieRecord {
        CookieRecord {
            domain: domain.to_string(),
            path: "/".to_string(),
            secure,
            expires_at,
            name: "SID".to_string(),
            value: "abc".to_string(),
        }
    }

    #[test]
    fn test_netscape_format() {
        let bundle = CredentialBundle::new(vec![
            cookie(".youtube.com", true, Some(1_900_000_000)),
            cookie("youtube.com", false, None),
        ]);
        assert_eq!(
            bundle.to_netscape(),
            "# Netscape HTTP Cookie File\n\
             .youtube.com\tTRUE\t/\tTRUE\t1900000000\tSID\tabc\n\
             .youtube.com\tTRUE\t/\tFALSE\t0\tSID\tabc\n"
        );
    }

    #[test]
    fn test_parse_browser_export() {
        let text = "# Netscape HTTP Cookie File\n\
                    # comment\n\
                    \n\
                    #HttpOnly_.youtube.com\tTRUE\t/\tTRUE\t1900000000\tLOGIN_INFO\txyz\n\
                    .youtube.com\tTRUE\t/\tFALSE\t0\tPREF\tf6=40000000\n\
                    broken line\n";
        let bundle = CredentialBundle::parse_netscape(text);
        assert_eq!(bundle.cookies.len(), 2);
        assert_eq!(bundle.cookies[0].name, "LOGIN_INFO");
        assert!(bundle.cookies[0].secure);
        assert_eq!(bundle.cookies[1].expires_at, None);
        assert_eq!(bundle.cookies[1].value, "f6=40000000");
    }

    #[test]
    fn test_store_overwrites_and_loads() {
        let tmp = tempfile::tempdir().unwrap();
        let store = CredentialStore::new(tmp.path().join("nested").join("credentials.json"));
        assert_eq!(store.load().unwrap(), None);

        store
            .save(&CredentialBundle::new(vec![cookie("a.com", false, None)]))
            .unwrap();
        let latest = CredentialBundle::new(vec![cookie("b.com", true, Some(5))]);
        store.save(&latest).unwrap();
        assert_eq!(store.load().unwrap(), Some(latest));

        store.clear().unwrap();
        assert_eq!(store.load().unwrap(), None);
    }

    #[test]
    fn test_corrupt_store_is_an_error() {
        let tmp = tempfile::tempdir().unwrap();
        let file = tmp.path().join("credentials.json");
        std::fs::write(&file, b"not json").unwrap();
        assert!(matches!(
            CredentialStore::new(file).load(),
            Err(CredentialError::Format(_))
        ));
    }

    #[test]
    fn test_materialize_then_dispose() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("session").join("cookies.txt");
        let bundle = CredentialBundle::new(vec![cookie(".youtube.com", true, None)]);

        materialize(&bundle, &path).unwrap();
        assert!(std::fs::read_to_string(&path)
            .unwrap()
            .starts_with(NETSCAPE_HEADER));

        dispose(&path).unwrap();
        assert!(!path.exists());
        // Disposing twice is fine
        dispose(&path).unwrap();
    }

    #[cfg(unix)]
    #[test]
    fn test_cookie_files_are_owner_only() {
        use std::os::unix::fs::PermissionsExt;

        let tmp = tempfile::tempdir().unwrap();
        let store_file = tmp.path().join("credentials.json");
        let cookie_file = tmp.path().join("cookies.txt");
        // A pre-existing world-readable file is tightened too
        std::fs::write(&cookie_file, b"old").unwrap();
        std::fs::set_permissions(&cookie_file, std::fs::Permissions::from_mode(0o644)).unwrap();

        let bundle = CredentialBundle::new(vec![cookie("a.com", true, None)]);
        CredentialStore::new(&store_file).save(&bundle).unwrap();
        materialize(&bundle, &cookie_file).unwrap();

        for path in [&store_file, &cookie_file] {
            let mode = std::fs::metadata(path).unwrap().permissions().mode();
            assert_eq!(mode & 0o777, 0o600, "{}", path.display());
        }
        assert!(std::fs::read_to_string(&cookie_file)
            .unwrap()
            .starts_with(NETSCAPE_HEADER));
    }
}
