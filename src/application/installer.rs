use std::path::{Path, PathBuf};

use futures::{stream::BoxStream, StreamExt};
use tokio::io::AsyncWriteExt;
use tracing::{info, warn};

use crate::{
    api::{ReleaseClient, UpdateStatus},
    domain::AppError,
};

#[derive(Debug, Clone)]
pub enum InstallEvent {
    Progress(f32),
    Completed(PathBuf),
    Failed(AppError),
}

/// Maintains the managed yt-dlp binary. Never started by a download; the
/// user triggers it from the dependency banner.
#[derive(Clone)]
pub struct DependencyInstaller {
    client: ReleaseClient,
}

impl DependencyInstaller {
    pub fn new(client: ReleaseClient) -> Self {
        Self { client }
    }

    pub async fn check_for_update(&self, local_binary: PathBuf) -> Result<UpdateStatus, AppError> {
        self.client
            .check_for_update(&local_binary)
            .await
            .map_err(|e| AppError::Api(e.to_string()))
    }

    pub fn install_stream(&self, target: PathBuf) -> BoxStream<'static, InstallEvent> {
        futures::stream::unfold(
            InstallState::Start {
                client: self.client.clone(),
                target,
            },
            |state| async move {
                match state {
                    InstallState::Start { client, target } => {
                        let temp = temp_path(&target);
                        if let Some(parent) = target.parent() {
                            if let Err(e) = tokio::fs::create_dir_all(parent).await {
                                return Some((
                                    InstallEvent::Failed(AppError::Io(format!(
                                        "Failed to create {}: {}",
                                        parent.display(),
                                        e
                                    ))),
                                    InstallState::Finished,
                                ));
                            }
                        }

                        let file = match tokio::fs::File::create(&temp).await {
                            Ok(file) => file,
                            Err(e) => {
                                return Some((
                                    InstallEvent::Failed(AppError::Io(format!(
                                        "Failed to create file: {}",
                                        e
                                    ))),
                                    InstallState::Finished,
                                ));
                            }
                        };

                        match client.download_file_stream().await {
                            Ok((total_size, stream)) => Some((
                                InstallEvent::Progress(0.0),
                                InstallState::Downloading {
                                    file,
                                    stream: stream.boxed(),
                                    downloaded: 0,
                                    total: total_size,
                                    temp,
                                    target,
                                },
                            )),
                            Err(e) => {
                                drop(file);
                                discard(&temp).await;
                                Some((
                                    InstallEvent::Failed(AppError::Api(e.to_string())),
                                    InstallState::Finished,
                                ))
                            }
                        }
                    }
                    InstallState::Downloading {
                        mut file,
                        mut stream,
                        mut downloaded,
                        total,
                        temp,
                        target,
                    } => match stream.next().await {
                        Some(Ok(chunk)) => {
                            if let Err(e) = file.write_all(&chunk).await {
                                drop(file);
                                discard(&temp).await;
                                return Some((
                                    InstallEvent::Failed(AppError::Io(format!(
                                        "Write error: {}",
                                        e
                                    ))),
                                    InstallState::Finished,
                                ));
                            }

                            downloaded += chunk.len() as u64;

                            let progress = match total {
                                Some(total_size) if total_size > 0 => {
                                    downloaded as f32 / total_size as f32
                                }
                                _ => 0.0,
                            };

                            Some((
                                InstallEvent::Progress(progress),
                                InstallState::Downloading {
                                    file,
                                    stream,
                                    downloaded,
                                    total,
                                    temp,
                                    target,
                                },
                            ))
                        }
                        Some(Err(e)) => {
                            drop(file);
                            discard(&temp).await;
                            Some((
                                InstallEvent::Failed(AppError::Api(e.to_string())),
                                InstallState::Finished,
                            ))
                        }
                        None => {
                            let finished = finish_install(file, &temp, &target).await;
                            match finished {
                                Ok(()) => {
                                    info!(path = %target.display(), bytes = downloaded, "yt-dlp installed");
                                    Some((
                                        InstallEvent::Completed(target),
                                        InstallState::Finished,
                                    ))
                                }
                                Err(e) => {
                                    discard(&temp).await;
                                    Some((
                                        InstallEvent::Failed(AppError::Io(format!(
                                            "Failed to install: {}",
                                            e
                                        ))),
                                        InstallState::Finished,
                                    ))
                                }
                            }
                        }
                    },
                    InstallState::Finished => None,
                }
            },
        )
        .boxed()
    }
}

enum InstallState {
    Start {
        client: ReleaseClient,
        target: PathBuf,
    },
    Downloading {
        file: tokio::fs::File,
        stream: BoxStream<'static, crate::api::Result<bytes::Bytes>>,
        downloaded: u64,
        total: Option<u64>,
        temp: PathBuf,
        target: PathBuf,
    },
    Finished,
}

fn temp_path(target: &Path) -> PathBuf {
    target.with_extension("download")
}

async fn finish_install(mut file: tokio::fs::File, temp: &Path, target: &Path) -> std::io::Result<()> {
    file.flush().await?;
    file.sync_all().await?;
    drop(file);

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        tokio::fs::set_permissions(temp, std::fs::Permissions::from_mode(0o755)).await?;
    }

    tokio::fs::rename(temp, target).await
}

async fn discard(temp: &Path) {
    if let Err(e) = tokio::fs::remove_file(temp).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            warn!(path = %temp.display(), "failed to remove partial download: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::ReleaseConfig;

    fn installer_for(server: &mockito::Server) -> DependencyInstaller {
        DependencyInstaller::new(ReleaseClient::new(ReleaseConfig {
            base_url: server.url(),
            asset_name: "yt-dlp".to_string(),
            ..Default::default()
        }))
    }

    #[tokio::test]
    async fn test_install_writes_binary() {
        let mut server = mockito::Server::new_async().await;
        let _asset = server
            .mock("GET", "/yt-dlp")
            .with_status(200)
            .with_body("#!/bin/sh\necho 2025.01.01\n")
            .create_async()
            .await;

        let tmp = tempfile::tempdir().unwrap();
        let target = tmp.path().join("bin").join("yt-dlp");
        let events: Vec<InstallEvent> = installer_for(&server)
            .install_stream(target.clone())
            .collect()
            .await;

        assert!(matches!(events.first(), Some(InstallEvent::Progress(p)) if *p == 0.0));
        assert!(events
            .iter()
            .any(|e| matches!(e, InstallEvent::Progress(p) if *p == 1.0)));
        assert!(matches!(events.last(), Some(InstallEvent::Completed(path)) if *path == target));
        assert_eq!(
            std::fs::read_to_string(&target).unwrap(),
            "#!/bin/sh\necho 2025.01.01\n"
        );
        assert!(!temp_path(&target).exists());

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = std::fs::metadata(&target).unwrap().permissions().mode();
            assert_eq!(mode & 0o111, 0o111);
        }
    }

    #[tokio::test]
    async fn test_failed_download_leaves_nothing() {
        let mut server = mockito::Server::new_async().await;
        let _asset = server
            .mock("GET", "/yt-dlp")
            .with_status(500)
            .create_async()
            .await;

        let tmp = tempfile::tempdir().unwrap();
        let target = tmp.path().join("yt-dlp");
        let events: Vec<InstallEvent> = installer_for(&server)
            .install_stream(target.clone())
            .collect()
            .await;

        assert_eq!(events.len(), 1);
        assert!(matches!(&events[0], InstallEvent::Failed(AppError::Api(_))));
        assert!(!target.exists());
        assert!(!temp_path(&target).exists());
    }
}
