use std::path::{Path, PathBuf};
use std::time::Duration;

use reqwest::header::USER_AGENT;
use tokio::task::JoinSet;
use tracing::{debug, error, info};

use crate::error::{RenderError, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageRequest {
    /// 1-based scene position.
    pub scene: usize,
    pub url: String,
    pub dest: PathBuf,
}

pub fn client(timeout: Duration) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| RenderError::runtime("failed to build HTTP client", e))
}

pub async fn download_image(client: &reqwest::Client, request: &ImageRequest) -> Result<PathBuf> {
    let failed = |reason: String| RenderError::Download {
        scene: request.scene,
        url: request.url.clone(),
        reason,
    };

    debug!("Downloading image for scene {}: {}", request.scene, request.url);
    let bytes = client
        .get(&request.url)
        .header(USER_AGENT, "headline-shorts/0.1")
        .send()
        .await
        .map_err(|e| failed(e.to_string()))?
        .error_for_status()
        .map_err(|e| failed(e.to_string()))?
        .bytes()
        .await
        .map_err(|e| failed(e.to_string()))?;

    tokio::fs::write(&request.dest, &bytes).await?;
    info!(
        "Scene {}: downloaded {} bytes to {}",
        request.scene,
        bytes.len(),
        request.dest.display()
    );
    Ok(request.dest.clone())
}

/// Fetches all images concurrently. On failure the error for the lowest scene wins,
/// so the reported scene does not depend on network timing.
pub async fn download_all(
    client: &reqwest::Client,
    requests: Vec<ImageRequest>,
) -> Result<Vec<(usize, PathBuf)>> {
    let mut tasks = JoinSet::new();
    for request in requests {
        let client = client.clone();
        tasks.spawn(async move {
            let result = download_image(&client, &request).await;
            (request.scene, result)
        });
    }

    let mut done = Vec::new();
    let mut failures = Vec::new();
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok((scene, Ok(path))) => done.push((scene, path)),
            Ok((scene, Err(err))) => {
                error!("{}", err);
                failures.push((scene, err));
            }
            Err(join_error) => return Err(RenderError::runtime("image download task failed", join_error)),
        }
    }

    if let Some((_, err)) = failures.into_iter().min_by_key(|(scene, _)| *scene) {
        return Err(err);
    }
    done.sort_by_key(|(scene, _)| *scene);
    Ok(done)
}

pub fn image_dest(dir: &Path, scene: usize) -> PathBuf {
    dir.join(format!("scene_{:03}.img", scene))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Answers every request with `status` and a small body.
    async fn serve(status: &'static str, body: &'static [u8]) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            loop {
                let Ok((mut socket, _)) = listener.accept().await else {
                    return;
                };
                let mut buf = [0u8; 2048];
                let _ = socket.read(&mut buf).await;
                let head = format!(
                    "HTTP/1.1 {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                    status,
                    body.len()
                );
                let _ = socket.write_all(head.as_bytes()).await;
                let _ = socket.write_all(body).await;
                let _ = socket.shutdown().await;
            }
        });
        format!("http://{}", addr)
    }

    #[tokio::test]
    async fn successful_download_lands_on_disk() {
        let base = serve("200 OK", b"PNGDATA").await;
        let dir = tempfile::tempdir().unwrap();
        let client = client(Duration::from_secs(5)).unwrap();
        let done = download_all(
            &client,
            vec![ImageRequest {
                scene: 1,
                url: format!("{}/a.png", base),
                dest: image_dest(dir.path(), 1),
            }],
        )
        .await
        .unwrap();
        assert_eq!(done.len(), 1);
        assert_eq!(std::fs::read(&done[0].1).unwrap(), b"PNGDATA");
    }

    #[tokio::test]
    async fn not_found_names_scene_and_url() {
        let ok = serve("200 OK", b"x").await;
        let missing = serve("404 Not Found", b"").await;
        let dir = tempfile::tempdir().unwrap();
        let client = client(Duration::from_secs(5)).unwrap();
        let requests = vec![
            ImageRequest {
                scene: 1,
                url: format!("{}/1.png", ok),
                dest: image_dest(dir.path(), 1),
            },
            ImageRequest {
                scene: 2,
                url: format!("{}/2.png", missing),
                dest: image_dest(dir.path(), 2),
            },
        ];
        let err = download_all(&client, requests).await.unwrap_err();
        match err {
            RenderError::Download { scene, url, reason } => {
                assert_eq!(scene, 2);
                assert_eq!(url, format!("{}/2.png", missing));
                assert!(reason.contains("404"));
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn dest_names_are_per_scene() {
        let dir = Path::new("/tmp/run");
        assert_ne!(image_dest(dir, 1), image_dest(dir, 2));
        assert_eq!(image_dest(dir, 7), PathBuf::from("/tmp/run/scene_007.img"));
    }
}
