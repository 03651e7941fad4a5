//! Best-effort download of catalog preview media.
//!
//! Each media item is fetched into the identifier-scoped directory and, on
//! success, gains a `local_path` of the form `<identifier>/<n>.<ext>`. A
//! failed item keeps only its remote URL; the batch always runs to the end.

use crate::config::NetworkConfig;
use crate::error::{Result, XmetaError};
use crate::metadata::LOCAL_PATH_KEY;
use futures::StreamExt;
use reqwest::Client;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

/// Outcome counts for one batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DownloadSummary {
    pub attempted: usize,
    pub downloaded: usize,
    pub failed: usize,
}

/// Downloads media items with a fixed pause between requests.
#[derive(Debug, Clone)]
pub struct AssetFetcher {
    client: Client,
    delay: Duration,
}

impl AssetFetcher {
    /// Create a fetcher with the default timeout, user agent and delay.
    pub fn new() -> Result<Self> {
        Self::with_options(
            NetworkConfig::DOWNLOAD_REQUEST_TIMEOUT,
            NetworkConfig::USER_AGENT,
            NetworkConfig::DOWNLOAD_DELAY,
        )
    }

    pub fn with_options(timeout: Duration, user_agent: &str, delay: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(user_agent)
            .build()
            .map_err(|e| XmetaError::Network {
                message: format!("Failed to create HTTP client: {}", e),
                source: Some(e),
            })?;

        Ok(Self { client, delay })
    }

    /// Download every item with a non-empty `url` into `target_dir`.
    ///
    /// `identifier` is the directory name recorded in each `local_path`.
    /// Items are mutated in place. Errors only if `target_dir` cannot be
    /// created.
    pub async fn download_media(
        &self,
        items: &mut [Value],
        identifier: &str,
        target_dir: &Path,
    ) -> Result<DownloadSummary> {
        tokio::fs::create_dir_all(target_dir)
            .await
            .map_err(|e| XmetaError::io_with_path(e, target_dir))?;

        let mut summary = DownloadSummary::default();

        for (index, item) in items.iter_mut().enumerate() {
            let Some(url) = item
                .get("url")
                .and_then(Value::as_str)
                .filter(|u| !u.is_empty())
                .map(String::from)
            else {
                continue;
            };

            if summary.attempted > 0 && !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            summary.attempted += 1;

            let file_name = format!("{}.{}", index, infer_extension(&url));
            let destination = target_dir.join(&file_name);

            match self.download_file(&url, &destination).await {
                Ok(bytes) => {
                    debug!(
                        "Downloaded media {} ({} bytes) to {}",
                        index,
                        bytes,
                        destination.display()
                    );
                    if let Some(obj) = item.as_object_mut() {
                        obj.insert(
                            LOCAL_PATH_KEY.to_string(),
                            Value::String(format!("{}/{}", identifier, file_name)),
                        );
                    }
                    summary.downloaded += 1;
                }
                Err(e) => {
                    warn!("Failed to download media {} from {}: {}", index, url, e);
                    summary.failed += 1;
                }
            }
        }

        info!(
            "Media for {}: {} downloaded, {} failed",
            identifier, summary.downloaded, summary.failed
        );
        Ok(summary)
    }

    /// Stream one URL to a `.part` file and move it into place.
    async fn download_file(&self, url: &str, destination: &Path) -> Result<u64> {
        let response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(XmetaError::DownloadFailed {
                url: url.to_string(),
                message: format!("HTTP {}", status),
            });
        }

        let temp_path = part_path(destination);
        let result = write_stream(response, &temp_path).await;

        match result {
            Ok(bytes) => {
                tokio::fs::rename(&temp_path, destination)
                    .await
                    .map_err(|e| XmetaError::io_with_path(e, destination))?;
                Ok(bytes)
            }
            Err(e) => {
                let _ = tokio::fs::remove_file(&temp_path).await;
                Err(e)
            }
        }
    }
}

async fn write_stream(response: reqwest::Response, temp_path: &Path) -> Result<u64> {
    let mut file = tokio::fs::File::create(temp_path)
        .await
        .map_err(|e| XmetaError::io_with_path(e, temp_path))?;

    let mut stream = response.bytes_stream();
    let mut bytes_written: u64 = 0;
    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        file.write_all(&chunk)
            .await
            .map_err(|e| XmetaError::io_with_path(e, temp_path))?;
        bytes_written += chunk.len() as u64;
    }
    file.flush()
        .await
        .map_err(|e| XmetaError::io_with_path(e, temp_path))?;

    Ok(bytes_written)
}

fn part_path(destination: &Path) -> PathBuf {
    let mut name = destination.as_os_str().to_owned();
    name.push(NetworkConfig::DOWNLOAD_TEMP_SUFFIX);
    PathBuf::from(name)
}

/// Pick a file extension from a media URL: mp4, webm, gif, else jpg.
pub fn infer_extension(url: &str) -> &'static str {
    let path = match url::Url::parse(url) {
        Ok(parsed) => parsed.path().to_ascii_lowercase(),
        Err(_) => url
            .split(['?', '#'])
            .next()
            .unwrap_or_default()
            .to_ascii_lowercase(),
    };

    if path.ends_with(".mp4") {
        "mp4"
    } else if path.ends_with(".webm") {
        "webm"
    } else if path.ends_with(".gif") {
        "gif"
    } else {
        "jpg"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{extract::Path as AxumPath, http::StatusCode, routing::get, Router};
    use serde_json::json;
    use tempfile::TempDir;

    async fn spawn_media_server() -> String {
        let app = Router::new().route(
            "/media/:name",
            get(|AxumPath(name): AxumPath<String>| async move {
                if name.starts_with("missing") {
                    Err(StatusCode::NOT_FOUND)
                } else {
                    Ok(format!("bytes-of-{}", name))
                }
            }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}", addr)
    }

    fn fetcher() -> AssetFetcher {
        AssetFetcher::with_options(Duration::from_secs(5), "xmeta-test", Duration::ZERO).unwrap()
    }

    #[test]
    fn test_infer_extension() {
        assert_eq!(infer_extension("https://x.test/a.mp4"), "mp4");
        assert_eq!(infer_extension("https://x.test/a.WEBM"), "webm");
        assert_eq!(infer_extension("https://x.test/a.gif?width=450"), "gif");
        assert_eq!(infer_extension("https://x.test/a.png"), "jpg");
        assert_eq!(infer_extension("https://x.test/abc"), "jpg");
        assert_eq!(infer_extension("not a url.mp4#frag"), "mp4");
    }

    #[tokio::test]
    async fn test_downloads_and_records_local_paths() {
        let base = spawn_media_server().await;
        let temp_dir = TempDir::new().unwrap();
        let target = temp_dir.path().join("abcdef012345");

        let mut items = vec![
            json!({"url": format!("{}/media/first.jpeg", base)}),
            json!({"url": format!("{}/media/clip.mp4", base), "type": "video"}),
        ];
        let summary = fetcher()
            .download_media(&mut items, "abcdef012345", &target)
            .await
            .unwrap();

        assert_eq!(summary.downloaded, 2);
        assert_eq!(items[0]["local_path"], "abcdef012345/0.jpg");
        assert_eq!(items[1]["local_path"], "abcdef012345/1.mp4");
        assert_eq!(items[1]["type"], "video");
        assert_eq!(
            std::fs::read_to_string(target.join("1.mp4")).unwrap(),
            "bytes-of-clip.mp4"
        );
    }

    #[tokio::test]
    async fn test_one_failure_does_not_abort_batch() {
        let base = spawn_media_server().await;
        let temp_dir = TempDir::new().unwrap();
        let target = temp_dir.path().join("id");

        let mut items = vec![
            json!({"url": format!("{}/media/a.jpg", base)}),
            json!({"url": "http://127.0.0.1:1/unreachable.jpg"}),
            json!({"url": format!("{}/media/c.gif", base)}),
        ];
        let summary = fetcher()
            .download_media(&mut items, "id", &target)
            .await
            .unwrap();

        assert_eq!(
            summary,
            DownloadSummary {
                attempted: 3,
                downloaded: 2,
                failed: 1
            }
        );
        assert_eq!(items[0]["local_path"], "id/0.jpg");
        assert!(items[1].get("local_path").is_none());
        assert_eq!(items[2]["local_path"], "id/2.gif");
        assert!(!target.join("1.jpg").exists());
        assert!(!target.join("1.jpg.part").exists());
    }

    #[tokio::test]
    async fn test_http_error_leaves_item_unpatched() {
        let base = spawn_media_server().await;
        let temp_dir = TempDir::new().unwrap();

        let mut items = vec![json!({"url": format!("{}/media/missing.jpg", base)})];
        let summary = fetcher()
            .download_media(&mut items, "id", temp_dir.path())
            .await
            .unwrap();

        assert_eq!(summary.failed, 1);
        assert!(items[0].get("local_path").is_none());
    }

    #[tokio::test]
    async fn test_items_without_url_are_skipped() {
        let temp_dir = TempDir::new().unwrap();
        let target = temp_dir.path().join("new_dir");

        let mut items = vec![json!({"url": ""}), json!({"nsfw": false})];
        let summary = fetcher()
            .download_media(&mut items, "id", &target)
            .await
            .unwrap();

        assert_eq!(summary.attempted, 0);
        assert!(target.is_dir());
    }
}
