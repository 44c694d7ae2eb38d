//! Script materialization: local files or HTTP(S) downloads

use std::time::Duration;

use reqwest::StatusCode;
use thiserror::Error;
use tracing::warn;

/// Backoff for transient download failures
#[derive(Clone, Debug)]
pub struct DownloadRetry {
    /// Retries after the first attempt
    pub max_retries: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub backoff_multiplier: f64,
}

impl Default for DownloadRetry {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(5),
            backoff_multiplier: 2.0,
        }
    }
}

#[derive(Debug, Error)]
pub enum ScriptError {
    #[error("read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("download {url}: {message}")]
    Download { url: String, message: String },

    #[error("download {url}: unexpected status {status}")]
    Status { url: String, status: StatusCode },
}

impl ScriptError {
    fn is_transient(&self) -> bool {
        match self {
            ScriptError::Download { .. } => true,
            ScriptError::Status { status, .. } => {
                status.is_server_error() || *status == StatusCode::TOO_MANY_REQUESTS
            }
            ScriptError::Read { .. } => false,
        }
    }
}

pub fn is_url(path: &str) -> bool {
    path.starts_with("http://") || path.starts_with("https://")
}

/// Read a script from a local path (relative to the working directory) or a URL
pub async fn fetch(path: &str) -> Result<String, ScriptError> {
    let path = path.trim();

    if is_url(path) {
        download(path, &DownloadRetry::default()).await
    } else {
        tokio::fs::read_to_string(path)
            .await
            .map_err(|source| ScriptError::Read {
                path: path.to_string(),
                source,
            })
    }
}

async fn download(url: &str, retry: &DownloadRetry) -> Result<String, ScriptError> {
    let client = reqwest::Client::builder()
        .user_agent(concat!("gce-rollout/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| ScriptError::Download {
            url: url.to_string(),
            message: e.to_string(),
        })?;

    download_with(&client, url, retry).await
}

async fn download_with(
    client: &reqwest::Client,
    url: &str,
    retry: &DownloadRetry,
) -> Result<String, ScriptError> {
    let mut attempt = 0u32;
    let mut delay = retry.initial_delay;

    loop {
        attempt += 1;

        match download_once(client, url).await {
            Ok(content) => return Ok(content),
            Err(e) if e.is_transient() && attempt <= retry.max_retries => {
                warn!(
                    attempt = attempt,
                    error = %e,
                    delay_ms = delay.as_millis(),
                    "Script download failed, retrying"
                );

                tokio::time::sleep(delay).await;
                delay = Duration::from_secs_f64(delay.as_secs_f64() * retry.backoff_multiplier)
                    .min(retry.max_delay);
            }
            Err(e) => return Err(e),
        }
    }
}

async fn download_once(client: &reqwest::Client, url: &str) -> Result<String, ScriptError> {
    let transport = |e: reqwest::Error| ScriptError::Download {
        url: url.to_string(),
        message: e.to_string(),
    };

    let response = client.get(url).send().await.map_err(transport)?;
    let status = response.status();
    if !status.is_success() {
        return Err(ScriptError::Status {
            url: url.to_string(),
            status,
        });
    }

    response.text().await.map_err(transport)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    async fn download(url: &str, retry: &DownloadRetry) -> Result<String, ScriptError> {
        let client = reqwest::Client::builder().no_proxy().build().unwrap();
        download_with(&client, url, retry).await
    }

    fn no_delay(max_retries: u32) -> DownloadRetry {
        DownloadRetry {
            max_retries,
            initial_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            backoff_multiplier: 2.0,
        }
    }

    /// Local HTTP server answering with `statuses` in order, repeating the last one
    async fn serve(statuses: Vec<u16>, body: &'static str) -> (String, Arc<AtomicU32>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}/startup.sh", listener.local_addr().unwrap());
        let requests = Arc::new(AtomicU32::new(0));
        let counter = requests.clone();

        tokio::spawn(async move {
            loop {
                let Ok((mut socket, _)) = listener.accept().await else {
                    return;
                };
                let n = counter.fetch_add(1, Ordering::SeqCst) as usize;
                let status = statuses[n.min(statuses.len() - 1)];

                let mut request = vec![0u8; 4096];
                let _ = socket.read(&mut request).await;

                let body = if status == 200 { body } else { "" };
                let response = format!(
                    "HTTP/1.1 {} X\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{}",
                    status,
                    body.len(),
                    body
                );
                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.shutdown().await;
            }
        });

        (url, requests)
    }

    #[tokio::test]
    async fn test_download_retries_transient_status() {
        let (url, requests) = serve(vec![503, 503, 200], "#!/bin/sh\necho hi\n").await;

        let content = download(&url, &no_delay(3)).await.unwrap();
        assert_eq!(content, "#!/bin/sh\necho hi\n");
        assert_eq!(requests.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_download_gives_up_after_retries() {
        let (url, requests) = serve(vec![503], "").await;

        let err = download(&url, &no_delay(2)).await.unwrap_err();
        assert!(matches!(
            err,
            ScriptError::Status {
                status: StatusCode::SERVICE_UNAVAILABLE,
                ..
            }
        ));
        assert_eq!(requests.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_download_does_not_retry_not_found() {
        let (url, requests) = serve(vec![404, 200], "never").await;

        let err = download(&url, &no_delay(3)).await.unwrap_err();
        assert!(matches!(
            err,
            ScriptError::Status {
                status: StatusCode::NOT_FOUND,
                ..
            }
        ));
        assert_eq!(requests.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_backoff_defaults() {
        let retry = DownloadRetry::default();
        assert_eq!(retry.max_retries, 3);
        assert_eq!(retry.initial_delay, Duration::from_secs(1));
        assert_eq!(retry.max_delay, Duration::from_secs(5));
    }

    #[test]
    fn test_is_url() {
        assert!(is_url("https://example.com/startup.sh"));
        assert!(is_url("http://example.com/startup.sh"));
        assert!(!is_url("scripts/startup.sh"));
        assert!(!is_url("/etc/startup.sh"));
        assert!(!is_url("ftp://example.com/startup.sh"));
    }

    #[tokio::test]
    async fn test_fetch_local_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "#!/bin/sh\necho ${{{{ greeting }}}}\n").unwrap();

        let path = format!("  {}  ", file.path().display());
        let content = fetch(&path).await.unwrap();
        assert_eq!(content, "#!/bin/sh\necho ${{ greeting }}\n");
    }

    #[tokio::test]
    async fn test_fetch_missing_file() {
        let err = fetch("/definitely/not/here.sh").await.unwrap_err();
        assert!(matches!(err, ScriptError::Read { .. }));
        assert!(err.to_string().contains("/definitely/not/here.sh"));
    }

    #[test]
    fn test_transient_statuses() {
        let status = |status| ScriptError::Status {
            url: "https://example.com".to_string(),
            status,
        };
        assert!(status(StatusCode::BAD_GATEWAY).is_transient());
        assert!(status(StatusCode::TOO_MANY_REQUESTS).is_transient());
        assert!(!status(StatusCode::NOT_FOUND).is_transient());
        assert!(!status(StatusCode::FORBIDDEN).is_transient());
    }
}
