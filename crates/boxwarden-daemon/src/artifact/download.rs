//! Release archive download.

use std::path::Path;
use std::time::Duration;

use tokio::io::AsyncWriteExt;

use super::AcquireError;

/// Stream `url` into `dest`, bounded by `timeout` for the whole transfer.
/// Returns the number of bytes written. Not retried.
pub(super) async fn download_to(
    url: &str,
    dest: &Path,
    timeout: Duration,
) -> Result<u64, AcquireError> {
    // reqwest is built with rustls-no-provider; `Err` means a provider is
    // already installed.
    let _ = rustls::crypto::ring::default_provider().install_default();

    let client = reqwest::Client::builder()
        .timeout(timeout)
        .user_agent(concat!("boxwarden/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| AcquireError::DownloadFailed {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

    let mut resp = client
        .get(url)
        .send()
        .await
        .map_err(|e| classify(url, timeout, &e))?;

    let status = resp.status();
    if !status.is_success() {
        return Err(AcquireError::DownloadFailed {
            url: url.to_string(),
            reason: format!("HTTP {status}"),
        });
    }

    let mut file = tokio::fs::File::create(dest).await?;
    let mut written = 0u64;
    while let Some(chunk) = resp.chunk().await.map_err(|e| classify(url, timeout, &e))? {
        file.write_all(&chunk).await?;
        written += chunk.len() as u64;
    }
    file.flush().await?;
    Ok(written)
}

fn classify(url: &str, timeout: Duration, err: &reqwest::Error) -> AcquireError {
    if err.is_timeout() {
        AcquireError::DownloadTimeout {
            url: url.to_string(),
            timeout,
        }
    } else {
        AcquireError::DownloadFailed {
            url: url.to_string(),
            reason: err.to_string(),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;
    use tokio::net::TcpListener;

    /// Serve a single canned HTTP/1.1 response and return the URL.
    async fn serve_once(status: &'static str, body: &'static [u8]) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut sock, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 4096];
            let _ = sock.read(&mut buf).await;
            let head = format!(
                "HTTP/1.1 {status}\r\ncontent-length: {}\r\nconnection: close\r\n\r\n",
                body.len()
            );
            sock.write_all(head.as_bytes()).await.unwrap();
            sock.write_all(body).await.unwrap();
        });
        format!("http://{addr}/sing-box.tar.gz")
    }

    /// Accept one connection and never answer.
    async fn serve_silent() -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (sock, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(30)).await;
            drop(sock);
        });
        format!("http://{addr}/sing-box.tar.gz")
    }

    #[tokio::test]
    async fn successful_download_writes_body() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("a.tar.gz");
        let url = serve_once("200 OK", b"archive-bytes").await;

        let written = download_to(&url, &dest, Duration::from_secs(5)).await.unwrap();
        assert_eq!(written, 13);
        assert_eq!(std::fs::read(&dest).unwrap(), b"archive-bytes");
    }

    #[tokio::test]
    async fn http_error_status_is_download_failure() {
        let dir = tempfile::tempdir().unwrap();
        let url = serve_once("404 Not Found", b"").await;

        let err = download_to(&url, &dir.path().join("a.tar.gz"), Duration::from_secs(5))
            .await
            .unwrap_err();
        assert!(
            matches!(err, AcquireError::DownloadFailed { ref reason, .. } if reason.contains("404")),
            "got {err:?}"
        );
    }

    #[tokio::test]
    async fn unreachable_host_is_download_failure() {
        let dir = tempfile::tempdir().unwrap();
        // Port 9 on loopback (discard) is closed on test machines.
        let err = download_to(
            "http://127.0.0.1:9/sing-box.tar.gz",
            &dir.path().join("a.tar.gz"),
            Duration::from_secs(5),
        )
        .await
        .unwrap_err();
        assert!(
            matches!(
                err,
                AcquireError::DownloadFailed { .. } | AcquireError::DownloadTimeout { .. }
            ),
            "got {err:?}"
        );
        assert!(!dir.path().join("a.tar.gz").exists());
    }

    #[tokio::test]
    async fn stalled_server_is_download_timeout() {
        let dir = tempfile::tempdir().unwrap();
        let url = serve_silent().await;

        let err = download_to(&url, &dir.path().join("a.tar.gz"), Duration::from_millis(100))
            .await
            .unwrap_err();
        assert!(
            matches!(
                err,
                AcquireError::DownloadTimeout { ref url, timeout } if url.ends_with("/sing-box.tar.gz")
                    && timeout == Duration::from_millis(100)
            ),
            "got {err:?}"
        );
        assert!(!dir.path().join("a.tar.gz").exists());
    }
}
