use super::{SelectedFile, Uploader};
use crate::config::StorageConfig;
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::header::{CONTENT_LENGTH, CONTENT_TYPE};
use reqwest::{Body, Client};
use std::time::Duration;
use tokio::sync::mpsc;

const CHUNK_SIZE: usize = 64 * 1024;

/// Uploads with a plain HTTP PUT to `{upload_url}/{folder}{name}`. The object
/// is then served from `{public_url}/{folder}{name}`.
pub struct HttpUploader {
    client: Client,
    upload_url: String,
    public_url: String,
    folder: String,
    token: Option<String>,
}

impl HttpUploader {
    pub fn new(config: &StorageConfig, token: Option<String>) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_millis(config.request_timeout_ms))
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self {
            client,
            upload_url: config.upload_url.trim_end_matches('/').to_string(),
            public_url: config.public_url.trim_end_matches('/').to_string(),
            folder: config.folder.trim_start_matches('/').to_string(),
            token,
        })
    }

    fn object_key(&self, name: &str) -> String {
        encode_key(&format!("{}{}", self.folder, name))
    }
}

/// Percent-encode everything outside the unreserved set, keeping `/`.
fn encode_key(key: &str) -> String {
    key.bytes()
        .map(|b| match b {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' | b'/' => {
                (b as char).to_string()
            }
            _ => format!("%{:02X}", b),
        })
        .collect()
}

fn percent(sent: usize, total: usize) -> u8 {
    if total == 0 {
        return 100;
    }
    ((100 * sent as u64 + total as u64 / 2) / total as u64).min(100) as u8
}

#[async_trait]
impl Uploader for HttpUploader {
    async fn upload(&self, file: &SelectedFile, progress: mpsc::UnboundedSender<u8>) -> Result<String> {
        let key = self.object_key(&file.name);
        let url = format!("{}/{}", self.upload_url, key);
        let total = file.bytes.len();

        let _ = progress.send(0);
        let chunks: Vec<Vec<u8>> = file.bytes.chunks(CHUNK_SIZE).map(<[u8]>::to_vec).collect();
        let mut sent = 0usize;
        let body = futures_util::stream::iter(chunks.into_iter().map(move |chunk| {
            sent += chunk.len();
            let _ = progress.send(percent(sent, total));
            Ok::<_, std::io::Error>(chunk)
        }));

        let mut req = self
            .client
            .put(&url)
            .header(CONTENT_TYPE, &file.mime)
            .header(CONTENT_LENGTH, total)
            .header("x-amz-acl", "public-read")
            .body(Body::wrap_stream(body));
        if let Some(ref token) = self.token {
            req = req.bearer_auth(token);
        }

        let resp = req.send().await.context("upload request failed")?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            anyhow::bail!("upload of {} failed ({}): {}", file.name, status, body);
        }

        let location = format!("{}/{}", self.public_url, key);
        tracing::info!(location = %location, bytes = total, "image uploaded");
        Ok(location)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    fn config(url: &str) -> StorageConfig {
        StorageConfig {
            upload_url: url.to_string(),
            public_url: "https://cdn.example.com/".to_string(),
            folder: "gallery/".to_string(),
            ..StorageConfig::default()
        }
    }

    /// Read a full request (head plus `content-length` body), then answer.
    async fn serve_once(status_line: &'static str) -> (String, tokio::task::JoinHandle<Vec<u8>>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = Vec::new();
            let mut buf = [0u8; 4096];
            loop {
                let n = socket.read(&mut buf).await.unwrap();
                if n == 0 {
                    break;
                }
                request.extend_from_slice(&buf[..n]);
                let text = String::from_utf8_lossy(&request).to_string();
                if let Some(head_end) = text.find("\r\n\r\n") {
                    let length = text[..head_end]
                        .lines()
                        .find_map(|l| {
                            let (k, v) = l.split_once(':')?;
                            k.eq_ignore_ascii_case("content-length").then(|| v.trim().parse::<usize>().ok())?
                        })
                        .unwrap_or(0);
                    if request.len() >= head_end + 4 + length {
                        break;
                    }
                }
            }
            let response = format!("{}\r\ncontent-length: 0\r\n\r\n", status_line);
            socket.write_all(response.as_bytes()).await.unwrap();
            request
        });
        (format!("http://{}", addr), handle)
    }

    #[test]
    fn test_encode_key() {
        assert_eq!(encode_key("gallery/my cat.png"), "gallery/my%20cat.png");
        assert_eq!(encode_key("a~b_c-d.e"), "a~b_c-d.e");
    }

    #[test]
    fn test_percent_rounds_and_caps() {
        assert_eq!(percent(0, 200), 0);
        assert_eq!(percent(1, 3), 33);
        assert_eq!(percent(200, 200), 100);
        assert_eq!(percent(0, 0), 100);
    }

    #[tokio::test]
    async fn test_upload_puts_body_and_reports_progress() {
        let (url, server) = serve_once("HTTP/1.1 200 OK").await;
        let uploader = HttpUploader::new(&config(&url), Some("secret".into())).unwrap();
        let file = SelectedFile::new("my cat.png", "image/png", vec![7u8; CHUNK_SIZE + 10]);
        let (tx, mut rx) = mpsc::unbounded_channel();

        let location = uploader.upload(&file, tx).await.unwrap();
        assert_eq!(location, "https://cdn.example.com/gallery/my%20cat.png");

        let mut reported = Vec::new();
        while let Ok(p) = rx.try_recv() {
            reported.push(p);
        }
        assert_eq!(reported.first(), Some(&0));
        assert_eq!(reported.last(), Some(&100));

        let request = String::from_utf8_lossy(&server.await.unwrap()).to_string();
        assert!(request.starts_with("PUT /gallery/my%20cat.png"));
        let lower = request.to_lowercase();
        assert!(lower.contains("content-type: image/png"));
        assert!(lower.contains("x-amz-acl: public-read"));
        assert!(lower.contains("authorization: bearer secret"));
    }

    #[tokio::test]
    async fn test_rejected_upload_is_an_error() {
        let (url, _server) = serve_once("HTTP/1.1 403 Forbidden").await;
        let uploader = HttpUploader::new(&config(&url), None).unwrap();
        let file = SelectedFile::new("x.png", "image/png", vec![1, 2, 3]);
        let (tx, _rx) = mpsc::unbounded_channel();
        let err = uploader.upload(&file, tx).await.unwrap_err();
        assert!(format!("{:#}", err).contains("403"));
    }
}
