use super::sse::{apply_event, EventEffect, SseParser};
use super::{DataService, Subscription};
use crate::config::DatabaseConfig;
use crate::feed::types::{FeedSnapshot, GalleryItem};
use anyhow::{Context, Result};
use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::header::ACCEPT;
use reqwest::{Client, Response};
use serde::Deserialize;
use std::time::Duration;
use tokio::sync::mpsc;

/// Realtime database over its REST API: live queries are event streams,
/// writes are plain POSTs.
pub struct RestDataService {
    client: Client,
    base_url: String,
    auth: Option<String>,
    request_timeout: Duration,
    reconnect_delay: Duration,
}

#[derive(Deserialize)]
struct PostResponse {
    name: String,
}

/// How a stream connection ended.
enum StreamEnd {
    Closed,
    Cancelled(String),
    ReceiverGone,
}

impl RestDataService {
    pub fn new(config: &DatabaseConfig, auth: Option<String>) -> Result<Self> {
        let client = Client::builder()
            .pool_max_idle_per_host(4)
            .connect_timeout(Duration::from_millis(config.request_timeout_ms))
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self {
            client,
            base_url: config.url.trim_end_matches('/').to_string(),
            auth,
            request_timeout: Duration::from_millis(config.request_timeout_ms),
            reconnect_delay: Duration::from_millis(config.reconnect_delay_ms),
        })
    }

    fn collection_url(&self, collection: &str, limit_to_last: Option<usize>) -> String {
        let mut url = format!("{}/{}.json", self.base_url, collection);
        let mut params = Vec::new();
        if let Some(n) = limit_to_last {
            params.push("orderBy=%22%24key%22".to_string());
            params.push(format!("limitToLast={}", n));
        }
        if let Some(ref auth) = self.auth {
            params.push(format!("auth={}", auth));
        }
        if !params.is_empty() {
            url.push('?');
            url.push_str(&params.join("&"));
        }
        url
    }
}

async fn open_stream(client: &Client, url: &str, timeout: Duration) -> Result<Response> {
    let request = client.get(url).header(ACCEPT, "text/event-stream");
    let resp = tokio::time::timeout(timeout, request.send())
        .await
        .context("timed out opening event stream")?
        .context("event stream request failed")?;
    let status = resp.status();
    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        anyhow::bail!("event stream rejected ({}): {}", status, body);
    }
    Ok(resp)
}

/// Read one connection until it ends, pushing a full snapshot after every
/// change to the local tree.
async fn pump(resp: Response, tx: &mpsc::Sender<FeedSnapshot>) -> Result<StreamEnd> {
    let mut tree = serde_json::Value::Null;
    let mut parser = SseParser::default();
    let mut body = resp.bytes_stream();

    while let Some(chunk) = body.next().await {
        let chunk = chunk.context("event stream read error")?;
        for event in parser.feed(&chunk) {
            match apply_event(&mut tree, &event) {
                Ok(EventEffect::Changed) => {
                    if tx.send(FeedSnapshot::from_json(&tree)).await.is_err() {
                        return Ok(StreamEnd::ReceiverGone);
                    }
                }
                Ok(EventEffect::Ignored) => {}
                Ok(EventEffect::Cancelled(reason)) => return Ok(StreamEnd::Cancelled(reason)),
                Err(e) => tracing::warn!("stream event parse error: {:#}", e),
            }
        }
    }
    Ok(StreamEnd::Closed)
}

/// Keep a live query alive until the subscriber goes away or the server
/// cancels it. Reconnects re-deliver the full window as the first event.
async fn run_stream(
    client: Client,
    url: String,
    first: Response,
    tx: mpsc::Sender<FeedSnapshot>,
    timeout: Duration,
    reconnect_delay: Duration,
) {
    let mut pending = Some(first);
    loop {
        let resp = match pending.take() {
            Some(resp) => resp,
            None => match open_stream(&client, &url, timeout).await {
                Ok(resp) => resp,
                Err(e) => {
                    tracing::warn!("live query reconnect failed: {:#}", e);
                    if tx.is_closed() {
                        return;
                    }
                    tokio::time::sleep(reconnect_delay).await;
                    continue;
                }
            },
        };

        match pump(resp, &tx).await {
            Ok(StreamEnd::Closed) => tracing::warn!("live query closed by server, reconnecting..."),
            Ok(StreamEnd::Cancelled(reason)) => {
                tracing::error!(reason = %reason, "live query cancelled by server");
                return;
            }
            Ok(StreamEnd::ReceiverGone) => return,
            Err(e) => tracing::warn!("live query error: {:#}, reconnecting...", e),
        }
        if tx.is_closed() {
            return;
        }
        tokio::time::sleep(reconnect_delay).await;
    }
}

#[async_trait]
impl DataService for RestDataService {
    async fn subscribe(&self, collection: &str, limit_to_last: Option<usize>) -> Result<Subscription> {
        let url = self.collection_url(collection, limit_to_last);
        let first = open_stream(&self.client, &url, self.request_timeout).await?;
        tracing::debug!(collection, limit = ?limit_to_last, "live query opened");

        let (tx, rx) = mpsc::channel(16);
        let task = tokio::spawn(run_stream(
            self.client.clone(),
            url,
            first,
            tx,
            self.request_timeout,
            self.reconnect_delay,
        ));
        Ok(Subscription::new(rx, task))
    }

    fn request_timeout(&self) -> Duration {
        self.request_timeout
    }

    async fn post(&self, collection: &str, record: &GalleryItem) -> Result<String> {
        let url = self.collection_url(collection, None);
        let resp = self
            .client
            .post(&url)
            .timeout(self.request_timeout)
            .json(record)
            .send()
            .await
            .context("POST record failed")?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            anyhow::bail!("POST {} failed ({}): {}", collection, status, body);
        }
        let parsed: PostResponse = resp.json().await.context("failed to parse POST response")?;
        Ok(parsed.name)
    }
}
