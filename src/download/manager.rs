//! Model-file download manager (§4.6): concurrent URL -> file transfers with
//! progress reporting, cooperative cancellation, atomic finalization, and
//! partial-file cleanup on any non-success outcome.

use std::{
    path::Path,
    sync::{
        Arc, Mutex,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};

use dashmap::DashMap;
use futures_util::StreamExt;
use tokio::{io::AsyncWriteExt, task::JoinHandle};
use tokio_util::sync::CancellationToken;

use crate::{
    error::GatewayError,
    models::{
        common::generate_id,
        download::{CancelAllResponse, DownloadStatusEntry, DownloadsSnapshotResponse},
    },
};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);
const LOW_SPEED_TIMEOUT: Duration = Duration::from_secs(60);

struct DownloadEntry {
    url: String,
    local_path: String,
    downloaded_bytes: AtomicU64,
    total_bytes: AtomicU64,
    cancel: CancellationToken,
    /// Set once `start()` has spawned the transfer task; `cancel_all` takes
    /// it to await actual task completion instead of just the cancel signal.
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl DownloadEntry {
    fn snapshot(&self, id: &str) -> DownloadStatusEntry {
        let downloaded = self.downloaded_bytes.load(Ordering::Relaxed);
        let total = self.total_bytes.load(Ordering::Relaxed);
        let total_bytes = if total > 0 { Some(total) } else { None };
        let percent = total_bytes.map(|t| (downloaded as f64 / t as f64) * 100.0);
        DownloadStatusEntry {
            id: id.to_string(),
            url: self.url.clone(),
            local_path: self.local_path.clone(),
            downloaded_bytes: downloaded,
            total_bytes,
            percent,
        }
    }
}

pub struct DownloadManager {
    client: reqwest::Client,
    downloads: DashMap<String, Arc<DownloadEntry>>,
}

impl DownloadManager {
    pub fn new() -> Self {
        let client = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .expect("failed to build download HTTP client");
        Self {
            client,
            downloads: DashMap::new(),
        }
    }

    #[cfg(test)]
    fn with_client(client: reqwest::Client) -> Self {
        Self {
            client,
            downloads: DashMap::new(),
        }
    }

    /// Registers a tracked download and spawns it. Returns the download id
    /// immediately; progress and terminal state are observed via `snapshot`.
    pub fn start(self: &Arc<Self>, url: String, local_path: String) -> Result<String, GatewayError> {
        validate_url(&url)?;

        let id = generate_id("dl");
        let entry = Arc::new(DownloadEntry {
            url: url.clone(),
            local_path: local_path.clone(),
            downloaded_bytes: AtomicU64::new(0),
            total_bytes: AtomicU64::new(0),
            cancel: CancellationToken::new(),
            handle: Mutex::new(None),
        });
        self.downloads.insert(id.clone(), Arc::clone(&entry));

        let manager = Arc::clone(self);
        let task_id = id.clone();
        let task_entry = Arc::clone(&entry);
        let join = tokio::spawn(async move {
            let result = manager
                .run(&url, Path::new(&local_path), &task_entry)
                .await;
            if let Err(err) = &result {
                tracing::warn!(download_id = %task_id, error = %err, "download failed");
            } else {
                tracing::info!(download_id = %task_id, "download completed");
            }
            manager.downloads.remove(&task_id);
        });
        *entry.handle.lock().expect("download handle lock poisoned") = Some(join);

        Ok(id)
    }

    pub fn snapshot(&self) -> DownloadsSnapshotResponse {
        let downloads = self
            .downloads
            .iter()
            .map(|entry| entry.value().snapshot(entry.key()))
            .collect();
        DownloadsSnapshotResponse { downloads }
    }

    /// Fires the cancellation token on every active download and waits for
    /// each transfer task to actually finish unwinding and remove its own
    /// registry entry — `CancellationToken::cancelled()` alone only resolves
    /// when the signal is sent, not when the task has observed it and exited.
    pub async fn cancel_all(&self) -> CancelAllResponse {
        let entries: Vec<Arc<DownloadEntry>> =
            self.downloads.iter().map(|e| Arc::clone(e.value())).collect();
        let cancelled = entries.len();
        let handles: Vec<JoinHandle<()>> = entries
            .iter()
            .filter_map(|entry| {
                entry
                    .handle
                    .lock()
                    .expect("download handle lock poisoned")
                    .take()
            })
            .collect();

        for entry in &entries {
            entry.cancel.cancel();
        }
        for handle in handles {
            let _ = handle.await;
        }
        CancelAllResponse { cancelled }
    }

    /// Probes a URL's reachability and size without downloading its body.
    pub async fn head(&self, url: &str) -> Result<Option<u64>, GatewayError> {
        validate_url(url)?;
        let response = self
            .client
            .head(url)
            .timeout(CONNECT_TIMEOUT)
            .send()
            .await
            .map_err(|e| GatewayError::DownloadFailure(format!("HEAD request failed: {e}")))?;

        if !response.status().is_success() {
            return Err(GatewayError::DownloadFailure(format!(
                "HEAD request returned {}",
                response.status()
            )));
        }
        Ok(response.content_length())
    }

    async fn run(
        &self,
        url: &str,
        local_path: &Path,
        entry: &DownloadEntry,
    ) -> Result<(), GatewayError> {
        match self.transfer(url, local_path, entry).await {
            Ok(()) => Ok(()),
            Err(err) => {
                let _ = tokio::fs::remove_file(local_path).await;
                Err(err)
            }
        }
    }

    async fn transfer(
        &self,
        url: &str,
        local_path: &Path,
        entry: &DownloadEntry,
    ) -> Result<(), GatewayError> {
        if let Some(parent) = local_path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .map_err(|e| GatewayError::DownloadFailure(format!("cannot create {parent:?}: {e}")))?;
            }
        }

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| GatewayError::DownloadFailure(format!("request failed: {e}")))?;

        if !response.status().is_success() {
            return Err(GatewayError::DownloadFailure(format!(
                "server returned {}",
                response.status()
            )));
        }

        if let Some(len) = response.content_length() {
            entry.total_bytes.store(len, Ordering::Relaxed);
        }

        let mut file = tokio::fs::File::create(local_path)
            .await
            .map_err(|e| GatewayError::DownloadFailure(format!("cannot open {local_path:?}: {e}")))?;

        let mut stream = response.bytes_stream();
        loop {
            if entry.cancel.is_cancelled() {
                return Err(GatewayError::DownloadFailure(
                    "download cancelled by user".into(),
                ));
            }

            let next = tokio::select! {
                biased;
                _ = entry.cancel.cancelled() => {
                    return Err(GatewayError::DownloadFailure("download cancelled by user".into()));
                }
                next = tokio::time::timeout(LOW_SPEED_TIMEOUT, stream.next()) => next,
            };

            let chunk = match next {
                Ok(Some(Ok(chunk))) => chunk,
                Ok(Some(Err(e))) => {
                    return Err(GatewayError::DownloadFailure(format!("transport error: {e}")));
                }
                Ok(None) => break,
                Err(_) => {
                    return Err(GatewayError::DownloadFailure(
                        "stalled: no data received within the low-speed timeout".into(),
                    ));
                }
            };

            file.write_all(&chunk)
                .await
                .map_err(|e| GatewayError::DownloadFailure(format!("write failed: {e}")))?;
            entry.downloaded_bytes.fetch_add(chunk.len() as u64, Ordering::Relaxed);
        }

        file.flush()
            .await
            .map_err(|e| GatewayError::DownloadFailure(format!("flush failed: {e}")))?;

        if entry.downloaded_bytes.load(Ordering::Relaxed) == 0 {
            return Err(GatewayError::DownloadFailure("downloaded zero bytes".into()));
        }

        Ok(())
    }
}

impl Default for DownloadManager {
    fn default() -> Self {
        Self::new()
    }
}

fn validate_url(url: &str) -> Result<(), GatewayError> {
    let parsed = url::Url::parse(url)
        .map_err(|_| GatewayError::InvalidRequest(format!("invalid URL: {url}")))?;
    match parsed.scheme() {
        "http" | "https" => Ok(()),
        other => Err(GatewayError::InvalidRequest(format!(
            "unsupported URL scheme '{other}'"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::{
        Mock, MockServer, ResponseTemplate,
        matchers::{method, path},
    };

    #[test]
    fn validate_url_rejects_non_http_schemes() {
        assert!(validate_url("ftp://example.com/file").is_err());
        assert!(validate_url("not a url").is_err());
        assert!(validate_url("https://example.com/file").is_ok());
    }

    #[tokio::test]
    async fn successful_download_writes_file_and_tracks_progress() {
        let server = MockServer::start().await;
        let body = b"hello model weights".to_vec();
        Mock::given(method("GET"))
            .and(path("/weights.bin"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(body.clone()))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("weights.bin");

        let manager = DownloadManager::with_client(reqwest::Client::new());
        let entry = DownloadEntry {
            url: format!("{}/weights.bin", server.uri()),
            local_path: target.to_string_lossy().to_string(),
            downloaded_bytes: AtomicU64::new(0),
            total_bytes: AtomicU64::new(0),
            cancel: CancellationToken::new(),
            handle: Mutex::new(None),
        };

        manager
            .transfer(&entry.url.clone(), &target, &entry)
            .await
            .unwrap();

        let written = tokio::fs::read(&target).await.unwrap();
        assert_eq!(written, body);
        assert_eq!(entry.downloaded_bytes.load(Ordering::Relaxed), body.len() as u64);
    }

    #[tokio::test]
    async fn non_success_status_removes_partial_file() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/missing.bin"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("missing.bin");

        let manager = Arc::new(DownloadManager::with_client(reqwest::Client::new()));
        let entry = Arc::new(DownloadEntry {
            url: format!("{}/missing.bin", server.uri()),
            local_path: target.to_string_lossy().to_string(),
            downloaded_bytes: AtomicU64::new(0),
            total_bytes: AtomicU64::new(0),
            cancel: CancellationToken::new(),
            handle: Mutex::new(None),
        });

        let result = manager.run(&entry.url.clone(), &target, &entry).await;
        assert!(result.is_err());
        assert!(!target.exists());
    }

    #[tokio::test]
    async fn cancel_all_cancels_every_tracked_download() {
        let manager = Arc::new(DownloadManager::with_client(reqwest::Client::new()));
        let e1 = Arc::new(DownloadEntry {
            url: "https://example.com/a".into(),
            local_path: "a".into(),
            downloaded_bytes: AtomicU64::new(0),
            total_bytes: AtomicU64::new(0),
            cancel: CancellationToken::new(),
            handle: Mutex::new(None),
        });
        let e2 = Arc::new(DownloadEntry {
            url: "https://example.com/b".into(),
            local_path: "b".into(),
            downloaded_bytes: AtomicU64::new(0),
            total_bytes: AtomicU64::new(0),
            cancel: CancellationToken::new(),
            handle: Mutex::new(None),
        });
        manager.downloads.insert("1".into(), Arc::clone(&e1));
        manager.downloads.insert("2".into(), Arc::clone(&e2));

        let result = manager.cancel_all().await;
        assert_eq!(result.cancelled, 2);
        assert!(e1.cancel.is_cancelled());
        assert!(e2.cancel.is_cancelled());
    }

    #[test]
    fn snapshot_computes_percent_only_when_total_known() {
        let entry = DownloadEntry {
            url: "https://example.com/a".into(),
            local_path: "a".into(),
            downloaded_bytes: AtomicU64::new(50),
            total_bytes: AtomicU64::new(0),
            cancel: CancellationToken::new(),
            handle: Mutex::new(None),
        };
        let snap = entry.snapshot("1");
        assert_eq!(snap.total_bytes, None);
        assert_eq!(snap.percent, None);

        entry.total_bytes.store(100, Ordering::Relaxed);
        let snap = entry.snapshot("1");
        assert_eq!(snap.total_bytes, Some(100));
        assert_eq!(snap.percent, Some(50.0));
    }
}
