use super::*;
use std::path::{Path, PathBuf};

const INDEX_FILE: &str = "index.html";
const FAVICON_FILE: &str = "favicon.ico";
const FETCH_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
enum AssetKind {
    Text,
    Binary,
}

/// Front-end files served from a local directory, fetched once from their
/// remote location when missing.
#[derive(Clone)]
pub struct AssetCache {
    dir: PathBuf,
    index_url: String,
    favicon_url: String,
    client: Option<reqwest::Client>,
    fetch_lock: Arc<tokio::sync::Mutex<()>>,
}

impl AssetCache {
    pub fn new(config: &ServerConfig, log: &ServerLog) -> Self {
        let client = match reqwest::Client::builder().timeout(FETCH_TIMEOUT).build() {
            Ok(client) => Some(client),
            Err(e) => {
                log.warn(format!("Asset downloads disabled: {e}"));
                None
            }
        };
        Self {
            dir: config.resources_dir.clone(),
            index_url: config.index_url.clone(),
            favicon_url: config.favicon_url.clone(),
            client,
            fetch_lock: Arc::new(tokio::sync::Mutex::new(())),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub async fn index(&self, log: &ServerLog) -> HttpReply {
        let path = self.ensure(INDEX_FILE, &self.index_url, AssetKind::Text, log).await;
        match tokio::fs::read(&path).await {
            Ok(bytes) => HttpReply::new(StatusCode::OK, CONTENT_HTML, bytes),
            Err(_) => HttpReply::text(StatusCode::NOT_FOUND, "Page not found."),
        }
    }

    pub async fn favicon(&self, log: &ServerLog) -> HttpReply {
        let path = self
            .ensure(FAVICON_FILE, &self.favicon_url, AssetKind::Binary, log)
            .await;
        match tokio::fs::read(&path).await {
            Ok(bytes) => HttpReply::new(StatusCode::OK, CONTENT_ICON, bytes).cacheable(),
            Err(_) => HttpReply::text(StatusCode::NOT_FOUND, ""),
        }
    }

    /// Returns the local path of `file_name`, downloading it first if it is
    /// not on disk yet. Download failures are logged, not returned.
    async fn ensure(&self, file_name: &str, url: &str, kind: AssetKind, log: &ServerLog) -> PathBuf {
        let path = self.dir.join(file_name);
        if tokio::fs::try_exists(&path).await.unwrap_or(false) {
            return path;
        }
        let _guard = self.fetch_lock.lock().await;
        // Another request may have fetched it while this one waited.
        if tokio::fs::try_exists(&path).await.unwrap_or(false) {
            return path;
        }
        if let Err(e) = self.fetch(&path, url, kind, log).await {
            log.log_message(
                format!("Exception during file download of {url}: {e}"),
                LogLevel::Raised,
            );
        }
        path
    }

    async fn fetch(&self, path: &Path, url: &str, kind: AssetKind, log: &ServerLog) -> Result<(), String> {
        let client = self.client.as_ref().ok_or("no HTTP client")?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| e.to_string())?;
        }
        log.log_message(format!("Attempting download of {url}"), LogLevel::Raised);
        let response = client
            .get(url)
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(|e| e.to_string())?;
        let content = match kind {
            AssetKind::Text => response
                .text()
                .await
                .map(String::into_bytes)
                .map_err(|e| e.to_string())?,
            AssetKind::Binary => response
                .bytes()
                .await
                .map(|b| b.to_vec())
                .map_err(|e| e.to_string())?,
        };
        // Readers only ever see a missing file or a complete one.
        let partial = partial_path(path);
        if let Err(e) = write_then_rename(&partial, path, &content).await {
            let _ = tokio::fs::remove_file(&partial).await;
            return Err(e.to_string());
        }
        log.log_message(
            format!("Downloaded {kind:?} file to {}", path.display()),
            LogLevel::Raised,
        );
        Ok(())
    }
}

fn partial_path(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    path.with_file_name(format!(".{name}.download"))
}

async fn write_then_rename(partial: &Path, path: &Path, content: &[u8]) -> std::io::Result<()> {
    tokio::fs::write(partial, content).await?;
    tokio::fs::rename(partial, path).await
}
