//! Desktop implementations of the store's storage and fetch capabilities.
//!
//! Cached values live in a single JSON object file (`key -> value`) under the
//! user's data directory, e.g. `~/.local/share/parking-realtime/storage.json`.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Local;
use log::{debug, info, warn};
use shared::adapters::{with_cache_buster, LogLogger};
use shared::{
    create_parking_store, Adapters, FetchAdapter, FetchOptions, FetchResponse, ParkingStore,
    StorageAdapter, StorageError, StoreConfig, TransportError,
};
use thiserror::Error;

const APP_DIR_NAME: &str = "parking-realtime";
const STORAGE_FILE_NAME: &str = "storage.json";

/// Applied when the caller sets no timeout of its own
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Debug, Error)]
pub enum SetupError {
    #[error("could not determine the user's data directory")]
    NoDataDirectory,
    #[error("failed to build HTTP client: {0}")]
    HttpClient(#[from] reqwest::Error),
}

/// Parsed storage file, or the parse error if its contents are not a JSON object of strings
enum Contents {
    Entries(BTreeMap<String, String>),
    Corrupt(String),
}

/// Key/value storage persisted as one JSON file.
///
/// A file that cannot be parsed fails reads but is replaced by the next write
/// or removal.
#[derive(Debug, Clone)]
pub struct FileStorageAdapter {
    path: PathBuf,
}

impl FileStorageAdapter {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    /// Storage file in the platform data directory
    pub fn new_default() -> Result<Self, SetupError> {
        let data_dir = dirs::data_local_dir().ok_or(SetupError::NoDataDirectory)?;
        let path = data_dir.join(APP_DIR_NAME).join(STORAGE_FILE_NAME);
        info!("Using storage file: {}", path.display());
        Ok(Self::new(path))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read(&self, key: &str) -> Result<Contents, StorageError> {
        let contents = match tokio::fs::read_to_string(&self.path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Contents::Entries(BTreeMap::new())),
            Err(e) => {
                return Err(StorageError::Read {
                    key: key.to_string(),
                    reason: e.to_string(),
                })
            }
        };
        if contents.trim().is_empty() {
            return Ok(Contents::Entries(BTreeMap::new()));
        }
        Ok(match serde_json::from_str(&contents) {
            Ok(entries) => Contents::Entries(entries),
            Err(e) => Contents::Corrupt(e.to_string()),
        })
    }

    /// Current entries for a write; a corrupt file counts as empty
    async fn load_for_write(&self, key: &str) -> Result<BTreeMap<String, String>, StorageError> {
        match self.read(key).await? {
            Contents::Entries(entries) => Ok(entries),
            Contents::Corrupt(reason) => {
                warn!("Replacing corrupt storage file {}: {}", self.path.display(), reason);
                Ok(BTreeMap::new())
            }
        }
    }

    async fn save(&self, entries: &BTreeMap<String, String>, key: &str) -> Result<(), StorageError> {
        let write_error = |reason: String| StorageError::Write {
            key: key.to_string(),
            reason,
        };

        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| write_error(e.to_string()))?;
        }
        let json = serde_json::to_string_pretty(entries).map_err(|e| write_error(e.to_string()))?;

        // Write next to the target, then swap it in
        let tmp_path = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp_path, json)
            .await
            .map_err(|e| write_error(e.to_string()))?;
        tokio::fs::rename(&tmp_path, &self.path)
            .await
            .map_err(|e| write_error(e.to_string()))
    }
}

#[async_trait(?Send)]
impl StorageAdapter for FileStorageAdapter {
    async fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        match self.read(key).await? {
            Contents::Entries(mut entries) => Ok(entries.remove(key)),
            Contents::Corrupt(reason) => Err(StorageError::Read {
                key: key.to_string(),
                reason,
            }),
        }
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let mut entries = self.load_for_write(key).await?;
        entries.insert(key.to_string(), value.to_string());
        self.save(&entries, key).await
    }

    async fn remove(&self, key: &str) -> Result<(), StorageError> {
        let (mut entries, corrupt) = match self.read(key).await? {
            Contents::Entries(entries) => (entries, false),
            Contents::Corrupt(reason) => {
                warn!("Discarding corrupt storage file {}: {}", self.path.display(), reason);
                (BTreeMap::new(), true)
            }
        };
        if entries.remove(key).is_none() && !corrupt {
            return Ok(());
        }
        self.save(&entries, key).await.map_err(|e| match e {
            StorageError::Write { key, reason } => StorageError::Remove { key, reason },
            other => other,
        })
    }
}

/// Direct HTTP access; no CORS relay is needed outside the browser
#[derive(Debug, Clone)]
pub struct ReqwestFetchAdapter {
    client: reqwest::Client,
}

impl ReqwestFetchAdapter {
    pub fn new() -> Result<Self, SetupError> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("parking-native/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { client })
    }

    fn target_url(url: &str, options: &FetchOptions) -> String {
        if options.cache_bust {
            with_cache_buster(url, Local::now().timestamp_millis())
        } else {
            url.to_string()
        }
    }

    fn timeout(options: &FetchOptions) -> Duration {
        options
            .timeout_ms
            .map(|ms| Duration::from_millis(u64::from(ms)))
            .unwrap_or(DEFAULT_TIMEOUT)
    }
}

#[async_trait(?Send)]
impl FetchAdapter for ReqwestFetchAdapter {
    async fn request(&self, url: &str, options: &FetchOptions) -> Result<FetchResponse, TransportError> {
        let target = Self::target_url(url, options);
        debug!("GET {}", target);

        let mut request = self.client.get(&target).timeout(Self::timeout(options));
        for (name, value) in &options.headers {
            request = request.header(name.as_str(), value.as_str());
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                TransportError::Timeout { url: url.to_string() }
            } else {
                TransportError::Network {
                    url: url.to_string(),
                    reason: e.to_string(),
                }
            }
        })?;

        let status = response.status().as_u16();
        let body = response.text().await.map_err(|e| {
            if e.is_timeout() {
                TransportError::Timeout { url: url.to_string() }
            } else {
                TransportError::Body(e.to_string())
            }
        })?;
        Ok(FetchResponse { status, body })
    }
}

/// Parking store wired to the file cache and `reqwest`
pub fn build_parking_store(config: StoreConfig) -> Result<Rc<ParkingStore>, SetupError> {
    let storage = FileStorageAdapter::new_default()?;
    let adapters = Adapters::new(Rc::new(storage), Rc::new(ReqwestFetchAdapter::new()?))
        .with_logger(Rc::new(LogLogger::new(config.debug)));
    Ok(create_parking_store(adapters, config))
}
