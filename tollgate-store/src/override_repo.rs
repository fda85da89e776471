use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use serde_json::{Map, Value};
use tokio::sync::Mutex;
use tollgate_core::{OverrideStore, StoreError};
use tracing::{debug, info, warn};

/// Key under which the external-payment flag is persisted
pub const WEB_SUBSCRIPTION_ACTIVE_KEY: &str = "web_subscription_active";

/// Override flag persisted in a small JSON key-value file.
///
/// Other keys in the file are preserved on write.
pub struct FileOverrideStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl FileOverrideStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Unparsable contents read as an empty map, so the flag reads false and
    /// the next save replaces the file. I/O errors are returned as is.
    async fn read_map(&self) -> Result<Map<String, Value>, StoreError> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Map::new()),
            Err(e) => return Err(e.into()),
        };
        if bytes.is_empty() {
            return Ok(Map::new());
        }

        match serde_json::from_slice(&bytes) {
            Ok(map) => Ok(map),
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Settings file unreadable, treating as empty");
                Ok(Map::new())
            }
        }
    }
}

#[async_trait]
impl OverrideStore for FileOverrideStore {
    async fn load(&self) -> Result<bool, StoreError> {
        let map = self.read_map().await?;
        Ok(map
            .get(WEB_SUBSCRIPTION_ACTIVE_KEY)
            .and_then(Value::as_bool)
            .unwrap_or(false))
    }

    async fn save(&self, active: bool) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().await;

        let mut map = self.read_map().await?;
        map.insert(WEB_SUBSCRIPTION_ACTIVE_KEY.to_string(), Value::Bool(active));

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }

        // Write-then-rename so a crash never leaves a truncated file
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, serde_json::to_vec_pretty(&map)?).await?;
        tokio::fs::rename(&tmp, &self.path).await?;

        info!(active, path = %self.path.display(), "Override flag persisted");
        Ok(())
    }
}

/// In-process override flag, for tests and ephemeral sandboxes
#[derive(Default)]
pub struct MemoryOverrideStore {
    active: AtomicBool,
    unavailable: AtomicBool,
}

impl MemoryOverrideStore {
    pub fn new(active: bool) -> Self {
        Self {
            active: AtomicBool::new(active),
            unavailable: AtomicBool::new(false),
        }
    }

    /// Make every load/save fail until cleared
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn check(&self) -> Result<(), StoreError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("memory store disabled".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl OverrideStore for MemoryOverrideStore {
    async fn load(&self) -> Result<bool, StoreError> {
        self.check()?;
        Ok(self.active.load(Ordering::SeqCst))
    }

    async fn save(&self, active: bool) -> Result<(), StoreError> {
        self.check()?;
        self.active.store(active, Ordering::SeqCst);
        debug!(active, "Override flag stored in memory");
        Ok(())
    }
}
