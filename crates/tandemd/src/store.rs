//! File-backed persistent store.
//!
//! One file of fixed-size records under the data directory. The whole
//! image is rewritten on every change; it is a few dozen bytes.

use std::path::{Path, PathBuf};

use tandem_core::config::GatewayConfig;
use tandem_core::record::{MruEntry, RecordError, StoreImage};
use tandem_core::ProfileSet;
use tandem_engine::store::push_mru;
use tandem_engine::{CodecWords, ConfigStore};

const STORE_FILE: &str = "gateway.store";

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("failed to read {0}: {1}")]
    Read(PathBuf, std::io::Error),
    #[error("failed to write {0}: {1}")]
    Write(PathBuf, std::io::Error),
    #[error("corrupt store {0}: {1}")]
    Corrupt(PathBuf, RecordError),
}

pub struct FileStore {
    path: PathBuf,
    image: StoreImage,
    pins: Vec<String>,
    capacity: usize,
    codec: CodecWords,
}

impl FileStore {
    /// Open the store under `dir`. Enabled profiles always come from the
    /// configuration; the remembered peers come from disk.
    pub fn open(dir: &Path, config: &GatewayConfig) -> Result<Self, StoreError> {
        let path = dir.join(STORE_FILE);
        let mut image = match std::fs::read(&path) {
            Ok(bytes) => StoreImage::decode(&bytes).map_err(|e| StoreError::Corrupt(path.clone(), e))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => StoreImage::default(),
            Err(e) => return Err(StoreError::Read(path, e)),
        };
        image.local_profiles = config.profiles.enabled();
        image.mru.truncate(config.session.mru_capacity);
        tracing::info!(path = %path.display(), remembered = image.mru.len(), "store opened");
        Ok(Self::with_image(path, image, config))
    }

    /// Empty store at the usual location, used when the file is unusable.
    pub fn fresh(dir: &Path, config: &GatewayConfig) -> Self {
        let image = StoreImage {
            local_profiles: config.profiles.enabled(),
            mru: Vec::new(),
        };
        Self::with_image(dir.join(STORE_FILE), image, config)
    }

    fn with_image(path: PathBuf, image: StoreImage, config: &GatewayConfig) -> Self {
        Self {
            path,
            image,
            pins: config.security.pins.clone(),
            capacity: config.session.mru_capacity,
            codec: CodecWords::from_config(&config.audio),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persist(&self) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| StoreError::Write(self.path.clone(), e))?;
        }
        let tmp = self.path.with_extension("tmp");
        std::fs::write(&tmp, self.image.encode()).map_err(|e| StoreError::Write(tmp.clone(), e))?;
        std::fs::rename(&tmp, &self.path).map_err(|e| StoreError::Write(self.path.clone(), e))
    }

    fn persist_or_warn(&self) {
        if let Err(e) = self.persist() {
            tracing::warn!(error = %e, "store not saved");
        }
    }
}

impl ConfigStore for FileStore {
    fn local_profiles(&self) -> ProfileSet {
        self.image.local_profiles
    }

    fn set_local_profiles(&mut self, profiles: ProfileSet) {
        self.image.local_profiles = profiles;
        self.persist_or_warn();
    }

    fn pins(&self) -> &[String] {
        &self.pins
    }

    fn mru(&self) -> Vec<MruEntry> {
        self.image.mru.clone()
    }

    fn remember(&mut self, entry: MruEntry) {
        push_mru(&mut self.image.mru, entry, self.capacity);
        self.persist_or_warn();
    }

    fn codec_words(&self) -> CodecWords {
        self.codec
    }
}
