use crate::error::{BuildError, BuildResult};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, instrument};

const CACHE_FILE: &str = "layer_cache.json";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedLayer {
    pub image_id: String,
    pub instruction: String,
    pub created_at: DateTime<Utc>,
}

/// Cache key of the first layer: the resolved base image id.
pub fn root_key(base_image_id: &str) -> String {
    chain_key("", &format!("base:{base_image_id}"), None)
}

/// `sha256(parent ‖ instruction ‖ input digest)`. A step's key therefore
/// changes whenever anything it builds on changes, and only then.
pub fn chain_key(parent: &str, instruction: &str, input_digest: Option<&str>) -> String {
    let mut hasher = Sha256::new();
    hasher.update(parent.as_bytes());
    hasher.update(b"\n");
    hasher.update(instruction.as_bytes());
    hasher.update(b"\n");
    if let Some(digest) = input_digest {
        hasher.update(digest.as_bytes());
    }
    format!("{:x}", hasher.finalize())
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct CacheFile {
    #[serde(default)]
    bases: HashMap<String, String>,
    #[serde(default)]
    layers: HashMap<String, CachedLayer>,
}

/// Persisted map from layer cache key to the image the step produced, plus
/// the image id each base reference last resolved to.
pub struct LayerCache {
    cache_dir: PathBuf,
    bases: HashMap<String, String>,
    layers: HashMap<String, CachedLayer>,
}

impl LayerCache {
    pub fn new(cache_dir: PathBuf) -> BuildResult<Self> {
        fs::create_dir_all(&cache_dir)?;

        let mut cache = Self {
            cache_dir,
            bases: HashMap::new(),
            layers: HashMap::new(),
        };
        cache.load_cache()?;

        Ok(cache)
    }

    /// Cache that is never written to disk.
    pub fn in_memory() -> Self {
        Self {
            cache_dir: PathBuf::new(),
            bases: HashMap::new(),
            layers: HashMap::new(),
        }
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    pub fn len(&self) -> usize {
        self.layers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    #[instrument(skip(self))]
    pub fn get(&self, key: &str) -> Option<&CachedLayer> {
        self.layers.get(key)
    }

    #[instrument(skip(self))]
    pub fn record(&mut self, key: &str, image_id: &str, instruction: &str) {
        self.layers.insert(
            key.to_string(),
            CachedLayer {
                image_id: image_id.to_string(),
                instruction: instruction.to_string(),
                created_at: Utc::now(),
            },
        );
        info!("Cached layer {} for `{}`", short_key(key), instruction);
    }

    pub fn base(&self, image_ref: &str) -> Option<&str> {
        self.bases.get(image_ref).map(String::as_str)
    }

    pub fn record_base(&mut self, image_ref: &str, image_id: &str) {
        self.bases.insert(image_ref.to_string(), image_id.to_string());
    }

    /// Drops an entry whose image no longer exists in the layer store.
    pub fn forget(&mut self, key: &str) {
        self.layers.remove(key);
    }

    #[instrument(skip(self))]
    pub fn cleanup_old_cache(&mut self, max_age_days: u64) -> usize {
        let cutoff = Utc::now() - Duration::days(max_age_days as i64);
        let before = self.layers.len();
        self.layers.retain(|_, layer| layer.created_at >= cutoff);
        let removed = before - self.layers.len();

        info!("Cleaned up {} old layer cache entries", removed);
        removed
    }

    fn load_cache(&mut self) -> BuildResult<()> {
        let cache_file = self.cache_dir.join(CACHE_FILE);
        if cache_file.exists() {
            let cache_data = fs::read_to_string(&cache_file)?;
            let file: CacheFile = serde_json::from_str(&cache_data)
                .map_err(|e| BuildError::Cache(format!("{}: {}", cache_file.display(), e)))?;
            self.bases = file.bases;
            self.layers = file.layers;
        }
        Ok(())
    }

    pub fn save_cache(&self) -> BuildResult<()> {
        if self.cache_dir.as_os_str().is_empty() {
            return Ok(());
        }
        let cache_file = self.cache_dir.join(CACHE_FILE);
        let file = CacheFile {
            bases: self.bases.clone(),
            layers: self.layers.clone(),
        };
        let cache_data =
            serde_json::to_string_pretty(&file).map_err(|e| BuildError::Cache(e.to_string()))?;
        fs::write(&cache_file, cache_data)?;
        Ok(())
    }
}

/// Leading 12 hex digits of a cache key, for logs and listings.
pub fn short_key(key: &str) -> &str {
    &key[..key.len().min(12)]
}
