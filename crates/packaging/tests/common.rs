#![allow(dead_code)]

use async_trait::async_trait;
use scribe_models::Config;
use scribe_packaging::{
    sha256_hex, BuildError, BuildResult, ImageRef, LayerOp, LayerStore, PackagingService,
};
use std::collections::HashSet;
use std::fs;
use std::path::Path;
use std::sync::Mutex;

pub const BASE_ID: &str = "sha256:base0000";

/// Layer store that keeps nothing but a log of what it was asked to do.
/// Layer ids are derived from the cache key so rebuilds are comparable.
#[derive(Default)]
pub struct RecordingStore {
    pub ops: Mutex<Vec<LayerOp>>,
    pub tags: Mutex<Vec<(String, String)>>,
    images: Mutex<HashSet<String>>,
    fail_install: Mutex<Option<String>>,
}

impl RecordingStore {
    pub fn failing_install(output: &str) -> Self {
        let store = Self::default();
        *store.fail_install.lock().unwrap() = Some(output.to_string());
        store
    }

    pub fn ops(&self) -> Vec<LayerOp> {
        self.ops.lock().unwrap().clone()
    }

    pub fn op_kinds(&self) -> Vec<&'static str> {
        self.ops.lock().unwrap().iter().map(LayerOp::kind).collect()
    }

    pub fn tags(&self) -> Vec<(String, String)> {
        self.tags.lock().unwrap().clone()
    }

    pub fn clear_log(&self) {
        self.ops.lock().unwrap().clear();
        self.tags.lock().unwrap().clear();
    }

    /// Simulates `docker image rm`.
    pub fn evict(&self, image_id: &str) {
        self.images.lock().unwrap().remove(image_id);
    }
}

#[async_trait]
impl LayerStore for RecordingStore {
    async fn resolve_base(&self, image: &ImageRef) -> BuildResult<String> {
        if image.repository == "missing" {
            return Err(BuildError::BaseImageUnresolvable {
                image: image.to_string(),
                reason: "manifest unknown".to_string(),
            });
        }
        self.images.lock().unwrap().insert(BASE_ID.to_string());
        Ok(BASE_ID.to_string())
    }

    async fn apply(&self, parent: &str, op: &LayerOp, cache_key: &str) -> BuildResult<String> {
        assert!(self.images.lock().unwrap().contains(parent), "unknown parent {parent}");
        self.ops.lock().unwrap().push(op.clone());

        if let (LayerOp::Run { .. }, Some(output)) = (op, self.fail_install.lock().unwrap().clone()) {
            return Err(BuildError::DependencyInstall { exit_code: 1, output });
        }

        let id = format!("sha256:{}", &sha256_hex(cache_key.as_bytes())[..16]);
        self.images.lock().unwrap().insert(id.clone());
        Ok(id)
    }

    async fn exists(&self, image_id: &str) -> BuildResult<bool> {
        Ok(self.images.lock().unwrap().contains(image_id))
    }

    async fn tag(&self, image_id: &str, target: &ImageRef) -> BuildResult<()> {
        self.tags
            .lock()
            .unwrap()
            .push((image_id.to_string(), target.to_string()));
        Ok(())
    }
}

pub fn write(root: &Path, relative: &str, contents: &str) {
    let path = root.join(relative);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(path, contents).unwrap();
}

/// A small bot project: manifest, entry file and a helper module.
pub fn sample_project(root: &Path) {
    write(root, "requirements.txt", "requests==2.31.0\nflask==3.0.0\n");
    write(root, "main.py", "from bot import app\napp.run(port=5050)\n");
    write(root, "bot/__init__.py", "app = None\n");
    write(root, ".git/HEAD", "ref: refs/heads/main\n");
}

pub fn service() -> PackagingService {
    PackagingService::new(Config::default().build).unwrap()
}

/// Entry names of a tar archive, directory entries without their slash.
pub fn archive_entries(archive: &[u8]) -> Vec<String> {
    let mut tar = tar::Archive::new(archive);
    tar.entries()
        .unwrap()
        .map(|entry| {
            let entry = entry.unwrap();
            let path = entry.path().unwrap().to_string_lossy().to_string();
            path.trim_end_matches('/').to_string()
        })
        .collect()
}
