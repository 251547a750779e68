use crate::error::BuildResult;
use crate::image_ref::ImageRef;
use async_trait::async_trait;
use bytes::Bytes;

/// What a single build step asks the layer store to do on top of a parent
/// image. Every operation yields exactly one new image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LayerOp {
    /// Create `path` from a directory-only tar and make it the working dir.
    Workdir { path: String, archive: Bytes },
    /// Extract `archive` into `dest`.
    Copy { dest: String, archive: Bytes },
    /// Run a shell command in the parent's working dir.
    Run { command: String },
    /// Commit a Dockerfile-style config change, e.g. `EXPOSE 5050/tcp`.
    Config { change: String },
}

impl LayerOp {
    pub fn kind(&self) -> &'static str {
        match self {
            LayerOp::Workdir { .. } => "workdir",
            LayerOp::Copy { .. } => "copy",
            LayerOp::Run { .. } => "run",
            LayerOp::Config { .. } => "config",
        }
    }
}

/// Backend that materialises layers. Image ids are opaque to the builder.
#[async_trait]
pub trait LayerStore: Send + Sync + 'static {
    /// Image id of `image`, pulling it when it is not present locally.
    async fn resolve_base(&self, image: &ImageRef) -> BuildResult<String>;

    /// Apply `op` on top of `parent` and return the new image id. `cache_key`
    /// identifies the layer for stores that label what they produce.
    async fn apply(&self, parent: &str, op: &LayerOp, cache_key: &str) -> BuildResult<String>;

    async fn exists(&self, image_id: &str) -> BuildResult<bool>;

    async fn tag(&self, image_id: &str, target: &ImageRef) -> BuildResult<()>;
}
