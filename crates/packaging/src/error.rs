use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BuildError {
    #[error("Base image could not be resolved: {image}: {reason}")]
    BaseImageUnresolvable { image: String, reason: String },

    #[error("Dependency manifest not found: {0}")]
    ManifestMissing(PathBuf),

    #[error("Dependency installation failed with exit code {exit_code}: {output}")]
    DependencyInstall { exit_code: i64, output: String },

    #[error("Failed to stage {path}: {reason}")]
    SourceStaging { path: PathBuf, reason: String },

    #[error("Build context directory not found: {0}")]
    ContextNotFound(PathBuf),

    #[error("Invalid build plan: {0}")]
    InvalidPlan(String),

    #[error("Invalid image reference: {0}")]
    InvalidImageRef(String),

    #[error("Step `{instruction}` failed: {reason}")]
    StepFailed { instruction: String, reason: String },

    #[error("Docker error: {0}")]
    Docker(#[from] bollard::errors::Error),

    #[error("Build context scan failed: {0}")]
    Scan(#[from] ignore::Error),

    #[error("Layer cache error: {0}")]
    Cache(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl BuildError {
    /// Operator-facing hint printed by the CLI under the error itself.
    pub fn hint(&self) -> Option<&'static str> {
        match self {
            BuildError::BaseImageUnresolvable { .. } => {
                Some("check the base_image reference and registry connectivity")
            }
            BuildError::ManifestMissing(_) => {
                Some("the build context must contain the dependency manifest at its root")
            }
            BuildError::DependencyInstall { .. } => {
                Some("fix the failing package specifier in the manifest and rebuild")
            }
            BuildError::Docker(_) => Some("is the Docker daemon running and reachable?"),
            _ => None,
        }
    }
}

pub type BuildResult<T> = std::result::Result<T, BuildError>;
