use crate::context::{IgnoreRules, DOCKERIGNORE};
use crate::error::BuildResult;
use crate::plan::BuildPlan;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

pub const DOCKERFILE: &str = "Dockerfile";

/// The Dockerfile equivalent of `plan`, one instruction per step.
pub fn render_dockerfile(plan: &BuildPlan) -> String {
    let mut out = String::new();
    for step in plan.steps() {
        out.push_str(&step.instruction());
        out.push('\n');
    }
    out
}

pub fn render_dockerignore(rules: &IgnoreRules) -> String {
    let mut out = String::new();
    for pattern in rules.patterns() {
        out.push_str(pattern);
        out.push('\n');
    }
    out
}

/// Writes `Dockerfile` and `.dockerignore` into `context_dir`, replacing
/// existing ones. Returns the paths written.
pub fn write_build_files(
    plan: &BuildPlan,
    rules: &IgnoreRules,
    context_dir: &Path,
) -> BuildResult<Vec<PathBuf>> {
    let dockerfile = context_dir.join(DOCKERFILE);
    let dockerignore = context_dir.join(DOCKERIGNORE);

    fs::write(&dockerfile, render_dockerfile(plan))?;
    fs::write(&dockerignore, render_dockerignore(rules))?;

    info!("Wrote {} and {}", dockerfile.display(), dockerignore.display());
    Ok(vec![dockerfile, dockerignore])
}
