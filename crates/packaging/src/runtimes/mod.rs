use crate::error::{BuildError, BuildResult};
use crate::plan::BuildPlan;
use scribe_models::BuildConfig;

pub mod python;

/// Build plan for the configured interpreter.
pub fn plan_for(config: &BuildConfig) -> BuildResult<BuildPlan> {
    if config.interpreter.starts_with("python") {
        python::plan(config)
    } else {
        Err(BuildError::InvalidPlan(format!(
            "unsupported interpreter: {}",
            config.interpreter
        )))
    }
}
