use crate::error::BuildResult;
use crate::plan::{BuildPlan, BuildStep};
use scribe_models::BuildConfig;

/// pip must not keep its download cache inside the dependency layer.
pub fn install_command(manifest: &str) -> String {
    format!("pip install --no-cache-dir -r {manifest}")
}

pub fn plan(config: &BuildConfig) -> BuildResult<BuildPlan> {
    BuildPlan::from_steps(vec![
        BuildStep::Base {
            image: config.base_image.parse()?,
        },
        BuildStep::Workdir {
            path: config.workdir.clone(),
        },
        BuildStep::StageManifest {
            file: config.manifest.clone(),
        },
        BuildStep::InstallDependencies {
            command: install_command(&config.manifest),
        },
        BuildStep::StageSource,
        BuildStep::Expose { port: config.port },
        BuildStep::Entrypoint {
            command: vec![config.interpreter.clone(), config.entry_file.clone()],
        },
    ])
}
