use crate::error::{BuildError, BuildResult};
use crate::image_ref::ImageRef;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Build stages in the only order a plan may run them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Stage {
    Base,
    Workdir,
    StageManifest,
    InstallDependencies,
    StageSource,
    Expose,
    Entrypoint,
}

impl Stage {
    pub const ALL: [Stage; 7] = [
        Stage::Base,
        Stage::Workdir,
        Stage::StageManifest,
        Stage::InstallDependencies,
        Stage::StageSource,
        Stage::Expose,
        Stage::Entrypoint,
    ];
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Base => "base",
            Stage::Workdir => "workdir",
            Stage::StageManifest => "stage-manifest",
            Stage::InstallDependencies => "install-dependencies",
            Stage::StageSource => "stage-source",
            Stage::Expose => "expose",
            Stage::Entrypoint => "entrypoint",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum BuildStep {
    Base { image: ImageRef },
    Workdir { path: String },
    StageManifest { file: String },
    InstallDependencies { command: String },
    StageSource,
    Expose { port: u16 },
    Entrypoint { command: Vec<String> },
}

impl BuildStep {
    pub fn stage(&self) -> Stage {
        match self {
            BuildStep::Base { .. } => Stage::Base,
            BuildStep::Workdir { .. } => Stage::Workdir,
            BuildStep::StageManifest { .. } => Stage::StageManifest,
            BuildStep::InstallDependencies { .. } => Stage::InstallDependencies,
            BuildStep::StageSource => Stage::StageSource,
            BuildStep::Expose { .. } => Stage::Expose,
            BuildStep::Entrypoint { .. } => Stage::Entrypoint,
        }
    }

    /// Dockerfile form of the step. Also the instruction text hashed into
    /// the layer cache key.
    pub fn instruction(&self) -> String {
        match self {
            BuildStep::Base { image } => format!("FROM {image}"),
            BuildStep::Workdir { path } => format!("WORKDIR {path}"),
            BuildStep::StageManifest { file } => format!("COPY {file} ."),
            BuildStep::InstallDependencies { command } => format!("RUN {command}"),
            BuildStep::StageSource => "COPY . .".to_string(),
            BuildStep::Expose { port } => format!("EXPOSE {port}"),
            BuildStep::Entrypoint { command } => format!("CMD {}", exec_form(command)),
        }
    }
}

/// JSON array form used by exec-style instructions.
pub fn exec_form(command: &[String]) -> String {
    serde_json::to_string(command).unwrap_or_else(|_| "[]".to_string())
}

/// A validated, totally ordered sequence of build steps.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildPlan {
    steps: Vec<BuildStep>,
}

impl BuildPlan {
    /// Every stage exactly once, in `Stage` order.
    pub fn from_steps(steps: Vec<BuildStep>) -> BuildResult<Self> {
        let stages: Vec<Stage> = steps.iter().map(BuildStep::stage).collect();
        if stages != Stage::ALL {
            return Err(BuildError::InvalidPlan(format!(
                "expected stages {:?}, got {:?}",
                Stage::ALL,
                stages
            )));
        }

        for step in &steps {
            match step {
                BuildStep::Workdir { path } if !path.starts_with('/') => {
                    return Err(BuildError::InvalidPlan(format!(
                        "working directory must be absolute: {path}"
                    )));
                }
                BuildStep::StageManifest { file } if file.is_empty() || file.contains('/') => {
                    return Err(BuildError::InvalidPlan(format!(
                        "manifest must be a file at the context root: {file}"
                    )));
                }
                BuildStep::Expose { port: 0 } => {
                    return Err(BuildError::InvalidPlan("port 0 cannot be exposed".to_string()));
                }
                BuildStep::Entrypoint { command } if command.is_empty() => {
                    return Err(BuildError::InvalidPlan("entrypoint command is empty".to_string()));
                }
                _ => {}
            }
        }

        Ok(Self { steps })
    }

    pub fn steps(&self) -> &[BuildStep] {
        &self.steps
    }

    pub fn base_image(&self) -> &ImageRef {
        match &self.steps[0] {
            BuildStep::Base { image } => image,
            _ => unreachable!("validated plans start with a base step"),
        }
    }

    pub fn workdir(&self) -> &str {
        self.steps
            .iter()
            .find_map(|step| match step {
                BuildStep::Workdir { path } => Some(path.as_str()),
                _ => None,
            })
            .unwrap_or("/")
    }

    pub fn manifest(&self) -> &str {
        self.steps
            .iter()
            .find_map(|step| match step {
                BuildStep::StageManifest { file } => Some(file.as_str()),
                _ => None,
            })
            .unwrap_or_default()
    }

    pub fn exposed_port(&self) -> u16 {
        self.steps
            .iter()
            .find_map(|step| match step {
                BuildStep::Expose { port } => Some(*port),
                _ => None,
            })
            .unwrap_or_default()
    }

    pub fn entrypoint(&self) -> &[String] {
        self.steps
            .iter()
            .find_map(|step| match step {
                BuildStep::Entrypoint { command } => Some(command.as_slice()),
                _ => None,
            })
            .unwrap_or_default()
    }
}
