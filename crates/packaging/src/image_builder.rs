use crate::cache::{chain_key, root_key, short_key, LayerCache};
use crate::context::{directory_archive, BuildContext, StagedInput};
use crate::error::BuildResult;
use crate::image_ref::ImageRef;
use crate::plan::{BuildPlan, BuildStep, Stage};
use crate::store::{LayerOp, LayerStore};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, instrument};
use uuid::Uuid;

#[derive(Debug, Clone, Default)]
pub struct BuildOptions {
    /// Execute every step even when a cached layer exists.
    pub no_cache: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayerRecord {
    pub stage: Stage,
    pub instruction: String,
    pub cache_key: String,
    pub image_id: String,
    pub cached: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageMetadata {
    pub workdir: String,
    pub exposed_ports: Vec<String>,
    pub entrypoint: Vec<String>,
}

impl ImageMetadata {
    pub fn from_plan(plan: &BuildPlan) -> Self {
        Self {
            workdir: plan.workdir().to_string(),
            exposed_ports: vec![format!("{}/tcp", plan.exposed_port())],
            entrypoint: plan.entrypoint().to_vec(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuiltImage {
    pub build_id: Uuid,
    pub image_ref: ImageRef,
    pub image_id: String,
    pub layers: Vec<LayerRecord>,
    pub metadata: ImageMetadata,
    pub duration_ms: u64,
}

impl BuiltImage {
    pub fn executed_stages(&self) -> Vec<Stage> {
        self.layers
            .iter()
            .filter(|layer| !layer.cached)
            .map(|layer| layer.stage)
            .collect()
    }
}

/// Dry-run view of a step: its cache key when it can be computed, and
/// whether the persisted cache already holds it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlannedLayer {
    pub stage: Stage,
    pub instruction: String,
    pub cache_key: Option<String>,
    pub cached: bool,
}

pub struct ImageBuilder {
    store: Arc<dyn LayerStore>,
}

impl ImageBuilder {
    pub fn new(store: Arc<dyn LayerStore>) -> Self {
        Self { store }
    }

    /// Runs `plan` step by step. The first failure aborts the build and
    /// `target` is only tagged once every step has produced its layer.
    #[instrument(skip(self, plan, context, cache, options))]
    pub async fn build(
        &self,
        plan: &BuildPlan,
        context: &BuildContext,
        cache: &mut LayerCache,
        target: &ImageRef,
        options: &BuildOptions,
    ) -> BuildResult<BuiltImage> {
        let build_id = Uuid::new_v4();
        let started = Instant::now();
        info!("Starting build {} for {}", build_id, target);

        let base = plan.base_image();
        let base_id = self.store.resolve_base(base).await.map_err(|e| {
            error!("Build {} failed resolving {}: {}", build_id, base, e);
            e
        })?;
        cache.record_base(&base.to_string(), &base_id);

        let mut parent_key = root_key(&base_id);
        let mut parent_id = base_id.clone();
        let mut layers = vec![LayerRecord {
            stage: Stage::Base,
            instruction: plan.steps()[0].instruction(),
            cache_key: parent_key.clone(),
            image_id: base_id,
            cached: true,
        }];

        for step in &plan.steps()[1..] {
            let instruction = step.instruction();
            let input = staged_input(step, context);
            let key = chain_key(&parent_key, &instruction, input.as_ref().map(|i| i.digest.as_str()));

            let reusable = match cache.get(&key) {
                Some(layer) if !options.no_cache => {
                    let image_id = layer.image_id.clone();
                    if self.store.exists(&image_id).await? {
                        Some(image_id)
                    } else {
                        cache.forget(&key);
                        None
                    }
                }
                _ => None,
            };

            let (image_id, cached) = match reusable {
                Some(image_id) => {
                    info!("Step {} ({}): using cache {}", step.stage(), instruction, short_key(&key));
                    (image_id, true)
                }
                None => {
                    info!("Step {} ({}): executing", step.stage(), instruction);
                    let op = layer_op(step, plan, context, input.as_ref())?;
                    let image_id = match self.store.apply(&parent_id, &op, &key).await {
                        Ok(id) => id,
                        Err(e) => {
                            error!("Build {} failed at {}: {}", build_id, step.stage(), e);
                            // layers that did complete stay reusable
                            if let Err(save) = cache.save_cache() {
                                error!("Build {} could not persist the layer cache: {}", build_id, save);
                            }
                            return Err(e);
                        }
                    };
                    cache.record(&key, &image_id, &instruction);
                    (image_id, false)
                }
            };

            layers.push(LayerRecord {
                stage: step.stage(),
                instruction,
                cache_key: key.clone(),
                image_id: image_id.clone(),
                cached,
            });
            parent_key = key;
            parent_id = image_id;
        }

        self.store.tag(&parent_id, target).await?;
        cache.save_cache()?;

        let duration_ms = started.elapsed().as_millis() as u64;
        info!(
            "Built {} ({}) in {}ms, {} of {} steps executed",
            target,
            parent_id,
            duration_ms,
            layers.iter().filter(|l| !l.cached).count(),
            layers.len() - 1
        );

        Ok(BuiltImage {
            build_id,
            image_ref: target.clone(),
            image_id: parent_id,
            layers,
            metadata: ImageMetadata::from_plan(plan),
            duration_ms,
        })
    }
}

/// Predicts which steps a build would reuse without talking to a layer
/// store. Without a recorded base image id nothing can be keyed.
pub fn predict(plan: &BuildPlan, context: &BuildContext, cache: &LayerCache) -> Vec<PlannedLayer> {
    let base = plan.base_image().to_string();
    let mut parent_key = cache.base(&base).map(root_key);

    plan.steps()
        .iter()
        .map(|step| {
            let instruction = step.instruction();
            if step.stage() == Stage::Base {
                return PlannedLayer {
                    stage: Stage::Base,
                    instruction,
                    cache_key: parent_key.clone(),
                    cached: parent_key.is_some(),
                };
            }

            let key = parent_key.as_ref().map(|parent| {
                let input = staged_input(step, context);
                chain_key(parent, &instruction, input.as_ref().map(|i| i.digest.as_str()))
            });
            let cached = key.as_ref().is_some_and(|k| cache.get(k).is_some());
            parent_key = key.clone();

            PlannedLayer {
                stage: step.stage(),
                instruction,
                cache_key: key,
                cached,
            }
        })
        .collect()
}

fn staged_input(step: &BuildStep, context: &BuildContext) -> Option<StagedInput> {
    match step {
        BuildStep::StageManifest { .. } => Some(context.manifest_input()),
        BuildStep::StageSource => Some(context.source_input()),
        _ => None,
    }
}

fn layer_op(
    step: &BuildStep,
    plan: &BuildPlan,
    context: &BuildContext,
    input: Option<&StagedInput>,
) -> BuildResult<LayerOp> {
    let op = match (step, input) {
        (BuildStep::Workdir { path }, _) => LayerOp::Workdir {
            path: path.clone(),
            archive: Bytes::from(directory_archive(path)?),
        },
        (BuildStep::StageManifest { .. } | BuildStep::StageSource, Some(input)) => LayerOp::Copy {
            dest: plan.workdir().to_string(),
            archive: Bytes::from(context.archive(input)?),
        },
        (BuildStep::InstallDependencies { command }, _) => LayerOp::Run {
            command: command.clone(),
        },
        (BuildStep::Expose { port }, _) => LayerOp::Config {
            change: format!("EXPOSE {port}/tcp"),
        },
        (step, _) => LayerOp::Config {
            change: step.instruction(),
        },
    };
    Ok(op)
}
