use crate::cache::LayerCache;
use crate::context::{BuildContext, IgnoreRules};
use crate::dockerfile::{render_dockerfile, write_build_files};
use crate::error::BuildResult;
use crate::image_builder::{predict, BuildOptions, BuiltImage, ImageBuilder, PlannedLayer};
use crate::image_ref::ImageRef;
use crate::plan::BuildPlan;
use crate::runtimes::plan_for;
use crate::store::LayerStore;
use scribe_models::BuildConfig;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use tracing::{info, instrument};

/// Entry point for the build commands: turns a `BuildConfig` and a context
/// directory into a plan, a scanned context and a loaded layer cache.
pub struct PackagingService {
    config: BuildConfig,
    plan: BuildPlan,
}

impl PackagingService {
    pub fn new(config: BuildConfig) -> BuildResult<Self> {
        let plan = plan_for(&config)?;
        Ok(Self { config, plan })
    }

    pub fn plan(&self) -> &BuildPlan {
        &self.plan
    }

    pub fn config(&self) -> &BuildConfig {
        &self.config
    }

    /// Configured ignore patterns, then the context's `.dockerignore`, then
    /// the layer cache directory when it lives inside the context.
    pub fn ignore_rules(&self, context_dir: &Path) -> BuildResult<IgnoreRules> {
        let mut rules = IgnoreRules::new(&self.config.ignore);
        rules.extend_from_dockerignore(context_dir)?;
        if let Some(cache) = self.cache_dir_in_context(context_dir) {
            rules.exclude(&cache);
        }
        Ok(rules)
    }

    pub fn scan(&self, context_dir: &Path) -> BuildResult<BuildContext> {
        let rules = self.ignore_rules(context_dir)?;
        BuildContext::scan(context_dir, &self.config.manifest, &rules)
    }

    /// The cache dir relative to `context_dir`, `/`-separated, if it is inside.
    fn cache_dir_in_context(&self, context_dir: &Path) -> Option<String> {
        let cache_dir = self.cache_dir(context_dir);
        let relative = match cache_dir.strip_prefix(context_dir) {
            Ok(relative) => relative.to_path_buf(),
            Err(_) => {
                let context = context_dir.canonicalize().ok()?;
                cache_dir.strip_prefix(context).ok()?.to_path_buf()
            }
        };
        let parts: Vec<String> = relative
            .components()
            .filter_map(|c| match c {
                Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
                _ => None,
            })
            .collect();
        (!parts.is_empty()).then(|| parts.join("/"))
    }

    /// Relative cache dirs live under the context.
    pub fn cache_dir(&self, context_dir: &Path) -> PathBuf {
        let dir = Path::new(&self.config.cache_dir);
        if dir.is_absolute() {
            dir.to_path_buf()
        } else {
            context_dir.join(dir)
        }
    }

    pub fn open_cache(&self, context_dir: &Path) -> BuildResult<LayerCache> {
        LayerCache::new(self.cache_dir(context_dir))
    }

    /// `tag` overrides the configured `image_tag`.
    pub fn target(&self, tag: Option<&str>) -> BuildResult<ImageRef> {
        tag.unwrap_or(self.config.image_tag.as_str()).parse()
    }

    #[instrument(skip(self, store))]
    pub async fn build(
        &self,
        store: Arc<dyn LayerStore>,
        context_dir: &Path,
        tag: Option<&str>,
        no_cache: bool,
    ) -> BuildResult<BuiltImage> {
        let target = self.target(tag)?;
        let context = self.scan(context_dir)?;
        let mut cache = self.open_cache(context_dir)?;
        info!(
            "Building {} from {} ({} files, {} cached layers)",
            target,
            context_dir.display(),
            context.files().len(),
            cache.len()
        );

        ImageBuilder::new(store)
            .build(
                &self.plan,
                &context,
                &mut cache,
                &target,
                &BuildOptions { no_cache },
            )
            .await
    }

    pub fn predict(&self, context_dir: &Path) -> BuildResult<Vec<PlannedLayer>> {
        let context = self.scan(context_dir)?;
        let cache = self.open_cache(context_dir)?;
        Ok(predict(&self.plan, &context, &cache))
    }

    pub fn dockerfile(&self) -> String {
        render_dockerfile(&self.plan)
    }

    pub fn write_dockerfile(&self, context_dir: &Path) -> BuildResult<Vec<PathBuf>> {
        let rules = self.ignore_rules(context_dir)?;
        write_build_files(&self.plan, &rules, context_dir)
    }

    /// Removes cache entries older than `max_age_days` and persists the rest.
    pub fn prune_cache(&self, context_dir: &Path, max_age_days: u64) -> BuildResult<usize> {
        let mut cache = self.open_cache(context_dir)?;
        let removed = cache.cleanup_old_cache(max_age_days);
        cache.save_cache()?;
        Ok(removed)
    }
}
