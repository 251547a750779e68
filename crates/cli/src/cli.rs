use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use reqwest::Client;
use scribe_bot::TelegramClient;
use scribe_metrics::TracingService;
use scribe_models::Config;
use scribe_packaging::{
    short_key, BuildError, DockerLayerStore, LayerRecord, PackagingService, PlannedLayer,
};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser, Debug)]
#[command(name = "scribe-cli")]
#[command(about = "Build the Scribe service image and manage its Telegram webhook")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Config file; defaults to configs/default.toml or config/config.toml
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand, Debug, PartialEq)]
pub enum Commands {
    /// Build the service image with layer caching
    Build {
        /// Build context directory
        #[arg(long, default_value = ".")]
        context: PathBuf,

        /// Image reference to tag, overriding build.image_tag
        #[arg(long)]
        tag: Option<String>,

        /// Execute every step even when cached
        #[arg(long)]
        no_cache: bool,
    },

    /// Show which steps a build would take from cache
    Plan {
        #[arg(long, default_value = ".")]
        context: PathBuf,
    },

    /// Print the equivalent Dockerfile
    Dockerfile {
        #[arg(long, default_value = ".")]
        context: PathBuf,

        /// Write Dockerfile and .dockerignore into the context instead
        #[arg(long)]
        write: bool,
    },

    /// Drop layer cache entries older than N days
    PruneCache {
        #[arg(long, default_value = ".")]
        context: PathBuf,

        #[arg(long)]
        max_age_days: u64,
    },

    /// Register <public-url>/webhook/<token> with Telegram
    SetWebhook {
        #[arg(long)]
        public_url: String,
    },
}

pub fn layer_line(layer: &LayerRecord) -> String {
    let status = if layer.cached { "CACHED" } else { "RUN" };
    format!("{:<6} {:<20} {}", status, layer.stage.to_string(), layer.instruction)
}

pub fn planned_line(layer: &PlannedLayer) -> String {
    let status = if layer.cached { "CACHED" } else { "RUN" };
    let key = layer.cache_key.as_deref().map(short_key).unwrap_or("-");
    format!(
        "{:<6} {:<20} {:<12} {}",
        status,
        layer.stage.to_string(),
        key,
        layer.instruction
    )
}

pub fn webhook_url(public_url: &str, token: &str) -> String {
    format!("{}/webhook/{}", public_url.trim_end_matches('/'), token)
}

pub async fn run_cli() -> Result<()> {
    let cli = Cli::parse();
    let config = Config::load(cli.config.as_deref())?;
    TracingService::init(&config.log)?;

    match cli.command {
        Commands::Build {
            context,
            tag,
            no_cache,
        } => {
            let service = PackagingService::new(config.build.clone())?;
            let store = DockerLayerStore::connect(&config.build.docker_host)?;
            let target = tag.clone().unwrap_or_else(|| config.build.image_tag.clone());

            match service
                .build(Arc::new(store), &context, tag.as_deref(), no_cache)
                .await
            {
                Ok(image) => {
                    for layer in &image.layers {
                        TracingService::log_build_step(
                            &layer.stage.to_string(),
                            &layer.instruction,
                            &layer.cache_key,
                            layer.cached,
                        );
                        println!("{}", layer_line(layer));
                    }
                    TracingService::log_build_finished(
                        &target,
                        &image.image_id,
                        image.executed_stages().len(),
                        image.duration_ms,
                    );
                    println!("Successfully built {} ({})", image.image_ref, image.image_id);
                }
                Err(e) => {
                    TracingService::log_build_failed(&target, &e.to_string());
                    report(&e);
                    bail!("build of {} failed", target);
                }
            }
        }

        Commands::Plan { context } => {
            let service = PackagingService::new(config.build)?;
            for layer in service.predict(&context)? {
                println!("{}", planned_line(&layer));
            }
        }

        Commands::Dockerfile { context, write } => {
            let service = PackagingService::new(config.build)?;
            if write {
                for path in service.write_dockerfile(&context)? {
                    println!("Wrote {}", path.display());
                }
            } else {
                print!("{}", service.dockerfile());
            }
        }

        Commands::PruneCache {
            context,
            max_age_days,
        } => {
            let service = PackagingService::new(config.build)?;
            let removed = service.prune_cache(&context, max_age_days)?;
            println!("Removed {} cache entries", removed);
        }

        Commands::SetWebhook { public_url } => {
            if config.telegram.bot_token.trim().is_empty() {
                bail!("TELEGRAM_BOT_TOKEN is required");
            }
            let url = webhook_url(&public_url, &config.telegram.bot_token);
            let telegram = TelegramClient::new(Client::new(), &config.telegram);
            telegram
                .set_webhook(&url)
                .await
                .context("setWebhook failed")?;
            println!("Webhook registered at {}/webhook/<token>", public_url.trim_end_matches('/'));
        }
    }

    Ok(())
}

fn report(e: &BuildError) {
    eprintln!("Error: {}", e);
    if let Some(hint) = e.hint() {
        eprintln!("Hint: {}", hint);
    }
}
