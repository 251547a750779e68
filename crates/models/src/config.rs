use crate::ScribeError;
use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Config files tried in order when no explicit path is given.
pub const CONFIG_PATHS: [&str; 2] = ["configs/default.toml", "config/config.toml"];

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct Config {
    pub server: ServerConfig,
    pub telegram: TelegramConfig,
    pub transkriptor: TranskriptorConfig,
    pub poll: PollConfig,
    pub build: BuildConfig,
    pub log: LogConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct ServerConfig {
    pub bind: String,
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct TelegramConfig {
    pub bot_token: String,
    pub api_base: String,
    pub request_timeout_secs: u64,
    pub upload_timeout_secs: u64,
    pub max_message_len: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct TranskriptorConfig {
    pub api_key: String,
    pub api_base: String,
    pub language: String,
    pub service: String,
    pub request_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct PollConfig {
    pub interval_secs: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_attempts: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct BuildConfig {
    pub base_image: String,
    pub workdir: String,
    pub manifest: String,
    pub interpreter: String,
    pub entry_file: String,
    pub port: u16,
    pub image_tag: String,
    pub cache_dir: String,
    /// `.dockerignore` patterns, relative to the context root.
    pub ignore: Vec<String>,
    /// Docker socket path; empty means the platform default.
    pub docker_host: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct LogConfig {
    /// "pretty" or "json"
    pub format: String,
    pub level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                bind: "0.0.0.0".to_string(),
                port: 5050,
            },
            telegram: TelegramConfig {
                bot_token: "".to_string(),
                api_base: "https://api.telegram.org".to_string(),
                request_timeout_secs: 30,
                upload_timeout_secs: 60,
                max_message_len: 4096,
            },
            transkriptor: TranskriptorConfig {
                api_key: "".to_string(),
                api_base: "https://api.tor.app".to_string(),
                language: "en-US".to_string(),
                service: "Standard".to_string(),
                request_timeout_secs: 30,
            },
            poll: PollConfig {
                interval_secs: 30,
                max_attempts: None,
            },
            build: BuildConfig {
                base_image: "python:3.11-slim".to_string(),
                workdir: "/app".to_string(),
                manifest: "requirements.txt".to_string(),
                interpreter: "python".to_string(),
                entry_file: "main.py".to_string(),
                port: 5050,
                image_tag: "scribe:latest".to_string(),
                cache_dir: "data/build-cache".to_string(),
                ignore: vec![
                    ".git".to_string(),
                    "**/__pycache__".to_string(),
                    "**/*.pyc".to_string(),
                    ".venv".to_string(),
                ],
                docker_host: "".to_string(),
            },
            log: LogConfig {
                format: "pretty".to_string(),
                level: "info".to_string(),
            },
        }
    }
}

impl Config {
    /// Layered figment: defaults, then a TOML file, then `SCRIBE_*` env vars,
    /// then the bare variable names the service has always honoured.
    pub fn figment(path: Option<&Path>) -> Figment {
        let mut figment = Figment::from(Serialized::defaults(Config::default()));

        if let Some(file) = path.map(Path::to_path_buf).or_else(find_config_file) {
            figment = figment.merge(Toml::file(file));
        }

        figment
            .merge(Env::prefixed("SCRIBE_").split("__"))
            .merge(
                Env::raw()
                    .only(&["TELEGRAM_BOT_TOKEN", "TRANSKRIPTOR_API_KEY", "POLL_INTERVAL", "PORT"])
                    .map(|key| match key.as_str().to_ascii_uppercase().as_str() {
                        "TELEGRAM_BOT_TOKEN" => "telegram.bot_token".into(),
                        "TRANSKRIPTOR_API_KEY" => "transkriptor.api_key".into(),
                        "POLL_INTERVAL" => "poll.interval_secs".into(),
                        _ => "server.port".into(),
                    }),
            )
    }

    pub fn load(path: Option<&Path>) -> Result<Self, ScribeError> {
        Self::figment(path)
            .extract()
            .map_err(|e| ScribeError::ConfigError {
                reason: e.to_string(),
            })
    }

    /// The webhook service cannot run without both credentials.
    pub fn validate_service(&self) -> Result<(), ScribeError> {
        if self.telegram.bot_token.trim().is_empty() {
            return Err(ScribeError::ConfigError {
                reason: "TELEGRAM_BOT_TOKEN is required".to_string(),
            });
        }
        if self.transkriptor.api_key.trim().is_empty() {
            return Err(ScribeError::ConfigError {
                reason: "TRANSKRIPTOR_API_KEY is required".to_string(),
            });
        }
        if self.poll.interval_secs == 0 {
            return Err(ScribeError::ConfigError {
                reason: "poll.interval_secs must be greater than zero".to_string(),
            });
        }
        Ok(())
    }
}

fn find_config_file() -> Option<PathBuf> {
    CONFIG_PATHS
        .iter()
        .map(PathBuf::from)
        .find(|path| path.exists())
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::Jail;

    #[test]
    fn defaults_listen_on_5050() {
        let config = Config::default();
        assert_eq!(config.server.port, 5050);
        assert_eq!(config.build.port, 5050);
        assert_eq!(config.poll.interval_secs, 30);
        assert_eq!(config.telegram.max_message_len, 4096);
    }

    #[test]
    fn legacy_env_names_are_honoured() {
        Jail::expect_with(|jail| {
            jail.set_env("TELEGRAM_BOT_TOKEN", "123:abc");
            jail.set_env("TRANSKRIPTOR_API_KEY", "secret");
            jail.set_env("POLL_INTERVAL", "5");
            jail.set_env("PORT", "6060");

            let config = Config::load(None).expect("config loads");
            assert_eq!(config.telegram.bot_token, "123:abc");
            assert_eq!(config.transkriptor.api_key, "secret");
            assert_eq!(config.poll.interval_secs, 5);
            assert_eq!(config.server.port, 6060);
            assert!(config.validate_service().is_ok());
            Ok(())
        });
    }

    #[test]
    fn toml_file_then_prefixed_env() {
        Jail::expect_with(|jail| {
            jail.create_dir("configs")?;
            jail.create_file(
                "configs/default.toml",
                r#"
                [build]
                base_image = "python:3.12-slim"

                [log]
                format = "json"
                "#,
            )?;
            jail.set_env("SCRIBE_BUILD__IMAGE_TAG", "relay:dev");

            let config = Config::load(None).expect("config loads");
            assert_eq!(config.build.base_image, "python:3.12-slim");
            assert_eq!(config.build.image_tag, "relay:dev");
            assert_eq!(config.log.format, "json");
            // untouched sections keep their defaults
            assert_eq!(config.build.manifest, "requirements.txt");
            Ok(())
        });
    }

    #[test]
    fn unknown_keys_are_rejected() {
        Jail::expect_with(|jail| {
            jail.create_file("scribe.toml", "[server]\nbogus = 1\n")?;
            let err = Config::load(Some(Path::new("scribe.toml"))).unwrap_err();
            assert!(matches!(err, ScribeError::ConfigError { .. }));
            Ok(())
        });
    }

    #[test]
    fn missing_credentials_fail_validation() {
        let config = Config::default();
        let err = config.validate_service().unwrap_err();
        assert!(err.to_string().contains("TELEGRAM_BOT_TOKEN"));

        let mut config = Config::default();
        config.telegram.bot_token = "t".to_string();
        let err = config.validate_service().unwrap_err();
        assert!(err.to_string().contains("TRANSKRIPTOR_API_KEY"));
    }
}
