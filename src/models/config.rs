//! Configuration model loaded from external sources.

use std::env;
use std::path::Path;

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

fn default_query_retry() -> u32 {
    1
}

#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
/// Settings of the console core.
pub struct ConsoleConfig {
    /// Base URL of the brokerage REST API, e.g. `https://crm.example.com/api`.
    pub api_base_url: String,
    /// Token sent as `Authorization: Token <token>`.
    #[serde(default)]
    pub auth_token: Option<String>,
    /// Automatic retries of a failed read. Mutations are never retried.
    #[serde(default = "default_query_retry")]
    pub query_retry: u32,
    #[serde(default)]
    pub request_timeout_secs: Option<u64>,
}

impl ConsoleConfig {
    /// Loads `config/default.yaml`, the optional `config/{APP_ENV}.yaml`
    /// profile (defaults to `local`) and `APP_*` environment variables.
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        let app_env = env::var("APP_ENV").unwrap_or_else(|_| "local".into());
        Self::load_from(Path::new("config"), &app_env)
    }

    /// Same layering as [`ConsoleConfig::load`] rooted at `dir`.
    pub fn load_from(dir: &Path, app_env: &str) -> Result<Self, ConfigError> {
        let settings = Config::builder()
            .add_source(File::from(dir.join("default")))
            .add_source(File::from(dir.join(app_env)).required(false))
            .add_source(Environment::with_prefix("APP"))
            .build()
            .map_err(|err| {
                log::error!("Error loading settings: {err}");
                err
            })?;

        settings.try_deserialize::<ConsoleConfig>().map_err(|err| {
            log::error!("Error loading console config: {err}");
            err
        })
    }
}
