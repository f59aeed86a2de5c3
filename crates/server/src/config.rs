use client::RetryPolicy;
use config::ConfigError;
use serde::Deserialize;

const APP_PREFIX: &str = "SCRIPTNOTES_";

#[derive(Deserialize, Clone, Debug)]
pub struct Settings {
    pub server: ServerSettings,
    pub database: DatabaseSettings,
    pub security: SecuritySettings,
    #[serde(default)]
    pub sync: RetryPolicy,
}

#[derive(Deserialize, Clone, Debug)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
    pub cors_origins: String,
}

#[derive(Deserialize, Clone, Debug)]
pub struct DatabaseSettings {
    pub url: String,
}

#[derive(Deserialize, Clone, Debug)]
pub struct SecuritySettings {
    pub admin_token: String,
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        let run_mode = std::env::var("RUN_MODE").unwrap_or_else(|_| "development".to_string());
        Self::load(&run_mode, collect_env_vars(std::env::vars()))
    }

    fn load(run_mode: &str, overrides: Vec<(String, String)>) -> Result<Self, ConfigError> {
        let defaults = RetryPolicy::default();
        let mut builder = config::Config::builder()
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", 3000)?
            .set_default("server.cors_origins", "*")?
            .set_default("database.url", "sqlite://data/scriptnotes.db")?
            .set_default("security.admin_token", "admin_secret_change_me")?
            .set_default("sync.max_attempts", i64::from(defaults.max_attempts))?
            .set_default("sync.base_delay_ms", defaults.base_delay_ms as i64)?
            .set_default("sync.max_delay_ms", defaults.max_delay_ms as i64)?
            .add_source(config::File::with_name("config").required(false))
            .add_source(config::File::with_name(&format!("config.{}", run_mode)).required(false));

        // 环境变量优先级最高
        for (key, value) in overrides {
            builder = builder.set_override(key, value)?;
        }

        builder.build()?.try_deserialize()
    }
}

/// `SCRIPTNOTES_SERVER__PORT=8080` -> `server.port = "8080"`
fn collect_env_vars(vars: impl Iterator<Item = (String, String)>) -> Vec<(String, String)> {
    vars.filter(|(k, _)| k.starts_with(APP_PREFIX))
        .map(|(k, v)| {
            let new_key = k
                .trim_start_matches(APP_PREFIX)
                .replace("__", ".")
                .to_lowercase();
            (new_key, v)
        })
        .collect()
}
