use serde::Deserialize;

/// Layered settings: compiled-in defaults -> optional `config.toml` (path
/// via `AEGIS_CONFIG`) -> `AEGIS_`-prefixed environment variables.
/// Validated once at startup; missing master secret/database/bus URL is
/// fatal before any bus subscription is established.
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub bus_url: String,
    pub database_url: String,
    pub master_secret: String,
    pub data_dir: String,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default = "default_environment")]
    pub environment: String,
    #[serde(default = "default_http_bind")]
    pub http_bind: String,
    #[serde(default = "default_llm_endpoint")]
    pub llm_endpoint: String,
    #[serde(default = "default_llm_model")]
    pub llm_model: String,
    #[serde(default = "default_ioc_feed_interval")]
    pub ioc_feed_interval_seconds: u64,
}

fn default_log_level() -> String {
    "info".to_string()
}
fn default_environment() -> String {
    "development".to_string()
}
fn default_http_bind() -> String {
    "0.0.0.0:8443".to_string()
}
fn default_llm_endpoint() -> String {
    "http://127.0.0.1:11434".to_string()
}
fn default_llm_model() -> String {
    "llama3".to_string()
}
fn default_ioc_feed_interval() -> u64 {
    3600
}

impl Settings {
    pub fn load() -> anyhow::Result<Self> {
        let config_path = std::env::var("AEGIS_CONFIG").unwrap_or_else(|_| "config.toml".to_string());

        let builder = config::Config::builder()
            .set_default("data_dir", "./data")?
            .add_source(config::File::with_name(&config_path).required(false))
            .add_source(config::Environment::with_prefix("AEGIS").separator("__"));

        let settings: Settings = builder.build()?.try_deserialize()?;

        if settings.master_secret.is_empty() {
            anyhow::bail!("AEGIS__MASTER_SECRET is required and must be non-empty");
        }
        if settings.database_url.is_empty() {
            anyhow::bail!("AEGIS__DATABASE_URL is required");
        }
        if settings.bus_url.is_empty() {
            anyhow::bail!("AEGIS__BUS_URL is required");
        }

        Ok(settings)
    }
}
