use serde::Deserialize;

/// Bootstrap settings for the Striker process: bus/Core endpoints and the
/// identity this host registers under. Everything Core can subsequently
/// override (zone, allowlist, action defaults, concurrency cap) lives in
/// [`crate::runtime_config::RuntimeConfig`] instead, applied live.
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub bus_url: String,
    pub core_api_url: String,
    #[serde(default = "default_agent_subtype")]
    pub agent_subtype: String,
    #[serde(default = "default_zone")]
    pub zone: String,
    #[serde(default = "default_capabilities")]
    pub capabilities: Vec<String>,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default = "default_environment")]
    pub environment: String,
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
}

fn default_agent_subtype() -> String {
    "endpoint".to_string()
}
fn default_zone() -> String {
    "default".to_string()
}
fn default_capabilities() -> Vec<String> {
    vec!["network_block".to_string(), "isolate_host".to_string(), "kill_process".to_string()]
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_environment() -> String {
    "development".to_string()
}
fn default_data_dir() -> String {
    "./data".to_string()
}

impl Settings {
    pub fn load() -> anyhow::Result<Self> {
        let config_path = std::env::var("AEGIS_CONFIG").unwrap_or_else(|_| "config.toml".to_string());

        let builder = config::Config::builder()
            .set_default("data_dir", "./data")?
            .add_source(config::File::with_name(&config_path).required(false))
            .add_source(config::Environment::with_prefix("AEGIS").separator("__"));

        let settings: Settings = builder.build()?.try_deserialize()?;

        if settings.bus_url.is_empty() {
            anyhow::bail!("AEGIS__BUS_URL is required");
        }
        if settings.core_api_url.is_empty() {
            anyhow::bail!("AEGIS__CORE_API_URL is required");
        }

        Ok(settings)
    }
}
