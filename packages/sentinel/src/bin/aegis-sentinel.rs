//! Sentinel agent process entry point: registers with Core, maintains
//! mTLS and heartbeat, publishes node identity, seeds and watches
//! honeytoken decoys, and applies pushed/polled config live. Mirrors
//! `agent_runtime/service.py`'s startup sequence.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use aegis_bus::{Bus, MtlsCredentials};
use aegis_credentials::TransportCrypto;
use aegis_proto::{AgentHeartbeat, AgentRegister, AgentType};
use aegis_sentinel::deception::DeceptionEngine;
use aegis_sentinel::emitter::EventEmitter;
use aegis_sentinel::runtime_config::{self, RuntimeConfig, SharedRuntimeConfig};
use aegis_sentinel::state::{persist_certificate, LocalIdentity};
use aegis_sentinel::Settings;
use serde::Deserialize;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);
const MIN_BACKOFF: Duration = Duration::from_secs(2);
const MAX_BACKOFF: Duration = Duration::from_secs(60);

#[derive(Debug, Deserialize)]
struct RegisterResponse {
    id: Uuid,
    client_cert: String,
    client_key: String,
    ca_cert: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let settings = Settings::load()?;
    init_tracing(&settings.log_level, &settings.environment);
    tracing::info!(zone = %settings.zone, subtype = %settings.agent_subtype, "starting aegis-sentinel");

    let data_dir = Path::new(&settings.data_dir);
    let mut identity = LocalIdentity::load_or_create(data_dir)?;
    let http = reqwest::Client::new();

    let registration = register_with_backoff(&http, &settings, &identity).await;
    identity.set_agent_id(registration.id)?;
    persist_certificate(data_dir, &registration.client_cert, &registration.client_key, &registration.ca_cert)?;
    let agent_id = registration.id;

    let mut bus_url = settings.bus_url.clone();
    let mut core_api_url = settings.core_api_url.clone();
    if let Ok(view) = fetch_agent_config(&http, &core_api_url, agent_id, &identity.api_key).await {
        if let Some(decrypted) = view.nats_url_enc.as_deref().and_then(|enc| TransportCrypto::decrypt(&identity.api_key, enc).ok()) {
            bus_url = decrypted;
        }
        if let Some(decrypted) = view.core_api_url_enc.as_deref().and_then(|enc| TransportCrypto::decrypt(&identity.api_key, enc).ok()) {
            core_api_url = decrypted;
        }
    }

    let mtls = MtlsCredentials {
        client_cert_path: &data_dir.join("client.crt"),
        client_key_path: &data_dir.join("client.key"),
        ca_cert_path: &data_dir.join("ca.crt"),
    };
    let bus = Arc::new(Bus::connect(&bus_url, Some(mtls)).await?);

    let initial_config = fetch_agent_config(&http, &core_api_url, agent_id, &identity.api_key)
        .await
        .map(|view| RuntimeConfig {
            zone: view.zone.unwrap_or_else(|| settings.zone.clone()),
            log_level: view.log_level.unwrap_or_else(|| settings.log_level.clone()),
            detection_thresholds: view.detection_thresholds.unwrap_or_default(),
            probe_interval_seconds: view.probe_interval_seconds,
            enabled_probes: view.enabled_probes,
            config_version: view.config_version.unwrap_or(0),
        })
        .unwrap_or_default();
    let runtime_config = runtime_config::shared(initial_config);

    publish_node_metadata(&bus, agent_id).await;

    let emitter = Arc::new(EventEmitter::new((*bus).clone(), agent_id, &settings.agent_subtype));
    Arc::clone(&emitter).spawn_flush_loop();

    if settings.deception_enabled {
        let engine = DeceptionEngine::new(&settings.decoy_dir);
        if let Err(err) = engine.seed() {
            tracing::error!(%err, "failed to seed honeytoken decoys");
        } else {
            match engine.spawn_watcher(Arc::clone(&emitter)) {
                Ok(_handle) => tracing::info!(decoy_dir = %settings.decoy_dir, "honeytoken watcher started"),
                Err(err) => tracing::error!(%err, "failed to start honeytoken watcher"),
            }
        }
    }

    spawn_config_push_listener(Arc::clone(&bus), Arc::clone(&runtime_config), agent_id);
    spawn_heartbeat_loop(Arc::clone(&bus), http.clone(), core_api_url.clone(), identity.api_key.clone(), agent_id, settings.clone());

    shutdown_signal(bus, emitter).await;
    Ok(())
}

async fn publish_node_metadata(bus: &Bus, agent_id: Uuid) {
    let metadata = aegis_sentinel::metadata::collect(agent_id);
    let subject = format!("node.metadata.{agent_id}");
    if let Err(err) = bus.publish_json(subject.as_str(), &metadata).await {
        tracing::warn!(%err, "failed to publish node metadata");
    }
}

async fn register_with_backoff(http: &reqwest::Client, settings: &Settings, identity: &LocalIdentity) -> RegisterResponse {
    let mut backoff = MIN_BACKOFF;
    loop {
        let req = AgentRegister {
            api_key: identity.api_key.clone(),
            agent_type: AgentType::Sentinel,
            agent_subtype: settings.agent_subtype.clone(),
            zone: settings.zone.clone(),
            capabilities: Vec::new(),
            metadata: serde_json::json!({}),
        };
        match http.post(format!("{}/agents/register", settings.core_api_url)).json(&req).send().await {
            Ok(resp) if resp.status().is_success() => match resp.json::<RegisterResponse>().await {
                Ok(parsed) => {
                    tracing::info!(agent_id = %parsed.id, "registered with core");
                    return parsed;
                }
                Err(err) => tracing::warn!(%err, "malformed registration response, retrying"),
            },
            Ok(resp) => tracing::warn!(status = %resp.status(), "registration rejected, retrying"),
            Err(err) => tracing::warn!(%err, "registration request failed, retrying"),
        }
        tokio::time::sleep(backoff).await;
        backoff = (backoff * 2).min(MAX_BACKOFF);
    }
}

#[derive(Debug, Default, Deserialize)]
struct AgentConfigView {
    #[serde(default)]
    nats_url_enc: Option<String>,
    #[serde(default)]
    core_api_url_enc: Option<String>,
    #[serde(default)]
    log_level: Option<String>,
    #[serde(default)]
    zone: Option<String>,
    #[serde(default)]
    detection_thresholds: Option<serde_json::Value>,
    #[serde(default)]
    probe_interval_seconds: Option<u64>,
    #[serde(default)]
    enabled_probes: Option<Vec<String>>,
    #[serde(default)]
    config_version: Option<i64>,
}

async fn fetch_agent_config(http: &reqwest::Client, core_api_url: &str, agent_id: Uuid, api_key: &str) -> anyhow::Result<AgentConfigView> {
    let resp = http
        .get(format!("{core_api_url}/agent-config/{agent_id}/config"))
        .header("X-Agent-API-Key", api_key)
        .send()
        .await?
        .error_for_status()?;
    Ok(resp.json::<AgentConfigView>().await?)
}

fn spawn_config_push_listener(bus: Arc<Bus>, runtime_config: SharedRuntimeConfig, agent_id: Uuid) {
    tokio::spawn(async move {
        let subject = format!("config.{agent_id}");
        let mut sub = match bus.subscribe(subject.as_str()).await {
            Ok(sub) => sub,
            Err(err) => {
                tracing::error!(%err, "failed to subscribe to config push");
                return;
            }
        };
        loop {
            let Some(pushed) = Bus::next_json::<RuntimeConfig>(&mut sub).await else { break };
            tracing::info!(config_version = pushed.config_version, "applying pushed config");
            *runtime_config.write().await = pushed;
        }
    });
}

fn spawn_heartbeat_loop(bus: Arc<Bus>, http: reqwest::Client, core_api_url: String, api_key: String, agent_id: Uuid, settings: Settings) {
    tokio::spawn(async move {
        loop {
            let hb = AgentHeartbeat {
                agent_id,
                status: "active".to_string(),
                resource_usage: serde_json::json!({}),
                agent_type: Some(AgentType::Sentinel),
                agent_subtype: Some(settings.agent_subtype.clone()),
                zone: Some(settings.zone.clone()),
                capabilities: None,
            };
            let subject = format!("heartbeat.sentinel.{agent_id}");
            if let Err(err) = bus.publish_json(subject.as_str(), &hb).await {
                tracing::warn!(%err, "bus heartbeat failed, falling back to http");
                let resp = http.post(format!("{core_api_url}/agents/heartbeat")).header("X-Agent-API-Key", &api_key).json(&hb).send().await;
                match resp {
                    Ok(r) if r.status() == reqwest::StatusCode::NOT_FOUND => tracing::warn!("heartbeat 404, agent unknown to core"),
                    Ok(r) if !r.status().is_success() => tracing::warn!(status = %r.status(), "http heartbeat rejected"),
                    Err(err) => tracing::warn!(%err, "http heartbeat failed"),
                    _ => {}
                }
            }
            tokio::time::sleep(HEARTBEAT_INTERVAL).await;
        }
    });
}

async fn shutdown_signal(bus: Arc<Bus>, emitter: Arc<EventEmitter>) {
    let _ = tokio::signal::ctrl_c().await;
    tracing::info!("shutdown signal received, flushing events and draining bus");
    if let Err(err) = emitter.flush().await {
        tracing::warn!(%err, "failed to flush buffered events during shutdown");
    }
    if let Err(err) = bus.drain().await {
        tracing::warn!(%err, "bus drain failed during shutdown");
    }
}

fn init_tracing(log_level: &str, environment: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));
    let registry = tracing_subscriber::registry().with(filter);
    if environment == "production" {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer().pretty()).init();
    }
}
