//! Striker agent process entry point: registers with Core, maintains mTLS
//! and heartbeat, applies pushed/polled config live, and runs the action
//! executor and rollback scheduler. Mirrors `agent_runtime/service.py`'s
//! startup sequence, generalized past its one hardcoded NATS client.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use aegis_bus::{Bus, MtlsCredentials};
use aegis_credentials::TransportCrypto;
use aegis_proto::{AgentHeartbeat, AgentRegister, AgentType};
use aegis_striker::executor::ActionExecutor;
use aegis_striker::rollback::RollbackManager;
use aegis_striker::runtime_config::{self, RuntimeConfig, SharedRuntimeConfig};
use aegis_striker::state::{persist_certificate, LocalIdentity};
use aegis_striker::Settings;
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
    tracing::info!(zone = %settings.zone, subtype = %settings.agent_subtype, "starting aegis-striker");

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
            allowed_actions: view.allowed_actions,
            action_defaults: view.action_defaults.unwrap_or_default(),
            max_concurrent_actions: view.max_concurrent_actions,
            config_version: view.config_version.unwrap_or(0),
        })
        .unwrap_or_default();
    let max_concurrent = initial_config.max_concurrent_actions;
    let runtime_config = runtime_config::shared(initial_config);

    let rollback = RollbackManager::new();
    rollback.spawn_scheduler(Arc::clone(&bus), own_action_subject(agent_id));

    let executor = Arc::new(ActionExecutor::new(agent_id, Arc::clone(&bus), Arc::clone(&runtime_config), rollback).with_concurrency_cap(max_concurrent));

    spawn_action_listener(Arc::clone(&bus), Arc::clone(&executor), own_action_subject(agent_id), false).await;
    spawn_action_listener(Arc::clone(&bus), Arc::clone(&executor), "actions.broadcast".to_string(), true).await;
    for capability in &settings.capabilities {
        spawn_action_listener(Arc::clone(&bus), Arc::clone(&executor), format!("actions.{capability}"), true).await;
    }

    spawn_config_push_listener(Arc::clone(&bus), Arc::clone(&runtime_config), agent_id);
    spawn_heartbeat_loop(Arc::clone(&bus), http.clone(), core_api_url.clone(), identity.api_key.clone(), agent_id, settings.clone());

    shutdown_signal(bus).await;
    Ok(())
}

fn own_action_subject(agent_id: Uuid) -> String {
    format!("actions.{agent_id}")
}

async fn register_with_backoff(http: &reqwest::Client, settings: &Settings, identity: &LocalIdentity) -> RegisterResponse {
    let mut backoff = MIN_BACKOFF;
    loop {
        let req = AgentRegister {
            api_key: identity.api_key.clone(),
            agent_type: AgentType::Striker,
            agent_subtype: settings.agent_subtype.clone(),
            zone: settings.zone.clone(),
            capabilities: settings.capabilities.clone(),
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
    allowed_actions: Option<Vec<String>>,
    #[serde(default)]
    action_defaults: Option<serde_json::Value>,
    #[serde(default)]
    max_concurrent_actions: Option<u32>,
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

async fn spawn_action_listener(bus: Arc<Bus>, executor: Arc<ActionExecutor>, subject: String, queue_group: bool) {
    let sub_result = if queue_group { bus.queue_subscribe(subject.clone(), "action_executor").await } else { bus.subscribe(subject.clone()).await };
    let mut sub = match sub_result {
        Ok(sub) => sub,
        Err(err) => {
            tracing::error!(%err, %subject, "failed to subscribe to action subject");
            return;
        }
    };
    tracing::info!(%subject, queue_group, "listening for actions");
    tokio::spawn(async move {
        loop {
            let Some(incoming) = Bus::next_json::<aegis_striker::executor::IncomingAction>(&mut sub).await else { break };
            executor.handle_incoming(incoming).await;
        }
    });
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
                agent_type: Some(AgentType::Striker),
                agent_subtype: Some(settings.agent_subtype.clone()),
                zone: Some(settings.zone.clone()),
                capabilities: Some(settings.capabilities.clone()),
            };
            let subject = format!("heartbeat.striker.{agent_id}");
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

async fn shutdown_signal(bus: Arc<Bus>) {
    let _ = tokio::signal::ctrl_c().await;
    tracing::info!("shutdown signal received, draining bus");
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
