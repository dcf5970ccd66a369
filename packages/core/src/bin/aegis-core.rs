//! Core process entry point: wires the ingest pipeline, correlation
//! engine, LLM enricher and decision engine to the bus, starts the
//! background sweeps, and serves the HTTP surface.

use std::path::Path;
use std::sync::Arc;

use aegis_bus::{Bus, MtlsCredentials};
use aegis_cache::MemoryCache;
use aegis_core::correlation::{default_rules, CorrelationEngine};
use aegis_core::decision::{ActionStatusReport, DecisionEngine};
use aegis_core::http::{self, AppState};
use aegis_core::ingest::{BatchingStore, IngestPipeline};
use aegis_core::llm::LlmEnricher;
use aegis_core::registry::Registry;
use aegis_core::threat_intel::{FeedSource, ThreatIntelStore};
use aegis_core::Settings;
use aegis_credentials::RootCa;
use aegis_proto::{AgentHeartbeat, Event, NodeMetadata};
use aegis_store::Store;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

const EVENTS_SUBJECT: &str = "events.sentinel.*";
const INTERNAL_EVENTS_SUBJECT: &str = "internal.events";
const HEARTBEAT_SUBJECT: &str = "heartbeat.>";
const NODE_METADATA_SUBJECT: &str = "node.metadata.>";
const LLM_ANALYZE_SUBJECT: &str = "llm.analyze";
const ALERTS_SUBJECT: &str = "alerts";
const ACTIONS_STATUS_SUBJECT: &str = "actions.status";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let settings = Settings::load()?;
    init_tracing(&settings.log_level, &settings.environment);

    tracing::info!(environment = %settings.environment, "starting aegis-core");

    let store = Store::connect(&settings.database_url).await?;
    store.migrate().await?;

    let data_dir = Path::new(&settings.data_dir);
    let ca = Arc::new(RootCa::load_or_create(&data_dir.join("ca"))?);

    let mtls_paths = data_dir.join("core-cert");
    let mtls = if mtls_paths.join("client.crt").exists() {
        Some(MtlsCredentials {
            client_cert_path: &mtls_paths.join("client.crt"),
            client_key_path: &mtls_paths.join("client.key"),
            ca_cert_path: &mtls_paths.join("ca.crt"),
        })
    } else {
        None
    };
    let bus = Arc::new(Bus::connect(&settings.bus_url, mtls).await?);

    let cache: Arc<dyn aegis_cache::Cache> = Arc::new(MemoryCache::new());

    let registry = Arc::new(Registry::new(store.clone(), Arc::clone(&ca)));
    let config_sync = Arc::new(aegis_core::config_sync::ConfigSync::new(store.clone(), Arc::clone(&bus), settings.master_secret.clone()));
    let threat_intel = Arc::new(ThreatIntelStore::new(
        Arc::clone(&cache),
        vec![FeedSource { name: "abuse.ch".to_string(), url: "https://feodotracker.abuse.ch/downloads/ipblocklist.json".to_string() }],
    ));
    let decision = Arc::new(DecisionEngine::new(store.clone(), Arc::clone(&bus)));
    let llm = Arc::new(LlmEnricher::new(Arc::clone(&cache), store.clone(), Arc::clone(&bus), settings.llm_endpoint.clone(), settings.llm_model.clone()));

    let batching_store = Arc::new(BatchingStore::new(store.clone()));
    let ingest = Arc::new(IngestPipeline::new(Arc::clone(&cache), Arc::clone(&batching_store), Arc::clone(&threat_intel), Arc::clone(&bus)));
    let correlation = Arc::new(CorrelationEngine::new(Arc::clone(&cache), store.clone(), Arc::clone(&bus), default_rules()));

    batching_store.spawn_flush_loop();
    Arc::clone(&registry).spawn_liveness_sweep();
    Arc::clone(&threat_intel).spawn_refresh_loop(std::time::Duration::from_secs(settings.ioc_feed_interval_seconds));

    spawn_ingest_loop(Arc::clone(&bus), Arc::clone(&ingest));
    spawn_correlator_loop(Arc::clone(&bus), Arc::clone(&correlation));
    spawn_llm_loop(Arc::clone(&bus), Arc::clone(&llm));
    spawn_decision_loop(Arc::clone(&bus), Arc::clone(&decision));
    spawn_heartbeat_loop(Arc::clone(&bus), Arc::clone(&registry));
    spawn_node_metadata_loop(Arc::clone(&bus), Arc::clone(&registry));

    let state = Arc::new(AppState {
        store,
        bus: Arc::clone(&bus),
        cache,
        registry,
        config_sync,
        decision,
        threat_intel,
        llm,
        ca,
        master_secret: settings.master_secret.clone(),
    });

    let app = http::router(state);
    let listener = tokio::net::TcpListener::bind(&settings.http_bind).await?;
    tracing::info!(addr = %settings.http_bind, "http surface listening");

    let shutdown_bus = Arc::clone(&bus);
    axum::serve(listener, app).with_graceful_shutdown(shutdown_signal(shutdown_bus)).await?;

    Ok(())
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

fn spawn_ingest_loop(bus: Arc<Bus>, ingest: Arc<IngestPipeline>) {
    tokio::spawn(async move {
        let mut sub = match bus.queue_subscribe(EVENTS_SUBJECT, "ingest_workers").await {
            Ok(sub) => sub,
            Err(err) => {
                tracing::error!(%err, "failed to subscribe to event subjects");
                return;
            }
        };
        loop {
            let Some(raw) = Bus::next_value(&mut sub).await else { break };
            ingest.process(Event::from_wire(raw)).await;
        }
    });
}

fn spawn_correlator_loop(bus: Arc<Bus>, correlation: Arc<CorrelationEngine>) {
    tokio::spawn(async move {
        let mut sub = match bus.queue_subscribe(INTERNAL_EVENTS_SUBJECT, "correlator").await {
            Ok(sub) => sub,
            Err(err) => {
                tracing::error!(%err, "failed to subscribe to internal events");
                return;
            }
        };
        loop {
            let Some(event) = Bus::next_json::<Event>(&mut sub).await else { break };
            correlation.process(event).await;
        }
    });
}

fn spawn_llm_loop(bus: Arc<Bus>, llm: Arc<LlmEnricher>) {
    tokio::spawn(async move {
        let mut sub = match bus.queue_subscribe(LLM_ANALYZE_SUBJECT, "llm_enricher").await {
            Ok(sub) => sub,
            Err(err) => {
                tracing::error!(%err, "failed to subscribe to llm.analyze");
                return;
            }
        };
        loop {
            let Some(bundle) = Bus::next_json::<aegis_proto::AlertBundle>(&mut sub).await else { break };
            llm.enrich(bundle).await;
        }
    });
}

fn spawn_decision_loop(bus: Arc<Bus>, decision: Arc<DecisionEngine>) {
    let alerts_bus = Arc::clone(&bus);
    let alerts_decision = Arc::clone(&decision);
    tokio::spawn(async move {
        let mut sub = match alerts_bus.queue_subscribe(ALERTS_SUBJECT, "decision_engine").await {
            Ok(sub) => sub,
            Err(err) => {
                tracing::error!(%err, "failed to subscribe to alerts");
                return;
            }
        };
        loop {
            let Some(alert) = Bus::next_json::<aegis_proto::Alert>(&mut sub).await else { break };
            alerts_decision.decide(alert).await;
        }
    });

    tokio::spawn(async move {
        let mut sub = match bus.queue_subscribe(ACTIONS_STATUS_SUBJECT, "decision_engine").await {
            Ok(sub) => sub,
            Err(err) => {
                tracing::error!(%err, "failed to subscribe to actions.status");
                return;
            }
        };
        loop {
            let Some(report) = Bus::next_json::<ActionStatusReport>(&mut sub).await else { break };
            decision.apply_status(report).await;
        }
    });
}

fn spawn_heartbeat_loop(bus: Arc<Bus>, registry: Arc<Registry>) {
    tokio::spawn(async move {
        let mut sub = match bus.queue_subscribe(HEARTBEAT_SUBJECT, "agent_manager").await {
            Ok(sub) => sub,
            Err(err) => {
                tracing::error!(%err, "failed to subscribe to heartbeats");
                return;
            }
        };
        loop {
            let Some(hb) = Bus::next_json::<AgentHeartbeat>(&mut sub).await else { break };
            if let Err(err) = registry.apply_bus_heartbeat(&hb).await {
                tracing::warn!(%err, agent_id = %hb.agent_id, "failed to apply bus heartbeat");
            }
        }
    });
}

fn spawn_node_metadata_loop(bus: Arc<Bus>, registry: Arc<Registry>) {
    tokio::spawn(async move {
        let mut sub = match bus.subscribe(NODE_METADATA_SUBJECT).await {
            Ok(sub) => sub,
            Err(err) => {
                tracing::error!(%err, "failed to subscribe to node metadata");
                return;
            }
        };
        loop {
            let Some(meta) = Bus::next_json::<NodeMetadata>(&mut sub).await else { break };
            if let Err(err) = registry.apply_node_metadata(&meta).await {
                tracing::warn!(%err, agent_id = %meta.agent_id, "failed to store node metadata");
            }
        }
    });
}
