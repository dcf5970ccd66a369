//! Threat Intel Store (C6): periodically fetches IOC feeds and populates
//! the fingerprint cache with typed indicators the ingest pipeline can
//! look up without a round trip to the relational store.

use std::sync::Arc;
use std::time::Duration;

use aegis_cache::Cache;
use serde::{Deserialize, Serialize};
use serde_json::json;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IocType {
    Ip,
    Domain,
    Url,
    Hash,
}

impl IocType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Ip => "ip",
            Self::Domain => "domain",
            Self::Url => "url",
            Self::Hash => "hash",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IocEntry {
    pub confidence: f32,
    pub source: String,
    #[serde(default)]
    pub metadata: serde_json::Value,
    pub added_at: chrono::DateTime<chrono::Utc>,
}

/// An external IOC feed to pull from on a schedule. Fetch logic is
/// intentionally minimal: every feed is expected to return a flat JSON
/// array of `{type, value, confidence, source}` entries.
pub struct FeedSource {
    pub name: String,
    pub url: String,
}

pub struct ThreatIntelStore {
    cache: Arc<dyn Cache>,
    http: reqwest::Client,
    feeds: Vec<FeedSource>,
}

const IOC_TTL: Duration = Duration::from_secs(7 * 24 * 3600);

fn ioc_key(ioc_type: IocType, value: &str) -> String {
    format!("ioc:{}:{}", ioc_type.as_str(), value.to_ascii_lowercase())
}

impl ThreatIntelStore {
    pub fn new(cache: Arc<dyn Cache>, feeds: Vec<FeedSource>) -> Self {
        Self {
            cache,
            http: reqwest::Client::builder().timeout(Duration::from_secs(20)).build().unwrap_or_default(),
            feeds,
        }
    }

    pub async fn lookup(&self, ioc_type: IocType, value: &str) -> Option<IocEntry> {
        let raw = self.cache.get(&ioc_key(ioc_type, value)).await.ok().flatten()?;
        serde_json::from_value(raw).ok()
    }

    pub async fn seed(&self, ioc_type: IocType, value: &str, confidence: f32, source: &str) {
        let entry = IocEntry {
            confidence,
            source: source.to_string(),
            metadata: json!({}),
            added_at: chrono::Utc::now(),
        };
        if let Ok(value_json) = serde_json::to_value(&entry) {
            let _ = self.cache.set(&ioc_key(ioc_type, value), value_json, IOC_TTL).await;
        }
    }

    pub async fn stats(&self) -> serde_json::Value {
        let mut counts = serde_json::Map::new();
        for t in [IocType::Ip, IocType::Domain, IocType::Url, IocType::Hash] {
            let prefix = format!("ioc:{}:", t.as_str());
            let n = self.cache.scan(&prefix).await.map(|v| v.len()).unwrap_or(0);
            counts.insert(t.as_str().to_string(), json!(n));
        }
        json!({ "counts": counts, "feeds": self.feeds.iter().map(|f| &f.name).collect::<Vec<_>>() })
    }

    /// Polls every configured feed once, logging and continuing past any
    /// single feed's failure (an unreachable feed degrades coverage, not
    /// availability).
    async fn refresh_once(&self) {
        for feed in &self.feeds {
            match self.fetch_feed(feed).await {
                Ok(count) => tracing::info!(feed = %feed.name, count, "threat intel feed refreshed"),
                Err(err) => tracing::warn!(feed = %feed.name, %err, "threat intel feed fetch failed"),
            }
        }
    }

    async fn fetch_feed(&self, feed: &FeedSource) -> anyhow::Result<usize> {
        #[derive(Deserialize)]
        struct RawEntry {
            #[serde(rename = "type")]
            ioc_type: String,
            value: String,
            #[serde(default = "default_confidence")]
            confidence: f32,
        }
        fn default_confidence() -> f32 {
            0.7
        }

        let entries: Vec<RawEntry> = self.http.get(&feed.url).send().await?.error_for_status()?.json().await?;
        let mut stored = 0;
        for entry in entries {
            let Ok(ioc_type) = serde_json::from_value::<IocType>(json!(entry.ioc_type)) else {
                continue;
            };
            self.seed(ioc_type, &entry.value, entry.confidence, &feed.name).await;
            stored += 1;
        }
        Ok(stored)
    }

    pub fn spawn_refresh_loop(self: Arc<Self>, interval: Duration) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                let span = tracing::info_span!("threat_intel_refresh");
                let _enter = span.enter();
                self.refresh_once().await;
            }
        })
    }
}
