//! Message Bus Client (C1): subject-based pub/sub over NATS with mTLS
//! transport, wildcard subscriptions and queue-group load balancing.

mod buffered;

pub use buffered::BufferedPublisher;

use std::path::Path;
use std::time::Duration;

use async_nats::{Client, ConnectOptions};
use futures::StreamExt;
use serde::de::DeserializeOwned;
use serde::Serialize;

#[derive(Debug, thiserror::Error)]
pub enum BusError {
    #[error("connection failed: {0}")]
    Connect(#[from] async_nats::ConnectError),
    #[error("publish failed: {0}")]
    Publish(#[from] async_nats::PublishError),
    #[error("subscribe failed: {0}")]
    Subscribe(#[from] async_nats::SubscribeError),
    #[error("serialization failed: {0}")]
    Serde(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, BusError>;

/// mTLS credential bundle: a client cert + key and the CA used to verify
/// the server, loaded from the files the Credential Service provisions.
pub struct MtlsCredentials<'a> {
    pub client_cert_path: &'a Path,
    pub client_key_path: &'a Path,
    pub ca_cert_path: &'a Path,
}

/// Thin wrapper around an `async-nats` client, providing the subject
/// conventions and reconnect/drain semantics the spec requires.
#[derive(Clone)]
pub struct Bus {
    client: Client,
}

impl Bus {
    /// Connects with infinite reconnect attempts and exponential backoff,
    /// logging every disconnect/reconnect transition exactly as the
    /// reference client's lifecycle callbacks do.
    pub async fn connect(url: &str, mtls: Option<MtlsCredentials<'_>>) -> Result<Self> {
        let mut options = ConnectOptions::new()
            .retry_on_initial_connect()
            .max_reconnects(None)
            .reconnect_delay_callback(|attempts| Duration::from_secs((attempts as u64 * 2).min(60)))
            .event_callback(|event| async move {
                match event {
                    async_nats::Event::Disconnected => tracing::warn!("bus disconnected, will retry"),
                    async_nats::Event::Connected => tracing::info!("bus (re)connected"),
                    other => tracing::debug!(?other, "bus event"),
                }
            });

        if let Some(creds) = mtls {
            options = options
                .add_client_certificate(creds.client_cert_path.to_path_buf(), creds.client_key_path.to_path_buf())
                .add_root_certificates(creds.ca_cert_path.to_path_buf())
                .require_tls(true);
        }

        let client = options.connect(url).await?;
        Ok(Self { client })
    }

    pub async fn publish_json<T: Serialize>(&self, subject: impl async_nats::subject::ToSubject, payload: &T) -> Result<()> {
        let bytes = serde_json::to_vec(payload)?;
        self.client.publish(subject, bytes.into()).await?;
        Ok(())
    }

    pub async fn publish_bytes(&self, subject: impl async_nats::subject::ToSubject, bytes: Vec<u8>) -> Result<()> {
        self.client.publish(subject, bytes.into()).await?;
        Ok(())
    }

    /// Ephemeral subscription (no queue group) — used for direct
    /// `actions.<agent_id>`-style subjects.
    pub async fn subscribe(&self, subject: impl async_nats::subject::ToSubject) -> Result<async_nats::Subscriber> {
        Ok(self.client.subscribe(subject).await?)
    }

    /// Queue-group subscription — competing consumers share the load,
    /// used for `events.>`, `actions.broadcast`, `heartbeat.>`, etc.
    pub async fn queue_subscribe(
        &self,
        subject: impl async_nats::subject::ToSubject,
        queue_group: impl Into<String>,
    ) -> Result<async_nats::Subscriber> {
        Ok(self.client.queue_subscribe(subject, queue_group.into()).await?)
    }

    /// Decodes the next message on a subscriber as JSON, logging and
    /// skipping (not terminating the subscription) on a malformed payload
    /// — at-least-once handlers must stay alive across bad messages.
    pub async fn next_json<T: DeserializeOwned>(subscriber: &mut async_nats::Subscriber) -> Option<T> {
        loop {
            let msg = subscriber.next().await?;
            match serde_json::from_slice(&msg.payload) {
                Ok(value) => return Some(value),
                Err(err) => {
                    tracing::warn!(%err, subject = %msg.subject, "dropping malformed bus message");
                    continue;
                }
            }
        }
    }

    /// Decodes the next message as a raw JSON value instead of a concrete
    /// type, for callers that need to repair a partially-malformed
    /// payload (e.g. a missing/invalid id) rather than reject it outright.
    /// Only a fully non-JSON payload is dropped here.
    pub async fn next_value(subscriber: &mut async_nats::Subscriber) -> Option<serde_json::Value> {
        loop {
            let msg = subscriber.next().await?;
            match serde_json::from_slice(&msg.payload) {
                Ok(value) => return Some(value),
                Err(err) => {
                    tracing::warn!(%err, subject = %msg.subject, "dropping non-JSON bus message");
                    continue;
                }
            }
        }
    }

    /// Drains in-flight work before closing, per the shutdown contract:
    /// stop accepting new work, flush buffers, then close with `drain`.
    pub async fn drain(&self) -> Result<()> {
        self.client.drain().await?;
        Ok(())
    }
}
