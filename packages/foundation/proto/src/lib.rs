//! Wire schemas for the event-to-alert-to-action pipeline.
//!
//! These types are the payloads carried on the message bus subjects
//! (`events.sentinel.*`, `internal.events`, `alerts`, `actions.*`) and are
//! shared verbatim between the core process and every agent so that both
//! sides decode the same JSON shape.

mod action;
mod agent;
mod alert;
mod event;
mod severity;

pub use action::{Action, ActionStatus, EvidenceBundle, HostSnapshot, NetworkConnectionInfo, ProcessInfo, RecentFile, SystemMetrics};
pub use agent::{AgentHeartbeat, AgentRegister, AgentType, NodeMetadata};
pub use alert::{Alert, AlertBundle, AlertVerdict, Reasoning};
pub use event::Event;
pub use severity::Severity;
