//! The probe contract: `probes/base.py`'s `BaseProbe` reduced to its
//! interface. Concrete probes (process, network, filesystem anomaly
//! detection) are out of scope here; this crate only defines the seam
//! a future probe would plug into and drives its own node-identity and
//! deception telemetry without one.

use async_trait::async_trait;
use serde_json::Value;

#[async_trait]
pub trait Probe: Send + Sync {
    fn name(&self) -> &str;
    fn interval_seconds(&self) -> u64;
    async fn collect(&self) -> anyhow::Result<Value>;
}
