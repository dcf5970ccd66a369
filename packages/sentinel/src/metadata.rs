//! Node identity snapshot, collected once at startup and republished on
//! every restart. Grounded in `metadata_collector.py`: CPU model/cores,
//! total RAM, OS/kernel identity, hostname, and the MAC of the first
//! non-loopback interface.

use aegis_proto::NodeMetadata;
use sysinfo::{Networks, System};
use uuid::Uuid;

const AGENT_VERSION: &str = env!("CARGO_PKG_VERSION");

pub fn collect(agent_id: Uuid) -> NodeMetadata {
    let mut system = System::new_all();
    system.refresh_all();

    let cpu_model = system.cpus().first().map(|cpu| cpu.brand().to_string());
    let cpu_cores = u32::try_from(system.cpus().len()).ok();
    let ram_total_mb = Some(system.total_memory() / (1024 * 1024));

    NodeMetadata {
        agent_id,
        hostname: System::host_name(),
        os_name: System::name(),
        os_version: System::os_version(),
        kernel_version: System::kernel_version(),
        cpu_model,
        cpu_cores,
        ram_total_mb,
        mac_address: first_non_loopback_mac(),
        agent_version: Some(AGENT_VERSION.to_string()),
    }
}

fn first_non_loopback_mac() -> Option<String> {
    let networks = Networks::new_with_refreshed_list();
    networks
        .iter()
        .filter(|(name, _)| !name.starts_with("lo"))
        .map(|(_, data)| data.mac_address().to_string())
        .find(|mac| mac != "00:00:00:00:00:00")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collects_populated_metadata() {
        let metadata = collect(Uuid::new_v4());
        assert!(metadata.cpu_cores.unwrap_or(0) > 0);
        assert!(metadata.ram_total_mb.unwrap_or(0) > 0);
    }
}
