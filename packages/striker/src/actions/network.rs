//! `network_block` / `network_unblock`: single-IP drop rules via
//! `iptables`. Separate from the broader quarantine chain `isolate.rs`
//! manages, since a block targets one source while isolation drops
//! everything but the control bus.

use std::process::Command;

use super::{ActionOutcome, NetworkBlockParams, NetworkUnblockParams};

fn iptables_path() -> Option<String> {
    which("iptables")
}

fn which(bin: &str) -> Option<String> {
    let path_var = std::env::var_os("PATH")?;
    std::env::split_paths(&path_var).map(|dir| dir.join(bin)).find(|p| p.is_file()).map(|p| p.to_string_lossy().into_owned())
}

fn run(iptables: &str, args: &[&str]) -> std::io::Result<std::process::ExitStatus> {
    Command::new(iptables).args(args).stdout(std::process::Stdio::null()).stderr(std::process::Stdio::null()).status()
}

pub async fn block(params: &NetworkBlockParams) -> ActionOutcome {
    let target = params.target.clone();
    let duration = params.duration;
    tokio::task::spawn_blocking(move || block_blocking(&target, duration)).await.unwrap_or(ActionOutcome {
        succeeded: false,
        result_data: serde_json::json!({"reason": "blocking task panicked"}),
    })
}

fn block_blocking(target: &str, duration: u64) -> ActionOutcome {
    if target.is_empty() {
        return ActionOutcome { succeeded: false, result_data: serde_json::json!({"reason": "no target specified"}) };
    }

    let Some(iptables) = iptables_path() else {
        tracing::warn!(target, "iptables not found, simulating network_block");
        return ActionOutcome { succeeded: true, result_data: serde_json::json!({"simulated": true, "target": target, "duration": duration}) };
    };

    let already_blocked = run(&iptables, &["-C", "INPUT", "-s", target, "-j", "DROP"]).map(|s| s.success()).unwrap_or(false);
    if already_blocked {
        return ActionOutcome { succeeded: true, result_data: serde_json::json!({"reason": "already blocked", "target": target}) };
    }

    match run(&iptables, &["-A", "INPUT", "-s", target, "-j", "DROP"]) {
        Ok(status) if status.success() => {
            tracing::info!(target, duration, "blocked via iptables");
            ActionOutcome { succeeded: true, result_data: serde_json::json!({"target": target, "duration": duration}) }
        }
        Ok(status) => ActionOutcome { succeeded: false, result_data: serde_json::json!({"reason": format!("iptables exited {status}")}) },
        Err(err) => ActionOutcome { succeeded: false, result_data: serde_json::json!({"reason": err.to_string()}) },
    }
}

pub async fn unblock(params: &NetworkUnblockParams) -> ActionOutcome {
    let target = params.target.clone();
    tokio::task::spawn_blocking(move || unblock_blocking(&target)).await.unwrap_or(ActionOutcome {
        succeeded: false,
        result_data: serde_json::json!({"reason": "blocking task panicked"}),
    })
}

fn unblock_blocking(target: &str) -> ActionOutcome {
    let Some(iptables) = iptables_path() else {
        tracing::warn!(target, "iptables not found, simulating network_unblock");
        return ActionOutcome { succeeded: true, result_data: serde_json::json!({"simulated": true, "target": target}) };
    };

    // Idempotent: -D against a rule that isn't present just fails quietly.
    let _ = run(&iptables, &["-D", "INPUT", "-s", target, "-j", "DROP"]);
    tracing::info!(target, "unblocked via iptables");
    ActionOutcome { succeeded: true, result_data: serde_json::json!({"target": target}) }
}
