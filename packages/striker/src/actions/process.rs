//! `kill_process`: terminate by pid or by name, grounded in
//! `kill_process.py`. `sysinfo` does the enumeration and the actual kill;
//! no external binary needed on either platform.

use sysinfo::{ProcessesToUpdate, Signal, System};

use super::{ActionOutcome, KillProcessParams};

pub async fn kill_process(params: &KillProcessParams) -> ActionOutcome {
    let params = params.clone();
    tokio::task::spawn_blocking(move || kill_blocking(&params)).await.unwrap_or(ActionOutcome {
        succeeded: false,
        result_data: serde_json::json!({"reason": "blocking task panicked"}),
    })
}

fn kill_blocking(params: &KillProcessParams) -> ActionOutcome {
    if params.pid.is_none() && params.process_name.is_none() {
        return ActionOutcome { succeeded: false, result_data: serde_json::json!({"reason": "neither pid nor process_name given"}) };
    }

    let mut system = System::new();
    system.refresh_processes(ProcessesToUpdate::All, true);

    let mut killed_pids = Vec::new();
    for (pid, process) in system.processes() {
        let matches_pid = params.pid.map(|wanted| wanted == pid.as_u32()).unwrap_or(false);
        let matches_name = params.process_name.as_deref().map(|wanted| process.name().to_string_lossy().eq_ignore_ascii_case(wanted)).unwrap_or(false);
        if matches_pid || matches_name {
            if process.kill_with(Signal::Term).unwrap_or(false) || process.kill() {
                killed_pids.push(pid.as_u32());
            }
        }
    }

    if killed_pids.is_empty() {
        tracing::warn!(?params.pid, ?params.process_name, "kill_process found no matching process");
        return ActionOutcome { succeeded: false, result_data: serde_json::json!({"reason": "no matching process found", "killed_count": 0}) };
    }

    tracing::info!(killed_pids = ?killed_pids, "killed process(es)");
    ActionOutcome { succeeded: true, result_data: serde_json::json!({"killed_count": killed_pids.len(), "killed_pids": killed_pids}) }
}
