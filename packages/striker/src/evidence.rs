//! Forensic pre/post snapshots taken around every action: process list,
//! network connections, recently modified files and point-in-time system
//! metrics. Grounded in `evidence_collector/service.py`; `sysinfo` covers
//! processes and metrics, recent files walk the same watch directories,
//! and network connections get a Linux-only `/proc` reader since `sysinfo`
//! has no per-socket enumeration.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use chrono::{DateTime, Utc};
use sysinfo::{Disks, ProcessesToUpdate, System};

use aegis_proto::{NetworkConnectionInfo, ProcessInfo, RecentFile, SystemMetrics};
use aegis_proto::HostSnapshot;

const WATCH_DIRS: &[&str] = &["/tmp", "/var/tmp", "/home", "/opt/aegis"];
const RECENT_FILE_WINDOW: Duration = Duration::from_secs(300);
const MAX_DEPTH: usize = 5;
const MAX_RECENT_FILES: usize = 200;
const MAX_CMDLINE_LEN: usize = 512;

pub async fn capture_snapshot() -> HostSnapshot {
    tokio::task::spawn_blocking(capture_snapshot_blocking).await.unwrap_or_else(|_| HostSnapshot {
        captured_at: Utc::now(),
        processes: Vec::new(),
        network_connections: Vec::new(),
        recent_files: Vec::new(),
        system_metrics: SystemMetrics::default(),
    })
}

fn capture_snapshot_blocking() -> HostSnapshot {
    let mut system = System::new_all();
    system.refresh_all();
    std::thread::sleep(Duration::from_millis(100));
    system.refresh_cpu_usage();
    system.refresh_processes(ProcessesToUpdate::All, true);

    HostSnapshot {
        captured_at: Utc::now(),
        processes: capture_processes(&system),
        network_connections: capture_network_connections(),
        recent_files: capture_recent_files(),
        system_metrics: capture_system_metrics(&system),
    }
}

fn capture_processes(system: &System) -> Vec<ProcessInfo> {
    system
        .processes()
        .values()
        .map(|p| {
            let mut cmdline = p.cmd().iter().map(|s| s.to_string_lossy().into_owned()).collect::<Vec<_>>().join(" ");
            cmdline.truncate(MAX_CMDLINE_LEN);
            ProcessInfo {
                pid: p.pid().as_u32(),
                name: p.name().to_string_lossy().into_owned(),
                cmdline,
                username: p.user_id().map(|uid| uid.to_string()),
                cpu_percent: p.cpu_usage(),
                memory_percent: (p.memory() as f32 / system.total_memory().max(1) as f32) * 100.0,
            }
        })
        .collect()
}

fn capture_system_metrics(system: &System) -> SystemMetrics {
    let cpu_percent = system.global_cpu_usage();
    let memory_percent = if system.total_memory() > 0 { (system.used_memory() as f32 / system.total_memory() as f32) * 100.0 } else { 0.0 };
    let memory_available_mb = system.available_memory() as f64 / 1024.0 / 1024.0;

    let disks = Disks::new_with_refreshed_list();
    let (disk_percent, disk_free_gb) = disks
        .iter()
        .find(|d| d.mount_point() == std::path::Path::new("/"))
        .or_else(|| disks.iter().next())
        .map(|d| {
            let total = d.total_space();
            let free = d.available_space();
            let used_percent = if total > 0 { ((total - free) as f32 / total as f32) * 100.0 } else { 0.0 };
            (used_percent, free as f64 / 1024.0 / 1024.0 / 1024.0)
        })
        .unwrap_or((0.0, 0.0));

    SystemMetrics { cpu_percent, memory_percent, memory_available_mb, disk_percent, disk_free_gb }
}

fn capture_recent_files() -> Vec<RecentFile> {
    let cutoff = SystemTime::now().checked_sub(RECENT_FILE_WINDOW).unwrap_or(UNIX_EPOCH);
    let mut recent = Vec::new();
    for dir in WATCH_DIRS {
        walk_dir(std::path::Path::new(dir), 0, cutoff, &mut recent);
        if recent.len() >= MAX_RECENT_FILES {
            break;
        }
    }
    recent.truncate(MAX_RECENT_FILES);
    recent
}

fn walk_dir(dir: &std::path::Path, depth: usize, cutoff: SystemTime, out: &mut Vec<RecentFile>) {
    if depth > MAX_DEPTH || out.len() >= MAX_RECENT_FILES {
        return;
    }
    let Ok(entries) = std::fs::read_dir(dir) else { return };
    for entry in entries.flatten() {
        if out.len() >= MAX_RECENT_FILES {
            return;
        }
        let path = entry.path();
        let Ok(meta) = entry.metadata() else { continue };
        if meta.is_symlink() {
            continue;
        }
        if meta.is_dir() {
            walk_dir(&path, depth + 1, cutoff, out);
            continue;
        }
        let Ok(modified) = meta.modified() else { continue };
        if modified >= cutoff {
            let modified_at: DateTime<Utc> = modified.into();
            out.push(RecentFile { path: path.to_string_lossy().into_owned(), size_bytes: meta.len(), modified_at });
        }
    }
}

#[cfg(target_os = "linux")]
fn capture_network_connections() -> Vec<NetworkConnectionInfo> {
    linux_proc_net::read_all()
}

#[cfg(not(target_os = "linux"))]
fn capture_network_connections() -> Vec<NetworkConnectionInfo> {
    Vec::new()
}

#[cfg(target_os = "linux")]
mod linux_proc_net {
    use std::collections::HashMap;
    use std::fs;

    use super::NetworkConnectionInfo;

    /// Parses `/proc/net/tcp{,6}` and cross-references socket inodes against
    /// `/proc/*/fd` to recover the owning pid. Best-effort: any I/O error
    /// (permissions, a process exiting mid-scan) just drops that entry.
    pub fn read_all() -> Vec<NetworkConnectionInfo> {
        let inode_to_pid = build_inode_pid_map();
        let mut conns = Vec::new();
        for (path, proto) in [("/proc/net/tcp", "tcp"), ("/proc/net/tcp6", "tcp6")] {
            let Ok(contents) = fs::read_to_string(path) else { continue };
            for line in contents.lines().skip(1) {
                if let Some(conn) = parse_line(line, proto, &inode_to_pid) {
                    conns.push(conn);
                }
            }
        }
        conns
    }

    fn build_inode_pid_map() -> HashMap<u64, u32> {
        let mut map = HashMap::new();
        let Ok(procs) = fs::read_dir("/proc") else { return map };
        for entry in procs.flatten() {
            let Ok(pid) = entry.file_name().to_string_lossy().parse::<u32>() else { continue };
            let fd_dir = entry.path().join("fd");
            let Ok(fds) = fs::read_dir(&fd_dir) else { continue };
            for fd in fds.flatten() {
                if let Ok(link) = fs::read_link(fd.path()) {
                    if let Some(inode) = parse_socket_inode(&link.to_string_lossy()) {
                        map.insert(inode, pid);
                    }
                }
            }
        }
        map
    }

    fn parse_socket_inode(link: &str) -> Option<u64> {
        link.strip_prefix("socket:[").and_then(|s| s.strip_suffix(']')).and_then(|s| s.parse().ok())
    }

    fn parse_line(line: &str, proto: &str, inode_to_pid: &HashMap<u64, u32>) -> Option<NetworkConnectionInfo> {
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() < 10 {
            return None;
        }
        let local_addr = decode_addr(fields[1]);
        let remote_addr = decode_addr(fields[2]);
        let inode: u64 = fields[9].parse().ok()?;
        let pid = inode_to_pid.get(&inode).copied();
        Some(NetworkConnectionInfo { local_addr, remote_addr, protocol: proto.to_string(), pid })
    }

    fn decode_addr(field: &str) -> Option<String> {
        let (ip_hex, port_hex) = field.split_once(':')?;
        let port = u16::from_str_radix(port_hex, 16).ok()?;
        if ip_hex.len() == 8 {
            let raw = u32::from_str_radix(ip_hex, 16).ok()?;
            let octets = raw.to_le_bytes();
            Some(format!("{}.{}.{}.{}:{}", octets[0], octets[1], octets[2], octets[3], port))
        } else {
            // IPv6: little-endian 32-bit words, rarely needed for evidence
            // purposes so keep it as a hex blob rather than fully decoding.
            Some(format!("{ip_hex}:{port}"))
        }
    }
}
