//! Linux process-table collector (spec §1 "platform-specific resource
//! collectors": `sample() -> snapshot`). The one concrete platform
//! implementation, reading directly from `/proc` the way `sysdep_LINUX.c`
//! does in the original.

use std::fs;
use std::path::Path;

use crate::error::ProbeError;

/// One cycle's sample of a process's resource usage. CPU usage is not a
/// single-sample quantity — [`cpu_percent_between`] derives it from two
/// snapshots taken one cycle apart, matching how the Action Engine and
/// State Machine only ever see per-cycle deltas (spec §4.5, §4.7).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProcessSnapshot {
    pub pid: i32,
    pub ppid: i32,
    pub uid: u32,
    pub gid: u32,
    pub rss_bytes: u64,
    pub utime_ticks: u64,
    pub stime_ticks: u64,
    pub start_time_ticks: u64,
    pub child_count: u32,
}

/// Collaborator the Action Engine polls during Start/Stop (spec §4.7) and
/// the State Machine samples every cycle for `pid`/`ppid`/`resource` rules.
pub trait ProcessCollector: Send + Sync {
    fn sample(&self, pid: i32) -> Result<ProcessSnapshot, ProbeError>;
    fn pid_exists(&self, pid: i32) -> bool;
    /// `procmatch <pattern>` (spec §6, §3 supplemented features): a literal
    /// pass-through grep-by-argv over every running process's cmdline.
    fn find_by_pattern(&self, pattern: &str) -> Result<Vec<i32>, ProbeError>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct LinuxProcessCollector;

impl ProcessCollector for LinuxProcessCollector {
    fn sample(&self, pid: i32) -> Result<ProcessSnapshot, ProbeError> {
        let stat_path = format!("/proc/{pid}/stat");
        let stat = fs::read_to_string(&stat_path).map_err(|_| ProbeError::NoSuchProcess(pid))?;
        let (ppid, utime_ticks, stime_ticks, start_time_ticks) = parse_stat(&stat_path, &stat)?;

        let status_path = format!("/proc/{pid}/status");
        let status = fs::read_to_string(&status_path).map_err(|e| ProbeError::Io { path: status_path.clone(), source: e })?;
        let (uid, gid, rss_bytes) = parse_status(&status_path, &status)?;

        let child_count = count_children(pid);

        Ok(ProcessSnapshot { pid, ppid, uid, gid, rss_bytes, utime_ticks, stime_ticks, start_time_ticks, child_count })
    }

    fn pid_exists(&self, pid: i32) -> bool {
        Path::new(&format!("/proc/{pid}")).exists()
    }

    fn find_by_pattern(&self, pattern: &str) -> Result<Vec<i32>, ProbeError> {
        let mut matches = Vec::new();
        let entries = fs::read_dir("/proc").map_err(|e| ProbeError::Io { path: "/proc".into(), source: e })?;
        for entry in entries.flatten() {
            let Ok(pid) = entry.file_name().to_string_lossy().parse::<i32>() else { continue };
            let cmdline_path = entry.path().join("cmdline");
            let Ok(raw) = fs::read(&cmdline_path) else { continue };
            let cmdline = raw.split(|b| *b == 0).map(|s| String::from_utf8_lossy(s).into_owned()).collect::<Vec<_>>().join(" ");
            if cmdline.contains(pattern) {
                matches.push(pid);
            }
        }
        matches.sort_unstable();
        Ok(matches)
    }
}

fn parse_stat(path: &str, stat: &str) -> Result<(i32, u64, u64, u64), ProbeError> {
    // Fields after the `(comm)` parenthesized group are space-separated and
    // fixed-position; the comm itself may contain spaces/parens, so split on
    // the last `)` rather than whitespace from the start.
    let after_comm = stat.rsplit_once(')').map(|(_, rest)| rest).ok_or_else(|| ProbeError::Parse { what: "comm", path: path.to_string() })?;
    let fields: Vec<&str> = after_comm.split_whitespace().collect();
    // fields[0] = state, [1] = ppid, ..., [11] = utime, [12] = stime, [19] = starttime
    let get = |idx: usize| fields.get(idx).and_then(|s| s.parse::<u64>().ok()).ok_or_else(|| ProbeError::Parse { what: "stat field", path: path.to_string() });
    let ppid = get(1)? as i32;
    let utime_ticks = get(11)?;
    let stime_ticks = get(12)?;
    let start_time_ticks = get(19)?;
    Ok((ppid, utime_ticks, stime_ticks, start_time_ticks))
}

fn parse_status(path: &str, status: &str) -> Result<(u32, u32, u64), ProbeError> {
    let mut uid = None;
    let mut gid = None;
    let mut rss_kb = None;
    for line in status.lines() {
        if let Some(rest) = line.strip_prefix("Uid:") {
            uid = rest.split_whitespace().next().and_then(|s| s.parse().ok());
        } else if let Some(rest) = line.strip_prefix("Gid:") {
            gid = rest.split_whitespace().next().and_then(|s| s.parse().ok());
        } else if let Some(rest) = line.strip_prefix("VmRSS:") {
            rss_kb = rest.split_whitespace().next().and_then(|s| s.parse::<u64>().ok());
        }
    }
    let uid = uid.ok_or_else(|| ProbeError::Parse { what: "Uid", path: path.to_string() })?;
    let gid = gid.ok_or_else(|| ProbeError::Parse { what: "Gid", path: path.to_string() })?;
    Ok((uid, gid, rss_kb.unwrap_or(0) * 1024))
}

fn count_children(pid: i32) -> u32 {
    let Ok(entries) = fs::read_dir("/proc") else { return 0 };
    let mut count = 0;
    for entry in entries.flatten() {
        let Ok(candidate) = entry.file_name().to_string_lossy().parse::<i32>() else { continue };
        let Ok(stat) = fs::read_to_string(format!("/proc/{candidate}/stat")) else { continue };
        if let Ok((ppid, ..)) = parse_stat("", &stat) {
            if ppid == pid {
                count += 1;
            }
        }
    }
    count
}

/// CPU usage between two cycles, as a percentage of one core. `clock_ticks`
/// is `sysconf(_SC_CLK_TCK)` (normally 100 on Linux).
pub fn cpu_percent_between(prev: &ProcessSnapshot, curr: &ProcessSnapshot, elapsed: std::time::Duration, clock_ticks: u64) -> f64 {
    if elapsed.as_secs_f64() <= 0.0 || clock_ticks == 0 {
        return 0.0;
    }
    let prev_total = prev.utime_ticks + prev.stime_ticks;
    let curr_total = curr.utime_ticks + curr.stime_ticks;
    let delta_ticks = curr_total.saturating_sub(prev_total) as f64;
    let delta_secs = delta_ticks / clock_ticks as f64;
    (delta_secs / elapsed.as_secs_f64()) * 100.0
}

/// `sysconf(_SC_CLK_TCK)`, the unit `utime`/`stime` are reported in.
pub fn clock_ticks_per_sec() -> u64 {
    let ticks = unsafe { libc::sysconf(libc::_SC_CLK_TCK) };
    if ticks > 0 { ticks as u64 } else { 100 }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sample_self_returns_a_plausible_snapshot() {
        let collector = LinuxProcessCollector;
        let snapshot = collector.sample(std::process::id() as i32).unwrap();
        assert_eq!(snapshot.pid, std::process::id() as i32);
        assert!(snapshot.rss_bytes > 0);
    }

    #[test]
    fn pid_exists_is_true_for_self_and_false_for_garbage() {
        let collector = LinuxProcessCollector;
        assert!(collector.pid_exists(std::process::id() as i32));
        assert!(!collector.pid_exists(i32::MAX - 1));
    }

    #[test]
    fn sample_missing_pid_reports_no_such_process() {
        let collector = LinuxProcessCollector;
        let err = collector.sample(i32::MAX - 1).unwrap_err();
        assert!(matches!(err, ProbeError::NoSuchProcess(_)));
    }

    #[test]
    fn parse_stat_handles_parens_in_comm() {
        let stat = "123 (my (weird) proc) S 1 123 123 0 -1 4194560 100 0 0 0 10 20 0 0 20 0 1 0 5000 0 0 18446744073709551615 0 0 0 0 0 0 0 0 0 0 0 0 17 2 0 0 0 0 0";
        let (ppid, utime, stime, start) = parse_stat("x", stat).unwrap();
        assert_eq!(ppid, 1);
        assert_eq!(utime, 10);
        assert_eq!(stime, 20);
        assert_eq!(start, 5000);
    }

    #[test]
    fn cpu_percent_between_is_zero_for_an_idle_process() {
        let a = ProcessSnapshot { pid: 1, ppid: 0, uid: 0, gid: 0, rss_bytes: 0, utime_ticks: 100, stime_ticks: 50, start_time_ticks: 0, child_count: 0 };
        let b = a;
        assert_eq!(cpu_percent_between(&a, &b, std::time::Duration::from_secs(1), 100), 0.0);
    }

    #[test]
    fn find_by_pattern_locates_this_test_process() {
        let collector = LinuxProcessCollector;
        let pids = collector.find_by_pattern("").unwrap();
        assert!(pids.contains(&(std::process::id() as i32)));
    }
}
