// src/exec/terminate.rs

//! Process-tree termination.
//!
//! The batch runner forks its own workers, so signalling only the direct
//! child would leave them orphaned. The runner is spawned as the leader of
//! its own process group; on cancellation we
//!
//! 1. snapshot every descendant of the root (before anything dies and gets
//!    reparented to init),
//! 2. signal the whole process group,
//! 3. signal each snapshotted descendant individually, which catches
//!    workers that moved to a new session or group.

use std::collections::HashMap;

/// Extract the parent pid from the contents of `/proc/<pid>/stat`.
///
/// The command name is wrapped in parentheses and may itself contain spaces
/// or parentheses, so fields are counted from the last `)`.
pub fn parse_ppid(stat: &str) -> Option<u32> {
    let rest = &stat[stat.rfind(')')? + 1..];
    let mut fields = rest.split_whitespace();
    let _state = fields.next()?;
    fields.next()?.parse().ok()
}

/// All transitive children of `root` given a `pid -> ppid` table.
///
/// Returned breadth-first: parents before their children.
pub fn collect_descendants(root: u32, parents: &HashMap<u32, u32>) -> Vec<u32> {
    let mut children: HashMap<u32, Vec<u32>> = HashMap::new();
    for (&pid, &ppid) in parents {
        children.entry(ppid).or_default().push(pid);
    }
    for list in children.values_mut() {
        list.sort_unstable();
    }

    let mut out = Vec::new();
    let mut frontier = vec![root];
    while let Some(pid) = frontier.pop() {
        if let Some(kids) = children.get(&pid) {
            for &kid in kids {
                if kid != root && !out.contains(&kid) {
                    out.push(kid);
                    frontier.insert(0, kid);
                }
            }
        }
    }
    out
}

/// Snapshot of `pid -> ppid` for every live process.
#[cfg(target_os = "linux")]
fn process_table() -> HashMap<u32, u32> {
    let mut table = HashMap::new();
    let Ok(entries) = std::fs::read_dir("/proc") else {
        return table;
    };

    for entry in entries.flatten() {
        let Some(pid) = entry.file_name().to_str().and_then(|s| s.parse::<u32>().ok()) else {
            continue;
        };
        // Processes may vanish between listing and reading.
        if let Ok(stat) = std::fs::read_to_string(entry.path().join("stat")) {
            if let Some(ppid) = parse_ppid(&stat) {
                table.insert(pid, ppid);
            }
        }
    }
    table
}

#[cfg(not(target_os = "linux"))]
fn process_table() -> HashMap<u32, u32> {
    HashMap::new()
}

/// Current descendants of `pid`. Empty where the platform offers no
/// process table; the process-group signal still covers those.
pub fn descendants_of(pid: u32) -> Vec<u32> {
    collect_descendants(pid, &process_table())
}

#[cfg(unix)]
mod unix {
    use nix::errno::Errno;
    use nix::sys::signal::{kill, killpg, Signal};
    use nix::unistd::Pid;
    use tracing::{debug, warn};

    use super::descendants_of;

    /// Send `signal` to the process group led by `root` and to every
    /// descendant of `root`. Returns how many processes were signalled.
    pub fn signal_tree(root: u32, signal: Signal) -> usize {
        let descendants = descendants_of(root);
        let mut delivered = 0;

        match killpg(Pid::from_raw(root as i32), signal) {
            Ok(()) => delivered += 1,
            Err(Errno::ESRCH) => debug!(pid = root, "process group already gone"),
            Err(e) => warn!(pid = root, error = %e, ?signal, "failed to signal process group"),
        }

        for pid in &descendants {
            match kill(Pid::from_raw(*pid as i32), signal) {
                Ok(()) => delivered += 1,
                Err(Errno::ESRCH) => {}
                Err(e) => warn!(pid, error = %e, ?signal, "failed to signal descendant"),
            }
        }

        debug!(
            pid = root,
            ?signal,
            descendants = descendants.len(),
            delivered,
            "signalled process tree"
        );
        delivered
    }

    pub fn terminate_tree(root: u32) -> usize {
        signal_tree(root, Signal::SIGTERM)
    }

    pub fn kill_tree(root: u32) -> usize {
        signal_tree(root, Signal::SIGKILL)
    }
}

#[cfg(unix)]
pub use unix::{kill_tree, signal_tree, terminate_tree};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ppid_is_read_after_command_name() {
        let stat = "4242 (make (sub) job) S 17 4242 4242 0 -1 4194560";
        assert_eq!(parse_ppid(stat), Some(17));
        assert_eq!(parse_ppid("garbage"), None);
    }

    #[test]
    fn descendants_are_transitive_and_exclude_strangers() {
        let parents: HashMap<u32, u32> = [
            (10, 1),  // root
            (11, 10), // child
            (12, 11), // grandchild
            (13, 12), // great-grandchild
            (20, 1),  // unrelated
            (21, 20),
        ]
        .into_iter()
        .collect();

        assert_eq!(collect_descendants(10, &parents), vec![11, 12, 13]);
        assert!(collect_descendants(13, &parents).is_empty());
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn own_process_has_no_foreign_descendants() {
        let me = std::process::id();
        assert!(!descendants_of(me).contains(&me));
    }
}
