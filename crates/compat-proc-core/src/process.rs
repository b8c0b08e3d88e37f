use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// Native OS process identifier
pub type Pid = i32;

/// Returned in place of a pid when the platform could not report one
pub const UNKNOWN_PID: Pid = -1;

/// Exit status handed to termination callbacks when the process never started
pub const FAILED_EXIT_STATUS: i32 = -1;

/// Called once with the exit status of a launched process
pub type TerminationCallback = Box<dyn FnOnce(i32) + Send + 'static>;

/// One row of the process table, as seen at enumeration time
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProcessRecord {
    pub pid: Pid,
    pub ppid: Pid,
    pub name: String,
}

/// Control signals understood by the compatibility layer's processes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProcessSignal {
    /// SIGSTOP
    Suspend,
    /// SIGCONT
    Resume,
    /// SIGTERM
    Terminate,
    /// SIGKILL, reserved for forceful cleanup
    Kill,
}

impl ProcessSignal {
    /// Linux signal number
    pub const fn raw(self) -> i32 {
        match self {
            ProcessSignal::Suspend => 19,
            ProcessSignal::Resume => 18,
            ProcessSignal::Terminate => 15,
            ProcessSignal::Kill => 9,
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            ProcessSignal::Suspend => "SIGSTOP",
            ProcessSignal::Resume => "SIGCONT",
            ProcessSignal::Terminate => "SIGTERM",
            ProcessSignal::Kill => "SIGKILL",
        }
    }
}

/// What the kernel reported when a signal was sent.
///
/// `Delivered` only means the signal was queued; the target may ignore it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignalOutcome {
    Delivered,
    /// Process was not found (already exited)
    ProcessNotFound,
    PermissionDenied,
    Failed(String),
}

impl SignalOutcome {
    pub fn is_delivered(&self) -> bool {
        matches!(self, SignalOutcome::Delivered)
    }
}

/// Sends a single signal to a single pid without waiting for any effect
pub trait SignalDispatch: Send + Sync {
    fn dispatch(&self, pid: Pid, signal: ProcessSignal) -> SignalOutcome;
}

/// Best-effort views of the process table.
///
/// Both operations return empty collections instead of errors; the results
/// carry no liveness guarantee beyond the instant of the scan.
#[async_trait]
pub trait ProcessScan: Send + Sync {
    /// Processes owned by the same user as the caller, excluding the caller
    async fn list_owned_processes(&self) -> Vec<ProcessRecord>;

    /// Pids whose `stat` line identifies them as compatibility-layer processes
    async fn list_compat_layer_pids(&self) -> Vec<Pid>;
}

/// Every transitive child of `root`, deepest descendants first.
///
/// `root` itself is not included. Cycles caused by pid reuse between rows of
/// a racy snapshot are ignored.
pub fn descendants_of(records: &[ProcessRecord], root: Pid) -> Vec<Pid> {
    let mut children: HashMap<Pid, Vec<Pid>> = HashMap::new();
    for record in records {
        if record.pid != record.ppid {
            children.entry(record.ppid).or_default().push(record.pid);
        }
    }

    let mut visited = HashSet::from([root]);
    let mut result = Vec::new();
    collect_descendants(&children, root, &mut visited, &mut result);
    result
}

fn collect_descendants(
    children: &HashMap<Pid, Vec<Pid>>,
    parent: Pid,
    visited: &mut HashSet<Pid>,
    result: &mut Vec<Pid>,
) {
    let Some(direct) = children.get(&parent) else {
        return;
    };
    for &child in direct {
        if visited.insert(child) {
            // Grandchildren first so callers can tear the tree down bottom-up
            collect_descendants(children, child, visited, result);
            result.push(child);
        }
    }
}
