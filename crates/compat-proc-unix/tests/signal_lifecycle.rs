#![cfg(target_os = "linux")]

use compat_proc_core::{
    DebugStreamBroadcaster, LaunchRequest, Pid, SignalOutcome, TerminationCallback,
};
use compat_proc_unix::{ProcessEnumerator, ProcessLauncher, SignalController};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(false)
        .with_line_number(true)
        .try_init();
}

/// State letter from `/proc/<pid>/stat` (the field after the command name)
fn process_state(pid: Pid) -> Option<char> {
    let stat = std::fs::read_to_string(format!("/proc/{pid}/stat")).ok()?;
    let after_name = stat.rfind(')')? + 1;
    stat[after_name..].trim_start().chars().next()
}

async fn wait_for_state(pid: Pid, wanted: impl Fn(Option<char>) -> bool) -> bool {
    for _ in 0..100 {
        if wanted(process_state(pid)) {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    false
}

#[tokio::test]
async fn test_suspend_resume_terminate_sleep() {
    init_tracing();

    let launcher = ProcessLauncher::new(Arc::new(DebugStreamBroadcaster::new()));
    let signals = SignalController::new(Arc::new(ProcessEnumerator::default()));

    let (tx, rx) = oneshot::channel();
    let callback: TerminationCallback = Box::new(move |status| {
        let _ = tx.send(status);
    });
    let handle = launcher
        .launch(&LaunchRequest::new("sleep 30"), Some(callback))
        .await;
    let pid = handle.pid();
    assert!(pid > 0);

    assert_eq!(signals.suspend(pid), SignalOutcome::Delivered);
    assert!(wait_for_state(pid, |state| state == Some('T')).await);

    assert_eq!(signals.resume(pid), SignalOutcome::Delivered);
    assert!(wait_for_state(pid, |state| state != Some('T')).await);

    assert_eq!(signals.terminate(pid), SignalOutcome::Delivered);
    let status = tokio::time::timeout(Duration::from_secs(10), rx)
        .await
        .expect("termination callback was not invoked")
        .unwrap();
    assert_eq!(status, 143);

    handle.join().await;
    assert_eq!(signals.terminate(pid), SignalOutcome::ProcessNotFound);
}

#[tokio::test]
async fn test_owned_processes_exclude_self() {
    init_tracing();

    // The default listing command needs a `ps` that understands `-o NAME`;
    // whatever it returns must never contain this test process.
    let records = ProcessEnumerator::default().list_owned_processes().await;
    let own = Pid::try_from(std::process::id()).unwrap();
    assert!(records.iter().all(|record| record.pid != own));
}
