use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use compat_proc_core::{EnumeratorConfig, Pid, ProcessRecord, ProcessScan, UNKNOWN_PID, tokenize};
use std::io;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::fs;
use tokio::process::Command;
use tokio_stream::wrappers::ReadDirStream;
use tokio_stream::{Stream, StreamExt};
use tracing::{debug, warn};

/// Columns every row of the listing command must provide
const LISTING_COLUMNS: usize = 9;

/// Reads the process table through `ps`/`id` output and `/proc/<pid>/stat`
#[derive(Debug, Clone, Default)]
pub struct ProcessEnumerator {
    config: EnumeratorConfig,
}

impl ProcessEnumerator {
    pub fn new(config: EnumeratorConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &EnumeratorConfig {
        &self.config
    }

    /// Processes owned by the caller's user, excluding the caller itself.
    ///
    /// Any failure yields an empty list.
    pub async fn list_owned_processes(&self) -> Vec<ProcessRecord> {
        let user = match self.owning_user().await {
            Ok(Some(user)) => user,
            Ok(None) => {
                warn!(
                    "Could not find a user name in the output of `{}`",
                    self.config.identity_command
                );
                return Vec::new();
            }
            Err(e) => {
                warn!("Failed to retrieve user id in order to list processes: {e:#}");
                return Vec::new();
            }
        };
        debug!("Listing processes owned by {user}");

        match run_command(&self.config.listing_command).await {
            Ok(listing) => parse_process_listing(&listing, &user, own_pid()),
            Err(e) => {
                warn!("Failed to list processes: {e:#}");
                Vec::new()
            }
        }
    }

    /// Pids whose `stat` line mentions one of the configured filters, ascending.
    pub async fn list_compat_layer_pids(&self) -> Vec<Pid> {
        match scan_compat_layer(&self.config.proc_root, &self.config.compat_filters).await {
            Ok(pids) => pids,
            Err(e) => {
                warn!("Failed to scan for compatibility-layer processes: {e:#}");
                Vec::new()
            }
        }
    }

    async fn owning_user(&self) -> Result<Option<String>> {
        let output = run_command(&self.config.identity_command).await?;
        Ok(output.lines().next().and_then(parse_identity_user))
    }
}

#[async_trait]
impl ProcessScan for ProcessEnumerator {
    async fn list_owned_processes(&self) -> Vec<ProcessRecord> {
        ProcessEnumerator::list_owned_processes(self).await
    }

    async fn list_compat_layer_pids(&self) -> Vec<Pid> {
        ProcessEnumerator::list_compat_layer_pids(self).await
    }
}

/// Extract `name` from identity output such as `uid=10290(u0_a290) gid=...`
pub fn parse_identity_user(line: &str) -> Option<String> {
    let start = line.find('(')? + 1;
    let end = start + line[start..].find(')')?;
    let user = &line[start..end];
    (!user.is_empty()).then(|| user.to_string())
}

/// Parse `USER PID PPID VSZ RSS WCHAN ADDR S NAME` output.
///
/// The header line is skipped. Rows with fewer than nine fields, another
/// owner, the caller's own pid, or a non-numeric pid/ppid are dropped.
pub fn parse_process_listing(listing: &str, user: &str, self_pid: Pid) -> Vec<ProcessRecord> {
    listing
        .lines()
        .skip(1)
        .filter_map(|line| {
            let fields: Vec<&str> = line.split_whitespace().collect();
            if fields.len() < LISTING_COLUMNS || fields[0] != user {
                return None;
            }

            let (Ok(pid), Ok(ppid)) = (fields[1].parse::<Pid>(), fields[2].parse::<Pid>()) else {
                debug!("Skipping unparsable process row: {line}");
                return None;
            };

            (pid != self_pid).then(|| ProcessRecord {
                pid,
                ppid,
                name: fields[8].to_string(),
            })
        })
        .collect()
}

async fn scan_compat_layer(proc_root: &Path, filters: &[String]) -> Result<Vec<Pid>> {
    let entries = fs::read_dir(proc_root)
        .await
        .with_context(|| format!("Failed to read {}", proc_root.display()))?;

    let paths = ReadDirStream::new(entries).map(|entry| entry.map(|entry| entry.path()));
    Ok(collect_compat_pids(paths, filters).await)
}

/// Match `<pid>/stat` of every numeric directory in `paths` against `filters`.
///
/// A failing directory read ends the scan but keeps what was found so far.
async fn collect_compat_pids<S>(mut paths: S, filters: &[String]) -> Vec<Pid>
where
    S: Stream<Item = io::Result<PathBuf>> + Unpin,
{
    let mut pids = Vec::new();
    while let Some(path) = paths.next().await {
        let path = match path {
            Ok(path) => path,
            Err(e) => {
                warn!("Stopped reading process entries early, keeping {} matches: {e}", pids.len());
                break;
            }
        };

        let Some(pid) = path
            .file_name()
            .and_then(|name| name.to_str())
            .and_then(parse_pid_dir)
        else {
            continue;
        };

        let is_dir = fs::metadata(&path)
            .await
            .map(|metadata| metadata.is_dir())
            .unwrap_or(false);
        if !is_dir {
            continue;
        }

        // Processes exit mid-scan; a missing stat file just means "not ours"
        let Some(stat) = read_stat_line(&path.join("stat")).await else {
            continue;
        };

        if filters.iter().any(|filter| stat.contains(filter.as_str())) {
            pids.push(pid);
        }
    }

    pids.sort_unstable();
    pids.dedup();
    pids
}

fn parse_pid_dir(name: &str) -> Option<Pid> {
    if name.is_empty() || !name.bytes().all(|byte| byte.is_ascii_digit()) {
        return None;
    }
    name.parse().ok()
}

async fn read_stat_line(path: &Path) -> Option<String> {
    let contents = fs::read(path).await.ok()?;
    String::from_utf8_lossy(&contents)
        .lines()
        .next()
        .map(str::to_owned)
}

async fn run_command(command_line: &str) -> Result<String> {
    let argv = tokenize(command_line);
    let (program, args) = argv
        .split_first()
        .ok_or_else(|| anyhow!("empty command line"))?;

    let output = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stderr(Stdio::null())
        .output()
        .await
        .with_context(|| format!("Failed to run `{command_line}`"))?;

    if !output.status.success() {
        debug!("`{command_line}` exited with {}", output.status);
    }

    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

fn own_pid() -> Pid {
    Pid::try_from(std::process::id()).unwrap_or(UNKNOWN_PID)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs as std_fs;
    use tempfile::TempDir;

    const LISTING: &str = "\
USER           PID  PPID     VSZ    RSS WCHAN            ADDR S NAME
root             1     0 10932100 4304 do_epoll_wait       0 S init
u0_a290      12001   600 15234104 98000 do_epoll_wait      0 S app.gamenative
u0_a290      12050 12001  2312340 45000 futex_wait_queue   0 S wineserver
u0_a290      12077 12050  4102020 301000 futex_wait_queue  0 S game.exe
u0_a290      12090 12001   12000  3000 0                   0 R ps
u0_a290      oops  12001   12000  3000 0                   0 R broken
u0_a290      12100
u0_a291      13000   600  1000000 2000 do_epoll_wait       0 S other.app
";

    #[test]
    fn test_parse_identity_user() {
        assert_eq!(
            parse_identity_user("uid=10290(u0_a290) gid=10290(u0_a290) groups=3003(inet)"),
            Some("u0_a290".to_string())
        );
        assert_eq!(parse_identity_user("uid=0(root)").as_deref(), Some("root"));
        assert_eq!(parse_identity_user("uid=1000"), None);
        assert_eq!(parse_identity_user("uid=1000()"), None);
        assert_eq!(parse_identity_user(") uid=5(x"), None);
    }

    #[test]
    fn test_parse_listing_filters_owner_and_self() {
        let records = parse_process_listing(LISTING, "u0_a290", 12001);
        let pids: Vec<Pid> = records.iter().map(|r| r.pid).collect();
        assert_eq!(pids, vec![12050, 12077, 12090]);

        let game = &records[1];
        assert_eq!(game.ppid, 12050);
        assert_eq!(game.name, "game.exe");

        assert!(records.iter().all(|r| r.pid != 12001));
        assert!(records.iter().all(|r| r.pid != 13000));
    }

    #[test]
    fn test_parse_listing_skips_header_only() {
        assert!(parse_process_listing("USER PID PPID VSZ RSS WCHAN ADDR S NAME", "USER", 1).is_empty());
        assert!(parse_process_listing("", "root", 1).is_empty());
    }

    fn fake_proc() -> TempDir {
        let root = TempDir::new().unwrap();
        let entries = [
            ("100", Some("100 (wine64-preload) S 1 100 100 0 -1")),
            ("200", Some("200 (wineserver) S 1 200 200 0 -1")),
            ("300", Some("300 (bash) S 1 300 300 0 -1")),
            ("400", None),
            ("450", Some("450 (explorer.exe) S 200 450 450 0 -1")),
            ("self", Some("999 (wine) S 1 999 999 0 -1")),
        ];
        for (name, stat) in entries {
            let dir = root.path().join(name);
            std_fs::create_dir(&dir).unwrap();
            if let Some(stat) = stat {
                std_fs::write(dir.join("stat"), format!("{stat}\nsecond line wine\n")).unwrap();
            }
        }
        std_fs::write(root.path().join("500"), "500 (wine) S").unwrap();
        std_fs::create_dir(root.path().join("600")).unwrap();
        std_fs::write(root.path().join("600").join("stat"), "600 (winecfg.exe) S 1").unwrap();
        root
    }

    #[tokio::test]
    async fn test_compat_scan_over_fake_proc() {
        let root = fake_proc();
        let enumerator = ProcessEnumerator::new(EnumeratorConfig {
            proc_root: root.path().to_path_buf(),
            ..Default::default()
        });

        // 600 matches both filters but is reported once
        assert_eq!(enumerator.list_compat_layer_pids().await, vec![100, 200, 450, 600]);
    }

    #[tokio::test]
    async fn test_compat_scan_uses_configured_filters() {
        let root = fake_proc();
        let enumerator = ProcessEnumerator::new(EnumeratorConfig {
            proc_root: root.path().to_path_buf(),
            compat_filters: vec!["bash".to_string()],
            ..Default::default()
        });
        assert_eq!(enumerator.list_compat_layer_pids().await, vec![300]);
    }

    #[tokio::test]
    async fn test_compat_scan_keeps_matches_before_read_error() {
        let root = fake_proc();
        let entries = vec![
            Ok(root.path().join("200")),
            Ok(root.path().join("100")),
            Err(io::Error::other("readdir interrupted")),
            Ok(root.path().join("450")),
        ];

        let pids = collect_compat_pids(tokio_stream::iter(entries), &["wine".to_string()]).await;
        assert_eq!(pids, vec![100, 200]);
    }

    #[tokio::test]
    async fn test_compat_scan_missing_root_is_empty() {
        let enumerator = ProcessEnumerator::new(EnumeratorConfig {
            proc_root: "/definitely/not/a/proc/dir".into(),
            ..Default::default()
        });
        assert!(enumerator.list_compat_layer_pids().await.is_empty());
    }

    #[tokio::test]
    async fn test_owned_processes_from_commands() {
        let dir = TempDir::new().unwrap();
        let id_file = dir.path().join("id.txt");
        let ps_file = dir.path().join("ps.txt");
        std_fs::write(&id_file, "uid=10290(u0_a290) gid=10290(u0_a290)\n").unwrap();
        std_fs::write(&ps_file, LISTING).unwrap();

        let enumerator = ProcessEnumerator::new(EnumeratorConfig {
            identity_command: format!("cat {}", id_file.display()),
            listing_command: format!("cat {}", ps_file.display()),
            ..Default::default()
        });

        let records = enumerator.list_owned_processes().await;
        assert_eq!(records.len(), 4);
        assert!(records.iter().all(|r| r.pid != own_pid()));
        assert!(records.iter().any(|r| r.name == "wineserver"));
    }

    #[tokio::test]
    async fn test_owned_processes_failing_identity_is_empty() {
        let enumerator = ProcessEnumerator::new(EnumeratorConfig {
            identity_command: "/nonexistent/identity-query".to_string(),
            ..Default::default()
        });
        assert!(enumerator.list_owned_processes().await.is_empty());

        let enumerator = ProcessEnumerator::new(EnumeratorConfig {
            identity_command: "echo no-user-here".to_string(),
            ..Default::default()
        });
        assert!(enumerator.list_owned_processes().await.is_empty());
    }
}
