//! Shared ledger storage (`hnp_global.json`).
//!
//! Both players read and rewrite the same document. Every read-modify-write
//! runs under an exclusive lock file next to the ledger so two invocations
//! cannot lose each other's update.

use std::fmt;
use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use tracing::{debug, instrument, warn};

use crate::model::Ledger;

const LOCK_ATTEMPTS: u32 = 50;
const LOCK_RETRY_DELAY: Duration = Duration::from_millis(100);

/// Load the ledger. A missing file is an empty ledger.
pub fn load_ledger(path: &Path) -> Result<Ledger> {
    if !path.exists() {
        debug!(path = %path.display(), "no ledger yet, starting empty");
        return Ok(Ledger::default());
    }
    let contents =
        fs::read_to_string(path).with_context(|| format!("read ledger {}", path.display()))?;
    let ledger: Ledger = serde_json::from_str(&contents)
        .with_context(|| format!("parse ledger {}", path.display()))?;
    debug!(players = ledger.players.len(), "ledger loaded");
    Ok(ledger)
}

/// Atomically write the ledger (temp file + rename).
pub fn write_ledger(path: &Path, ledger: &Ledger) -> Result<()> {
    debug!(path = %path.display(), players = ledger.players.len(), "writing ledger");
    let mut buf = serde_json::to_string_pretty(ledger).context("serialize ledger")?;
    buf.push('\n');
    write_atomic(path, &buf)
}

/// Exclusive hold on the ledger, released on drop.
#[derive(Debug)]
pub struct LedgerLock {
    path: PathBuf,
}

impl LedgerLock {
    /// Take the lock for `ledger_path`, retrying briefly while another
    /// invocation holds it.
    pub fn acquire(ledger_path: &Path) -> Result<Self> {
        Self::acquire_with(ledger_path, LOCK_ATTEMPTS, LOCK_RETRY_DELAY)
    }

    #[instrument(skip_all, fields(ledger = %ledger_path.display(), attempts = attempts))]
    fn acquire_with(ledger_path: &Path, attempts: u32, retry_delay: Duration) -> Result<Self> {
        let path = lock_path(ledger_path);
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .with_context(|| format!("create directory {}", parent.display()))?;
        }
        for attempt in 1..=attempts {
            match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(mut file) => {
                    let lock = Self { path };
                    writeln!(file, "{}", LockOwner::current())
                        .with_context(|| format!("write lock owner {}", lock.path.display()))?;
                    debug!(attempt, "ledger lock acquired");
                    return Ok(lock);
                }
                Err(err) if err.kind() == ErrorKind::AlreadyExists => {
                    if holder_is_gone(&path) {
                        clear_stale_lock(&path)?;
                        continue;
                    }
                    debug!(attempt, "ledger lock busy");
                    thread::sleep(retry_delay);
                }
                Err(err) => {
                    return Err(err).with_context(|| format!("create lock {}", path.display()));
                }
            }
        }
        warn!(lock = %path.display(), "gave up waiting for ledger lock");
        Err(anyhow!(
            "ledger is locked by another invocation ({}); remove it if no other hnp command is running",
            path.display()
        ))
    }
}

fn clear_stale_lock(path: &Path) -> Result<()> {
    warn!(lock = %path.display(), "clearing lock left by a dead process");
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
        Err(err) => Err(err).with_context(|| format!("remove stale lock {}", path.display())),
    }
}

/// Who holds a lock: `<pid>@<host>`.
#[derive(Debug, Clone, PartialEq, Eq)]
struct LockOwner {
    pid: u32,
    host: String,
}

impl LockOwner {
    fn current() -> Self {
        Self {
            pid: std::process::id(),
            host: local_host(),
        }
    }

    fn parse(raw: &str) -> Option<Self> {
        let (pid, host) = raw.trim().split_once('@')?;
        Some(Self {
            pid: pid.parse().ok()?,
            host: host.to_string(),
        })
    }
}

impl fmt::Display for LockOwner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.pid, self.host)
    }
}

/// True only when the lock names a process on this host that no longer runs.
///
/// Unreadable owners and owners on other hosts (a ledger on a shared mount)
/// are treated as alive.
fn holder_is_gone(lock: &Path) -> bool {
    let Some(owner) = fs::read_to_string(lock)
        .ok()
        .and_then(|raw| LockOwner::parse(&raw))
    else {
        return false;
    };
    owner.host == local_host() && !process_alive(owner.pid)
}

#[cfg(target_os = "linux")]
fn local_host() -> String {
    fs::read_to_string("/proc/sys/kernel/hostname")
        .map(|name| name.trim().to_string())
        .unwrap_or_default()
}

#[cfg(not(target_os = "linux"))]
fn local_host() -> String {
    String::new()
}

#[cfg(target_os = "linux")]
fn process_alive(pid: u32) -> bool {
    Path::new("/proc").join(pid.to_string()).exists()
}

#[cfg(not(target_os = "linux"))]
fn process_alive(_pid: u32) -> bool {
    true
}

impl Drop for LedgerLock {
    fn drop(&mut self) {
        if let Err(err) = fs::remove_file(&self.path) {
            warn!(lock = %self.path.display(), err = %err, "failed to release ledger lock");
        }
    }
}

/// Read, change, and write the ledger under [`LedgerLock`].
///
/// `apply` sees the freshest ledger. The document is written only when `apply`
/// succeeds and actually changed something.
pub fn update_ledger<T, F>(path: &Path, apply: F) -> Result<T>
where
    F: FnOnce(&mut Ledger) -> Result<T>,
{
    let _lock = LedgerLock::acquire(path)?;
    let before = load_ledger(path)?;
    let mut ledger = before.clone();
    let out = apply(&mut ledger)?;
    if ledger != before {
        write_ledger(path, &ledger)?;
    } else {
        debug!("ledger unchanged, skipping write");
    }
    Ok(out)
}

fn lock_path(ledger_path: &Path) -> PathBuf {
    let mut name = ledger_path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".lock");
    ledger_path.with_file_name(name)
}

fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("create directory {}", parent.display()))?;
    }
    let tmp_path = path.with_extension("json.tmp");
    fs::write(&tmp_path, contents)
        .with_context(|| format!("write temp ledger {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace ledger {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::timing::{credit, join};
    use chrono::{TimeZone, Utc};

    #[test]
    fn missing_ledger_is_empty() {
        let temp = tempfile::tempdir().expect("tempdir");
        let ledger = load_ledger(&temp.path().join("hnp_global.json")).expect("load");
        assert!(ledger.players.is_empty());
    }

    #[test]
    fn ledger_document_is_stable() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("hnp_global.json");
        let mut ledger = Ledger::default();
        join(
            &mut ledger,
            "alice",
            Utc.with_ymd_and_hms(2025, 3, 1, 10, 0, 0).unwrap(),
        );
        write_ledger(&path, &ledger).expect("write");
        let contents = fs::read_to_string(&path).expect("read");
        let expected = "{\n  \"players\": {\n    \"alice\": {\n      \"dev_time\": 0,\n      \"last_flag\": \"\",\n      \"last_round\": \"2025-03-01T10:00:00.000000Z\"\n    }\n  }\n}\n";
        assert_eq!(contents, expected);
    }

    #[test]
    fn update_applies_and_releases_lock() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("hnp_global.json");
        let now = Utc.with_ymd_and_hms(2025, 3, 1, 10, 0, 0).unwrap();
        update_ledger(&path, |ledger| {
            join(ledger, "alice", now);
            join(ledger, "bob", now);
            Ok(())
        })
        .expect("update");
        update_ledger(&path, |ledger| {
            credit(ledger, "bob", 12);
            Ok(())
        })
        .expect("update");

        let ledger = load_ledger(&path).expect("load");
        assert_eq!(ledger.players["bob"].dev_time, Some(12));
        assert!(!lock_path(&path).exists());
    }

    #[test]
    fn failed_update_leaves_document_untouched() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("hnp_global.json");
        write_ledger(&path, &Ledger::default()).expect("write");
        let before = fs::read_to_string(&path).expect("read");

        let result: Result<()> = update_ledger(&path, |ledger| {
            credit(ledger, "bob", 99);
            Err(anyhow!("rejected"))
        });
        assert!(result.is_err());
        assert_eq!(fs::read_to_string(&path).expect("read"), before);
        assert!(!lock_path(&path).exists());
    }

    #[test]
    fn lock_is_exclusive() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("hnp_global.json");
        let held = LedgerLock::acquire(&path).expect("first lock");
        assert!(lock_path(&path).exists());

        let second = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(lock_path(&path));
        assert!(second.is_err());

        drop(held);
        assert!(!lock_path(&path).exists());
        LedgerLock::acquire(&path).expect("lock after release");
    }

    #[test]
    fn lock_file_sits_next_to_ledger() {
        assert_eq!(
            lock_path(Path::new("/srv/shared/hnp_global.json")),
            PathBuf::from("/srv/shared/hnp_global.json.lock")
        );
    }

    #[test]
    fn lock_records_its_owner() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("hnp_global.json");
        let _held = LedgerLock::acquire(&path).expect("lock");
        let raw = fs::read_to_string(lock_path(&path)).expect("read lock");
        assert_eq!(LockOwner::parse(&raw), Some(LockOwner::current()));
    }

    #[test]
    fn live_holder_times_out_with_removal_hint() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("hnp_global.json");
        fs::write(lock_path(&path), format!("{}\n", LockOwner::current())).expect("write lock");

        let err = LedgerLock::acquire_with(&path, 2, Duration::from_millis(1)).unwrap_err();
        let message = err.to_string();
        assert!(message.contains("hnp_global.json.lock"));
        assert!(message.contains("remove it if no other hnp command is running"));
        assert!(lock_path(&path).exists());
    }

    #[test]
    fn lock_from_another_host_is_left_alone() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("hnp_global.json");
        fs::write(lock_path(&path), "999999999@some-other-host\n").expect("write lock");

        assert!(LedgerLock::acquire_with(&path, 2, Duration::from_millis(1)).is_err());
        assert_eq!(
            fs::read_to_string(lock_path(&path)).expect("read lock"),
            "999999999@some-other-host\n"
        );
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn lock_from_dead_process_is_cleared() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("hnp_global.json");
        let stale = LockOwner {
            pid: 999_999_999,
            host: local_host(),
        };
        fs::write(lock_path(&path), format!("{stale}\n")).expect("write lock");

        update_ledger(&path, |ledger| {
            join(ledger, "alice", Utc.with_ymd_and_hms(2025, 3, 1, 10, 0, 0).unwrap());
            Ok(())
        })
        .expect("update after stale lock");
        assert!(load_ledger(&path).expect("load").players.contains_key("alice"));
        assert!(!lock_path(&path).exists());
    }
}
