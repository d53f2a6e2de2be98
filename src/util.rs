use anyhow::{Context, Result};
use std::fs::{self, File};
use std::io;
use std::path::Path;
use std::thread::sleep;
use std::time::Duration;

static INIT_ONCE: std::sync::Once = std::sync::Once::new();
pub fn init_tracing_once() {
    INIT_ONCE.call_once(|| {
        let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());
        let _ = tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_writer(std::io::stderr)
            .try_init();
    });
}

// -------- robust create/rename with backoff --------

/// Transient errors worth another attempt: sharing/lock violations and
/// interrupted or busy resources on network filesystems.
fn is_retriable_io_error(e: &io::Error) -> bool {
    if matches!(e.kind(), io::ErrorKind::Interrupted | io::ErrorKind::WouldBlock) {
        return true;
    }
    e.raw_os_error().is_some_and(is_transient_os_code)
}

// ERROR_ACCESS_DENIED, ERROR_SHARING_VIOLATION, ERROR_LOCK_VIOLATION
#[cfg(windows)]
fn is_transient_os_code(code: i32) -> bool {
    matches!(code, 5 | 32 | 33)
}

// EBUSY
#[cfg(not(windows))]
fn is_transient_os_code(code: i32) -> bool {
    code == 16
}

fn with_backoff<T>(tries: usize, delay_ms: u64, mut op: impl FnMut() -> io::Result<T>) -> io::Result<T> {
    let mut last_err: Option<io::Error> = None;
    for i in 0..tries.max(1) {
        match op() {
            Ok(v) => return Ok(v),
            Err(e) if is_retriable_io_error(&e) => {
                last_err = Some(e);
                sleep(Duration::from_millis(delay_ms.saturating_mul((i + 1) as u64)));
            }
            Err(e) => return Err(e),
        }
    }
    Err(last_err.unwrap_or_else(|| io::Error::new(io::ErrorKind::Other, "retries exhausted")))
}

/// Create (truncate) a file with retries for transient errors.
pub fn create_with_backoff(path: &Path, tries: usize, delay_ms: u64) -> io::Result<File> {
    with_backoff(tries, delay_ms, || File::create(path))
}

/// Promote a finished `tmp` file to `dest`, replacing any existing file.
/// Falls back to copy+remove when rename is refused (e.g. across devices).
pub fn promote_file(tmp: &Path, dest: &Path) -> Result<()> {
    let tries = 20usize;
    let delay_ms = 50u64;
    match with_backoff(tries, delay_ms, || fs::rename(tmp, dest)) {
        Ok(()) => Ok(()),
        Err(_) => {
            with_backoff(tries, delay_ms, || fs::copy(tmp, dest))
                .with_context(|| format!("copy {} -> {}", tmp.display(), dest.display()))?;
            with_backoff(tries, delay_ms, || fs::remove_file(tmp))
                .with_context(|| format!("remove {}", tmp.display()))?;
            Ok(())
        }
    }
}
