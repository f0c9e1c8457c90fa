//! Process-wide solo-run lock: `/tmp/clap.lock` holding the owning PID,
//! preventing two processes from driving the same FPGA concurrently.

use std::fs;
use std::io::{ErrorKind, Read, Write};
use std::os::unix::fs::OpenOptionsExt;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::constants::SOLO_RUN_LOCK_PATH;
use crate::error::{ClapError, Result};

static HANDLER_INSTALLED: AtomicBool = AtomicBool::new(false);

extern "C" fn cleanup_on_signal(sig: libc::c_int) {
    // Best-effort: async-signal-safe enough for a single unlink of a
    // fixed, known path.
    let _ = std::fs::remove_file(SOLO_RUN_LOCK_PATH);
    unsafe {
        libc::signal(sig, libc::SIG_DFL);
        libc::raise(sig);
    }
}

fn install_signal_handlers() {
    if HANDLER_INSTALLED.swap(true, Ordering::SeqCst) {
        return;
    }
    unsafe {
        libc::signal(libc::SIGINT, cleanup_on_signal as libc::sighandler_t);
        libc::signal(libc::SIGTERM, cleanup_on_signal as libc::sighandler_t);
    }
}

/// A held solo-run lock; the backing file is removed on `Drop`.
pub struct SoloRunLock {
    active: bool,
}

impl SoloRunLock {
    /// Acquires the lock, replacing a stale lock (one whose recorded PID
    /// is no longer alive) if found.
    pub fn acquire() -> Result<Self> {
        install_signal_handlers();

        match try_create_exclusive() {
            Ok(()) => Ok(Self { active: true }),
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                if is_stale()? {
                    fs::remove_file(SOLO_RUN_LOCK_PATH)
                        .map_err(|e| ClapError::SoloRun(format!("failed to remove stale lock: {e}")))?;
                    try_create_exclusive().map_err(|e| ClapError::SoloRun(format!("failed to recreate lock: {e}")))?;
                    Ok(Self { active: true })
                } else {
                    Err(ClapError::SoloRun(format!(
                        "{SOLO_RUN_LOCK_PATH} is held by another live process"
                    )))
                }
            }
            Err(e) => Err(ClapError::SoloRun(format!("failed to create {SOLO_RUN_LOCK_PATH}: {e}"))),
        }
    }

    pub fn cleanup(&mut self) {
        if self.active {
            let _ = fs::remove_file(SOLO_RUN_LOCK_PATH);
            self.active = false;
        }
    }
}

impl Drop for SoloRunLock {
    fn drop(&mut self) {
        self.cleanup();
    }
}

fn try_create_exclusive() -> std::io::Result<()> {
    let mut file = fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .mode(0o644)
        .open(SOLO_RUN_LOCK_PATH)?;
    write!(file, "{}", std::process::id())
}

fn is_stale() -> Result<bool> {
    let mut contents = String::new();
    let mut file = match fs::File::open(SOLO_RUN_LOCK_PATH) {
        Ok(f) => f,
        Err(_) => return Ok(true),
    };
    if file.read_to_string(&mut contents).is_err() {
        return Ok(true);
    }
    let Ok(pid) = contents.trim().parse::<i32>() else {
        return Ok(true);
    };

    let alive = unsafe { libc::kill(pid, 0) == 0 };
    Ok(!alive)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    // Serializes tests touching the process-wide lock file.
    static LOCK_TEST_MUTEX: Mutex<()> = Mutex::new(());

    #[test]
    fn acquire_then_drop_removes_the_file() {
        let _serial = LOCK_TEST_MUTEX.lock().unwrap();
        let _ = fs::remove_file(SOLO_RUN_LOCK_PATH);

        {
            let _lock = SoloRunLock::acquire().unwrap();
            assert!(std::path::Path::new(SOLO_RUN_LOCK_PATH).exists());
        }
        assert!(!std::path::Path::new(SOLO_RUN_LOCK_PATH).exists());
    }

    #[test]
    fn second_acquire_fails_while_first_is_live() {
        let _serial = LOCK_TEST_MUTEX.lock().unwrap();
        let _ = fs::remove_file(SOLO_RUN_LOCK_PATH);

        let _first = SoloRunLock::acquire().unwrap();
        assert!(SoloRunLock::acquire().is_err());
    }
}
