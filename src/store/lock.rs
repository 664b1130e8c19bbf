use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use fs2::FileExt;
use tracing::{info, warn};

use super::StoreError;

/// Advisory per-project lock. The file holds the owner's pid; a lock whose
/// pid is no longer alive is stale and may be taken over.
#[derive(Debug)]
pub struct ProjectLock {
    path: PathBuf,
    pid: u32,
    released: bool,
}

impl ProjectLock {
    /// Take the lock at `path` for the current process.
    pub fn acquire(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| StoreError::io(parent, e))?;
        }

        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)
            .map_err(|e| StoreError::io(&path, e))?;

        // Serializes the read-check-write below against a racing process
        if file.try_lock_exclusive().is_err() {
            return Err(StoreError::LockHeld(read_pid(&mut file).unwrap_or(0)));
        }

        let result = Self::claim(&mut file, &path);
        let _ = file.unlock();
        result
    }

    fn claim(file: &mut File, path: &Path) -> Result<Self, StoreError> {
        let pid = std::process::id();
        if let Some(holder) = read_pid(file) {
            if pid_alive(holder) {
                return Err(StoreError::LockHeld(holder));
            }
            warn!(holder, path = %path.display(), "taking over stale project lock");
        }

        file.set_len(0)
            .and_then(|_| file.seek(SeekFrom::Start(0)))
            .and_then(|_| file.write_all(format!("{}\n", pid).as_bytes()))
            .and_then(|_| file.sync_all())
            .map_err(|e| StoreError::io(path, e))?;

        info!(pid, path = %path.display(), "acquired project lock");
        Ok(Self {
            path: path.to_path_buf(),
            pid,
            released: false,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn pid(&self) -> u32 {
        self.pid
    }

    /// Remove the lock file.
    pub fn release(mut self) -> Result<(), StoreError> {
        self.released = true;
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StoreError::io(&self.path, e)),
        }
    }
}

impl Drop for ProjectLock {
    fn drop(&mut self) {
        if !self.released {
            let _ = std::fs::remove_file(&self.path);
        }
    }
}

/// Pid recorded in a lock file, if any.
pub fn holder(path: &Path) -> Option<u32> {
    let mut file = File::open(path).ok()?;
    read_pid(&mut file)
}

fn read_pid(file: &mut File) -> Option<u32> {
    let mut content = String::new();
    file.seek(SeekFrom::Start(0)).ok()?;
    file.read_to_string(&mut content).ok()?;
    content.trim().parse().ok()
}

/// Check if a pid is alive using kill(pid, 0).
#[cfg(unix)]
pub fn pid_alive(pid: u32) -> bool {
    // Anything outside pid_t would reach kill() as a process group
    let pid = match libc::pid_t::try_from(pid) {
        Ok(pid) if pid > 0 => pid,
        _ => return false,
    };
    let rc = unsafe { libc::kill(pid, 0) };
    rc == 0 || std::io::Error::last_os_error().raw_os_error() == Some(libc::EPERM)
}

#[cfg(not(unix))]
pub fn pid_alive(pid: u32) -> bool {
    pid != 0
}
