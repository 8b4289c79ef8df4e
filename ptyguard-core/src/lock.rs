//! Single-run guard so overlapping scheduler invocations never race on the
//! alert state file.

use crate::error::{Error, Result};
use fs2::FileExt;
use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Exclusive advisory lock held for the lifetime of the value. The file holds
/// the owner's pid while locked and is emptied, never unlinked, on drop: every
/// run must contend on the same inode.
#[derive(Debug)]
pub struct RunLock {
    file: File,
    path: PathBuf,
}

impl RunLock {
    /// Returns `Ok(None)` if another run already holds the lock.
    pub fn acquire(path: &Path) -> Result<Option<RunLock>> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| Error::io(parent, e))?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .read(true)
            .write(true)
            .open(path)
            .map_err(|e| Error::io(path, e))?;

        match file.try_lock_exclusive() {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::WouldBlock => {
                let holder = fs::read_to_string(path).unwrap_or_default();
                debug!("lock {} held by pid {}", path.display(), holder.trim());
                return Ok(None);
            }
            Err(e) => return Err(Error::io(path, e)),
        }

        file.set_len(0).map_err(|e| Error::io(path, e))?;
        writeln!(file, "{}", std::process::id()).map_err(|e| Error::io(path, e))?;

        Ok(Some(RunLock {
            file,
            path: path.to_path_buf(),
        }))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for RunLock {
    fn drop(&mut self) {
        if let Err(e) = self.file.set_len(0) {
            warn!("could not clear lock file {}: {}", self.path.display(), e);
        }
        let _ = self.file.unlock();
    }
}
