use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};

use bartleby_core::{CoreError, CoreResult};
use fs2::FileExt;

use crate::paths::BartlebyPaths;

/// Single-writer guard over `.bartleby/LOCK`, held for the lifetime of an
/// open workspace. The holder's pid is written into the file for diagnostics.
pub struct WorkspaceLock {
    file: File,
}

impl WorkspaceLock {
    /// Take the lock without blocking. Contention is a `Conflict`.
    pub fn acquire(paths: &BartlebyPaths) -> CoreResult<Self> {
        let mut file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .read(true)
            .write(true)
            .open(&paths.lock_file)?;

        if file.try_lock_exclusive().is_err() {
            let holder = read_pid(&mut file)
                .map(|pid| format!("pid {pid}"))
                .unwrap_or_else(|| "another process".to_string());
            return Err(CoreError::Conflict(format!(
                "workspace {} is open in {holder}",
                paths.root.display()
            )));
        }

        file.set_len(0)?;
        file.seek(SeekFrom::Start(0))?;
        write!(file, "{}", std::process::id())?;
        file.flush()?;
        Ok(Self { file })
    }
}

impl Drop for WorkspaceLock {
    fn drop(&mut self) {
        let _ = self.file.set_len(0);
        let _ = fs2::FileExt::unlock(&self.file);
    }
}

fn read_pid(file: &mut File) -> Option<u32> {
    let mut raw = String::new();
    file.seek(SeekFrom::Start(0)).ok()?;
    file.read_to_string(&mut raw).ok()?;
    raw.trim().parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_acquire_conflicts_until_drop() {
        let tmp = tempfile::tempdir().unwrap();
        let p = BartlebyPaths::discover(tmp.path());
        p.ensure_layout().unwrap();

        let lock = WorkspaceLock::acquire(&p).unwrap();
        let err = WorkspaceLock::acquire(&p).err().unwrap();
        assert_eq!(err.code(), "CONFLICT");
        assert!(err.to_string().contains(&std::process::id().to_string()));

        drop(lock);
        let _again = WorkspaceLock::acquire(&p).unwrap();
    }

    #[test]
    fn lock_file_records_holder() {
        let tmp = tempfile::tempdir().unwrap();
        let p = BartlebyPaths::discover(tmp.path());
        p.ensure_layout().unwrap();

        let _lock = WorkspaceLock::acquire(&p).unwrap();
        let recorded = std::fs::read_to_string(&p.lock_file).unwrap();
        assert_eq!(recorded, std::process::id().to_string());
    }
}
