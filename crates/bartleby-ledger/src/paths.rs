use std::path::{Path, PathBuf};

/// All well-known paths under `.bartleby/`.
#[derive(Debug, Clone)]
pub struct BartlebyPaths {
    pub root: PathBuf,
    pub bartleby_dir: PathBuf,
    pub db_file: PathBuf,
    pub lock_file: PathBuf,
    pub settings_json: PathBuf,
}

impl BartlebyPaths {
    /// Derive all paths from a project root. Pure computation, no I/O.
    pub fn discover(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let bartleby_dir = root.join(".bartleby");
        Self {
            db_file: bartleby_dir.join("bartleby.db"),
            lock_file: bartleby_dir.join("LOCK"),
            settings_json: bartleby_dir.join("settings.json"),
            bartleby_dir,
            root,
        }
    }

    /// Create the `.bartleby/` directory. Idempotent.
    pub fn ensure_layout(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.bartleby_dir)
    }

    /// Check whether `.bartleby/` exists.
    pub fn is_initialized(&self) -> bool {
        self.bartleby_dir.is_dir()
    }

    /// Walk up from `start` looking for a directory containing `.bartleby/`.
    pub fn find_root(start: &Path) -> Option<PathBuf> {
        let mut cur = start.to_path_buf();
        loop {
            if cur.join(".bartleby").is_dir() {
                return Some(cur);
            }
            if !cur.pop() {
                return None;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn discover_builds_correct_paths() {
        let p = BartlebyPaths::discover("/tmp/novel");
        assert_eq!(p.bartleby_dir, PathBuf::from("/tmp/novel/.bartleby"));
        assert_eq!(p.db_file, PathBuf::from("/tmp/novel/.bartleby/bartleby.db"));
        assert_eq!(p.lock_file, PathBuf::from("/tmp/novel/.bartleby/LOCK"));
        assert_eq!(
            p.settings_json,
            PathBuf::from("/tmp/novel/.bartleby/settings.json")
        );
    }

    #[test]
    fn find_root_walks_upward() {
        let tmp = tempfile::tempdir().unwrap();
        let p = BartlebyPaths::discover(tmp.path());
        assert!(!p.is_initialized());
        p.ensure_layout().unwrap();
        assert!(p.is_initialized());

        let nested = tmp.path().join("chapters").join("one");
        std::fs::create_dir_all(&nested).unwrap();
        assert_eq!(BartlebyPaths::find_root(&nested), Some(tmp.path().to_path_buf()));
    }
}
