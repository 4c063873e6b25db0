use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

static WRITE_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Files addressed by name inside one directory.
#[derive(Clone, Debug)]
pub struct BackendLocal {
    pub base_dir: PathBuf,
}

impl BackendLocal {
    pub fn new(base_dir: impl AsRef<Path>) -> std::io::Result<Self> {
        let base_dir = base_dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&base_dir)?;
        Ok(BackendLocal { base_dir })
    }

    pub fn path(&self, ident: &str) -> PathBuf {
        self.base_dir.join(ident)
    }

    pub fn exists(&self, ident: &str) -> bool {
        std::fs::metadata(self.path(ident)).is_ok()
    }

    pub fn read(&self, ident: &str) -> std::io::Result<Vec<u8>> {
        std::fs::read(self.path(ident))
    }

    /// Write through a temp file and rename, so readers never see a partial file.
    pub fn write(&self, ident: &str, data: &[u8]) -> std::io::Result<()> {
        let temp_path = self.base_dir.join(format!(
            ".{}-{}-{ident}",
            std::process::id(),
            WRITE_COUNTER.fetch_add(1, Ordering::SeqCst)
        ));

        if let Err(e) = std::fs::write(&temp_path, data) {
            let _ = std::fs::remove_file(&temp_path);
            return Err(e);
        }

        std::fs::rename(&temp_path, self.path(ident))
    }
}
