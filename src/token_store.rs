use std::io;
use std::path::{Path, PathBuf};

/// Opaque secure-string store for the session token.
///
/// Currently file-backed and plaintext; swapping in an OS keychain later
/// only has to honor get/set/clear.
pub struct TokenStore {
    path: PathBuf,
}

impl TokenStore {
    pub fn new(data_dir: &Path) -> Self {
        TokenStore {
            path: data_dir.join(".token"),
        }
    }

    pub fn get(&self) -> Option<String> {
        let token = std::fs::read_to_string(&self.path).ok()?;
        let token = token.trim().to_string();
        if token.is_empty() {
            None
        } else {
            Some(token)
        }
    }

    pub fn set(&self, token: &str) -> io::Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&self.path, token)
    }

    /// Idempotent: clearing an absent token is a no-op.
    pub fn clear(&self) -> io::Result<()> {
        if self.path.exists() {
            std::fs::remove_file(&self.path)?;
        }
        Ok(())
    }
}
