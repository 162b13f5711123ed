use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// User-facing launcher configuration, persisted as pretty JSON in the
/// launcher data directory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LauncherSettings {
    pub server_url: String,
    pub install_dir: PathBuf,
    /// Name of the game executable expected inside `install_dir`.
    pub game_binary: String,
    pub auto_update: bool,
    pub remember_me: bool,
    pub language: String,
}

impl Default for LauncherSettings {
    fn default() -> Self {
        let data = default_data_dir();
        LauncherSettings {
            server_url: "http://localhost:8000/api".to_string(),
            install_dir: data.join("game"),
            game_binary: default_game_binary().to_string(),
            auto_update: true,
            remember_me: false,
            language: "en".to_string(),
        }
    }
}

#[cfg(windows)]
fn default_game_binary() -> &'static str {
    "Skybreak.exe"
}

#[cfg(not(windows))]
fn default_game_binary() -> &'static str {
    "Skybreak"
}

/// Root directory for launcher state: settings, token, install record,
/// staging area and logs all live under here.
pub fn default_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("Skybreak")
}

pub fn settings_path(data_dir: &Path) -> PathBuf {
    data_dir.join("launcher_settings.json")
}

impl LauncherSettings {
    /// Load settings from disk, falling back to defaults when the file does
    /// not exist yet.
    pub fn load(data_dir: &Path) -> Result<LauncherSettings, String> {
        let path = settings_path(data_dir);
        if !path.exists() {
            return Ok(LauncherSettings::default());
        }
        let text = std::fs::read_to_string(&path).map_err(|e| e.to_string())?;
        serde_json::from_str(&text).map_err(|e| e.to_string())
    }

    pub fn save(&self, data_dir: &Path) -> Result<(), String> {
        let path = settings_path(data_dir);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| e.to_string())?;
        }
        let json = serde_json::to_string_pretty(self).map_err(|e| e.to_string())?;
        std::fs::write(&path, json).map_err(|e| e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn settings_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let mut settings = LauncherSettings::default();
        settings.server_url = "http://127.0.0.1:9000/api".to_string();
        settings.language = "ko".to_string();
        settings.save(dir.path()).unwrap();

        let loaded = LauncherSettings::load(dir.path()).unwrap();
        assert_eq!(loaded.server_url, "http://127.0.0.1:9000/api");
        assert_eq!(loaded.language, "ko");
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let settings = LauncherSettings::load(dir.path()).unwrap();
        assert!(settings.auto_update);
        assert!(!settings.remember_me);
    }
}
