//! Per-project layout and source-directory configuration
//!
//! Everything the engine persists for a project lives under `.phplens/`:
//! settings in `config/settings.json`, the general tag store and the
//! detector-produced store under `index/`.

use chrono::{DateTime, Utc};
use glob::Pattern;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::tokenizer::PhpVersion;

pub fn get_phplens_dir(project_path: &Path) -> PathBuf {
    project_path.join(".phplens")
}

/// General tag store: one file per project.
pub fn tags_db_path(project_path: &Path) -> PathBuf {
    get_phplens_dir(project_path).join("index").join("tags.db")
}

/// Detector-produced artifacts: a separate file per project.
pub fn detector_db_path(project_path: &Path) -> PathBuf {
    get_phplens_dir(project_path)
        .join("index")
        .join("detectors.db")
}

pub fn get_settings_path(project_path: &Path) -> PathBuf {
    get_phplens_dir(project_path)
        .join("config")
        .join("settings.json")
}

/// Initialize the .phplens directory structure if it doesn't exist.
pub fn init_phplens_dir(project_path: &Path) -> std::io::Result<()> {
    let dir = get_phplens_dir(project_path);
    fs::create_dir_all(dir.join("config"))?;
    fs::create_dir_all(dir.join("index"))?;
    Ok(())
}

pub fn has_phplens_dir(project_path: &Path) -> bool {
    get_phplens_dir(project_path).exists()
}

/// One enabled source root with its include/exclude wildcards
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SourceDirConfig {
    pub directory: PathBuf,
    /// File-name wildcards a file must match; defaults to PHP sources
    #[serde(default = "default_include_wildcards")]
    pub include_wildcards: Vec<String>,
    /// Wildcards matched against the full path; any match excludes the file
    #[serde(default)]
    pub exclude_wildcards: Vec<String>,
}

fn default_include_wildcards() -> Vec<String> {
    vec!["*.php".to_string(), "*.phtml".to_string()]
}

impl SourceDirConfig {
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
            include_wildcards: default_include_wildcards(),
            exclude_wildcards: Vec::new(),
        }
    }

    /// Whether a file under this source root should be scanned.
    pub fn matches(&self, path: &Path) -> bool {
        let name = match path.file_name().and_then(|n| n.to_str()) {
            Some(name) => name,
            None => return false,
        };
        let included = self
            .include_wildcards
            .iter()
            .filter_map(|w| Pattern::new(w).ok())
            .any(|p| p.matches(name));
        if !included {
            return false;
        }
        let full = path.to_string_lossy();
        !self
            .exclude_wildcards
            .iter()
            .filter_map(|w| Pattern::new(w).ok())
            .any(|p| p.matches(&full))
    }
}

/// Persisted project settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectSettings {
    #[serde(default)]
    pub php_version: PhpVersion,
    #[serde(default)]
    pub sources: Vec<SourceDirConfig>,
    pub updated_at: DateTime<Utc>,
}

impl Default for ProjectSettings {
    fn default() -> Self {
        Self {
            php_version: PhpVersion::default(),
            sources: Vec::new(),
            updated_at: Utc::now(),
        }
    }
}

pub fn load_settings(project_path: &Path) -> std::io::Result<ProjectSettings> {
    let json = fs::read_to_string(get_settings_path(project_path))?;
    serde_json::from_str(&json).map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
}

pub fn save_settings(project_path: &Path, settings: &ProjectSettings) -> std::io::Result<()> {
    init_phplens_dir(project_path)?;
    let json = serde_json::to_string_pretty(settings)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
    fs::write(get_settings_path(project_path), json)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_settings_round_trip() {
        let temp = TempDir::new().unwrap();
        let mut settings = ProjectSettings::default();
        settings.php_version = PhpVersion::Php7;
        settings
            .sources
            .push(SourceDirConfig::new(temp.path().join("src")));

        save_settings(temp.path(), &settings).unwrap();
        let loaded = load_settings(temp.path()).unwrap();

        assert_eq!(loaded.php_version, PhpVersion::Php7);
        assert_eq!(loaded.sources.len(), 1);
        assert_eq!(
            loaded.sources[0].include_wildcards,
            vec!["*.php", "*.phtml"]
        );
    }

    #[test]
    fn test_include_wildcards() {
        let config = SourceDirConfig::new("/app");
        assert!(config.matches(Path::new("/app/User.php")));
        assert!(config.matches(Path::new("/app/views/user.phtml")));
        assert!(!config.matches(Path::new("/app/readme.md")));
    }

    #[test]
    fn test_exclude_wildcards_win() {
        let mut config = SourceDirConfig::new("/app");
        config.exclude_wildcards.push("*/vendor/*".to_string());
        assert!(config.matches(Path::new("/app/User.php")));
        assert!(!config.matches(Path::new("/app/vendor/lib/Loader.php")));
    }
}
