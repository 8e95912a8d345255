use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::batch::DEFAULT_MAX_PROCS;
use crate::store::feature::DEFAULT_REPO;

/// Environment variable naming an alternate config file.
pub const CONFIG_ENV: &str = "IGPUBLISH_CONFIG";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub repo: RepoConfig,

    #[serde(default)]
    pub media: MediaConfig,

    #[serde(default)]
    pub publish: PublishConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepoConfig {
    /// Root of the target repository. Iterator source, reader and writer
    /// all default to it.
    #[serde(default)]
    pub path: Option<PathBuf>,

    /// Value written to `wof:repo` on new records.
    #[serde(default = "default_repo_name")]
    pub name: String,
}

fn default_repo_name() -> String {
    DEFAULT_REPO.to_string()
}

impl Default for RepoConfig {
    fn default() -> Self {
        Self {
            path: None,
            name: default_repo_name(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaConfig {
    /// Directory holding media files, addressed by the post `path`.
    #[serde(default)]
    pub bucket: Option<PathBuf>,

    #[serde(default = "default_video_extensions")]
    pub video_extensions: Vec<String>,
}

fn default_video_extensions() -> Vec<String> {
    vec!["mp4".to_string()]
}

impl Default for MediaConfig {
    fn default() -> Self {
        Self {
            bucket: None,
            video_extensions: default_video_extensions(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublishConfig {
    #[serde(default = "default_max_procs")]
    pub max_procs: usize,
}

fn default_max_procs() -> usize {
    DEFAULT_MAX_PROCS
}

impl Default for PublishConfig {
    fn default() -> Self {
        Self {
            max_procs: default_max_procs(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Send logs to the systemd journal (Linux only).
    #[serde(default)]
    pub journald: bool,

    /// Write daily rolling log files here instead of stderr.
    #[serde(default)]
    pub dir: Option<PathBuf>,
}

impl Config {
    /// Load from `explicit`, else `$IGPUBLISH_CONFIG`, else the default
    /// location. A missing file yields the defaults.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let config_path = match explicit {
            Some(path) => path.to_path_buf(),
            None => std::env::var_os(CONFIG_ENV)
                .map(PathBuf::from)
                .unwrap_or_else(Self::config_path),
        };

        Self::load_from(&config_path)
    }

    pub fn load_from(config_path: &Path) -> Result<Self> {
        if !config_path.exists() {
            return Ok(Config::default());
        }

        let content = std::fs::read_to_string(config_path)
            .with_context(|| format!("Failed to read {}", config_path.display()))?;
        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse {}", config_path.display()))?;
        Ok(config)
    }

    fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("instagram-publish")
            .join("config.toml")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_gives_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let config = Config::load_from(&temp_dir.path().join("nope.toml")).unwrap();

        assert_eq!(config.repo.name, "sfomuseum-data-socialmedia-instagram");
        assert_eq!(config.media.video_extensions, vec!["mp4"]);
        assert_eq!(config.publish.max_procs, 10);
        assert!(!config.logging.journald);
        assert!(config.media.bucket.is_none());
    }

    #[test]
    fn test_partial_file_keeps_other_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.toml");
        std::fs::write(
            &path,
            "[repo]\npath = \"/data/instagram\"\n\n[publish]\nmax_procs = 4\n\n[logging]\njournald = true\n",
        )
        .unwrap();

        let config = Config::load(Some(&path)).unwrap();
        assert_eq!(config.repo.path, Some(PathBuf::from("/data/instagram")));
        assert_eq!(config.repo.name, "sfomuseum-data-socialmedia-instagram");
        assert_eq!(config.publish.max_procs, 4);
        assert!(config.logging.journald);
        assert_eq!(config.media.video_extensions, vec!["mp4"]);
    }

    #[test]
    fn test_invalid_file_is_an_error() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.toml");
        std::fs::write(&path, "[publish]\nmax_procs = \"lots\"\n").unwrap();

        assert!(Config::load_from(&path).is_err());
    }
}
