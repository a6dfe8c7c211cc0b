//! # Configuration Management Module
//!
//! Questo modulo gestisce tutta la configurazione dell'applicazione.
//!
//! ## Responsabilità:
//! - Definisce la struct `Config` con tutti i parametri della pipeline
//! - Fornisce validazione dei parametri di input
//! - Supporta caricamento/salvataggio configurazione da/verso file JSON
//! - Fornisce valori di default sensati per tutti i parametri
//!
//! ## Parametri di configurazione:
//! - `encoder_program` / `encoder_args`: comando esterno (default: `bash encode.sh`)
//! - `target_extension`: estensione prodotta dall'encoder (default: `mp4`)
//! - `video_extensions`: estensioni considerate video (MOV, MP4, AVI, MTS)
//! - `stats_file_name` / `ignore_file_name`: file sidecar per cartella
//! - `log_file`: file di log append-only (default: `media-minifier.log`)
//! - `log_history_limit`: righe tenute in memoria per la pagina di stato (1000)
//! - `status_server` / `status_addr`: server HTTP di stato (default: `127.0.0.1:3000`)
//! - `delete_retries`: tentativi extra per cancellare il backup `.old`
//! - `reconcile_on_start`: pulizia dei residui di swap all'avvio
//! - `retry_failed`: rimette in coda i file falliti
//!
//! ## Esempio:
//! ```ignore
//! let config = Config {
//!     encoder_program: "ffmpeg-wrapper".to_string(),
//!     retry_failed: true,
//!     ..Default::default()
//! };
//! config.validate()?;
//! ```

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use crate::error::MinifyError;

/// Configuration for the conversion pipeline
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Program used to convert a single file
    pub encoder_program: String,
    /// Arguments placed before the file path
    pub encoder_args: Vec<String>,
    /// Extension of the file written by the encoder (without dot)
    pub target_extension: String,
    /// Extensions (case-insensitive, without dot) registered at discovery
    pub video_extensions: Vec<String>,
    /// Per-folder state sidecar
    pub stats_file_name: String,
    /// Per-folder ignore list
    pub ignore_file_name: String,
    /// Append-only log file
    pub log_file: PathBuf,
    /// Lines kept in memory for the status page
    pub log_history_limit: usize,
    /// Serve the HTTP status page
    pub status_server: bool,
    /// Address of the HTTP status page
    pub status_addr: SocketAddr,
    /// Extra attempts when deleting the swap backup
    pub delete_retries: u32,
    /// Resolve leftover swap files before starting
    pub reconcile_on_start: bool,
    /// Put failed records back in the queue at startup
    pub retry_failed: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            encoder_program: "bash".to_string(),
            encoder_args: vec!["encode.sh".to_string()],
            target_extension: "mp4".to_string(),
            video_extensions: ["mov", "mp4", "avi", "mts"]
                .iter()
                .map(|ext| ext.to_string())
                .collect(),
            // Spelling kept so existing trees are picked up
            stats_file_name: ".media-minifer-stats.json".to_string(),
            ignore_file_name: ".media-minifier-ignore.json".to_string(),
            log_file: PathBuf::from("media-minifier.log"),
            log_history_limit: 1000,
            status_server: true,
            status_addr: SocketAddr::from(([127, 0, 0, 1], 3000)),
            delete_retries: 2,
            reconcile_on_start: true,
            retry_failed: false,
        }
    }
}

impl Config {
    /// Validate configuration parameters
    pub fn validate(&self) -> Result<()> {
        if self.encoder_program.trim().is_empty() {
            return Err(MinifyError::Config("Encoder program must not be empty".to_string()).into());
        }

        if self.target_extension.is_empty()
            || self.target_extension.contains('.')
            || self.target_extension.contains(std::path::is_separator)
        {
            return Err(MinifyError::Config(format!(
                "Target extension must be a bare extension, got '{}'",
                self.target_extension
            ))
            .into());
        }

        if self.video_extensions.is_empty() {
            return Err(MinifyError::Config("At least one video extension is required".to_string()).into());
        }

        if self.stats_file_name.is_empty() || self.ignore_file_name.is_empty() {
            return Err(MinifyError::Config("Sidecar file names must not be empty".to_string()).into());
        }

        if self.stats_file_name == self.ignore_file_name {
            return Err(MinifyError::Config(
                "State file and ignore file must have different names".to_string(),
            )
            .into());
        }

        if self.log_history_limit == 0 {
            return Err(MinifyError::Config("Log history limit must be greater than 0".to_string()).into());
        }

        Ok(())
    }

    /// Default config location: `<config dir>/media-minifier/config.json`
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("media-minifier").join("config.json"))
    }

    /// Load configuration from file, falling back to defaults when missing
    pub async fn from_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = tokio::fs::read_to_string(path).await?;
        let config: Config = serde_json::from_str(&content)
            .map_err(|e| MinifyError::Config(format!("{}: {}", path.display(), e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to file
    pub async fn save_to_file(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let content = serde_json::to_string_pretty(self)?;
        tokio::fs::write(path, content).await?;
        Ok(())
    }

    /// Name of the file the encoder produces for `base` (e.g. `clip.new.mp4`)
    pub fn converted_name(&self, base: &str) -> String {
        format!("{}.new.{}", base, self.target_extension)
    }

    /// Name of the swap backup for `base` (e.g. `clip.old.mp4`)
    pub fn backup_name(&self, base: &str) -> String {
        format!("{}.old.{}", base, self.target_extension)
    }

    /// Final name after a successful swap (e.g. `clip.mp4`)
    pub fn final_name(&self, base: &str) -> String {
        format!("{}.{}", base, self.target_extension)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_config_validation() {
        let mut config = Config::default();
        assert!(config.validate().is_ok());

        config.encoder_program = "  ".to_string();
        assert!(config.validate().is_err());

        config.encoder_program = "bash".to_string();
        config.target_extension = ".mp4".to_string();
        assert!(config.validate().is_err());

        config.target_extension = "mp4".to_string();
        config.video_extensions.clear();
        assert!(config.validate().is_err());

        config.video_extensions = vec!["mp4".to_string()];
        config.ignore_file_name = config.stats_file_name.clone();
        assert!(config.validate().is_err());

        config.ignore_file_name = ".ignore.json".to_string();
        config.log_history_limit = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_default() {
        let config = Config::default();
        assert_eq!(config.encoder_program, "bash");
        assert_eq!(config.encoder_args, vec!["encode.sh".to_string()]);
        assert_eq!(config.target_extension, "mp4");
        assert_eq!(config.video_extensions.len(), 4);
        assert_eq!(config.log_history_limit, 1000);
        assert_eq!(config.status_addr.port(), 3000);
        assert!(config.reconcile_on_start);
        assert!(!config.retry_failed);
    }

    #[test]
    fn test_derived_names() {
        let config = Config::default();
        assert_eq!(config.converted_name("clip"), "clip.new.mp4");
        assert_eq!(config.backup_name("clip"), "clip.old.mp4");
        assert_eq!(config.final_name("clip"), "clip.mp4");
    }

    #[tokio::test]
    async fn test_config_save_load() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("nested").join("config.json");

        let original_config = Config {
            encoder_program: "/usr/local/bin/shrink".to_string(),
            encoder_args: vec!["--fast".to_string()],
            delete_retries: 5,
            retry_failed: true,
            ..Default::default()
        };

        original_config.save_to_file(&config_path).await.unwrap();
        let loaded_config = Config::from_file(&config_path).await.unwrap();

        assert_eq!(loaded_config.encoder_program, "/usr/local/bin/shrink");
        assert_eq!(loaded_config.encoder_args, vec!["--fast".to_string()]);
        assert_eq!(loaded_config.delete_retries, 5);
        assert!(loaded_config.retry_failed);
    }

    #[tokio::test]
    async fn test_partial_config_uses_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.json");
        tokio::fs::write(&config_path, r#"{ "delete_retries": 7 }"#).await.unwrap();

        let config = Config::from_file(&config_path).await.unwrap();
        assert_eq!(config.delete_retries, 7);
        assert_eq!(config.encoder_program, "bash");
    }

    #[tokio::test]
    async fn test_missing_config_is_default() {
        let temp_dir = TempDir::new().unwrap();
        let config = Config::from_file(&temp_dir.path().join("absent.json")).await.unwrap();
        assert_eq!(config.target_extension, "mp4");
    }
}
