use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    // Discord
    pub discord_token: String,
    pub command_prefix: String,

    // Cola
    pub max_queue_size: usize,
    pub max_playlist_size: usize,

    // Descargas
    pub scratch_dir: PathBuf,
    pub download_timeout_secs: u64,
}

impl Config {
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        let config = Self {
            discord_token: std::env::var("DISCORD_TOKEN")?,
            command_prefix: std::env::var("COMMAND_PREFIX").unwrap_or_else(|_| "!".to_string()),

            max_queue_size: std::env::var("MAX_QUEUE_SIZE")
                .unwrap_or_else(|_| "1000".to_string())
                .parse()?,
            max_playlist_size: std::env::var("MAX_PLAYLIST_SIZE")
                .unwrap_or_else(|_| "100".to_string())
                .parse()?,

            scratch_dir: std::env::var("SCRATCH_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| std::env::temp_dir().join("open-jukebox")),
            download_timeout_secs: std::env::var("DOWNLOAD_TIMEOUT_SECS")
                .unwrap_or_else(|_| "300".to_string())
                .parse()?,
        };

        config.validate()?;

        Ok(config)
    }

    /// Valida la configuración antes de arrancar el bot
    pub fn validate(&self) -> Result<()> {
        if self.command_prefix.is_empty() {
            anyhow::bail!("El prefijo de comandos no puede estar vacío");
        }

        if self.max_queue_size == 0 {
            anyhow::bail!("Max queue size debe ser mayor que 0");
        }

        if self.max_playlist_size == 0 {
            anyhow::bail!("Max playlist size debe ser mayor que 0");
        }

        if self.download_timeout_secs == 0 {
            anyhow::bail!("El timeout de descarga debe ser mayor que 0");
        }

        Ok(())
    }

    /// Resumen de configuración para logging (sin datos sensibles)
    pub fn summary(&self) -> String {
        format!(
            "Config Summary:\n  \
            Prefix: {}\n  \
            Cola: {} máx, playlists de hasta {}\n  \
            Descargas: {} ({}s timeout)",
            self.command_prefix,
            self.max_queue_size,
            self.max_playlist_size,
            self.scratch_dir.display(),
            self.download_timeout_secs,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_config() -> Config {
        Config {
            discord_token: "token".to_string(),
            command_prefix: "!".to_string(),
            max_queue_size: 1000,
            max_playlist_size: 100,
            scratch_dir: std::env::temp_dir().join("open-jukebox"),
            download_timeout_secs: 300,
        }
    }

    #[test]
    fn test_validate_accepts_defaults() {
        assert!(base_config().validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_empty_prefix() {
        let mut config = base_config();
        config.command_prefix = String::new();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_zero_limits() {
        let mut config = base_config();
        config.max_queue_size = 0;
        assert!(config.validate().is_err());

        let mut config = base_config();
        config.download_timeout_secs = 0;
        assert!(config.validate().is_err());
    }
}
