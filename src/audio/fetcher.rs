use async_trait::async_trait;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::store::{DownloadedTrack, ScratchDir};
use crate::error::MusicError;
use crate::sources::ResolvedTrack;

/// Umbral bajo el cual una descarga es sospechosa (página de error, truncada)
const SUSPICIOUS_SIZE_BYTES: u64 = 1024;

/// Descarga el audio de un track resuelto a un archivo local único
#[async_trait]
pub trait AudioFetcher: Send + Sync {
    /// Descarga el audio. Cancelable: al cancelar, el proceso muere y los
    /// parciales se borran antes de devolver el error
    async fn fetch(
        &self,
        track: &ResolvedTrack,
        cancel: CancellationToken,
    ) -> Result<DownloadedTrack, MusicError>;
}

/// Fetcher de producción: yt-dlp descargando bestaudio al scratch
pub struct YtDlpFetcher {
    scratch: Arc<ScratchDir>,
    timeout: Duration,
}

impl YtDlpFetcher {
    pub fn new(scratch: Arc<ScratchDir>, timeout: Duration) -> Self {
        Self { scratch, timeout }
    }

    /// Borra los parciales de una descarga fallida o cancelada
    fn cleanup(&self, stem: &str) {
        if let Err(e) = self.scratch.remove_by_stem(stem) {
            warn!("Error limpiando parciales de {}: {}", stem, e);
        }
    }
}

#[async_trait]
impl AudioFetcher for YtDlpFetcher {
    async fn fetch(
        &self,
        track: &ResolvedTrack,
        cancel: CancellationToken,
    ) -> Result<DownloadedTrack, MusicError> {
        let stem = self.scratch.unique_stem();
        let template = self.scratch.path().join(format!("{stem}.%(ext)s"));

        info!("⬇️ Descargando: {} → {}", track.title(), stem);

        let mut child = tokio::process::Command::new("yt-dlp")
            .args([
                "-f",
                "bestaudio/best",
                "--no-playlist",
                "--no-warnings",
                "--quiet",
                "--socket-timeout",
                "30",
                "--retries",
                "2",
                "-o",
            ])
            .arg(&template)
            .arg(track.media_url())
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| MusicError::Download(format!("no se pudo ejecutar yt-dlp: {}", e)))?;

        let mut stderr = child.stderr.take();

        let status = tokio::select! {
            status = child.wait() => status,
            _ = cancel.cancelled() => {
                let _ = child.start_kill();
                let _ = child.wait().await;
                self.cleanup(&stem);
                return Err(MusicError::Download("descarga cancelada".to_string()));
            }
            _ = tokio::time::sleep(self.timeout) => {
                let _ = child.start_kill();
                let _ = child.wait().await;
                self.cleanup(&stem);
                return Err(MusicError::Download(format!(
                    "tiempo de descarga agotado ({}s)",
                    self.timeout.as_secs()
                )));
            }
        };

        let ok = matches!(status, Ok(s) if s.success());
        if !ok {
            let mut detail = String::new();
            if let Some(err) = stderr.as_mut() {
                let _ = err.read_to_string(&mut detail).await;
            }
            self.cleanup(&stem);
            let reason = if detail.trim().is_empty() {
                format!("yt-dlp falló para {}", track.media_url())
            } else {
                detail.trim().to_string()
            };
            return Err(MusicError::Download(reason));
        }

        let path = self
            .scratch
            .find_output(&stem)
            .map_err(|e| MusicError::Download(e.to_string()))?
            .ok_or_else(|| {
                self.cleanup(&stem);
                MusicError::Download("archivo descargado no encontrado".to_string())
            })?;

        let size_bytes = std::fs::metadata(&path)
            .map_err(|e| MusicError::Download(e.to_string()))?
            .len();

        if size_bytes < SUSPICIOUS_SIZE_BYTES {
            warn!(
                "⚠️ Archivo muy pequeño ({} bytes), posible descarga truncada: {}",
                size_bytes,
                path.display()
            );
        }

        info!("✅ Descarga completa: {} ({} bytes)", path.display(), size_bytes);
        Ok(DownloadedTrack::new(track.clone(), path, size_bytes))
    }
}
