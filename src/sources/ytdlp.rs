use async_trait::async_trait;
use serenity::model::id::UserId;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use url::Url;

use super::{MediaResolver, ResolvedTrack, TrackReceiver, TrackRequest};
use crate::error::MusicError;

/// Resolutor basado en yt-dlp con extracción plana: obtiene metadatos sin
/// descargar contenido, y entrega las entradas de playlist de forma incremental
pub struct YtDlpResolver;

impl YtDlpResolver {
    pub fn new() -> Self {
        Self
    }

    /// Verifica que yt-dlp esté disponible en el sistema
    pub async fn verify_dependencies() -> anyhow::Result<()> {
        let check = tokio::process::Command::new("yt-dlp")
            .arg("--version")
            .output()
            .await;

        match check {
            Ok(output) if output.status.success() => {
                let version = String::from_utf8_lossy(&output.stdout);
                info!("✅ yt-dlp versión: {}", version.trim());
                Ok(())
            }
            _ => {
                anyhow::bail!("yt-dlp no encontrado. Instala con: pip install yt-dlp");
            }
        }
    }

    /// Parsea una línea de `--print "%(id)s|%(webpage_url)s|%(duration)s|%(title)s"`.
    /// Devuelve None para entradas borradas, privadas o malformadas
    fn parse_flat_line(line: &str, requested_by: UserId) -> Option<ResolvedTrack> {
        let mut parts = line.splitn(4, '|');
        let id = parts.next()?.trim();
        let webpage_url = parts.next()?.trim();
        let duration = parts.next()?.trim();
        let title = parts.next()?.trim();

        if title.is_empty() || title == "[Deleted video]" || title == "[Private video]" {
            return None;
        }

        // En extracción plana webpage_url puede venir como "NA"; reconstruir desde el id
        let media_url = if webpage_url == "NA" || webpage_url.is_empty() {
            if id.is_empty() || id == "NA" {
                return None;
            }
            format!("https://www.youtube.com/watch?v={}", id)
        } else {
            webpage_url.to_string()
        };

        let track = ResolvedTrack::new(title.to_string(), media_url, requested_by);

        match duration.parse::<f64>() {
            Ok(secs) if secs > 0.0 => Some(track.with_duration(Duration::from_secs_f64(secs))),
            _ => Some(track),
        }
    }
}

#[async_trait]
impl MediaResolver for YtDlpResolver {
    async fn resolve(&self, request: &TrackRequest) -> Result<TrackReceiver, MusicError> {
        if !self.is_valid_url(&request.source_url) {
            return Err(MusicError::Resolution(format!(
                "URL malformada: {}",
                request.source_url
            )));
        }

        info!("🔍 Resolviendo URL: {}", request.source_url);

        let mut child = tokio::process::Command::new("yt-dlp")
            .args([
                "--flat-playlist",
                "--print",
                "%(id)s|%(webpage_url)s|%(duration)s|%(title)s",
                "--ignore-errors",
                "--no-warnings",
                "--quiet",
                "--socket-timeout",
                "30",
                "--retries",
                "2",
            ])
            .arg(&request.source_url)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| MusicError::Resolution(format!("no se pudo ejecutar yt-dlp: {}", e)))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| MusicError::Resolution("sin stdout de yt-dlp".to_string()))?;
        let mut stderr = child
            .stderr
            .take()
            .ok_or_else(|| MusicError::Resolution("sin stderr de yt-dlp".to_string()))?;

        let (tx, rx) = mpsc::channel(64);
        let requested_by = request.requested_by;
        let source_url = request.source_url.clone();

        tokio::spawn(async move {
            let mut lines = BufReader::new(stdout).lines();
            let mut sent = 0usize;

            while let Ok(Some(line)) = lines.next_line().await {
                match Self::parse_flat_line(&line, requested_by) {
                    Some(track) => {
                        debug!("📄 Entrada resuelta: {}", track.title());
                        sent += 1;
                        if tx.send(Ok(track)).await.is_err() {
                            // El consumidor se fue; matar el proceso y salir
                            let _ = child.start_kill();
                            break;
                        }
                    }
                    None => {
                        warn!("⚠️ Entrada de playlist descartada: {}", line);
                    }
                }
            }

            let status = child.wait().await;
            let ok = matches!(status, Ok(s) if s.success());

            if sent == 0 {
                let mut detail = String::new();
                let _ = stderr.read_to_string(&mut detail).await;
                let reason = if ok {
                    format!("no se encontró ningún video en {}", source_url)
                } else if detail.trim().is_empty() {
                    format!("yt-dlp falló para {}", source_url)
                } else {
                    detail.trim().to_string()
                };
                let _ = tx.send(Err(MusicError::Resolution(reason))).await;
            } else {
                info!("🎵 Resolución completada: {} entradas de {}", sent, source_url);
            }
        });

        Ok(rx)
    }

    fn is_valid_url(&self, url: &str) -> bool {
        matches!(Url::parse(url), Ok(parsed) if parsed.scheme() == "http" || parsed.scheme() == "https")
    }

    fn source_name(&self) -> &'static str {
        "yt-dlp"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_flat_line_single_video() {
        let line = "dQw4w9WgXcQ|https://www.youtube.com/watch?v=dQw4w9WgXcQ|212|Never Gonna Give You Up";
        let track = YtDlpResolver::parse_flat_line(line, UserId::new(1)).unwrap();

        assert_eq!(track.title(), "Never Gonna Give You Up");
        assert_eq!(track.media_url(), "https://www.youtube.com/watch?v=dQw4w9WgXcQ");
        assert_eq!(track.duration(), Some(Duration::from_secs(212)));
    }

    #[test]
    fn test_parse_flat_line_keeps_pipes_in_title() {
        let line = "abc|https://example.com/v/abc|10|Mix | Lo mejor de 2024";
        let track = YtDlpResolver::parse_flat_line(line, UserId::new(1)).unwrap();
        assert_eq!(track.title(), "Mix | Lo mejor de 2024");
    }

    #[test]
    fn test_parse_flat_line_reconstructs_url_from_id() {
        let line = "abc123|NA|NA|Entrada plana";
        let track = YtDlpResolver::parse_flat_line(line, UserId::new(1)).unwrap();

        assert_eq!(track.media_url(), "https://www.youtube.com/watch?v=abc123");
        assert_eq!(track.duration(), None);
    }

    #[test]
    fn test_parse_flat_line_filters_unavailable_entries() {
        assert!(YtDlpResolver::parse_flat_line("x|NA|NA|[Deleted video]", UserId::new(1)).is_none());
        assert!(YtDlpResolver::parse_flat_line("x|NA|NA|[Private video]", UserId::new(1)).is_none());
        assert!(YtDlpResolver::parse_flat_line("NA|NA|NA|Sin id ni url", UserId::new(1)).is_none());
        assert!(YtDlpResolver::parse_flat_line("garbage", UserId::new(1)).is_none());
    }

    #[test]
    fn test_url_validation() {
        let resolver = YtDlpResolver::new();
        assert!(resolver.is_valid_url("https://www.youtube.com/watch?v=dQw4w9WgXcQ"));
        assert!(resolver.is_valid_url("http://youtu.be/abc"));
        assert!(!resolver.is_valid_url("not a url"));
        assert!(!resolver.is_valid_url("ftp://example.com/file"));
    }
}
