pub mod ytdlp;

use async_trait::async_trait;
use serenity::model::id::{GuildId, UserId};
use std::time::Duration;
use tokio::sync::mpsc;

pub use ytdlp::YtDlpResolver;

use crate::error::MusicError;

/// Petición original de un usuario: una URL, quién la pidió y en qué servidor
#[derive(Debug, Clone)]
pub struct TrackRequest {
    pub source_url: String,
    pub requested_by: UserId,
    pub guild_id: GuildId,
}

/// Un track resuelto: título y localizador listos para descargar. Inmutable
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedTrack {
    title: String,
    media_url: String,
    duration: Option<Duration>,
    requested_by: UserId,
}

impl ResolvedTrack {
    pub fn new(title: String, media_url: String, requested_by: UserId) -> Self {
        Self {
            title,
            media_url,
            duration: None,
            requested_by,
        }
    }

    // Getters
    pub fn title(&self) -> &str {
        &self.title
    }
    pub fn media_url(&self) -> &str {
        &self.media_url
    }
    pub fn duration(&self) -> Option<Duration> {
        self.duration
    }
    pub fn requested_by(&self) -> UserId {
        self.requested_by
    }

    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = Some(duration);
        self
    }
}

/// Canal por el que llegan los tracks resueltos; las playlists producen
/// varias entradas en orden, a medida que se descubren
pub type TrackReceiver = mpsc::Receiver<Result<ResolvedTrack, MusicError>>;

/// Resuelve URLs en secuencias de tracks sin descargar el contenido
#[async_trait]
pub trait MediaResolver: Send + Sync {
    /// Inicia la resolución de una URL. Un video suelto produce una entrada;
    /// una playlist produce sus entradas en orden de playlist
    async fn resolve(&self, request: &TrackRequest) -> Result<TrackReceiver, MusicError>;

    /// Verifica si la URL tiene forma válida para esta fuente
    fn is_valid_url(&self, url: &str) -> bool;

    /// Nombre de la fuente
    #[allow(dead_code)]
    fn source_name(&self) -> &'static str;
}
