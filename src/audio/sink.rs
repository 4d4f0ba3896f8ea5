use async_trait::async_trait;
use songbird::{Call, Event, EventContext, EventHandler as VoiceEventHandler, TrackEvent};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::error::MusicError;

/// Destino de audio de un guild. El motor lo trata como un sumidero opaco:
/// no gestiona el handshake del transporte de voz
#[async_trait]
pub trait VoiceSink: Send + Sync {
    /// Reproduce el archivo hasta el final natural o hasta que se cancele.
    /// Una cancelación (skip/stop) corta el stream y devuelve Ok
    async fn stream(&self, path: &Path, cancel: CancellationToken) -> Result<(), MusicError>;

    /// Cierra la sesión de voz
    async fn disconnect(&self) -> Result<(), MusicError>;
}

#[derive(Debug, Clone, Copy)]
enum StreamOutcome {
    Finished,
    Errored,
}

/// Notificador de eventos de track de songbird hacia el stream en curso
struct TrackNotifier {
    tx: mpsc::UnboundedSender<StreamOutcome>,
    outcome: StreamOutcome,
}

#[async_trait]
impl VoiceEventHandler for TrackNotifier {
    async fn act(&self, _ctx: &EventContext<'_>) -> Option<Event> {
        let _ = self.tx.send(self.outcome);
        None
    }
}

/// Sink de producción sobre una llamada de songbird
pub struct SongbirdSink {
    call: Arc<Mutex<Call>>,
}

impl SongbirdSink {
    pub fn new(call: Arc<Mutex<Call>>) -> Self {
        Self { call }
    }
}

#[async_trait]
impl VoiceSink for SongbirdSink {
    async fn stream(&self, path: &Path, cancel: CancellationToken) -> Result<(), MusicError> {
        let input = songbird::input::File::new(path.to_path_buf());

        let (tx, mut rx) = mpsc::unbounded_channel();

        let handle = {
            let mut call = self.call.lock().await;
            call.play_input(input.into())
        };

        handle
            .add_event(
                Event::Track(TrackEvent::End),
                TrackNotifier {
                    tx: tx.clone(),
                    outcome: StreamOutcome::Finished,
                },
            )
            .map_err(|e| MusicError::Streaming(format!("no se pudo registrar evento: {}", e)))?;
        handle
            .add_event(
                Event::Track(TrackEvent::Error),
                TrackNotifier {
                    tx,
                    outcome: StreamOutcome::Errored,
                },
            )
            .map_err(|e| MusicError::Streaming(format!("no se pudo registrar evento: {}", e)))?;

        info!("🔊 Streaming: {}", path.display());

        tokio::select! {
            _ = cancel.cancelled() => {
                debug!("⏭️ Stream cancelado: {}", path.display());
                let _ = handle.stop();
                Ok(())
            }
            outcome = rx.recv() => match outcome {
                Some(StreamOutcome::Errored) => Err(MusicError::Streaming(
                    "el track terminó con error".to_string(),
                )),
                // Canal cerrado se trata como fin de stream
                Some(StreamOutcome::Finished) | None => Ok(()),
            }
        }
    }

    async fn disconnect(&self) -> Result<(), MusicError> {
        let mut call = self.call.lock().await;
        call.stop();
        call.leave()
            .await
            .map_err(|e| MusicError::Streaming(format!("error al desconectar: {}", e)))?;
        Ok(())
    }
}
