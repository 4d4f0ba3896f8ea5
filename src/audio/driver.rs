use parking_lot::{Mutex, RwLock};
use serenity::model::id::GuildId;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::fetcher::AudioFetcher;
use super::queue::MusicQueue;
use super::sink::VoiceSink;
use crate::sources::ResolvedTrack;

/// Estados del driver de reproducción de un guild
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverState {
    Idle,
    Fetching,
    Playing,
    Advancing,
    Stopped,
}

/// Señales externas hacia el driver, aplicadas en el siguiente punto seguro
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverSignal {
    /// Abandona el track actual (descarga o stream) y avanza
    Skip,
    /// Detiene el driver sin avanzar
    Stop,
}

/// Eventos de reproducción para la capa de comandos
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlaybackEvent {
    NowPlaying { title: String },
    TrackSkipped { title: String },
    TrackFailed { title: String, reason: String },
    QueueFinished,
}

/// Handle del driver en ejecución: canal de señales + tarea
pub struct DriverHandle {
    pub signals: mpsc::UnboundedSender<DriverSignal>,
    pub task: JoinHandle<()>,
}

enum StepOutcome {
    Advance,
    Halt,
}

/// Driver de reproducción: una tarea por guild que desencola, descarga y
/// reproduce exactamente un track a la vez. El archivo descargado se libera
/// en un único punto, en todos los caminos de salida
pub struct PlaybackDriver {
    guild_id: GuildId,
    queue: Arc<RwLock<MusicQueue>>,
    fetcher: Arc<dyn AudioFetcher>,
    sink: Arc<dyn VoiceSink>,
    signals: mpsc::UnboundedReceiver<DriverSignal>,
    events: mpsc::UnboundedSender<(GuildId, PlaybackEvent)>,
    slot: Arc<Mutex<Option<DriverHandle>>>,
    state: DriverState,
}

impl PlaybackDriver {
    /// Lanza el driver como tarea independiente y devuelve su handle. `slot`
    /// es la celda donde el dueño guarda ese handle; el driver la limpia al
    /// terminar por cola vacía, coordinando su salida con el arranque para
    /// que un enqueue simultáneo nunca se pierda
    pub fn spawn(
        guild_id: GuildId,
        queue: Arc<RwLock<MusicQueue>>,
        fetcher: Arc<dyn AudioFetcher>,
        sink: Arc<dyn VoiceSink>,
        events: mpsc::UnboundedSender<(GuildId, PlaybackEvent)>,
        slot: Arc<Mutex<Option<DriverHandle>>>,
    ) -> DriverHandle {
        let (tx, rx) = mpsc::unbounded_channel();

        let driver = Self {
            guild_id,
            queue,
            fetcher,
            sink,
            signals: rx,
            events,
            slot,
            state: DriverState::Idle,
        };

        let task = tokio::spawn(driver.run());

        DriverHandle { signals: tx, task }
    }

    async fn run(mut self) {
        info!("▶️ Driver iniciado para guild {}", self.guild_id);

        loop {
            self.set_state(DriverState::Idle);

            let next = self.queue.write().next_track();
            let Some(track) = next else {
                // Cola vacía: recomprobar bajo el lock del slot, porque un
                // enqueue concurrente pudo llegar entre el chequeo y la salida
                let mut slot = self.slot.lock();
                if self.queue.read().is_empty() {
                    *slot = None;
                    drop(slot);
                    self.send_event(PlaybackEvent::QueueFinished);
                    break;
                }
                continue;
            };

            match self.play_one(track).await {
                StepOutcome::Advance => continue,
                StepOutcome::Halt => break,
            }
        }

        self.set_state(DriverState::Stopped);
        info!("⏹️ Driver detenido para guild {}", self.guild_id);
    }

    /// Descarga y reproduce un track. Liberación del archivo garantizada:
    /// ocurre en el único punto de Advancing, y Drop cubre cualquier pánico
    async fn play_one(&mut self, track: ResolvedTrack) -> StepOutcome {
        let title = track.title().to_string();

        // Fetching: descarga cancelable por skip/stop
        self.set_state(DriverState::Fetching);
        let cancel = CancellationToken::new();
        let fetcher = self.fetcher.clone();
        let fetch = fetcher.fetch(&track, cancel.clone());
        tokio::pin!(fetch);

        let fetched = tokio::select! {
            sig = self.signals.recv() => {
                cancel.cancel();
                // El fetcher borra sus parciales antes de devolver
                let _ = fetch.as_mut().await;
                self.set_state(DriverState::Advancing);
                return self.apply_signal(sig, &title);
            }
            res = fetch.as_mut() => res,
        };

        let downloaded = match fetched {
            Ok(downloaded) => downloaded,
            Err(e) => {
                // DownloadError: reportar y avanzar sin reintentos
                warn!("❌ Descarga fallida de {}: {}", title, e);
                self.send_event(PlaybackEvent::TrackFailed {
                    title,
                    reason: e.to_string(),
                });
                self.set_state(DriverState::Advancing);
                return StepOutcome::Advance;
            }
        };

        // Playing: stream cancelable por skip/stop
        self.set_state(DriverState::Playing);
        self.send_event(PlaybackEvent::NowPlaying {
            title: title.clone(),
        });

        let outcome = {
            let cancel = CancellationToken::new();
            let sink = self.sink.clone();
            let stream = sink.stream(downloaded.path(), cancel.clone());
            tokio::pin!(stream);

            tokio::select! {
                sig = self.signals.recv() => {
                    cancel.cancel();
                    let _ = stream.as_mut().await;
                    self.apply_signal(sig, &title)
                }
                res = stream.as_mut() => {
                    if let Err(e) = res {
                        // StreamingError: se reporta pero avanza como fin natural
                        warn!("❌ Error de streaming en {}: {}", title, e);
                        self.send_event(PlaybackEvent::TrackFailed {
                            title,
                            reason: e.to_string(),
                        });
                    } else {
                        debug!("🎵 Fin de stream: {}", title);
                    }
                    StepOutcome::Advance
                }
            }
        };

        // Advancing: único punto de liberación del archivo
        self.set_state(DriverState::Advancing);
        downloaded.release();
        outcome
    }

    fn set_state(&mut self, next: DriverState) {
        debug!(
            "Driver guild {}: {:?} -> {:?}",
            self.guild_id, self.state, next
        );
        self.state = next;
    }

    fn apply_signal(&mut self, signal: Option<DriverSignal>, title: &str) -> StepOutcome {
        match signal {
            Some(DriverSignal::Skip) => {
                info!("⏭️ Track saltado: {}", title);
                self.send_event(PlaybackEvent::TrackSkipped {
                    title: title.to_string(),
                });
                StepOutcome::Advance
            }
            // Canal cerrado equivale a stop: la sesión del guild ya no existe
            Some(DriverSignal::Stop) | None => StepOutcome::Halt,
        }
    }

    fn send_event(&self, event: PlaybackEvent) {
        let _ = self.events.send((self.guild_id, event));
    }
}
