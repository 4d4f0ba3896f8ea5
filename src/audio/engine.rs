use anyhow::Result;
use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use serenity::model::id::{GuildId, UserId};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use super::driver::{DriverHandle, DriverSignal, PlaybackDriver, PlaybackEvent};
use super::fetcher::AudioFetcher;
use super::queue::MusicQueue;
use super::sink::VoiceSink;
use crate::error::MusicError;
use crate::sources::{MediaResolver, TrackRequest};

/// Estado por guild: cola pendiente, sink de voz y driver en ejecución.
/// Propiedad exclusiva de su guild, sin bloqueos entre guilds
struct GuildSession {
    guild_id: GuildId,
    queue: Arc<RwLock<MusicQueue>>,
    sink: Arc<dyn VoiceSink>,
    driver: Arc<Mutex<Option<DriverHandle>>>,
    /// Corta los drenajes de playlist en curso; `clear` y `leave` lo cancelan
    drain: Mutex<CancellationToken>,
}

/// Fachada del motor de cola: enruta cada operación a la sesión del guild.
/// Toda operación salvo `join` falla con NotConnected si no hay sesión
pub struct QueueEngine {
    resolver: Arc<dyn MediaResolver>,
    fetcher: Arc<dyn AudioFetcher>,
    sessions: DashMap<GuildId, Arc<GuildSession>>,
    events: mpsc::UnboundedSender<(GuildId, PlaybackEvent)>,
    max_queue_size: usize,
    max_playlist_size: usize,
}

impl QueueEngine {
    pub fn new(
        resolver: Arc<dyn MediaResolver>,
        fetcher: Arc<dyn AudioFetcher>,
        max_queue_size: usize,
        max_playlist_size: usize,
    ) -> (Self, mpsc::UnboundedReceiver<(GuildId, PlaybackEvent)>) {
        let (events, rx) = mpsc::unbounded_channel();

        let engine = Self {
            resolver,
            fetcher,
            sessions: DashMap::new(),
            events,
            max_queue_size,
            max_playlist_size,
        };

        (engine, rx)
    }

    /// Registra la sesión de voz de un guild
    pub fn join(&self, guild_id: GuildId, sink: Arc<dyn VoiceSink>) -> Result<String> {
        if self.sessions.contains_key(&guild_id) {
            return Ok("Ya estoy conectado a un canal de voz".to_string());
        }

        let session = Arc::new(GuildSession {
            guild_id,
            queue: Arc::new(RwLock::new(MusicQueue::new(self.max_queue_size))),
            sink,
            driver: Arc::new(Mutex::new(None)),
            drain: Mutex::new(CancellationToken::new()),
        });
        self.sessions.insert(guild_id, session);

        info!("🔊 Sesión de voz registrada para guild {}", guild_id);
        Ok("Conectado al canal de voz".to_string())
    }

    /// Resuelve una URL y encola sus tracks. Devuelve tras confirmar la
    /// primera entrada; el resto de la playlist se encola en segundo plano
    pub async fn play(
        &self,
        guild_id: GuildId,
        source_url: &str,
        requested_by: UserId,
    ) -> Result<String> {
        let session = self.session(guild_id)?;

        let request = TrackRequest {
            source_url: source_url.to_string(),
            requested_by,
            guild_id,
        };

        let mut rx = self.resolver.resolve(&request).await?;

        let first = match rx.recv().await {
            Some(Ok(track)) => track,
            Some(Err(e)) => return Err(e.into()),
            None => {
                return Err(MusicError::Resolution(format!(
                    "no se encontró ningún video en {}",
                    source_url
                ))
                .into())
            }
        };

        let title = first.title().to_string();
        session.queue.write().add_track(first)?;
        self.ensure_driver(&session);

        // Drenar el resto de la playlist sin bloquear al llamador. El token
        // de drenaje lo corta cuando llega un clear o un leave
        let queue = session.queue.clone();
        let cancel = session.drain.lock().clone();
        let cap = self.max_playlist_size.saturating_sub(1);
        tokio::spawn(async move {
            let mut added = 0usize;
            loop {
                let item = tokio::select! {
                    _ = cancel.cancelled() => break,
                    item = rx.recv() => match item {
                        Some(item) => item,
                        None => break,
                    },
                };
                match item {
                    Ok(track) => {
                        if added >= cap {
                            warn!("⚠️ Playlist truncada a {} entradas", cap + 1);
                            break;
                        }
                        // Recomprobar bajo el lock de la cola: si el clear
                        // canceló antes de este punto se observa aquí; si
                        // cancela después, su clear() barre esta entrada
                        let mut pending = queue.write();
                        if cancel.is_cancelled() {
                            break;
                        }
                        if let Err(e) = pending.add_track(track) {
                            warn!("⚠️ Playlist interrumpida: {}", e);
                            break;
                        }
                        added += 1;
                    }
                    Err(e) => {
                        warn!("⚠️ Entrada de playlist inválida: {}", e);
                    }
                }
            }
        });

        Ok(format!("🎵 En cola: **{}**", title))
    }

    /// Salta el track actual (descarga o stream en curso)
    pub fn skip(&self, guild_id: GuildId) -> Result<String> {
        let session = self.session(guild_id)?;

        let driver = session.driver.lock();
        match driver.as_ref() {
            Some(handle) if !handle.task.is_finished() => {
                let _ = handle.signals.send(DriverSignal::Skip);
                Ok("⏭️ Saltando el track actual".to_string())
            }
            _ => Ok("No hay nada reproduciéndose".to_string()),
        }
    }

    /// Snapshot ordenado de la cola pendiente: (título, solicitante)
    pub fn list(&self, guild_id: GuildId) -> Result<Vec<(String, UserId)>> {
        let session = self.session(guild_id)?;
        let snapshot = session.queue.read().snapshot();
        Ok(snapshot)
    }

    /// Vacía la cola pendiente sin tocar el track en reproducción. También
    /// corta los drenajes de playlist en curso: ninguna entrada todavía por
    /// resolver sobrevive al clear
    pub fn clear(&self, guild_id: GuildId) -> Result<String> {
        let session = self.session(guild_id)?;

        {
            let mut drain = session.drain.lock();
            drain.cancel();
            *drain = CancellationToken::new();
        }

        let cleared = session.queue.write().clear();
        Ok(format!("🗑️ Cola limpiada: {} tracks removidos", cleared))
    }

    /// Destruye la sesión del guild: detiene el driver, espera la liberación
    /// del archivo en curso y desconecta la voz
    pub async fn leave(&self, guild_id: GuildId) -> Result<String> {
        let (_, session) = self
            .sessions
            .remove(&guild_id)
            .ok_or(MusicError::NotConnected)?;

        // Cortar los drenajes de playlist; al morir el receptor, el
        // resolutor mata su proceso hijo
        session.drain.lock().cancel();

        let handle = session.driver.lock().take();
        if let Some(handle) = handle {
            let _ = handle.signals.send(DriverSignal::Stop);
            if let Err(e) = handle.task.await {
                error!("Error esperando al driver de guild {}: {}", guild_id, e);
            }
        }

        session.queue.write().clear();
        session.sink.disconnect().await?;

        info!("👋 Sesión destruida para guild {}", guild_id);
        Ok("Desconectado del canal de voz".to_string())
    }

    /// Indica si el guild tiene sesión de voz activa
    pub fn is_connected(&self, guild_id: GuildId) -> bool {
        self.sessions.contains_key(&guild_id)
    }

    fn session(&self, guild_id: GuildId) -> Result<Arc<GuildSession>, MusicError> {
        self.sessions
            .get(&guild_id)
            .map(|s| s.clone())
            .ok_or(MusicError::NotConnected)
    }

    /// Arranca el driver del guild si no hay uno en ejecución. Un driver
    /// saliendo por cola vacía recomprueba la cola bajo este mismo lock, así
    /// que un enqueue nunca queda huérfano entre su salida y este chequeo
    fn ensure_driver(&self, session: &Arc<GuildSession>) {
        let mut driver = session.driver.lock();

        let running = driver
            .as_ref()
            .is_some_and(|handle| !handle.task.is_finished());
        if running {
            return;
        }

        *driver = Some(PlaybackDriver::spawn(
            session.guild_id,
            session.queue.clone(),
            self.fetcher.clone(),
            session.sink.clone(),
            self.events.clone(),
            session.driver.clone(),
        ));
    }
}
