//! # Bot Module
//!
//! Capa de comandos de Open Jukebox: parseo de comandos con prefijo,
//! conexión al canal de voz del usuario y relevo de eventos de
//! reproducción al canal de texto. Todo el trabajo real vive en
//! [`crate::audio::engine::QueueEngine`]; esta capa solo traduce.

use dashmap::DashMap;
use serenity::{
    all::{
        ChannelId, ChannelType, Context, EventHandler, Guild, GuildId, Message, Ready, VoiceState,
    },
    async_trait,
};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use crate::audio::driver::PlaybackEvent;
use crate::audio::engine::QueueEngine;
use crate::audio::sink::SongbirdSink;
use crate::config::Config;
use crate::error::MusicError;

/// Límite práctico por mensaje de Discord al listar la cola
const QUEUE_MESSAGE_LIMIT: usize = 1900;

pub struct JukeboxBot {
    config: Arc<Config>,
    engine: Arc<QueueEngine>,
    /// Canal de texto donde se anuncian los eventos de cada guild
    text_channels: Arc<DashMap<GuildId, ChannelId>>,
    /// Receptor de eventos de reproducción, consumido una vez en `ready`
    playback_events: parking_lot::Mutex<Option<mpsc::UnboundedReceiver<(GuildId, PlaybackEvent)>>>,
}

impl JukeboxBot {
    pub fn new(
        config: Arc<Config>,
        engine: Arc<QueueEngine>,
        playback_events: mpsc::UnboundedReceiver<(GuildId, PlaybackEvent)>,
    ) -> Self {
        Self {
            config,
            engine,
            text_channels: Arc::new(DashMap::new()),
            playback_events: parking_lot::Mutex::new(Some(playback_events)),
        }
    }

    /// Busca el canal de voz donde está el autor del mensaje
    fn voice_channel_of(&self, ctx: &Context, guild_id: GuildId, msg: &Message) -> Option<ChannelId> {
        let guild = ctx.cache.guild(guild_id)?;
        guild
            .voice_states
            .get(&msg.author.id)
            .and_then(|vs| vs.channel_id)
    }

    /// Conecta al canal de voz del usuario y registra la sesión en el motor
    async fn cmd_join(&self, ctx: &Context, msg: &Message, guild_id: GuildId) -> String {
        let Some(channel_id) = self.voice_channel_of(ctx, guild_id, msg) else {
            return "No estás conectado a un canal de voz".to_string();
        };

        let manager = match songbird::get(ctx).await {
            Some(manager) => manager,
            None => {
                error!("Songbird no inicializado");
                return "Error interno del bot".to_string();
            }
        };

        match manager.join(guild_id, channel_id).await {
            Ok(call) => {
                info!("🔊 Conectado al canal de voz en guild {}", guild_id);
                let sink = Arc::new(SongbirdSink::new(call));
                match self.engine.join(guild_id, sink) {
                    Ok(status) => status,
                    Err(e) => user_message(&e),
                }
            }
            Err(e) => {
                error!("Error al conectar al canal de voz: {:?}", e);
                "No pude conectarme al canal de voz".to_string()
            }
        }
    }

    async fn cmd_leave(&self, ctx: &Context, guild_id: GuildId) -> String {
        let result = self.engine.leave(guild_id).await;

        // Soltar también la llamada de songbird, pase lo que pase en el motor
        if let Some(manager) = songbird::get(ctx).await {
            if let Err(e) = manager.remove(guild_id).await {
                warn!("Error al remover llamada de songbird: {:?}", e);
            }
        }
        self.text_channels.remove(&guild_id);

        match result {
            Ok(status) => status,
            Err(e) => user_message(&e),
        }
    }

    fn format_queue(&self, pending: Vec<(String, serenity::model::id::UserId)>) -> String {
        if pending.is_empty() {
            return "La cola está vacía".to_string();
        }

        let total = pending.len();
        let mut lines = Vec::new();
        let mut used = 0usize;

        for (i, (title, _)) in pending.into_iter().enumerate() {
            let line = format!("{}. {}", i + 1, title);
            if used + line.len() > QUEUE_MESSAGE_LIMIT {
                lines.push(format!("...y {} más.", total - i));
                break;
            }
            used += line.len();
            lines.push(line);
        }

        format!("**Cola:**\n{}", lines.join("\n"))
    }

    async fn dispatch(&self, ctx: &Context, msg: &Message, command: &str, arg: Option<&str>) -> String {
        let Some(guild_id) = msg.guild_id else {
            return "Este comando solo funciona en un servidor".to_string();
        };

        // Los anuncios del guild van al canal del último comando
        self.text_channels.insert(guild_id, msg.channel_id);

        match command {
            "join" => self.cmd_join(ctx, msg, guild_id).await,
            "play" => match arg {
                Some(url) => match self.engine.play(guild_id, url, msg.author.id).await {
                    Ok(status) => status,
                    Err(e) => user_message(&e),
                },
                None => "Uso: play <url>".to_string(),
            },
            "skip" => match self.engine.skip(guild_id) {
                Ok(status) => status,
                Err(e) => user_message(&e),
            },
            "queue" => match self.engine.list(guild_id) {
                Ok(pending) => self.format_queue(pending),
                Err(e) => user_message(&e),
            },
            "clear" => match self.engine.clear(guild_id) {
                Ok(status) => status,
                Err(e) => user_message(&e),
            },
            "leave" => self.cmd_leave(ctx, guild_id).await,
            _ => return String::new(),
        }
    }
}

/// Elige dónde saludar al entrar a un servidor: el canal de sistema si
/// existe, o el primer canal de texto (por posición) donde el bot puede
/// escribir. `candidates` es (canal, posición, puede escribir)
fn welcome_channel(
    system_channel: Option<ChannelId>,
    mut candidates: Vec<(ChannelId, u16, bool)>,
) -> Option<ChannelId> {
    if system_channel.is_some() {
        return system_channel;
    }

    candidates.sort_by_key(|(_, position, _)| *position);
    candidates
        .into_iter()
        .find(|(_, _, writable)| *writable)
        .map(|(id, _, _)| id)
}

/// Mensaje de chat para un error del motor
fn user_message(error: &anyhow::Error) -> String {
    match error.downcast_ref::<MusicError>() {
        Some(e) => format!("❌ {}", e),
        None => {
            error!("Error inesperado: {:?}", error);
            "❌ Algo salió mal, intenta de nuevo".to_string()
        }
    }
}

#[async_trait]
impl EventHandler for JukeboxBot {
    async fn ready(&self, ctx: Context, ready: Ready) {
        info!("🤖 {} está en línea!", ready.user.name);
        info!("📊 Conectado a {} servidores", ready.guilds.len());

        // Relevar eventos de reproducción al canal de texto de cada guild
        let Some(mut events) = self.playback_events.lock().take() else {
            return;
        };
        let http = ctx.http.clone();
        let text_channels = self.text_channels.clone();

        tokio::spawn(async move {
            while let Some((guild_id, event)) = events.recv().await {
                let announcement = match event {
                    PlaybackEvent::NowPlaying { title } => {
                        format!("▶️ Reproduciendo: **{}**", title)
                    }
                    PlaybackEvent::TrackSkipped { title } => {
                        format!("⏭️ Saltado: **{}**", title)
                    }
                    PlaybackEvent::TrackFailed { title, reason } => {
                        format!("❌ Falló **{}**: {}", title, reason)
                    }
                    PlaybackEvent::QueueFinished => "📭 Cola terminada".to_string(),
                };

                // Copiar el id fuera del guard antes de await
                let channel = text_channels.get(&guild_id).map(|c| *c);
                if let Some(channel) = channel {
                    if let Err(e) = channel.say(&http, announcement).await {
                        warn!("Error anunciando en guild {}: {:?}", guild_id, e);
                    }
                }
            }
        });
    }

    /// Saluda al entrar a un servidor nuevo
    async fn guild_create(&self, ctx: Context, guild: Guild, is_new: Option<bool>) {
        if is_new != Some(true) {
            return;
        }

        info!("🎉 Nuevo servidor: {} ({})", guild.name, guild.id);

        let bot_id = ctx.cache.current_user().id;
        let member = guild.members.get(&bot_id);
        let candidates = guild
            .channels
            .values()
            .filter(|c| c.kind == ChannelType::Text)
            .map(|c| {
                let writable = member
                    .map(|m| guild.user_permissions_in(c, m).send_messages())
                    .unwrap_or(false);
                (c.id, c.position, writable)
            })
            .collect();

        let Some(channel) = welcome_channel(guild.system_channel_id, candidates) else {
            warn!("⚠️ Sin canal donde saludar en {}", guild.name);
            return;
        };

        let greeting = format!(
            "👋 ¡Hola! Soy Open Jukebox. Usa `{}play <url>` para poner música.",
            self.config.command_prefix
        );
        if let Err(e) = channel.say(&ctx.http, greeting).await {
            warn!("Error enviando bienvenida en {}: {:?}", guild.name, e);
        }
    }

    async fn message(&self, ctx: Context, msg: Message) {
        if msg.author.bot {
            return;
        }

        let Some(rest) = msg.content.strip_prefix(self.config.command_prefix.as_str()) else {
            return;
        };

        let mut parts = rest.trim().splitn(2, char::is_whitespace);
        let command = match parts.next() {
            Some(c) if !c.is_empty() => c.to_lowercase(),
            _ => return,
        };
        let arg = parts.next().map(str::trim).filter(|a| !a.is_empty());

        let reply = self.dispatch(&ctx, &msg, &command, arg).await;
        if reply.is_empty() {
            return;
        }

        if let Err(e) = msg.channel_id.say(&ctx.http, reply).await {
            error!("Error enviando respuesta: {:?}", e);
        }
    }

    /// Limpieza cuando el bot es desconectado del canal de voz a la fuerza
    async fn voice_state_update(&self, ctx: Context, old: Option<VoiceState>, new: VoiceState) {
        let current_user_id = ctx.cache.current_user().id;
        if new.user_id != current_user_id {
            return;
        }

        if old.is_some() && new.channel_id.is_none() {
            if let Some(guild_id) = new.guild_id {
                info!("🔌 Bot desconectado en guild {}", guild_id);
                if self.engine.is_connected(guild_id) {
                    if let Err(e) = self.engine.leave(guild_id).await {
                        error!("Error limpiando sesión de guild {}: {:?}", guild_id, e);
                    }
                }
                self.text_channels.remove(&guild_id);
            }
        }
    }
}
