use anyhow::Result;
use serenity::{model::gateway::GatewayIntents, Client};
use songbird::SerenityInit;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

mod audio;
mod bot;
mod config;
mod error;
mod sources;

use crate::audio::engine::QueueEngine;
use crate::audio::fetcher::YtDlpFetcher;
use crate::audio::store::ScratchDir;
use crate::bot::JukeboxBot;
use crate::config::Config;
use crate::sources::YtDlpResolver;

#[tokio::main]
async fn main() -> Result<()> {
    // Inicializar logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("open_jukebox=debug".parse()?)
                .add_directive("serenity=info".parse()?)
                .add_directive("songbird=info".parse()?),
        )
        .init();

    info!("🎵 Iniciando Open Jukebox v{}", env!("CARGO_PKG_VERSION"));

    // Cargar configuración
    let config = Arc::new(Config::load()?);
    info!("{}", config.summary());

    // Verificar dependencias críticas
    YtDlpResolver::verify_dependencies().await?;

    // Directorio de descargas temporales, barrido de restos de corridas previas
    let scratch = Arc::new(ScratchDir::new(config.scratch_dir.clone())?);
    match scratch.sweep() {
        Ok(0) => {}
        Ok(removed) => info!("🧹 Barridos {} archivos huérfanos de descargas", removed),
        Err(e) => warn!("⚠️ Error al barrer directorio de descargas: {}", e),
    }

    // Motor de cola
    let resolver = Arc::new(YtDlpResolver::new());
    let fetcher = Arc::new(YtDlpFetcher::new(
        scratch.clone(),
        Duration::from_secs(config.download_timeout_secs),
    ));
    let (engine, playback_events) = QueueEngine::new(
        resolver,
        fetcher,
        config.max_queue_size,
        config.max_playlist_size,
    );
    let engine = Arc::new(engine);

    // Configurar intents mínimos necesarios
    let intents = GatewayIntents::GUILDS
        | GatewayIntents::GUILD_VOICE_STATES
        | GatewayIntents::GUILD_MESSAGES
        | GatewayIntents::MESSAGE_CONTENT;

    // Crear handler del bot
    let handler = JukeboxBot::new(config.clone(), engine, playback_events);

    // Construir cliente
    let mut client = Client::builder(&config.discord_token, intents)
        .event_handler(handler)
        .register_songbird()
        .await?;

    // Manejar shutdown graceful: barrer descargas antes de salir
    let shutdown_scratch = scratch.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_err() {
            error!("Error al registrar Ctrl+C");
            return;
        }
        info!("⚠️ Señal de shutdown recibida, cerrando...");
        match shutdown_scratch.sweep() {
            Ok(removed) if removed > 0 => {
                info!("🧹 Barridos {} archivos de descargas al salir", removed)
            }
            Ok(_) => {}
            Err(e) => warn!("⚠️ Error al barrer descargas al salir: {}", e),
        }
        std::process::exit(0);
    });

    // Iniciar bot
    info!("🚀 Bot iniciado exitosamente");
    if let Err(why) = client.start().await {
        error!("Error al ejecutar cliente: {:?}", why);
    }

    Ok(())
}
