use thiserror::Error;

/// Errores del motor de reproducción, mapeados a mensajes de chat por la capa de comandos
#[derive(Debug, Error)]
pub enum MusicError {
    /// URL malformada, inaccesible o sin contenido reproducible
    #[error("no se pudo resolver la URL: {0}")]
    Resolution(String),

    /// Fallo de red, disco o códec durante la descarga
    #[error("fallo al descargar el audio: {0}")]
    Download(String),

    /// Fallo al entregar el archivo al canal de voz
    #[error("fallo durante la reproducción: {0}")]
    Streaming(String),

    /// Operación sin sesión de voz activa en el servidor
    #[error("no hay sesión de voz activa en este servidor (usa join primero)")]
    NotConnected,
}
