//! # Audio Module
//!
//! Motor de cola y reproducción por servidor para Open Jukebox.
//!
//! El flujo por guild es estrictamente secuencial: un solo track en
//! `Fetching` o `Playing` a la vez, sin prefetch del siguiente.
//!
//! ## Componentes
//!
//! ### [`queue`] - Cola pendiente
//! - Secuencia FIFO de tracks resueltos, acotada en tamaño
//! - Las playlists se insertan contiguas en orden de playlist
//!
//! ### [`fetcher`] - Descargas
//! - Descarga el audio de un track a un archivo único en el scratch
//! - Cancelable: mata el proceso y borra los parciales
//!
//! ### [`store`] - Ciclo de vida en disco
//! - Cada descarga se libera exactamente una vez, en todos los caminos
//!   de salida (fin natural, skip, error, shutdown)
//!
//! ### [`driver`] - Máquina de estados de reproducción
//! - Una tarea por guild: Idle → Fetching → Playing → Advancing
//! - Señales de skip/stop aplicadas en el siguiente punto seguro
//!
//! ### [`engine`] - Fachada
//! - join/play/skip/list/clear/leave enrutados por guild
//!
//! ### [`sink`] - Salida de voz
//! - Abstracción sobre songbird para reproducir el archivo descargado

pub mod driver;
pub mod engine;
pub mod fetcher;
pub mod queue;
pub mod sink;
pub mod store;
