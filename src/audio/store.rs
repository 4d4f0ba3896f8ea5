use anyhow::Result;
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, info, warn};

use crate::sources::ResolvedTrack;

/// Directorio scratch compartido por las descargas de todos los guilds.
/// Los nombres de archivo se generan aquí y nunca colisionan entre
/// descargas concurrentes
#[derive(Debug)]
pub struct ScratchDir {
    root: PathBuf,
    counter: AtomicU64,
}

impl ScratchDir {
    pub fn new(root: PathBuf) -> Result<Self> {
        std::fs::create_dir_all(&root)?;
        Ok(Self {
            root,
            counter: AtomicU64::new(0),
        })
    }

    pub fn path(&self) -> &Path {
        &self.root
    }

    /// Genera un prefijo de archivo único: contador monotónico + sufijo
    /// aleatorio. Nunca derivado del título
    pub fn unique_stem(&self) -> String {
        let n = self.counter.fetch_add(1, Ordering::Relaxed);
        format!("track-{:012x}-{:04x}", n, fastrand::u16(..))
    }

    /// Borra todo archivo (final o parcial) que empiece con el prefijo dado
    pub fn remove_by_stem(&self, stem: &str) -> Result<usize> {
        let mut removed = 0;
        for entry in std::fs::read_dir(&self.root)? {
            let entry = entry?;
            let name = entry.file_name();
            if name.to_string_lossy().starts_with(stem) {
                std::fs::remove_file(entry.path())?;
                removed += 1;
            }
        }
        Ok(removed)
    }

    /// Busca el archivo final (no `.part`) de una descarga por su prefijo
    pub fn find_output(&self, stem: &str) -> Result<Option<PathBuf>> {
        for entry in std::fs::read_dir(&self.root)? {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().to_string();
            if name.starts_with(stem) && !name.ends_with(".part") && !name.ends_with(".ytdl") {
                return Ok(Some(entry.path()));
            }
        }
        Ok(None)
    }

    /// Barre restos de ejecuciones anteriores; se invoca al arrancar y al apagar
    pub fn sweep(&self) -> Result<usize> {
        let mut removed = 0;
        for entry in std::fs::read_dir(&self.root)? {
            let entry = entry?;
            if entry.file_type()?.is_file() {
                std::fs::remove_file(entry.path())?;
                removed += 1;
            }
        }
        if removed > 0 {
            info!("🧹 Scratch barrido: {} archivos eliminados", removed);
        }
        Ok(removed)
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(std::fs::read_dir(&self.root)?.next().is_none())
    }
}

/// Un archivo de audio descargado. Es el dueño exclusivo del archivo en
/// disco: `release` lo borra exactamente una vez y `Drop` actúa de red de
/// seguridad si algún camino de salida no llegó a liberarlo
#[derive(Debug)]
pub struct DownloadedTrack {
    track: ResolvedTrack,
    path: PathBuf,
    size_bytes: u64,
    downloaded_at: DateTime<Utc>,
    released: bool,
}

impl DownloadedTrack {
    pub fn new(track: ResolvedTrack, path: PathBuf, size_bytes: u64) -> Self {
        Self {
            track,
            path,
            size_bytes,
            downloaded_at: Utc::now(),
            released: false,
        }
    }

    pub fn track(&self) -> &ResolvedTrack {
        &self.track
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    #[allow(dead_code)]
    pub fn size_bytes(&self) -> u64 {
        self.size_bytes
    }

    #[allow(dead_code)]
    pub fn downloaded_at(&self) -> DateTime<Utc> {
        self.downloaded_at
    }

    /// Libera el archivo en disco. Consumir self garantiza una sola liberación
    pub fn release(mut self) {
        self.delete_file();
        self.released = true;
    }

    fn delete_file(&self) {
        match std::fs::remove_file(&self.path) {
            Ok(()) => debug!("🗑️ Archivo liberado: {}", self.path.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!("Error al borrar {}: {}", self.path.display(), e),
        }
    }
}

impl Drop for DownloadedTrack {
    fn drop(&mut self) {
        if !self.released {
            warn!(
                "⚠️ Descarga liberada en Drop (camino de salida sin release explícito): {}",
                self.path.display()
            );
            self.delete_file();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serenity::model::id::UserId;

    fn track() -> ResolvedTrack {
        ResolvedTrack::new(
            "test".to_string(),
            "https://example.com/v".to_string(),
            UserId::new(1),
        )
    }

    #[test]
    fn test_unique_stems_do_not_collide() {
        let dir = tempfile::tempdir().unwrap();
        let scratch = ScratchDir::new(dir.path().to_path_buf()).unwrap();

        let mut stems = std::collections::HashSet::new();
        for _ in 0..1000 {
            assert!(stems.insert(scratch.unique_stem()));
        }
    }

    #[test]
    fn test_release_deletes_file_once() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("track-0.webm");
        std::fs::write(&path, b"audio").unwrap();

        let downloaded = DownloadedTrack::new(track(), path.clone(), 5);
        assert!(path.exists());
        downloaded.release();
        assert!(!path.exists());
    }

    #[test]
    fn test_drop_is_a_release_backstop() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("track-1.webm");
        std::fs::write(&path, b"audio").unwrap();

        {
            let _downloaded = DownloadedTrack::new(track(), path.clone(), 5);
        }
        assert!(!path.exists());
    }

    #[test]
    fn test_remove_by_stem_cleans_partials() {
        let dir = tempfile::tempdir().unwrap();
        let scratch = ScratchDir::new(dir.path().to_path_buf()).unwrap();
        let stem = scratch.unique_stem();

        std::fs::write(dir.path().join(format!("{stem}.webm.part")), b"x").unwrap();
        std::fs::write(dir.path().join(format!("{stem}.webm")), b"x").unwrap();
        std::fs::write(dir.path().join("otro.webm"), b"x").unwrap();

        assert_eq!(scratch.remove_by_stem(&stem).unwrap(), 2);
        assert!(dir.path().join("otro.webm").exists());
    }

    #[test]
    fn test_find_output_skips_partials() {
        let dir = tempfile::tempdir().unwrap();
        let scratch = ScratchDir::new(dir.path().to_path_buf()).unwrap();
        let stem = scratch.unique_stem();

        std::fs::write(dir.path().join(format!("{stem}.webm.part")), b"x").unwrap();
        assert!(scratch.find_output(&stem).unwrap().is_none());

        std::fs::write(dir.path().join(format!("{stem}.webm")), b"x").unwrap();
        let found = scratch.find_output(&stem).unwrap().unwrap();
        assert!(found.to_string_lossy().ends_with(".webm"));
    }

    #[test]
    fn test_sweep_empties_scratch() {
        let dir = tempfile::tempdir().unwrap();
        let scratch = ScratchDir::new(dir.path().to_path_buf()).unwrap();

        std::fs::write(dir.path().join("a.webm"), b"x").unwrap();
        std::fs::write(dir.path().join("b.webm.part"), b"x").unwrap();

        assert_eq!(scratch.sweep().unwrap(), 2);
        assert!(scratch.is_empty().unwrap());
    }
}
