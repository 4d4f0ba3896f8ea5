use anyhow::Result;
use chrono::{DateTime, Utc};
use serenity::model::id::UserId;
use std::collections::VecDeque;
use tracing::{debug, info};

use crate::sources::ResolvedTrack;

/// Entrada pendiente de la cola
#[derive(Debug, Clone)]
pub struct QueueItem {
    pub track: ResolvedTrack,
    #[allow(dead_code)]
    pub added_at: DateTime<Utc>,
}

impl From<ResolvedTrack> for QueueItem {
    fn from(track: ResolvedTrack) -> Self {
        Self {
            track,
            added_at: Utc::now(),
        }
    }
}

/// Cola pendiente de un guild: estricta FIFO, sin el track en reproducción.
/// El track actual vive en el driver desde el momento en que se desencola
#[derive(Debug)]
pub struct MusicQueue {
    items: VecDeque<QueueItem>,
    max_size: usize,
}

impl MusicQueue {
    pub fn new(max_size: usize) -> Self {
        Self {
            items: VecDeque::new(),
            max_size,
        }
    }

    /// Agrega un track al final de la cola
    pub fn add_track(&mut self, track: ResolvedTrack) -> Result<()> {
        if self.items.len() >= self.max_size {
            anyhow::bail!("La cola está llena (máximo {} canciones)", self.max_size);
        }

        info!("➕ Agregado a la cola: {}", track.title());
        self.items.push_back(QueueItem::from(track));

        Ok(())
    }

    /// Desencola el siguiente track en orden FIFO
    pub fn next_track(&mut self) -> Option<ResolvedTrack> {
        let item = self.items.pop_front();
        if let Some(ref item) = item {
            debug!("➡️ Siguiente en cola (FIFO): {}", item.track.title());
        }
        item.map(|i| i.track)
    }

    /// Vacía la cola pendiente; no toca el track en reproducción
    pub fn clear(&mut self) -> usize {
        let cleared = self.items.len();
        self.items.clear();
        if cleared > 0 {
            info!("🗑️ Cola limpiada: {} tracks removidos", cleared);
        }
        cleared
    }

    /// Snapshot ordenado de (título, solicitante) sin mutar la cola
    pub fn snapshot(&self) -> Vec<(String, UserId)> {
        self.items
            .iter()
            .map(|item| (item.track.title().to_string(), item.track.requested_by()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn track(title: &str) -> ResolvedTrack {
        ResolvedTrack::new(
            title.to_string(),
            format!("https://example.com/{title}"),
            UserId::new(1),
        )
    }

    #[test]
    fn test_fifo_order() {
        let mut queue = MusicQueue::new(10);
        queue.add_track(track("uno")).unwrap();
        queue.add_track(track("dos")).unwrap();
        queue.add_track(track("tres")).unwrap();

        assert_eq!(queue.next_track().unwrap().title(), "uno");
        assert_eq!(queue.next_track().unwrap().title(), "dos");
        assert_eq!(queue.next_track().unwrap().title(), "tres");
        assert!(queue.next_track().is_none());
    }

    #[test]
    fn test_playlist_entries_stay_contiguous() {
        // play(A) seguido de play(B = playlist de 2) → [A, B1, B2]
        let mut queue = MusicQueue::new(10);
        queue.add_track(track("A")).unwrap();
        queue.add_track(track("B1")).unwrap();
        queue.add_track(track("B2")).unwrap();

        let titles: Vec<String> = queue.snapshot().into_iter().map(|(t, _)| t).collect();
        assert_eq!(titles, vec!["A", "B1", "B2"]);
    }

    #[test]
    fn test_snapshot_does_not_mutate() {
        let mut queue = MusicQueue::new(10);
        queue.add_track(track("uno")).unwrap();

        let _ = queue.snapshot();
        let _ = queue.snapshot();
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn test_clear_reports_count() {
        let mut queue = MusicQueue::new(10);
        queue.add_track(track("uno")).unwrap();
        queue.add_track(track("dos")).unwrap();

        assert_eq!(queue.clear(), 2);
        assert!(queue.is_empty());
        assert_eq!(queue.clear(), 0);
    }

    #[test]
    fn test_bounded_size() {
        let mut queue = MusicQueue::new(2);
        queue.add_track(track("uno")).unwrap();
        queue.add_track(track("dos")).unwrap();
        assert!(queue.add_track(track("tres")).is_err());
        assert_eq!(queue.len(), 2);
    }
}
