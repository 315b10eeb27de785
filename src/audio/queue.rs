use rand::seq::SliceRandom;
use std::{collections::VecDeque, time::Duration};
use tracing::{debug, info};

use super::track::Track;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LoopMode {
    #[default]
    Off,
    Track,
    Queue,
}

/// Cola de reproducción de un guild.
///
/// Pertenece exclusivamente a su [`Player`](super::player::Player); nadie
/// fuera de él toca la secuencia interna.
#[derive(Debug, Default)]
pub struct MusicQueue {
    items: VecDeque<Track>,
    loop_mode: LoopMode,
    closed: bool,
}

impl MusicQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Agrega un track al final. Devuelve `false` si el player ya fue destruido.
    pub fn enqueue(&mut self, track: Track) -> bool {
        if self.closed {
            debug!("Cola cerrada, se descarta: {}", track);
            return false;
        }

        info!("➕ Agregado a la cola: {}", track);
        self.items.push_back(track);
        true
    }

    /// Obtiene el siguiente track (FIFO salvo los modos de loop).
    ///
    /// Con `LoopMode::Track` y un track actual se devuelve ese mismo track sin
    /// consumir la cola. Con `LoopMode::Queue` el track extraído vuelve al final.
    pub fn dequeue_next(&mut self, current: Option<&Track>) -> Option<Track> {
        if self.loop_mode == LoopMode::Track {
            if let Some(current) = current {
                debug!("🔂 Repitiendo track: {}", current);
                return Some(current.clone());
            }
        }

        let next = self.items.pop_front()?;

        if self.loop_mode == LoopMode::Queue {
            self.items.push_back(next.clone());
            debug!("🔁 Track agregado al final por loop de cola: {}", next);
        }

        Some(next)
    }

    /// Devuelve a la cabeza un track que el nodo no pudo reproducir.
    ///
    /// En `LoopMode::Track` no se reencola: sigue siendo el track actual.
    /// En `LoopMode::Queue` se quita la copia que `dequeue_next` dejó al final,
    /// aunque después se hayan agregado otros tracks detrás.
    pub fn requeue_front(&mut self, track: Track) -> bool {
        if self.closed {
            return false;
        }

        match self.loop_mode {
            LoopMode::Track => return false,
            LoopMode::Queue => {
                if let Some(index) = self.items.iter().rposition(|item| *item == track) {
                    self.items.remove(index);
                }
            }
            LoopMode::Off => {}
        }

        self.items.push_front(track);
        true
    }

    /// Elimina el track en `index`; `None` si el índice está fuera de rango
    pub fn remove_at(&mut self, index: usize) -> Option<Track> {
        let removed = self.items.remove(index);
        if removed.is_some() {
            debug!("❌ Track eliminado en posición {}", index);
        }
        removed
    }

    /// Inserta en `index`, acotado a los límites de la cola
    pub fn insert_at(&mut self, track: Track, index: usize) {
        let index = index.min(self.items.len());
        self.items.insert(index, track);
    }

    /// Mueve un track de posición. `false` si algún índice está fuera de rango.
    pub fn move_index(&mut self, from: usize, to: usize) -> bool {
        if from >= self.items.len() || to >= self.items.len() {
            return false;
        }

        if from != to {
            if let Some(item) = self.items.remove(from) {
                self.items.insert(to, item);
                debug!("📍 Track movido de posición {} a {}", from, to);
            }
        }
        true
    }

    /// Mezcla la cola
    pub fn shuffle(&mut self) {
        let mut rng = rand::thread_rng();
        self.items.make_contiguous().shuffle(&mut rng);
        info!("🔀 Cola mezclada");
    }

    /// Limpia la cola
    pub fn clear(&mut self) {
        self.items.clear();
        debug!("🗑️ Cola limpiada");
    }

    /// Cierra la cola; a partir de aquí `enqueue` falla
    pub fn close(&mut self) {
        self.closed = true;
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn loop_mode(&self) -> LoopMode {
        self.loop_mode
    }

    /// Cambia el modo de loop
    pub fn set_loop_mode(&mut self, mode: LoopMode) {
        self.loop_mode = mode;
        match mode {
            LoopMode::Off => info!("➡️ Repetición desactivada"),
            LoopMode::Track => info!("🔂 Repetir canción activado"),
            LoopMode::Queue => info!("🔁 Repetir cola activado"),
        }
    }

    pub fn get(&self, index: usize) -> Option<&Track> {
        self.items.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Track> {
        self.items.iter()
    }

    /// Copia de la secuencia actual
    pub fn snapshot(&self) -> Vec<Track> {
        self.items.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Duración total de lo que queda en cola (los streams cuentan como 0)
    pub fn total_duration(&self) -> Duration {
        self.items.iter().filter(|t| !t.is_stream()).map(Track::duration).sum()
    }
}
