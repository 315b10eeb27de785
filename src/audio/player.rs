use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use serenity::model::id::{ChannelId, GuildId};
use std::{
    fmt,
    sync::{Arc, Weak},
};
use tracing::{debug, info, warn};

use crate::{
    audio::{
        queue::{LoopMode, MusicQueue},
        track::Track,
        voice::VoiceCredentialAccumulator,
    },
    error::{NodeError, Result},
    node::{
        events::{TrackEndReason, TrackEvent},
        models::PlayerPatch,
    },
};

/// Lo que un player necesita de su nodo: la sesión y el PATCH de players.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PlayerGateway: Send + Sync {
    /// Session id asignado por el handshake, si ya llegó
    fn session_id(&self) -> Option<String>;

    /// `PATCH /v4/sessions/{session}/players/{guild}`
    async fn update_player(
        &self,
        guild_id: GuildId,
        patch: &PlayerPatch,
        replace: bool,
    ) -> Result<Option<Value>>;

    /// Saca al player del registro del nodo
    fn release(&self, guild_id: GuildId);
}

#[derive(Debug, Clone)]
pub struct PlayerOptions {
    pub guild_id: GuildId,
    pub voice_channel: Option<ChannelId>,
    pub text_channel: Option<ChannelId>,
    pub volume: u16,
    pub mute: bool,
    pub deaf: bool,
}

impl PlayerOptions {
    pub fn new(guild_id: GuildId) -> Self {
        Self {
            guild_id,
            voice_channel: None,
            text_channel: None,
            volume: 100,
            mute: false,
            deaf: true,
        }
    }

    pub fn with_voice_channel(mut self, channel: ChannelId) -> Self {
        self.voice_channel = Some(channel);
        self
    }

    pub fn with_text_channel(mut self, channel: ChannelId) -> Self {
        self.text_channel = Some(channel);
        self
    }

    pub fn with_volume(mut self, volume: u16) -> Self {
        self.volume = volume.min(MAX_VOLUME);
        self
    }
}

pub const MAX_VOLUME: u16 = 1000;

/// Motivo por el que `play()` no hizo nada
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdleReason {
    Destroyed,
    QueueEmpty,
    NotConnected,
}

/// Resultado explícito de `play()`
#[derive(Debug)]
pub enum PlayOutcome {
    Started(Track),
    Idle(IdleReason),
    Failed { reason: NodeError, requeued: bool },
}

impl PlayOutcome {
    pub fn is_started(&self) -> bool {
        matches!(self, PlayOutcome::Started(_))
    }
}

/// Copia del estado de un player para mostrarlo o inspeccionarlo
#[derive(Debug, Clone)]
pub struct PlayerSnapshot {
    pub guild_id: GuildId,
    pub voice_channel: Option<ChannelId>,
    pub text_channel: Option<ChannelId>,
    pub connected: bool,
    pub playing: bool,
    pub paused: bool,
    pub destroyed: bool,
    pub volume: u16,
    pub position: u64,
    pub timestamp_ms: u64,
    pub ping: i64,
    pub current_track: Option<Track>,
    pub queue_len: usize,
    pub loop_mode: LoopMode,
}

#[derive(Debug)]
struct PlayerState {
    voice_channel: Option<ChannelId>,
    text_channel: Option<ChannelId>,
    mute: bool,
    deaf: bool,
    connected: bool,
    playing: bool,
    paused: bool,
    destroyed: bool,
    volume: u16,
    position: u64,
    timestamp_ms: u64,
    ping: i64,
    current_encoded: Option<String>,
    current_track: Option<Track>,
    voice: VoiceCredentialAccumulator,
    queue: MusicQueue,
}

impl PlayerState {
    fn clear_current(&mut self) {
        self.current_encoded = None;
        self.current_track = None;
        self.playing = false;
    }

    fn should_advance(&self) -> bool {
        !self.destroyed && !self.queue.is_empty()
    }
}

/// Player de un guild.
///
/// Reacciona a los eventos que el nodo le despacha y expone las mutaciones
/// de reproducción. Solo un `play()` se ejecuta a la vez; el resto de
/// operaciones asume un único llamador por guild.
pub struct Player {
    guild_id: GuildId,
    gateway: Weak<dyn PlayerGateway>,
    state: Mutex<PlayerState>,
    play_lock: tokio::sync::Mutex<()>,
}

impl fmt::Debug for Player {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Player")
            .field("guild_id", &self.guild_id)
            .finish_non_exhaustive()
    }
}

impl Player {
    pub fn new(options: PlayerOptions, gateway: Weak<dyn PlayerGateway>) -> Self {
        Self {
            guild_id: options.guild_id,
            gateway,
            state: Mutex::new(PlayerState {
                voice_channel: options.voice_channel,
                text_channel: options.text_channel,
                mute: options.mute,
                deaf: options.deaf,
                connected: false,
                playing: false,
                paused: false,
                destroyed: false,
                volume: options.volume.min(MAX_VOLUME),
                position: 0,
                timestamp_ms: 0,
                ping: 0,
                current_encoded: None,
                current_track: None,
                voice: VoiceCredentialAccumulator::default(),
                queue: MusicQueue::new(),
            }),
            play_lock: tokio::sync::Mutex::new(()),
        }
    }

    pub fn guild_id(&self) -> GuildId {
        self.guild_id
    }

    fn gateway(&self) -> Option<Arc<dyn PlayerGateway>> {
        self.gateway.upgrade()
    }

    /// Registra el canal de voz destino. No hace nada si ya fue destruido.
    pub fn connect(&self, voice_channel: Option<ChannelId>) {
        let mut state = self.state.lock();
        if state.destroyed {
            return;
        }
        match voice_channel.or(state.voice_channel) {
            Some(channel) => {
                state.voice_channel = Some(channel);
                debug!("🔗 Player de guild {} apuntando al canal {}", self.guild_id, channel);
            }
            None => debug!("Player de guild {} sin canal de voz", self.guild_id),
        }
    }

    /// Pieza `session_id` de la credencial (voice state de Discord).
    ///
    /// `channel_id = None` significa que el bot salió del canal de voz.
    pub async fn apply_voice_state_info(&self, session_id: Option<&str>, channel_id: Option<ChannelId>) {
        {
            let mut state = self.state.lock();
            if state.destroyed {
                return;
            }
            if let Some(session_id) = session_id {
                state.voice.set_session_id(session_id);
            }
            state.voice_channel = channel_id;
        }
        self.dispatch_voice_update().await;
    }

    /// Piezas `token` y `endpoint` de la credencial (voice server de Discord)
    pub async fn apply_voice_server_info(&self, token: &str, endpoint: &str) {
        {
            let mut state = self.state.lock();
            if state.destroyed {
                return;
            }
            state.voice.set_server(token, endpoint);
        }
        self.dispatch_voice_update().await;
    }

    /// Envía la credencial al nodo si está completa y cambió desde la última aplicada
    async fn dispatch_voice_update(&self) {
        let (credential, volume) = {
            let state = self.state.lock();
            match state.voice.pending() {
                Some(credential) => (credential, state.volume),
                None => return,
            }
        };

        let Some(gateway) = self.gateway() else {
            warn!("Nodo liberado, no se puede conectar la voz de guild {}", self.guild_id);
            return;
        };
        if gateway.session_id().is_none() {
            debug!("Nodo sin sesión todavía, se pospone la voz de guild {}", self.guild_id);
            return;
        }

        let patch = PlayerPatch::voice(credential.clone(), volume);
        let result = gateway.update_player(self.guild_id, &patch, false).await;

        let mut state = self.state.lock();
        match result {
            Ok(_) => {
                state.connected = true;
                state.voice.mark_applied(credential);
                info!("🔊 Voz conectada en guild {}", self.guild_id);
            }
            Err(e) => {
                state.connected = false;
                warn!("❌ Error al enviar la voz de guild {}: {}", self.guild_id, e);
            }
        }
    }

    /// Agrega un track a la cola. `false` si el player fue destruido.
    pub fn enqueue(&self, track: Track) -> bool {
        self.state.lock().queue.enqueue(track)
    }

    /// Reproduce el siguiente track de la cola.
    ///
    /// Solo un `play()` corre a la vez por player: los demás esperan su turno.
    /// Si el nodo rechaza el track, este vuelve a la cabeza de la cola para
    /// el próximo intento (salvo en loop de track, donde sigue siendo el actual).
    pub async fn play(&self) -> PlayOutcome {
        let _guard = self.play_lock.lock().await;

        let (track, volume) = {
            let mut guard = self.state.lock();
            let state = &mut *guard;

            if state.destroyed {
                return PlayOutcome::Idle(IdleReason::Destroyed);
            }
            // en loop de track el actual se repite aunque la cola esté vacía
            let repeats_current =
                state.queue.loop_mode() == LoopMode::Track && state.current_track.is_some();
            if state.queue.is_empty() && !repeats_current {
                state.playing = false;
                return PlayOutcome::Idle(IdleReason::QueueEmpty);
            }
            if !state.connected || !state.voice.is_complete() {
                debug!("Guild {} sin voz conectada, play() ignorado", self.guild_id);
                return PlayOutcome::Idle(IdleReason::NotConnected);
            }

            let Some(track) = state.queue.dequeue_next(state.current_track.as_ref()) else {
                state.playing = false;
                return PlayOutcome::Idle(IdleReason::QueueEmpty);
            };
            state.current_encoded = Some(track.encoded().to_string());
            state.current_track = Some(track.clone());
            (track, state.volume)
        };

        let result = match self.gateway() {
            Some(gateway) => {
                let patch = PlayerPatch::start(track.encoded(), volume);
                gateway.update_player(self.guild_id, &patch, false).await
            }
            None => Err(NodeError::NodeGone),
        };

        let mut state = self.state.lock();
        match result {
            Ok(_) if state.destroyed => PlayOutcome::Idle(IdleReason::Destroyed),
            Ok(_) => {
                state.position = 0;
                state.playing = true;
                state.paused = false;
                info!(
                    "🎵 Reproduciendo: {} ({}) en guild {}",
                    track,
                    track.pretty_duration(),
                    self.guild_id
                );
                PlayOutcome::Started(track)
            }
            Err(reason) => {
                state.playing = false;
                let requeued = state.queue.requeue_front(track.clone());
                if requeued {
                    state.current_encoded = None;
                    state.current_track = None;
                }
                warn!(
                    "❌ Error al reproducir {} en guild {}: {} (reencolado: {})",
                    track, self.guild_id, reason, requeued
                );
                PlayOutcome::Failed { reason, requeued }
            }
        }
    }

    /// Salta el track actual y, si queda cola, reproduce el siguiente
    pub async fn skip(&self) -> PlayOutcome {
        if self.is_destroyed() {
            return PlayOutcome::Idle(IdleReason::Destroyed);
        }

        self.send_stop().await;

        let has_next = {
            let mut state = self.state.lock();
            state.clear_current();
            state.position = 0;
            !state.queue.is_empty()
        };

        info!("⏭️ Track saltado en guild {}", self.guild_id);
        if has_next {
            self.play().await
        } else {
            PlayOutcome::Idle(IdleReason::QueueEmpty)
        }
    }

    /// Detiene la reproducción y limpia la cola
    pub async fn stop(&self) {
        if self.is_destroyed() {
            return;
        }
        let _guard = self.play_lock.lock().await;
        self.stop_and_clear().await;
        info!("⏹️ Reproducción detenida en guild {}", self.guild_id);
    }

    async fn stop_and_clear(&self) {
        self.send_stop().await;

        let mut state = self.state.lock();
        state.queue.clear();
        state.clear_current();
        state.position = 0;
        state.paused = false;
    }

    /// PATCH de stop; un fallo no cambia nada localmente
    async fn send_stop(&self) {
        let Some(gateway) = self.gateway() else {
            return;
        };
        if let Err(e) = gateway
            .update_player(self.guild_id, &PlayerPatch::stop(), false)
            .await
        {
            debug!("Stop ignorado para guild {}: {}", self.guild_id, e);
        }
    }

    /// Pausa. `Ok(false)` si no había nada sonando.
    pub async fn pause(&self) -> Result<bool> {
        {
            let state = self.state.lock();
            if state.destroyed || !state.playing {
                return Ok(false);
            }
        }

        self.send(PlayerPatch::paused(true)).await?;
        self.state.lock().paused = true;
        info!("⏸️ Reproducción pausada en guild {}", self.guild_id);
        Ok(true)
    }

    /// Reanuda. `Ok(false)` si no estaba pausado.
    pub async fn resume(&self) -> Result<bool> {
        {
            let state = self.state.lock();
            if state.destroyed || !state.paused {
                return Ok(false);
            }
        }

        self.send(PlayerPatch::paused(false)).await?;
        self.state.lock().paused = false;
        info!("▶️ Reproducción reanudada en guild {}", self.guild_id);
        Ok(true)
    }

    /// Ajusta el volumen (acotado a 0..=1000).
    ///
    /// El valor local cambia aunque el nodo rechace el PATCH.
    pub async fn set_volume(&self, volume: i32) -> Result<u16> {
        let clamped = volume.clamp(0, i32::from(MAX_VOLUME)) as u16;
        {
            let mut state = self.state.lock();
            if state.destroyed {
                return Ok(state.volume);
            }
            state.volume = clamped;
        }

        info!("🔊 Volumen de guild {} ajustado a {}", self.guild_id, clamped);
        self.send(PlayerPatch::volume(clamped)).await?;
        Ok(clamped)
    }

    async fn send(&self, patch: PlayerPatch) -> Result<Option<Value>> {
        let gateway = self.gateway().ok_or(NodeError::NodeGone)?;
        gateway.update_player(self.guild_id, &patch, false).await
    }

    /// Destruye el player. Idempotente.
    ///
    /// Un `play()` en curso termina antes de que salga el stop, así el nodo
    /// nunca recibe el stop antes que el inicio.
    pub async fn destroy(&self) {
        {
            let mut state = self.state.lock();
            if state.destroyed {
                return;
            }
            state.destroyed = true;
            state.connected = false;
            state.queue.close();
        }

        let _guard = self.play_lock.lock().await;
        self.stop_and_clear().await;

        if let Some(gateway) = self.gateway() {
            gateway.release(self.guild_id);
        }
        info!("👋 Player destruido en guild {}", self.guild_id);
    }

    /// `playerUpdate` del nodo: última escritura gana
    pub fn apply_player_update(&self, position: u64, timestamp_ms: u64, ping: i64) {
        let mut state = self.state.lock();
        state.position = position;
        state.timestamp_ms = timestamp_ms;
        state.ping = ping;
    }

    /// Reacciona a un evento de ciclo de vida de track.
    ///
    /// Devuelve el resultado del auto-avance cuando lo hubo.
    pub async fn handle_track_event(&self, event: &TrackEvent) -> Option<PlayOutcome> {
        let advance = {
            let mut state = self.state.lock();
            match event {
                TrackEvent::TrackStartEvent { .. } => {
                    state.playing = true;
                    state.paused = false;
                    false
                }
                TrackEvent::TrackEndEvent { reason, .. } if reason.advances_queue() => {
                    state.clear_current();
                    state.position = 0;
                    state.should_advance()
                }
                TrackEvent::TrackEndEvent {
                    reason: TrackEndReason::Replaced,
                    ..
                } => false,
                TrackEvent::TrackEndEvent { reason, .. } => {
                    debug!("Track terminado en guild {} ({:?}), sin avance", self.guild_id, reason);
                    state.clear_current();
                    false
                }
                TrackEvent::TrackStuckEvent { threshold_ms, .. } => {
                    warn!("⚠️ Track atascado en guild {} ({}ms)", self.guild_id, threshold_ms);
                    state.clear_current();
                    state.should_advance()
                }
                TrackEvent::TrackExceptionEvent { exception, .. } => {
                    warn!("❌ Excepción de track en guild {}: {}", self.guild_id, exception);
                    state.clear_current();
                    state.should_advance()
                }
                TrackEvent::WebSocketClosedEvent {
                    code,
                    reason,
                    by_remote,
                    ..
                } => {
                    warn!(
                        "🔌 Voz cerrada en guild {}: {} {} (remoto: {})",
                        self.guild_id, code, reason, by_remote
                    );
                    false
                }
            }
        };

        if !advance {
            return None;
        }

        let outcome = self.play().await;
        if let PlayOutcome::Failed { reason, .. } = &outcome {
            debug!("Auto-avance fallido en guild {}: {}", self.guild_id, reason);
        }
        Some(outcome)
    }

    // Accesores

    pub fn snapshot(&self) -> PlayerSnapshot {
        let state = self.state.lock();
        PlayerSnapshot {
            guild_id: self.guild_id,
            voice_channel: state.voice_channel,
            text_channel: state.text_channel,
            connected: state.connected,
            playing: state.playing,
            paused: state.paused,
            destroyed: state.destroyed,
            volume: state.volume,
            position: state.position,
            timestamp_ms: state.timestamp_ms,
            ping: state.ping,
            current_track: state.current_track.clone(),
            queue_len: state.queue.len(),
            loop_mode: state.queue.loop_mode(),
        }
    }

    pub fn is_connected(&self) -> bool {
        self.state.lock().connected
    }
    pub fn is_playing(&self) -> bool {
        self.state.lock().playing
    }
    pub fn is_paused(&self) -> bool {
        self.state.lock().paused
    }
    pub fn is_destroyed(&self) -> bool {
        self.state.lock().destroyed
    }
    pub fn volume(&self) -> u16 {
        self.state.lock().volume
    }
    pub fn position(&self) -> u64 {
        self.state.lock().position
    }
    pub fn current_track(&self) -> Option<Track> {
        self.state.lock().current_track.clone()
    }
    pub fn current_encoded(&self) -> Option<String> {
        self.state.lock().current_encoded.clone()
    }
    pub fn voice_channel(&self) -> Option<ChannelId> {
        self.state.lock().voice_channel
    }
    pub fn text_channel(&self) -> Option<ChannelId> {
        self.state.lock().text_channel
    }
    pub fn is_self_deaf(&self) -> bool {
        self.state.lock().deaf
    }
    pub fn is_self_mute(&self) -> bool {
        self.state.lock().mute
    }
    pub fn queue_len(&self) -> usize {
        self.state.lock().queue.len()
    }
    pub fn queue_snapshot(&self) -> Vec<Track> {
        self.state.lock().queue.snapshot()
    }

    pub fn set_loop_mode(&self, mode: LoopMode) {
        self.state.lock().queue.set_loop_mode(mode);
    }

    pub fn shuffle_queue(&self) {
        self.state.lock().queue.shuffle();
    }

    pub fn remove_from_queue(&self, index: usize) -> Option<Track> {
        self.state.lock().queue.remove_at(index)
    }

    pub fn move_in_queue(&self, from: usize, to: usize) -> bool {
        self.state.lock().queue.move_index(from, to)
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;
    use crate::audio::track::test_track;
    use crate::node::events::RawGuildId;
    use std::sync::atomic::Ordering;
    use std::time::Duration;

    fn end_event(reason: TrackEndReason) -> TrackEvent {
        TrackEvent::TrackEndEvent {
            guild_id: RawGuildId::Number(1),
            reason,
        }
    }

    #[tokio::test]
    async fn test_play_without_voice_is_noop() {
        let gateway = Arc::new(RecordingGateway::ready());
        let player = player_with(&gateway);
        player.enqueue(test_track("a"));

        let outcome = player.play().await;
        assert!(matches!(outcome, PlayOutcome::Idle(IdleReason::NotConnected)));
        assert_eq!(gateway.patch_count(), 0);
        assert!(!player.is_playing());
        assert_eq!(player.queue_len(), 1);
    }

    #[tokio::test]
    async fn test_play_starts_next_track() {
        let gateway = Arc::new(RecordingGateway::ready());
        let player = connected_player(&gateway).await;
        player.enqueue(test_track("a"));
        player.enqueue(test_track("b"));

        let outcome = player.play().await;
        assert!(outcome.is_started());
        assert_eq!(gateway.starts(), vec!["enc-a"]);
        assert!(player.is_playing());
        assert!(!player.is_paused());
        assert_eq!(player.current_encoded().as_deref(), Some("enc-a"));
        assert_eq!(player.queue_len(), 1);
    }

    #[tokio::test]
    async fn test_failed_play_requeues_at_head() {
        let gateway = Arc::new(RecordingGateway::ready());
        let player = connected_player(&gateway).await;
        player.enqueue(test_track("a"));
        player.enqueue(test_track("b"));
        gateway.fail_updates.store(true, Ordering::SeqCst);

        let outcome = player.play().await;
        assert!(matches!(outcome, PlayOutcome::Failed { requeued: true, .. }));
        assert!(!player.is_playing());
        let queue: Vec<_> = player.queue_snapshot().iter().map(|t| t.identifier().to_string()).collect();
        assert_eq!(queue, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_failed_play_in_track_loop_is_not_requeued() {
        let gateway = Arc::new(RecordingGateway::ready());
        let player = connected_player(&gateway).await;
        player.set_loop_mode(LoopMode::Track);
        player.enqueue(test_track("a"));
        gateway.fail_updates.store(true, Ordering::SeqCst);

        let outcome = player.play().await;
        assert!(matches!(outcome, PlayOutcome::Failed { requeued: false, .. }));
        assert_eq!(player.queue_len(), 0);
    }

    #[tokio::test]
    async fn test_failed_track_loop_retry_replays_current() {
        let gateway = Arc::new(RecordingGateway::ready());
        let player = connected_player(&gateway).await;
        player.set_loop_mode(LoopMode::Track);
        player.enqueue(test_track("a"));
        gateway.fail_updates.store(true, Ordering::SeqCst);

        assert!(matches!(player.play().await, PlayOutcome::Failed { requeued: false, .. }));
        assert_eq!(player.current_encoded().as_deref(), Some("enc-a"));

        gateway.fail_updates.store(false, Ordering::SeqCst);
        match player.play().await {
            PlayOutcome::Started(track) => assert_eq!(track.identifier(), "a"),
            other => panic!("se esperaba Started, llegó {:?}", other),
        }
        assert_eq!(gateway.starts(), vec!["enc-a", "enc-a"]);
        assert!(player.is_playing());
    }

    #[tokio::test]
    async fn test_failed_queue_loop_play_with_concurrent_enqueue() {
        let gateway = Arc::new(RecordingGateway {
            delay: Some(Duration::from_millis(50)),
            ..RecordingGateway::ready()
        });
        let player = Arc::new(connected_player(&gateway).await);
        player.set_loop_mode(LoopMode::Queue);
        player.enqueue(test_track("a"));
        player.enqueue(test_track("b"));
        gateway.fail_updates.store(true, Ordering::SeqCst);

        let playing = Arc::clone(&player);
        let handle = tokio::spawn(async move { playing.play().await });
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(player.enqueue(test_track("c")));

        let outcome = handle.await.unwrap();
        assert!(matches!(outcome, PlayOutcome::Failed { requeued: true, .. }));
        let queue: Vec<_> = player.queue_snapshot().iter().map(|t| t.identifier().to_string()).collect();
        assert_eq!(queue, vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn test_concurrent_play_is_serialized() {
        let gateway = Arc::new(RecordingGateway {
            delay: Some(Duration::from_millis(30)),
            ..RecordingGateway::ready()
        });
        let player = Arc::new(connected_player(&gateway).await);
        player.enqueue(test_track("a"));
        player.enqueue(test_track("b"));

        let (first, second) = tokio::join!(player.play(), player.play());
        assert!(first.is_started());
        assert!(second.is_started());
        assert_eq!(gateway.max_in_flight.load(Ordering::SeqCst), 1);
        assert_eq!(gateway.starts(), vec!["enc-a", "enc-b"]);
    }

    #[tokio::test]
    async fn test_volume_is_clamped() {
        let gateway = Arc::new(RecordingGateway::ready());
        let player = player_with(&gateway);

        assert_eq!(player.set_volume(-5).await.unwrap(), 0);
        assert_eq!(player.volume(), 0);
        assert_eq!(player.set_volume(5000).await.unwrap(), 1000);
        assert_eq!(player.volume(), 1000);
    }

    #[tokio::test]
    async fn test_volume_failure_keeps_local_value() {
        let gateway = Arc::new(RecordingGateway::ready());
        let player = player_with(&gateway);
        gateway.fail_updates.store(true, Ordering::SeqCst);

        assert!(player.set_volume(250).await.is_err());
        assert_eq!(player.volume(), 250);
    }

    #[tokio::test]
    async fn test_pause_resume_require_matching_state() {
        let gateway = Arc::new(RecordingGateway::ready());
        let player = connected_player(&gateway).await;

        assert!(!player.pause().await.unwrap());
        assert!(!player.resume().await.unwrap());
        assert_eq!(gateway.patch_count(), 0);

        player.enqueue(test_track("a"));
        player.play().await;
        assert!(player.pause().await.unwrap());
        assert!(player.is_paused());
        assert!(player.resume().await.unwrap());
        assert!(!player.is_paused());
    }

    #[tokio::test]
    async fn test_pause_failure_leaves_state_unchanged() {
        let gateway = Arc::new(RecordingGateway::ready());
        let player = connected_player(&gateway).await;
        player.enqueue(test_track("a"));
        player.play().await;
        gateway.fail_updates.store(true, Ordering::SeqCst);

        assert!(player.pause().await.is_err());
        assert!(!player.is_paused());
    }

    #[tokio::test]
    async fn test_skip_plays_next() {
        let gateway = Arc::new(RecordingGateway::ready());
        let player = connected_player(&gateway).await;
        player.enqueue(test_track("a"));
        player.enqueue(test_track("b"));
        player.play().await;

        let outcome = player.skip().await;
        assert!(outcome.is_started());
        assert_eq!(gateway.starts(), vec!["enc-a", "enc-b"]);
        let patches = gateway.patches.lock();
        assert_eq!(patches[1].1, PlayerPatch::stop());
    }

    #[tokio::test]
    async fn test_skip_ignores_stop_failure() {
        let gateway = Arc::new(RecordingGateway::ready());
        let player = connected_player(&gateway).await;
        player.enqueue(test_track("a"));
        player.play().await;
        gateway.fail_updates.store(true, Ordering::SeqCst);

        let outcome = player.skip().await;
        assert!(matches!(outcome, PlayOutcome::Idle(IdleReason::QueueEmpty)));
        assert!(player.current_track().is_none());
        assert!(!player.is_playing());
    }

    #[tokio::test]
    async fn test_stop_clears_everything() {
        let gateway = Arc::new(RecordingGateway::ready());
        let player = connected_player(&gateway).await;
        player.enqueue(test_track("a"));
        player.enqueue(test_track("b"));
        player.play().await;

        player.stop().await;
        assert_eq!(player.queue_len(), 0);
        assert!(player.current_track().is_none());
        assert!(!player.is_playing());
    }

    #[tokio::test]
    async fn test_destroy_is_idempotent() {
        let gateway = Arc::new(RecordingGateway::ready());
        let player = connected_player(&gateway).await;
        player.enqueue(test_track("a"));

        player.destroy().await;
        let first = player.snapshot();
        player.destroy().await;
        let second = player.snapshot();

        assert!(first.destroyed && second.destroyed);
        assert!(!second.connected);
        assert_eq!(first.queue_len, second.queue_len);
        assert_eq!(*gateway.released.lock(), vec![GuildId::new(1)]);
        assert!(!player.enqueue(test_track("b")));
        assert!(matches!(player.play().await, PlayOutcome::Idle(IdleReason::Destroyed)));
    }

    #[tokio::test]
    async fn test_destroy_waits_for_in_flight_play() {
        let gateway = Arc::new(RecordingGateway {
            delay: Some(Duration::from_millis(50)),
            ..RecordingGateway::ready()
        });
        let player = Arc::new(connected_player(&gateway).await);
        player.enqueue(test_track("a"));

        let playing = Arc::clone(&player);
        let handle = tokio::spawn(async move { playing.play().await });
        tokio::time::sleep(Duration::from_millis(10)).await;
        player.destroy().await;

        let outcome = handle.await.unwrap();
        assert!(matches!(outcome, PlayOutcome::Idle(IdleReason::Destroyed)));
        assert_eq!(gateway.max_in_flight.load(Ordering::SeqCst), 1);

        let patches = gateway.patches.lock();
        assert_eq!(patches.len(), 2);
        assert!(patches[0].1.starts_track());
        assert_eq!(patches[1].1, PlayerPatch::stop());
    }

    #[tokio::test]
    async fn test_track_end_finished_auto_advances() {
        let gateway = Arc::new(RecordingGateway::ready());
        let player = connected_player(&gateway).await;
        for id in ["a", "b", "c"] {
            player.enqueue(test_track(id));
        }
        player.play().await;
        gateway.patches.lock().clear();

        let outcome = player.handle_track_event(&end_event(TrackEndReason::Finished)).await;
        assert!(outcome.unwrap().is_started());
        assert_eq!(gateway.starts(), vec!["enc-b"]);
        assert_eq!(player.queue_len(), 1);
    }

    #[tokio::test]
    async fn test_track_end_replaced_changes_nothing() {
        let gateway = Arc::new(RecordingGateway::ready());
        let player = connected_player(&gateway).await;
        player.enqueue(test_track("a"));
        player.enqueue(test_track("b"));
        player.play().await;

        assert!(player.handle_track_event(&end_event(TrackEndReason::Replaced)).await.is_none());
        assert!(player.is_playing());
        assert_eq!(player.current_encoded().as_deref(), Some("enc-a"));
    }

    #[tokio::test]
    async fn test_track_end_stopped_does_not_advance() {
        let gateway = Arc::new(RecordingGateway::ready());
        let player = connected_player(&gateway).await;
        player.enqueue(test_track("a"));
        player.enqueue(test_track("b"));
        player.play().await;

        assert!(player.handle_track_event(&end_event(TrackEndReason::Stopped)).await.is_none());
        assert!(!player.is_playing());
        assert!(player.current_track().is_none());
        assert_eq!(player.queue_len(), 1);
    }

    #[tokio::test]
    async fn test_track_exception_advances() {
        let gateway = Arc::new(RecordingGateway::ready());
        let player = connected_player(&gateway).await;
        player.enqueue(test_track("a"));
        player.enqueue(test_track("b"));
        player.play().await;

        let event = TrackEvent::TrackExceptionEvent {
            guild_id: RawGuildId::Number(1),
            exception: serde_json::json!({ "message": "boom" }),
        };
        assert!(player.handle_track_event(&event).await.unwrap().is_started());
        assert_eq!(player.current_encoded().as_deref(), Some("enc-b"));
    }

    #[tokio::test]
    async fn test_track_stuck_advances() {
        let gateway = Arc::new(RecordingGateway::ready());
        let player = connected_player(&gateway).await;
        player.enqueue(test_track("a"));
        player.enqueue(test_track("b"));
        player.play().await;
        gateway.patches.lock().clear();

        let event = TrackEvent::TrackStuckEvent {
            guild_id: RawGuildId::Number(1),
            threshold_ms: 10_000,
        };
        assert!(player.handle_track_event(&event).await.unwrap().is_started());
        assert_eq!(gateway.starts(), vec!["enc-b"]);
        assert_eq!(player.current_encoded().as_deref(), Some("enc-b"));
    }

    #[tokio::test]
    async fn test_track_end_load_failed_advances() {
        let gateway = Arc::new(RecordingGateway::ready());
        let player = connected_player(&gateway).await;
        player.enqueue(test_track("a"));
        player.enqueue(test_track("b"));
        player.play().await;
        gateway.patches.lock().clear();

        let outcome = player.handle_track_event(&end_event(TrackEndReason::LoadFailed)).await;
        assert!(outcome.unwrap().is_started());
        assert_eq!(gateway.starts(), vec!["enc-b"]);
        assert_eq!(player.queue_len(), 0);
    }

    #[tokio::test]
    async fn test_destroyed_player_does_not_advance() {
        let gateway = Arc::new(RecordingGateway::ready());
        let player = connected_player(&gateway).await;
        player.enqueue(test_track("a"));
        player.enqueue(test_track("b"));
        player.play().await;
        player.destroy().await;
        gateway.patches.lock().clear();

        for event in [
            end_event(TrackEndReason::Finished),
            end_event(TrackEndReason::LoadFailed),
            TrackEvent::TrackStuckEvent {
                guild_id: RawGuildId::Number(1),
                threshold_ms: 10_000,
            },
        ] {
            assert!(player.handle_track_event(&event).await.is_none());
        }
        assert!(gateway.starts().is_empty());
        assert_eq!(gateway.patch_count(), 0);
    }

    #[test]
    fn test_debug_shows_guild_only() {
        let gateway = Arc::new(RecordingGateway::ready());
        let player = player_with(&gateway);
        player.enqueue(test_track("a"));

        let printed = format!("{:?}", player);
        assert!(printed.starts_with("Player"));
        assert!(printed.contains("guild_id"));
        assert!(!printed.contains("enc-a"));
    }

    #[tokio::test]
    async fn test_track_start_marks_playing() {
        let gateway = Arc::new(RecordingGateway::ready());
        let player = player_with(&gateway);
        let event = TrackEvent::TrackStartEvent {
            guild_id: RawGuildId::Number(1),
        };
        assert!(player.handle_track_event(&event).await.is_none());
        assert!(player.is_playing());
        assert!(!player.is_paused());
    }

    #[tokio::test]
    async fn test_voice_left_channel_clears_channel() {
        let gateway = Arc::new(RecordingGateway::ready());
        let player = connected_player(&gateway).await;
        assert_eq!(player.voice_channel(), Some(ChannelId::new(10)));

        player.apply_voice_state_info(None, None).await;
        assert_eq!(player.voice_channel(), None);
        // la credencial no cambió: no se reenvía
        assert_eq!(gateway.patch_count(), 0);
    }

    #[tokio::test]
    async fn test_voice_waits_for_node_session() {
        let gateway = Arc::new(RecordingGateway::default());
        let player = player_with(&gateway);
        player.apply_voice_state_info(Some("sid"), Some(ChannelId::new(3))).await;
        player.apply_voice_server_info("token", "endpoint").await;

        assert!(!player.is_connected());
        assert_eq!(gateway.patch_count(), 0);
    }

    #[tokio::test]
    async fn test_voice_credential_sent_once() {
        let mut mock = MockPlayerGateway::new();
        mock.expect_session_id().returning(|| Some("session".to_string()));
        mock.expect_update_player()
            .withf(|guild, patch, replace| {
                *guild == GuildId::new(1)
                    && !*replace
                    && patch.voice.as_ref().map(|v| v.token.as_str()) == Some("token")
                    && patch.volume == Some(100)
            })
            .times(1)
            .returning(|_, _, _| Ok(None));

        let gateway: Arc<dyn PlayerGateway> = Arc::new(mock);
        let player = Player::new(PlayerOptions::new(GuildId::new(1)), Arc::downgrade(&gateway));

        player.apply_voice_state_info(Some("sid"), Some(ChannelId::new(3))).await;
        player.apply_voice_server_info("token", "endpoint").await;
        player.apply_voice_server_info("token", "endpoint").await;
        assert!(player.is_connected());
    }

    #[tokio::test]
    async fn test_voice_failure_marks_disconnected() {
        let mut mock = MockPlayerGateway::new();
        mock.expect_session_id().returning(|| Some("session".to_string()));
        mock.expect_update_player()
            .times(2)
            .returning(|_, _, _| Err(NodeError::PlayerUpdateFailed { status: 400 }));

        let gateway: Arc<dyn PlayerGateway> = Arc::new(mock);
        let player = Player::new(PlayerOptions::new(GuildId::new(1)), Arc::downgrade(&gateway));

        player.apply_voice_state_info(Some("sid"), None).await;
        player.apply_voice_server_info("token", "endpoint").await;
        assert!(!player.is_connected());
        // sin credencial aplicada, un reintento vuelve a enviarse
        player.apply_voice_server_info("token", "endpoint").await;
        assert!(!player.is_connected());
    }

    #[tokio::test]
    async fn test_dropped_node_fails_play() {
        let gateway = Arc::new(RecordingGateway::ready());
        let player = connected_player(&gateway).await;
        player.enqueue(test_track("a"));
        drop(gateway);

        let outcome = player.play().await;
        assert!(matches!(
            outcome,
            PlayOutcome::Failed { reason: NodeError::NodeGone, requeued: true }
        ));
    }
}
