//! # Node Module
//!
//! One [`Node`] per remote Lavalink server: the event-stream connection, the
//! session handshake, the per-guild player registry and the REST gateway the
//! players mutate through.
//!
//! ## Lifecycle
//!
//! ```text
//! Disconnected -> Connecting -> Connected (after `ready`)
//!       ^______________|______________|   (stream error / close / shutdown)
//! ```
//!
//! Inbound frames are handled strictly in arrival order by a single dispatch
//! task per node. Decode and routing failures are logged and dropped; they
//! never stop the loop.

pub mod events;
pub mod models;
pub mod rest;

use async_trait::async_trait;
use dashmap::DashMap;
use futures::{SinkExt, StreamExt};
use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use serenity::model::id::{GuildId, UserId};
use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Weak,
    },
    time::Duration,
};
use tokio::{net::TcpStream, task::JoinHandle};
use tokio_tungstenite::{
    connect_async,
    tungstenite::{client::IntoClientRequest, Message},
    MaybeTlsStream, WebSocketStream,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::{
    audio::player::{Player, PlayerGateway, PlayerOptions},
    config::{Config, NodeConfig},
    error::{NodeError, Result},
};
use events::{IncomingMessage, RawGuildId};
use models::{NodeInfo, NodeStats, PlayerPatch};
use rest::RestClient;

type EventStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    /// Stream abierto, esperando `ready`
    Connecting,
    /// Handshake completo
    Connected,
}

pub struct Node {
    config: NodeConfig,
    rest: RestClient,
    state: RwLock<ConnectionState>,
    session_id: RwLock<Option<String>>,
    info: RwLock<Option<NodeInfo>>,
    stats: RwLock<Option<NodeStats>>,
    players: DashMap<GuildId, Arc<Player>>,
    cancel: CancellationToken,
    task: Mutex<Option<JoinHandle<()>>>,
    /// `connect()` está esperando el `ready` y leerá /info él mismo
    awaiting_handshake: AtomicBool,
    handshake_attempts: u32,
    handshake_interval: Duration,
    heartbeat_interval: Duration,
    this: Weak<Node>,
}

impl Node {
    pub fn new(config: NodeConfig, settings: &Config) -> Result<Arc<Self>> {
        let rest = RestClient::new(&config, &settings.client_name)?;
        if let Some(user_id) = settings.client_user_id.filter(|id| *id != 0) {
            rest.set_user_id(UserId::new(user_id));
        }

        Ok(Arc::new_cyclic(|this| Self {
            config,
            rest,
            state: RwLock::new(ConnectionState::Disconnected),
            session_id: RwLock::new(None),
            info: RwLock::new(None),
            stats: RwLock::new(None),
            players: DashMap::new(),
            cancel: CancellationToken::new(),
            task: Mutex::new(None),
            awaiting_handshake: AtomicBool::new(false),
            handshake_attempts: settings.handshake_attempts,
            handshake_interval: settings.handshake_interval(),
            heartbeat_interval: settings.heartbeat_interval(),
            this: this.clone(),
        }))
    }

    /// Abre el stream de eventos y espera el `ready` del nodo.
    ///
    /// Un fallo de transporte deja el nodo en `Disconnected`; no hay reintentos.
    /// Si el `ready` no llega a tiempo el stream sigue abierto pero el nodo no
    /// queda disponible. `/v4/info` se lee en ambos casos.
    pub async fn connect(self: &Arc<Self>) -> Result<()> {
        if self.cancel.is_cancelled() {
            return Err(NodeError::NodeGone);
        }
        if self.state() != ConnectionState::Disconnected {
            debug!("Nodo {} ya conectado o conectando", self.label());
            return Ok(());
        }

        *self.state.write() = ConnectionState::Connecting;
        info!("🔌 Conectando al nodo {}", self.label());

        let stream = match self.open_stream().await {
            Ok(stream) => stream,
            Err(e) => {
                self.mark_disconnected();
                warn!("❌ No se pudo conectar al nodo {}: {}", self.label(), e);
                return Err(e);
            }
        };

        self.awaiting_handshake.store(true, Ordering::SeqCst);
        let node = Arc::clone(self);
        let handle = tokio::spawn(async move { node.run(stream).await });
        *self.task.lock() = Some(handle);

        let handshake = self.wait_for_session().await;
        self.awaiting_handshake.store(false, Ordering::SeqCst);

        self.refresh_info().await;
        handshake
    }

    /// Lee `GET /v4/info` y guarda el resultado; los fallos solo se registran
    pub async fn refresh_info(&self) {
        match self.rest.fetch_info().await {
            Ok(Some(info)) => {
                info!(
                    "✅ Nodo {} listo (Lavalink {}, {} fuentes)",
                    self.label(),
                    info.version.semver,
                    info.source_managers.len()
                );
                *self.info.write() = Some(info);
            }
            Ok(None) => debug!("Nodo {} no devolvió /info", self.label()),
            Err(e) => warn!("⚠️ No se pudo leer /info de {}: {}", self.label(), e),
        }
    }

    async fn open_stream(&self) -> Result<EventStream> {
        let mut request = self.config.websocket_url().into_client_request()?;
        request.headers_mut().extend(self.rest.identity_headers()?);

        let (stream, _response) = connect_async(request).await?;
        Ok(stream)
    }

    async fn wait_for_session(&self) -> Result<()> {
        for _ in 0..self.handshake_attempts {
            if self.session_id().is_some() {
                return Ok(());
            }
            tokio::time::sleep(self.handshake_interval).await;
        }

        if self.session_id().is_some() {
            return Ok(());
        }
        warn!(
            "⏰ El nodo {} no envió ready tras {} intentos",
            self.label(),
            self.handshake_attempts
        );
        Err(NodeError::HandshakeTimeout {
            attempts: self.handshake_attempts,
        })
    }

    /// Loop de despacho: un frame a la vez, ping cada `heartbeat_interval`
    async fn run(self: Arc<Self>, stream: EventStream) {
        let (mut sink, mut source) = stream.split();
        let mut heartbeat = tokio::time::interval(self.heartbeat_interval);
        heartbeat.tick().await;

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => {
                    if let Err(e) = sink.send(Message::Close(None)).await {
                        debug!("Cierre del stream de {}: {}", self.label(), e);
                    }
                    break;
                }
                _ = heartbeat.tick() => {
                    if let Err(e) = sink.send(Message::Ping(Default::default())).await {
                        warn!("💔 Heartbeat fallido hacia {}: {}", self.label(), e);
                        break;
                    }
                }
                frame = source.next() => match frame {
                    Some(Ok(Message::Text(text))) => self.handle_text(text.as_str()).await,
                    Some(Ok(Message::Close(frame))) => {
                        info!("🔌 El nodo {} cerró el stream: {:?}", self.label(), frame);
                        break;
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        warn!("❌ Error en el stream de {}: {}", self.label(), e);
                        break;
                    }
                    None => break,
                },
            }
        }

        self.mark_disconnected();
    }

    fn mark_disconnected(&self) {
        *self.state.write() = ConnectionState::Disconnected;
        *self.session_id.write() = None;
    }

    /// Decodifica y despacha un frame de texto del nodo
    pub async fn handle_text(&self, text: &str) {
        let message = match IncomingMessage::decode(text) {
            Ok(message) => message,
            Err(e) => {
                debug!("Mensaje descartado de {}: {}", self.label(), e);
                return;
            }
        };

        if let Err(e) = self.dispatch(message).await {
            debug!("Evento descartado en {}: {}", self.label(), e);
        }
    }

    async fn dispatch(&self, message: IncomingMessage) -> Result<()> {
        match message {
            IncomingMessage::Ready { session_id, resumed } => {
                info!("🤝 Sesión {} en {} (resumed: {})", session_id, self.label(), resumed);
                *self.session_id.write() = Some(session_id);
                *self.state.write() = ConnectionState::Connected;

                // ready tardío: connect() ya se rindió y no volverá a leer /info
                if !self.awaiting_handshake.load(Ordering::SeqCst) && self.info().is_none() {
                    if let Some(node) = self.this.upgrade() {
                        tokio::spawn(async move { node.refresh_info().await });
                    }
                }
            }
            IncomingMessage::Stats(stats) => {
                debug!(
                    "📊 {}: {} players, {} reproduciendo",
                    self.label(),
                    stats.players,
                    stats.playing_players
                );
                *self.stats.write() = Some(stats);
            }
            IncomingMessage::PlayerUpdate { guild_id, state } => {
                let player = self.route(&guild_id)?;
                player.apply_player_update(state.position, state.time, state.ping);
            }
            IncomingMessage::Event(event) => {
                let player = self.route(event.guild_id())?;
                player.handle_track_event(&event).await;
            }
        }
        Ok(())
    }

    /// Busca el player de un guild; la guardia del mapa se suelta antes de volver
    fn route(&self, raw: &RawGuildId) -> Result<Arc<Player>> {
        let guild_id = raw
            .resolve()
            .ok_or_else(|| NodeError::InvalidTenant(format!("{:?}", raw)))?;
        self.player(guild_id)
            .ok_or_else(|| NodeError::InvalidTenant(guild_id.to_string()))
    }

    /// Devuelve el player del guild, creándolo si no existe
    pub fn create_player(&self, options: PlayerOptions) -> Arc<Player> {
        let guild_id = options.guild_id;
        let voice_channel = options.voice_channel;
        let gateway: Weak<dyn PlayerGateway> = self.this.clone();

        let player = Arc::clone(
            self.players
                .entry(guild_id)
                .or_insert_with(|| {
                    info!("🎛️ Player creado para guild {} en {}", guild_id, self.label());
                    Arc::new(Player::new(options, gateway))
                })
                .value(),
        );
        player.connect(voice_channel);
        player
    }

    pub fn player(&self, guild_id: GuildId) -> Option<Arc<Player>> {
        self.players.get(&guild_id).map(|entry| Arc::clone(entry.value()))
    }

    pub fn player_count(&self) -> usize {
        self.players.len()
    }

    pub fn guilds(&self) -> Vec<GuildId> {
        self.players.iter().map(|entry| *entry.key()).collect()
    }

    /// Cambia el `User-Id` de REST y del próximo stream
    pub fn update_client_id(&self, user_id: UserId) {
        self.rest.set_user_id(user_id);
    }

    /// Conectado y con handshake completo
    pub fn is_available(&self) -> bool {
        self.state() == ConnectionState::Connected && self.session_id().is_some()
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.read()
    }

    pub fn session_id(&self) -> Option<String> {
        self.session_id.read().clone()
    }

    pub fn info(&self) -> Option<NodeInfo> {
        self.info.read().clone()
    }

    pub fn stats(&self) -> Option<NodeStats> {
        self.stats.read().clone()
    }

    pub fn rest(&self) -> &RestClient {
        &self.rest
    }

    pub fn label(&self) -> String {
        self.config.label()
    }

    /// Cancela el loop y cierra el stream. Idempotente.
    pub async fn shutdown(&self) {
        self.cancel.cancel();

        let handle = self.task.lock().take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                debug!("Tarea de despacho de {} terminó con error: {}", self.label(), e);
            }
            info!("👋 Nodo {} desconectado", self.label());
        }

        self.mark_disconnected();
    }
}

#[async_trait]
impl PlayerGateway for Node {
    fn session_id(&self) -> Option<String> {
        Node::session_id(self)
    }

    async fn update_player(
        &self,
        guild_id: GuildId,
        patch: &PlayerPatch,
        replace: bool,
    ) -> Result<Option<Value>> {
        let session_id = Node::session_id(self).ok_or(NodeError::NoSession)?;
        self.rest
            .update_player(&session_id, guild_id, patch, replace)
            .await
    }

    fn release(&self, guild_id: GuildId) {
        if self.players.remove(&guild_id).is_some() {
            debug!("Player de guild {} liberado de {}", guild_id, self.label());
        }
    }
}
