use parking_lot::RwLock;
use serenity::model::{
    event::VoiceServerUpdateEvent,
    id::{ChannelId, GuildId, UserId},
    voice::VoiceState,
};
use serenity::prelude::TypeMapKey;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use tracing::{debug, info, warn};

use crate::{
    audio::player::{Player, PlayerOptions},
    config::Config,
    error::{NodeError, Result},
    node::Node,
    search::{LoadResult, SearchSource},
};

/// Pool de nodos Lavalink y punto de entrada para el bot.
///
/// Los players viven en el registro de su nodo; el manager solo elige nodo
/// y enruta las actualizaciones de voz de Discord.
pub struct LavalinkManager {
    config: Config,
    nodes: Vec<Arc<Node>>,
    user_id: RwLock<Option<UserId>>,
    started: AtomicBool,
}

impl LavalinkManager {
    pub fn new(config: Config) -> Result<Self> {
        let nodes = config
            .nodes
            .iter()
            .map(|node| Node::new(node.clone(), &config))
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            user_id: RwLock::new(config.client_user_id.filter(|id| *id != 0).map(UserId::new)),
            config,
            nodes,
            started: AtomicBool::new(false),
        })
    }

    /// Conecta todos los nodos en paralelo.
    ///
    /// Queda iniciado si al menos un nodo completa el handshake.
    pub async fn start(&self, user_id: UserId) -> Result<()> {
        *self.user_id.write() = Some(user_id);
        for node in &self.nodes {
            node.update_client_id(user_id);
        }

        info!("🎼 Conectando {} nodo(s) Lavalink...", self.nodes.len());
        let results = futures::future::join_all(self.nodes.iter().map(|node| node.connect())).await;
        for (node, result) in self.nodes.iter().zip(results) {
            if let Err(e) = result {
                warn!("⚠️ Nodo {} no disponible: {}", node.label(), e);
            }
        }

        let available = self.nodes.iter().filter(|node| node.is_available()).count();
        if available == 0 {
            return Err(NodeError::NoNodesAvailable);
        }

        self.started.store(true, Ordering::SeqCst);
        info!("✅ Lavalink iniciado ({}/{} nodos)", available, self.nodes.len());
        Ok(())
    }

    pub fn is_started(&self) -> bool {
        self.started.load(Ordering::SeqCst)
    }

    pub fn user_id(&self) -> Option<UserId> {
        *self.user_id.read()
    }

    pub fn nodes(&self) -> &[Arc<Node>] {
        &self.nodes
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Nodo disponible con menos players
    fn best_node(&self) -> Result<&Arc<Node>> {
        self.nodes
            .iter()
            .filter(|node| node.is_available())
            .min_by_key(|node| node.player_count())
            .ok_or(NodeError::NoNodesAvailable)
    }

    /// Devuelve el player del guild o lo crea en el mejor nodo disponible
    pub fn create_connection(&self, options: PlayerOptions) -> Result<Arc<Player>> {
        if !self.is_started() {
            return Err(NodeError::NotStarted);
        }

        if let Some(player) = self.player(options.guild_id) {
            player.connect(options.voice_channel);
            return Ok(player);
        }

        let node = self.best_node()?;
        Ok(node.create_player(options))
    }

    /// Atajo con el volumen por defecto de la configuración
    pub fn join(&self, guild_id: GuildId, voice_channel: ChannelId, text_channel: Option<ChannelId>) -> Result<Arc<Player>> {
        let mut options = PlayerOptions::new(guild_id)
            .with_voice_channel(voice_channel)
            .with_volume(self.config.default_volume);
        options.text_channel = text_channel;
        self.create_connection(options)
    }

    pub fn player(&self, guild_id: GuildId) -> Option<Arc<Player>> {
        self.nodes.iter().find_map(|node| node.player(guild_id))
    }

    /// Destruye el player del guild. `false` si no existía.
    pub async fn destroy_player(&self, guild_id: GuildId) -> bool {
        match self.player(guild_id) {
            Some(player) => {
                player.destroy().await;
                true
            }
            None => false,
        }
    }

    /// Resuelve una búsqueda o URL en un nodo disponible.
    ///
    /// Un estado HTTP no exitoso devuelve el resultado vacío; los fallos de
    /// transporte se propagan.
    pub async fn resolve(
        &self,
        query: &str,
        source: Option<SearchSource>,
        requester: Option<UserId>,
    ) -> Result<LoadResult> {
        if !self.is_started() {
            return Err(NodeError::NotStarted);
        }

        let node = self.best_node()?;
        let identifier = source
            .unwrap_or(self.config.default_search_source)
            .format_query(query);

        let result = match node.rest().load_tracks(&identifier).await? {
            Some(response) => LoadResult::from_response(&response, requester),
            None => LoadResult::empty(),
        };

        if result.is_empty() {
            warn!("No se encontraron resultados para: {}", identifier);
        } else {
            info!("🔍 {} resultado(s) para: {}", result.tracks.len(), identifier);
        }
        Ok(result)
    }

    /// Destruye todos los players y cierra los nodos
    pub async fn stop(&self) {
        for node in &self.nodes {
            for guild_id in node.guilds() {
                if let Some(player) = node.player(guild_id) {
                    player.destroy().await;
                }
            }
            node.shutdown().await;
        }

        self.started.store(false, Ordering::SeqCst);
        info!("👋 Lavalink detenido");
    }

    /// Voice state de Discord; solo interesa el del propio bot
    pub async fn handle_voice_state_update(&self, state: &VoiceState) {
        let Some(guild_id) = state.guild_id else {
            return;
        };
        self.apply_voice_state(guild_id, state.user_id, &state.session_id, state.channel_id)
            .await;
    }

    /// Voice server de Discord
    pub async fn handle_voice_server_update(&self, event: &VoiceServerUpdateEvent) {
        let Some(guild_id) = event.guild_id else {
            return;
        };
        self.apply_voice_server(guild_id, &event.token, event.endpoint.as_deref())
            .await;
    }

    async fn apply_voice_state(
        &self,
        guild_id: GuildId,
        user_id: UserId,
        session_id: &str,
        channel_id: Option<ChannelId>,
    ) {
        if self.user_id() != Some(user_id) {
            return;
        }
        let Some(player) = self.player(guild_id) else {
            debug!("Voice state sin player para guild {}", guild_id);
            return;
        };
        player.apply_voice_state_info(Some(session_id), channel_id).await;
    }

    async fn apply_voice_server(&self, guild_id: GuildId, token: &str, endpoint: Option<&str>) {
        let Some(endpoint) = endpoint else {
            debug!("Voice server sin endpoint para guild {}, esperando otro", guild_id);
            return;
        };
        let Some(player) = self.player(guild_id) else {
            debug!("Voice server sin player para guild {}", guild_id);
            return;
        };
        player.apply_voice_server_info(token, endpoint).await;
    }
}

impl TypeMapKey for LavalinkManager {
    type Value = Arc<LavalinkManager>;
}
