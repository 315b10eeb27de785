//! Inbound messages from the node's event stream.
//!
//! Every text frame is decoded exactly once into [`IncomingMessage`];
//! routing downstream matches on these enums instead of on raw strings.

use serde::Deserialize;
use serde_json::Value;
use serenity::model::id::GuildId;

use super::models::{NodeStats, PlayerStateUpdate};
use crate::error::{NodeError, Result};

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "op", rename_all = "camelCase")]
pub enum IncomingMessage {
    #[serde(rename_all = "camelCase")]
    Ready {
        session_id: String,
        #[serde(default)]
        resumed: bool,
    },
    Stats(NodeStats),
    #[serde(rename_all = "camelCase")]
    PlayerUpdate {
        guild_id: RawGuildId,
        #[serde(default)]
        state: PlayerStateUpdate,
    },
    Event(TrackEvent),
}

impl IncomingMessage {
    pub fn decode(text: &str) -> Result<Self> {
        serde_json::from_str(text).map_err(NodeError::from)
    }
}

/// Eventos del ciclo de vida de un track
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type")]
pub enum TrackEvent {
    #[serde(rename_all = "camelCase")]
    TrackStartEvent { guild_id: RawGuildId },
    #[serde(rename_all = "camelCase")]
    TrackEndEvent {
        guild_id: RawGuildId,
        #[serde(default)]
        reason: TrackEndReason,
    },
    #[serde(rename_all = "camelCase")]
    TrackStuckEvent {
        guild_id: RawGuildId,
        #[serde(default)]
        threshold_ms: u64,
    },
    #[serde(rename_all = "camelCase")]
    TrackExceptionEvent {
        guild_id: RawGuildId,
        #[serde(default)]
        exception: Value,
    },
    #[serde(rename_all = "camelCase")]
    WebSocketClosedEvent {
        guild_id: RawGuildId,
        #[serde(default)]
        code: u16,
        #[serde(default)]
        reason: String,
        #[serde(default)]
        by_remote: bool,
    },
}

impl TrackEvent {
    pub fn guild_id(&self) -> &RawGuildId {
        match self {
            TrackEvent::TrackStartEvent { guild_id }
            | TrackEvent::TrackEndEvent { guild_id, .. }
            | TrackEvent::TrackStuckEvent { guild_id, .. }
            | TrackEvent::TrackExceptionEvent { guild_id, .. }
            | TrackEvent::WebSocketClosedEvent { guild_id, .. } => guild_id,
        }
    }
}

/// Razón de fin de track.
///
/// Acepta tanto la forma v4 (`finished`, `loadFailed`) como la mayúscula
/// (`FINISHED`, `LOAD_FAILED`). Cualquier otra queda en `Other`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(from = "String")]
pub enum TrackEndReason {
    Finished,
    LoadFailed,
    Stopped,
    Replaced,
    Cleanup,
    Other(String),
}

impl TrackEndReason {
    /// Razones que disparan el auto-avance de la cola
    pub fn advances_queue(&self) -> bool {
        matches!(self, TrackEndReason::Finished | TrackEndReason::LoadFailed)
    }
}

impl Default for TrackEndReason {
    fn default() -> Self {
        TrackEndReason::Other("UNKNOWN".to_string())
    }
}

impl From<String> for TrackEndReason {
    fn from(reason: String) -> Self {
        match reason.as_str() {
            "finished" | "FINISHED" => TrackEndReason::Finished,
            "loadFailed" | "LOAD_FAILED" => TrackEndReason::LoadFailed,
            "stopped" | "STOPPED" => TrackEndReason::Stopped,
            "replaced" | "REPLACED" => TrackEndReason::Replaced,
            "cleanup" | "CLEANUP" => TrackEndReason::Cleanup,
            _ => TrackEndReason::Other(reason),
        }
    }
}

/// Guild id tal como llega del nodo: string o número
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum RawGuildId {
    Number(u64),
    Text(String),
}

impl RawGuildId {
    /// Convierte a `GuildId`; un id malformado o cero se descarta
    pub fn resolve(&self) -> Option<GuildId> {
        let id = match self {
            RawGuildId::Number(id) => *id,
            RawGuildId::Text(text) => text.trim().parse::<u64>().ok()?,
        };
        (id != 0).then(|| GuildId::new(id))
    }
}
