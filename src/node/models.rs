//! Wire models for the node's REST API and event payloads.
//!
//! Every inbound model tolerates missing fields: a node on a newer minor
//! version must not break decoding of the fields we actually use.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::audio::voice::VoiceCredential;

/// Cuerpo del `PATCH /v4/sessions/{session}/players/{guild}`.
///
/// Solo se serializan los campos presentes. `encoded_track: Some(None)`
/// se envía como `null` y detiene el track actual.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub voice: Option<VoiceCredential>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub volume: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub encoded_track: Option<Option<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub position: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub paused: Option<bool>,
}

impl PlayerPatch {
    /// Conecta el player a la voz con el volumen actual
    pub fn voice(credential: VoiceCredential, volume: u16) -> Self {
        Self {
            voice: Some(credential),
            volume: Some(volume),
            ..Default::default()
        }
    }

    /// Empieza un track desde el inicio, sin pausa
    pub fn start(encoded: impl Into<String>, volume: u16) -> Self {
        Self {
            encoded_track: Some(Some(encoded.into())),
            position: Some(0),
            volume: Some(volume),
            paused: Some(false),
            ..Default::default()
        }
    }

    /// Limpia el track actual
    pub fn stop() -> Self {
        Self {
            encoded_track: Some(None),
            ..Default::default()
        }
    }

    pub fn paused(paused: bool) -> Self {
        Self {
            paused: Some(paused),
            ..Default::default()
        }
    }

    pub fn volume(volume: u16) -> Self {
        Self {
            volume: Some(volume),
            ..Default::default()
        }
    }

    /// Indica si el patch arranca un track nuevo
    pub fn starts_track(&self) -> bool {
        matches!(self.encoded_track, Some(Some(_)))
    }
}

/// Estado reportado en `playerUpdate`
#[derive(Debug, Clone, Copy, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct PlayerStateUpdate {
    pub position: u64,
    pub time: u64,
    pub connected: bool,
    pub ping: i64,
}

/// Snapshot de `stats`; cada mensaje reemplaza al anterior
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct NodeStats {
    pub players: u32,
    pub playing_players: u32,
    pub uptime: u64,
    pub memory: MemoryStats,
    pub cpu: CpuStats,
    pub frame_stats: Option<FrameStats>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct MemoryStats {
    pub free: u64,
    pub used: u64,
    pub allocated: u64,
    pub reservable: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CpuStats {
    pub cores: u32,
    pub system_load: f64,
    pub lavalink_load: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct FrameStats {
    pub sent: i64,
    pub nulled: i64,
    pub deficit: i64,
}

/// Respuesta de `GET /v4/info`
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct NodeInfo {
    pub version: VersionInfo,
    pub build_time: u64,
    pub jvm: String,
    pub lavaplayer: String,
    pub source_managers: Vec<String>,
    pub filters: Vec<String>,
    pub plugins: Vec<PluginInfo>,
    pub git: Value,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct VersionInfo {
    pub semver: String,
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
    pub pre_release: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PluginInfo {
    pub name: String,
    pub version: String,
}

impl NodeInfo {
    pub fn supports_source(&self, source: &str) -> bool {
        self.source_managers.iter().any(|s| s == source)
    }
}
