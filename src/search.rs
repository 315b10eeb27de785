//! Track resolution results.
//!
//! `GET /v4/loadtracks` answers with a `loadType` plus a `data` payload whose
//! shape depends on it. [`LoadResult::from_response`] folds every shape into
//! one struct so callers never branch on raw JSON.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use serenity::model::id::UserId;
use std::str::FromStr;

use crate::audio::track::Track;

/// Prefijo de búsqueda que entiende el nodo
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
pub enum SearchSource {
    #[default]
    YouTube,
    YouTubeMusic,
    SoundCloud,
    /// El query se envía tal cual
    Raw,
}

impl SearchSource {
    pub fn prefix(&self) -> Option<&'static str> {
        match self {
            SearchSource::YouTube => Some("ytsearch"),
            SearchSource::YouTubeMusic => Some("ytmsearch"),
            SearchSource::SoundCloud => Some("scsearch"),
            SearchSource::Raw => None,
        }
    }

    /// Arma el identificador para `loadtracks`. Las URLs http(s) nunca llevan prefijo.
    pub fn format_query(&self, query: &str) -> String {
        let query = query.trim();
        if is_http_url(query) {
            return query.to_string();
        }

        match self.prefix() {
            Some(prefix) => format!("{}:{}", prefix, query),
            None => query.to_string(),
        }
    }
}

impl FromStr for SearchSource {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ytsearch" | "youtube" => Ok(SearchSource::YouTube),
            "ytmsearch" | "youtubemusic" => Ok(SearchSource::YouTubeMusic),
            "scsearch" | "soundcloud" => Ok(SearchSource::SoundCloud),
            "raw" | "none" => Ok(SearchSource::Raw),
            other => anyhow::bail!("Unknown search source: {}", other),
        }
    }
}

fn is_http_url(query: &str) -> bool {
    url::Url::parse(query)
        .map(|url| matches!(url.scheme(), "http" | "https"))
        .unwrap_or(false)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum LoadType {
    Track,
    Playlist,
    Search,
    Empty,
    Error,
}

impl LoadType {
    /// Incluye los nombres heredados de v3 (`NO_MATCHES`, `LOAD_FAILED`, ...)
    pub fn parse(raw: &str) -> Self {
        match raw {
            "track" | "TRACK_LOADED" => LoadType::Track,
            "playlist" | "PLAYLIST_LOADED" => LoadType::Playlist,
            "search" | "SEARCH_RESULT" => LoadType::Search,
            "error" | "LOAD_FAILED" => LoadType::Error,
            _ => LoadType::Empty,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PlaylistInfo {
    pub name: Option<String>,
    pub thumbnail: Option<String>,
    pub selected_track: Option<i64>,
    /// Campos originales del objeto `info`
    pub raw: Map<String, Value>,
}

#[derive(Debug, Clone)]
pub struct LoadResult {
    pub load_type: LoadType,
    pub exception: Option<Value>,
    pub playlist_info: Option<PlaylistInfo>,
    pub plugin_info: Value,
    pub tracks: Vec<Track>,
}

impl LoadResult {
    /// Resultado vacío canónico
    pub fn empty() -> Self {
        Self {
            load_type: LoadType::Empty,
            exception: None,
            playlist_info: None,
            plugin_info: Value::Object(Map::new()),
            tracks: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    /// Construye el resultado desde la respuesta de `loadtracks`.
    ///
    /// Los tracks sin payload codificado se descartan.
    pub fn from_response(response: &Value, requester: Option<UserId>) -> Self {
        let load_type = response
            .get("loadType")
            .and_then(Value::as_str)
            .map(LoadType::parse)
            .unwrap_or(LoadType::Empty);
        let data = response.get("data").filter(|d| !d.is_null());

        let mut result = Self {
            load_type,
            plugin_info: response
                .get("pluginInfo")
                .filter(|p| p.is_object())
                .cloned()
                .unwrap_or_else(|| Value::Object(Map::new())),
            ..Self::empty()
        };

        match (load_type, data) {
            (LoadType::Error, data) => {
                result.exception = data.cloned().or_else(|| response.get("exception").cloned());
            }
            (LoadType::Track, Some(data)) => {
                if let Some(plugin) = data
                    .get("info")
                    .and_then(|info| info.get("pluginInfo"))
                    .or_else(|| data.get("pluginInfo"))
                {
                    result.plugin_info = plugin.clone();
                }
                result.tracks.extend(Track::from_remote(data, requester));
            }
            (LoadType::Playlist, Some(data)) => {
                result.playlist_info = data
                    .get("info")
                    .and_then(Value::as_object)
                    .map(|info| playlist_info(info, data));
                if let Some(plugin) = data.get("pluginInfo") {
                    result.plugin_info = plugin.clone();
                }
                result.tracks = tracks_from(data.get("tracks"), requester);
            }
            (LoadType::Search, Some(data)) => {
                result.tracks = tracks_from(Some(data), requester);
            }
            _ => {}
        }

        result
    }
}

fn tracks_from(list: Option<&Value>, requester: Option<UserId>) -> Vec<Track> {
    list.and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(|item| Track::from_remote(item, requester))
                .collect()
        })
        .unwrap_or_default()
}

fn playlist_info(info: &Map<String, Value>, data: &Value) -> PlaylistInfo {
    let name = ["name", "title"]
        .iter()
        .find_map(|key| info.get(*key).and_then(Value::as_str).filter(|s| !s.is_empty()))
        .map(str::to_string);

    let plugin_artwork = data
        .get("pluginInfo")
        .and_then(|p| p.get("artworkUrl"))
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty());
    let first_track_artwork = || {
        data.get("tracks")
            .and_then(|tracks| tracks.get(0))
            .and_then(|track| track.get("info"))
            .and_then(|info| info.get("artworkUrl"))
            .and_then(Value::as_str)
    };

    PlaylistInfo {
        name,
        thumbnail: plugin_artwork.or_else(first_track_artwork).map(str::to_string),
        selected_track: info.get("selectedTrack").and_then(Value::as_i64),
        raw: info.clone(),
    }
}
