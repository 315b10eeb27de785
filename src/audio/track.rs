use chrono::{DateTime, Utc};
use serde_json::Value;
use serenity::model::id::UserId;
use std::{fmt, time::Duration};

/// Track tal como lo reporta el nodo, normalizado.
///
/// Un `Track` siempre tiene payload codificado: [`Track::from_remote`]
/// devuelve `None` cuando el nodo no lo incluye, así que un track inválido
/// nunca llega a la cola.
#[derive(Debug, Clone, PartialEq)]
pub struct Track {
    encoded: String,
    identifier: String,
    title: String,
    author: String,
    duration_ms: u64,
    is_stream: bool,
    is_seekable: bool,
    source_name: String,
    uri: String,
    artwork_url: Option<String>,
    isrc: Option<String>,
    requester: Option<UserId>,
    added_at: DateTime<Utc>,
}

impl Track {
    /// Construye un track desde el JSON del nodo.
    ///
    /// Los campos del objeto `info` anidado tienen prioridad sobre los del
    /// nivel superior. El payload sale de `track` o, en su defecto, de `encoded`.
    pub fn from_remote(data: &Value, requester: Option<UserId>) -> Option<Self> {
        let encoded = non_empty_str(data.get("track"))
            .or_else(|| non_empty_str(data.get("encoded")))?
            .to_string();

        let info = data.get("info").filter(|info| info.is_object());

        Some(Self {
            encoded,
            identifier: pick_str(info, data, "identifier"),
            title: pick_str(info, data, "title"),
            author: pick_str(info, data, "author"),
            duration_ms: pick_u64(info, data, "length"),
            is_stream: pick_bool(info, data, "isStream", false),
            is_seekable: pick_bool(info, data, "isSeekable", true),
            source_name: pick_str(info, data, "sourceName"),
            uri: pick_str(info, data, "uri"),
            artwork_url: Some(pick_str(info, data, "artworkUrl")).filter(|s| !s.is_empty()),
            isrc: Some(pick_str(info, data, "isrc")).filter(|s| !s.is_empty()),
            requester,
            added_at: Utc::now(),
        })
    }

    // Getters
    pub fn encoded(&self) -> &str {
        &self.encoded
    }
    pub fn identifier(&self) -> &str {
        &self.identifier
    }
    pub fn title(&self) -> &str {
        &self.title
    }
    pub fn author(&self) -> &str {
        &self.author
    }
    pub fn duration_ms(&self) -> u64 {
        self.duration_ms
    }
    pub fn duration(&self) -> Duration {
        Duration::from_millis(self.duration_ms)
    }
    pub fn is_stream(&self) -> bool {
        self.is_stream
    }
    pub fn is_seekable(&self) -> bool {
        self.is_seekable
    }
    pub fn source_name(&self) -> &str {
        &self.source_name
    }
    pub fn uri(&self) -> &str {
        &self.uri
    }
    pub fn artwork_url(&self) -> Option<&str> {
        self.artwork_url.as_deref()
    }
    pub fn isrc(&self) -> Option<&str> {
        self.isrc.as_deref()
    }
    pub fn requester(&self) -> Option<UserId> {
        self.requester
    }
    pub fn added_at(&self) -> DateTime<Utc> {
        self.added_at
    }

    /// Duración legible para logs ("3m 20s"); los streams no tienen duración
    pub fn pretty_duration(&self) -> String {
        if self.is_stream {
            "live".to_string()
        } else {
            // Redondeo a segundos para no mostrar milisegundos
            humantime::format_duration(Duration::from_secs(self.duration_ms / 1000)).to_string()
        }
    }
}

impl fmt::Display for Track {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} by {}", self.title, self.author)
    }
}

fn non_empty_str(value: Option<&Value>) -> Option<&str> {
    value.and_then(Value::as_str).filter(|s| !s.is_empty())
}

fn pick_str(info: Option<&Value>, data: &Value, key: &str) -> String {
    non_empty_str(info.and_then(|info| info.get(key)))
        .or_else(|| data.get(key).and_then(Value::as_str))
        .unwrap_or_default()
        .to_string()
}

fn pick_u64(info: Option<&Value>, data: &Value, key: &str) -> u64 {
    info.and_then(|info| info.get(key))
        .and_then(Value::as_u64)
        .filter(|n| *n != 0)
        .or_else(|| data.get(key).and_then(Value::as_u64))
        .unwrap_or(0)
}

fn pick_bool(info: Option<&Value>, data: &Value, key: &str, default: bool) -> bool {
    info.and_then(|info| info.get(key))
        .and_then(Value::as_bool)
        .or_else(|| data.get(key).and_then(Value::as_bool))
        .unwrap_or(default)
}

#[cfg(test)]
pub(crate) fn test_track(id: &str) -> Track {
    Track::from_remote(
        &serde_json::json!({
            "encoded": format!("enc-{id}"),
            "info": { "identifier": id, "title": format!("Song {id}"), "author": "Tester", "length": 180000 }
        }),
        None,
    )
    .expect("test track has payload")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_info_fields_win_over_top_level() {
        let data = json!({
            "encoded": "QAAAjQIAJVJpY2sgQXN0bGV5",
            "title": "top level",
            "info": {
                "identifier": "dQw4w9WgXcQ",
                "title": "Never Gonna Give You Up",
                "author": "Rick Astley",
                "length": 212000,
                "isStream": false,
                "isSeekable": true,
                "sourceName": "youtube",
                "uri": "https://www.youtube.com/watch?v=dQw4w9WgXcQ",
                "artworkUrl": "https://i.ytimg.com/vi/dQw4w9WgXcQ/maxresdefault.jpg"
            }
        });

        let track = Track::from_remote(&data, Some(UserId::new(42))).unwrap();
        assert_eq!(track.encoded(), "QAAAjQIAJVJpY2sgQXN0bGV5");
        assert_eq!(track.title(), "Never Gonna Give You Up");
        assert_eq!(track.author(), "Rick Astley");
        assert_eq!(track.duration_ms(), 212000);
        assert_eq!(track.source_name(), "youtube");
        assert_eq!(track.requester(), Some(UserId::new(42)));
        assert!(track.artwork_url().is_some());
        assert_eq!(track.to_string(), "Never Gonna Give You Up by Rick Astley");
    }

    #[test]
    fn test_track_field_preferred_over_encoded() {
        let data = json!({ "track": "legacy", "encoded": "modern", "title": "flat" });
        let track = Track::from_remote(&data, None).unwrap();
        assert_eq!(track.encoded(), "legacy");
        assert_eq!(track.title(), "flat");
        assert!(track.is_seekable());
        assert!(!track.is_stream());
        assert_eq!(track.duration_ms(), 0);
    }

    #[test]
    fn test_missing_payload_is_discarded() {
        assert!(Track::from_remote(&json!({ "info": { "title": "x" } }), None).is_none());
        assert!(Track::from_remote(&json!({ "encoded": "" }), None).is_none());
    }

    #[test]
    fn test_pretty_duration() {
        let track = test_track("a");
        assert_eq!(track.pretty_duration(), "3m");

        let stream = Track::from_remote(&json!({ "encoded": "x", "info": { "isStream": true } }), None).unwrap();
        assert_eq!(stream.pretty_duration(), "live");
    }
}
