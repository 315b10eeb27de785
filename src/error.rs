//! Error types for the Lavalink driver.
//!
//! Errors raised inside the event-dispatch loop never leave it: decode and
//! routing failures are logged and dropped. Everything else is returned to
//! the immediate caller of the operation that produced it.

use thiserror::Error;

/// Result type used across the driver
pub type Result<T> = std::result::Result<T, NodeError>;

#[derive(Error, Debug)]
pub enum NodeError {
    /// Fallo de transporte HTTP (conexión, timeout del transporte, cuerpo inválido)
    #[error("HTTP transport error: {0}")]
    Http(#[from] reqwest::Error),

    /// Fallo del stream de eventos (WebSocket)
    #[error("WebSocket transport error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// El nodo no envió `ready` dentro del tiempo de espera
    #[error("handshake timed out after {attempts} checks")]
    HandshakeTimeout { attempts: u32 },

    /// El nodo respondió a un PATCH de player con un estado no exitoso
    #[error("player update failed with HTTP status {status}")]
    PlayerUpdateFailed { status: u16 },

    /// Se intentó una mutación REST antes de completar el handshake
    #[error("node has no session id yet")]
    NoSession,

    /// Mensaje entrante que no se pudo decodificar
    #[error("malformed event: {0}")]
    MalformedEvent(#[from] serde_json::Error),

    /// Evento para un guild sin player registrado o con id inválido
    #[error("invalid tenant: {0}")]
    InvalidTenant(String),

    #[error("manager not started")]
    NotStarted,

    #[error("no nodes available")]
    NoNodesAvailable,

    /// El nodo dueño del player ya fue liberado
    #[error("owning node is gone")]
    NodeGone,

    #[error("invalid header value: {0}")]
    InvalidHeader(String),

    #[error("invalid url: {0}")]
    Url(#[from] url::ParseError),
}

impl NodeError {
    /// Indica si el error proviene de la capa de transporte
    pub fn is_transport(&self) -> bool {
        matches!(self, NodeError::Http(_) | NodeError::WebSocket(_))
    }
}
