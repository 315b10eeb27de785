//! Lavalink v4 client driver for Open Music Bot.
//!
//! Keeps one event-stream connection per node, tracks each node's session
//! and synchronizes per-guild playback state against the node's REST API.

pub mod audio;
pub mod config;
pub mod error;
pub mod manager;
pub mod node;
pub mod search;

pub use audio::player::{IdleReason, PlayOutcome, Player, PlayerOptions};
pub use audio::queue::LoopMode;
pub use audio::track::Track;
pub use config::{Config, NodeConfig};
pub use error::{NodeError, Result};
pub use manager::LavalinkManager;
pub use node::Node;
pub use search::{LoadResult, LoadType, SearchSource};
