//! # Audio Module
//!
//! Client-side playback state for each guild. The audio itself is decoded
//! and mixed by the Lavalink node; this module only keeps our view of it in
//! sync.
//!
//! ### [`player`] - Player
//! - Per-guild state machine driven by node events
//! - Playback mutations (play, skip, pause, volume, destroy)
//! - Only one `play()` in flight per guild
//!
//! ### [`queue`] - Queue Management
//! - FIFO queue with shuffle and loop modes
//! - Failed tracks are requeued at the head
//!
//! ### [`track`] - Tracks
//! - Normalized view of the node's track payloads
//!
//! ### [`voice`] - Voice Credentials
//! - Accumulates Discord's voice pieces until they can be sent to the node
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use open_music_lavalink::{audio::player::PlayerOptions, LavalinkManager};
//! use serenity::all::{ChannelId, GuildId};
//!
//! # async fn example(manager: &LavalinkManager) -> anyhow::Result<()> {
//! let guild_id = GuildId::new(123456789);
//! let player = manager.create_connection(
//!     PlayerOptions::new(guild_id).with_voice_channel(ChannelId::new(42)),
//! )?;
//!
//! let result = manager.resolve("lofi beats", None, None).await?;
//! if let Some(track) = result.tracks.into_iter().next() {
//!     player.enqueue(track);
//!     player.play().await;
//! }
//!
//! player.pause().await?;
//! player.resume().await?;
//! player.skip().await;
//! # Ok(())
//! # }
//! ```

pub mod player;
pub mod queue;
pub mod track;
pub mod voice;
