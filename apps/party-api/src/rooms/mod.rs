//! The watch-room core: session registry, room state machine, playback
//! synchronization, voice coordination, chat/reactions, and polls.

pub mod events;
pub mod playback;
pub mod polls;
pub mod registry;
pub mod room;
pub mod server;
pub mod voice;
