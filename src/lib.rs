pub mod monitor;
pub mod streamer_core;
