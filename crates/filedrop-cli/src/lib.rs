pub mod config;
pub mod server;

pub use config::Config;
pub use filedrop_core::{MemorySessionStore, SessionStore};
pub use server::{router, spawn_reaper, AppState, FiledropServer};
