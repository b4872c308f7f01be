pub mod api;
pub mod channel;
pub mod config;
pub mod notify;
pub mod poll;
pub mod settings;
pub mod state;
pub mod sync;
pub mod telemetry;
pub mod transport;

pub use config::Config;
pub use sync::{FeedState, ScopeFilter, SessionError, SyncController, View};
