pub mod augment;
pub mod config;
pub mod connection;
pub mod coordinator;
pub mod decoder;
pub mod error;
pub mod history;
pub mod orchestrator;
pub mod transcript;

pub use voicechat_session_types as types;

pub use config::CoordinatorConfig;
pub use coordinator::{CoordinatorUpdate, SessionCoordinator};
pub use error::SessionError;
