//! SQLite implementations of the core storage ports

pub mod channel_repository;
pub mod manager;
pub mod mirror_repository;
mod timestamps;

pub use channel_repository::SqliteChannelRepository;
pub use manager::DbManager;
pub use mirror_repository::SqliteMirrorStore;
