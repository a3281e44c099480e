//! Galaxy arena game server library.

pub mod ai;
pub mod config;
pub mod entity;
pub mod persistence;
pub mod server;
pub mod transport;
pub mod world;

// Re-export commonly used types
pub use config::Config;
pub use server::run;
pub use world::World;
