//! `plaza_server`
//!
//! Server-side systems:
//! - Asset store (content-addressed sprite sheets)
//! - World state table (authoritative session positions and appearance)
//! - Session protocol handler (message dispatch, lifecycle)
//! - Event loop and connection tasks
//!
//! Networking model:
//! - TCP, one length-prefixed JSON stream per session
//! - Every world mutation is followed by a full snapshot broadcast

pub mod assets;
pub mod handler;
pub mod server;
pub mod world;

pub use server::GameServer;
