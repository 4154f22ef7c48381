//! `plaza_client`
//!
//! Client-side systems:
//! - Connection management (handshake with timeout, reader/writer tasks)
//! - Snapshot reconciliation and sheet resolution for remote entities
//! - Remote entity animation from position updates alone
//! - Local player abstraction and scripted input

pub mod animator;
pub mod input;
pub mod link;
pub mod local;
pub mod remote;
pub mod sync;

pub use sync::ClientSynchronizer;
