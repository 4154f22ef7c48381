//! `plaza_shared`
//!
//! Shared libraries used by both client and server.
//!
//! Design goals:
//! - One wire format, one framing, one definition of a valid sheet.
//! - Clear separation of concerns (protocol, net, sheets, rendering).
//! - Traits at the seams the client collaborators plug into.
//! - No `unsafe`.

pub mod appearance;
pub mod config;
pub mod math;
pub mod net;
pub mod protocol;
pub mod render;
pub mod sheet;
pub mod sprite;

pub mod prelude {
    //! Commonly used exports.

    pub use crate::appearance::*;
    pub use crate::config::*;
    pub use crate::math::*;
    pub use crate::protocol::*;
    pub use crate::sheet::{SheetError, SheetPayload, MAX_SHEET_BYTES};
}
