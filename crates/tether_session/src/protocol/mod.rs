//! # Session Protocol
//!
//! Binary frames exchanged between participants.
//!
//! ## Frame Structure
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │ Tag (1 byte)                                                 │
//! ├──────────────────────────────────────────────────────────────┤
//! │ Record (variable, tag-specific)                              │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Design Philosophy
//!
//! - Grab records are the only bit-exact boundary
//! - Correlated records all start with the same header
//! - A frame that decodes with bytes left over is malformed

mod codec;
mod messages;

pub use codec::{MessageReader, MessageWriter};
pub use messages::{
    Correlation, GrabMessage, LobbyIdsResponse, LobbyMetadata, LobbyMetadataRequest,
    LobbyMetadataResponse, MessageTag, MetadataMessage, ModFile, ModInfoRequest,
    ModInfoResponse, SessionMessage, WireOffset,
};
