//! # TETHER Session - Shared State for Peer-Hosted Sessions
//!
//! Keeps a small amount of state consistent between one server and several
//! clients, on top of whatever transport and physics engine the host provides.
//!
//! ## Architecture
//!
//! - **Identity**: participants are small integers, lowest free first
//! - **Metadata**: per-owner string key/values, last message wins, listeners
//! - **Ownership**: syncable objects with grips held by at most one hand
//! - **Grab transfer**: grab/release events replayed with hand-relative offsets
//! - **Requests**: tracker-id correlation with cooperative, tick-polled timeouts
//!
//! ## Collaborators
//!
//! ```text
//!            ┌───────────────┐
//!  frames ──►│ MessageChannel│──► Session::tick ──► MetadataStore ──► listeners
//!            └───────────────┘          │
//!                                       ├──► OwnershipDirectory ──► PhysicsWorld
//!                                       └──► RequestEngine ──► Notifier
//! ```
//!
//! Nothing here terminates a session: malformed input is logged and dropped,
//! races are dropped quietly, timeouts become failure results.
//!
//! ## Example
//!
//! ```rust,ignore
//! use tether_session::{IdentityRegistry, LogNotifier, Session, SessionConfig};
//!
//! let mut session = Session::new(
//!     SessionConfig::from_file("session.toml")?,
//!     IdentityRegistry::new(local, server),
//!     Box::new(transport),
//!     Box::new(physics),
//!     Box::new(LogNotifier),
//! )?;
//! loop {
//!     session.tick(frame_time);
//! }
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

pub mod channel;
pub mod config;
pub mod directory;
pub mod error;
pub mod grab;
pub mod identity;
pub mod lobby;
pub mod metadata;
pub mod mods;
pub mod notify;
pub mod physics;
pub mod protocol;
pub mod request;
pub mod sandbox;
pub mod session;
pub mod syncable;

// Re-exports for convenience
pub use channel::{Destination, InboundFrame, MessageChannel, NetworkChannel};
pub use config::{ChannelConfig, RequestConfig, SessionConfig, TeamConfig};
pub use directory::OwnershipDirectory;
pub use error::{CodecError, CodecResult, RequestError, SessionError, SessionResult};
pub use grab::{apply_grab, GrabOutcome, RelativeOffset};
pub use identity::IdentityRegistry;
pub use lobby::{LobbyDirectory, LobbyFinder, LobbyReply, LobbySearchCallback};
pub use metadata::{
    MetadataEvent, MetadataInterest, MetadataListener, MetadataStore, MetadataWriter,
    SubscriptionId,
};
pub use mods::{
    BeginCallback, InstallCallback, ModCatalog, ModInfo, ModInstallRequest, ModInstaller,
    ModRequester, ModTransaction,
};
pub use notify::{LogNotifier, Notification, Notifier, RecordingNotifier, Severity};
pub use physics::{ObjectHandle, PhysicsWorld};
pub use protocol::{GrabMessage, LobbyMetadata, ModFile, SessionMessage};
pub use request::{Continuation, RequestEngine, ResponseWaiter, TrackerId};
pub use session::Session;
pub use syncable::{Grip, Holder, Syncable};
