//! # TETHER Shared
//!
//! Common types used by every participant of a session.
//!
//! ## Contents
//!
//! - [`ids`]: participant and syncable identifiers, handedness
//! - [`math`]: rigid transforms used to replay grabs across peers
//! - [`constants`]: reserved metadata keys, sentinels and default deadlines
//!
//! Nothing in this crate performs I/O or owns session state.

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod constants;
pub mod ids;
pub mod math;

pub use constants::{
    DEFAULT_LOBBY_PHASE_TIMEOUT_SECS, DEFAULT_MOD_INFO_TIMEOUT_SECS, PATH_SENTINEL, SCORE_KEY,
    TEAM_KEY,
};
pub use ids::{Handedness, ParticipantId, SyncableId};
pub use math::{Quaternion, Transform, Vec3};
