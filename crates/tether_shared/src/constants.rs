//! # Protocol Constants
//!
//! Values every peer must agree on. Changing any of these breaks
//! compatibility with peers running an older build.

// =============================================================================
// GRAB PROTOCOL
// =============================================================================

/// Path hint meaning "use the syncable id only, the object is already known".
pub const PATH_SENTINEL: &str = "_";

// =============================================================================
// REQUEST DEADLINES
// =============================================================================

/// Deadline for a mod availability query, in seconds.
pub const DEFAULT_MOD_INFO_TIMEOUT_SECS: f32 = 5.0;

/// Deadline for each phase of lobby discovery, in seconds.
pub const DEFAULT_LOBBY_PHASE_TIMEOUT_SECS: f32 = 20.0;

// =============================================================================
// RESERVED METADATA KEYS
// =============================================================================

/// Per-player key holding the name of the player's team.
pub const TEAM_KEY: &str = "Team";

/// Per-player key holding the player's integer score.
pub const SCORE_KEY: &str = "Score";
