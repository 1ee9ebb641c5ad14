//! # TETHER Gamemodes - Teams and Scores
//!
//! Gameplay state expressed purely as session metadata:
//!
//! - **Teams**: [`TeamManager`] projects the `"Team"` key into team rosters
//! - **Scores**: [`ScoreKeeper`] projects the `"Score"` key and ranks players
//!
//! Both write through any [`MetadataWriter`](tether_session::MetadataWriter),
//! so the same code drives a replicated
//! [`Session`](tether_session::Session) or a bare local store.
//!
//! ## Example
//!
//! ```rust,ignore
//! let mut teams = TeamManager::from_config(&session.config().teams);
//! teams.add_team("Red");
//! teams.add_team("Blue");
//! teams.register(session.metadata_mut());
//! teams.assign_to_random_teams(&mut session, &players);
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

pub mod score;
pub mod teams;

pub use score::{ScoreEvent, ScoreKeeper, ScoreListener};
pub use teams::{Team, TeamEvent, TeamListener, TeamManager};
