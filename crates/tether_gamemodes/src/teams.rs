//! # Team Manager
//!
//! Team membership lives in session metadata: a player's team is the value of
//! the `"Team"` key that player owns. Joining is a write, leaving is a removal.
//! The manager keeps a local projection of that key, rebuilt from store
//! events, and raises [`TeamEvent`]s as it changes.
//!
//! ## Propagation
//!
//! Writes made through a replicated writer land in the projection only after
//! the server echoes them. Anything that reads the projection right after
//! writing sees the old state:
//!
//! - [`TeamManager::assign_to_random_teams`] does not read it and is safe for
//!   bulk assignment at round start.
//! - [`TeamManager::assign_to_smallest_team`] does read it. Use it for late
//!   joins only; during bulk assignment it keeps picking the same team.

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::Mutex;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tether_session::{
    MetadataEvent, MetadataInterest, MetadataStore, MetadataWriter, SubscriptionId, TeamConfig,
};
use tether_shared::{ParticipantId, TEAM_KEY};

/// A change in team membership.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TeamEvent {
    /// `player` joined `team`.
    Assigned {
        /// Player that joined.
        player: ParticipantId,
        /// Team name.
        team: String,
    },
    /// `player` left `team`.
    Removed {
        /// Player that left.
        player: ParticipantId,
        /// Team name.
        team: String,
    },
}

/// Callback for membership changes.
///
/// Runs inside the metadata store's notification. It must not call back
/// into the [`TeamManager`] that raised it.
pub type TeamListener = Box<dyn FnMut(&TeamEvent) + Send>;

/// Snapshot of one team.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Team {
    /// Team name, also the metadata value that selects it.
    pub name: String,
    /// Members in id order.
    pub players: Vec<ParticipantId>,
}

impl Team {
    /// Number of members.
    #[must_use]
    pub fn player_count(&self) -> usize {
        self.players.len()
    }
}

#[derive(Debug, Default)]
struct Roster {
    /// Registration order drives round-robin assignment.
    teams: Vec<String>,
    assignments: BTreeMap<ParticipantId, String>,
}

impl Roster {
    fn is_team(&self, name: &str) -> bool {
        self.teams.iter().any(|t| t == name)
    }

    fn members(&self, team: &str) -> Vec<ParticipantId> {
        self.assignments
            .iter()
            .filter(|(_, t)| t.as_str() == team)
            .map(|(p, _)| *p)
            .collect()
    }

    fn apply(&mut self, event: &MetadataEvent) -> Vec<TeamEvent> {
        let mut raised = Vec::new();
        match event {
            MetadataEvent::Changed { owner, value, .. } => {
                if let Some(previous) = self.assignments.insert(*owner, value.clone()) {
                    if self.is_team(&previous) {
                        raised.push(TeamEvent::Removed {
                            player: *owner,
                            team: previous,
                        });
                    }
                }
                if self.is_team(value) {
                    raised.push(TeamEvent::Assigned {
                        player: *owner,
                        team: value.clone(),
                    });
                }
            }
            MetadataEvent::Removed { owner, value, .. } => {
                self.assignments.remove(owner);
                if self.is_team(value) {
                    raised.push(TeamEvent::Removed {
                        player: *owner,
                        team: value.clone(),
                    });
                }
            }
        }
        raised
    }
}

#[derive(Default)]
struct Shared {
    roster: Mutex<Roster>,
    listeners: Mutex<Vec<TeamListener>>,
}

impl Shared {
    fn on_metadata(&self, event: &MetadataEvent) {
        // Roster lock is released before listeners run.
        let raised = self.roster.lock().apply(event);
        if raised.is_empty() {
            return;
        }
        let mut listeners = self.listeners.lock();
        for team_event in &raised {
            tracing::debug!(?team_event, "Team membership changed");
            for listener in listeners.iter_mut() {
                listener(team_event);
            }
        }
    }
}

/// Projection of the `"Team"` key plus the set of known teams.
pub struct TeamManager {
    shared: Arc<Shared>,
    subscription: Option<SubscriptionId>,
    rng: ChaCha8Rng,
}

impl TeamManager {
    /// Creates a manager whose shuffles are driven by `seed`.
    #[must_use]
    pub fn new(seed: u64) -> Self {
        Self {
            shared: Arc::new(Shared::default()),
            subscription: None,
            rng: ChaCha8Rng::seed_from_u64(seed),
        }
    }

    /// Creates a manager seeded from session configuration.
    #[must_use]
    pub fn from_config(config: &TeamConfig) -> Self {
        Self::new(config.shuffle_seed)
    }

    /// Starts following `store`. Returns false if already registered.
    pub fn register(&mut self, store: &mut MetadataStore) -> bool {
        if self.subscription.is_some() {
            tracing::warn!("TeamManager registered twice");
            return false;
        }
        let shared = Arc::clone(&self.shared);
        let id = store.subscribe(
            MetadataInterest::Key(TEAM_KEY.to_string()),
            Box::new(move |event| shared.on_metadata(event)),
        );
        self.subscription = Some(id);
        true
    }

    /// Stops following `store`. The projection keeps its last state.
    pub fn unregister(&mut self, store: &mut MetadataStore) -> bool {
        self.subscription
            .take()
            .is_some_and(|id| store.unsubscribe(id))
    }

    /// Returns true while following a store.
    #[must_use]
    pub const fn is_registered(&self) -> bool {
        self.subscription.is_some()
    }

    /// Adds a membership listener.
    pub fn subscribe(&self, listener: TeamListener) {
        self.shared.listeners.lock().push(listener);
    }

    // =========================================================================
    // TEAMS
    // =========================================================================

    /// Adds a team. Returns false if the name is taken.
    pub fn add_team(&self, name: &str) -> bool {
        let mut roster = self.shared.roster.lock();
        if roster.is_team(name) {
            return false;
        }
        roster.teams.push(name.to_string());
        true
    }

    /// Removes a team. Members keep their metadata value.
    pub fn remove_team(&self, name: &str) -> bool {
        let mut roster = self.shared.roster.lock();
        let before = roster.teams.len();
        roster.teams.retain(|t| t != name);
        roster.teams.len() != before
    }

    /// Unassigns `players`, then removes every team.
    pub fn clear_teams(
        &self,
        writer: &mut (impl MetadataWriter + ?Sized),
        players: &[ParticipantId],
    ) {
        self.unassign_all_players(writer, players);
        self.shared.roster.lock().teams.clear();
    }

    /// Team names in registration order.
    #[must_use]
    pub fn teams(&self) -> Vec<String> {
        self.shared.roster.lock().teams.clone()
    }

    /// Snapshot of the team called `name`.
    #[must_use]
    pub fn get_team_by_name(&self, name: &str) -> Option<Team> {
        let roster = self.shared.roster.lock();
        roster.is_team(name).then(|| Team {
            name: name.to_string(),
            players: roster.members(name),
        })
    }

    // =========================================================================
    // ASSIGNMENT
    // =========================================================================

    /// Writes `team` as `player`'s team.
    ///
    /// Returns false if `team` is unknown or the writer refused.
    pub fn try_assign_team(
        &self,
        writer: &mut (impl MetadataWriter + ?Sized),
        player: ParticipantId,
        team: &str,
    ) -> bool {
        if !self.shared.roster.lock().is_team(team) {
            tracing::warn!(%player, team, "Cannot assign player to unknown team");
            return false;
        }
        writer.try_set_metadata(player, TEAM_KEY, team)
    }

    /// Removes `player`'s team key.
    pub fn try_unassign_team(
        &self,
        writer: &mut (impl MetadataWriter + ?Sized),
        player: ParticipantId,
    ) -> bool {
        writer.try_remove_metadata(player, TEAM_KEY)
    }

    /// Unassigns every player in `players`. Returns how many removals were issued.
    pub fn unassign_all_players(
        &self,
        writer: &mut (impl MetadataWriter + ?Sized),
        players: &[ParticipantId],
    ) -> usize {
        players
            .iter()
            .filter(|&&player| self.try_unassign_team(writer, player))
            .count()
    }

    /// Shuffles `players` and deals them round-robin over the teams.
    ///
    /// Team sizes differ by at most one. Returns how many writes were issued.
    pub fn assign_to_random_teams(
        &mut self,
        writer: &mut (impl MetadataWriter + ?Sized),
        players: &[ParticipantId],
    ) -> usize {
        let teams = self.teams();
        if teams.is_empty() {
            tracing::warn!(players = players.len(), "No teams to assign players to");
            return 0;
        }

        let mut shuffled = players.to_vec();
        shuffled.shuffle(&mut self.rng);

        let assigned = shuffled
            .iter()
            .zip(teams.iter().cycle())
            .filter(|(player, team)| writer.try_set_metadata(**player, TEAM_KEY, team))
            .count();
        tracing::info!(assigned, teams = teams.len(), "Assigned players to random teams");
        assigned
    }

    /// Puts `player` on the team with the fewest members.
    ///
    /// Reads the local projection; see the module docs before using this for
    /// more than one player at a time.
    pub fn assign_to_smallest_team(
        &self,
        writer: &mut (impl MetadataWriter + ?Sized),
        player: ParticipantId,
    ) -> bool {
        match self.get_team_with_fewest_players() {
            Some(team) => writer.try_set_metadata(player, TEAM_KEY, &team),
            None => false,
        }
    }

    // =========================================================================
    // QUERIES
    // =========================================================================

    /// Team `player` is on, if it is a known team.
    #[must_use]
    pub fn get_player_team(&self, player: ParticipantId) -> Option<String> {
        let roster = self.shared.roster.lock();
        roster
            .assignments
            .get(&player)
            .filter(|team| roster.is_team(team))
            .cloned()
    }

    /// Team of the local participant.
    #[must_use]
    pub fn get_local_team(&self, local: ParticipantId) -> Option<String> {
        self.get_player_team(local)
    }

    /// Any known team, chosen by the manager's generator.
    pub fn get_random_team(&mut self) -> Option<String> {
        let teams = self.teams();
        if teams.is_empty() {
            return None;
        }
        let index = self.rng.gen_range(0..teams.len());
        teams.into_iter().nth(index)
    }

    /// Smallest team by local membership. Ties go to the earlier-added team.
    #[must_use]
    pub fn get_team_with_fewest_players(&self) -> Option<String> {
        let roster = self.shared.roster.lock();
        roster
            .teams
            .iter()
            .min_by_key(|team| roster.members(team).len())
            .cloned()
    }
}

impl std::fmt::Debug for TeamManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let roster = self.shared.roster.lock();
        f.debug_struct("TeamManager")
            .field("teams", &roster.teams)
            .field("assignments", &roster.assignments)
            .field("registered", &self.subscription.is_some())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const P1: ParticipantId = ParticipantId(1);
    const P2: ParticipantId = ParticipantId(2);

    fn setup() -> (MetadataStore, TeamManager, Arc<Mutex<Vec<TeamEvent>>>) {
        let mut store = MetadataStore::new();
        let mut teams = TeamManager::new(7);
        teams.add_team("Red");
        teams.add_team("Blue");
        assert!(teams.register(&mut store));

        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        teams.subscribe(Box::new(move |e| sink.lock().push(e.clone())));
        (store, teams, seen)
    }

    #[test]
    fn test_switching_teams_raises_removal_then_assignment() {
        let (mut store, teams, seen) = setup();

        assert!(teams.try_assign_team(&mut store, P1, "Red"));
        assert!(teams.try_assign_team(&mut store, P1, "Blue"));

        assert_eq!(
            *seen.lock(),
            vec![
                TeamEvent::Assigned { player: P1, team: "Red".into() },
                TeamEvent::Removed { player: P1, team: "Red".into() },
                TeamEvent::Assigned { player: P1, team: "Blue".into() },
            ]
        );
        assert_eq!(teams.get_player_team(P1).as_deref(), Some("Blue"));
        assert_eq!(teams.get_team_by_name("Blue").map(|t| t.player_count()), Some(1));
        assert_eq!(teams.get_team_by_name("Red").map(|t| t.player_count()), Some(0));
    }

    #[test]
    fn test_unknown_team_is_refused() {
        let (mut store, teams, seen) = setup();
        assert!(!teams.try_assign_team(&mut store, P1, "Green"));
        assert_eq!(store.read(P1, TEAM_KEY), None);

        // A foreign write naming an unknown team is tracked but not reported.
        store.write(P2, TEAM_KEY, "Green");
        assert!(seen.lock().is_empty());
        assert_eq!(teams.get_player_team(P2), None);
    }

    #[test]
    fn test_other_keys_are_ignored() {
        let (mut store, teams, seen) = setup();
        store.write(P1, "Score", "Red");
        assert!(seen.lock().is_empty());
        assert_eq!(teams.get_player_team(P1), None);
    }

    #[test]
    fn test_random_assignment_is_balanced() {
        let (mut store, mut teams, _) = setup();
        teams.add_team("Green");
        let players: Vec<_> = (0..10).map(ParticipantId).collect();

        assert_eq!(teams.assign_to_random_teams(&mut store, &players), 10);
        let sizes: Vec<_> = teams
            .teams()
            .iter()
            .filter_map(|name| teams.get_team_by_name(name))
            .map(|t| t.player_count())
            .collect();
        assert_eq!(sizes.iter().sum::<usize>(), 10);
        assert!(sizes.iter().max().unwrap() - sizes.iter().min().unwrap() <= 1);
    }

    #[test]
    fn test_random_assignment_is_seeded() {
        let players: Vec<_> = (0..8).map(ParticipantId).collect();
        let run = || {
            let (mut store, mut teams, _) = setup();
            teams.assign_to_random_teams(&mut store, &players);
            players.iter().map(|p| teams.get_player_team(*p)).collect::<Vec<_>>()
        };
        assert_eq!(run(), run());
    }

    #[test]
    fn test_no_teams_assigns_nobody() {
        let mut store = MetadataStore::new();
        let mut teams = TeamManager::new(0);
        teams.register(&mut store);
        assert_eq!(teams.assign_to_random_teams(&mut store, &[P1, P2]), 0);
        assert!(!teams.assign_to_smallest_team(&mut store, P1));
        assert_eq!(teams.get_random_team(), None);
    }

    #[test]
    fn test_smallest_team_for_late_join() {
        let (mut store, teams, _) = setup();
        teams.try_assign_team(&mut store, P1, "Red");
        assert_eq!(teams.get_team_with_fewest_players().as_deref(), Some("Blue"));
        assert!(teams.assign_to_smallest_team(&mut store, P2));
        assert_eq!(teams.get_player_team(P2).as_deref(), Some("Blue"));
    }

    #[test]
    fn test_clear_teams_unassigns_everyone() {
        let (mut store, teams, seen) = setup();
        teams.try_assign_team(&mut store, P1, "Red");
        teams.try_assign_team(&mut store, P2, "Blue");
        seen.lock().clear();

        teams.clear_teams(&mut store, &[P1, P2]);
        assert!(teams.teams().is_empty());
        assert_eq!(store.read(P1, TEAM_KEY), None);
        assert_eq!(seen.lock().len(), 2);
    }

    #[test]
    fn test_unregister_stops_tracking() {
        let (mut store, mut teams, seen) = setup();
        assert!(teams.unregister(&mut store));
        assert!(!teams.unregister(&mut store));
        store.write(P1, TEAM_KEY, "Red");
        assert!(seen.lock().is_empty());
        assert_eq!(store.listener_count(), 0);
    }
}
