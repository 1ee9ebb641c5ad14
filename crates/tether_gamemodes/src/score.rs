//! # Score Keeper
//!
//! Per-player integer scores stored under the `"Score"` key each player owns.
//! Only the session's authoritative peer should write them; everyone reads the
//! projection this keeper rebuilds from store events.
//!
//! ## Placement
//!
//! Places are 1-based over a caller-supplied player list, highest score first.
//! Equal scores are ordered by participant id so every peer ranks the same way.
//! A stored value that is not an integer counts as no score at all.

use std::cmp::Reverse;
use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tether_session::{
    MetadataEvent, MetadataInterest, MetadataStore, MetadataWriter, SubscriptionId,
};
use tether_shared::{ParticipantId, SCORE_KEY};

/// A player's score changed. Removal reports a score of zero.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ScoreEvent {
    /// Player whose score changed.
    pub player: ParticipantId,
    /// New score.
    pub score: i32,
}

/// Callback for score changes. Must not call back into its [`ScoreKeeper`].
pub type ScoreListener = Box<dyn FnMut(&ScoreEvent) + Send>;

#[derive(Default)]
struct Shared {
    scores: Mutex<BTreeMap<ParticipantId, i32>>,
    listeners: Mutex<Vec<ScoreListener>>,
}

impl Shared {
    fn on_metadata(&self, event: &MetadataEvent) {
        let score_event = match event {
            MetadataEvent::Changed { owner, value, .. } => match value.parse::<i32>() {
                Ok(score) => {
                    self.scores.lock().insert(*owner, score);
                    ScoreEvent { player: *owner, score }
                }
                Err(_) => {
                    // Unparseable scores read as absent, same as a removal.
                    tracing::warn!(player = %owner, %value, "Non-numeric score treated as zero");
                    self.scores.lock().remove(owner);
                    ScoreEvent {
                        player: *owner,
                        score: 0,
                    }
                }
            },
            MetadataEvent::Removed { owner, .. } => {
                self.scores.lock().remove(owner);
                ScoreEvent {
                    player: *owner,
                    score: 0,
                }
            }
        };

        for listener in self.listeners.lock().iter_mut() {
            listener(&score_event);
        }
    }
}

/// Projection of the `"Score"` key.
pub struct ScoreKeeper {
    shared: Arc<Shared>,
    subscription: Option<SubscriptionId>,
}

impl ScoreKeeper {
    /// Creates an unregistered keeper with no scores.
    #[must_use]
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Shared::default()),
            subscription: None,
        }
    }

    /// Starts following `store`. Returns false if already registered.
    pub fn register(&mut self, store: &mut MetadataStore) -> bool {
        if self.subscription.is_some() {
            return false;
        }
        let shared = Arc::clone(&self.shared);
        self.subscription = Some(store.subscribe(
            MetadataInterest::Key(SCORE_KEY.to_string()),
            Box::new(move |event| shared.on_metadata(event)),
        ));
        true
    }

    /// Stops following `store`.
    pub fn unregister(&mut self, store: &mut MetadataStore) -> bool {
        self.subscription
            .take()
            .is_some_and(|id| store.unsubscribe(id))
    }

    /// Adds a score listener.
    pub fn subscribe(&self, listener: ScoreListener) {
        self.shared.listeners.lock().push(listener);
    }

    /// Writes `score` as `player`'s score.
    pub fn set_score(
        &self,
        writer: &mut (impl MetadataWriter + ?Sized),
        player: ParticipantId,
        score: i32,
    ) -> bool {
        writer.try_set_metadata(player, SCORE_KEY, &score.to_string())
    }

    /// Adds `amount` to `player`'s current score, saturating.
    pub fn add_score(
        &self,
        writer: &mut (impl MetadataWriter + ?Sized),
        player: ParticipantId,
        amount: i32,
    ) -> bool {
        let score = self.get_score(player).saturating_add(amount);
        self.set_score(writer, player, score)
    }

    /// Current score of `player`, zero if none is recorded.
    #[must_use]
    pub fn get_score(&self, player: ParticipantId) -> i32 {
        self.shared.scores.lock().get(&player).copied().unwrap_or(0)
    }

    /// Sum of every recorded score.
    #[must_use]
    pub fn total_score(&self) -> i64 {
        self.shared.scores.lock().values().map(|&s| i64::from(s)).sum()
    }

    /// Removes every recorded score. Returns how many removals were issued.
    pub fn reset_scores(&self, writer: &mut (impl MetadataWriter + ?Sized)) -> usize {
        let players: Vec<_> = self.shared.scores.lock().keys().copied().collect();
        let removed = players
            .into_iter()
            .filter(|&player| writer.try_remove_metadata(player, SCORE_KEY))
            .count();
        tracing::debug!(removed, "Scores reset");
        removed
    }

    // =========================================================================
    // PLACEMENT
    // =========================================================================

    /// `players` ordered best first.
    #[must_use]
    pub fn players_by_score(&self, players: &[ParticipantId]) -> Vec<ParticipantId> {
        let scores = self.shared.scores.lock();
        let mut ranked = players.to_vec();
        ranked.sort_by_key(|p| (Reverse(scores.get(p).copied().unwrap_or(0)), *p));
        ranked
    }

    /// Player holding 1-based `place`, if that many players exist.
    #[must_use]
    pub fn get_by_score(&self, players: &[ParticipantId], place: usize) -> Option<ParticipantId> {
        let index = place.checked_sub(1)?;
        self.players_by_score(players).get(index).copied()
    }

    /// 1-based place of `player`, or `None` if it is not in `players`.
    #[must_use]
    pub fn get_place(&self, players: &[ParticipantId], player: ParticipantId) -> Option<usize> {
        self.players_by_score(players)
            .iter()
            .position(|p| *p == player)
            .map(|i| i + 1)
    }
}

impl Default for ScoreKeeper {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ScoreKeeper {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScoreKeeper")
            .field("scores", &*self.shared.scores.lock())
            .field("registered", &self.subscription.is_some())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keeper() -> (MetadataStore, ScoreKeeper) {
        let mut store = MetadataStore::new();
        let mut scores = ScoreKeeper::new();
        scores.register(&mut store);
        (store, scores)
    }

    #[test]
    fn test_add_score_accumulates() {
        let (mut store, scores) = keeper();
        let p = ParticipantId(4);
        assert_eq!(scores.get_score(p), 0);
        scores.add_score(&mut store, p, 1);
        scores.add_score(&mut store, p, 2);
        assert_eq!(scores.get_score(p), 3);
        assert_eq!(store.read(p, SCORE_KEY), Some("3"));
        assert_eq!(scores.total_score(), 3);
    }

    #[test]
    fn test_saturates() {
        let (mut store, scores) = keeper();
        let p = ParticipantId(1);
        scores.set_score(&mut store, p, i32::MAX);
        scores.add_score(&mut store, p, 5);
        assert_eq!(scores.get_score(p), i32::MAX);
    }

    #[test]
    fn test_events_and_reset() {
        let (mut store, scores) = keeper();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        scores.subscribe(Box::new(move |e| sink.lock().push(*e)));

        scores.set_score(&mut store, ParticipantId(1), 5);
        scores.set_score(&mut store, ParticipantId(2), 7);
        assert_eq!(scores.reset_scores(&mut store), 2);
        assert_eq!(scores.total_score(), 0);
        assert_eq!(
            seen.lock().last(),
            Some(&ScoreEvent {
                player: ParticipantId(2),
                score: 0
            })
        );
    }

    #[test]
    fn test_non_numeric_value_reads_as_no_score() {
        let (mut store, scores) = keeper();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        scores.subscribe(Box::new(move |e| sink.lock().push(*e)));

        let p = ParticipantId(1);
        store.write(p, SCORE_KEY, "12");
        store.write(p, SCORE_KEY, "lots");
        assert_eq!(scores.get_score(p), 0);
        assert_eq!(scores.total_score(), 0);
        assert_eq!(scores.players_by_score(&[p]), vec![p]);
        assert_eq!(
            seen.lock().last(),
            Some(&ScoreEvent {
                player: p,
                score: 0
            })
        );

        scores.add_score(&mut store, p, 2);
        assert_eq!(scores.get_score(p), 2);
        assert_eq!(store.read(p, SCORE_KEY), Some("2"));
    }

    #[test]
    fn test_ties_ordered_by_id() {
        let (mut store, scores) = keeper();
        let players = [ParticipantId(3), ParticipantId(1), ParticipantId(2)];
        for p in players {
            scores.set_score(&mut store, p, 10);
        }
        assert_eq!(
            scores.players_by_score(&players),
            vec![ParticipantId(1), ParticipantId(2), ParticipantId(3)]
        );
        assert_eq!(scores.get_by_score(&players, 0), None);
        assert_eq!(scores.get_by_score(&players, 4), None);
        assert_eq!(scores.get_place(&players, ParticipantId(9)), None);
    }
}
