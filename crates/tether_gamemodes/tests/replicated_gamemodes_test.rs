//! Integration test for teams and scores over replicated sessions.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tether_gamemodes::{ScoreKeeper, TeamEvent, TeamManager};
use tether_session::sandbox::{LoopbackHub, SandboxWorld};
use tether_session::{IdentityRegistry, LogNotifier, MetadataStore, Session, SessionConfig};
use tether_shared::ParticipantId;

const SERVER: ParticipantId = ParticipantId(0);
const P1: ParticipantId = ParticipantId(1);
const P2: ParticipantId = ParticipantId(2);

fn sessions(count: u8) -> (LoopbackHub, Vec<Session>) {
    let hub = LoopbackHub::new(64, SERVER);
    let sessions = (0..count)
        .map(|id| {
            let mut identity = IdentityRegistry::new(ParticipantId(id), SERVER);
            for other in 0..count {
                identity.insert(ParticipantId(other));
            }
            Session::new(
                SessionConfig::default(),
                identity,
                Box::new(hub.connect(ParticipantId(id))),
                Box::new(SandboxWorld::new()),
                Box::new(LogNotifier),
            )
            .unwrap()
        })
        .collect();
    (hub, sessions)
}

fn pump(sessions: &mut [Session]) {
    for _ in 0..3 {
        for session in sessions.iter_mut() {
            session.tick(Duration::from_millis(16));
        }
    }
}

fn team_manager(session: &mut Session) -> (TeamManager, Arc<Mutex<Vec<TeamEvent>>>) {
    let mut teams = TeamManager::from_config(&session.config().teams);
    teams.add_team("Red");
    teams.add_team("Blue");
    teams.register(session.metadata_mut());

    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    teams.subscribe(Box::new(move |e| sink.lock().push(e.clone())));
    (teams, seen)
}

#[test]
fn test_team_assignment_and_removal_reach_every_peer() {
    let (_hub, mut sessions) = sessions(3);
    let managers: Vec<_> = sessions.iter_mut().map(team_manager).collect();

    assert!(managers[0].0.try_assign_team(&mut sessions[0], P1, "Red"));
    pump(&mut sessions);
    for (teams, seen) in &managers {
        assert_eq!(teams.get_player_team(P1).as_deref(), Some("Red"));
        assert_eq!(
            *seen.lock(),
            vec![TeamEvent::Assigned {
                player: P1,
                team: "Red".into()
            }]
        );
    }

    // A client asks; the change shows up everywhere once the server echoes it.
    assert!(managers[2].0.try_unassign_team(&mut sessions[2], P1));
    assert_eq!(managers[2].0.get_player_team(P1).as_deref(), Some("Red"));
    pump(&mut sessions);
    for (teams, seen) in &managers {
        assert_eq!(teams.get_player_team(P1), None);
        assert_eq!(
            seen.lock().last(),
            Some(&TeamEvent::Removed {
                player: P1,
                team: "Red".into()
            })
        );
    }
}

#[test]
fn test_departure_unassigns_player() {
    let (_hub, mut sessions) = sessions(3);
    let managers: Vec<_> = sessions.iter_mut().map(team_manager).collect();
    managers[0].0.try_assign_team(&mut sessions[0], P2, "Blue");
    pump(&mut sessions);

    assert!(sessions[1].participant_left(P2));
    assert_eq!(managers[1].0.get_player_team(P2), None);
    assert_eq!(managers[1].0.get_team_by_name("Blue").map(|t| t.player_count()), Some(0));
}

#[test]
fn test_random_teams_from_the_server() {
    let (_hub, mut sessions) = sessions(4);
    let mut managers: Vec<_> = sessions.iter_mut().map(team_manager).collect();
    let players: Vec<_> = sessions[0].identity().to_vec();

    assert_eq!(managers[0].0.assign_to_random_teams(&mut sessions[0], &players), 4);
    pump(&mut sessions);

    for (teams, _) in &managers {
        assert_eq!(teams.get_team_by_name("Red").map(|t| t.player_count()), Some(2));
        assert_eq!(teams.get_team_by_name("Blue").map(|t| t.player_count()), Some(2));
    }
    let local = sessions[3].identity().local();
    assert!(managers[3].0.get_local_team(local).is_some());
    assert!(managers.iter_mut().all(|(t, _)| t.get_random_team().is_some()));
}

#[test]
fn test_deathmatch_places() {
    let mut store = MetadataStore::new();
    let mut scores = ScoreKeeper::new();
    scores.register(&mut store);

    let (a, b, c) = (ParticipantId(1), ParticipantId(2), ParticipantId(3));
    scores.set_score(&mut store, a, 10);
    scores.set_score(&mut store, b, 20);
    scores.set_score(&mut store, c, 30);

    let players = [a, b, c];
    assert_eq!(scores.get_place(&players, c), Some(1));
    assert_eq!(scores.get_place(&players, b), Some(2));
    assert_eq!(scores.get_place(&players, a), Some(3));
    assert_eq!(scores.get_by_score(&players, 1), Some(c));
    assert_eq!(scores.total_score(), 60);
}

#[test]
fn test_scores_replicate_from_server() {
    let (_hub, mut sessions) = sessions(2);
    let mut keepers: Vec<_> = (0..2).map(|_| ScoreKeeper::new()).collect();
    for (keeper, session) in keepers.iter_mut().zip(sessions.iter_mut()) {
        keeper.register(session.metadata_mut());
    }

    keepers[0].add_score(&mut sessions[0], P1, 3);
    keepers[0].add_score(&mut sessions[0], P1, 4);
    pump(&mut sessions);
    assert_eq!(keepers[1].get_score(P1), 7);

    keepers[0].reset_scores(&mut sessions[0]);
    pump(&mut sessions);
    assert_eq!(keepers[1].get_score(P1), 0);
}
