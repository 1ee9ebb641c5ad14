//! # Lobby Discovery
//!
//! Two-phase search against the server's lobby directory:
//!
//! 1. Request the list of lobby ids
//! 2. Request metadata for each lobby, one at a time
//!
//! Each phase has its own deadline. Lobbies without an open server are left
//! out of the result.

use std::collections::VecDeque;
use std::time::Duration;

use tether_shared::ParticipantId;

use crate::channel::{Destination, MessageChannel};
use crate::config::RequestConfig;
use crate::error::RequestError;
use crate::notify::{Notification, Notifier, Severity};
use crate::protocol::{
    Correlation, LobbyIdsResponse, LobbyMetadata, LobbyMetadataRequest, LobbyMetadataResponse,
    SessionMessage,
};
use crate::request::{RequestEngine, ResponseWaiter, TrackerId};

/// Directory of lobbies, answered by the server.
pub trait LobbyDirectory {
    /// Every lobby currently listed.
    fn lobby_ids(&self) -> Vec<u64>;

    /// Description of one lobby, if it is still listed.
    fn lobby_metadata(&self, lobby_id: u64) -> Option<LobbyMetadata>;
}

/// Answer payload of a lobby request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LobbyReply {
    /// Listed lobby ids.
    Ids(Vec<u64>),
    /// One lobby's description.
    Metadata(LobbyMetadata),
}

/// Called once with the open lobbies, or why the search failed.
pub type LobbySearchCallback = Box<dyn FnOnce(Result<Vec<LobbyMetadata>, RequestError>) + Send>;

/// Builds the server's answer to a lobby id request.
#[must_use]
pub fn answer_lobby_ids(
    request: Correlation,
    local: ParticipantId,
    directory: Option<&dyn LobbyDirectory>,
) -> LobbyIdsResponse {
    LobbyIdsResponse {
        correlation: Correlation {
            tracker: request.tracker,
            sender: local,
        },
        lobbies: directory.map(|d| d.lobby_ids()).unwrap_or_default(),
    }
}

/// Builds the server's answer to a lobby metadata request.
///
/// A lobby that is no longer listed is reported as closed.
#[must_use]
pub fn answer_lobby_metadata(
    request: &LobbyMetadataRequest,
    local: ParticipantId,
    directory: Option<&dyn LobbyDirectory>,
) -> LobbyMetadataResponse {
    let metadata = directory
        .and_then(|d| d.lobby_metadata(request.lobby_id))
        .unwrap_or_else(|| LobbyMetadata {
            lobby_id: request.lobby_id,
            host_name: String::new(),
            player_count: 0,
            max_players: 0,
            has_server_open: false,
        });
    LobbyMetadataResponse {
        correlation: Correlation {
            tracker: request.correlation.tracker,
            sender: local,
        },
        metadata,
    }
}

enum Phase {
    AwaitingIds(ResponseWaiter<LobbyReply>),
    AwaitingMetadata {
        waiter: ResponseWaiter<LobbyReply>,
        remaining: VecDeque<u64>,
    },
}

struct LobbySearch {
    phase: Phase,
    found: Vec<LobbyMetadata>,
    callback: LobbySearchCallback,
}

/// Runs lobby searches as tick-polled tasks.
pub struct LobbyFinder {
    engine: RequestEngine<LobbyReply>,
    searches: Vec<LobbySearch>,
    phase_timeout: Duration,
}

impl LobbyFinder {
    /// Creates a finder from request settings.
    #[must_use]
    pub fn new(config: &RequestConfig) -> Self {
        Self {
            engine: RequestEngine::new(config.max_pending),
            searches: Vec::new(),
            phase_timeout: config.lobby_phase_timeout(),
        }
    }

    /// Starts a search. `callback` runs once, from a later [`LobbyFinder::tick`].
    pub fn find_lobbies(
        &mut self,
        channel: &mut dyn MessageChannel,
        local: ParticipantId,
        callback: LobbySearchCallback,
    ) {
        let waiter = self.engine.wait(
            channel,
            |tracker| {
                let frame = SessionMessage::LobbyIdsRequest(Correlation {
                    tracker,
                    sender: local,
                })
                .encode()?;
                Ok((Destination::Server, frame))
            },
            self.phase_timeout,
        );
        self.searches.push(LobbySearch {
            phase: Phase::AwaitingIds(waiter),
            found: Vec::new(),
            callback,
        });
    }

    fn request_metadata(
        &mut self,
        channel: &mut dyn MessageChannel,
        local: ParticipantId,
        lobby_id: u64,
    ) -> ResponseWaiter<LobbyReply> {
        self.engine.wait(
            channel,
            |tracker| {
                let frame = SessionMessage::LobbyMetadataRequest(LobbyMetadataRequest {
                    correlation: Correlation {
                        tracker,
                        sender: local,
                    },
                    lobby_id,
                })
                .encode()?;
                Ok((Destination::Server, frame))
            },
            self.phase_timeout,
        )
    }

    /// Routes a response to its request. Late or duplicate responses are dropped.
    pub fn on_response(&mut self, tracker: TrackerId, reply: LobbyReply) -> bool {
        self.engine.resolve(tracker, reply)
    }

    /// Advances deadlines and moves every search to its next phase.
    pub fn tick(
        &mut self,
        dt: Duration,
        channel: &mut dyn MessageChannel,
        local: ParticipantId,
        notifier: &mut dyn Notifier,
    ) {
        self.engine.tick(dt);

        let searches = std::mem::take(&mut self.searches);
        for search in searches {
            if let Some(running) = self.advance(search, channel, local, notifier) {
                self.searches.push(running);
            }
        }
    }

    fn advance(
        &mut self,
        mut search: LobbySearch,
        channel: &mut dyn MessageChannel,
        local: ParticipantId,
        notifier: &mut dyn Notifier,
    ) -> Option<LobbySearch> {
        let polled = match &mut search.phase {
            Phase::AwaitingIds(waiter) => waiter.poll().map(|o| (o, VecDeque::new())),
            Phase::AwaitingMetadata { waiter, remaining } => {
                waiter.poll().map(|o| (o, std::mem::take(remaining)))
            }
        };
        let Some((outcome, mut remaining)) = polled else {
            return Some(search);
        };

        match outcome {
            Ok(LobbyReply::Ids(ids)) => remaining.extend(ids),
            Ok(LobbyReply::Metadata(metadata)) => {
                if metadata.has_server_open {
                    search.found.push(metadata);
                } else {
                    tracing::debug!(
                        lobby = metadata.lobby_id,
                        "Skipping lobby without open server"
                    );
                }
            }
            Err(e) => {
                if e == RequestError::TimedOut {
                    notifier.notify(Notification::new(
                        "Timed Out",
                        "Requesting Lobby IDs took too long.",
                        Severity::Warning,
                    ));
                }
                (search.callback)(Err(e));
                return None;
            }
        }

        let Some(next) = remaining.pop_front() else {
            tracing::info!(lobbies = search.found.len(), "Lobby search finished");
            (search.callback)(Ok(search.found));
            return None;
        };
        search.phase = Phase::AwaitingMetadata {
            waiter: self.request_metadata(channel, local, next),
            remaining,
        };
        Some(search)
    }

    /// Number of searches still running.
    #[must_use]
    pub fn active_searches(&self) -> usize {
        self.searches.len()
    }

    /// Fails every running search.
    pub fn clear(&mut self) {
        self.engine.clear(&RequestError::SessionEnded);
        for search in self.searches.drain(..) {
            (search.callback)(Err(RequestError::SessionEnded));
        }
    }
}
