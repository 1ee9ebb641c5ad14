//! In-process transport: one bounded crossbeam queue per participant.

use std::collections::BTreeMap;
use std::sync::Arc;

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use parking_lot::RwLock;
use tether_shared::ParticipantId;

use crate::channel::{Destination, InboundFrame, MessageChannel, NetworkChannel};
use crate::config::ChannelConfig;
use crate::error::{SessionError, SessionResult};

#[derive(Debug)]
struct HubState {
    server: ParticipantId,
    capacity: usize,
    inboxes: RwLock<BTreeMap<ParticipantId, Sender<InboundFrame>>>,
}

/// Routes frames between connected endpoints. Clones share the same routes.
#[derive(Clone, Debug)]
pub struct LoopbackHub {
    state: Arc<HubState>,
}

impl LoopbackHub {
    /// Creates a hub whose `Destination::Server` is `server`.
    #[must_use]
    pub fn new(capacity: usize, server: ParticipantId) -> Self {
        Self {
            state: Arc::new(HubState {
                server,
                capacity: capacity.max(1),
                inboxes: RwLock::new(BTreeMap::new()),
            }),
        }
    }

    /// Creates a hub sized from session configuration.
    #[must_use]
    pub fn from_config(config: &ChannelConfig, server: ParticipantId) -> Self {
        Self::new(config.capacity, server)
    }

    /// Connects a participant, replacing any previous endpoint for it.
    #[must_use]
    pub fn connect(&self, id: ParticipantId) -> LoopbackEndpoint {
        let (sender, receiver) = bounded(self.state.capacity);
        self.state.inboxes.write().insert(id, sender);
        tracing::debug!(participant = %id, "Loopback endpoint connected");
        LoopbackEndpoint {
            id,
            hub: self.clone(),
            inbox: receiver,
        }
    }

    /// Disconnects a participant. Frames already queued for it are dropped.
    pub fn disconnect(&self, id: ParticipantId) -> bool {
        self.state.inboxes.write().remove(&id).is_some()
    }

    /// Connected participants in ascending order.
    #[must_use]
    pub fn connected(&self) -> Vec<ParticipantId> {
        self.state.inboxes.read().keys().copied().collect()
    }

    fn deliver(&self, to: ParticipantId, frame: InboundFrame) -> SessionResult<()> {
        let inboxes = self.state.inboxes.read();
        let inbox = inboxes
            .get(&to)
            .ok_or_else(|| SessionError::SendFailed(format!("{to} is not connected")))?;
        inbox.try_send(frame).map_err(|e| match e {
            TrySendError::Full(_) => SessionError::SendFailed(format!("inbox of {to} is full")),
            TrySendError::Disconnected(_) => SessionError::SendFailed(format!("{to} hung up")),
        })
    }
}

/// One participant's connection to a [`LoopbackHub`].
#[derive(Debug)]
pub struct LoopbackEndpoint {
    id: ParticipantId,
    hub: LoopbackHub,
    inbox: Receiver<InboundFrame>,
}

impl LoopbackEndpoint {
    /// Participant this endpoint belongs to.
    #[must_use]
    pub const fn id(&self) -> ParticipantId {
        self.id
    }

    /// Number of frames waiting to be received.
    #[must_use]
    pub fn queued(&self) -> usize {
        self.inbox.len()
    }
}

impl MessageChannel for LoopbackEndpoint {
    fn send(
        &mut self,
        channel: NetworkChannel,
        destination: Destination,
        payload: Vec<u8>,
    ) -> SessionResult<()> {
        let frame = |payload| InboundFrame {
            from: self.id,
            channel,
            payload,
        };

        match destination {
            Destination::Server => self.hub.deliver(self.hub.state.server, frame(payload)),
            Destination::Participant(to) => self.hub.deliver(to, frame(payload)),
            Destination::Broadcast => {
                let targets: Vec<_> = self
                    .hub
                    .connected()
                    .into_iter()
                    .filter(|id| *id != self.id)
                    .collect();
                for to in targets {
                    if let Err(e) = self.hub.deliver(to, frame(payload.clone())) {
                        // Unreliable broadcast tolerates loss per receiver.
                        if channel == NetworkChannel::Reliable {
                            return Err(e);
                        }
                        tracing::debug!(participant = %to, "Dropped broadcast: {e}");
                    }
                }
                Ok(())
            }
        }
    }

    fn try_recv(&mut self) -> Option<InboundFrame> {
        self.inbox.try_recv().ok()
    }
}
