//! # Message Channel Collaborator
//!
//! The transport owns connection setup, byte framing and relaying. The session
//! hands it fully encoded frames and drains whatever arrived for it once per
//! tick.

use tether_shared::ParticipantId;

use crate::error::SessionResult;

/// Delivery guarantee requested for a frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum NetworkChannel {
    /// In-order, guaranteed delivery per sender.
    Reliable,
    /// Best effort.
    Unreliable,
}

/// Where a frame should go.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Destination {
    /// The session's authoritative peer.
    Server,
    /// Every participant except the sender.
    Broadcast,
    /// One specific participant.
    Participant(ParticipantId),
}

/// A frame received from a peer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InboundFrame {
    /// Participant the frame came from.
    pub from: ParticipantId,
    /// Channel it was sent on.
    pub channel: NetworkChannel,
    /// Encoded message.
    pub payload: Vec<u8>,
}

/// Interface to the transport.
pub trait MessageChannel {
    /// Queues a frame for delivery.
    ///
    /// # Errors
    ///
    /// Returns [`crate::SessionError::SendFailed`] if the transport refuses
    /// the frame.
    fn send(
        &mut self,
        channel: NetworkChannel,
        destination: Destination,
        payload: Vec<u8>,
    ) -> SessionResult<()>;

    /// Takes the next frame addressed to this participant, if any.
    fn try_recv(&mut self) -> Option<InboundFrame>;
}
