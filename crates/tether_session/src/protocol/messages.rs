//! # Message Records
//!
//! Every frame is a one-byte [`MessageTag`] followed by the tag's record.
//!
//! ## Grab Record (bit-exact)
//!
//! ```text
//! ┌──────────┬──────┬───────────────┬───────────┬─────────────┬─────────┬──────────────────────┐
//! │ sender u8│hand u8│ path (u16+utf8)│ grip u16  │ syncable u16│ grab u8 │ offset 6×f32 (24 B)  │
//! └──────────┴──────┴───────────────┴───────────┴─────────────┴─────────┴──────────────────────┘
//! ```
//!
//! The offset is the hand-local position (3×f32) followed by the hand-local
//! rotation packed as three quaternion components; `w` is rebuilt on decode.
//!
//! ## Correlated Records
//!
//! Requests and responses both start with `{tracker: u32, sender: u8}`. A
//! response echoes the tracker of the request it answers.

use bytemuck::{Pod, Zeroable};
use tether_shared::{Handedness, ParticipantId, SyncableId};

use super::codec::{MessageReader, MessageWriter};
use crate::error::{CodecError, CodecResult, SessionError, SessionResult};
use crate::grab::RelativeOffset;
use crate::request::TrackerId;

/// Frame type discriminator.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum MessageTag {
    /// A metadata key was written.
    MetadataSet = 1,
    /// A metadata key was removed.
    MetadataRemove = 2,
    /// A grip was grabbed or released.
    PropGrab = 3,
    /// Does a participant have a mod?
    ModInfoRequest = 4,
    /// Answer to [`MessageTag::ModInfoRequest`].
    ModInfoResponse = 5,
    /// Which lobbies exist?
    LobbyIdsRequest = 6,
    /// Answer to [`MessageTag::LobbyIdsRequest`].
    LobbyIdsResponse = 7,
    /// Describe one lobby.
    LobbyMetadataRequest = 8,
    /// Answer to [`MessageTag::LobbyMetadataRequest`].
    LobbyMetadataResponse = 9,
}

impl MessageTag {
    /// Decodes a tag byte.
    #[must_use]
    pub const fn from_u8(value: u8) -> Option<Self> {
        Some(match value {
            1 => Self::MetadataSet,
            2 => Self::MetadataRemove,
            3 => Self::PropGrab,
            4 => Self::ModInfoRequest,
            5 => Self::ModInfoResponse,
            6 => Self::LobbyIdsRequest,
            7 => Self::LobbyIdsResponse,
            8 => Self::LobbyMetadataRequest,
            9 => Self::LobbyMetadataResponse,
            _ => return None,
        })
    }
}

// ============================================================================
// METADATA
// ============================================================================

/// A replicated metadata mutation. `value` is `None` for a removal.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MetadataMessage {
    /// Owner of the key.
    pub owner: ParticipantId,
    /// Key being mutated.
    pub key: String,
    /// New value, or `None` as a tombstone.
    pub value: Option<String>,
}

// ============================================================================
// GRAB
// ============================================================================

/// Fixed-size wire form of a [`RelativeOffset`].
///
/// Size: 24 bytes
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
#[repr(C)]
pub struct WireOffset {
    /// Hand-local position.
    pub position: [f32; 3],
    /// Hand-local rotation, `x y z` of the `w >= 0` quaternion.
    pub rotation: [f32; 3],
}

impl WireOffset {
    /// Size in bytes.
    pub const SIZE: usize = 24;
}

/// One grab or release event for one grip.
#[derive(Clone, Debug, PartialEq)]
pub struct GrabMessage {
    /// Participant whose hand grabbed or released.
    pub participant: ParticipantId,
    /// Which hand.
    pub hand: Handedness,
    /// World path of the object, or [`tether_shared::PATH_SENTINEL`].
    pub path_hint: String,
    /// Grip index within the syncable.
    pub grip_index: u16,
    /// Target syncable.
    pub syncable_id: SyncableId,
    /// True for a grab, false for a release.
    pub is_grab: bool,
    /// Grip pose relative to the hand at the moment of the grab.
    pub offset: RelativeOffset,
}

// ============================================================================
// CORRELATED REQUESTS
// ============================================================================

/// Header shared by every correlated request and response.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Correlation {
    /// Token pairing a response with its request.
    pub tracker: TrackerId,
    /// Participant that sent this leg.
    pub sender: ParticipantId,
}

/// Asks `target` whether it can provide a mod.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ModInfoRequest {
    /// Correlation header.
    pub correlation: Correlation,
    /// Participant that should answer.
    pub target: ParticipantId,
    /// Identifier of the requested mod.
    pub barcode: String,
}

/// Downloadable file describing a mod.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ModFile {
    /// Repository id of the mod.
    pub mod_id: u32,
    /// Repository id of the file.
    pub file_id: u32,
}

/// Answer to a [`ModInfoRequest`]. `file` is `None` when the target lacks it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ModInfoResponse {
    /// Correlation header; `tracker` echoes the request.
    pub correlation: Correlation,
    /// The mod's file, if the target has one.
    pub file: Option<ModFile>,
}

/// Lists the lobbies currently known to the server.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LobbyIdsResponse {
    /// Correlation header.
    pub correlation: Correlation,
    /// Lobby ids.
    pub lobbies: Vec<u64>,
}

/// Asks for the description of one lobby.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LobbyMetadataRequest {
    /// Correlation header.
    pub correlation: Correlation,
    /// Lobby to describe.
    pub lobby_id: u64,
}

/// Description of one lobby.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LobbyMetadata {
    /// Lobby id.
    pub lobby_id: u64,
    /// Display name of the hosting participant.
    pub host_name: String,
    /// Current participants.
    pub player_count: u8,
    /// Participant limit.
    pub max_players: u8,
    /// True if a session is currently hosted in the lobby.
    pub has_server_open: bool,
}

/// Answer to a [`LobbyMetadataRequest`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LobbyMetadataResponse {
    /// Correlation header.
    pub correlation: Correlation,
    /// The lobby's description.
    pub metadata: LobbyMetadata,
}

// ============================================================================
// FRAMES
// ============================================================================

/// Every message the session exchanges.
#[derive(Clone, Debug, PartialEq)]
pub enum SessionMessage {
    /// Metadata write.
    MetadataSet(MetadataMessage),
    /// Metadata removal.
    MetadataRemove(MetadataMessage),
    /// Grab or release.
    PropGrab(GrabMessage),
    /// Mod availability query.
    ModInfoRequest(ModInfoRequest),
    /// Mod availability answer.
    ModInfoResponse(ModInfoResponse),
    /// Lobby listing query.
    LobbyIdsRequest(Correlation),
    /// Lobby listing answer.
    LobbyIdsResponse(LobbyIdsResponse),
    /// Lobby description query.
    LobbyMetadataRequest(LobbyMetadataRequest),
    /// Lobby description answer.
    LobbyMetadataResponse(LobbyMetadataResponse),
}

impl SessionMessage {
    /// Tag this message is framed with.
    #[must_use]
    pub const fn tag(&self) -> MessageTag {
        match self {
            Self::MetadataSet(_) => MessageTag::MetadataSet,
            Self::MetadataRemove(_) => MessageTag::MetadataRemove,
            Self::PropGrab(_) => MessageTag::PropGrab,
            Self::ModInfoRequest(_) => MessageTag::ModInfoRequest,
            Self::ModInfoResponse(_) => MessageTag::ModInfoResponse,
            Self::LobbyIdsRequest(_) => MessageTag::LobbyIdsRequest,
            Self::LobbyIdsResponse(_) => MessageTag::LobbyIdsResponse,
            Self::LobbyMetadataRequest(_) => MessageTag::LobbyMetadataRequest,
            Self::LobbyMetadataResponse(_) => MessageTag::LobbyMetadataResponse,
        }
    }

    /// Encodes the message into a complete frame.
    ///
    /// # Errors
    ///
    /// Fails if a string field exceeds the u16 length prefix or a list holds
    /// more than `u16::MAX` entries.
    pub fn encode(&self) -> SessionResult<Vec<u8>> {
        let mut w = MessageWriter::with_capacity(64);
        w.write_u8(self.tag() as u8);

        match self {
            Self::MetadataSet(m) => {
                w.write_u8(m.owner.get());
                w.write_str(&m.key)?;
                w.write_str(m.value.as_deref().unwrap_or_default())?;
            }
            Self::MetadataRemove(m) => {
                w.write_u8(m.owner.get());
                w.write_str(&m.key)?;
            }
            Self::PropGrab(g) => {
                w.write_u8(g.participant.get());
                w.write_u8(g.hand as u8);
                w.write_str(&g.path_hint)?;
                w.write_u16(g.grip_index);
                w.write_u16(g.syncable_id);
                w.write_bool(g.is_grab);
                w.write_pod(&g.offset.to_wire());
            }
            Self::ModInfoRequest(r) => {
                write_correlation(&mut w, r.correlation);
                w.write_u8(r.target.get());
                w.write_str(&r.barcode)?;
            }
            Self::ModInfoResponse(r) => {
                write_correlation(&mut w, r.correlation);
                w.write_bool(r.file.is_some());
                if let Some(file) = r.file {
                    w.write_u32(file.mod_id);
                    w.write_u32(file.file_id);
                }
            }
            Self::LobbyIdsRequest(c) => write_correlation(&mut w, *c),
            Self::LobbyIdsResponse(r) => {
                write_correlation(&mut w, r.correlation);
                let count = u16::try_from(r.lobbies.len())
                    .map_err(|_| CodecError::StringTooLong(r.lobbies.len()))?;
                w.write_u16(count);
                for id in &r.lobbies {
                    w.write_u64(*id);
                }
            }
            Self::LobbyMetadataRequest(r) => {
                write_correlation(&mut w, r.correlation);
                w.write_u64(r.lobby_id);
            }
            Self::LobbyMetadataResponse(r) => {
                write_correlation(&mut w, r.correlation);
                let m = &r.metadata;
                w.write_u64(m.lobby_id);
                w.write_str(&m.host_name)?;
                w.write_u8(m.player_count);
                w.write_u8(m.max_players);
                w.write_bool(m.has_server_open);
            }
        }

        Ok(w.into_bytes())
    }

    /// Decodes a complete frame.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::UnknownTag`] for an unrecognised tag and
    /// [`SessionError::Codec`] for a truncated or otherwise malformed record.
    pub fn decode(frame: &[u8]) -> SessionResult<Self> {
        let mut r = MessageReader::new(frame);
        let tag_byte = r.read_u8()?;
        let tag = MessageTag::from_u8(tag_byte).ok_or(SessionError::UnknownTag(tag_byte))?;

        let message = match tag {
            MessageTag::MetadataSet => Self::MetadataSet(MetadataMessage {
                owner: ParticipantId(r.read_u8()?),
                key: r.read_string()?,
                value: Some(r.read_string()?),
            }),
            MessageTag::MetadataRemove => Self::MetadataRemove(MetadataMessage {
                owner: ParticipantId(r.read_u8()?),
                key: r.read_string()?,
                value: None,
            }),
            MessageTag::PropGrab => Self::PropGrab(read_grab(&mut r)?),
            MessageTag::ModInfoRequest => Self::ModInfoRequest(ModInfoRequest {
                correlation: read_correlation(&mut r)?,
                target: ParticipantId(r.read_u8()?),
                barcode: r.read_string()?,
            }),
            MessageTag::ModInfoResponse => {
                let correlation = read_correlation(&mut r)?;
                let file = if r.read_bool()? {
                    Some(ModFile {
                        mod_id: r.read_u32()?,
                        file_id: r.read_u32()?,
                    })
                } else {
                    None
                };
                Self::ModInfoResponse(ModInfoResponse { correlation, file })
            }
            MessageTag::LobbyIdsRequest => Self::LobbyIdsRequest(read_correlation(&mut r)?),
            MessageTag::LobbyIdsResponse => {
                let correlation = read_correlation(&mut r)?;
                let count = r.read_u16()?;
                let lobbies = (0..count)
                    .map(|_| r.read_u64())
                    .collect::<CodecResult<Vec<_>>>()?;
                Self::LobbyIdsResponse(LobbyIdsResponse {
                    correlation,
                    lobbies,
                })
            }
            MessageTag::LobbyMetadataRequest => {
                Self::LobbyMetadataRequest(LobbyMetadataRequest {
                    correlation: read_correlation(&mut r)?,
                    lobby_id: r.read_u64()?,
                })
            }
            MessageTag::LobbyMetadataResponse => {
                Self::LobbyMetadataResponse(LobbyMetadataResponse {
                    correlation: read_correlation(&mut r)?,
                    metadata: LobbyMetadata {
                        lobby_id: r.read_u64()?,
                        host_name: r.read_string()?,
                        player_count: r.read_u8()?,
                        max_players: r.read_u8()?,
                        has_server_open: r.read_bool()?,
                    },
                })
            }
        };

        r.finish()?;
        Ok(message)
    }
}

fn write_correlation(w: &mut MessageWriter, c: Correlation) {
    w.write_u32(c.tracker.0);
    w.write_u8(c.sender.get());
}

fn read_correlation(r: &mut MessageReader<'_>) -> CodecResult<Correlation> {
    Ok(Correlation {
        tracker: TrackerId(r.read_u32()?),
        sender: ParticipantId(r.read_u8()?),
    })
}

fn read_grab(r: &mut MessageReader<'_>) -> CodecResult<GrabMessage> {
    let participant = ParticipantId(r.read_u8()?);
    let hand_byte = r.read_u8()?;
    let hand = Handedness::from_u8(hand_byte).ok_or(CodecError::InvalidHandedness(hand_byte))?;
    Ok(GrabMessage {
        participant,
        hand,
        path_hint: r.read_string()?,
        grip_index: r.read_u16()?,
        syncable_id: r.read_u16()?,
        is_grab: r.read_bool()?,
        offset: RelativeOffset::from_wire(&r.read_pod::<WireOffset>()?),
    })
}
