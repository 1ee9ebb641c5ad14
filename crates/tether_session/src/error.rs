//! # Session Error Types
//!
//! All errors that can occur while applying or producing session messages.
//!
//! None of these are fatal: the session logs them and discards the offending
//! message or operation.

use thiserror::Error;
use tether_shared::SyncableId;

/// Errors raised while encoding or decoding a frame.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    /// The frame ended before a field could be read.
    #[error("unexpected end of frame: needed {needed} bytes, {remaining} remaining")]
    UnexpectedEnd {
        /// Bytes the field needed.
        needed: usize,
        /// Bytes left in the frame.
        remaining: usize,
    },

    /// A string field was not valid UTF-8.
    #[error("string field is not valid utf-8")]
    InvalidUtf8,

    /// A string was too long for its u16 length prefix.
    #[error("string of {0} bytes exceeds the u16 length prefix")]
    StringTooLong(usize),

    /// A boolean byte was neither 0 nor 1.
    #[error("invalid bool byte: {0}")]
    InvalidBool(u8),

    /// A handedness byte did not name a hand.
    #[error("invalid handedness byte: {0}")]
    InvalidHandedness(u8),

    /// Bytes were left over after the record was fully decoded.
    #[error("{0} trailing bytes after record")]
    TrailingBytes(usize),
}

/// Errors that can occur in the session runtime.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    /// Frame could not be decoded.
    #[error("malformed message: {0}")]
    Codec(#[from] CodecError),

    /// Frame carried a tag this build does not know.
    #[error("unknown message tag: {0}")]
    UnknownTag(u8),

    /// Grab referenced a grip the syncable does not have.
    #[error("grip index {index} out of range for syncable {syncable} with {grip_count} grips")]
    GripOutOfRange {
        /// Syncable the grab targeted.
        syncable: SyncableId,
        /// Requested grip index.
        index: u16,
        /// Number of grips the syncable exposes.
        grip_count: usize,
    },

    /// Syncable id is already registered to a different object.
    #[error("syncable id {0} already registered to a different object")]
    SyncableConflict(SyncableId),

    /// Every syncable id is in use.
    #[error("no free syncable id left")]
    SyncableIdsExhausted,

    /// Participant is not part of the session.
    #[error("unknown participant: {0}")]
    UnknownParticipant(u8),

    /// Too many correlated requests are in flight.
    #[error("pending request table full ({limit} entries)")]
    RequestTableFull {
        /// Configured table limit.
        limit: usize,
    },

    /// Request was failed locally before anything was sent.
    #[error("request refused: {0}")]
    RequestRefused(RequestError),

    /// Message channel refused a frame.
    #[error("send failed: {0}")]
    SendFailed(String),

    /// Configuration could not be loaded or failed validation.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Result type for session operations.
pub type SessionResult<T> = Result<T, SessionError>;

/// Result type for frame encoding and decoding.
pub type CodecResult<T> = Result<T, CodecError>;

/// Failure side of a correlated request.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RequestError {
    /// No response arrived before the deadline.
    #[error("request timed out")]
    TimedOut,

    /// Request was refused by local policy before any round-trip.
    #[error("request target is blacklisted")]
    Blacklisted,

    /// Request could not be transmitted.
    #[error("request rejected: {0}")]
    Rejected(String),

    /// The session ended while the request was in flight.
    #[error("session ended before a response arrived")]
    SessionEnded,
}
