//! Identifiers shared by every component of a session.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Small integer identifying one participant for the lifetime of a session.
///
/// Assigned on join, retired on disconnect. Fits in a single byte on the wire.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ParticipantId(pub u8);

impl ParticipantId {
    /// Returns the raw wire value.
    #[inline]
    #[must_use]
    pub const fn get(self) -> u8 {
        self.0
    }
}

impl fmt::Display for ParticipantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Session-global identifier of a registered syncable.
pub type SyncableId = u16;

/// Which hand of a participant's rig performed a grab.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum Handedness {
    /// Left hand.
    Left = 1,
    /// Right hand.
    Right = 2,
}

impl Handedness {
    /// Decodes a wire byte.
    #[must_use]
    pub const fn from_u8(value: u8) -> Option<Self> {
        match value {
            1 => Some(Self::Left),
            2 => Some(Self::Right),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handedness_wire_values() {
        assert_eq!(Handedness::from_u8(Handedness::Left as u8), Some(Handedness::Left));
        assert_eq!(Handedness::from_u8(Handedness::Right as u8), Some(Handedness::Right));
        assert_eq!(Handedness::from_u8(0), None);
        assert_eq!(Handedness::from_u8(3), None);
    }

    #[test]
    fn test_participant_ordering() {
        let mut ids = vec![ParticipantId(3), ParticipantId(0), ParticipantId(1)];
        ids.sort();
        assert_eq!(ids, vec![ParticipantId(0), ParticipantId(1), ParticipantId(3)]);
        assert_eq!(ParticipantId(7).to_string(), "#7");
    }
}
