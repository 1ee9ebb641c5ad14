//! # Grab Transfer Protocol
//!
//! Moves grip holder state between peers.
//!
//! ## Replay
//!
//! The physics engine binds an object to a hand at the object's *current*
//! transform. To reproduce the original hand/grip geometry on a peer where the
//! hand sits somewhere else, the host is moved to the captured offset applied
//! to the hand's current pose, grabbed, then put back:
//!
//! ```text
//! saved = host.pose
//! host.pose = hand.pose * offset
//! grab(host, hand)
//! host.pose = saved          // also when the grab fails
//! ```
//!
//! ## Failure Classes
//!
//! - Unknown object: `Ok(Unresolved)`, debug-logged
//! - Grip index out of range: `Err(GripOutOfRange)`, error-logged
//! - Physics engine refused: `Ok(CollaboratorRefused)`, state untouched

use tether_shared::{Quaternion, Transform, Vec3};

use crate::directory::OwnershipDirectory;
use crate::error::{SessionError, SessionResult};
use crate::physics::PhysicsWorld;
use crate::protocol::{GrabMessage, SessionMessage, WireOffset};
use crate::syncable::Holder;

/// Pose of a grip's host expressed in the grabbing hand's local frame.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct RelativeOffset {
    /// Host position in hand space.
    pub position: Vec3,
    /// Host rotation in hand space.
    pub rotation: Quaternion,
}

impl RelativeOffset {
    /// Creates an offset from hand-local components.
    #[must_use]
    pub const fn new(position: Vec3, rotation: Quaternion) -> Self {
        Self { position, rotation }
    }

    /// Captures where `host` sits relative to `hand`.
    #[must_use]
    pub fn capture(hand: &Transform, host: &Transform) -> Self {
        Self {
            position: hand.inverse_transform_point(host.position),
            rotation: hand.inverse_transform_rotation(host.rotation),
        }
    }

    /// World pose of the host when the hand is at `hand`.
    #[must_use]
    pub fn world_pose(&self, hand: &Transform) -> Transform {
        Transform::new(
            hand.transform_point(self.position),
            hand.transform_rotation(self.rotation),
        )
    }

    /// Packs the offset for the wire.
    #[must_use]
    pub fn to_wire(&self) -> WireOffset {
        WireOffset {
            position: self.position.to_array(),
            rotation: self.rotation.compress(),
        }
    }

    /// Unpacks a wire offset, rebuilding the quaternion's `w`.
    #[must_use]
    pub fn from_wire(wire: &WireOffset) -> Self {
        Self {
            position: Vec3::from_array(wire.position),
            rotation: Quaternion::expand(wire.rotation),
        }
    }

    /// Compares geometry, treating `q` and `-q` as the same rotation.
    #[must_use]
    pub fn approx_eq(&self, other: &Self, epsilon: f32) -> bool {
        self.position.distance(other.position) <= epsilon
            && self.rotation.same_rotation(other.rotation, epsilon)
    }
}

impl GrabMessage {
    /// Encodes this event as a complete `PropGrab` frame.
    ///
    /// # Errors
    ///
    /// Fails if the path hint exceeds the u16 length prefix.
    pub fn encode(&self) -> SessionResult<Vec<u8>> {
        SessionMessage::PropGrab(self.clone()).encode()
    }

    /// Decodes a `PropGrab` frame.
    ///
    /// # Errors
    ///
    /// Fails if the frame is malformed or carries another tag.
    pub fn decode(frame: &[u8]) -> SessionResult<Self> {
        match SessionMessage::decode(frame)? {
            SessionMessage::PropGrab(grab) => Ok(grab),
            other => Err(SessionError::UnknownTag(other.tag() as u8)),
        }
    }

    /// Holder this event describes.
    #[must_use]
    pub const fn holder(&self) -> Holder {
        Holder {
            participant: self.participant,
            hand: self.hand,
        }
    }
}

/// What applying a grab event did.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum GrabOutcome {
    /// The grip is now held by the event's hand.
    Grabbed,
    /// The grip is no longer held.
    Released,
    /// The object is not loaded on this peer; nothing happened.
    Unresolved,
    /// The physics engine refused; holder state is unchanged.
    CollaboratorRefused,
}

/// Applies one grab or release event to local state.
///
/// # Errors
///
/// Returns [`SessionError::GripOutOfRange`] if the event names a grip the
/// syncable does not have.
pub fn apply_grab(
    message: &GrabMessage,
    directory: &mut OwnershipDirectory,
    world: &mut dyn PhysicsWorld,
) -> SessionResult<GrabOutcome> {
    let id = message.syncable_id;
    let Some(syncable) = directory.resolve(id, &message.path_hint, &*world) else {
        tracing::debug!(
            syncable = id,
            path = %message.path_hint,
            "Grab target not loaded, dropping"
        );
        return Ok(GrabOutcome::Unresolved);
    };

    let handle = syncable.handle();
    let grip = syncable.grip_mut(message.grip_index).map_err(|e| {
        tracing::error!(syncable = id, grip = message.grip_index, "Rejecting grab: {e}");
        e
    })?;
    let index = usize::from(grip.index);

    if !message.is_grab {
        if !world.release(handle, index) {
            tracing::debug!(syncable = id, grip = index, "Release refused by physics");
            return Ok(GrabOutcome::CollaboratorRefused);
        }
        grip.held_by = None;
        return Ok(GrabOutcome::Released);
    }

    let holder = message.holder();
    if let Some(current) = grip.held_by {
        if current != holder {
            tracing::debug!(
                syncable = id,
                grip = index,
                from = %current.participant,
                "Grip changes hands"
            );
            world.release(handle, index);
            grip.held_by = None;
        }
    }

    let (Some(hand), Some(saved)) = (
        world.hand_transform(message.participant, message.hand),
        world.transform(grip.host),
    ) else {
        tracing::debug!(syncable = id, participant = %message.participant, "Hand or host missing");
        return Ok(GrabOutcome::CollaboratorRefused);
    };

    world.set_transform(grip.host, message.offset.world_pose(&hand));
    let grabbed = world.grab(handle, message.participant, message.hand, index);
    world.set_transform(grip.host, saved);

    if grabbed {
        grip.held_by = Some(holder);
        Ok(GrabOutcome::Grabbed)
    } else {
        tracing::debug!(syncable = id, grip = index, "Grab refused by physics");
        Ok(GrabOutcome::CollaboratorRefused)
    }
}
