//! # Physical-Object Collaborator
//!
//! The physics/rendering engine owns transforms, collision and the actual
//! attachment of an object to a hand. The session only talks to it through
//! [`PhysicsWorld`].

use tether_shared::{Handedness, ParticipantId, Transform};

/// Opaque handle to a physically simulated object owned by the engine.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectHandle(pub u32);

/// Interface to the physics engine.
///
/// Handles are non-owning: the engine may destroy an object at any time, after
/// which every call for that handle returns `None` / `false`.
pub trait PhysicsWorld {
    /// Looks up an object by its world path.
    fn resolve_path(&self, path: &str) -> Option<ObjectHandle>;

    /// World path of an object, used as the path hint on first registration.
    fn path_of(&self, handle: ObjectHandle) -> Option<String>;

    /// Number of grips the object exposes. Fixed for the object's lifetime.
    fn grip_count(&self, handle: ObjectHandle) -> Option<usize>;

    /// Current world transform of an object.
    fn transform(&self, handle: ObjectHandle) -> Option<Transform>;

    /// Moves an object. Returns false if the handle is gone.
    fn set_transform(&mut self, handle: ObjectHandle, transform: Transform) -> bool;

    /// Current world transform of a participant's hand.
    fn hand_transform(&self, participant: ParticipantId, hand: Handedness) -> Option<Transform>;

    /// Binds grip `grip` of `handle` to a participant's hand at the object's
    /// current transform.
    fn grab(
        &mut self,
        handle: ObjectHandle,
        participant: ParticipantId,
        hand: Handedness,
        grip: usize,
    ) -> bool;

    /// Detaches whatever holds grip `grip` of `handle`.
    fn release(&mut self, handle: ObjectHandle, grip: usize) -> bool;
}
