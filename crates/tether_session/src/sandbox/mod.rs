//! # Sandbox Collaborators
//!
//! In-memory stand-ins for the transport and the physics engine, used by the
//! integration tests and by tools that run several participants in one
//! process.

mod loopback;
mod world;

pub use loopback::{LoopbackEndpoint, LoopbackHub};
pub use world::SandboxWorld;
