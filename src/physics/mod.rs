//! Physics simulation for the quadcopter.
//!
//! Contains:
//! - Quaternion operations
//! - Motor mixing and first-order motor response
//! - Rigid body dynamics (pure functions)
//! - The engine seam and the built-in rigid-body engine with ground contact
//! - The quadcopter model tying them together

pub mod dynamics;
pub mod engine;
pub mod motor;
pub mod quadcopter;
pub mod quaternion;

pub use engine::{PhysicsEngine, RigidBodyEngine};
pub use quadcopter::Quadcopter;
pub use quaternion::*;
