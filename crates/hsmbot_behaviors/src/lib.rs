//! hsmbot_behaviors
//!
//! Robot behaviours built on `hsmbot_core`: reusable leaves, the cube
//! pick-up and drop composites, and a tokio runner that feeds collaborator
//! replies back into the dispatcher.

/// Leaf behaviours.
pub mod nodes;

/// Cube approach geometry.
pub mod geometry;

pub mod cube;
pub mod drop;
pub mod pickup;

/// Async driver around a `Dispatcher`.
pub mod runtime;

/// Fakes for the collaborator traits and a synchronous settle loop.
pub mod testing;

pub use cube::{go_to_cube, GoToCube};
pub use drop::drop_object;
pub use pickup::{pick_up_cube, PickUpCube, PickupConfig};
pub use runtime::{
    intake_channel, Intake, IntakeSender, RunSummary, Runner, MAX_TIME_SCALE, MIN_TIME_SCALE,
};
