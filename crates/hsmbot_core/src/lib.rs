//! hsmbot_core: hierarchical, event-driven state machines for robot behaviours.
//!
//! Design goals:
//! - Pure, testable logic (no robot I/O; collaborators are traits).
//! - Explicit types; no macro wizardry.
//! - Single-threaded dispatch with a logical clock.

pub mod error;

/// Dispatcher tuning.
pub mod config;

/// Error to tracing bridge.
pub mod logging;

/// Event kinds, payloads and conflicts.
pub mod event;

/// Transition kinds.
pub mod transition;

/// Node identity, lifecycle table and the behaviour seam.
pub mod node;

/// Declarative composite bodies and their validation.
pub mod blueprint;

/// Collaborator traits: motion, vision, world model.
pub mod services;

/// Grasp verification over a grayscale camera frame.
pub mod probe;

/// Event dispatch, timers and introspection.
pub mod engine;

pub use blueprint::{Composite, CompositeBuilder, NodeSpec, TransitionSpec};
pub use config::EngineConfig;
pub use engine::{Dispatcher, FiringRecord, Outcome, RootReport, TransitionGraph};
pub use error::{CoreError, Result};
pub use event::{Conflict, Event, EventKind, EventPayload};
pub use node::{Activation, Behavior, NodeContext, NodeId, NodeState, StateNode, StopContext};
pub use transition::TransitionKind;
