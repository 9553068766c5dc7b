//! Reusable leaf behaviours.

pub mod control;
pub mod motion;

pub use control::{
    Escalate, Idle, ParentCompletes, ParentFails, ParentSucceeds, Print, SetCarrying,
    SetNotCarrying, VerifyPickup,
};
pub use motion::{
    AnimationTrigger, Forward, LookAtObject, PilotCheckStart, PilotToPose, SetHeadAngle,
    SetLiftHeight, Say, StopAllMotors, Turn,
};
