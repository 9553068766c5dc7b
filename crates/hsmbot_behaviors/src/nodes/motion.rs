//! Leaves that hand one request to the motion collaborator.
//!
//! Each leaf submits its command on start and stays `Running` until the
//! collaborator answers against the leaf's activation. Stopping a leaf
//! cancels whatever it asked for.

use std::borrow::Cow;

use hsmbot_core::services::{MotionCommand, Pose};
use hsmbot_core::{Behavior, EventPayload, NodeContext, Result, StopContext};
use tracing::debug;

/// Default straight-line speed used by `Forward`.
pub const DEFAULT_SPEED_MMPS: f64 = 50.0;

fn cancel(cx: &mut StopContext<'_>) {
    let activation = cx.activation();
    cx.motion().cancel(activation);
}

/// Drive straight; negative distances back up.
#[derive(Debug, Clone, Copy)]
pub struct Forward {
    pub distance_mm: f64,
    pub speed_mmps: f64,
}

impl Forward {
    pub fn new(distance_mm: f64) -> Self {
        Self {
            distance_mm,
            speed_mmps: DEFAULT_SPEED_MMPS,
        }
    }
}

impl Behavior for Forward {
    fn kind(&self) -> &'static str {
        "Forward"
    }

    fn start(&mut self, cx: &mut NodeContext<'_>) -> Result<()> {
        cx.submit(MotionCommand::DriveStraight {
            distance_mm: self.distance_mm,
            speed_mmps: self.speed_mmps,
        })
    }

    fn stop(&mut self, cx: &mut StopContext<'_>) {
        cancel(cx);
    }
}

/// Turn in place by `angle` radians (counter-clockwise positive).
#[derive(Debug, Clone, Copy)]
pub struct Turn {
    pub angle: f64,
}

impl Turn {
    pub fn new(angle: f64) -> Self {
        Self { angle }
    }

    pub fn degrees(deg: f64) -> Self {
        Self::new(deg.to_radians())
    }
}

impl Behavior for Turn {
    fn kind(&self) -> &'static str {
        "Turn"
    }

    fn start(&mut self, cx: &mut NodeContext<'_>) -> Result<()> {
        cx.submit(MotionCommand::Turn { angle: self.angle })
    }

    fn stop(&mut self, cx: &mut StopContext<'_>) {
        cancel(cx);
    }
}

/// Move the lift; 0.0 is fully down, 1.0 fully up.
#[derive(Debug, Clone, Copy)]
pub struct SetLiftHeight {
    pub fraction: f64,
}

impl SetLiftHeight {
    pub fn new(fraction: f64) -> Self {
        Self {
            fraction: fraction.clamp(0.0, 1.0),
        }
    }
}

impl Behavior for SetLiftHeight {
    fn kind(&self) -> &'static str {
        "SetLiftHeight"
    }

    fn start(&mut self, cx: &mut NodeContext<'_>) -> Result<()> {
        cx.submit(MotionCommand::SetLiftHeight {
            fraction: self.fraction,
        })
    }

    fn stop(&mut self, cx: &mut StopContext<'_>) {
        cancel(cx);
    }
}

#[derive(Debug, Clone, Copy)]
pub struct SetHeadAngle {
    pub degrees: f64,
}

impl SetHeadAngle {
    pub fn new(degrees: f64) -> Self {
        Self { degrees }
    }
}

impl Behavior for SetHeadAngle {
    fn kind(&self) -> &'static str {
        "SetHeadAngle"
    }

    fn start(&mut self, cx: &mut NodeContext<'_>) -> Result<()> {
        cx.submit(MotionCommand::SetHeadAngle {
            degrees: self.degrees,
        })
    }

    fn stop(&mut self, cx: &mut StopContext<'_>) {
        cancel(cx);
    }
}

/// Clear every actuator track.
#[derive(Debug, Clone, Copy, Default)]
pub struct StopAllMotors;

impl Behavior for StopAllMotors {
    fn kind(&self) -> &'static str {
        "StopAllMotors"
    }

    fn start(&mut self, cx: &mut NodeContext<'_>) -> Result<()> {
        cx.submit(MotionCommand::StopAllMotors)
    }

    fn stop(&mut self, cx: &mut StopContext<'_>) {
        cancel(cx);
    }
}

/// Play a named animation trigger.
#[derive(Debug, Clone)]
pub struct AnimationTrigger {
    pub trigger: Cow<'static, str>,
}

impl AnimationTrigger {
    pub fn new(trigger: impl Into<Cow<'static, str>>) -> Self {
        Self {
            trigger: trigger.into(),
        }
    }
}

impl Behavior for AnimationTrigger {
    fn kind(&self) -> &'static str {
        "AnimationTrigger"
    }

    fn start(&mut self, cx: &mut NodeContext<'_>) -> Result<()> {
        cx.submit(MotionCommand::PlayAnimation(self.trigger.clone()))
    }

    fn stop(&mut self, cx: &mut StopContext<'_>) {
        cancel(cx);
    }
}

#[derive(Debug, Clone)]
pub struct Say {
    pub text: String,
}

impl Say {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }
}

impl Behavior for Say {
    fn kind(&self) -> &'static str {
        "Say"
    }

    fn start(&mut self, cx: &mut NodeContext<'_>) -> Result<()> {
        cx.submit(MotionCommand::Say(self.text.clone()))
    }

    fn stop(&mut self, cx: &mut StopContext<'_>) {
        cancel(cx);
    }
}

/// Keep the head pointed at the target object until stopped. Never finishes
/// on its own.
#[derive(Debug, Clone, Copy, Default)]
pub struct LookAtObject;

impl Behavior for LookAtObject {
    fn kind(&self) -> &'static str {
        "LookAtObject"
    }

    fn start(&mut self, cx: &mut NodeContext<'_>) -> Result<()> {
        let handle = cx.require_target()?.handle;
        cx.submit(MotionCommand::TrackObject(handle))
    }

    fn stop(&mut self, cx: &mut StopContext<'_>) {
        cancel(cx);
    }
}

/// Plan and drive a path to a fixed pose.
///
/// Answers come back as Completion, Failure, or an Escalation carrying the
/// planner's conflict.
#[derive(Debug, Clone, Copy)]
pub struct PilotToPose {
    pub pose: Pose,
}

impl PilotToPose {
    pub fn new(pose: Pose) -> Self {
        Self { pose }
    }
}

impl Behavior for PilotToPose {
    fn kind(&self) -> &'static str {
        "PilotToPose"
    }

    fn start(&mut self, cx: &mut NodeContext<'_>) -> Result<()> {
        cx.submit(MotionCommand::GoToPose(self.pose))
    }

    fn stop(&mut self, cx: &mut StopContext<'_>) {
        cancel(cx);
    }
}

/// Ask the planner whether the robot's current pose is free.
///
/// Success when it is; otherwise Failure carrying the conflict.
#[derive(Debug, Clone, Copy, Default)]
pub struct PilotCheckStart;

impl Behavior for PilotCheckStart {
    fn kind(&self) -> &'static str {
        "PilotCheckStart"
    }

    fn start(&mut self, cx: &mut NodeContext<'_>) -> Result<()> {
        let robot = cx.world().robot_pose();
        let checked = cx.motion().check_start(&robot);
        match checked {
            Ok(()) => cx.post_success(),
            Err(conflict) => {
                debug!(node = cx.name(), code = %conflict.code, "start pose collides");
                cx.post_failure_with(EventPayload::Conflict(conflict));
            }
        }
        Ok(())
    }
}

