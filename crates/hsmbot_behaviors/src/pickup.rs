//! Pick up a cube: dock, lift, verify the grasp with retries, then either
//! celebrate or back away.

use std::time::Duration;

use hsmbot_core::error::{Domain, ErrorKind};
use hsmbot_core::probe::ProbeConfig;
use hsmbot_core::{Behavior, Composite, CoreError, NodeContext, NodeSpec, Result};
use tracing::info;

use crate::cube::go_to_cube;
use crate::nodes::{
    AnimationTrigger, Escalate, Forward, Idle, ParentCompletes, ParentFails, SetCarrying,
    SetHeadAngle, SetLiftHeight, SetNotCarrying, StopAllMotors, VerifyPickup,
};

pub const SUCCESS_ANIMATION: &str = "ReactToBlockPickupSuccess";
pub const FRUSTRATED_ANIMATION: &str = "FrustratedByFailure";

/// Timing and retry knobs of the pick-up graph.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PickupConfig {
    /// Verification passes before giving up.
    pub verify_attempts: usize,
    /// Pause between two verification passes.
    pub retry_pause: Duration,
    /// Pause used while the robot decelerates during the approach.
    pub settle_pause: Duration,
    /// Wait after dropping the lift, letting vision catch up.
    pub lift_settle: Duration,
    pub probe: ProbeConfig,
}

impl Default for PickupConfig {
    fn default() -> Self {
        Self {
            verify_attempts: 3,
            retry_pause: Duration::from_millis(500),
            settle_pause: Duration::from_millis(750),
            lift_settle: Duration::from_secs(1),
            probe: ProbeConfig::default(),
        }
    }
}

impl PickupConfig {
    pub fn validate(&self) -> Result<()> {
        if self.verify_attempts == 0 {
            return Err(CoreError::error()
                .domain(Domain::Config)
                .kind(ErrorKind::InvalidArgument)
                .msg("verify_attempts must be at least 1")
                .build());
        }
        for (name, pause) in [
            ("retry_pause", self.retry_pause),
            ("settle_pause", self.settle_pause),
            ("lift_settle", self.lift_settle),
        ] {
            if pause.is_zero() {
                return Err(CoreError::error()
                    .domain(Domain::Config)
                    .kind(ErrorKind::InvalidArgument)
                    .msgf(format_args!("{name} must be positive"))
                    .build());
            }
        }
        self.probe.validate()
    }
}

/// Root behaviour of the pick-up composite: hands its target to `goto_cube`.
#[derive(Debug, Clone, Copy, Default)]
pub struct PickUpCube;

impl Behavior for PickUpCube {
    fn kind(&self) -> &'static str {
        "PickUpCube"
    }

    fn start(&mut self, cx: &mut NodeContext<'_>) -> Result<()> {
        let target = cx.require_target()?.clone();
        info!(node = cx.name(), cube = %target.id, "picking up");
        cx.share_target("goto_cube", target);
        Ok(())
    }
}

fn verify_name(attempt: usize) -> String {
    match attempt {
        1 => "verify".to_string(),
        n => format!("verify{n}"),
    }
}

/// Body of the pick-up composite.
pub fn pick_up_cube_body(config: &PickupConfig) -> Result<Composite> {
    config.validate()?;
    let pause = config.retry_pause.as_secs_f64();

    let mut body = Composite::builder()
        .child(go_to_cube("goto_cube", config)?)
        .node("forward_conflict", Escalate)
        .node("parentfails_conflict", ParentFails)
        .node("parentfails1", ParentFails)
        .node("stop_motors", StopAllMotors)
        .node("raise_lift", SetLiftHeight::new(0.4))
        .node("raise_head", SetHeadAngle::new(5.0))
        .node("raise_head2", SetHeadAngle::new(0.0))
        .on_escalation("goto_cube", &["forward_conflict"])
        .on_null("forward_conflict", &["parentfails_conflict"])
        .on_failure(&["goto_cube"], &["parentfails1"])
        .on_completion(&["goto_cube"], &["stop_motors"])
        .on_completion(&["stop_motors"], &["raise_lift", "raise_head"])
        .on_completion(&["raise_head"], &["raise_head2"])
        .on_completion(&["raise_lift", "raise_head2"], &["verify"]);

    for attempt in 1..=config.verify_attempts {
        let verify = verify_name(attempt);
        body = body
            .node(verify.clone(), VerifyPickup::new(config.probe.clone()))
            .on_success(&[verify.as_str()], &["satisfied"]);
        if attempt < config.verify_attempts {
            let retry = format!("retry{attempt}");
            let next = verify_name(attempt + 1);
            body = body
                .node(retry.clone(), Idle::default())
                .on_failure(&[verify.as_str()], &[retry.as_str()])
                .on_timer(pause, &retry, &[next.as_str()]);
        } else {
            body = body.on_failure(&[verify.as_str()], &["frustrated"]);
        }
    }

    body.node("satisfied", AnimationTrigger::new(SUCCESS_ANIMATION))
        .node("final_raise", SetLiftHeight::new(1.0))
        .node("drop_head", SetHeadAngle::new(0.0))
        .node("set_carrying", SetCarrying)
        .node("done", ParentCompletes)
        .on_completion(&["satisfied"], &["final_raise", "drop_head"])
        .on_completion(&["final_raise", "drop_head"], &["set_carrying"])
        .on_completion(&["set_carrying"], &["done"])
        .node("frustrated", Idle::default())
        .node("frustrated_anim", AnimationTrigger::new(FRUSTRATED_ANIMATION))
        .node("missed_cube", SetNotCarrying)
        .node("backup", Forward::new(-5.0))
        .node("drop_lift", SetLiftHeight::new(0.0))
        .node("backupmore", Forward::new(-5.0))
        .node("drop_head_low", SetHeadAngle::new(-20.0))
        .node("giveup", ParentFails)
        .on_null("frustrated", &["frustrated_anim"])
        .on_completion(&["frustrated_anim"], &["missed_cube"])
        .on_completion(&["missed_cube"], &["backup"])
        .on_completion(&["backup"], &["drop_lift", "drop_head_low"])
        .on_completion(&["drop_lift"], &["backupmore"])
        .on_completion(&["backupmore", "drop_head_low"], &["giveup"])
        .initial("goto_cube")
        .build()
}

/// The pick-up composite, usable as a tree root.
pub fn pick_up_cube(name: &str, config: &PickupConfig) -> Result<NodeSpec> {
    Ok(NodeSpec::composite(name, PickUpCube, pick_up_cube_body(config)?))
}
