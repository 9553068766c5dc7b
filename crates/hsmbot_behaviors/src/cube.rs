//! Drive up to a cube and square up in front of one of its faces.

use hsmbot_core::event::Conflict;
use hsmbot_core::services::{MotionCommand, Pose};
use hsmbot_core::{Behavior, Composite, CoreError, NodeContext, NodeSpec, Result, StopContext};
use tracing::{info, warn};

use crate::geometry::{almost_docked, pick_side, relative_bearing};
use crate::nodes::{
    Escalate, Forward, Idle, LookAtObject, ParentCompletes, ParentFails, PilotCheckStart,
    PilotToPose, Print, SetLiftHeight,
};
use crate::pickup::PickupConfig;

/// Stand-off used when planning the path to a face.
pub const SIDE_DISTANCE_MM: f64 = 100.0;
/// Stand-off used by the docked check.
pub const DOCKED_SIDE_DISTANCE_MM: f64 = 25.0;
/// Bearings smaller than this are not worth a turn.
const TURN_DEADBAND: f64 = 2.0 * std::f64::consts::PI / 180.0;

/// Best known pose of the target cube.
///
/// With `camera` set the last camera sighting wins over the world model.
fn cube_pose(cx: &NodeContext<'_>, camera: bool) -> Result<Pose> {
    let target = cx.require_target()?;
    if camera {
        if let Some(pose) = cx.vision().observed_pose(target.handle) {
            return Ok(pose);
        }
    }
    cx.world()
        .object(&target.id)
        .map(|obj| obj.pose)
        .ok_or_else(|| CoreError::precondition(format!("{} is not in the world model", target.id)))
}

fn cube_visible(cx: &NodeContext<'_>) -> Result<bool> {
    let handle = cx.require_target()?.handle;
    Ok(cx.vision().is_visible(handle))
}

/// Composite behaviour: shares its target with the looker and refuses to run
/// when the world model has lost track of the cube.
#[derive(Debug, Clone, Copy, Default)]
pub struct GoToCube;

impl Behavior for GoToCube {
    fn kind(&self) -> &'static str {
        "GoToCube"
    }

    fn start(&mut self, cx: &mut NodeContext<'_>) -> Result<()> {
        let target = cx.require_target()?.clone();
        let confidence = cx
            .world()
            .object(&target.id)
            .map(|obj| obj.pose_confidence)
            .ok_or_else(|| CoreError::precondition(format!("{} is not in the world model", target.id)))?;
        if confidence < 0.0 {
            warn!(node = cx.name(), cube = %target.id, confidence, "cube has invalid pose");
            cx.post_escalation(Conflict::new("invalid-pose").with_detail(target.id.to_string()));
            cx.post_failure();
            return Ok(());
        }
        cx.share_target("looker", target);
        Ok(())
    }
}

/// Success when the robot already sits squarely in front of a face.
#[derive(Debug, Clone, Copy, Default)]
pub struct CheckAlmostDocked;

impl Behavior for CheckAlmostDocked {
    fn kind(&self) -> &'static str {
        "CheckAlmostDocked"
    }

    fn start(&mut self, cx: &mut NodeContext<'_>) -> Result<()> {
        if !cube_visible(cx)? {
            cx.post_failure();
            return Ok(());
        }
        let robot = cx.world().robot_pose();
        let side = pick_side(&cube_pose(cx, true)?, &robot, DOCKED_SIDE_DISTANCE_MM);
        if almost_docked(&robot, &side) {
            cx.post_success();
        } else {
            cx.post_failure();
        }
        Ok(())
    }
}

/// Pilot to the approach pose in front of the closest face.
#[derive(Debug, Clone, Copy, Default)]
pub struct GoToSide;

impl Behavior for GoToSide {
    fn kind(&self) -> &'static str {
        "GoToSide"
    }

    fn start(&mut self, cx: &mut NodeContext<'_>) -> Result<()> {
        let robot = cx.world().robot_pose();
        let side = pick_side(&cube_pose(cx, false)?, &robot, SIDE_DISTANCE_MM);
        info!(
            node = cx.name(),
            from = ?(robot.x, robot.y, robot.theta.to_degrees()),
            to = ?(side.x, side.y, side.theta.to_degrees()),
            "planned path to pickup point"
        );
        PilotToPose::new(side).start(cx)
    }

    fn stop(&mut self, cx: &mut StopContext<'_>) {
        let activation = cx.activation();
        cx.motion().cancel(activation);
    }
}

/// Log where the cube is relative to the robot. Posts nothing.
#[derive(Debug, Clone)]
pub struct ReportPosition {
    pub label: &'static str,
}

impl ReportPosition {
    pub fn new(label: &'static str) -> Self {
        Self { label }
    }
}

impl Behavior for ReportPosition {
    fn kind(&self) -> &'static str {
        "ReportPosition"
    }

    fn start(&mut self, cx: &mut NodeContext<'_>) -> Result<()> {
        let visible = cube_visible(cx)?;
        let cube = cube_pose(cx, true)?;
        let robot = cx.world().robot_pose();
        info!(
            label = self.label,
            visible,
            cube = ?(cube.x, cube.y),
            robot = ?(robot.x, robot.y),
            dist = robot.distance_to(&cube),
            bearing = relative_bearing(&robot, &cube).to_degrees(),
            "cube position"
        );
        Ok(())
    }
}

/// Turn to face the cube's centre. With `check_vis`, fails when the cube is
/// out of sight.
#[derive(Debug, Clone, Copy, Default)]
pub struct TurnToCube {
    pub check_vis: bool,
}

impl TurnToCube {
    pub fn new(check_vis: bool) -> Self {
        Self { check_vis }
    }
}

impl Behavior for TurnToCube {
    fn kind(&self) -> &'static str {
        "TurnToCube"
    }

    fn start(&mut self, cx: &mut NodeContext<'_>) -> Result<()> {
        if self.check_vis && !cube_visible(cx)? {
            info!(node = cx.name(), "could not see the cube");
            cx.post_failure();
            return Ok(());
        }
        let robot = cx.world().robot_pose();
        let mut angle = relative_bearing(&robot, &cube_pose(cx, true)?);
        if angle.abs() <= TURN_DEADBAND {
            angle = 0.0;
        }
        info!(node = cx.name(), angle = angle.to_degrees(), "turning to cube");
        cx.submit(MotionCommand::Turn { angle })
    }

    fn stop(&mut self, cx: &mut StopContext<'_>) {
        let activation = cx.activation();
        cx.motion().cancel(activation);
    }
}

/// Drive straight until the lift is `offset_mm` short of the cube centre.
#[derive(Debug, Clone, Copy)]
pub struct ForwardToCube {
    pub offset_mm: f64,
}

impl ForwardToCube {
    pub fn new(offset_mm: f64) -> Self {
        Self { offset_mm }
    }
}

impl Behavior for ForwardToCube {
    fn kind(&self) -> &'static str {
        "ForwardToCube"
    }

    fn start(&mut self, cx: &mut NodeContext<'_>) -> Result<()> {
        let robot = cx.world().robot_pose();
        let distance = robot.distance_to(&cube_pose(cx, true)?) - self.offset_mm;
        if distance < 0.0 {
            warn!(node = cx.name(), distance, "negative distance to cube");
        }
        info!(node = cx.name(), distance, "forward to cube");
        Forward::new(distance).start(cx)
    }

    fn stop(&mut self, cx: &mut StopContext<'_>) {
        let activation = cx.activation();
        cx.motion().cancel(activation);
    }
}

/// Body of the go-to-cube composite.
///
/// A second failed start check escalates the planner's conflict unchanged;
/// escalations from the path planner climb out on their own.
pub fn go_to_cube_body(config: &PickupConfig) -> Result<Composite> {
    let lift = config.lift_settle.as_secs_f64();
    let settle = config.settle_pause.as_secs_f64();
    Composite::builder()
        .node("droplift", SetLiftHeight::new(0.0))
        .node("waitlift", Idle::default())
        .node("looker", LookAtObject)
        .node("check_almost_docked", CheckAlmostDocked)
        .node("check_start", PilotCheckStart)
        .node("print1", Print::new("Start collision check passed."))
        .node("print2", Print::new("Backing up to escape start collision..."))
        .node("backup", Forward::new(-80.0))
        .node("settle1", Idle::default())
        .node("check_start2", PilotCheckStart)
        .node("print3", Print::new("Start collision re-check passed."))
        .node("start_blocked", Escalate)
        .node("go_side", GoToSide)
        .node("parentfails1", ParentFails)
        .node("report1", ReportPosition::new("go_side_deccel"))
        .node("report2", ReportPosition::new("go_side_stopped"))
        .node("turn_to_cube1", TurnToCube::new(true))
        .node("report3", ReportPosition::new("turn_to_cube1_deccel"))
        .node("report4", ReportPosition::new("turn_to_cube1_stopped"))
        .node("backup2", Forward::new(-50.0))
        .node("settle2", Idle::default())
        .node("approach", ForwardToCube::new(60.0))
        .node("report5", ReportPosition::new("approach"))
        .node("report6", ReportPosition::new("approach"))
        .node("turntocube1", TurnToCube::new(false))
        .node("forwardtocube1", ForwardToCube::new(15.0))
        .node("turn_to_cube2", TurnToCube::new(true))
        .node("print4", Print::new("TurnToCube2: Cube Lost"))
        .node("parentfails2", ParentFails)
        .node("forwardtocube2", ForwardToCube::new(60.0))
        .node("turn_to_cube3", TurnToCube::new(false))
        .node("forwardtocube3", ForwardToCube::new(20.0))
        .node("success", ParentCompletes)
        // lift motion fails on the charger; carry on either way
        .on_completion(&["droplift"], &["waitlift", "looker"])
        .on_failure(&["droplift"], &["waitlift", "looker"])
        .on_timer(lift, "waitlift", &["check_almost_docked"])
        .on_success(&["check_almost_docked"], &["turn_to_cube2"])
        .on_failure(&["check_almost_docked"], &["check_start"])
        .on_success(&["check_start"], &["print1"])
        .on_null("print1", &["go_side"])
        .on_failure(&["check_start"], &["print2"])
        .on_null("print2", &["backup"])
        .on_completion(&["backup"], &["settle1"])
        .on_timer(0.5, "settle1", &["check_start2"])
        .on_success(&["check_start2"], &["print3"])
        .on_null("print3", &["go_side"])
        .on_failure(&["check_start2"], &["start_blocked"])
        .on_failure(&["go_side"], &["parentfails1"])
        .on_completion(&["go_side"], &["report1"])
        .on_timer(settle, "report1", &["report2"])
        .on_null("report2", &["turn_to_cube1"])
        .on_completion(&["turn_to_cube1"], &["report3"])
        .on_timer(settle, "report3", &["report4"])
        .on_null("report4", &["approach"])
        .on_failure(&["turn_to_cube1"], &["backup2"])
        .on_completion(&["backup2"], &["settle2"])
        .on_timer(1.0, "settle2", &["turn_to_cube2"])
        .on_completion(&["approach"], &["report5"])
        .on_timer(settle, "report5", &["report6"])
        .on_null("report6", &["turntocube1"])
        .on_completion(&["turntocube1"], &["forwardtocube1"])
        .on_completion(&["forwardtocube1"], &["success"])
        .on_failure(&["turn_to_cube2"], &["print4"])
        .on_null("print4", &["parentfails2"])
        .on_completion(&["turn_to_cube2"], &["forwardtocube2"])
        .on_completion(&["forwardtocube2"], &["turn_to_cube3"])
        .on_completion(&["turn_to_cube3"], &["forwardtocube3"])
        .on_completion(&["forwardtocube3"], &["success"])
        .build()
}

/// The go-to-cube composite, ready to place in a parent body.
pub fn go_to_cube(name: &str, config: &PickupConfig) -> Result<NodeSpec> {
    Ok(NodeSpec::composite(name, GoToCube, go_to_cube_body(config)?))
}
