use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use hsmbot_behaviors::pickup::FRUSTRATED_ANIMATION;
use hsmbot_behaviors::testing::{
    blank_image, complete_all, marker_image, settle, FakeMotion, FakeVision, FakeWorld, MotionLog,
};
use hsmbot_behaviors::{drop_object, pick_up_cube, PickupConfig};
use hsmbot_core::probe::GrayImage;
use hsmbot_core::services::{MotionCommand, ObjectHandle, ObjectId, Pose, Services, TargetRef};
use hsmbot_core::{
    Conflict, Dispatcher, EngineConfig, EventKind, EventPayload, NodeState, Outcome, RootReport,
};
use proptest::prelude::*;

const CUBE: ObjectHandle = ObjectHandle(1);
const CUBE_POSE: Pose = Pose::new(300.0, 0.0, 0.0);

struct Rig {
    d: Dispatcher,
    log: MotionLog,
    frames_served: Arc<AtomicUsize>,
}

fn rig(frames: Vec<GrayImage>, confidence: f64, visible: bool) -> Rig {
    let (motion, log) = FakeMotion::with_log();
    let mut vision = FakeVision::new(frames);
    if visible {
        vision = vision.sees(CUBE, CUBE_POSE);
    }
    let frames_served = vision.served();
    let world = FakeWorld::new().with_cube("Cube-1", CUBE, CUBE_POSE, confidence);
    let services = Services::new(Box::new(motion), Box::new(vision), Box::new(world));

    let root = pick_up_cube("pickup", &PickupConfig::default()).unwrap();
    let mut d = Dispatcher::new(root, services, EngineConfig::default()).unwrap();
    d.bind_target(d.root(), &TargetRef::Handle(CUBE)).unwrap();
    Rig {
        d,
        log,
        frames_served,
    }
}

fn run(rig: &mut Rig) {
    rig.d.start().unwrap();
    settle(&mut rig.d, &rig.log, complete_all).unwrap();
}

fn carrying(d: &Dispatcher) -> Option<ObjectId> {
    d.services().world.carrying().cloned()
}

fn escalations(d: &Dispatcher) -> Vec<&RootReport> {
    d.reports()
        .iter()
        .filter(|r| r.kind == EventKind::Escalation)
        .collect()
}

fn frustrated_animations(log: &MotionLog) -> usize {
    log.count(&MotionCommand::PlayAnimation(FRUSTRATED_ANIMATION.into()))
}

#[test]
fn three_failed_verifications_run_the_frustrated_branch_once() {
    let mut rig = rig(vec![blank_image()], 0.8, true);
    run(&mut rig);

    assert_eq!(rig.d.outcome(), Some(Outcome::Failed));
    assert_eq!(rig.frames_served.load(Ordering::SeqCst), 3);
    assert_eq!(rig.d.starts(rig.d.lookup("frustrated").unwrap()), 1);
    assert_eq!(rig.d.starts(rig.d.lookup("giveup").unwrap()), 1);
    assert_eq!(rig.d.starts(rig.d.lookup("satisfied").unwrap()), 0);
    assert_eq!(frustrated_animations(&rig.log), 1);
    assert_eq!(carrying(&rig.d), None);
    // missed_cube lets go of the cube
    assert!(rig.d.target(rig.d.root()).is_none());
    assert!(escalations(&rig.d).is_empty());
}

#[test]
fn second_verification_succeeds_and_marks_the_cube_carried() {
    let mut rig = rig(vec![blank_image(), marker_image()], 0.8, true);
    run(&mut rig);

    assert_eq!(rig.d.outcome(), Some(Outcome::Completed));
    assert_eq!(rig.frames_served.load(Ordering::SeqCst), 2);
    assert_eq!(rig.d.starts(rig.d.lookup("verify3").unwrap()), 0);
    assert_eq!(frustrated_animations(&rig.log), 0);
    assert_eq!(carrying(&rig.d), Some(ObjectId::new("Cube-1")));
    assert_eq!(rig.d.target(rig.d.root()).map(|t| t.handle), Some(CUBE));

    let cube = rig.d.services().world.object(&ObjectId::new("Cube-1")).unwrap();
    assert!(!cube.follows_sensor);
    assert_eq!(cube.pose_confidence, 1.0);

    // the tree is idle again, head tracking included
    assert_eq!(rig.d.state_of(""), NodeState::Idle);
    assert!(rig
        .log
        .submitted()
        .contains(&MotionCommand::TrackObject(CUBE)));
    assert!(!rig.log.cancelled().is_empty());
}

#[test]
fn blocked_start_escalates_the_conflict_unchanged() {
    let mut rig = rig(vec![marker_image()], 0.8, true);
    let conflict = Conflict::new("start-blocked").with_detail("wall at 40mm");
    rig.log.block_start(conflict.clone());
    run(&mut rig);

    assert_eq!(rig.log.start_checks(), 2);
    assert_eq!(
        rig.log.count(&MotionCommand::DriveStraight {
            distance_mm: -80.0,
            speed_mmps: 50.0
        }),
        1
    );

    let reports = escalations(&rig.d);
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].source, "pickup.forward_conflict");
    assert_eq!(reports[0].origin, None);
    assert_eq!(reports[0].payload, EventPayload::Conflict(conflict));
    assert_eq!(rig.d.outcome(), Some(Outcome::Failed));
    // never planned a path
    assert!(!rig
        .log
        .submitted()
        .iter()
        .any(|c| matches!(c, MotionCommand::GoToPose(_))));
}

#[test]
fn conflict_reported_while_piloting_reaches_the_root_unchanged() {
    let mut rig = rig(vec![marker_image()], 0.8, true);
    let conflict = Conflict::new("start-blocked").with_detail("robot moved mid-path");
    rig.d.start().unwrap();
    settle(&mut rig.d, &rig.log, |command| match command {
        MotionCommand::GoToPose(_) => (
            EventKind::Escalation,
            EventPayload::Conflict(conflict.clone()),
        ),
        _ => complete_all(command),
    })
    .unwrap();

    assert_eq!(rig.d.starts(rig.d.lookup("goto_cube.go_side").unwrap()), 1);
    let reports = escalations(&rig.d);
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].source, "pickup.forward_conflict");
    assert_eq!(reports[0].origin, None);
    assert_eq!(reports[0].payload, EventPayload::Conflict(conflict.clone()));
    assert_eq!(rig.d.outcome(), Some(Outcome::Failed));
    assert_eq!(rig.d.starts(rig.d.lookup("verify").unwrap()), 0);
    assert_eq!(frustrated_animations(&rig.log), 0);
}

#[test]
fn invalid_cube_pose_escalates_then_fails_without_moving() {
    let mut rig = rig(vec![marker_image()], -1.0, true);
    run(&mut rig);

    assert_eq!(rig.d.outcome(), Some(Outcome::Failed));
    let reports = escalations(&rig.d);
    assert_eq!(reports.len(), 1);
    assert_eq!(
        reports[0].payload.conflict().map(|c| c.code.as_ref()),
        Some("invalid-pose")
    );
    assert_eq!(reports[0].source, "pickup.goto_cube");
    assert!(rig.log.submitted().is_empty());
    assert_eq!(rig.d.starts(rig.d.lookup("goto_cube.droplift").unwrap()), 0);
}

#[test]
fn cube_out_of_sight_backs_up_once_then_gives_up() {
    let mut rig = rig(vec![marker_image()], 0.8, false);
    run(&mut rig);

    assert_eq!(rig.d.outcome(), Some(Outcome::Failed));
    assert_eq!(
        rig.log.count(&MotionCommand::DriveStraight {
            distance_mm: -50.0,
            speed_mmps: 50.0
        }),
        1
    );
    assert_eq!(rig.d.starts(rig.d.lookup("goto_cube.parentfails2").unwrap()), 1);
    assert_eq!(rig.d.starts(rig.d.lookup("parentfails1").unwrap()), 1);
    assert_eq!(rig.frames_served.load(Ordering::SeqCst), 0);
}

#[test]
fn picking_the_robot_up_aborts_and_cancels_motion() {
    let mut rig = rig(vec![marker_image()], 0.8, true);
    rig.d.start().unwrap();
    let droplift = rig.d.lookup("goto_cube.droplift").unwrap();
    let pending = rig.d.activation(droplift).unwrap();

    rig.d
        .abort(rig.d.root(), EventPayload::Text("robot picked up".into()))
        .unwrap();

    assert_eq!(rig.d.outcome(), Some(Outcome::Failed));
    assert!(rig.log.cancelled().contains(&pending));
    assert!(rig.log.take_pending().is_empty());
}

#[test]
fn drop_object_lowers_backs_off_and_clears_carrying() {
    let (motion, log) = FakeMotion::with_log();
    let world = FakeWorld::new().carrying_now("Cube-1");
    let services = Services::new(
        Box::new(motion),
        Box::new(FakeVision::default()),
        Box::new(world),
    );
    let mut d = Dispatcher::new(drop_object("drop").unwrap(), services, EngineConfig::default())
        .unwrap();
    d.start().unwrap();
    settle(&mut d, &log, complete_all).unwrap();

    assert_eq!(d.outcome(), Some(Outcome::Completed));
    assert_eq!(carrying(&d), None);
    assert_eq!(
        log.submitted(),
        vec![
            MotionCommand::SetLiftHeight { fraction: 0.0 },
            MotionCommand::DriveStraight {
                distance_mm: -10.0,
                speed_mmps: 50.0
            },
            MotionCommand::SetHeadAngle { degrees: -20.0 },
        ]
    );
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    #[test]
    fn pickup_succeeds_iff_a_marker_arrives_within_three_frames(misses in 0usize..5) {
        let mut frames = vec![blank_image(); misses];
        frames.push(marker_image());
        let mut rig = rig(frames, 0.8, true);
        run(&mut rig);

        let expected = if misses < 3 { Outcome::Completed } else { Outcome::Failed };
        prop_assert_eq!(rig.d.outcome(), Some(expected));
        prop_assert_eq!(rig.frames_served.load(Ordering::SeqCst), (misses + 1).min(3));
        prop_assert_eq!(frustrated_animations(&rig.log), usize::from(misses >= 3));
    }
}
