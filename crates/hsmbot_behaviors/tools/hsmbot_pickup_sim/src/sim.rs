//! Simulated collaborators wired to a pickup run.

use std::collections::HashMap;
use std::time::Duration;

use hsmbot_behaviors::testing::{blank_image, marker_image, FakeVision, FakeWorld};
use hsmbot_behaviors::{intake_channel, pick_up_cube, IntakeSender, PickupConfig, Runner};
use hsmbot_core::services::{Motion, MotionCommand, ObjectHandle, Pose, Services, TargetRef};
use hsmbot_core::{Activation, Conflict, Dispatcher, EngineConfig, EventKind, EventPayload};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::config::Config;

pub const CUBE: ObjectHandle = ObjectHandle(1);
pub const CUBE_ID: &str = "Cube-1";
pub const CUBE_POSE: Pose = Pose::new(300.0, 0.0, 0.0);

/// Completes every motion after a fixed wall-clock delay. Object tracking
/// runs until cancelled.
pub struct SimMotion {
    intake: IntakeSender,
    delay: Duration,
    blocked: Option<Conflict>,
    inflight: HashMap<Activation, JoinHandle<()>>,
}

impl SimMotion {
    pub fn new(intake: IntakeSender, delay: Duration, blocked: Option<Conflict>) -> Self {
        Self {
            intake,
            delay,
            blocked,
            inflight: HashMap::new(),
        }
    }
}

impl Motion for SimMotion {
    fn submit(&mut self, activation: Activation, command: MotionCommand) -> hsmbot_core::Result<()> {
        info!(node = %activation.node, ?command, "motion");
        if matches!(command, MotionCommand::TrackObject(_)) {
            return Ok(());
        }
        self.inflight.retain(|_, task| !task.is_finished());
        let intake = self.intake.clone();
        let delay = self.delay;
        let task = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            // ignore send errors (runner gone)
            let _ = intake.deliver(activation, EventKind::Completion, EventPayload::None);
        });
        self.inflight.insert(activation, task);
        Ok(())
    }

    fn cancel(&mut self, activation: Activation) {
        if let Some(task) = self.inflight.remove(&activation) {
            debug!(node = %activation.node, "motion cancelled");
            task.abort();
        }
    }

    fn check_start(&self, _robot: &Pose) -> Result<(), Conflict> {
        match &self.blocked {
            Some(conflict) => Err(conflict.clone()),
            None => Ok(()),
        }
    }
}

/// Build a runner for the configured pickup scenario. Must be called inside
/// a tokio runtime; motions are simulated by spawned tasks.
pub fn build(config: &Config) -> anyhow::Result<Runner> {
    let (intake, rx) = intake_channel();
    let delay = config.motion.div_f64(config.time_scale);
    let blocked = config
        .conflict
        .clone()
        .map(|code| Conflict::new(code).with_detail("simulated start collision"));
    let motion = SimMotion::new(intake, delay, blocked);

    let mut frames = vec![blank_image(); config.misses];
    frames.push(marker_image());
    let mut vision = FakeVision::new(frames);
    if !config.hidden_cube {
        vision = vision.sees(CUBE, CUBE_POSE);
    }

    let confidence = if config.invalid_pose { -1.0 } else { 0.9 };
    let world = FakeWorld::new().with_cube(CUBE_ID, CUBE, CUBE_POSE, confidence);
    let services = Services::new(Box::new(motion), Box::new(vision), Box::new(world));

    let root = pick_up_cube("pickup", &PickupConfig::default())?;
    let mut dispatcher = Dispatcher::new(root, services, EngineConfig::default())?;
    dispatcher.bind_target(dispatcher.root(), &TargetRef::Handle(CUBE))?;
    Ok(Runner::new(dispatcher, rx, config.time_scale)?)
}
