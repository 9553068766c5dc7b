//! In-memory collaborators and a deterministic driver for exercising
//! behaviour graphs without a robot.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use hsmbot_core::error::{Domain, ErrorKind};
use hsmbot_core::probe::GrayImage;
use hsmbot_core::services::{
    Motion, MotionCommand, ObjectHandle, ObjectId, Pose, TrackedObject, Vision, WorldModel,
};
use hsmbot_core::{Activation, Conflict, CoreError, Dispatcher, EventKind, EventPayload, Result};

/// Rounds `settle` runs before calling the graph stuck.
pub const MAX_SETTLE_ROUNDS: usize = 10_000;

#[derive(Debug, Default)]
pub struct MotionRecord {
    pub submitted: Vec<(Activation, MotionCommand)>,
    /// Requests still waiting for an answer. Object tracking never gets one.
    pub pending: Vec<(Activation, MotionCommand)>,
    pub cancelled: Vec<Activation>,
    pub start_checks: usize,
    pub blocked: Option<Conflict>,
}

/// Shared view of what a `FakeMotion` was asked to do.
#[derive(Debug, Clone, Default)]
pub struct MotionLog(Arc<Mutex<MotionRecord>>);

impl MotionLog {
    fn lock(&self) -> MutexGuard<'_, MotionRecord> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Make every following start check report `conflict`.
    pub fn block_start(&self, conflict: Conflict) {
        self.lock().blocked = Some(conflict);
    }

    pub fn unblock_start(&self) {
        self.lock().blocked = None;
    }

    pub fn take_pending(&self) -> Vec<(Activation, MotionCommand)> {
        std::mem::take(&mut self.lock().pending)
    }

    pub fn submitted(&self) -> Vec<MotionCommand> {
        self.lock().submitted.iter().map(|(_, c)| c.clone()).collect()
    }

    pub fn cancelled(&self) -> Vec<Activation> {
        self.lock().cancelled.clone()
    }

    pub fn start_checks(&self) -> usize {
        self.lock().start_checks
    }

    /// How many times `command` was submitted.
    pub fn count(&self, command: &MotionCommand) -> usize {
        self.lock()
            .submitted
            .iter()
            .filter(|(_, c)| c == command)
            .count()
    }
}

/// Motion collaborator that records requests and answers nothing by itself.
#[derive(Debug, Default)]
pub struct FakeMotion {
    log: MotionLog,
}

impl FakeMotion {
    pub fn with_log() -> (Self, MotionLog) {
        let log = MotionLog::default();
        (Self { log: log.clone() }, log)
    }
}

impl Motion for FakeMotion {
    fn submit(&mut self, activation: Activation, command: MotionCommand) -> Result<()> {
        let mut rec = self.log.lock();
        rec.submitted.push((activation, command.clone()));
        if !matches!(command, MotionCommand::TrackObject(_)) {
            rec.pending.push((activation, command));
        }
        Ok(())
    }

    fn cancel(&mut self, activation: Activation) {
        let mut rec = self.log.lock();
        rec.pending.retain(|(a, _)| *a != activation);
        rec.cancelled.push(activation);
    }

    fn check_start(&self, _robot: &Pose) -> std::result::Result<(), Conflict> {
        let mut rec = self.log.lock();
        rec.start_checks += 1;
        match &rec.blocked {
            Some(conflict) => Err(conflict.clone()),
            None => Ok(()),
        }
    }
}

/// Vision collaborator serving a fixed list of frames.
///
/// Each `latest_image` call hands out the next frame; the last one repeats.
#[derive(Debug, Default)]
pub struct FakeVision {
    frames: Vec<GrayImage>,
    served: Arc<AtomicUsize>,
    sightings: HashMap<ObjectHandle, Pose>,
}

impl FakeVision {
    pub fn new(frames: Vec<GrayImage>) -> Self {
        Self {
            frames,
            ..Self::default()
        }
    }

    /// Report `handle` as visible at `pose`.
    pub fn sees(mut self, handle: ObjectHandle, pose: Pose) -> Self {
        self.sightings.insert(handle, pose);
        self
    }

    /// Counter of frames handed out so far.
    pub fn served(&self) -> Arc<AtomicUsize> {
        self.served.clone()
    }
}

impl Vision for FakeVision {
    fn latest_image(&self) -> Option<&GrayImage> {
        let n = self.served.fetch_add(1, Ordering::SeqCst);
        self.frames.get(n).or_else(|| self.frames.last())
    }

    fn is_visible(&self, handle: ObjectHandle) -> bool {
        self.sightings.contains_key(&handle)
    }

    fn observed_pose(&self, handle: ObjectHandle) -> Option<Pose> {
        self.sightings.get(&handle).copied()
    }
}

#[derive(Debug, Default)]
pub struct FakeWorld {
    robot: Pose,
    objects: BTreeMap<ObjectId, TrackedObject>,
    carrying: Option<ObjectId>,
}

impl FakeWorld {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_robot(mut self, pose: Pose) -> Self {
        self.robot = pose;
        self
    }

    pub fn with_cube(mut self, id: &str, handle: ObjectHandle, pose: Pose, confidence: f64) -> Self {
        let obj = TrackedObject {
            id: ObjectId::new(id),
            handle,
            pose,
            pose_confidence: confidence,
            follows_sensor: true,
        };
        self.objects.insert(obj.id.clone(), obj);
        self
    }

    pub fn carrying_now(mut self, id: &str) -> Self {
        self.carrying = Some(ObjectId::new(id));
        self
    }
}

impl WorldModel for FakeWorld {
    fn robot_pose(&self) -> Pose {
        self.robot
    }

    fn object(&self, id: &ObjectId) -> Option<&TrackedObject> {
        self.objects.get(id)
    }

    fn object_mut(&mut self, id: &ObjectId) -> Option<&mut TrackedObject> {
        self.objects.get_mut(id)
    }

    fn find_by_handle(&self, handle: ObjectHandle) -> Option<&TrackedObject> {
        self.objects.values().find(|o| o.handle == handle)
    }

    fn carrying(&self) -> Option<&ObjectId> {
        self.carrying.as_ref()
    }

    fn set_carrying(&mut self, id: Option<ObjectId>) {
        self.carrying = id;
    }
}

/// 320x240 frame with the cube marker's top bar where the probe expects it.
pub fn marker_image() -> GrayImage {
    let mut image = GrayImage::filled(320, 240, 210);
    image.fill_rows(30..56, 25);
    image
}

/// Frame with nothing between the lift arms.
pub fn blank_image() -> GrayImage {
    GrayImage::filled(320, 240, 120)
}

/// Answer pending motion requests and jump the clock to the next timer until
/// the root stops or nothing is left to do.
///
/// Answers to nodes that were stopped in the meantime are dropped.
pub fn settle<F>(d: &mut Dispatcher, log: &MotionLog, mut reply: F) -> Result<()>
where
    F: FnMut(&MotionCommand) -> (EventKind, EventPayload),
{
    for _ in 0..MAX_SETTLE_ROUNDS {
        if !d.is_running(d.root()) {
            return Ok(());
        }
        let pending = log.take_pending();
        if !pending.is_empty() {
            for (activation, command) in pending {
                let (kind, payload) = reply(&command);
                match d.deliver(activation, kind, payload) {
                    Err(e) if e.kind != ErrorKind::StaleActivation => return Err(e),
                    _ => {}
                }
            }
            continue;
        }
        match d.next_deadline() {
            Some(at) => d.advance_to(at)?,
            None => return Ok(()),
        }
    }
    Err(CoreError::error()
        .domain(Domain::Engine)
        .kind(ErrorKind::Timeout)
        .msgf(format_args!("graph still busy after {MAX_SETTLE_ROUNDS} rounds"))
        .build())
}

/// Every request completes.
pub fn complete_all(_command: &MotionCommand) -> (EventKind, EventPayload) {
    (EventKind::Completion, EventPayload::None)
}
