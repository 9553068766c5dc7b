//! External collaborators the engine talks to.
//!
//! The dispatcher owns one `Services` bundle and lends it to behaviours through
//! their context. Nothing here performs I/O itself; concrete robots, simulators
//! and test doubles implement the traits.

use std::borrow::Cow;
use std::fmt;

use crate::error::{CoreError, Domain, ErrorKind, Result};
use crate::event::Conflict;
use crate::node::Activation;
use crate::probe::GrayImage;

/// Planar pose: millimetres and radians.
#[derive(Debug, Copy, Clone, PartialEq, Default)]
pub struct Pose {
    pub x: f64,
    pub y: f64,
    pub theta: f64,
}

impl Pose {
    pub const fn new(x: f64, y: f64, theta: f64) -> Self {
        Self { x, y, theta }
    }

    pub fn distance_to(&self, other: &Pose) -> f64 {
        (self.x - other.x).hypot(self.y - other.y)
    }
}

/// Key of an object in the world model.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId(pub String);

impl ObjectId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Raw hardware handle of an object as reported by the robot.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectHandle(pub u32);

/// World-model record for a tracked object.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackedObject {
    pub id: ObjectId,
    pub handle: ObjectHandle,
    pub pose: Pose,
    /// Negative means the pose estimate is unusable.
    pub pose_confidence: f64,
    /// When false the world model stops applying sensor updates to the pose.
    pub follows_sensor: bool,
}

/// How a caller names the object a behaviour acts on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TargetRef {
    Handle(ObjectHandle),
    Tracked(ObjectId),
}

/// A target resolved against the world model. Both identities are known.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    pub id: ObjectId,
    pub handle: ObjectHandle,
}

impl TargetRef {
    /// Resolve once, at entry. Downstream nodes only ever see `Target`.
    pub fn resolve(&self, world: &dyn WorldModel) -> Result<Target> {
        let found = match self {
            TargetRef::Handle(handle) => world.find_by_handle(*handle),
            TargetRef::Tracked(id) => world.object(id),
        };
        found
            .map(|obj| Target {
                id: obj.id.clone(),
                handle: obj.handle,
            })
            .ok_or_else(|| {
                CoreError::warn()
                    .domain(Domain::Collaborator)
                    .kind(ErrorKind::Precondition)
                    .msgf(format_args!("target {self:?} is not in the world model"))
                    .build()
            })
    }
}

/// Requests issued to the motion collaborator.
///
/// Each request is answered later by a Completion, Failure or Escalation event
/// delivered against the issuing activation.
#[derive(Debug, Clone, PartialEq)]
pub enum MotionCommand {
    GoToPose(Pose),
    DriveStraight { distance_mm: f64, speed_mmps: f64 },
    Turn { angle: f64 },
    SetLiftHeight { fraction: f64 },
    SetHeadAngle { degrees: f64 },
    StopAllMotors,
    TrackObject(ObjectHandle),
    PlayAnimation(Cow<'static, str>),
    Say(String),
}

/// Motion/navigation and actuator collaborator.
pub trait Motion: Send {
    fn submit(&mut self, activation: Activation, command: MotionCommand) -> Result<()>;

    /// Abandon whatever `activation` asked for. Must tolerate unknown activations.
    fn cancel(&mut self, activation: Activation);

    /// Collision check of the robot's current pose before planning a path.
    fn check_start(&self, robot: &Pose) -> std::result::Result<(), Conflict>;
}

/// Vision collaborator. Synchronous getters only.
pub trait Vision: Send {
    fn latest_image(&self) -> Option<&GrayImage>;
    fn is_visible(&self, handle: ObjectHandle) -> bool;
    /// Pose of the object as last seen by the camera, in the odometry frame.
    fn observed_pose(&self, handle: ObjectHandle) -> Option<Pose>;
}

/// World-model collaborator: best pose estimates and the carrying flag.
pub trait WorldModel: Send {
    fn robot_pose(&self) -> Pose;
    fn object(&self, id: &ObjectId) -> Option<&TrackedObject>;
    fn object_mut(&mut self, id: &ObjectId) -> Option<&mut TrackedObject>;
    fn find_by_handle(&self, handle: ObjectHandle) -> Option<&TrackedObject>;
    fn carrying(&self) -> Option<&ObjectId>;
    fn set_carrying(&mut self, id: Option<ObjectId>);
}

/// The collaborator bundle handed to behaviours.
pub struct Services {
    pub motion: Box<dyn Motion>,
    pub vision: Box<dyn Vision>,
    pub world: Box<dyn WorldModel>,
}

impl Services {
    pub fn new(
        motion: Box<dyn Motion>,
        vision: Box<dyn Vision>,
        world: Box<dyn WorldModel>,
    ) -> Self {
        Self {
            motion,
            vision,
            world,
        }
    }

    /// Collaborators that accept every request and know nothing.
    pub fn inert() -> Self {
        Self::new(Box::new(Inert), Box::new(Inert), Box::new(Inert))
    }
}

impl fmt::Debug for Services {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Services").finish_non_exhaustive()
    }
}

/// No-op collaborator used by `Services::inert`.
#[derive(Debug, Default, Clone, Copy)]
pub struct Inert;

impl Motion for Inert {
    fn submit(&mut self, _activation: Activation, _command: MotionCommand) -> Result<()> {
        Ok(())
    }

    fn cancel(&mut self, _activation: Activation) {}

    fn check_start(&self, _robot: &Pose) -> std::result::Result<(), Conflict> {
        Ok(())
    }
}

impl Vision for Inert {
    fn latest_image(&self) -> Option<&GrayImage> {
        None
    }

    fn is_visible(&self, _handle: ObjectHandle) -> bool {
        false
    }

    fn observed_pose(&self, _handle: ObjectHandle) -> Option<Pose> {
        None
    }
}

impl WorldModel for Inert {
    fn robot_pose(&self) -> Pose {
        Pose::default()
    }

    fn object(&self, _id: &ObjectId) -> Option<&TrackedObject> {
        None
    }

    fn object_mut(&mut self, _id: &ObjectId) -> Option<&mut TrackedObject> {
        None
    }

    fn find_by_handle(&self, _handle: ObjectHandle) -> Option<&TrackedObject> {
        None
    }

    fn carrying(&self) -> Option<&ObjectId> {
        None
    }

    fn set_carrying(&mut self, _id: Option<ObjectId>) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    struct MapWorld(BTreeMap<ObjectId, TrackedObject>);

    impl WorldModel for MapWorld {
        fn robot_pose(&self) -> Pose {
            Pose::default()
        }
        fn object(&self, id: &ObjectId) -> Option<&TrackedObject> {
            self.0.get(id)
        }
        fn object_mut(&mut self, id: &ObjectId) -> Option<&mut TrackedObject> {
            self.0.get_mut(id)
        }
        fn find_by_handle(&self, handle: ObjectHandle) -> Option<&TrackedObject> {
            self.0.values().find(|o| o.handle == handle)
        }
        fn carrying(&self) -> Option<&ObjectId> {
            None
        }
        fn set_carrying(&mut self, _id: Option<ObjectId>) {}
    }

    fn world() -> MapWorld {
        let cube = TrackedObject {
            id: ObjectId::new("Cube-1"),
            handle: ObjectHandle(7),
            pose: Pose::new(300.0, 0.0, 0.0),
            pose_confidence: 0.5,
            follows_sensor: true,
        };
        MapWorld(BTreeMap::from([(cube.id.clone(), cube)]))
    }

    #[test]
    fn both_target_forms_resolve_to_the_same_object() {
        let w = world();
        let by_handle = TargetRef::Handle(ObjectHandle(7)).resolve(&w).unwrap();
        let by_id = TargetRef::Tracked(ObjectId::new("Cube-1")).resolve(&w).unwrap();
        assert_eq!(by_handle, by_id);
        assert_eq!(by_id.handle, ObjectHandle(7));
    }

    #[test]
    fn unknown_target_is_a_precondition_error() {
        let e = TargetRef::Handle(ObjectHandle(99)).resolve(&world()).unwrap_err();
        assert_eq!(e.kind, ErrorKind::Precondition);
        assert_eq!(e.domain, Domain::Collaborator);
    }
}
