//! Leaves that never touch actuators: logging, verdicts for the parent,
//! escalation forwarding and the carrying flag.

use hsmbot_core::probe::{verify_grasp, ProbeConfig};
use hsmbot_core::{Behavior, CoreError, EventKind, EventPayload, NodeContext, Result, StateNode};
use tracing::{info, warn};

/// Log a line. Posts nothing; wire it onward with a Null transition.
#[derive(Debug, Clone)]
pub struct Print {
    pub message: String,
}

impl Print {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl Behavior for Print {
    fn kind(&self) -> &'static str {
        "Print"
    }

    fn start(&mut self, cx: &mut NodeContext<'_>) -> Result<()> {
        info!(node = cx.name(), "{}", self.message);
        Ok(())
    }
}

/// Completes the enclosing composite.
#[derive(Debug, Clone, Copy, Default)]
pub struct ParentCompletes;

impl Behavior for ParentCompletes {
    fn kind(&self) -> &'static str {
        "ParentCompletes"
    }

    fn start(&mut self, cx: &mut NodeContext<'_>) -> Result<()> {
        cx.post_for_parent(EventKind::Completion, EventPayload::None)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ParentSucceeds;

impl Behavior for ParentSucceeds {
    fn kind(&self) -> &'static str {
        "ParentSucceeds"
    }

    fn start(&mut self, cx: &mut NodeContext<'_>) -> Result<()> {
        cx.post_for_parent(EventKind::Success, EventPayload::None)
    }
}

/// Fails the enclosing composite.
#[derive(Debug, Clone, Copy, Default)]
pub struct ParentFails;

impl Behavior for ParentFails {
    fn kind(&self) -> &'static str {
        "ParentFails"
    }

    fn start(&mut self, cx: &mut NodeContext<'_>) -> Result<()> {
        cx.post_for_parent(EventKind::Failure, EventPayload::None)
    }
}

/// A node that just sits there until a transition takes it away.
pub type Idle = StateNode;

/// Re-post the payload of the event that started this node as an escalation.
///
/// Placed after a failing pilot check or on an escalation transition, it
/// carries the conflict one level further up without touching it.
#[derive(Debug, Clone, Copy, Default)]
pub struct Escalate;

impl Behavior for Escalate {
    fn kind(&self) -> &'static str {
        "Escalate"
    }

    fn start(&mut self, cx: &mut NodeContext<'_>) -> Result<()> {
        let payload = cx.event().payload.clone();
        cx.post(EventKind::Escalation, payload);
        Ok(())
    }
}

/// Mark the target as carried and stop trusting sensor updates for it.
#[derive(Debug, Clone, Copy, Default)]
pub struct SetCarrying;

impl Behavior for SetCarrying {
    fn kind(&self) -> &'static str {
        "SetCarrying"
    }

    fn start(&mut self, cx: &mut NodeContext<'_>) -> Result<()> {
        let id = cx.require_target()?.id.clone();
        let world = cx.world_mut();
        if let Some(obj) = world.object_mut(&id) {
            obj.follows_sensor = false;
            obj.pose_confidence = 1.0;
        }
        world.set_carrying(Some(id));
        cx.post_completion();
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SetNotCarrying;

impl Behavior for SetNotCarrying {
    fn kind(&self) -> &'static str {
        "SetNotCarrying"
    }

    fn start(&mut self, cx: &mut NodeContext<'_>) -> Result<()> {
        cx.world_mut().set_carrying(None);
        cx.clear_parent_target();
        cx.post_completion();
        Ok(())
    }
}

/// Check the camera frame for the cube's marker band between the lift arms.
///
/// Success when the probe accepts the frame, Failure otherwise. A missing
/// frame is a start error, which the dispatcher turns into Failure.
#[derive(Debug, Clone, Default)]
pub struct VerifyPickup {
    pub probe: ProbeConfig,
}

impl VerifyPickup {
    pub fn new(probe: ProbeConfig) -> Self {
        Self { probe }
    }
}

impl Behavior for VerifyPickup {
    fn kind(&self) -> &'static str {
        "VerifyPickup"
    }

    fn start(&mut self, cx: &mut NodeContext<'_>) -> Result<()> {
        let verdict = match cx.vision().latest_image() {
            Some(image) => verify_grasp(image, &self.probe)?,
            None => return Err(CoreError::precondition("no camera frame to verify")),
        };
        if verdict.passed {
            info!(node = cx.name(), bad = verdict.bad_columns, "pickup verified");
            cx.post_success();
        } else {
            warn!(node = cx.name(), bad = verdict.bad_columns, "pickup not verified");
            cx.post_failure();
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{marker_image, FakeMotion, FakeVision, FakeWorld};
    use hsmbot_core::services::Services;
    use hsmbot_core::{Composite, Dispatcher, EngineConfig, NodeSpec, NodeState, Outcome};

    fn services(vision: FakeVision) -> Services {
        let (motion, _log) = FakeMotion::with_log();
        Services::new(Box::new(motion), Box::new(vision), Box::new(FakeWorld::new()))
    }

    fn verifier(vision: FakeVision) -> Dispatcher {
        let body = Composite::builder()
            .node("verify", VerifyPickup::default())
            .node("yes", ParentSucceeds)
            .node("no", Idle::default())
            .on_success(&["verify"], &["yes"])
            .on_failure(&["verify"], &["no"])
            .build()
            .unwrap();
        Dispatcher::new(NodeSpec::group("root", body), services(vision), EngineConfig::default())
            .unwrap()
    }

    #[test]
    fn verify_without_a_frame_fails_with_the_error_attached() {
        let mut d = verifier(FakeVision::default());
        d.start().unwrap();
        assert_eq!(d.state_of("no"), NodeState::Running);
        let last = d.trace().last().unwrap();
        assert_eq!(last.trigger, EventKind::Failure);
    }

    #[test]
    fn verify_with_marker_succeeds_for_the_parent() {
        let mut d = verifier(FakeVision::new(vec![marker_image()]));
        d.start().unwrap();
        assert_eq!(d.outcome(), Some(Outcome::Succeeded));
    }

    #[test]
    fn print_chains_through_null_and_escalate_forwards_payload() {
        let body = Composite::builder()
            .node("say", Print::new("hello"))
            .node("raise", Escalate)
            .on_null("say", &["raise"])
            .build()
            .unwrap();
        let mut d = Dispatcher::new(
            NodeSpec::group("root", body),
            services(FakeVision::default()),
            EngineConfig::default(),
        )
        .unwrap();
        d.start().unwrap();

        assert_eq!(d.state_of("raise"), NodeState::Running);
        let report = &d.reports()[0];
        assert_eq!(report.kind, EventKind::Escalation);
        // started by a Null event, so there was nothing to forward
        assert!(report.payload.is_none());
    }
}
