//! Async driver: feeds collaborator replies into a `Dispatcher` and keeps its
//! logical clock in step with tokio time.
//!
//! The dispatcher itself stays single-threaded; everything that happens
//! elsewhere (motion replies, aborts) reaches it through one channel.

use std::time::Duration;

use hsmbot_core::error::{Domain, ErrorKind};
use hsmbot_core::{
    Activation, CoreError, Dispatcher, EventKind, EventPayload, FiringRecord, NodeId, Outcome,
    Result, RootReport,
};
use tokio::sync::{broadcast, mpsc};
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Accepted range for `Runner::new`'s time scale.
pub const MIN_TIME_SCALE: f64 = 1e-3;
pub const MAX_TIME_SCALE: f64 = 1e3;

/// Something for the runner to apply to the tree.
#[derive(Debug, Clone, PartialEq)]
pub enum Intake {
    Deliver {
        activation: Activation,
        kind: EventKind,
        payload: EventPayload,
    },
    Abort {
        node: NodeId,
        payload: EventPayload,
    },
    Stop,
}

/// Cloneable handle collaborators use to answer requests.
///
/// Every method returns false once the runner is gone.
#[derive(Debug, Clone)]
pub struct IntakeSender(mpsc::UnboundedSender<Intake>);

impl IntakeSender {
    pub fn deliver(&self, activation: Activation, kind: EventKind, payload: EventPayload) -> bool {
        self.send(Intake::Deliver {
            activation,
            kind,
            payload,
        })
    }

    pub fn abort(&self, node: NodeId, payload: EventPayload) -> bool {
        self.send(Intake::Abort { node, payload })
    }

    pub fn stop(&self) -> bool {
        self.send(Intake::Stop)
    }

    pub fn send(&self, msg: Intake) -> bool {
        self.0.send(msg).is_ok()
    }
}

pub fn intake_channel() -> (IntakeSender, mpsc::UnboundedReceiver<Intake>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (IntakeSender(tx), rx)
}

/// What a finished run looked like.
#[derive(Debug, Clone, PartialEq)]
pub struct RunSummary {
    pub outcome: Option<Outcome>,
    pub reports: Vec<RootReport>,
    pub firings: u64,
    /// Logical time at which the root stopped.
    pub elapsed: Duration,
}

pub struct Runner {
    dispatcher: Dispatcher,
    intake: mpsc::UnboundedReceiver<Intake>,
    // lagging receivers drop old records
    firings: broadcast::Sender<FiringRecord>,
    published: u64,
    time_scale: f64,
}

impl Runner {
    /// `time_scale` is logical seconds per wall-clock second.
    pub fn new(
        dispatcher: Dispatcher,
        intake: mpsc::UnboundedReceiver<Intake>,
        time_scale: f64,
    ) -> Result<Self> {
        if !(MIN_TIME_SCALE..=MAX_TIME_SCALE).contains(&time_scale) {
            return Err(CoreError::error()
                .domain(Domain::Config)
                .kind(ErrorKind::InvalidArgument)
                .msgf(format_args!(
                    "time scale must lie in {MIN_TIME_SCALE}..={MAX_TIME_SCALE}, got {time_scale}"
                ))
                .build());
        }
        let (firings, _rx) = broadcast::channel(32);
        Ok(Self {
            dispatcher,
            intake,
            firings,
            published: 0,
            time_scale,
        })
    }

    /// Stream of transition firings, in order.
    pub fn subscribe(&self) -> broadcast::Receiver<FiringRecord> {
        self.firings.subscribe()
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    pub fn dispatcher_mut(&mut self) -> &mut Dispatcher {
        &mut self.dispatcher
    }

    /// Start the root (unless already running) and drive it until it stops.
    ///
    /// A closed intake stops the tree.
    pub async fn run(mut self) -> Result<RunSummary> {
        let origin = Instant::now();
        let root = self.dispatcher.root();
        if !self.dispatcher.is_running(root) {
            self.dispatcher.start()?;
        }
        self.publish();

        while self.dispatcher.is_running(root) {
            let deadline = self.dispatcher.next_deadline();
            // deadlines past the end of representable time never wake
            let wake = deadline.and_then(|t| {
                Duration::try_from_secs_f64(t.as_secs_f64() / self.time_scale)
                    .ok()
                    .and_then(|wall| origin.checked_add(wall))
            });
            let timer = async move {
                match wake {
                    Some(at) => tokio::time::sleep_until(at).await,
                    None => std::future::pending::<()>().await,
                }
            };

            tokio::select! {
                msg = self.intake.recv() => match msg {
                    Some(Intake::Deliver { activation, kind, payload }) => {
                        self.catch_up(origin)?;
                        match self.dispatcher.deliver(activation, kind, payload) {
                            Err(e) if e.kind == ErrorKind::StaleActivation => {
                                debug!(node = %activation.node, epoch = activation.epoch, "dropped stale reply");
                            }
                            other => other?,
                        }
                    }
                    Some(Intake::Abort { node, payload }) => {
                        self.catch_up(origin)?;
                        if let Err(e) = self.dispatcher.abort(node, payload) {
                            if e.is_fatal() {
                                return Err(e);
                            }
                            warn!(error = %e, "abort ignored");
                        }
                    }
                    Some(Intake::Stop) | None => {
                        info!("stop requested");
                        self.dispatcher.stop();
                    }
                },
                _ = timer => {
                    if let Some(t) = deadline {
                        self.dispatcher.advance_to(t)?;
                    }
                }
            }
            self.publish();
        }

        Ok(RunSummary {
            outcome: self.dispatcher.outcome(),
            reports: self.dispatcher.reports().to_vec(),
            firings: self.dispatcher.firings(),
            elapsed: self.dispatcher.now(),
        })
    }

    /// Bring the logical clock up to wall-clock time before applying input.
    fn catch_up(&mut self, origin: Instant) -> Result<()> {
        let logical = Duration::try_from_secs_f64(origin.elapsed().as_secs_f64() * self.time_scale)
            .unwrap_or(Duration::MAX);
        if logical > self.dispatcher.now() {
            self.dispatcher.advance_to(logical)?;
        }
        Ok(())
    }

    fn publish(&mut self) {
        let fresh: Vec<FiringRecord> = self
            .dispatcher
            .trace()
            .filter(|r| r.seq >= self.published)
            .cloned()
            .collect();
        for record in fresh {
            self.published = record.seq + 1;
            // ignore send errors (no receivers)
            let _ = self.firings.send(record);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hsmbot_core::services::Services;
    use hsmbot_core::{Composite, EngineConfig, NodeSpec, StateNode};

    use crate::nodes::ParentCompletes;

    fn waits() -> Dispatcher {
        let body = Composite::builder()
            .node("wait", StateNode)
            .node("work", StateNode)
            .node("done", ParentCompletes)
            .on_timer(2.0, "wait", &["work"])
            .on_completion(&["work"], &["done"])
            .build()
            .unwrap();
        Dispatcher::new(
            NodeSpec::group("root", body),
            Services::inert(),
            EngineConfig::default(),
        )
        .unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn timers_follow_tokio_time_and_replies_finish_the_run() {
        let d = waits();
        let work = d.lookup("work").unwrap();
        let (tx, rx) = intake_channel();
        let runner = Runner::new(d, rx, 1.0).unwrap();
        let mut firings = runner.subscribe();
        let handle = tokio::spawn(runner.run());

        let first = firings.recv().await.unwrap();
        assert_eq!(first.trigger, EventKind::Timer);
        assert_eq!(first.at, Duration::from_secs(2));

        // `work` has epoch 1: it started once
        let activation = Activation {
            node: work,
            epoch: 1,
        };
        assert!(tx.deliver(activation, EventKind::Completion, EventPayload::None));

        let summary = handle.await.unwrap().unwrap();
        assert_eq!(summary.outcome, Some(Outcome::Completed));
        assert_eq!(summary.firings, 2);
        assert!(summary.elapsed >= Duration::from_secs(2));
    }

    #[tokio::test(start_paused = true)]
    async fn stale_replies_are_dropped_and_stop_ends_the_run() {
        let d = waits();
        let work = d.lookup("work").unwrap();
        let (tx, rx) = intake_channel();
        let runner = Runner::new(d, rx, 4.0).unwrap();
        let handle = tokio::spawn(runner.run());

        // nothing has started `work` yet
        let stale = Activation {
            node: work,
            epoch: 7,
        };
        assert!(tx.deliver(stale, EventKind::Completion, EventPayload::None));
        assert!(tx.stop());

        let summary = handle.await.unwrap().unwrap();
        assert_eq!(summary.outcome, None);
        assert_eq!(summary.firings, 0);
    }

    #[test]
    fn time_scale_must_stay_in_range() {
        for scale in [0.0, -1.0, f64::NAN, f64::INFINITY, 1e300, 1e-300] {
            let (_tx, rx) = intake_channel();
            let e = Runner::new(waits(), rx, scale).err().unwrap();
            assert_eq!(e.kind, ErrorKind::InvalidArgument, "{scale}");
        }
        let (_tx, rx) = intake_channel();
        assert!(Runner::new(waits(), rx, MAX_TIME_SCALE).is_ok());
    }
}
