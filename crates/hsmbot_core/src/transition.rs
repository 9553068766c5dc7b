use std::fmt;
use std::time::Duration;

use crate::error::{CoreError, Domain, ErrorKind, Result};
use crate::event::EventKind;

/// Transition kinds (closed set).
///
/// Each kind is triggered by exactly one event kind; `Timer` carries its duration.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum TransitionKind {
    Completion,
    Success,
    Failure,
    Timer(Duration),
    Null,
    Escalation,
}

impl TransitionKind {
    /// The event kind that can fire this transition.
    pub const fn trigger(self) -> EventKind {
        match self {
            TransitionKind::Completion => EventKind::Completion,
            TransitionKind::Success => EventKind::Success,
            TransitionKind::Failure => EventKind::Failure,
            TransitionKind::Timer(_) => EventKind::Timer,
            TransitionKind::Null => EventKind::Null,
            TransitionKind::Escalation => EventKind::Escalation,
        }
    }

    /// Whether more than one source is meaningful (a join).
    pub const fn allows_join(self) -> bool {
        matches!(
            self,
            TransitionKind::Completion | TransitionKind::Success | TransitionKind::Failure
        )
    }

    /// Short DSL-style tag: `=C=>`, `=T(0.5)=>`, ...
    pub fn tag(self) -> String {
        match self {
            TransitionKind::Completion => "C".into(),
            TransitionKind::Success => "S".into(),
            TransitionKind::Failure => "F".into(),
            TransitionKind::Timer(d) => format!("T({})", d.as_secs_f64()),
            TransitionKind::Null => "N".into(),
            TransitionKind::Escalation => "ESC".into(),
        }
    }

    /// Timer shorthand taking seconds. Negative, NaN and overflowing
    /// durations are rejected.
    pub fn timer_secs(secs: f64) -> Result<Self> {
        Duration::try_from_secs_f64(secs)
            .map(TransitionKind::Timer)
            .map_err(|e| {
                CoreError::error()
                    .domain(Domain::Graph)
                    .kind(ErrorKind::InvalidArgument)
                    .msgf(format_args!("invalid timer duration {secs}s: {e}"))
                    .build()
            })
    }
}

impl fmt::Display for TransitionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "={}=>", self.tag())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn triggers_are_one_to_one() {
        assert_eq!(TransitionKind::Completion.trigger(), EventKind::Completion);
        assert_eq!(TransitionKind::timer_secs(0.5).unwrap().trigger(), EventKind::Timer);
        assert_eq!(TransitionKind::Escalation.trigger(), EventKind::Escalation);
    }

    #[test]
    fn display_uses_dsl_arrows() {
        assert_eq!(TransitionKind::Null.to_string(), "=N=>");
        assert_eq!(TransitionKind::timer_secs(0.5).unwrap().to_string(), "=T(0.5)=>");
    }

    #[test]
    fn only_verdict_kinds_join() {
        assert!(TransitionKind::Completion.allows_join());
        assert!(!TransitionKind::timer_secs(1.0).unwrap().allows_join());
        assert!(!TransitionKind::Escalation.allows_join());
        assert!(!TransitionKind::Null.allows_join());
    }
}
