use crate::error::{CoreError, Domain, ErrorKind, Result};

/// Dispatcher tuning.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Upper bound on events handled by one drain; catches Null/verdict cycles.
    pub max_events_per_drain: usize,
    /// Firing records kept for introspection (oldest dropped first).
    pub trace_capacity: usize,
    /// When false, an escalation with no handler below the root is a fatal error
    /// instead of a root report.
    pub root_accepts_escalations: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_events_per_drain: 10_000,
            trace_capacity: 256,
            root_accepts_escalations: true,
        }
    }
}

impl EngineConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_events_per_drain == 0 {
            return Err(CoreError::error()
                .domain(Domain::Config)
                .kind(ErrorKind::InvalidArgument)
                .msg("max_events_per_drain must be > 0")
                .build());
        }
        Ok(())
    }

    pub fn strict() -> Self {
        Self {
            root_accepts_escalations: false,
            ..Self::default()
        }
    }
}
