use std::borrow::Cow;
use std::fmt;
use thiserror::Error;

/// Convenient result alias for hsmbot_core.
pub type Result<T> = std::result::Result<T, CoreError>;

/// Log/handling importance. Maps onto tracing levels in `logging`.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd)]
pub enum Severity {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
    Fatal,
}

/// Subsystem that raised the error.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Domain {
    Engine,
    Graph,
    Node,
    Probe,
    Collaborator,
    Config,
    Other,
}

/// Stable error "kind" for matching/branching.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum ErrorKind {
    InvalidArgument,
    InvalidState,
    InvalidTransition,
    DuplicateName,
    UnknownNode,
    AmbiguousTransition,
    Unreachable,
    Unhandled,
    Precondition,
    StaleActivation,
    Timeout,
    Other,
}

/// Structured context attached to an error.
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum Payload {
    None,

    /// Key/value context.
    Context {
        key: &'static str,
        value: Cow<'static, str>,
    },

    /// Node lifecycle context: compact ids of `NodeState` and `NodeSignal`.
    NodeTransition { from_state: u8, via: u8 },

    /// The node (or dotted node path) the error concerns.
    Node { name: Cow<'static, str> },

    /// Arbitrary numeric detail.
    Code(u32),
}

/// The one error type that crosses module boundaries in hsmbot_core.
#[derive(Debug, Error, Clone, Eq, PartialEq)]
#[error("{severity:?}: {message}")]
pub struct CoreError {
    pub domain: Domain,
    pub kind: ErrorKind,
    pub severity: Severity,
    pub message: Cow<'static, str>,
    pub payload: Payload,
}

impl CoreError {
    // Fluent entry points, one per severity in use.

    #[inline]
    pub fn debug() -> ErrB {
        ErrB::new(Severity::Debug)
    }
    #[inline]
    pub fn warn() -> ErrB {
        ErrB::new(Severity::Warn)
    }
    #[inline]
    pub fn error() -> ErrB {
        ErrB::new(Severity::Error)
    }
    #[inline]
    pub fn fatal() -> ErrB {
        ErrB::new(Severity::Fatal)
    }

    /// Construct a node-lifecycle InvalidTransition error with structured context.
    pub fn invalid_node_transition(from_state: u8, via: u8) -> Self {
        CoreError::warn()
            .domain(Domain::Node)
            .kind(ErrorKind::InvalidTransition)
            .msg("invalid node lifecycle transition")
            .payload(Payload::NodeTransition { from_state, via })
            .build()
    }

    /// Construct a blueprint wiring error naming the offending node.
    pub fn graph(kind: ErrorKind, node: impl Into<Cow<'static, str>>, msg: fmt::Arguments<'_>) -> Self {
        CoreError::error()
            .domain(Domain::Graph)
            .kind(kind)
            .msgf(msg)
            .payload(Payload::Node { name: node.into() })
            .build()
    }

    /// Construct a precondition failure raised by a behaviour's `start`.
    pub fn precondition(msg: impl Into<Cow<'static, str>>) -> Self {
        CoreError::warn()
            .domain(Domain::Node)
            .kind(ErrorKind::Precondition)
            .msg(msg)
            .build()
    }

    /// True for errors that must abort the dispatch loop.
    pub fn is_fatal(&self) -> bool {
        self.severity == Severity::Fatal
    }
}

/// Builder returned by the severity entry points. Unset fields stay at
/// `Domain::Other`, `ErrorKind::Other`, an empty message and no payload.
#[derive(Debug, Clone)]
pub struct ErrB {
    domain: Domain,
    kind: ErrorKind,
    severity: Severity,
    message: Cow<'static, str>,
    payload: Payload,
}

impl ErrB {
    #[inline]
    fn new(severity: Severity) -> Self {
        Self {
            domain: Domain::Other,
            kind: ErrorKind::Other,
            severity,
            message: Cow::Borrowed(""),
            payload: Payload::None,
        }
    }

    #[inline]
    pub fn domain(mut self, d: Domain) -> Self {
        self.domain = d;
        self
    }

    #[inline]
    pub fn kind(mut self, k: ErrorKind) -> Self {
        self.kind = k;
        self
    }

    #[inline]
    pub fn msg(mut self, m: impl Into<Cow<'static, str>>) -> Self {
        self.message = m.into();
        self
    }

    #[inline]
    pub fn msgf(mut self, args: fmt::Arguments<'_>) -> Self {
        self.message = Cow::Owned(args.to_string());
        self
    }

    /// Replaces any earlier payload.
    #[inline]
    pub fn payload(mut self, p: Payload) -> Self {
        self.payload = p;
        self
    }

    pub fn build(self) -> CoreError {
        CoreError {
            domain: self.domain,
            kind: self.kind,
            severity: self.severity,
            message: self.message,
            payload: self.payload,
        }
    }
}
