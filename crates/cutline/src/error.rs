use std::fmt;

use cutline_types::{ProcessId, StrategyKind};

/// Traffic that cannot happen on a reliable FIFO channel under a single
/// strategy. Fatal to the session, never to the process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProtocolViolation {
    /// A marker arrived on a channel that was already closed this session.
    DuplicateMarker { process: ProcessId, source: ProcessId },
    /// A white message arrived behind a red one on the same channel.
    WhiteAfterRed { process: ProcessId, source: ProcessId },
    /// The colour strategy received an untagged application message.
    MissingColorTag { process: ProcessId, source: ProcessId },
    /// The marker strategy received a colour-tagged application message.
    UnexpectedColorTag { process: ProcessId, source: ProcessId },
    /// A control signal reached a strategy that never sends any.
    UnexpectedControlSignal {
        process: ProcessId,
        source: ProcessId,
        strategy: StrategyKind,
    },
    /// Traffic from a source that is not an incoming channel of this process.
    UnknownChannel { process: ProcessId, source: ProcessId },
}

impl fmt::Display for ProtocolViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DuplicateMarker { process, source } => {
                write!(f, "{process}: marker from {source} on an already closed channel")
            }
            Self::WhiteAfterRed { process, source } => write!(
                f,
                "{process}: white message from {source} after the channel turned red"
            ),
            Self::MissingColorTag { process, source } => {
                write!(f, "{process}: untagged message from {source} under colour strategy")
            }
            Self::UnexpectedColorTag { process, source } => {
                write!(f, "{process}: colour-tagged message from {source} under marker strategy")
            }
            Self::UnexpectedControlSignal {
                process,
                source,
                strategy,
            } => write!(
                f,
                "{process}: control signal from {source} under {strategy} strategy"
            ),
            Self::UnknownChannel { process, source } => {
                write!(f, "{process}: no incoming channel from {source}")
            }
        }
    }
}

impl std::error::Error for ProtocolViolation {}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelError {
    /// The receiving end is gone.
    Closed { name: String },
}

impl fmt::Display for ChannelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Closed { name } => write!(f, "channel {name} is closed"),
        }
    }
}

impl std::error::Error for ChannelError {}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessError {
    UnknownPeer { process: ProcessId, peer: ProcessId },
    Channel(ChannelError),
    Protocol(ProtocolViolation),
    /// The process task has stopped and no longer accepts commands.
    Stopped { process: ProcessId },
}

impl fmt::Display for ProcessError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownPeer { process, peer } => {
                write!(f, "{process} has no outgoing channel to {peer}")
            }
            Self::Channel(err) => write!(f, "{err}"),
            Self::Protocol(err) => write!(f, "protocol violation: {err}"),
            Self::Stopped { process } => write!(f, "{process} has stopped"),
        }
    }
}

impl std::error::Error for ProcessError {}

impl From<ProtocolViolation> for ProcessError {
    fn from(value: ProtocolViolation) -> Self {
        Self::Protocol(value)
    }
}

impl From<ChannelError> for ProcessError {
    fn from(value: ChannelError) -> Self {
        Self::Channel(value)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    Empty,
    DuplicateProcess(ProcessId),
    UnknownProcess(ProcessId),
    SelfLink(ProcessId),
    DuplicateLink { from: ProcessId, to: ProcessId },
    /// Some process cannot reach, or be reached from, the others.
    NotStronglyConnected { unreachable: Vec<ProcessId> },
    ZeroCapacity,
    InvalidEnv { key: String, value: String, reason: String },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => f.write_str("cluster has no processes"),
            Self::DuplicateProcess(id) => write!(f, "process {id} declared twice"),
            Self::UnknownProcess(id) => write!(f, "link refers to undeclared process {id}"),
            Self::SelfLink(id) => write!(f, "process {id} cannot link to itself"),
            Self::DuplicateLink { from, to } => write!(f, "link {from} -> {to} declared twice"),
            Self::NotStronglyConnected { unreachable } => {
                let ids: Vec<String> = unreachable.iter().map(ToString::to_string).collect();
                write!(f, "topology is not strongly connected (unreachable: {})", ids.join(", "))
            }
            Self::ZeroCapacity => f.write_str("channel capacity must be at least 1"),
            Self::InvalidEnv { key, value, reason } => {
                write!(f, "invalid {key}={value:?}: {reason}")
            }
        }
    }
}

impl std::error::Error for ConfigError {}
