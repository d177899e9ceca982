//! Consistent global snapshots over FIFO channels.
//!
//! Processes are tokio tasks connected by bounded, directed, FIFO channels.
//! Each process hosts one [`SnapshotStrategy`]: [`MarkerStrategy`]
//! (Chandy-Lamport) or [`ColorStrategy`] (Lai-Yang). A driver starts a session
//! on one process through its [`ProcessHandle`]; every process detects its own
//! completion, and the [`Reporter`] assembles and checks the global result.

pub mod channel;
pub mod cluster;
pub mod config;
pub mod error;
pub mod process;
pub mod report;
pub mod strategy;

pub use cutline_types as types;

pub use channel::{ChannelReceiver, ChannelSender, ChannelStats, IncomingSet, channel};
pub use cluster::{Cluster, ClusterBuilder};
pub use config::CutlineConfig;
pub use error::{ChannelError, ConfigError, ProcessError, ProtocolViolation};
pub use process::{Process, ProcessHandle};
pub use report::{GlobalSnapshot, Inconsistency, Reporter, SessionOutcome};
pub use strategy::{ColorStrategy, Delivery, MarkerStrategy, SnapshotStrategy, StrategyCtx};
