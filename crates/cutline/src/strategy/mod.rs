//! Snapshot capture algorithms.
//!
//! A process feeds every arriving item to exactly one [`SnapshotStrategy`].
//! Strategies are synchronous state machines: they mutate the process's
//! local state through [`StrategyCtx`] and queue control signals in its
//! outbox, which the process then broadcasts on every outgoing channel
//! before handling anything else.

mod color;
mod marker;
mod session;

pub use color::ColorStrategy;
pub use marker::MarkerStrategy;

use cutline_types::{
    AppMessage, Color, ControlSignal, LocalState, ProcessId, SnapshotRecord, StrategyKind,
};

use crate::error::ProtocolViolation;

/// What a strategy did with one event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// The message's effect went to live local state.
    Applied,
    /// The message was recorded as in transit on its channel.
    InTransit,
    /// The event started a session (state captured); any message carried
    /// by the event was applied after the capture.
    Started,
    /// The event closed its channel for the current session.
    ChannelClosed,
    /// Defined no-op, e.g. initiating while already recording.
    Ignored,
}

/// The slice of a process a strategy may touch.
pub struct StrategyCtx<'a> {
    pub process: ProcessId,
    pub local_state: &'a mut LocalState,
    /// Sources of every incoming channel.
    pub incoming: &'a [ProcessId],
    /// Control signals to broadcast on every outgoing channel.
    pub outbox: &'a mut Vec<ControlSignal>,
}

impl StrategyCtx<'_> {
    /// Application-level effect of a delivered message. The only path by
    /// which traffic reaches the live local state.
    pub fn apply_locally(&mut self, source: ProcessId, msg: AppMessage) {
        self.local_state.apply(source, msg.payload);
    }

    pub(crate) fn knows(&self, source: ProcessId) -> bool {
        self.incoming.contains(&source)
    }
}

pub trait SnapshotStrategy: Send {
    fn kind(&self) -> StrategyKind;

    /// Start a session on this process. Idempotent while recording.
    fn initiate(&mut self, ctx: &mut StrategyCtx<'_>) -> Result<Delivery, ProtocolViolation>;

    fn on_application_message(
        &mut self,
        msg: AppMessage,
        source: ProcessId,
        ctx: &mut StrategyCtx<'_>,
    ) -> Result<Delivery, ProtocolViolation>;

    fn on_control_signal(
        &mut self,
        signal: ControlSignal,
        source: ProcessId,
        ctx: &mut StrategyCtx<'_>,
    ) -> Result<Delivery, ProtocolViolation>;

    /// Tag to piggyback on the next application send.
    fn outgoing_color(&self) -> Option<Color>;

    fn is_recording(&self) -> bool;

    /// The latest session has closed every incoming channel.
    fn is_complete(&self) -> bool;

    /// Record of the current session, or of the latest completed one when
    /// idle. Partial until [`SnapshotStrategy::is_complete`] holds.
    fn snapshot_record(&self) -> Option<&SnapshotRecord>;

    fn last_completed(&self) -> Option<&SnapshotRecord>;

    fn completed_sessions(&self) -> u32;

    /// Hand over a record that completed since the last call.
    fn take_completed(&mut self) -> Option<SnapshotRecord>;
}

/// Build the strategy every process of a cluster runs.
pub fn for_kind(kind: StrategyKind, process: ProcessId) -> Box<dyn SnapshotStrategy> {
    match kind {
        StrategyKind::Marker => Box::new(MarkerStrategy::new(process)),
        StrategyKind::Color => Box::new(ColorStrategy::new(process)),
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;

    /// Owns everything a [`StrategyCtx`] borrows.
    pub(crate) struct Harness {
        pub process: ProcessId,
        pub state: LocalState,
        pub incoming: Vec<ProcessId>,
        pub outbox: Vec<ControlSignal>,
    }

    impl Harness {
        pub(crate) fn new(process: u32, seed: &str, incoming: &[u32]) -> Self {
            Self {
                process: ProcessId(process),
                state: LocalState::new(seed),
                incoming: incoming.iter().copied().map(ProcessId).collect(),
                outbox: Vec::new(),
            }
        }

        pub(crate) fn ctx(&mut self) -> StrategyCtx<'_> {
            StrategyCtx {
                process: self.process,
                local_state: &mut self.state,
                incoming: &self.incoming,
                outbox: &mut self.outbox,
            }
        }

        pub(crate) fn drain_outbox(&mut self) -> Vec<ControlSignal> {
            std::mem::take(&mut self.outbox)
        }
    }
}
