//! Chandy-Lamport marker propagation.
//!
//! On entering a session a process captures its state and sends a marker on
//! every outgoing channel. Because channels are FIFO, a marker arriving on a
//! channel flushes everything its sender emitted before its own cut: messages
//! that arrive on a channel between the local capture and that channel's
//! marker are exactly the channel's in-transit set.

use cutline_types::{
    AppMessage, ChannelStatus, Color, ControlSignal, ProcessId, SnapshotRecord, StrategyKind,
};
use tracing::{debug, info};

use super::session::Session;
use super::{Delivery, SnapshotStrategy, StrategyCtx};
use crate::error::ProtocolViolation;

enum Phase {
    Idle,
    Recording(Session),
}

pub struct MarkerStrategy {
    process: ProcessId,
    phase: Phase,
    sessions_started: u32,
    last_completed: Option<SnapshotRecord>,
    unreported: Option<SnapshotRecord>,
}

impl MarkerStrategy {
    pub fn new(process: ProcessId) -> Self {
        Self {
            process,
            phase: Phase::Idle,
            sessions_started: 0,
            last_completed: None,
            unreported: None,
        }
    }

    fn start(&mut self, initiator: ProcessId, ctx: &mut StrategyCtx<'_>) {
        self.sessions_started += 1;
        let session = Session::begin(self.sessions_started, Some(initiator), ctx);
        info!(
            process = %self.process,
            session = self.sessions_started,
            initiator = %initiator,
            state = %session.record().recorded_local_state.render(),
            "recorded local state"
        );
        self.phase = Phase::Recording(session);
        ctx.outbox.push(ControlSignal::Marker { initiator });
        debug!(process = %self.process, "queued marker for every outgoing channel");
    }

    fn finish_if_final(&mut self) {
        let Phase::Recording(session) = &self.phase else {
            return;
        };
        if !session.is_final() {
            return;
        }
        let record = session.record().clone();
        info!(
            process = %self.process,
            session = record.session,
            in_transit = record.in_transit_count(),
            "snapshot complete"
        );
        self.phase = Phase::Idle;
        self.unreported = Some(record.clone());
        self.last_completed = Some(record);
    }
}

impl SnapshotStrategy for MarkerStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Marker
    }

    fn initiate(&mut self, ctx: &mut StrategyCtx<'_>) -> Result<Delivery, ProtocolViolation> {
        if let Phase::Recording(_) = self.phase {
            debug!(process = %self.process, "already recording; initiate ignored");
            return Ok(Delivery::Ignored);
        }
        self.start(self.process, ctx);
        self.finish_if_final();
        Ok(Delivery::Started)
    }

    fn on_application_message(
        &mut self,
        msg: AppMessage,
        source: ProcessId,
        ctx: &mut StrategyCtx<'_>,
    ) -> Result<Delivery, ProtocolViolation> {
        if msg.color.is_some() {
            return Err(ProtocolViolation::UnexpectedColorTag {
                process: self.process,
                source,
            });
        }
        let session = match &mut self.phase {
            Phase::Idle => {
                if !ctx.knows(source) {
                    return Err(ProtocolViolation::UnknownChannel {
                        process: self.process,
                        source,
                    });
                }
                ctx.apply_locally(source, msg);
                return Ok(Delivery::Applied);
            }
            Phase::Recording(session) => session,
        };
        match session.status(source)? {
            ChannelStatus::Open => {
                debug!(
                    process = %self.process,
                    source = %source,
                    payload = %msg.payload,
                    "in transit"
                );
                session.buffer(source, msg)?;
                Ok(Delivery::InTransit)
            }
            ChannelStatus::Closed => {
                ctx.apply_locally(source, msg);
                Ok(Delivery::Applied)
            }
        }
    }

    fn on_control_signal(
        &mut self,
        signal: ControlSignal,
        source: ProcessId,
        ctx: &mut StrategyCtx<'_>,
    ) -> Result<Delivery, ProtocolViolation> {
        let ControlSignal::Marker { initiator } = signal;
        if !ctx.knows(source) {
            return Err(ProtocolViolation::UnknownChannel {
                process: self.process,
                source,
            });
        }

        let delivery = match &mut self.phase {
            Phase::Idle => {
                self.start(initiator, ctx);
                if let Phase::Recording(session) = &mut self.phase {
                    session.close(source)?;
                }
                Delivery::Started
            }
            Phase::Recording(session) => {
                if !session.close(source)? {
                    return Err(ProtocolViolation::DuplicateMarker {
                        process: self.process,
                        source,
                    });
                }
                Delivery::ChannelClosed
            }
        };
        debug!(process = %self.process, source = %source, "channel closed by marker");
        self.finish_if_final();
        Ok(delivery)
    }

    fn outgoing_color(&self) -> Option<Color> {
        None
    }

    fn is_recording(&self) -> bool {
        matches!(self.phase, Phase::Recording(_))
    }

    fn is_complete(&self) -> bool {
        matches!(self.phase, Phase::Idle) && self.last_completed.is_some()
    }

    fn snapshot_record(&self) -> Option<&SnapshotRecord> {
        match &self.phase {
            Phase::Recording(session) => Some(session.record()),
            Phase::Idle => self.last_completed.as_ref(),
        }
    }

    fn last_completed(&self) -> Option<&SnapshotRecord> {
        self.last_completed.as_ref()
    }

    fn completed_sessions(&self) -> u32 {
        self.last_completed.as_ref().map(|r| r.session).unwrap_or(0)
    }

    fn take_completed(&mut self) -> Option<SnapshotRecord> {
        self.unreported.take()
    }
}
