//! Lai-Yang colour piggybacking.
//!
//! No control traffic: every application message carries its sender's colour.
//! A white process turns red (captures its state) on initiation or on the
//! first red message it receives. On each incoming channel the first red
//! message is the boundary; white messages that arrive before it, after the
//! local capture, are the channel's in-transit set.

use cutline_types::{
    AppMessage, ChannelStatus, Color, ControlSignal, ProcessId, SnapshotRecord, StrategyKind,
};
use tracing::{debug, info};

use super::session::Session;
use super::{Delivery, SnapshotStrategy, StrategyCtx};
use crate::error::ProtocolViolation;

pub struct ColorStrategy {
    process: ProcessId,
    color: Color,
    /// Present once red; kept after completion so late traffic is still
    /// classified against the closed channels.
    session: Option<Session>,
    completed: bool,
    unreported: Option<SnapshotRecord>,
}

impl ColorStrategy {
    pub fn new(process: ProcessId) -> Self {
        Self {
            process,
            color: Color::White,
            session: None,
            completed: false,
            unreported: None,
        }
    }

    pub fn color(&self) -> Color {
        self.color
    }

    /// Returns `false` when already red.
    fn turn_red(&mut self, initiator: Option<ProcessId>, ctx: &mut StrategyCtx<'_>) -> bool {
        if self.color == Color::Red {
            return false;
        }
        let session = Session::begin(1, initiator, ctx);
        info!(
            process = %self.process,
            state = %session.record().recorded_local_state.render(),
            "turned red, recorded local state"
        );
        self.color = Color::Red;
        self.session = Some(session);
        true
    }

    fn finish_if_final(&mut self) {
        if self.completed {
            return;
        }
        let Some(session) = &self.session else {
            return;
        };
        if !session.is_final() {
            return;
        }
        let record = session.record().clone();
        info!(
            process = %self.process,
            in_transit = record.in_transit_count(),
            "snapshot complete"
        );
        self.completed = true;
        self.unreported = Some(record);
    }
}

impl SnapshotStrategy for ColorStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Color
    }

    fn initiate(&mut self, ctx: &mut StrategyCtx<'_>) -> Result<Delivery, ProtocolViolation> {
        if !self.turn_red(Some(self.process), ctx) {
            debug!(process = %self.process, "already red; initiate ignored");
            return Ok(Delivery::Ignored);
        }
        self.finish_if_final();
        Ok(Delivery::Started)
    }

    fn on_application_message(
        &mut self,
        msg: AppMessage,
        source: ProcessId,
        ctx: &mut StrategyCtx<'_>,
    ) -> Result<Delivery, ProtocolViolation> {
        let Some(tag) = msg.color else {
            return Err(ProtocolViolation::MissingColorTag {
                process: self.process,
                source,
            });
        };
        if !ctx.knows(source) {
            return Err(ProtocolViolation::UnknownChannel {
                process: self.process,
                source,
            });
        }

        if tag == Color::Red && self.color == Color::White {
            self.turn_red(None, ctx);
            if let Some(session) = &mut self.session {
                session.close(source)?;
            }
            debug!(process = %self.process, source = %source, "red boundary closed channel");
            ctx.apply_locally(source, msg);
            self.finish_if_final();
            return Ok(Delivery::Started);
        }

        let Some(session) = &mut self.session else {
            ctx.apply_locally(source, msg);
            return Ok(Delivery::Applied);
        };

        let delivery = match (session.status(source)?, tag) {
            (ChannelStatus::Open, Color::White) => {
                debug!(
                    process = %self.process,
                    source = %source,
                    payload = %msg.payload,
                    "in transit"
                );
                session.buffer(source, msg)?;
                Delivery::InTransit
            }
            (ChannelStatus::Open, Color::Red) => {
                session.close(source)?;
                debug!(process = %self.process, source = %source, "red boundary closed channel");
                ctx.apply_locally(source, msg);
                Delivery::ChannelClosed
            }
            (ChannelStatus::Closed, Color::White) => {
                return Err(ProtocolViolation::WhiteAfterRed {
                    process: self.process,
                    source,
                });
            }
            (ChannelStatus::Closed, Color::Red) => {
                ctx.apply_locally(source, msg);
                Delivery::Applied
            }
        };
        self.finish_if_final();
        Ok(delivery)
    }

    fn on_control_signal(
        &mut self,
        _signal: ControlSignal,
        source: ProcessId,
        _ctx: &mut StrategyCtx<'_>,
    ) -> Result<Delivery, ProtocolViolation> {
        Err(ProtocolViolation::UnexpectedControlSignal {
            process: self.process,
            source,
            strategy: StrategyKind::Color,
        })
    }

    fn outgoing_color(&self) -> Option<Color> {
        Some(self.color)
    }

    fn is_recording(&self) -> bool {
        self.session.is_some() && !self.completed
    }

    fn is_complete(&self) -> bool {
        self.completed
    }

    fn snapshot_record(&self) -> Option<&SnapshotRecord> {
        self.session.as_ref().map(Session::record)
    }

    fn last_completed(&self) -> Option<&SnapshotRecord> {
        if self.completed {
            self.snapshot_record()
        } else {
            None
        }
    }

    fn completed_sessions(&self) -> u32 {
        u32::from(self.completed)
    }

    fn take_completed(&mut self) -> Option<SnapshotRecord> {
        self.unreported.take()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strategy::testing::Harness;

    fn white(from: u32, payload: &str) -> AppMessage {
        AppMessage::colored(ProcessId(from), payload, Color::White)
    }

    fn red(from: u32, payload: &str) -> AppMessage {
        AppMessage::colored(ProcessId(from), payload, Color::Red)
    }

    #[test]
    fn turning_red_captures_state_without_control_traffic() {
        let mut h = Harness::new(1, "init1", &[2, 3]);
        let mut s = ColorStrategy::new(ProcessId(1));
        s.on_application_message(white(3, "C"), ProcessId(3), &mut h.ctx())
            .expect("white apply");
        assert_eq!(s.outgoing_color(), Some(Color::White));

        assert_eq!(s.initiate(&mut h.ctx()), Ok(Delivery::Started));
        assert!(h.drain_outbox().is_empty());
        assert_eq!(s.outgoing_color(), Some(Color::Red));
        assert!(s.is_recording());

        let record = s.snapshot_record().expect("red");
        assert_eq!(record.recorded_local_state.render(), "init1|C");
        assert_eq!(record.channel_recordings.len(), 2);
    }

    #[test]
    fn initiate_twice_is_idempotent() {
        let mut h = Harness::new(1, "init1", &[2]);
        let mut s = ColorStrategy::new(ProcessId(1));
        s.initiate(&mut h.ctx()).expect("first");
        s.on_application_message(white(2, "D"), ProcessId(2), &mut h.ctx())
            .expect("in transit");
        let before = s.snapshot_record().cloned();

        assert_eq!(s.initiate(&mut h.ctx()), Ok(Delivery::Ignored));
        assert_eq!(s.snapshot_record().cloned(), before);
    }

    #[test]
    fn red_message_at_white_process_is_the_boundary() {
        let mut h = Harness::new(2, "init2", &[1, 3]);
        h.state.apply(ProcessId(1), "A".into());
        let mut s = ColorStrategy::new(ProcessId(2));

        assert_eq!(
            s.on_application_message(red(1, "E"), ProcessId(1), &mut h.ctx()),
            Ok(Delivery::Started)
        );
        assert_eq!(s.color(), Color::Red);

        let record = s.snapshot_record().expect("red");
        assert_eq!(record.recorded_local_state.render(), "init2|A");
        assert!(record.initiator.is_none());
        let from1 = record.channel(ProcessId(1)).expect("from P1");
        assert!(from1.is_closed());
        assert!(from1.messages.is_empty());
        // applied to live state, after the capture
        assert_eq!(h.state.render(), "init2|A|E");
    }

    #[test]
    fn white_messages_on_open_channel_are_in_transit_until_red_arrives() {
        let mut h = Harness::new(1, "init1", &[2, 3]);
        let mut s = ColorStrategy::new(ProcessId(1));
        s.initiate(&mut h.ctx()).expect("start");

        assert_eq!(
            s.on_application_message(white(2, "D"), ProcessId(2), &mut h.ctx()),
            Ok(Delivery::InTransit)
        );
        assert_eq!(
            s.on_application_message(red(2, "G"), ProcessId(2), &mut h.ctx()),
            Ok(Delivery::ChannelClosed)
        );
        assert_eq!(
            s.on_application_message(red(2, "H"), ProcessId(2), &mut h.ctx()),
            Ok(Delivery::Applied)
        );
        assert!(!s.is_complete());

        assert_eq!(
            s.on_application_message(red(3, "F"), ProcessId(3), &mut h.ctx()),
            Ok(Delivery::ChannelClosed)
        );
        assert!(s.is_complete());
        assert!(!s.is_recording());

        let record = s.take_completed().expect("reported once");
        assert_eq!(record.recorded_local_state.render(), "init1");
        assert_eq!(
            record.channel(ProcessId(2)).expect("from P2").messages,
            vec![white(2, "D")]
        );
        assert!(record.channel(ProcessId(3)).expect("from P3").messages.is_empty());
        assert_eq!(h.state.render(), "init1|G|H|F");
        assert!(s.take_completed().is_none());
    }

    #[test]
    fn closed_channels_do_not_change_after_completion() {
        let mut h = Harness::new(1, "init1", &[2]);
        let mut s = ColorStrategy::new(ProcessId(1));
        s.initiate(&mut h.ctx()).expect("start");
        s.on_application_message(red(2, "G"), ProcessId(2), &mut h.ctx())
            .expect("close");
        let frozen = s.last_completed().cloned().expect("complete");

        s.on_application_message(red(2, "late"), ProcessId(2), &mut h.ctx())
            .expect("applied");
        assert_eq!(s.last_completed().cloned(), Some(frozen));
        assert_eq!(s.initiate(&mut h.ctx()), Ok(Delivery::Ignored));
        assert_eq!(s.completed_sessions(), 1);
    }

    #[test]
    fn white_after_red_on_same_channel_is_a_violation() {
        let mut h = Harness::new(1, "init1", &[2, 3]);
        let mut s = ColorStrategy::new(ProcessId(1));
        s.initiate(&mut h.ctx()).expect("start");
        s.on_application_message(red(2, "G"), ProcessId(2), &mut h.ctx())
            .expect("close");

        assert_eq!(
            s.on_application_message(white(2, "stale"), ProcessId(2), &mut h.ctx()),
            Err(ProtocolViolation::WhiteAfterRed {
                process: ProcessId(1),
                source: ProcessId(2),
            })
        );
        assert!(!h.state.contains_payload(&"stale".into()));
    }

    #[test]
    fn zero_incoming_channels_complete_on_turning_red() {
        let mut h = Harness::new(4, "solo", &[]);
        let mut s = ColorStrategy::new(ProcessId(4));
        s.initiate(&mut h.ctx()).expect("start");
        assert!(s.is_complete());
        let record = s.take_completed().expect("completed");
        assert!(record.channel_recordings.is_empty());
    }

    #[test]
    fn untagged_messages_and_markers_are_rejected() {
        let mut h = Harness::new(1, "init1", &[2]);
        let mut s = ColorStrategy::new(ProcessId(1));
        assert_eq!(
            s.on_application_message(
                AppMessage::plain(ProcessId(2), "x"),
                ProcessId(2),
                &mut h.ctx()
            ),
            Err(ProtocolViolation::MissingColorTag {
                process: ProcessId(1),
                source: ProcessId(2),
            })
        );
        assert_eq!(
            s.on_control_signal(
                ControlSignal::Marker {
                    initiator: ProcessId(2)
                },
                ProcessId(2),
                &mut h.ctx()
            ),
            Err(ProtocolViolation::UnexpectedControlSignal {
                process: ProcessId(1),
                source: ProcessId(2),
                strategy: StrategyKind::Color,
            })
        );
        assert_eq!(s.color(), Color::White);
    }
}
