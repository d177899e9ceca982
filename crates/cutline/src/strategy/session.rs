use cutline_types::{AppMessage, ChannelStatus, ProcessId, SnapshotRecord};

use super::StrategyCtx;
use crate::error::ProtocolViolation;

/// Per-session recording shared by both strategies: the captured state and
/// one open/closed buffer per incoming channel.
#[derive(Debug, Clone)]
pub(crate) struct Session {
    record: SnapshotRecord,
}

impl Session {
    /// Capture the live state and open every incoming channel.
    pub(crate) fn begin(ordinal: u32, initiator: Option<ProcessId>, ctx: &StrategyCtx<'_>) -> Self {
        Self {
            record: SnapshotRecord::new(
                ctx.process,
                ordinal,
                initiator,
                ctx.local_state.clone(),
                ctx.incoming,
            ),
        }
    }

    pub(crate) fn status(&self, source: ProcessId) -> Result<ChannelStatus, ProtocolViolation> {
        self.record
            .channel(source)
            .map(|recording| recording.status)
            .ok_or(ProtocolViolation::UnknownChannel {
                process: self.record.process,
                source,
            })
    }

    /// Only called while `source` is open.
    pub(crate) fn buffer(
        &mut self,
        source: ProcessId,
        msg: AppMessage,
    ) -> Result<(), ProtocolViolation> {
        let process = self.record.process;
        let recording = self
            .record
            .channel_mut(source)
            .ok_or(ProtocolViolation::UnknownChannel { process, source })?;
        debug_assert_eq!(recording.status, ChannelStatus::Open);
        recording.messages.push(msg);
        Ok(())
    }

    /// Returns `false` when the channel was already closed.
    pub(crate) fn close(&mut self, source: ProcessId) -> Result<bool, ProtocolViolation> {
        let process = self.record.process;
        let recording = self
            .record
            .channel_mut(source)
            .ok_or(ProtocolViolation::UnknownChannel { process, source })?;
        if recording.is_closed() {
            return Ok(false);
        }
        recording.status = ChannelStatus::Closed;
        Ok(true)
    }

    pub(crate) fn is_final(&self) -> bool {
        self.record.is_final()
    }

    pub(crate) fn record(&self) -> &SnapshotRecord {
        &self.record
    }
}
