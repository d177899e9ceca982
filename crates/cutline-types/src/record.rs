use facet::Facet;

use crate::{AppMessage, ChannelStatus, Color, LocalState, ProcessId};

/// In-transit recording for one incoming channel.
#[derive(Facet, Clone, Debug, PartialEq, Eq)]
pub struct ChannelRecording {
    pub source: ProcessId,
    pub status: ChannelStatus,
    /// Messages judged in transit at cut time, in arrival order.
    pub messages: Vec<AppMessage>,
}

impl ChannelRecording {
    pub fn open(source: ProcessId) -> Self {
        Self {
            source,
            status: ChannelStatus::Open,
            messages: Vec::new(),
        }
    }

    pub fn is_closed(&self) -> bool {
        self.status == ChannelStatus::Closed
    }
}

/// What one process contributes to a global snapshot.
#[derive(Facet, Clone, Debug, PartialEq, Eq)]
pub struct SnapshotRecord {
    pub process: ProcessId,
    /// 1-based ordinal of the session on this process.
    pub session: u32,
    /// Process whose initiation started this session, when known.
    pub initiator: Option<ProcessId>,
    pub recorded_local_state: LocalState,
    /// One entry per incoming channel, sorted by source.
    pub channel_recordings: Vec<ChannelRecording>,
}

impl SnapshotRecord {
    pub fn new(
        process: ProcessId,
        session: u32,
        initiator: Option<ProcessId>,
        recorded_local_state: LocalState,
        incoming: &[ProcessId],
    ) -> Self {
        let mut sources = incoming.to_vec();
        sources.sort();
        sources.dedup();
        Self {
            process,
            session,
            initiator,
            recorded_local_state,
            channel_recordings: sources.into_iter().map(ChannelRecording::open).collect(),
        }
    }

    pub fn channel(&self, source: ProcessId) -> Option<&ChannelRecording> {
        self.channel_recordings
            .iter()
            .find(|recording| recording.source == source)
    }

    pub fn channel_mut(&mut self, source: ProcessId) -> Option<&mut ChannelRecording> {
        self.channel_recordings
            .iter_mut()
            .find(|recording| recording.source == source)
    }

    /// Every incoming channel is closed; the record is final.
    pub fn is_final(&self) -> bool {
        self.channel_recordings.iter().all(ChannelRecording::is_closed)
    }

    pub fn in_transit_count(&self) -> usize {
        self.channel_recordings
            .iter()
            .map(|recording| recording.messages.len())
            .sum()
    }
}

/// Coarse view of a process published to drivers and reporters.
#[derive(Facet, Clone, Debug, PartialEq, Eq, Default)]
pub struct ProcessStatus {
    pub process: ProcessId,
    pub recording: bool,
    pub completed_sessions: u32,
    /// Current colour under the colour strategy.
    pub color: Option<Color>,
    pub violations: u32,
}
