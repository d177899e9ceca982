//! Gathering and checking global snapshots.
//!
//! The reporter is the only place that looks at several processes at once,
//! and it only ever does so after each of them reported completion. A
//! session that does not complete within the timeout is reported as
//! incomplete rather than read partially.

use std::fmt;
use std::time::Duration;

use cutline_types::{ProcessId, SnapshotRecord, StrategyKind};
use facet::Facet;
use tokio::time::{Instant, timeout_at};
use tracing::{info, warn};

use crate::cluster::Cluster;
use crate::config::CutlineConfig;
use crate::error::ProcessError;

/// Final records of every process for one session.
#[derive(Facet, Clone, Debug, PartialEq, Eq)]
pub struct GlobalSnapshot {
    pub strategy: StrategyKind,
    pub session: u32,
    /// Sorted by process id.
    pub records: Vec<SnapshotRecord>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inconsistency {
    NotFinal {
        process: ProcessId,
    },
    /// Messages sent before the sender's cut do not match what the
    /// receiver recorded as delivered plus in transit.
    Unbalanced {
        from: ProcessId,
        to: ProcessId,
        sent: u64,
        delivered: u64,
        in_transit: u64,
    },
}

impl fmt::Display for Inconsistency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFinal { process } => write!(f, "{process}: record has open channels"),
            Self::Unbalanced {
                from,
                to,
                sent,
                delivered,
                in_transit,
            } => write!(
                f,
                "{from}->{to}: {sent} sent before cut, \
                 {delivered} delivered + {in_transit} in transit"
            ),
        }
    }
}

impl GlobalSnapshot {
    pub fn record(&self, process: impl Into<ProcessId>) -> Option<&SnapshotRecord> {
        let process = process.into();
        self.records.iter().find(|record| record.process == process)
    }

    /// Check the cut against every channel `i -> j` that `j` recorded.
    ///
    /// Channels are FIFO, so what `j` applied from `i` is a prefix of what `i`
    /// sent and the in-transit buffer is the run of sends right after it.
    /// Counting is therefore enough: a post-cut message leaking into a
    /// recorded state, or a pre-cut one going missing, breaks the balance.
    pub fn check_consistency(&self) -> Result<(), Vec<Inconsistency>> {
        let mut problems = Vec::new();
        for receiver in &self.records {
            if !receiver.is_final() {
                problems.push(Inconsistency::NotFinal {
                    process: receiver.process,
                });
            }
            for channel in &receiver.channel_recordings {
                let Some(sender) = self.record(channel.source) else {
                    continue;
                };
                let sent = sender.recorded_local_state.sent_to(receiver.process);
                let delivered = receiver
                    .recorded_local_state
                    .applied_from(channel.source)
                    .count() as u64;
                let in_transit = channel.messages.len() as u64;
                if sent != delivered + in_transit {
                    problems.push(Inconsistency::Unbalanced {
                        from: channel.source,
                        to: receiver.process,
                        sent,
                        delivered,
                        in_transit,
                    });
                }
            }
        }
        if problems.is_empty() {
            Ok(())
        } else {
            Err(problems)
        }
    }

    pub fn to_json(&self) -> Result<String, String> {
        facet_json::to_string(self).map_err(|e| format!("encode snapshot: {e}"))
    }

    /// One line per process: recorded state and non-empty channel states.
    pub fn summary(&self) -> Vec<String> {
        self.records
            .iter()
            .map(|record| {
                let channels: Vec<String> = record
                    .channel_recordings
                    .iter()
                    .map(|channel| {
                        let payloads: Vec<&str> =
                            channel.messages.iter().map(|m| m.payload.as_str()).collect();
                        format!("{}:[{}]", channel.source, payloads.join(","))
                    })
                    .collect();
                format!(
                    "{} state '{}', channels {{{}}}",
                    record.process,
                    record.recorded_local_state.render(),
                    channels.join(" ")
                )
            })
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionOutcome {
    Complete(GlobalSnapshot),
    /// The timeout elapsed before every process completed; typically a
    /// topology in which some channel never closes.
    Incomplete {
        completed: Vec<SnapshotRecord>,
        pending: Vec<ProcessId>,
    },
}

impl SessionOutcome {
    pub fn is_complete(&self) -> bool {
        matches!(self, Self::Complete(_))
    }

    pub fn snapshot(&self) -> Option<&GlobalSnapshot> {
        match self {
            Self::Complete(snapshot) => Some(snapshot),
            Self::Incomplete { .. } => None,
        }
    }
}

pub struct Reporter {
    timeout: Duration,
}

impl Reporter {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    pub fn from_config(config: &CutlineConfig) -> Self {
        Self::new(config.report_timeout)
    }

    /// Wait for the first session on every process.
    pub async fn collect(&self, cluster: &Cluster) -> Result<SessionOutcome, ProcessError> {
        self.collect_session(cluster, 1).await
    }

    /// Wait until every process completed session `session` (1-based) or
    /// the timeout elapses, whichever comes first.
    pub async fn collect_session(
        &self,
        cluster: &Cluster,
        session: u32,
    ) -> Result<SessionOutcome, ProcessError> {
        let deadline = Instant::now() + self.timeout;
        let mut completed = Vec::new();
        let mut pending = Vec::new();

        for handle in cluster.handles() {
            let waited = timeout_at(
                deadline,
                handle.wait_until(|status| status.completed_sessions >= session),
            )
            .await;
            match waited {
                Ok(status) => {
                    status?;
                    let record = handle
                        .completed_records()
                        .await?
                        .into_iter()
                        .find(|record| record.session == session);
                    match record {
                        Some(record) => completed.push(record),
                        None => pending.push(handle.id()),
                    }
                }
                Err(_) => pending.push(handle.id()),
            }
        }

        if pending.is_empty() {
            completed.sort_by_key(|record| record.process);
            info!(session, processes = completed.len(), "global snapshot complete");
            Ok(SessionOutcome::Complete(GlobalSnapshot {
                strategy: cluster.strategy(),
                session,
                records: completed,
            }))
        } else {
            let ids: Vec<String> = pending.iter().map(ToString::to_string).collect();
            warn!(
                session,
                pending = %ids.join(", "),
                timeout_ms = self.timeout.as_millis() as u64,
                "snapshot did not complete"
            );
            Ok(SessionOutcome::Incomplete { completed, pending })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cutline_types::{AppMessage, ChannelStatus, LocalState, Payload};

    fn state(seed: &str, applied: &[(u32, &str)], sent: &[u32]) -> LocalState {
        let mut state = LocalState::new(seed);
        for (from, payload) in applied {
            state.apply(ProcessId(*from), Payload::from(*payload));
        }
        for to in sent {
            state.note_sent(ProcessId(*to));
        }
        state
    }

    fn closed(record: &mut SnapshotRecord) {
        for channel in &mut record.channel_recordings {
            channel.status = ChannelStatus::Closed;
        }
    }

    fn two_process_snapshot(p2_applied: &[(u32, &str)], in_transit: &[&str]) -> GlobalSnapshot {
        let mut p1 = SnapshotRecord::new(
            ProcessId(1),
            1,
            Some(ProcessId(1)),
            state("init1", &[], &[2, 2]),
            &[ProcessId(2)],
        );
        closed(&mut p1);
        let mut p2 = SnapshotRecord::new(
            ProcessId(2),
            1,
            Some(ProcessId(1)),
            state("init2", p2_applied, &[]),
            &[ProcessId(1)],
        );
        closed(&mut p2);
        if let Some(channel) = p2.channel_mut(ProcessId(1)) {
            channel.messages = in_transit
                .iter()
                .map(|p| AppMessage::plain(ProcessId(1), *p))
                .collect();
        }
        GlobalSnapshot {
            strategy: StrategyKind::Marker,
            session: 1,
            records: vec![p1, p2],
        }
    }

    #[test]
    fn delivered_plus_in_transit_balances_sent() {
        let snapshot = two_process_snapshot(&[(1, "A")], &["B"]);
        assert_eq!(snapshot.check_consistency(), Ok(()));
        assert_eq!(
            snapshot.summary()[1],
            "P2 state 'init2|A', channels {P1:[B]}"
        );
    }

    #[test]
    fn lost_message_is_reported() {
        let snapshot = two_process_snapshot(&[(1, "A")], &[]);
        let problems = snapshot.check_consistency().expect_err("B is missing");
        assert_eq!(
            problems,
            vec![Inconsistency::Unbalanced {
                from: ProcessId(1),
                to: ProcessId(2),
                sent: 2,
                delivered: 1,
                in_transit: 0,
            }]
        );
    }

    #[test]
    fn repeated_payload_split_across_state_and_transit_is_consistent() {
        // P1 sent "x" twice: the first was applied before P2's cut, the
        // second is still on the channel.
        let snapshot = two_process_snapshot(&[(1, "x")], &["x"]);
        assert_eq!(snapshot.check_consistency(), Ok(()));
    }

    #[test]
    fn post_cut_message_in_recorded_state_is_reported() {
        let snapshot = two_process_snapshot(&[(1, "A"), (1, "B"), (1, "late")], &[]);
        let problems = snapshot.check_consistency().expect_err("late leaked");
        assert_eq!(
            problems,
            vec![Inconsistency::Unbalanced {
                from: ProcessId(1),
                to: ProcessId(2),
                sent: 2,
                delivered: 3,
                in_transit: 0,
            }]
        );
    }

    #[test]
    fn open_channels_are_not_final() {
        let mut snapshot = two_process_snapshot(&[(1, "A")], &["B"]);
        snapshot.records[0].channel_recordings[0].status = ChannelStatus::Open;
        let problems = snapshot.check_consistency().expect_err("P1 still open");
        assert_eq!(
            problems,
            vec![Inconsistency::NotFinal {
                process: ProcessId(1)
            }]
        );
    }
}
