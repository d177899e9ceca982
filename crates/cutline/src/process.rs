//! Process actors.
//!
//! A [`Process`] runs as its own tokio task and owns its local state, its
//! strategy and the records it produced. It waits on the union of its
//! command queue and every incoming channel; it never looks at another
//! process except through channel traffic.
//!
//! Outgoing traffic goes through one [`Outbound`] queue per peer, drained by
//! a writer task. The actor itself never waits for channel capacity, so two
//! processes sending to each other over full channels keep draining their
//! incoming side.

use std::collections::BTreeMap;

use cutline_types::{
    AppMessage, ControlSignal, Envelope, LocalState, Payload, ProcessId, ProcessStatus,
    SnapshotRecord,
};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{Instrument, debug, error, info, info_span, warn};

use crate::channel::{ChannelReceiver, ChannelSender, ChannelStats, IncomingSet};
use crate::error::{ChannelError, ProcessError, ProtocolViolation};
use crate::strategy::{Delivery, SnapshotStrategy, StrategyCtx};

const COMMAND_QUEUE: usize = 64;

type Delivered = oneshot::Sender<Result<(), ProcessError>>;

pub(crate) enum Command {
    Send {
        to: ProcessId,
        payload: Payload,
        reply: Delivered,
    },
    Initiate {
        reply: oneshot::Sender<Result<Delivery, ProcessError>>,
    },
    SnapshotRecord {
        reply: oneshot::Sender<Option<SnapshotRecord>>,
    },
    CompletedRecords {
        reply: oneshot::Sender<Vec<SnapshotRecord>>,
    },
    LocalState {
        reply: oneshot::Sender<LocalState>,
    },
    ChannelStats {
        reply: oneshot::Sender<Vec<ChannelStats>>,
    },
    Shutdown,
}

// ── Outbound ────────────────────────────────────────────────────

struct Queued {
    envelope: Envelope,
    /// Answered once the envelope is on the channel.
    delivered: Option<Delivered>,
}

/// Unbounded queue in front of one outgoing channel. Order is preserved: a
/// single writer task moves items onto the channel as capacity frees up.
struct Outbound {
    channel: ChannelSender,
    queue: mpsc::UnboundedSender<Queued>,
}

impl Outbound {
    fn spawn(channel: ChannelSender) -> Self {
        let (queue, pending) = mpsc::unbounded_channel();
        let span = info_span!("outbound", channel = channel.name());
        tokio::spawn(write_channel(channel.clone(), pending).instrument(span));
        Self { channel, queue }
    }

    fn push(&self, envelope: Envelope, delivered: Option<Delivered>) -> Result<(), ChannelError> {
        let queued = Queued {
            envelope,
            delivered,
        };
        if let Err(mpsc::error::SendError(queued)) = self.queue.send(queued) {
            let err = ChannelError::Closed {
                name: self.channel.name().to_owned(),
            };
            if let Some(delivered) = queued.delivered {
                let _ = delivered.send(Err(err.clone().into()));
            }
            return Err(err);
        }
        Ok(())
    }

    fn stats(&self) -> ChannelStats {
        self.channel.stats()
    }
}

async fn write_channel(channel: ChannelSender, mut pending: mpsc::UnboundedReceiver<Queued>) {
    while let Some(Queued {
        envelope,
        delivered,
    }) = pending.recv().await
    {
        let result = channel.send(envelope).await;
        match delivered {
            Some(delivered) => {
                let _ = delivered.send(result.map_err(ProcessError::from));
            }
            None => {
                if let Err(err) = result {
                    warn!(error = %err, "control signal not delivered");
                }
            }
        }
    }
    debug!("outbound queue closed");
}

// ── Process ─────────────────────────────────────────────────────

pub struct Process {
    id: ProcessId,
    local_state: LocalState,
    incoming: IncomingSet,
    incoming_ids: Vec<ProcessId>,
    outgoing: BTreeMap<ProcessId, Outbound>,
    strategy: Box<dyn SnapshotStrategy>,
    outbox: Vec<ControlSignal>,
    completed: Vec<SnapshotRecord>,
    violations: u32,
    status: watch::Sender<ProcessStatus>,
}

impl Process {
    /// Starts one writer task per outgoing channel, so this must run inside a
    /// tokio runtime.
    pub fn new(
        id: ProcessId,
        seed: impl Into<String>,
        strategy: Box<dyn SnapshotStrategy>,
        incoming: Vec<ChannelReceiver>,
        outgoing: Vec<ChannelSender>,
    ) -> Self {
        let incoming = IncomingSet::new(incoming);
        let incoming_ids = incoming.sources();
        let outgoing = outgoing
            .into_iter()
            .map(|tx| (tx.to(), Outbound::spawn(tx)))
            .collect();
        let (status, _) = watch::channel(ProcessStatus {
            process: id,
            recording: false,
            completed_sessions: 0,
            color: strategy.outgoing_color(),
            violations: 0,
        });
        Self {
            id,
            local_state: LocalState::new(seed),
            incoming,
            incoming_ids,
            outgoing,
            strategy,
            outbox: Vec::new(),
            completed: Vec::new(),
            violations: 0,
            status,
        }
    }

    pub fn id(&self) -> ProcessId {
        self.id
    }

    pub fn local_state(&self) -> &LocalState {
        &self.local_state
    }

    pub fn strategy(&self) -> &dyn SnapshotStrategy {
        self.strategy.as_ref()
    }

    /// Route one arriving item to the strategy, then queue any control
    /// signals it emitted ahead of later sends.
    pub fn dispatch(
        &mut self,
        envelope: Envelope,
        source: ProcessId,
    ) -> Result<Delivery, ProcessError> {
        let mut ctx = StrategyCtx {
            process: self.id,
            local_state: &mut self.local_state,
            incoming: &self.incoming_ids,
            outbox: &mut self.outbox,
        };
        let result = match envelope {
            Envelope::Application(msg) => {
                self.strategy.on_application_message(msg, source, &mut ctx)
            }
            Envelope::Control(signal) => self.strategy.on_control_signal(signal, source, &mut ctx),
        };
        let delivery = self.settle(result)?;
        self.flush_outbox()?;
        Ok(delivery)
    }

    pub fn initiate_snapshot(&mut self) -> Result<Delivery, ProcessError> {
        let mut ctx = StrategyCtx {
            process: self.id,
            local_state: &mut self.local_state,
            incoming: &self.incoming_ids,
            outbox: &mut self.outbox,
        };
        let result = self.strategy.initiate(&mut ctx);
        let delivery = self.settle(result)?;
        self.flush_outbox()?;
        Ok(delivery)
    }

    /// Send an application message, tagged the way the strategy requires.
    /// Resolves once the message is on the channel to `to`.
    pub async fn send(&mut self, to: ProcessId, payload: Payload) -> Result<(), ProcessError> {
        let (delivered, on_channel) = oneshot::channel();
        self.queue_send(to, payload, delivered);
        on_channel
            .await
            .map_err(|_| ProcessError::Stopped { process: self.id })?
    }

    /// Tag, count and queue a send. The outcome, including an unknown peer,
    /// is reported through `delivered`.
    fn queue_send(&mut self, to: ProcessId, payload: Payload, delivered: Delivered) {
        let Some(outbound) = self.outgoing.get(&to) else {
            let _ = delivered.send(Err(ProcessError::UnknownPeer {
                process: self.id,
                peer: to,
            }));
            return;
        };
        let msg = AppMessage {
            from: self.id,
            payload,
            color: self.strategy.outgoing_color(),
        };
        debug!(to = %to, payload = %msg.payload, color = ?msg.color, "send");
        // counted at queue time: the queue and the channel form one FIFO
        if outbound.push(msg.into(), Some(delivered)).is_ok() {
            self.local_state.note_sent(to);
        }
    }

    pub fn spawn(self) -> (ProcessHandle, JoinHandle<()>) {
        let (commands_tx, commands_rx) = mpsc::channel(COMMAND_QUEUE);
        let handle = ProcessHandle {
            id: self.id,
            commands: commands_tx,
            status: self.status.subscribe(),
        };
        let span = info_span!("process", id = %self.id);
        let task = tokio::spawn(self.run(commands_rx).instrument(span));
        (handle, task)
    }

    async fn run(mut self, mut commands: mpsc::Receiver<Command>) {
        let mut incoming_open = !self.incoming.is_empty();
        loop {
            tokio::select! {
                command = commands.recv() => match command {
                    None | Some(Command::Shutdown) => break,
                    Some(command) => self.handle_command(command),
                },
                item = self.incoming.next(), if incoming_open => match item {
                    Some((source, envelope)) => {
                        if let Err(err) = self.dispatch(envelope, source) {
                            self.report_error(&err);
                        }
                    }
                    None => {
                        debug!("every incoming channel is closed");
                        incoming_open = false;
                    }
                },
            }
            self.publish_status();
        }
        debug!("process stopped");
    }

    fn handle_command(&mut self, command: Command) {
        match command {
            Command::Send { to, payload, reply } => self.queue_send(to, payload, reply),
            Command::Initiate { reply } => {
                info!("snapshot initiation requested");
                let result = self.initiate_snapshot();
                if let Err(err) = &result {
                    self.report_error(err);
                }
                let _ = reply.send(result);
            }
            Command::SnapshotRecord { reply } => {
                let _ = reply.send(self.strategy.snapshot_record().cloned());
            }
            Command::CompletedRecords { reply } => {
                let _ = reply.send(self.completed.clone());
            }
            Command::LocalState { reply } => {
                let _ = reply.send(self.local_state.clone());
            }
            Command::ChannelStats { reply } => {
                let mut stats = self.incoming.stats();
                stats.extend(self.outgoing.values().map(Outbound::stats));
                let _ = reply.send(stats);
            }
            Command::Shutdown => {}
        }
    }

    fn settle(
        &mut self,
        result: Result<Delivery, ProtocolViolation>,
    ) -> Result<Delivery, ProcessError> {
        if let Some(record) = self.strategy.take_completed() {
            info!(
                session = record.session,
                state = %record.recorded_local_state.render(),
                in_transit = record.in_transit_count(),
                "reporting completed snapshot"
            );
            self.completed.push(record);
        }
        Ok(result?)
    }

    fn flush_outbox(&mut self) -> Result<(), ProcessError> {
        let signals = std::mem::take(&mut self.outbox);
        let mut first_err = None;
        for signal in signals {
            for outbound in self.outgoing.values() {
                if let Err(err) = outbound.push(signal.clone().into(), None) {
                    first_err.get_or_insert(err);
                }
            }
            debug!(signal = ?signal, outgoing = self.outgoing.len(), "broadcast control signal");
        }
        match first_err {
            Some(err) => Err(err.into()),
            None => Ok(()),
        }
    }

    fn report_error(&mut self, err: &ProcessError) {
        match err {
            ProcessError::Protocol(violation) => {
                self.violations += 1;
                error!(%violation, "protocol violation; session result is unreliable");
            }
            other => warn!(error = %other, "delivery failed"),
        }
    }

    fn publish_status(&self) {
        let next = ProcessStatus {
            process: self.id,
            recording: self.strategy.is_recording(),
            completed_sessions: self.strategy.completed_sessions(),
            color: self.strategy.outgoing_color(),
            violations: self.violations,
        };
        self.status.send_if_modified(|current| {
            if *current == next {
                false
            } else {
                *current = next;
                true
            }
        });
    }
}

// ── Handle ──────────────────────────────────────────────────────

/// Driver-side view of a running process.
#[derive(Clone)]
pub struct ProcessHandle {
    id: ProcessId,
    commands: mpsc::Sender<Command>,
    status: watch::Receiver<ProcessStatus>,
}

impl ProcessHandle {
    pub fn id(&self) -> ProcessId {
        self.id
    }

    /// Resolves once the message is on the channel to `to`; waits while that
    /// channel is full.
    pub async fn send(
        &self,
        to: ProcessId,
        payload: impl Into<Payload>,
    ) -> Result<(), ProcessError> {
        let payload = payload.into();
        self.request(|reply| Command::Send { to, payload, reply })
            .await?
    }

    pub async fn initiate_snapshot(&self) -> Result<Delivery, ProcessError> {
        self.request(|reply| Command::Initiate { reply }).await?
    }

    /// Current session's record, or the latest completed one.
    pub async fn snapshot_record(&self) -> Result<Option<SnapshotRecord>, ProcessError> {
        self.request(|reply| Command::SnapshotRecord { reply }).await
    }

    /// Every record this process completed, oldest first.
    pub async fn completed_records(&self) -> Result<Vec<SnapshotRecord>, ProcessError> {
        self.request(|reply| Command::CompletedRecords { reply }).await
    }

    pub async fn last_completed_record(&self) -> Result<Option<SnapshotRecord>, ProcessError> {
        Ok(self.completed_records().await?.pop())
    }

    pub async fn local_state(&self) -> Result<LocalState, ProcessError> {
        self.request(|reply| Command::LocalState { reply }).await
    }

    pub async fn channel_stats(&self) -> Result<Vec<ChannelStats>, ProcessError> {
        self.request(|reply| Command::ChannelStats { reply }).await
    }

    pub fn status(&self) -> ProcessStatus {
        self.status.borrow().clone()
    }

    pub async fn wait_until(
        &self,
        predicate: impl FnMut(&ProcessStatus) -> bool,
    ) -> Result<ProcessStatus, ProcessError> {
        let mut status = self.status.clone();
        let seen = status
            .wait_for(predicate)
            .await
            .map_err(|_| ProcessError::Stopped { process: self.id })?;
        Ok(seen.clone())
    }

    pub async fn shutdown(&self) {
        let _ = self.commands.send(Command::Shutdown).await;
    }

    async fn request<T>(
        &self,
        make: impl FnOnce(oneshot::Sender<T>) -> Command,
    ) -> Result<T, ProcessError> {
        let (tx, rx) = oneshot::channel();
        self.commands
            .send(make(tx))
            .await
            .map_err(|_| ProcessError::Stopped { process: self.id })?;
        rx.await.map_err(|_| ProcessError::Stopped { process: self.id })
    }
}
