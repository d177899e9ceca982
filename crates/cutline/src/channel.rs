//! Directed FIFO channels between processes.
//!
//! A channel is a bounded tokio mpsc with exactly one writer and one reader.
//! Sends wait for capacity (back-pressure) and are delivered in send order;
//! the snapshot protocols rely on nothing else.

use std::future::poll_fn;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};

use cutline_types::{Envelope, ProcessId};
use tokio::sync::mpsc;

use crate::error::ChannelError;

// ── Info ────────────────────────────────────────────────────────

struct ChannelInfo {
    name: String,
    from: ProcessId,
    to: ProcessId,
    capacity: usize,
    sent: AtomicU64,
    received: AtomicU64,
    high_watermark: AtomicU64,
}

fn update_atomic_max(target: &AtomicU64, observed: u64) {
    let mut current = target.load(Ordering::Relaxed);
    while observed > current {
        match target.compare_exchange_weak(
            current,
            observed,
            Ordering::Relaxed,
            Ordering::Relaxed,
        ) {
            Ok(_) => break,
            Err(next) => current = next,
        }
    }
}

impl ChannelInfo {
    fn track_send_watermark(&self) {
        let sent = self.sent.load(Ordering::Relaxed);
        let received = self.received.load(Ordering::Relaxed);
        update_atomic_max(&self.high_watermark, sent.saturating_sub(received));
    }

    fn stats(&self) -> ChannelStats {
        ChannelStats {
            name: self.name.clone(),
            from: self.from,
            to: self.to,
            capacity: self.capacity,
            sent: self.sent.load(Ordering::Relaxed),
            received: self.received.load(Ordering::Relaxed),
            high_watermark: self.high_watermark.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time counters for one channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelStats {
    pub name: String,
    pub from: ProcessId,
    pub to: ProcessId,
    pub capacity: usize,
    pub sent: u64,
    pub received: u64,
    pub high_watermark: u64,
}

// ── Endpoints ───────────────────────────────────────────────────

#[derive(Clone)]
pub struct ChannelSender {
    inner: mpsc::Sender<Envelope>,
    info: Arc<ChannelInfo>,
}

pub struct ChannelReceiver {
    inner: mpsc::Receiver<Envelope>,
    info: Arc<ChannelInfo>,
}

/// Create the directed channel `from -> to`.
///
/// `capacity` must be non-zero; the cluster builder validates it.
pub fn channel(
    from: ProcessId,
    to: ProcessId,
    capacity: usize,
) -> (ChannelSender, ChannelReceiver) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    let info = Arc::new(ChannelInfo {
        name: format!("{from}->{to}"),
        from,
        to,
        capacity: capacity.max(1),
        sent: AtomicU64::new(0),
        received: AtomicU64::new(0),
        high_watermark: AtomicU64::new(0),
    });
    (
        ChannelSender {
            inner: tx,
            info: Arc::clone(&info),
        },
        ChannelReceiver { inner: rx, info },
    )
}

impl ChannelSender {
    pub async fn send(&self, item: impl Into<Envelope>) -> Result<(), ChannelError> {
        self.inner
            .send(item.into())
            .await
            .map_err(|_| ChannelError::Closed {
                name: self.info.name.clone(),
            })?;
        self.info.sent.fetch_add(1, Ordering::Relaxed);
        self.info.track_send_watermark();
        Ok(())
    }

    pub fn name(&self) -> &str {
        &self.info.name
    }

    pub fn from(&self) -> ProcessId {
        self.info.from
    }

    pub fn to(&self) -> ProcessId {
        self.info.to
    }

    pub fn stats(&self) -> ChannelStats {
        self.info.stats()
    }
}

impl ChannelReceiver {
    pub fn poll_recv(&mut self, cx: &mut Context<'_>) -> Poll<Option<Envelope>> {
        let polled = self.inner.poll_recv(cx);
        if let Poll::Ready(Some(_)) = &polled {
            self.info.received.fetch_add(1, Ordering::Relaxed);
        }
        polled
    }

    pub async fn recv(&mut self) -> Option<Envelope> {
        poll_fn(|cx| self.poll_recv(cx)).await
    }

    pub fn name(&self) -> &str {
        &self.info.name
    }

    pub fn from(&self) -> ProcessId {
        self.info.from
    }

    pub fn to(&self) -> ProcessId {
        self.info.to
    }

    pub fn stats(&self) -> ChannelStats {
        self.info.stats()
    }
}

// ── Fair union of incoming channels ─────────────────────────────

/// All incoming channels of one process, waited on as a single source.
///
/// Each poll starts one slot after the channel that produced the previous
/// item, so a busy channel cannot starve the others. Every pending receiver
/// registers the task's waker; nothing sleeps or spins.
pub struct IncomingSet {
    receivers: Vec<ChannelReceiver>,
    drained: Vec<bool>,
    offset: usize,
}

impl IncomingSet {
    pub fn new(mut receivers: Vec<ChannelReceiver>) -> Self {
        receivers.sort_by_key(ChannelReceiver::from);
        let drained = vec![false; receivers.len()];
        Self {
            receivers,
            drained,
            offset: 0,
        }
    }

    pub fn sources(&self) -> Vec<ProcessId> {
        self.receivers.iter().map(ChannelReceiver::from).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.receivers.is_empty()
    }

    pub fn stats(&self) -> Vec<ChannelStats> {
        self.receivers.iter().map(ChannelReceiver::stats).collect()
    }

    /// `Ready(None)` once every sender is gone and every queue is drained.
    pub fn poll_next(&mut self, cx: &mut Context<'_>) -> Poll<Option<(ProcessId, Envelope)>> {
        let len = self.receivers.len();
        if len == 0 {
            return Poll::Ready(None);
        }
        for step in 0..len {
            let idx = (self.offset + step) % len;
            if self.drained[idx] {
                continue;
            }
            match self.receivers[idx].poll_recv(cx) {
                Poll::Ready(Some(item)) => {
                    self.offset = (idx + 1) % len;
                    return Poll::Ready(Some((self.receivers[idx].from(), item)));
                }
                Poll::Ready(None) => self.drained[idx] = true,
                Poll::Pending => {}
            }
        }
        if self.drained.iter().all(|d| *d) {
            Poll::Ready(None)
        } else {
            Poll::Pending
        }
    }

    pub async fn next(&mut self) -> Option<(ProcessId, Envelope)> {
        poll_fn(|cx| self.poll_next(cx)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cutline_types::{AppMessage, ControlSignal};

    fn payload_of(item: &Envelope) -> &str {
        match item {
            Envelope::Application(msg) => msg.payload.as_str(),
            Envelope::Control(_) => "<control>",
        }
    }

    #[tokio::test]
    async fn delivers_in_send_order_and_counts() {
        let (tx, mut rx) = channel(ProcessId(1), ProcessId(2), 4);
        tx.send(AppMessage::plain(ProcessId(1), "A")).await.expect("open");
        tx.send(ControlSignal::Marker {
            initiator: ProcessId(1),
        })
        .await
        .expect("open");
        tx.send(AppMessage::plain(ProcessId(1), "B")).await.expect("open");

        let mut seen = Vec::new();
        for _ in 0..3 {
            let item = rx.recv().await.expect("item queued");
            seen.push(payload_of(&item).to_owned());
        }
        assert_eq!(seen, vec!["A", "<control>", "B"]);

        let stats = rx.stats();
        assert_eq!(stats.name, "P1->P2");
        assert_eq!(stats.sent, 3);
        assert_eq!(stats.received, 3);
        assert!(stats.high_watermark >= 1);
    }

    #[tokio::test]
    async fn send_after_receiver_drop_is_an_error() {
        let (tx, rx) = channel(ProcessId(1), ProcessId(2), 1);
        drop(rx);
        let err = tx
            .send(AppMessage::plain(ProcessId(1), "lost"))
            .await
            .expect_err("receiver is gone");
        assert_eq!(
            err,
            ChannelError::Closed {
                name: "P1->P2".to_owned()
            }
        );
    }

    #[tokio::test]
    async fn incoming_set_rotates_between_busy_channels() {
        let (tx2, rx2) = channel(ProcessId(2), ProcessId(1), 8);
        let (tx3, rx3) = channel(ProcessId(3), ProcessId(1), 8);
        for i in 0..3 {
            tx2.send(AppMessage::plain(ProcessId(2), format!("b{i}")))
                .await
                .expect("open");
            tx3.send(AppMessage::plain(ProcessId(3), format!("c{i}")))
                .await
                .expect("open");
        }

        let mut set = IncomingSet::new(vec![rx3, rx2]);
        assert_eq!(set.sources(), vec![ProcessId(2), ProcessId(3)]);

        let mut order = Vec::new();
        for _ in 0..6 {
            let (source, _) = set.next().await.expect("items queued");
            order.push(source.as_u32());
        }
        assert_eq!(order, vec![2, 3, 2, 3, 2, 3]);

        drop(tx2);
        drop(tx3);
        assert!(set.next().await.is_none());
    }

    #[tokio::test]
    async fn empty_incoming_set_is_immediately_exhausted() {
        let mut set = IncomingSet::new(Vec::new());
        assert!(set.is_empty());
        assert!(set.next().await.is_none());
    }
}
