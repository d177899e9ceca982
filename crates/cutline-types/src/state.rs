use facet::Facet;

use crate::{Payload, ProcessId};

/// One message whose effect has been applied to a process's live state.
#[derive(Facet, Clone, Debug, PartialEq, Eq)]
pub struct Applied {
    pub from: ProcessId,
    pub payload: Payload,
}

/// Number of application messages sent to one destination.
#[derive(Facet, Clone, Debug, PartialEq, Eq)]
pub struct SentCount {
    pub to: ProcessId,
    pub count: u64,
}

/// Append-only local state of a process.
///
/// `applied` is the ordered log of delivered payloads; `sent` counts outgoing
/// application traffic per destination so a recorded state can be checked
/// against the in-transit recordings of its peers.
#[derive(Facet, Clone, Debug, PartialEq, Eq, Default)]
pub struct LocalState {
    pub seed: String,
    pub applied: Vec<Applied>,
    pub sent: Vec<SentCount>,
}

impl LocalState {
    pub fn new(seed: impl Into<String>) -> Self {
        Self {
            seed: seed.into(),
            applied: Vec::new(),
            sent: Vec::new(),
        }
    }

    pub fn apply(&mut self, from: ProcessId, payload: Payload) {
        self.applied.push(Applied { from, payload });
    }

    pub fn note_sent(&mut self, to: ProcessId) {
        match self.sent.iter_mut().find(|entry| entry.to == to) {
            Some(entry) => entry.count += 1,
            None => {
                self.sent.push(SentCount { to, count: 1 });
                self.sent.sort_by_key(|entry| entry.to);
            }
        }
    }

    pub fn sent_to(&self, to: ProcessId) -> u64 {
        self.sent
            .iter()
            .find(|entry| entry.to == to)
            .map(|entry| entry.count)
            .unwrap_or(0)
    }

    /// Payloads applied from `from`, in delivery order.
    pub fn applied_from(&self, from: ProcessId) -> impl Iterator<Item = &Payload> {
        self.applied
            .iter()
            .filter(move |entry| entry.from == from)
            .map(|entry| &entry.payload)
    }

    pub fn contains_payload(&self, payload: &Payload) -> bool {
        self.applied.iter().any(|entry| &entry.payload == payload)
    }

    /// `seed|A|B|...`
    pub fn render(&self) -> String {
        let mut out = self.seed.clone();
        for entry in &self.applied {
            out.push('|');
            out.push_str(entry.payload.as_str());
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_joins_seed_and_applied_payloads() {
        let mut state = LocalState::new("init2");
        state.apply(ProcessId(1), Payload::from("A"));
        state.apply(ProcessId(3), Payload::from("C"));
        assert_eq!(state.render(), "init2|A|C");
        assert_eq!(
            state.applied_from(ProcessId(1)).collect::<Vec<_>>(),
            vec![&Payload::from("A")]
        );
    }

    #[test]
    fn sent_counts_stay_sorted_by_destination() {
        let mut state = LocalState::new("init1");
        state.note_sent(ProcessId(3));
        state.note_sent(ProcessId(2));
        state.note_sent(ProcessId(3));
        assert_eq!(state.sent_to(ProcessId(3)), 2);
        assert_eq!(state.sent_to(ProcessId(2)), 1);
        assert_eq!(state.sent_to(ProcessId(9)), 0);
        let order: Vec<_> = state.sent.iter().map(|entry| entry.to).collect();
        assert_eq!(order, vec![ProcessId(2), ProcessId(3)]);
    }
}
