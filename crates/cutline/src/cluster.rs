//! Topology construction.
//!
//! A cluster fixes one [`StrategyKind`] for every process it builds, wires
//! each declared link with its own FIFO channel and refuses topologies in
//! which a snapshot could never close every channel.

use std::collections::{BTreeMap, BTreeSet};

use cutline_types::{ProcessId, StrategyKind};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::channel::{ChannelReceiver, ChannelSender, channel};
use crate::config::CutlineConfig;
use crate::error::{ConfigError, ProcessError};
use crate::process::{Process, ProcessHandle};
use crate::strategy;

pub struct ClusterBuilder {
    config: CutlineConfig,
    processes: Vec<(ProcessId, String)>,
    links: Vec<(ProcessId, ProcessId)>,
    fully_connected: bool,
}

impl ClusterBuilder {
    pub fn new(config: CutlineConfig) -> Self {
        Self {
            config,
            processes: Vec::new(),
            links: Vec::new(),
            fully_connected: false,
        }
    }

    pub fn process(mut self, id: impl Into<ProcessId>, seed: impl Into<String>) -> Self {
        self.processes.push((id.into(), seed.into()));
        self
    }

    /// Declare the directed channel `from -> to`.
    pub fn link(mut self, from: impl Into<ProcessId>, to: impl Into<ProcessId>) -> Self {
        self.links.push((from.into(), to.into()));
        self
    }

    /// One channel per ordered pair of distinct processes, added at build
    /// time on top of any explicit links.
    pub fn fully_connected(mut self) -> Self {
        self.fully_connected = true;
        self
    }

    fn resolved_links(&self) -> Result<Vec<(ProcessId, ProcessId)>, ConfigError> {
        let declared: BTreeSet<ProcessId> = self.processes.iter().map(|(id, _)| *id).collect();
        let mut seen = BTreeSet::new();
        let mut links = Vec::new();

        for &(from, to) in &self.links {
            if from == to {
                return Err(ConfigError::SelfLink(from));
            }
            for endpoint in [from, to] {
                if !declared.contains(&endpoint) {
                    return Err(ConfigError::UnknownProcess(endpoint));
                }
            }
            if !seen.insert((from, to)) {
                return Err(ConfigError::DuplicateLink { from, to });
            }
            links.push((from, to));
        }

        if self.fully_connected {
            for &from in &declared {
                for &to in &declared {
                    if from != to && seen.insert((from, to)) {
                        links.push((from, to));
                    }
                }
            }
        }
        Ok(links)
    }

    /// Validate, wire and spawn every process.
    pub fn build(self) -> Result<Cluster, ConfigError> {
        self.config.validate()?;
        if self.processes.is_empty() {
            return Err(ConfigError::Empty);
        }
        let mut ids = BTreeSet::new();
        for (id, _) in &self.processes {
            if !ids.insert(*id) {
                return Err(ConfigError::DuplicateProcess(*id));
            }
        }
        let links = self.resolved_links()?;
        check_strongly_connected(&ids, &links)?;

        let mut incoming: BTreeMap<ProcessId, Vec<ChannelReceiver>> = BTreeMap::new();
        let mut outgoing: BTreeMap<ProcessId, Vec<ChannelSender>> = BTreeMap::new();
        for &(from, to) in &links {
            let (tx, rx) = channel(from, to, self.config.channel_capacity);
            debug!(channel = tx.name(), "wired");
            outgoing.entry(from).or_default().push(tx);
            incoming.entry(to).or_default().push(rx);
        }

        let mut handles = BTreeMap::new();
        let mut tasks = Vec::new();
        for (id, seed) in self.processes {
            let process = Process::new(
                id,
                seed,
                strategy::for_kind(self.config.strategy, id),
                incoming.remove(&id).unwrap_or_default(),
                outgoing.remove(&id).unwrap_or_default(),
            );
            let (handle, task) = process.spawn();
            handles.insert(id, handle);
            tasks.push(task);
        }

        info!(
            processes = handles.len(),
            channels = links.len(),
            strategy = %self.config.strategy,
            "cluster started"
        );
        Ok(Cluster {
            config: self.config,
            handles,
            tasks,
        })
    }
}

/// Every process reaches every other one, following links forwards and
/// backwards from the lowest id.
fn check_strongly_connected(
    ids: &BTreeSet<ProcessId>,
    links: &[(ProcessId, ProcessId)],
) -> Result<(), ConfigError> {
    let Some(&root) = ids.iter().next() else {
        return Err(ConfigError::Empty);
    };
    let forward = reachable(root, links.iter().map(|&(from, to)| (from, to)));
    let backward = reachable(root, links.iter().map(|&(from, to)| (to, from)));
    let unreachable: Vec<ProcessId> = ids
        .iter()
        .copied()
        .filter(|id| !forward.contains(id) || !backward.contains(id))
        .collect();
    if unreachable.is_empty() {
        Ok(())
    } else {
        Err(ConfigError::NotStronglyConnected { unreachable })
    }
}

fn reachable(
    root: ProcessId,
    edges: impl Iterator<Item = (ProcessId, ProcessId)>,
) -> BTreeSet<ProcessId> {
    let mut adjacency: BTreeMap<ProcessId, Vec<ProcessId>> = BTreeMap::new();
    for (from, to) in edges {
        adjacency.entry(from).or_default().push(to);
    }
    let mut visited = BTreeSet::from([root]);
    let mut stack = vec![root];
    while let Some(node) = stack.pop() {
        for &next in adjacency.get(&node).map(Vec::as_slice).unwrap_or_default() {
            if visited.insert(next) {
                stack.push(next);
            }
        }
    }
    visited
}

/// A running set of processes sharing one strategy.
pub struct Cluster {
    config: CutlineConfig,
    handles: BTreeMap<ProcessId, ProcessHandle>,
    tasks: Vec<JoinHandle<()>>,
}

impl Cluster {
    pub fn builder(config: CutlineConfig) -> ClusterBuilder {
        ClusterBuilder::new(config)
    }

    /// `n` processes `P1..Pn` seeded `init1..initn`, every ordered pair linked.
    pub fn complete(n: u32, config: CutlineConfig) -> Result<Self, ConfigError> {
        (1..=n)
            .fold(ClusterBuilder::new(config), |builder, i| {
                builder.process(i, format!("init{i}"))
            })
            .fully_connected()
            .build()
    }

    pub fn config(&self) -> &CutlineConfig {
        &self.config
    }

    pub fn strategy(&self) -> StrategyKind {
        self.config.strategy
    }

    pub fn handle(&self, id: impl Into<ProcessId>) -> Option<&ProcessHandle> {
        self.handles.get(&id.into())
    }

    pub fn handles(&self) -> impl Iterator<Item = &ProcessHandle> {
        self.handles.values()
    }

    /// Ask `from` to send `payload` to `to`.
    pub async fn send(
        &self,
        from: impl Into<ProcessId>,
        to: impl Into<ProcessId>,
        payload: &str,
    ) -> Result<(), ProcessError> {
        let from = from.into();
        let handle = self
            .handles
            .get(&from)
            .ok_or(ProcessError::Stopped { process: from })?;
        handle.send(to.into(), payload).await
    }

    /// Stop every process and wait for their tasks.
    pub async fn shutdown(self) {
        for handle in self.handles.values() {
            handle.shutdown().await;
        }
        for task in self.tasks {
            let _ = task.await;
        }
    }
}
