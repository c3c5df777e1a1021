use crate::{
    job::Job,
    node::QueueNode,
    types::{IndexSet, NodeIndex},
};
use derive_more::Debug;
use std::collections::VecDeque;
use thiserror::Error;

/// Maximum number of nodes a graph can hold.
///
/// Node indices, activation counters, and the interpreter's per-tick node
/// count are all 16-bit; graphs beyond this bound (or nodes with in-degree
/// above it) are unsupported and rejected with an assertion.
pub const MAX_NODE_COUNT: usize = u16::MAX as usize;

/// The processing graph for one installation cycle.
///
/// Owns every node in an append-only arena and records the subset with
/// in-degree zero, which seeds the ready queue at the start of each tick.
/// Built once, handed to the interpreter via
/// [`install_queue`](crate::interpreter::QueueInterpreter::install_queue)
/// (which takes ownership), and never mutated afterwards. Construction is
/// single-threaded; installation happens between ticks, not during one.
///
/// Most callers should go through [`GraphBuilder`], which derives in-degrees
/// and the initially-runnable set from declared dependencies and rejects
/// cyclic graphs. The methods here are the low-level surface for builders
/// that already know every node's successor list and in-degree.
#[must_use]
#[derive(Debug)]
pub struct DspGraph<J> {
    nodes: Vec<QueueNode<J>>,
    initially_runnable: Vec<NodeIndex>,
}

impl<J: Job> DspGraph<J> {
    /// Creates an empty graph.
    pub fn new() -> Self {
        Self {
            nodes: Vec::new(),
            initially_runnable: Vec::new(),
        }
    }

    fn with_node_capacity(capacity: usize) -> Self {
        Self {
            nodes: Vec::with_capacity(capacity),
            initially_runnable: Vec::new(),
        }
    }

    /// Appends a node to the arena, taking ownership of the job.
    ///
    /// `successors` are the arena indices of the nodes consuming this node's
    /// output and may refer to nodes not added yet; `activation_limit` must
    /// equal the node's eventual in-degree. Both are validated (in debug
    /// builds) when the finished graph is installed.
    ///
    /// # Panics
    /// When the arena already holds [`MAX_NODE_COUNT`] nodes.
    pub fn add_node(
        &mut self,
        job: J,
        successors: Vec<NodeIndex>,
        activation_limit: u16,
    ) -> NodeIndex {
        assert!(self.nodes.len() < MAX_NODE_COUNT, "DspGraph::add_node: [1]");
        let index = self.nodes.len() as NodeIndex;
        self.nodes
            .push(QueueNode::new(job, successors, activation_limit));
        index
    }

    /// Records an already-added node as initially runnable.
    ///
    /// Every node with in-degree zero must be recorded here, in the order it
    /// should be seeded into the ready queue; a tick can otherwise never
    /// complete.
    ///
    /// # Panics
    /// When the node's activation limit is non-zero.
    pub fn add_initially_runnable(&mut self, node: NodeIndex) {
        assert_eq!(
            self.nodes[node as usize].activation_limit(),
            0,
            "DspGraph::add_initially_runnable: [1]"
        );
        self.initially_runnable.push(node);
    }

    /// Number of nodes in the graph.
    #[must_use]
    pub fn total_node_count(&self) -> u16 {
        self.nodes.len() as u16
    }

    pub(crate) fn node(&self, index: NodeIndex) -> &QueueNode<J> {
        &self.nodes[index as usize]
    }

    pub(crate) fn initially_runnable(&self) -> &[NodeIndex] {
        &self.initially_runnable
    }

    /// Re-arms every node's activation count, including nodes left in
    /// mid-state by a torn-down tick.
    pub(crate) fn reset_activation_counts(&self) {
        for node in &self.nodes {
            node.reset_activation_count();
        }
    }

    /// Checks the structural invariants the executor relies on: successor
    /// indices in bounds, each activation limit equal to the node's actual
    /// in-degree, and every in-degree-zero node registered as initially
    /// runnable.
    #[cfg(debug_assertions)]
    pub(crate) fn validate(&self) {
        let mut in_degrees = vec![0u16; self.nodes.len()];
        for node in &self.nodes {
            for &successor in node.successors() {
                let slot = in_degrees
                    .get_mut(successor as usize)
                    .expect("DspGraph::validate: [1]");
                *slot = slot.checked_add(1).expect("DspGraph::validate: [2]");
            }
        }
        for (index, node) in self.nodes.iter().enumerate() {
            assert_eq!(
                node.activation_limit(),
                in_degrees[index],
                "DspGraph::validate: [3]"
            );
            if node.activation_limit() == 0 {
                assert!(
                    self.initially_runnable.contains(&(index as NodeIndex)),
                    "DspGraph::validate: [4]"
                );
            }
        }
    }
}

/// Error returned by [`GraphBuilder::build`] when the declared dependencies
/// do not form a DAG.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum GraphBuildError {
    /// The declared dependencies contain cycle(s), so some nodes could never
    /// become runnable.
    #[error("dependency graph contains cycle(s)")]
    Cycle,
}

/// Incremental construction of a [`DspGraph`] from jobs and dependencies.
///
/// Add every job, declare each producer→consumer edge, then [`build`]. The
/// builder derives in-degrees and the initially-runnable set, deduplicates
/// edges, and rejects cyclic graphs. Node indices handed out by
/// [`add_job`](GraphBuilder::add_job) are preserved in the built graph.
#[must_use]
#[derive(Debug)]
pub struct GraphBuilder<J> {
    #[debug(skip)]
    jobs: Vec<J>,
    /// Successor set per job, in declaration order.
    successors: Vec<IndexSet<NodeIndex>>,
    /// In-degree per job, maintained as edges are declared.
    activation_limits: Vec<u16>,
}

impl<J: Job> GraphBuilder<J> {
    /// Creates an empty builder.
    pub fn new() -> Self {
        Self {
            jobs: Vec::new(),
            successors: Vec::new(),
            activation_limits: Vec::new(),
        }
    }

    /// Adds a job as a new node and returns its index.
    ///
    /// # Panics
    /// When the builder already holds [`MAX_NODE_COUNT`] jobs.
    pub fn add_job(&mut self, job: J) -> NodeIndex {
        assert!(
            self.jobs.len() < MAX_NODE_COUNT,
            "GraphBuilder::add_job: [1]"
        );
        let index = self.jobs.len() as NodeIndex;
        self.jobs.push(job);
        self.successors.push(IndexSet::default());
        self.activation_limits.push(0);
        index
    }

    /// Declares that `consumer` reads `producer`'s output and must not run
    /// before it within a tick.
    ///
    /// Declaring the same edge twice is a no-op.
    ///
    /// # Panics
    /// When either index is unknown, or when a node is made to depend on
    /// itself.
    pub fn add_dependency(&mut self, producer: NodeIndex, consumer: NodeIndex) {
        assert!(
            (producer as usize) < self.jobs.len(),
            "GraphBuilder::add_dependency: unknown producer {producer}"
        );
        assert!(
            (consumer as usize) < self.jobs.len(),
            "GraphBuilder::add_dependency: unknown consumer {consumer}"
        );
        assert_ne!(
            producer, consumer,
            "GraphBuilder::add_dependency: node {producer} depends on itself"
        );
        if self.successors[producer as usize].insert(consumer) {
            let limit = &mut self.activation_limits[consumer as usize];
            *limit = limit.checked_add(1).expect("GraphBuilder::add_dependency: [1]");
        }
    }

    /// Materializes the graph.
    ///
    /// Runs a Kahn pass over the declared edges to verify acyclicity, then
    /// moves every job into the arena, preserving the indices handed out by
    /// [`add_job`](GraphBuilder::add_job).
    ///
    /// # Errors
    /// [`GraphBuildError::Cycle`] when the dependencies contain cycle(s).
    pub fn build(self) -> Result<DspGraph<J>, GraphBuildError> {
        let Self {
            jobs,
            successors,
            activation_limits,
        } = self;

        // Kahn's algorithm on a scratch copy of the in-degrees: if some node
        // is never released, the unplaced remainder contains a cycle.
        let mut remaining = activation_limits.clone();
        let mut ready: VecDeque<NodeIndex> = remaining
            .iter()
            .enumerate()
            .filter(|(_, &in_degree)| in_degree == 0)
            .map(|(index, _)| index as NodeIndex)
            .collect();
        let mut placed = 0usize;
        while let Some(index) = ready.pop_front() {
            placed += 1;
            for &successor in &successors[index as usize] {
                let slot = &mut remaining[successor as usize];
                *slot = slot.checked_sub(1).expect("GraphBuilder::build: [1]");
                if *slot == 0 {
                    ready.push_back(successor);
                }
            }
        }
        if placed != jobs.len() {
            return Err(GraphBuildError::Cycle);
        }

        let mut graph = DspGraph::with_node_capacity(jobs.len());
        let nodes = jobs.into_iter().zip(successors.into_iter().zip(activation_limits));
        for (job, (successors, activation_limit)) in nodes {
            let index = graph.add_node(job, successors.into_iter().collect(), activation_limit);
            if activation_limit == 0 {
                graph.add_initially_runnable(index);
            }
        }
        Ok(graph)
    }
}
