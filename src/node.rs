use crate::{
    graph::DspGraph,
    interpreter::QueueInterpreter,
    job::Job,
    sync::{AtomicU16, Ordering},
    types::{NodeIndex, SyncUnsafeCell, WorkerIndex},
};
use derive_more::Debug;

/// One vertex of the processing graph.
///
/// Holds the job, the arena indices of downstream nodes, and the activation
/// bookkeeping: `activation_limit` is the node's in-degree and
/// `activation_count` counts the predecessors that have not completed yet in
/// the current tick. A node becomes runnable when the count reaches zero.
///
/// Aligned to a cache line pair so that concurrent decrements on neighbouring
/// nodes' counters don't contend on the same line.
#[must_use]
#[derive(Debug)]
#[repr(align(128))]
pub(crate) struct QueueNode<J> {
    /// Borrowed mutably only by the worker currently running the node.
    #[debug(skip)]
    job: SyncUnsafeCell<J>,
    /// Arena indices of the nodes consuming this node's output.
    successors: Vec<NodeIndex>,
    /// Number of predecessors; the reset value of `activation_count`.
    activation_limit: u16,
    /// Predecessors yet to complete in the current tick.
    activation_count: AtomicU16,
}

impl<J: Job> QueueNode<J> {
    pub(crate) fn new(job: J, successors: Vec<NodeIndex>, activation_limit: u16) -> Self {
        Self {
            job: SyncUnsafeCell::new(job),
            successors,
            activation_limit,
            activation_count: AtomicU16::new(activation_limit),
        }
    }

    /// Runs the job, releases the successors, and re-arms the node for the
    /// next tick.
    ///
    /// Every successor's count is decremented exactly once. The first
    /// successor observed to reach zero is *returned* instead of enqueued:
    /// the caller runs it next, which keeps linear dependency chains on one
    /// worker and off the FIFO. Every further newly-ready successor goes
    /// through the interpreter's FIFO.
    pub(crate) fn run(
        &self,
        interpreter: &QueueInterpreter<J>,
        graph: &DspGraph<J>,
        worker: WorkerIndex,
    ) -> Option<NodeIndex> {
        debug_assert_eq!(
            self.activation_count.load(Ordering::Relaxed),
            0,
            "QueueNode::run: [1]"
        );

        // SAFETY: the activation protocol hands each node to exactly one
        // worker per tick (its count is zero and nothing re-enqueues it until
        // the reset below), so no other borrow of the job slot exists.
        self.job.with_mut(|job| unsafe { (*job).run(worker) });

        let next = self.update_successors(interpreter, graph);
        self.reset_activation_count();
        next
    }

    /// Decrements every successor's activation count, keeping the first one
    /// that reached zero for direct chain execution.
    fn update_successors(
        &self,
        interpreter: &QueueInterpreter<J>,
        graph: &DspGraph<J>,
    ) -> Option<NodeIndex> {
        let mut next = None;
        for &successor in &self.successors {
            if graph.node(successor).release_one_predecessor() {
                if next.is_none() {
                    next = Some(successor);
                } else {
                    interpreter.mark_as_runnable(successor);
                }
            }
        }
        next
    }

    /// Records the completion of one predecessor; true when this was the
    /// last one and the node is now runnable.
    ///
    /// The release half of the `AcqRel` decrement publishes the completed
    /// predecessor's writes; the acquire half makes every predecessor's
    /// writes visible to the worker that observes zero, whether the node
    /// reaches it via the FIFO or via the direct chain.
    fn release_one_predecessor(&self) -> bool {
        let previous = self.activation_count.fetch_sub(1, Ordering::AcqRel);
        debug_assert!(previous > 0, "QueueNode::release_one_predecessor: [1]");
        previous == 1
    }

    /// Stores `activation_limit` back into the count.
    ///
    /// Called from `run` right before the node is handed back, and at graph
    /// install time for nodes possibly left in mid-state by a torn-down
    /// tick (hence no precondition on the current value).
    pub(crate) fn reset_activation_count(&self) {
        self.activation_count
            .store(self.activation_limit, Ordering::Release);
    }

    pub(crate) fn activation_limit(&self) -> u16 {
        self.activation_limit
    }

    #[cfg(debug_assertions)]
    pub(crate) fn successors(&self) -> &[NodeIndex] {
        &self.successors
    }
}
