use crate::{
    fifo::ReadyFifo,
    graph::DspGraph,
    job::Job,
    sync::{spin_loop, AtomicU16, Ordering},
    types::{NodeIndex, WorkerIndex},
};
use derive_more::Debug;

/// Ready-queue capacity before any graph is installed. `install_queue`
/// re-sizes the queue to the installed graph's node count.
const DEFAULT_FIFO_CAPACITY: usize = 1024;

/// Outcome of one pass through the inner worker loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RunOutcome {
    /// This worker ran the final node(s) of the tick.
    NoRemainingItems,
    /// Nothing to dequeue right now; work is still outstanding elsewhere.
    FifoEmpty,
    /// Ran a chain; more nodes remain.
    RemainingItems,
}

/// The runtime executor for the installed processing graph.
///
/// Holds the current [`DspGraph`], a bounded lock-free FIFO of ready nodes,
/// and the count of nodes remaining in the current tick. Lives across many
/// ticks; the graph inside is swapped between ticks via
/// [`install_queue`](QueueInterpreter::install_queue) /
/// [`release_queue`](QueueInterpreter::release_queue).
///
/// Per tick, the driver calls [`init_tick`](QueueInterpreter::init_tick),
/// wakes helper threads (see [`DspThreadPool`](crate::pool::DspThreadPool)
/// for a reference collaborator), has each helper `i` call
/// [`tick(i)`](QueueInterpreter::tick), and runs
/// [`tick_master`](QueueInterpreter::tick_master) on its own thread. When
/// `tick_master` returns, every node has run exactly once.
///
/// The tick path never allocates, locks, or blocks: workers are wait-free
/// apart from the FIFO's internal retries and the master's terminal
/// busy-wait. Lifecycle methods take `&mut self`, so the borrow checker
/// rules out installing or releasing a graph while workers still share
/// `&self` for a tick.
#[must_use]
#[derive(Debug)]
pub struct QueueInterpreter<J> {
    /// Swapped only between ticks; workers hold a stable reference for the
    /// duration of a tick.
    graph: Option<Box<DspGraph<J>>>,
    fifo: ReadyFifo,
    /// Nodes still to be processed in the current tick.
    node_count: AtomicU16,
    /// Configured number of workers (master + helpers), at least 1.
    thread_count: u8,
    /// Helpers actually worth waking for the installed graph.
    used_helper_threads: u8,
}

impl<J: Job> QueueInterpreter<J> {
    /// Creates an interpreter with no graph installed.
    ///
    /// `thread_count` counts the master plus the helpers and is clamped to
    /// at least 1.
    pub fn new(thread_count: u8) -> Self {
        let mut interpreter = Self {
            graph: None,
            fifo: ReadyFifo::with_capacity(DEFAULT_FIFO_CAPACITY),
            node_count: AtomicU16::new(0),
            thread_count: 1,
            used_helper_threads: 0,
        };
        interpreter.set_thread_count(thread_count);
        interpreter
    }

    /// Stores the worker count, clamped to at least 1.
    ///
    /// Does not resize any thread pool (the pool is the collaborator's
    /// concern) and takes effect on `used_helper_threads` only at the next
    /// [`install_queue`](QueueInterpreter::install_queue).
    pub fn set_thread_count(&mut self, thread_count: u8) {
        self.thread_count = thread_count.max(1);
    }

    /// The configured worker count (master + helpers).
    #[must_use]
    pub fn thread_count(&self) -> u8 {
        self.thread_count
    }

    /// Number of helper threads the collaborator should wake per tick.
    ///
    /// Zero when running single-threaded or when the installed graph has
    /// fewer nodes than workers would be useful for.
    #[must_use]
    pub fn used_helper_threads(&self) -> u8 {
        self.used_helper_threads
    }

    /// Node count of the installed graph, or 0 when none is installed.
    #[must_use]
    pub fn total_node_count(&self) -> u16 {
        self.graph
            .as_deref()
            .map_or(0, DspGraph::total_node_count)
    }

    /// Installs `new_graph` as the active graph, returning whatever graph
    /// was previously installed.
    ///
    /// Resets the new graph's activation counts (nodes may have been left in
    /// mid-state if a previous owner tore down a tick), re-sizes the ready
    /// queue to the graph's node count, and derives the number of helper
    /// threads worth waking. Allocation is fine here: installation happens
    /// between ticks. `&mut self` guarantees no tick is in progress.
    pub fn install_queue(&mut self, new_graph: Box<DspGraph<J>>) -> Option<Box<DspGraph<J>>> {
        debug_assert_eq!(
            self.node_count.load(Ordering::Relaxed),
            0,
            "QueueInterpreter::install_queue: [1]"
        );
        #[cfg(debug_assertions)]
        new_graph.validate();

        new_graph.reset_activation_counts();
        let total = new_graph.total_node_count();
        self.fifo = ReadyFifo::with_capacity(usize::from(total));

        // More workers than nodes can never be busy at once.
        let workers = self
            .thread_count
            .min(u8::try_from(total).unwrap_or(u8::MAX));
        self.used_helper_threads = workers.saturating_sub(1);

        self.graph.replace(new_graph)
    }

    /// Detaches and returns the current graph, leaving the interpreter
    /// empty. `&mut self` guarantees no tick is in progress.
    pub fn release_queue(&mut self) -> Option<Box<DspGraph<J>>> {
        debug_assert_eq!(
            self.node_count.load(Ordering::Relaxed),
            0,
            "QueueInterpreter::release_queue: [1]"
        );
        self.graph.take()
    }

    /// Prepares per-tick state.
    ///
    /// Returns `false` when no graph is installed or the graph is empty; the
    /// driver should skip the tick (and typically produce silence).
    /// Otherwise publishes the node count and seeds the ready queue with the
    /// initially-runnable nodes, in graph order, and returns `true`.
    ///
    /// Must not run concurrently with a tick; call it from the master thread
    /// before waking any helpers.
    pub fn init_tick(&self) -> bool {
        let Some(graph) = self.graph.as_deref() else {
            return false;
        };
        let total = graph.total_node_count();
        if total == 0 {
            return false;
        }

        debug_assert_eq!(
            self.node_count.load(Ordering::Relaxed),
            0,
            "QueueInterpreter::init_tick: [1]"
        );
        debug_assert!(self.fifo.is_empty(), "QueueInterpreter::init_tick: [2]");

        self.node_count.store(total, Ordering::Release);
        for &node in graph.initially_runnable() {
            self.mark_as_runnable(node);
        }
        true
    }

    /// Runs the helper half of a tick for a non-zero worker index.
    ///
    /// Returns once every node of the tick has been consumed, whether by
    /// this worker or by others.
    pub fn tick(&self, worker: WorkerIndex) {
        debug_assert_ne!(worker, 0, "QueueInterpreter::tick: [1]");
        self.run_items(worker);
    }

    /// Runs the master half of a tick: the worker loop as index 0, then a
    /// busy-wait until the remaining helpers have consumed the last nodes.
    ///
    /// The busy-wait is deliberate: the caller is the audio callback with a
    /// deadline of a few milliseconds, and a kernel sleep/wake cycle costs
    /// more than the wait ever lasts.
    pub fn tick_master(&self) {
        self.run_items(0);
        self.wait_for_end();
        debug_assert!(self.fifo.is_empty(), "QueueInterpreter::tick_master: [1]");
    }

    /// The outer worker loop.
    ///
    /// Two levels on purpose: the inner chain (in `run_next_item`) amortizes
    /// FIFO traffic over linear dependency runs, while this loop re-checks
    /// the global count so a worker that found the FIFO transiently empty
    /// spins until either new work surfaces or the tick finishes.
    fn run_items(&self, worker: WorkerIndex) {
        while self.node_count.load(Ordering::Acquire) != 0 {
            match self.run_next_item(worker) {
                RunOutcome::NoRemainingItems => return,
                RunOutcome::FifoEmpty => spin_loop(),
                RunOutcome::RemainingItems => {}
            }
        }
    }

    /// Dequeues one node and runs the chain starting at it.
    ///
    /// The chain follows direct-successor handoffs until a node releases no
    /// further successor, then settles the whole chain against the global
    /// count with a single release `fetch_sub`. Observing
    /// `previous == consumed` means this worker ran the final node(s) of the
    /// tick.
    fn run_next_item(&self, worker: WorkerIndex) -> RunOutcome {
        let Some(first) = self.fifo.pop() else {
            return RunOutcome::FifoEmpty;
        };
        let graph = self
            .graph
            .as_deref()
            .expect("QueueInterpreter::run_next_item: [1]");

        let mut consumed: u16 = 0;
        let mut current = Some(first);
        while let Some(index) = current {
            current = graph.node(index).run(self, graph, worker);
            consumed += 1;
        }

        let previous = self.node_count.fetch_sub(consumed, Ordering::Release);
        debug_assert!(previous >= consumed, "QueueInterpreter::run_next_item: [2]");
        if previous == consumed {
            RunOutcome::NoRemainingItems
        } else {
            RunOutcome::RemainingItems
        }
    }

    /// Busy-waits until the node count reaches zero.
    ///
    /// The acquire load pairs with the workers' release `fetch_sub`, so when
    /// the master observes zero it also observes every job's writes.
    fn wait_for_end(&self) {
        while self.node_count.load(Ordering::Acquire) != 0 {
            spin_loop();
        }
    }

    /// Enqueues a node whose activation count reached zero.
    pub(crate) fn mark_as_runnable(&self, node: NodeIndex) {
        self.fifo.push(node);
    }
}
