#![allow(missing_docs)]
#![cfg(not(feature = "loom"))]

use pdq::{
    graph::{DspGraph, GraphBuildError, GraphBuilder},
    interpreter::QueueInterpreter,
    job::Job,
    pool::DspThreadPool,
    types::WorkerIndex,
};
use std::sync::{
    atomic::{AtomicBool, AtomicUsize, Ordering},
    Arc, Mutex,
};
use std::thread;

/// Per-node execution counters plus a global record of (node, worker) in
/// completion order.
#[derive(Debug, Clone)]
struct Trace {
    runs: Arc<Vec<AtomicUsize>>,
    order: Arc<Mutex<Vec<(usize, WorkerIndex)>>>,
}

impl Trace {
    fn new(capacity: usize) -> Self {
        Self {
            runs: Arc::new((0..capacity).map(|_| AtomicUsize::new(0)).collect()),
            order: Arc::new(Mutex::new(Vec::new())),
        }
    }

    fn job(&self, node: usize) -> TraceJob {
        TraceJob {
            node,
            trace: self.clone(),
        }
    }

    fn run_count(&self, node: usize) -> usize {
        self.runs[node].load(Ordering::Relaxed)
    }

    fn node_order(&self) -> Vec<usize> {
        self.order
            .lock()
            .unwrap()
            .iter()
            .map(|&(node, _)| node)
            .collect()
    }
}

#[derive(Debug)]
struct TraceJob {
    node: usize,
    trace: Trace,
}

impl Job for TraceJob {
    fn run(&mut self, worker: WorkerIndex) {
        self.trace.runs[self.node].fetch_add(1, Ordering::Relaxed);
        self.trace.order.lock().unwrap().push((self.node, worker));
    }
}

/// Drives one tick the way a thread-pool collaborator would: seed, spawn
/// the helpers the interpreter asked for, run the master half, join.
fn run_tick<J: Job>(interpreter: &QueueInterpreter<J>) {
    assert!(interpreter.init_tick());
    thread::scope(|scope| {
        for worker in 1..=interpreter.used_helper_threads() {
            scope.spawn(move || interpreter.tick(worker));
        }
        interpreter.tick_master();
    });
}

fn install<J: Job>(interpreter: &mut QueueInterpreter<J>, graph: DspGraph<J>) {
    assert!(interpreter.install_queue(Box::new(graph)).is_none());
}

/// 0 → 1 → 2 → 3
fn chain_graph(trace: &Trace) -> DspGraph<TraceJob> {
    let mut builder = GraphBuilder::new();
    let nodes: Vec<_> = (0..4).map(|node| builder.add_job(trace.job(node))).collect();
    for pair in nodes.windows(2) {
        builder.add_dependency(pair[0], pair[1]);
    }
    builder.build().expect("chain is acyclic")
}

#[test]
fn single_node_runs_exactly_once() {
    let trace = Trace::new(1);
    let mut builder = GraphBuilder::new();
    builder.add_job(trace.job(0));

    let mut interpreter = QueueInterpreter::new(1);
    install(&mut interpreter, builder.build().unwrap());
    assert_eq!(interpreter.used_helper_threads(), 0);

    run_tick(&interpreter);
    assert_eq!(trace.run_count(0), 1);
    assert_eq!(trace.node_order(), vec![0]);
}

#[test]
fn linear_chain_runs_in_order_on_the_master() {
    let trace = Trace::new(4);
    let mut interpreter = QueueInterpreter::new(1);
    install(&mut interpreter, chain_graph(&trace));

    run_tick(&interpreter);

    assert_eq!(trace.node_order(), vec![0, 1, 2, 3]);
    // Single-threaded, the whole chain stays on worker 0 via the direct
    // successor handoff.
    let order = trace.order.lock().unwrap();
    assert!(order.iter().all(|&(_, worker)| worker == 0));
}

#[test]
fn linear_chain_stays_ordered_with_spare_workers() {
    let trace = Trace::new(4);
    let mut interpreter = QueueInterpreter::new(4);
    install(&mut interpreter, chain_graph(&trace));
    assert_eq!(interpreter.used_helper_threads(), 3);

    run_tick(&interpreter);

    // A chain admits no parallelism: spare workers spin, order is fixed.
    assert_eq!(trace.node_order(), vec![0, 1, 2, 3]);
}

#[derive(Debug, Clone, Copy)]
enum DiamondRole {
    Source,
    Branch,
    Join,
}

#[derive(Debug)]
struct DiamondJob {
    role: DiamondRole,
    branches_done: Arc<AtomicUsize>,
    seen_at_join: Arc<AtomicUsize>,
}

impl Job for DiamondJob {
    fn run(&mut self, _worker: WorkerIndex) {
        // Relaxed on purpose: the cross-thread visibility is the
        // scheduler's promise, not this test job's.
        match self.role {
            DiamondRole::Source => {}
            DiamondRole::Branch => {
                self.branches_done.fetch_add(1, Ordering::Relaxed);
            }
            DiamondRole::Join => {
                self.seen_at_join
                    .store(self.branches_done.load(Ordering::Relaxed), Ordering::Relaxed);
            }
        }
    }
}

#[test]
fn diamond_join_observes_both_branches() {
    //   A
    //  / \
    // B   C
    //  \ /
    //   D
    let branches_done = Arc::new(AtomicUsize::new(0));
    let seen_at_join = Arc::new(AtomicUsize::new(0));
    let job = |role| DiamondJob {
        role,
        branches_done: Arc::clone(&branches_done),
        seen_at_join: Arc::clone(&seen_at_join),
    };

    let mut builder = GraphBuilder::new();
    let a = builder.add_job(job(DiamondRole::Source));
    let b = builder.add_job(job(DiamondRole::Branch));
    let c = builder.add_job(job(DiamondRole::Branch));
    let d = builder.add_job(job(DiamondRole::Join));
    builder.add_dependency(a, b);
    builder.add_dependency(a, c);
    builder.add_dependency(b, d);
    builder.add_dependency(c, d);

    let mut interpreter = QueueInterpreter::new(2);
    install(&mut interpreter, builder.build().unwrap());
    assert_eq!(interpreter.used_helper_threads(), 1);

    for _ in 0..100 {
        run_tick(&interpreter);
        assert_eq!(seen_at_join.load(Ordering::Relaxed), 2);
        branches_done.store(0, Ordering::Relaxed);
    }
}

#[derive(Debug)]
struct FanoutJob {
    is_root: bool,
    root_done: Arc<AtomicBool>,
    children_after_root: Arc<AtomicUsize>,
}

impl Job for FanoutJob {
    fn run(&mut self, _worker: WorkerIndex) {
        if self.is_root {
            self.root_done.store(true, Ordering::Relaxed);
        } else if self.root_done.load(Ordering::Relaxed) {
            self.children_after_root.fetch_add(1, Ordering::Relaxed);
        }
    }
}

#[test]
fn wide_fanout_runs_every_child_after_the_root() {
    const CHILDREN: usize = 100;

    let root_done = Arc::new(AtomicBool::new(false));
    let children_after_root = Arc::new(AtomicUsize::new(0));
    let job = |is_root| FanoutJob {
        is_root,
        root_done: Arc::clone(&root_done),
        children_after_root: Arc::clone(&children_after_root),
    };

    let mut builder = GraphBuilder::new();
    let root = builder.add_job(job(true));
    for _ in 0..CHILDREN {
        let child = builder.add_job(job(false));
        builder.add_dependency(root, child);
    }

    let mut interpreter = QueueInterpreter::new(8);
    install(&mut interpreter, builder.build().unwrap());
    assert_eq!(interpreter.used_helper_threads(), 7);

    run_tick(&interpreter);
    assert_eq!(children_after_root.load(Ordering::Relaxed), CHILDREN);
}

#[test]
fn init_tick_without_graph_is_refused() {
    let interpreter = QueueInterpreter::<TraceJob>::new(2);
    assert!(!interpreter.init_tick());
    assert_eq!(interpreter.total_node_count(), 0);
}

#[test]
fn empty_graph_is_refused() {
    let mut interpreter = QueueInterpreter::<TraceJob>::new(2);
    install(&mut interpreter, GraphBuilder::new().build().unwrap());
    assert_eq!(interpreter.used_helper_threads(), 0);
    assert!(!interpreter.init_tick());
}

#[test]
fn repeated_ticks_run_every_node_exactly_once() {
    const TICKS: usize = 1000;

    let trace = Trace::new(4);
    let mut interpreter = QueueInterpreter::new(4);
    install(&mut interpreter, chain_graph(&trace));

    for tick in 1..=TICKS {
        run_tick(&interpreter);
        for node in 0..4 {
            assert_eq!(trace.run_count(node), tick);
        }
    }
}

#[test]
fn install_and_release_round_trip() {
    let trace = Trace::new(3);

    let mut graph_a = GraphBuilder::new();
    graph_a.add_job(trace.job(0));
    let mut graph_b = GraphBuilder::new();
    graph_b.add_job(trace.job(1));
    graph_b.add_job(trace.job(2));

    let mut interpreter = QueueInterpreter::new(2);
    assert!(interpreter
        .install_queue(Box::new(graph_a.build().unwrap()))
        .is_none());
    let previous = interpreter
        .install_queue(Box::new(graph_b.build().unwrap()))
        .expect("graph A must come back out");
    assert_eq!(previous.total_node_count(), 1);

    let released = interpreter.release_queue().expect("graph B is installed");
    assert_eq!(released.total_node_count(), 2);

    // Back to the pre-install state: nothing installed, nothing runnable.
    assert!(interpreter.release_queue().is_none());
    assert!(!interpreter.init_tick());
    assert_eq!(interpreter.total_node_count(), 0);
}

fn noop(_worker: WorkerIndex) {}

#[test]
fn helper_count_follows_graph_and_thread_count() {
    let mut interpreter = QueueInterpreter::new(8);
    assert_eq!(interpreter.thread_count(), 8);

    // Fewer nodes than workers: only as many helpers as can be busy.
    let mut small = GraphBuilder::new();
    for _ in 0..3 {
        small.add_job(noop);
    }
    interpreter.install_queue(Box::new(small.build().unwrap()));
    assert_eq!(interpreter.used_helper_threads(), 2);

    // Thread-count changes apply at the next install, not immediately.
    interpreter.set_thread_count(2);
    assert_eq!(interpreter.used_helper_threads(), 2);
    let mut wide = GraphBuilder::new();
    for _ in 0..16 {
        wide.add_job(noop);
    }
    interpreter.install_queue(Box::new(wide.build().unwrap()));
    assert_eq!(interpreter.used_helper_threads(), 1);

    // Zero is clamped to a lone master.
    interpreter.set_thread_count(0);
    assert_eq!(interpreter.thread_count(), 1);
}

#[test]
fn hand_built_graph_runs_like_a_built_one() {
    // Same chain as `chain_graph`, constructed through the low-level
    // surface: explicit successor lists and in-degrees.
    let trace = Trace::new(4);
    let mut graph = DspGraph::new();
    let first = graph.add_node(trace.job(0), vec![1], 0);
    graph.add_node(trace.job(1), vec![2], 1);
    graph.add_node(trace.job(2), vec![3], 1);
    graph.add_node(trace.job(3), Vec::new(), 1);
    graph.add_initially_runnable(first);
    assert_eq!(graph.total_node_count(), 4);

    let mut interpreter = QueueInterpreter::new(1);
    install(&mut interpreter, graph);
    run_tick(&interpreter);
    assert_eq!(trace.node_order(), vec![0, 1, 2, 3]);
}

#[test]
fn builder_rejects_cycles() {
    let mut builder = GraphBuilder::new();
    let a = builder.add_job(noop);
    let b = builder.add_job(noop);
    let c = builder.add_job(noop);
    builder.add_dependency(a, b);
    builder.add_dependency(b, c);
    builder.add_dependency(c, a);
    assert_eq!(builder.build().unwrap_err(), GraphBuildError::Cycle);
}

#[test]
fn duplicate_dependencies_collapse() {
    let trace = Trace::new(2);
    let mut builder = GraphBuilder::new();
    let a = builder.add_job(trace.job(0));
    let b = builder.add_job(trace.job(1));
    builder.add_dependency(a, b);
    builder.add_dependency(a, b);

    let mut interpreter = QueueInterpreter::new(1);
    install(&mut interpreter, builder.build().unwrap());

    run_tick(&interpreter);
    assert_eq!(trace.node_order(), vec![0, 1]);
}

#[test]
fn pool_drives_ticks_to_completion() {
    const CHILDREN: usize = 32;
    const TICKS: usize = 100;

    let trace = Trace::new(1 + CHILDREN);
    let mut builder = GraphBuilder::new();
    let root = builder.add_job(trace.job(0));
    for node in 1..=CHILDREN {
        let child = builder.add_job(trace.job(node));
        builder.add_dependency(root, child);
    }

    let mut pool = DspThreadPool::new(QueueInterpreter::new(4));
    assert!(!pool.run_tick(), "no graph installed yet");

    assert!(pool.install_queue(Box::new(builder.build().unwrap())).is_none());
    assert_eq!(pool.used_helper_threads(), 3);

    for _ in 0..TICKS {
        assert!(pool.run_tick());
    }
    for node in 0..=CHILDREN {
        assert_eq!(trace.run_count(node), TICKS);
    }

    let released = pool.release_queue().expect("graph is installed");
    assert_eq!(released.total_node_count(), 1 + CHILDREN as u16);
    assert!(!pool.run_tick(), "nothing installed after release");
}
