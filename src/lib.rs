//! Parallel task-graph executor for per-tick real-time DSP processing.
//!
//! This crate drives the per-tick work of an audio engine across a fixed
//! pool of worker threads. Each tick runs every node of a directed acyclic
//! graph of DSP jobs exactly once, respecting producer→consumer precedence,
//! and returns to the master thread only when the whole graph has been
//! processed. It:
//! - Tracks readiness with a per-node atomic activation count (the node's
//!   remaining unfinished predecessors) decremented by completing
//!   predecessors.
//! - Distributes ready nodes through a bounded lock-free MPMC queue, with a
//!   direct-successor handoff that keeps linear chains on one worker and off
//!   the queue entirely.
//! - Coordinates one master worker (the audio callback thread) with helper
//!   workers through a single remaining-node counter: no locks, no
//!   allocation, and no blocking inside a tick.
//!
//! Key modules:
//! - `job`: the [`Job`](job::Job) trait, the per-node callable invoked
//!   with the index of the executing worker.
//! - `graph`: the per-installation [`DspGraph`](graph::DspGraph) arena and
//!   the [`GraphBuilder`](graph::GraphBuilder) that derives in-degrees and
//!   rejects cyclic graphs.
//! - `interpreter`: the [`QueueInterpreter`](interpreter::QueueInterpreter)
//!   holding the queue lifecycle (install / release), per-tick seeding, and
//!   the master/helper worker loop.
//! - `pool`: a reference [`DspThreadPool`](pool::DspThreadPool) collaborator
//!   that parks helper threads between ticks and wakes just enough of them
//!   per tick.
//!
//! Quick start:
//! 1. Implement [`Job`](job::Job) for your node type (or use a closure).
//! 2. Build a graph: `add_job` every node, `add_dependency` every edge,
//!    `build()`.
//! 3. Hand the graph to a `QueueInterpreter` via `install_queue`, then per
//!    tick run `init_tick` + `tick_master` on the driver thread and
//!    `tick(i)` on each woken helper, or let a `DspThreadPool` do the
//!    thread choreography for you.
//!
//! The executor guarantees that every write performed by a node's job
//! happens-before every read performed by any successor's job, and that a
//! tick ends only when all nodes have run. Scheduling order beyond the
//! graph's precedence is unspecified.

/// The processing graph: node arena, initially-runnable set, and the
/// dependency-declaring builder with cycle detection.
pub mod graph;
/// The runtime executor: graph lifecycle, per-tick state, and the
/// master/helper worker loop.
pub mod interpreter;
/// The per-node job interface.
pub mod job;
/// Reference thread-pool collaborator: parked helper threads, per-tick
/// wake-up, completion collection.
#[cfg(not(feature = "loom"))]
pub mod pool;
/// Common index types used across the crate.
pub mod types;

mod fifo;
mod node;
mod sync;
