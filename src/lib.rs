//! A Byzantine-fault-tolerant agreement engine for evaluator-backed proposals.
//!
//! Implements a PBFT-style three-phase protocol — PRE-PREPARE, PREPARE,
//! COMMIT — adapted so the replicated decision is a Y/N verdict over a
//! primary's proposed answer, not the task payload itself:
//!
//! 1. **PRE-PREPARE** — The primary for the current view proposes an
//!    answer to the task and broadcasts it.
//! 2. **PREPARE** — Every backup replica evaluates the proposal and casts
//!    a Y/N vote, collected concurrently under a phase deadline.
//! 3. **COMMIT** — Replicas that reached a PREPARE verdict carry it
//!    forward rather than re-deciding, and the round commits once enough
//!    of them acknowledge.
//!
//! # Key Properties
//!
//! - **Bounded retries**: a round that fails to reach quorum rotates the
//!   view after a short pacing delay and retries, up to a configured
//!   limit — there is no unbounded liveness guarantee.
//! - **Safety under honest majority**: no two conflicting verdicts can be
//!   declared for the same (view, sequence), as long as fewer than a
//!   third of replicas are faulty.
//! - **Opaque evaluators**: replicas are backed by a pluggable
//!   [`evaluator::Evaluator`] trait, letting callers swap in honest or
//!   adversarial policies without touching the protocol core.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │              ConsensusEngine                 │
//! │  ┌─────────┐  ┌───────────┐  ┌───────────┐  │
//! │  │ Config  │  │ ReplicaSet│  │ Evaluator │  │
//! │  │         │  │           │  │ (per-node)│  │
//! │  └─────────┘  └───────────┘  └───────────┘  │
//! │  ┌─────────────────────────────────────┐    │
//! │  │   per-replica phase + message log   │    │
//! │  └─────────────────────────────────────┘    │
//! │  ┌──────────────┐  ┌───────────────────┐    │
//! │  │ SimulatedNet  │  │ PhaseTimer        │    │
//! │  │ (delay+loss)  │  │ + LatencyTracker  │    │
//! │  └──────────────┘  └───────────────────┘    │
//! └─────────────────────────────────────────────┘
//! ```

pub mod config;
pub mod engine;
pub mod error;
pub mod evaluator;
pub mod latency;
pub mod network;
pub mod replica_set;
pub mod timeout;
pub mod types;

// Re-exports for convenience
pub use config::EngineConfig;
pub use engine::{ConsensusEngine, EngineStats, LatencyReport, RoundResult};
pub use error::{EngineError, EvaluatorError, NetworkError};
pub use evaluator::{
    DeterministicWrongEvaluator, Evaluator, HonestEvaluator, PeerAwareColludingEvaluator,
    RandomEvaluator,
};
pub use latency::LatencyTracker;
pub use network::{NetworkStats, SimulatedNetwork};
pub use replica_set::{is_primary, primary_for_view, ReplicaSet};
pub use timeout::PhaseTimer;
pub use types::{Decision, Digest, Message, Proposal, ReplicaId, ReplicaPhase, Task, Vote};
