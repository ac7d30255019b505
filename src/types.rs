//! Core types for the agreement protocol.
//!
//! Defines the task/proposal data model, the message envelope exchanged
//! between replicas, and the per-replica phase state machine.

use {
    serde::{Deserialize, Serialize},
    sha2::{Digest as _, Sha256},
    std::fmt,
};

/// Opaque identifier for a replica. Replicas are addressed by this string,
/// never by network address — delivery is the network's job.
pub type ReplicaId = String;

// ---------------------------------------------------------------------------
// Task / proposal
// ---------------------------------------------------------------------------

/// An input task handed to the engine for one round of agreement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub content: String,
    pub task_type: Option<String>,
}

impl Task {
    pub fn new(id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            content: content.into(),
            task_type: None,
        }
    }
}

/// The primary's proposed answer to a task, along with its own reasoning.
/// Immutable once produced by [`crate::evaluator::Evaluator::propose`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Proposal {
    pub task_id: String,
    pub task_content: String,
    pub leader_id: ReplicaId,
    pub reasoning: Vec<String>,
    pub answer: String,
    pub confidence: f64,
    pub timestamp_ms: i64,
    pub specialty_tag: Option<String>,
}

/// A replica's verdict on a proposal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Decision {
    Yes,
    No,
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Decision::Yes => write!(f, "Y"),
            Decision::No => write!(f, "N"),
        }
    }
}

/// A vote cast by a replica after evaluating a proposal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Vote {
    pub decision: Decision,
    pub confidence: f64,
    pub reason: String,
}

// ---------------------------------------------------------------------------
// Digest
// ---------------------------------------------------------------------------

/// A short fingerprint binding a message to its (view, sequence, sender,
/// timestamp). Deliberately does not fold in the proposal body: two
/// proposals from the same sender at the same (view, sequence,
/// timestamp_ms) collide by construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Digest(pub [u8; 8]);

impl Digest {
    pub fn compute(view: u64, sequence: u64, sender: &str, timestamp_ms: i64) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(view.to_le_bytes());
        hasher.update(sequence.to_le_bytes());
        hasher.update(sender.as_bytes());
        hasher.update(timestamp_ms.to_le_bytes());
        let full = hasher.finalize();
        let mut bytes = [0u8; 8];
        bytes.copy_from_slice(&full[..8]);
        Digest(bytes)
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for b in &self.0 {
            write!(f, "{:02x}", b)?;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Messages
// ---------------------------------------------------------------------------

/// Messages exchanged between replicas during a round.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Message {
    /// Broadcast by the primary, carrying the task and its proposed answer.
    PrePrepare {
        view: u64,
        sequence: u64,
        sender: ReplicaId,
        timestamp_ms: i64,
        digest: Digest,
        proposal: Proposal,
    },

    /// A replica's verdict on the pre-prepared proposal.
    Prepare {
        view: u64,
        sequence: u64,
        sender: ReplicaId,
        timestamp_ms: i64,
        digest: Digest,
        decision: Decision,
        confidence: f64,
        reason: String,
    },

    /// A replica's commit vote, carrying forward its prepare-phase verdict.
    Commit {
        view: u64,
        sequence: u64,
        sender: ReplicaId,
        timestamp_ms: i64,
        digest: Digest,
        decision: Decision,
    },

    /// Reserved: a replica's claim that the current primary is unresponsive.
    /// Modeled so the message kind exists; the engine never constructs or
    /// consumes it — view rotation is a local pacing delay, not a quorum
    /// exchange (see engine module notes).
    ViewChange {
        new_view: u64,
        sender: ReplicaId,
        checkpoint_sequence: u64,
    },

    /// Reserved: the proof a new primary would broadcast to justify a view.
    /// Unused for the same reason as `ViewChange`.
    NewView {
        new_view: u64,
        sender: ReplicaId,
        proof: Vec<ReplicaId>,
    },
}

impl Message {
    pub fn view(&self) -> u64 {
        match self {
            Message::PrePrepare { view, .. }
            | Message::Prepare { view, .. }
            | Message::Commit { view, .. } => *view,
            Message::ViewChange { new_view, .. } | Message::NewView { new_view, .. } => *new_view,
        }
    }

    pub fn sequence(&self) -> Option<u64> {
        match self {
            Message::PrePrepare { sequence, .. }
            | Message::Prepare { sequence, .. }
            | Message::Commit { sequence, .. } => Some(*sequence),
            Message::ViewChange { .. } | Message::NewView { .. } => None,
        }
    }

    pub fn sender(&self) -> &ReplicaId {
        match self {
            Message::PrePrepare { sender, .. }
            | Message::Prepare { sender, .. }
            | Message::Commit { sender, .. }
            | Message::ViewChange { sender, .. }
            | Message::NewView { sender, .. } => sender,
        }
    }

    pub fn digest(&self) -> Option<Digest> {
        match self {
            Message::PrePrepare { digest, .. }
            | Message::Prepare { digest, .. }
            | Message::Commit { digest, .. } => Some(*digest),
            Message::ViewChange { .. } | Message::NewView { .. } => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Replica phase state
// ---------------------------------------------------------------------------

/// The phase a replica occupies within a single round. Monotonic within a
/// round; reset to `Idle` at the start of every attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ReplicaPhase {
    Idle,
    PrePrepared,
    Prepared,
    Committed,
}

impl fmt::Display for ReplicaPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReplicaPhase::Idle => write!(f, "Idle"),
            ReplicaPhase::PrePrepared => write!(f, "PrePrepared"),
            ReplicaPhase::Prepared => write!(f, "Prepared"),
            ReplicaPhase::Committed => write!(f, "Committed"),
        }
    }
}
