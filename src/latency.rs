//! Optional per-phase/per-vote timing, for observability only.
//!
//! The tracker is write-only from the engine's perspective: the engine
//! records timestamps as a round progresses but never reads them back to
//! make a decision. Enabled via [`crate::config::EngineConfig::enable_latency`].

use {
    crate::types::{ReplicaId, ReplicaPhase},
    std::{collections::HashMap, time::Duration},
};

#[derive(Debug, Clone, Default)]
struct PhaseRecord {
    start: Option<Duration>,
    votes: Vec<(ReplicaId, Duration, Duration)>, // (sender, sent_at, arrival_at)
    quorum_arrival: Option<Duration>,
}

/// Records phase start times and vote arrival times for one round, and
/// reports the resulting per-phase latencies.
#[derive(Debug, Default)]
pub struct LatencyTracker {
    phases: HashMap<ReplicaPhase, PhaseRecord>,
}

impl LatencyTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn phase_started(&mut self, phase: ReplicaPhase, at: Duration) {
        self.phases.entry(phase).or_default().start = Some(at);
    }

    pub fn record_vote(&mut self, phase: ReplicaPhase, sender: ReplicaId, sent_at: Duration, arrival_at: Duration) {
        self.phases
            .entry(phase)
            .or_default()
            .votes
            .push((sender, sent_at, arrival_at));
    }

    /// Mark the arrival time of the k-th earliest vote of the winning
    /// decision, once a phase's tally has been declared.
    pub fn record_quorum_arrival(&mut self, phase: ReplicaPhase, arrival_at: Duration) {
        self.phases.entry(phase).or_default().quorum_arrival = Some(arrival_at);
    }

    /// `quorum_arrival_time - phase_start`, if both are known.
    pub fn phase_latency(&self, phase: ReplicaPhase) -> Option<Duration> {
        let record = self.phases.get(&phase)?;
        let start = record.start?;
        let arrival = record.quorum_arrival?;
        Some(arrival.saturating_sub(start))
    }

    /// Sum of every recorded phase's latency.
    pub fn total_latency(&self) -> Duration {
        self.phases
            .keys()
            .filter_map(|phase| self.phase_latency(*phase))
            .sum()
    }

    pub fn vote_count(&self, phase: ReplicaPhase) -> usize {
        self.phases.get(&phase).map(|r| r.votes.len()).unwrap_or(0)
    }
}
