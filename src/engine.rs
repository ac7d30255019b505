//! The core agreement engine.
//!
//! Drives the three-phase protocol — PRE-PREPARE, PREPARE, COMMIT — over a
//! fixed replica set, each replica backed by an [`Evaluator`]. Per-replica
//! PREPARE votes run as concurrent tasks, joined against the phase
//! deadline plus a bounded grace window for late arrivals. Any round
//! failure rotates the view after a short pacing delay and retries, up to
//! the configured retry budget.

use {
    crate::{
        config::EngineConfig,
        error::EngineError,
        evaluator::Evaluator,
        latency::LatencyTracker,
        network::SimulatedNetwork,
        replica_set::{primary_for_view, ReplicaSet},
        types::{Decision, Digest, Message, Proposal, ReplicaId, ReplicaPhase, Task, Vote},
    },
    log::*,
    serde::{Deserialize, Serialize},
    std::{
        collections::{HashMap, HashSet},
        sync::Arc,
        time::Duration,
    },
    tokio::task::JoinSet,
};

/// Per-replica message log for a single round, keyed by sequence
/// implicitly (the engine only ever tracks the in-flight round).
#[derive(Debug, Default, Clone)]
pub struct MessageLog {
    pub pre_prepare: Option<Message>,
    pub prepares: HashMap<ReplicaId, Message>,
    pub commits: HashMap<ReplicaId, Message>,
}

/// One replica: an evaluator wrapped with its own phase state and log.
/// Never initiates a phase; only services the engine's instructions.
struct Replica {
    id: ReplicaId,
    evaluator: Arc<dyn Evaluator>,
    phase: ReplicaPhase,
    log: MessageLog,
}

impl Replica {
    fn reset(&mut self) {
        self.phase = ReplicaPhase::Idle;
        self.log = MessageLog::default();
    }
}

/// Cumulative statistics across every round run by an engine instance.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EngineStats {
    pub rounds_succeeded: u64,
    pub rounds_failed: u64,
    pub view_changes_seen: u64,
    pub messages_sent: u64,
    pub n: usize,
    pub f: usize,
    pub current_view: u64,
}

impl EngineStats {
    pub fn success_rate(&self) -> f64 {
        let total = self.rounds_succeeded + self.rounds_failed;
        if total == 0 {
            1.0
        } else {
            self.rounds_succeeded as f64 / total as f64
        }
    }
}

/// Per-phase latency, reported only when [`EngineConfig::enable_latency`]
/// is set.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LatencyReport {
    pub pre_prepare_latency: Option<Duration>,
    pub prepare_latency: Option<Duration>,
    pub commit_latency: Option<Duration>,
    pub total: Duration,
}

/// The outcome of one call to [`ConsensusEngine::run`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoundResult {
    pub success: bool,
    pub answer: Option<String>,
    pub decision: Decision,
    pub view_changes: u32,
    pub sequence: u64,
    pub phases_completed: Vec<ReplicaPhase>,
    pub latency_report: Option<LatencyReport>,
    pub reason: Option<String>,
}

impl RoundResult {
    fn failure(decision: Decision, view_changes: u32, sequence: u64, phases: Vec<ReplicaPhase>, reason: String) -> Self {
        Self {
            success: false,
            answer: None,
            decision,
            view_changes,
            sequence,
            phases_completed: phases,
            latency_report: None,
            reason: Some(reason),
        }
    }
}

/// Drives the three-phase protocol for a fixed set of evaluator-backed
/// replicas over a simulated network.
pub struct ConsensusEngine {
    config: EngineConfig,
    replica_set: ReplicaSet,
    replicas: Vec<Replica>,
    network: SimulatedNetwork,
    current_view: u64,
    next_sequence: u64,
    stats: EngineStats,
}

impl ConsensusEngine {
    pub fn new(
        members: Vec<(ReplicaId, Arc<dyn Evaluator>)>,
        network: SimulatedNetwork,
        config: EngineConfig,
    ) -> Self {
        let ids: Vec<ReplicaId> = members.iter().map(|(id, _)| id.clone()).collect();
        let replica_set = ReplicaSet::new(ids);
        let f = config.f_override.unwrap_or_else(|| replica_set.f());
        let n = replica_set.len();
        let replicas = members
            .into_iter()
            .map(|(id, evaluator)| Replica {
                id,
                evaluator,
                phase: ReplicaPhase::Idle,
                log: MessageLog::default(),
            })
            .collect();

        Self {
            stats: EngineStats {
                n,
                f,
                current_view: 0,
                ..Default::default()
            },
            config,
            replica_set,
            replicas,
            network,
            current_view: 0,
            next_sequence: 0,
        }
    }

    pub fn stats(&self) -> EngineStats {
        let mut stats = self.stats.clone();
        stats.current_view = self.current_view;
        stats
    }

    fn f(&self) -> usize {
        self.config.f_override.unwrap_or_else(|| self.replica_set.f())
    }

    /// Votes needed to declare a Y verdict: `2f+1`, matching
    /// [`ReplicaSet::commit_quorum`] but computed against `self.f()` so a
    /// configured `f_override` is honored.
    fn commit_quorum(&self) -> usize {
        2 * self.f() + 1
    }

    fn reject_threshold(&self) -> usize {
        self.f() + 1
    }

    fn reset_round(&mut self) {
        for replica in &mut self.replicas {
            replica.reset();
        }
    }

    /// Run one full round of agreement over `task`, retrying with view
    /// rotation up to `config.max_retries` times.
    pub async fn run(&mut self, task: &Task) -> RoundResult {
        let mut view_changes: u32 = 0;

        loop {
            self.reset_round();
            let sequence = self.next_sequence;
            self.next_sequence += 1;
            let view = self.current_view;

            let mut latency = self.config.enable_latency.then(LatencyTracker::new);

            match self.run_attempt(task, view, sequence, latency.as_mut()).await {
                Ok(mut result) => {
                    result.view_changes = view_changes;
                    self.stats.rounds_succeeded += 1;
                    return result;
                }
                Err(err) => {
                    warn!("round failed at view {view}: {err}");
                    self.stats.rounds_failed += 1;

                    if view_changes >= self.config.max_retries {
                        return RoundResult::failure(
                            Decision::No,
                            view_changes,
                            sequence,
                            vec![],
                            EngineError::MaxRetriesExceeded(view_changes).to_string(),
                        );
                    }

                    view_changes += 1;
                    self.stats.view_changes_seen += 1;
                    self.current_view += 1;
                    tokio::time::sleep(self.config.view_change_delay).await;
                }
            }
        }
    }

    async fn run_attempt(
        &mut self,
        task: &Task,
        view: u64,
        sequence: u64,
        mut latency: Option<&mut LatencyTracker>,
    ) -> Result<RoundResult, EngineError> {
        let primary_id = primary_for_view(&self.replica_set, view)
            .ok_or_else(|| EngineError::PrePrepareFailed("empty replica set".to_string()))?;

        // -- PRE-PREPARE --
        let primary_evaluator = self.evaluator_for(&primary_id).clone();
        let timestamp_ms = 0;
        let proposal = primary_evaluator.propose(task).await.map_err(|e| {
            warn!("view {view} seq {sequence}: PRE-PREPARE failed, primary {primary_id} could not propose: {e}");
            EngineError::PrePrepareFailed(e.to_string())
        })?;
        let digest = Digest::compute(view, sequence, &primary_id, timestamp_ms);

        let pre_prepare = Message::PrePrepare {
            view,
            sequence,
            sender: primary_id.clone(),
            timestamp_ms,
            digest,
            proposal: proposal.clone(),
        };

        if let Some(r) = self.replica_by_id_mut(&primary_id) {
            r.phase = ReplicaPhase::PrePrepared;
            r.log.pre_prepare = Some(pre_prepare.clone());
        }

        let backups: Vec<ReplicaId> = self
            .replica_set
            .iter()
            .filter(|id| **id != primary_id)
            .cloned()
            .collect();

        let delivered = self.network.broadcast(&primary_id, Some(&backups));
        self.stats.messages_sent += delivered.len() as u64;
        debug!(
            "view {view} seq {sequence}: PRE-PREPARE from {primary_id} delivered to {}/{}",
            delivered.len(),
            backups.len()
        );

        if let Some(l) = latency.as_deref_mut() {
            l.phase_started(ReplicaPhase::PrePrepared, Duration::ZERO);
            l.record_quorum_arrival(ReplicaPhase::PrePrepared, Duration::ZERO);
        }

        // -- PREPARE --
        let prepare_votes = self
            .collect_prepare_votes(&proposal, &delivered, view, sequence, digest, latency.as_deref_mut())
            .await;

        for (id, vote) in &prepare_votes {
            if let Some(r) = self.replica_by_id_mut(id) {
                r.phase = ReplicaPhase::Prepared;
                r.log.prepares.insert(
                    id.clone(),
                    Message::Prepare {
                        view,
                        sequence,
                        sender: id.clone(),
                        timestamp_ms,
                        digest,
                        decision: vote.decision,
                        confidence: vote.confidence,
                        reason: vote.reason.clone(),
                    },
                );
            }
        }

        let y_votes = prepare_votes
            .iter()
            .filter(|(_, v)| v.decision == Decision::Yes)
            .count();
        let n_votes = prepare_votes
            .iter()
            .filter(|(_, v)| v.decision == Decision::No)
            .count();

        let verdict = if y_votes >= self.commit_quorum() {
            debug!("view {view} seq {sequence}: PREPARE reached Y quorum ({y_votes}/{})", self.commit_quorum());
            Decision::Yes
        } else if n_votes >= self.reject_threshold() {
            warn!("view {view} seq {sequence}: PREPARE rejected ({n_votes}/{} N votes)", self.reject_threshold());
            return Err(EngineError::ProposalRejected);
        } else {
            warn!("view {view} seq {sequence}: PREPARE quorum not reached (y={y_votes} n={n_votes})");
            return Err(EngineError::QuorumNotReached);
        };

        // -- COMMIT: carries forward the PREPARE verdict, not re-decided --
        let mut commit_participants: HashSet<ReplicaId> =
            prepare_votes.iter().map(|(id, _)| id.clone()).collect();
        commit_participants.insert(primary_id.clone());

        let participant_ids: Vec<ReplicaId> = commit_participants.into_iter().collect();
        let delivered_commits = self.network.broadcast(&primary_id, Some(&participant_ids));
        self.stats.messages_sent += delivered_commits.len() as u64;

        let mut committed: HashSet<ReplicaId> = HashSet::new();
        for (id, _delay) in &delivered_commits {
            committed.insert(id.clone());
            if let Some(r) = self.replica_by_id_mut(id) {
                r.phase = ReplicaPhase::Committed;
                r.log.commits.insert(
                    id.clone(),
                    Message::Commit {
                        view,
                        sequence,
                        sender: id.clone(),
                        timestamp_ms,
                        digest,
                        decision: verdict,
                    },
                );
            }
        }

        if let Some(l) = latency.as_deref_mut() {
            l.phase_started(ReplicaPhase::Prepared, Duration::ZERO);
            l.record_quorum_arrival(ReplicaPhase::Prepared, Duration::ZERO);
            l.phase_started(ReplicaPhase::Committed, Duration::ZERO);
            l.record_quorum_arrival(ReplicaPhase::Committed, Duration::ZERO);
        }

        if committed.len() < self.commit_quorum() {
            warn!(
                "view {view} seq {sequence}: COMMIT quorum not reached ({}/{})",
                committed.len(),
                self.commit_quorum()
            );
            return Err(EngineError::QuorumNotReached);
        }

        debug!("view {view} seq {sequence}: COMMIT reached, round succeeded");

        let latency_report = latency.map(|l| LatencyReport {
            pre_prepare_latency: l.phase_latency(ReplicaPhase::PrePrepared),
            prepare_latency: l.phase_latency(ReplicaPhase::Prepared),
            commit_latency: l.phase_latency(ReplicaPhase::Committed),
            total: l.total_latency(),
        });

        Ok(RoundResult {
            success: true,
            answer: Some(proposal.answer),
            decision: verdict,
            view_changes: 0,
            sequence,
            phases_completed: vec![
                ReplicaPhase::PrePrepared,
                ReplicaPhase::Prepared,
                ReplicaPhase::Committed,
            ],
            latency_report,
            reason: None,
        })
    }

    async fn collect_prepare_votes(
        &self,
        proposal: &Proposal,
        delivered: &[(ReplicaId, Duration)],
        _view: u64,
        _sequence: u64,
        _digest: Digest,
        mut latency: Option<&mut LatencyTracker>,
    ) -> Vec<(ReplicaId, Vote)> {
        let mut joins: JoinSet<(ReplicaId, Duration, Result<Vote, ()>)> = JoinSet::new();

        for (id, delay) in delivered {
            let evaluator = self.evaluator_for(id).clone();
            let proposal = proposal.clone();
            let id = id.clone();
            let delay = *delay;
            joins.spawn(async move {
                tokio::time::sleep(delay).await;
                let vote = evaluator.validate(&proposal).await.map_err(|_| ());
                (id, delay, vote)
            });
        }

        let deadline = self.config.timeout;
        let grace = self.config.grace_window();
        let mut votes = Vec::new();

        let deadline_result = tokio::time::timeout(deadline, drain_some(&mut joins, &mut votes)).await;
        if deadline_result.is_err() {
            // Grace window: admit late arrivals, but they never reopen a
            // tally already declared by the caller.
            let _ = tokio::time::timeout(grace, drain_some(&mut joins, &mut votes)).await;
        }

        if let Some(l) = latency.as_deref_mut() {
            for (id, delay, _) in &votes {
                l.record_vote(ReplicaPhase::Prepared, id.clone(), Duration::ZERO, *delay);
            }
        }

        votes
            .into_iter()
            .filter_map(|(id, _, vote)| vote.ok().map(|v| (id, v)))
            .collect()
    }

    fn evaluator_for(&self, id: &str) -> &Arc<dyn Evaluator> {
        self.replicas
            .iter()
            .find(|r| r.id == id)
            .map(|r| &r.evaluator)
            .expect("replica id must belong to this engine's replica set")
    }

    fn replica_by_id_mut(&mut self, id: &str) -> Option<&mut Replica> {
        self.replicas.iter_mut().find(|r| r.id == id)
    }
}

/// Drains every task in `joins` as it completes into `out`, forever — the
/// caller bounds this with a timeout.
async fn drain_some(
    joins: &mut JoinSet<(ReplicaId, Duration, Result<Vote, ()>)>,
    out: &mut Vec<(ReplicaId, Duration, Result<Vote, ()>)>,
) {
    while let Some(res) = joins.join_next().await {
        if let Ok(item) = res {
            out.push(item);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{evaluator::HonestEvaluator, network::SimulatedNetwork};

    fn honest_members(n: usize) -> Vec<(ReplicaId, Arc<dyn Evaluator>)> {
        (0..n)
            .map(|i| {
                let id = format!("r{i}");
                let evaluator: Arc<dyn Evaluator> = Arc::new(HonestEvaluator::new(
                    id.clone(),
                    |task| task.content.clone(),
                    |_p| Vote {
                        decision: Decision::Yes,
                        confidence: 1.0,
                        reason: "agree".to_string(),
                    },
                ));
                (id, evaluator)
            })
            .collect()
    }

    fn ideal_network(ids: &[ReplicaId]) -> SimulatedNetwork {
        let mut net = SimulatedNetwork::ideal();
        for id in ids {
            net.register(id.clone());
        }
        net
    }

    #[tokio::test]
    async fn honest_five_node_round_commits() {
        let members = honest_members(5);
        let ids: Vec<ReplicaId> = members.iter().map(|(id, _)| id.clone()).collect();
        let net = ideal_network(&ids);
        let mut engine = ConsensusEngine::new(members, net, EngineConfig::default());

        let task = Task::new("t1", "2+2");
        let result = engine.run(&task).await;

        assert!(result.success);
        assert_eq!(result.decision, Decision::Yes);
        assert_eq!(result.answer.as_deref(), Some("2+2"));
        assert_eq!(result.view_changes, 0);
    }

    #[tokio::test]
    async fn unresponsive_primary_exhausts_retries() {
        struct AlwaysFails;
        #[async_trait::async_trait]
        impl Evaluator for AlwaysFails {
            async fn propose(&self, _task: &Task) -> Result<Proposal, crate::error::EvaluatorError> {
                Err(crate::error::EvaluatorError::Unavailable("down".to_string()))
            }
            async fn validate(&self, _proposal: &Proposal) -> Result<Vote, crate::error::EvaluatorError> {
                Ok(Vote {
                    decision: Decision::Yes,
                    confidence: 1.0,
                    reason: "n/a".to_string(),
                })
            }
        }

        let members: Vec<(ReplicaId, Arc<dyn Evaluator>)> = (0..4)
            .map(|i| (format!("r{i}"), Arc::new(AlwaysFails) as Arc<dyn Evaluator>))
            .collect();
        let ids: Vec<ReplicaId> = members.iter().map(|(id, _)| id.clone()).collect();
        let net = ideal_network(&ids);
        let mut config = EngineConfig::default();
        config.max_retries = 2;
        config.view_change_delay = Duration::from_millis(1);
        let mut engine = ConsensusEngine::new(members, net, config);

        let task = Task::new("t1", "2+2");
        let result = engine.run(&task).await;

        // Every replica fails to propose when acting as primary, so the
        // round exhausts its retry budget regardless of view rotation.
        assert!(!result.success);
        assert_eq!(result.decision, Decision::No);
    }

    #[tokio::test]
    async fn stats_report_replica_counts() {
        let members = honest_members(4);
        let ids: Vec<ReplicaId> = members.iter().map(|(id, _)| id.clone()).collect();
        let net = ideal_network(&ids);
        let engine = ConsensusEngine::new(members, net, EngineConfig::default());
        let stats = engine.stats();
        assert_eq!(stats.n, 4);
        assert_eq!(stats.f, 1);
    }

    #[tokio::test]
    async fn round_result_and_stats_round_trip_through_json() {
        let members = honest_members(4);
        let ids: Vec<ReplicaId> = members.iter().map(|(id, _)| id.clone()).collect();
        let net = ideal_network(&ids);
        let mut engine = ConsensusEngine::new(members, net, EngineConfig::default());

        let result = engine.run(&Task::new("t1", "2+2")).await;
        let encoded = serde_json::to_string(&result).expect("RoundResult must serialize");
        let decoded: RoundResult =
            serde_json::from_str(&encoded).expect("RoundResult must deserialize");
        assert_eq!(decoded.success, result.success);
        assert_eq!(decoded.sequence, result.sequence);

        let stats = engine.stats();
        let encoded_stats = serde_json::to_string(&stats).expect("EngineStats must serialize");
        let decoded_stats: EngineStats =
            serde_json::from_str(&encoded_stats).expect("EngineStats must deserialize");
        assert_eq!(decoded_stats.n, stats.n);
    }
}
