//! The evaluator seam: the opaque, pluggable oracle backing each replica.
//!
//! Production callers implement [`Evaluator`] against a real model or
//! service. This module also ships the fixture policies used by the
//! integration tests and by downstream experiment drivers to model honest
//! and Byzantine replica behavior without standing up a real backend.

use {
    crate::{
        error::EvaluatorError,
        types::{Decision, Proposal, Task, Vote},
    },
    async_trait::async_trait,
    std::collections::HashSet,
};

/// Produces proposals when acting as primary, and verdicts on proposals
/// when acting as a backup. Async because a real implementation is
/// expected to perform I/O (a hosted model call).
#[async_trait]
pub trait Evaluator: Send + Sync {
    async fn propose(&self, task: &Task) -> Result<Proposal, EvaluatorError>;
    async fn validate(&self, proposal: &Proposal) -> Result<Vote, EvaluatorError>;
    async fn health_check(&self) -> bool {
        true
    }
}

type AnswerFn = dyn Fn(&Task) -> String + Send + Sync;
type ValidateFn = dyn Fn(&Proposal) -> Vote + Send + Sync;

/// An honest evaluator: proposes and validates via pluggable closures that
/// stand in for a real model call.
pub struct HonestEvaluator {
    replica_id: String,
    answer_fn: Box<AnswerFn>,
    validate_fn: Box<ValidateFn>,
}

impl HonestEvaluator {
    pub fn new(
        replica_id: impl Into<String>,
        answer_fn: impl Fn(&Task) -> String + Send + Sync + 'static,
        validate_fn: impl Fn(&Proposal) -> Vote + Send + Sync + 'static,
    ) -> Self {
        Self {
            replica_id: replica_id.into(),
            answer_fn: Box::new(answer_fn),
            validate_fn: Box::new(validate_fn),
        }
    }
}

#[async_trait]
impl Evaluator for HonestEvaluator {
    async fn propose(&self, task: &Task) -> Result<Proposal, EvaluatorError> {
        Ok(Proposal {
            task_id: task.id.clone(),
            task_content: task.content.clone(),
            leader_id: self.replica_id.clone(),
            reasoning: vec![format!("derived answer from task {}", task.id)],
            answer: (self.answer_fn)(task),
            confidence: 0.9,
            timestamp_ms: 0,
            specialty_tag: None,
        })
    }

    async fn validate(&self, proposal: &Proposal) -> Result<Vote, EvaluatorError> {
        Ok((self.validate_fn)(proposal))
    }
}

/// A primary that always proposes a fixed wrong answer, optionally keyed
/// by task id, falling back to a default otherwise.
pub struct DeterministicWrongEvaluator {
    replica_id: String,
    per_task_answers: std::collections::HashMap<String, String>,
    default_wrong_answer: String,
}

impl DeterministicWrongEvaluator {
    pub fn new(replica_id: impl Into<String>, default_wrong_answer: impl Into<String>) -> Self {
        Self {
            replica_id: replica_id.into(),
            per_task_answers: std::collections::HashMap::new(),
            default_wrong_answer: default_wrong_answer.into(),
        }
    }

    pub fn with_answer(mut self, task_id: impl Into<String>, answer: impl Into<String>) -> Self {
        self.per_task_answers.insert(task_id.into(), answer.into());
        self
    }
}

#[async_trait]
impl Evaluator for DeterministicWrongEvaluator {
    async fn propose(&self, task: &Task) -> Result<Proposal, EvaluatorError> {
        let answer = self
            .per_task_answers
            .get(&task.id)
            .cloned()
            .unwrap_or_else(|| self.default_wrong_answer.clone());
        Ok(Proposal {
            task_id: task.id.clone(),
            task_content: task.content.clone(),
            leader_id: self.replica_id.clone(),
            reasoning: vec!["fixed answer".to_string()],
            answer,
            confidence: 0.95,
            timestamp_ms: 0,
            specialty_tag: None,
        })
    }

    async fn validate(&self, _proposal: &Proposal) -> Result<Vote, EvaluatorError> {
        Ok(Vote {
            decision: Decision::Yes,
            confidence: 0.5,
            reason: "deterministic-wrong evaluator does not back up".to_string(),
        })
    }
}

/// A backup that votes Y iff the proposal's leader is in its peer set,
/// regardless of the proposal's actual content — models vote-trading
/// collusion among a subset of replicas.
pub struct PeerAwareColludingEvaluator {
    replica_id: String,
    colluding_peers: HashSet<String>,
}

impl PeerAwareColludingEvaluator {
    pub fn new(replica_id: impl Into<String>, colluding_peers: HashSet<String>) -> Self {
        Self {
            replica_id: replica_id.into(),
            colluding_peers,
        }
    }
}

#[async_trait]
impl Evaluator for PeerAwareColludingEvaluator {
    async fn propose(&self, task: &Task) -> Result<Proposal, EvaluatorError> {
        Ok(Proposal {
            task_id: task.id.clone(),
            task_content: task.content.clone(),
            leader_id: self.replica_id.clone(),
            reasoning: vec![],
            answer: task.content.clone(),
            confidence: 0.5,
            timestamp_ms: 0,
            specialty_tag: None,
        })
    }

    async fn validate(&self, proposal: &Proposal) -> Result<Vote, EvaluatorError> {
        let decision = if self.colluding_peers.contains(&proposal.leader_id) {
            Decision::Yes
        } else {
            Decision::No
        };
        Ok(Vote {
            decision,
            confidence: 0.5,
            reason: "peer-aware vote".to_string(),
        })
    }
}

/// A backup that votes uniformly at random, independent of the proposal.
pub struct RandomEvaluator {
    replica_id: String,
}

impl RandomEvaluator {
    pub fn new(replica_id: impl Into<String>) -> Self {
        Self {
            replica_id: replica_id.into(),
        }
    }
}

#[async_trait]
impl Evaluator for RandomEvaluator {
    async fn propose(&self, task: &Task) -> Result<Proposal, EvaluatorError> {
        Ok(Proposal {
            task_id: task.id.clone(),
            task_content: task.content.clone(),
            leader_id: self.replica_id.clone(),
            reasoning: vec![],
            answer: task.content.clone(),
            confidence: 0.5,
            timestamp_ms: 0,
            specialty_tag: None,
        })
    }

    async fn validate(&self, _proposal: &Proposal) -> Result<Vote, EvaluatorError> {
        use rand::Rng;
        let mut rng = rand::rng();
        let decision = if rng.random_bool(0.5) {
            Decision::Yes
        } else {
            Decision::No
        };
        Ok(Vote {
            decision,
            confidence: 0.5,
            reason: "random vote".to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn echo_task() -> Task {
        Task::new("t1", "what is 2+2")
    }

    #[tokio::test]
    async fn honest_evaluator_proposes_from_closure() {
        let evaluator = HonestEvaluator::new(
            "r0",
            |task| format!("answer to {}", task.content),
            |_proposal| Vote {
                decision: Decision::Yes,
                confidence: 1.0,
                reason: "ok".to_string(),
            },
        );
        let proposal = evaluator.propose(&echo_task()).await.unwrap();
        assert_eq!(proposal.answer, "answer to what is 2+2");
        assert_eq!(proposal.leader_id, "r0");
    }

    #[tokio::test]
    async fn deterministic_wrong_evaluator_uses_default() {
        let evaluator = DeterministicWrongEvaluator::new("r1", "4.1");
        let proposal = evaluator.propose(&echo_task()).await.unwrap();
        assert_eq!(proposal.answer, "4.1");
    }

    #[tokio::test]
    async fn deterministic_wrong_evaluator_uses_per_task_override() {
        let evaluator = DeterministicWrongEvaluator::new("r1", "4.1").with_answer("t1", "99");
        let proposal = evaluator.propose(&echo_task()).await.unwrap();
        assert_eq!(proposal.answer, "99");
    }

    #[tokio::test]
    async fn peer_aware_colluding_evaluator_votes_by_peer_set() {
        let mut peers = HashSet::new();
        peers.insert("leader-a".to_string());
        let evaluator = PeerAwareColludingEvaluator::new("r2", peers);

        let friendly = Proposal {
            task_id: "t1".into(),
            task_content: "x".into(),
            leader_id: "leader-a".into(),
            reasoning: vec![],
            answer: "anything".into(),
            confidence: 0.1,
            timestamp_ms: 0,
            specialty_tag: None,
        };
        let vote = evaluator.validate(&friendly).await.unwrap();
        assert_eq!(vote.decision, Decision::Yes);

        let hostile = Proposal {
            leader_id: "leader-b".into(),
            ..friendly
        };
        let vote = evaluator.validate(&hostile).await.unwrap();
        assert_eq!(vote.decision, Decision::No);
    }
}
