//! Replica registry and primary selection.
//!
//! Replaces stake-weighted proposer selection with the protocol's plain
//! round-robin rule: every replica agrees on the primary for a view from
//! the view number and replica count alone.

use crate::types::ReplicaId;

/// An ordered, fixed set of replica identifiers.
///
/// Order is insertion order and is load-bearing: primary selection is a
/// pure function of `(view, len)` indexing into this order, so every
/// replica must construct the set with the same ordering.
#[derive(Debug, Clone)]
pub struct ReplicaSet {
    ids: Vec<ReplicaId>,
}

impl ReplicaSet {
    pub fn new(ids: Vec<ReplicaId>) -> Self {
        Self { ids }
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.ids.iter().any(|r| r == id)
    }

    pub fn get(&self, index: usize) -> Option<&ReplicaId> {
        self.ids.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ReplicaId> {
        self.ids.iter()
    }

    /// Maximum tolerated faulty replicas: `(n - 1) / 3`, integer division.
    pub fn f(&self) -> usize {
        self.ids.len().saturating_sub(1) / 3
    }

    /// Votes needed, beyond the primary's own, to reach the PREPARE quorum.
    pub fn prepare_quorum(&self) -> usize {
        2 * self.f()
    }

    /// Votes needed to declare a Y verdict and progress.
    pub fn commit_quorum(&self) -> usize {
        2 * self.f() + 1
    }

    /// Votes needed to declare an N verdict and abort the round.
    pub fn reject_threshold(&self) -> usize {
        self.f() + 1
    }
}

/// The primary for a given view: `replicas[view mod n]`.
pub fn primary_for_view(replicas: &ReplicaSet, view: u64) -> Option<ReplicaId> {
    if replicas.is_empty() {
        return None;
    }
    let index = (view % replicas.len() as u64) as usize;
    replicas.get(index).cloned()
}

/// Whether `id` is the primary for the given view.
pub fn is_primary(replicas: &ReplicaSet, id: &str, view: u64) -> bool {
    primary_for_view(replicas, view)
        .map(|p| p == id)
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(n: usize) -> Vec<ReplicaId> {
        (0..n).map(|i| format!("r{i}")).collect()
    }

    #[test]
    fn test_f_and_quorums_for_four_replicas() {
        let rs = ReplicaSet::new(ids(4));
        assert_eq!(rs.f(), 1);
        assert_eq!(rs.prepare_quorum(), 2);
        assert_eq!(rs.commit_quorum(), 3);
        assert_eq!(rs.reject_threshold(), 2);
    }

    #[test]
    fn test_f_and_quorums_for_seven_replicas() {
        let rs = ReplicaSet::new(ids(7));
        assert_eq!(rs.f(), 2);
        assert_eq!(rs.prepare_quorum(), 4);
        assert_eq!(rs.commit_quorum(), 5);
        assert_eq!(rs.reject_threshold(), 3);
    }

    #[test]
    fn test_primary_rotates_with_view() {
        let rs = ReplicaSet::new(ids(4));
        assert_eq!(primary_for_view(&rs, 0), Some("r0".to_string()));
        assert_eq!(primary_for_view(&rs, 1), Some("r1".to_string()));
        assert_eq!(primary_for_view(&rs, 4), Some("r0".to_string()));
        assert_eq!(primary_for_view(&rs, 5), Some("r1".to_string()));
    }

    #[test]
    fn test_primary_deterministic_across_calls() {
        let rs = ReplicaSet::new(ids(5));
        let p1 = primary_for_view(&rs, 17);
        let p2 = primary_for_view(&rs, 17);
        assert_eq!(p1, p2);
    }

    #[test]
    fn test_empty_set_has_no_primary() {
        let rs = ReplicaSet::new(vec![]);
        assert_eq!(primary_for_view(&rs, 0), None);
    }

    #[test]
    fn test_is_primary() {
        let rs = ReplicaSet::new(ids(3));
        assert!(is_primary(&rs, "r0", 0));
        assert!(!is_primary(&rs, "r1", 0));
        assert!(is_primary(&rs, "r1", 1));
    }

    #[test]
    fn test_contains() {
        let rs = ReplicaSet::new(ids(3));
        assert!(rs.contains("r1"));
        assert!(!rs.contains("r9"));
    }
}
