//! Simulated delay-and-loss network.
//!
//! Delivers messages between registered replicas with an independent loss
//! coin per delivery and a uniformly distributed delay. Does not dispatch
//! actively: callers drive the returned arrival times themselves (the
//! engine schedules delivery as a `tokio::time::sleep`, racing it against
//! the phase deadline).

use {
    crate::{error::NetworkError, types::ReplicaId},
    rand::Rng,
    std::{
        collections::HashSet,
        sync::atomic::{AtomicU64, Ordering},
        time::Duration,
    },
};

/// The simulated arrival time of one delivery, expressed as an offset from
/// the send time.
pub type ArrivalTime = Duration;

/// Cumulative counters for a network instance.
#[derive(Debug, Default, Clone, Copy)]
pub struct NetworkStats {
    pub sent: u64,
    pub dropped: u64,
}

impl NetworkStats {
    pub fn delivery_rate(&self) -> f64 {
        if self.sent == 0 {
            1.0
        } else {
            (self.sent - self.dropped) as f64 / self.sent as f64
        }
    }
}

/// A network with configurable, independent per-delivery loss and delay.
pub struct SimulatedNetwork {
    replicas: HashSet<ReplicaId>,
    p_loss: f64,
    delay_min: Duration,
    delay_max: Duration,
    sent: AtomicU64,
    dropped: AtomicU64,
}

impl SimulatedNetwork {
    pub fn new(p_loss: f64, delay_min: Duration, delay_max: Duration) -> Self {
        Self {
            replicas: HashSet::new(),
            p_loss,
            delay_min,
            delay_max,
            sent: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
        }
    }

    /// A network with no loss and zero delay, useful for deterministic tests.
    pub fn ideal() -> Self {
        Self::new(0.0, Duration::ZERO, Duration::ZERO)
    }

    pub fn register(&mut self, replica: ReplicaId) {
        self.replicas.insert(replica);
    }

    pub fn unregister(&mut self, replica: &str) {
        self.replicas.remove(replica);
    }

    pub fn is_registered(&self, replica: &str) -> bool {
        self.replicas.contains(replica)
    }

    /// Broadcast from `sender` to `targets` (or every other registered
    /// replica when `None`). Returns the set of receivers that would
    /// actually receive the message, each with its simulated arrival
    /// offset; replicas hit by the independent loss coin are omitted.
    pub fn broadcast(
        &self,
        sender: &str,
        targets: Option<&[ReplicaId]>,
    ) -> Vec<(ReplicaId, ArrivalTime)> {
        let recipients: Vec<ReplicaId> = match targets {
            Some(ts) => ts.to_vec(),
            None => self
                .replicas
                .iter()
                .filter(|r| r.as_str() != sender)
                .cloned()
                .collect(),
        };

        recipients
            .into_iter()
            .filter_map(|r| self.unicast_delivery(&r))
            .collect()
    }

    /// Deliver to a single receiver, returning its arrival offset unless
    /// the independent loss coin drops the message.
    pub fn unicast(&self, receiver: &str) -> Result<Option<ArrivalTime>, NetworkError> {
        if !self.replicas.contains(receiver) {
            return Err(NetworkError::UnknownReplica(receiver.to_string()));
        }
        Ok(self.unicast_delivery(receiver).map(|(_, d)| d))
    }

    fn unicast_delivery(&self, receiver: &str) -> Option<(ReplicaId, ArrivalTime)> {
        self.sent.fetch_add(1, Ordering::Relaxed);
        let mut rng = rand::rng();
        if rng.random::<f64>() < self.p_loss {
            self.dropped.fetch_add(1, Ordering::Relaxed);
            return None;
        }
        let delay = if self.delay_max > self.delay_min {
            let span = (self.delay_max - self.delay_min).as_secs_f64();
            self.delay_min + Duration::from_secs_f64(rng.random::<f64>() * span)
        } else {
            self.delay_min
        };
        Some((receiver.to_string(), delay))
    }

    pub fn stats(&self) -> NetworkStats {
        NetworkStats {
            sent: self.sent.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
        }
    }

    pub fn reset_stats(&self) {
        self.sent.store(0, Ordering::Relaxed);
        self.dropped.store(0, Ordering::Relaxed);
    }
}
