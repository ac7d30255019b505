//! Phase deadline tracking.
//!
//! Each phase (PRE-PREPARE, PREPARE, COMMIT) shares the configured
//! [`crate::config::EngineConfig::timeout`], plus a bounded grace window
//! admitted for late-arriving votes before a tally is closed.

use {
    crate::{config::EngineConfig, types::ReplicaPhase},
    std::time::{Duration, Instant},
};

/// Tracks the deadline for the phase currently in flight.
#[derive(Debug)]
pub struct PhaseTimer {
    config: EngineConfig,
    started_at: Option<Instant>,
    active_phase: Option<ReplicaPhase>,
}

impl PhaseTimer {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            started_at: None,
            active_phase: None,
        }
    }

    pub fn start(&mut self, phase: ReplicaPhase) {
        self.started_at = Some(Instant::now());
        self.active_phase = Some(phase);
    }

    pub fn cancel(&mut self) {
        self.started_at = None;
        self.active_phase = None;
    }

    /// The deadline for the phase currently started.
    pub fn deadline(&self) -> Duration {
        self.config.timeout
    }

    /// The grace window appended after the deadline expires.
    pub fn grace_window(&self) -> Duration {
        self.config.grace_window()
    }

    pub fn check_expired(&self) -> Option<ReplicaPhase> {
        let started_at = self.started_at?;
        let phase = self.active_phase?;
        if started_at.elapsed() >= self.deadline() {
            Some(phase)
        } else {
            None
        }
    }

    pub fn remaining(&self) -> Option<Duration> {
        let started_at = self.started_at?;
        self.active_phase?;
        Some(self.deadline().saturating_sub(started_at.elapsed()))
    }

    pub fn active_phase(&self) -> Option<ReplicaPhase> {
        self.active_phase
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread::sleep;

    #[test]
    fn test_no_active_timer() {
        let timer = PhaseTimer::new(EngineConfig::default());
        assert!(timer.check_expired().is_none());
        assert!(timer.remaining().is_none());
    }

    #[test]
    fn test_start_and_cancel() {
        let mut timer = PhaseTimer::new(EngineConfig::default());
        timer.start(ReplicaPhase::Prepared);
        assert_eq!(timer.active_phase(), Some(ReplicaPhase::Prepared));
        timer.cancel();
        assert!(timer.active_phase().is_none());
    }

    #[test]
    fn test_timer_expires() {
        let mut config = EngineConfig::default();
        config.timeout = Duration::from_millis(10);
        let mut timer = PhaseTimer::new(config);
        timer.start(ReplicaPhase::PrePrepared);
        assert!(timer.check_expired().is_none());
        sleep(Duration::from_millis(20));
        assert_eq!(timer.check_expired(), Some(ReplicaPhase::PrePrepared));
    }

    #[test]
    fn test_remaining_decreases() {
        let timer_config = EngineConfig::default();
        let mut timer = PhaseTimer::new(timer_config);
        timer.start(ReplicaPhase::Prepared);
        let r1 = timer.remaining().unwrap();
        sleep(Duration::from_millis(10));
        let r2 = timer.remaining().unwrap();
        assert!(r2 < r1);
    }

    #[test]
    fn test_grace_window_bounded() {
        let mut config = EngineConfig::default();
        config.timeout = Duration::from_secs(60);
        let timer = PhaseTimer::new(config);
        assert_eq!(timer.grace_window(), Duration::from_secs(5));
    }
}
