//! Monotonic wall-clock budget shared by every segment of one call.

use std::time::{Duration, Instant};
use thiserror::Error;

/// Raised by graph construction and search when the budget runs out.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("process-time budget exhausted")]
pub struct DeadlineReached;

#[derive(Debug, Clone, Copy)]
pub struct Deadline {
    started: Instant,
    /// `None` when the budget overflows the clock.
    expires_at: Option<Instant>,
}

impl Deadline {
    pub fn start(budget: Duration) -> Self {
        let started = Instant::now();
        Self {
            started,
            expires_at: started.checked_add(budget),
        }
    }

    /// A deadline for a worker dispatched now: the budget left on this one.
    ///
    /// The expiry instant is unchanged, so workers can never outlive the call.
    pub fn for_worker(&self) -> Self {
        Self {
            started: Instant::now(),
            expires_at: self.expires_at,
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    pub fn remaining(&self) -> Duration {
        match self.expires_at {
            Some(at) => at.saturating_duration_since(Instant::now()),
            None => Duration::MAX,
        }
    }

    pub fn expired(&self) -> bool {
        self.expires_at.is_some_and(|at| Instant::now() >= at)
    }

    pub fn check(&self) -> Result<(), DeadlineReached> {
        if self.expired() {
            Err(DeadlineReached)
        } else {
            Ok(())
        }
    }
}

/// Polls a deadline every `interval` ticks so hot loops skip most clock reads.
#[derive(Debug)]
pub struct DeadlinePoll<'a> {
    deadline: &'a Deadline,
    interval: usize,
    ticks: usize,
}

impl<'a> DeadlinePoll<'a> {
    pub fn new(deadline: &'a Deadline, interval: usize) -> Self {
        Self {
            deadline,
            interval: interval.max(1),
            ticks: 0,
        }
    }

    pub fn tick(&mut self) -> Result<(), DeadlineReached> {
        self.ticks += 1;
        if self.ticks % self.interval == 0 {
            self.deadline.check()
        } else {
            Ok(())
        }
    }
}
