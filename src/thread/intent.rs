//! # Summary
//!
//! Simulates a process deciding at unpredictable times that it wants the
//! critical section. Every `interval` the generator draws a number from
//! `0..range`; drawing `want` raises the member's intent and ends the
//! generator. The token handler starts a fresh one after the next critical
//! section completes, so at most one request is ever pending.

use std::time::Duration;

use rand::{Rng, SeedableRng};
use rand::rngs::SmallRng;
use tokio::task::JoinHandle;
use tokio::time;

use crate::event::{Event, Observer};
use crate::state::Intent;

/// Timing and odds of the intent generator.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Schedule {
    /// Delay between draws
    pub interval: Duration,

    /// Draws are uniform over `0..range`
    pub range: u32,

    /// Draw that raises the intent
    pub want: u32,
}

impl Default for Schedule {
    fn default() -> Self {
        Schedule {
            interval: Duration::from_secs(5),
            range: 6,
            want: 3,
        }
    }
}

impl Schedule {
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn with_odds(mut self, range: u32, want: u32) -> Self {
        self.range = range.max(1);
        self.want = want;
        self
    }
}

pub struct Generator {
    id: usize,
    intent: Intent,
    schedule: Schedule,
    observer: Observer,
    rng: SmallRng,
}

impl Generator {
    pub fn new(id: usize, intent: Intent, schedule: Schedule, observer: Observer) -> Self {
        Generator {
            id,
            intent,
            schedule,
            observer,
            rng: SmallRng::from_entropy(),
        }
    }

    /// Replaces the entropy-seeded generator with a reproducible one.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = SmallRng::seed_from_u64(seed);
        self
    }

    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    /// Draws until the intent is raised.
    pub async fn run(mut self) {
        let range = self.schedule.range.max(1);
        loop {
            time::sleep(self.schedule.interval).await;
            if self.rng.gen_range(0..range) == self.schedule.want {
                info!("{} wants to enter critical section", self.id);
                self.intent.raise();
                self.observer.emit(Event::Wanted {
                    id: self.id,
                    at: time::Instant::now(),
                });
                return
            }
        }
    }
}
