// SPDX-License-Identifier: Apache-2.0

use std::time::Duration;

use super::config::DEFAULT_MONITORING_DELAYS;

/// Escalating idle delays indexed by the number of consecutive idle cycles.
/// The step is raised before the lookup, so the first idle cycle already
/// waits for the second delay; the last delay repeats once the ladder is
/// exhausted.
#[derive(Debug, Clone)]
pub struct BackoffLadder {
    delays: Vec<Duration>,
    step: usize,
}

impl BackoffLadder {
    /// An empty ladder falls back to the default delays.
    pub fn new(delays: Vec<Duration>) -> Self {
        let delays = if delays.is_empty() {
            DEFAULT_MONITORING_DELAYS.to_vec()
        } else {
            delays
        };
        Self { delays, step: 0 }
    }

    /// Number of consecutive idle cycles.
    pub fn step(&self) -> usize {
        self.step
    }

    pub fn next_delay(&mut self) -> Duration {
        self.step = self.step.saturating_add(1);
        self.delays[self.step.min(self.delays.len() - 1)]
    }

    pub fn reset(&mut self) {
        self.step = 0;
    }
}
