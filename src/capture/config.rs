// SPDX-License-Identifier: Apache-2.0

use std::path::PathBuf;
use std::time::Duration;

use crate::tail::{ResumePoint, TextEncoding};

/// Idle delays used when none are configured
pub const DEFAULT_MONITORING_DELAYS: [Duration; 5] = [
    Duration::from_secs(1),
    Duration::from_secs(5),
    Duration::from_secs(10),
    Duration::from_secs(20),
    Duration::from_secs(30),
];

/// Default maximum number of lines read per drain
pub const DEFAULT_BATCH_SIZE: usize = 256;

/// Configuration for tailing a capture file
#[derive(Debug, Clone)]
pub struct CaptureConfig {
    /// Capture file written by the simulator
    pub path: PathBuf,

    /// Encoding assumed when the file has no byte order mark
    pub encoding: TextEncoding,

    /// Delays applied after consecutive drains that found no new lines
    pub monitoring_delays: Vec<Duration>,

    /// Maximum number of lines read by a single drain
    pub batch_size: usize,

    /// Where to continue reading after a restart
    pub resume: Option<ResumePoint>,
}

impl CaptureConfig {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            encoding: TextEncoding::default(),
            monitoring_delays: DEFAULT_MONITORING_DELAYS.to_vec(),
            batch_size: DEFAULT_BATCH_SIZE,
            resume: None,
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.path.as_os_str().is_empty() {
            return Err("Capture file path must not be empty".to_string());
        }

        if self.monitoring_delays.is_empty() {
            return Err("At least one monitoring delay is required".to_string());
        }

        if self.batch_size == 0 {
            return Err("Batch size must be at least 1, got 0".to_string());
        }

        Ok(())
    }

    pub fn with_encoding(mut self, encoding: TextEncoding) -> Self {
        self.encoding = encoding;
        self
    }

    pub fn with_monitoring_delays(mut self, delays: Vec<Duration>) -> Self {
        self.monitoring_delays = delays;
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn with_resume(mut self, resume: ResumePoint) -> Self {
        self.resume = Some(resume);
        self
    }
}
