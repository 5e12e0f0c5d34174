// SPDX-License-Identifier: Apache-2.0

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use crate::tail::{FileId, ResumePoint, SharedRingWindow, WINDOW_SIZE};

/// Reader position published by the polling driver for other tasks.
#[derive(Debug)]
pub struct TailProgress {
    path: PathBuf,
    offset: AtomicU64,
    file_id: AtomicU64,
    head: SharedRingWindow<u8>,
    tail: SharedRingWindow<u8>,
}

impl TailProgress {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            offset: AtomicU64::new(0),
            file_id: AtomicU64::new(0),
            head: SharedRingWindow::new(WINDOW_SIZE),
            tail: SharedRingWindow::new(WINDOW_SIZE),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn publish(&self, point: &ResumePoint) {
        self.head.replace_with(&point.head);
        self.tail.replace_with(&point.tail);
        self.file_id.store(point.file_id.as_u64(), Ordering::Relaxed);
        self.offset.store(point.offset, Ordering::Release);
    }

    /// The last published point. Fields are published one by one, so a
    /// snapshot taken during a publish may mix two consecutive points.
    pub fn snapshot(&self) -> ResumePoint {
        let offset = self.offset.load(Ordering::Acquire);
        ResumePoint {
            offset,
            file_id: FileId::new(self.file_id.load(Ordering::Relaxed)),
            head: self.head.snapshot(),
            tail: self.tail.snapshot(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_publish_and_snapshot() {
        let progress = TailProgress::new("/var/log/smppsim/capture.log");
        assert_eq!(progress.snapshot(), ResumePoint::default());

        let point = ResumePoint {
            offset: 42,
            file_id: FileId::new(7),
            head: b"head".to_vec(),
            tail: b"tail".to_vec(),
        };
        progress.publish(&point);
        assert_eq!(progress.snapshot(), point);

        let shorter = ResumePoint {
            offset: 3,
            file_id: FileId::new(8),
            head: b"x\n".to_vec(),
            tail: b"x\n".to_vec(),
        };
        progress.publish(&shorter);
        assert_eq!(progress.snapshot(), shorter);
    }
}
