// SPDX-License-Identifier: Apache-2.0

pub mod encoding;
pub mod error;
pub mod file_id;
pub mod reader;
pub mod ring_window;

pub use encoding::TextEncoding;
pub use error::{RingWindowError, TailError};
pub use file_id::{FileId, FileIdentity, PlatformIdentity};
pub use reader::{ResumePoint, TailingReader, WINDOW_SIZE};
pub use ring_window::{RingWindow, SharedRingWindow};
