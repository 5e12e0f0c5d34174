// SPDX-License-Identifier: Apache-2.0

pub mod backoff;
pub mod config;
pub mod driver;
pub mod parser;
pub mod pdu;
pub mod progress;
pub mod store;

pub use backoff::BackoffLadder;
pub use config::CaptureConfig;
pub use driver::PollingDriver;
pub use parser::{CaptureLineParser, LineParser, ParseError};
pub use pdu::SubmitSm;
pub use progress::TailProgress;
pub use store::PduStore;
