// SPDX-License-Identifier: Apache-2.0

use crate::capture::CaptureConfig;
use crate::capture::config::DEFAULT_BATCH_SIZE;
use crate::init::parse::{self, HexBytes, MonitoringDelays};
use crate::tail::{FileId, ResumePoint, TextEncoding};
use clap::{Args, ValueEnum};
use std::net::SocketAddr;
use std::path::PathBuf;

#[derive(Debug, Args, Clone)]
pub struct CatcherArgs {
    /// Capture file written by the SMPP simulator
    #[arg(long, env = "SMPPSIM_CATCHER_CAPTURE_FILE")]
    pub capture_file: PathBuf,

    /// Encoding used when the capture file has no byte order mark
    #[arg(
        value_enum,
        long,
        env = "SMPPSIM_CATCHER_ENCODING",
        default_value = "utf8"
    )]
    pub encoding: EncodingArg,

    /// Comma-separated delays applied after consecutive idle polls (hh:mm:ss[.fff], <n>ms or <n>s)
    #[arg(
        long,
        env = "SMPPSIM_CATCHER_MONITORING_DELAYS",
        default_value = "00:00:01,00:00:05,00:00:10,00:00:20,00:00:30",
        value_parser = parse::parse_delays
    )]
    pub monitoring_delays: MonitoringDelays,

    /// Maximum number of lines read per poll
    #[arg(long, env = "SMPPSIM_CATCHER_BATCH_SIZE", default_value_t = DEFAULT_BATCH_SIZE)]
    pub batch_size: usize,

    /// Query endpoint
    #[arg(long, env = "SMPPSIM_CATCHER_QUERY_ENDPOINT", default_value = "localhost:5000", value_parser = parse::parse_endpoint)]
    pub query_endpoint: SocketAddr,

    #[command(flatten)]
    pub resume: ResumeArgs,
}

/// Where to continue reading after a restart, as reported by `/status`
#[derive(Debug, Args, Clone, Default)]
pub struct ResumeArgs {
    /// Byte offset to resume reading from
    #[arg(long, env = "SMPPSIM_CATCHER_RESUME_OFFSET", default_value_t = 0)]
    pub resume_offset: u64,

    /// File identity the offset belongs to (0 when unknown)
    #[arg(long, env = "SMPPSIM_CATCHER_RESUME_FILE_ID", default_value_t = 0)]
    pub resume_file_id: u64,

    /// Hex encoded first bytes of the file
    #[arg(long, env = "SMPPSIM_CATCHER_RESUME_HEAD", value_parser = parse::parse_hex_bytes)]
    pub resume_head: Option<HexBytes>,

    /// Hex encoded bytes preceding the offset
    #[arg(long, env = "SMPPSIM_CATCHER_RESUME_TAIL", value_parser = parse::parse_hex_bytes)]
    pub resume_tail: Option<HexBytes>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum EncodingArg {
    #[default]
    Utf8,
    Utf16le,
    Utf16be,
    Utf32le,
    Utf32be,
}

impl From<EncodingArg> for TextEncoding {
    fn from(value: EncodingArg) -> Self {
        match value {
            EncodingArg::Utf8 => TextEncoding::Utf8,
            EncodingArg::Utf16le => TextEncoding::Utf16Le,
            EncodingArg::Utf16be => TextEncoding::Utf16Be,
            EncodingArg::Utf32le => TextEncoding::Utf32Le,
            EncodingArg::Utf32be => TextEncoding::Utf32Be,
        }
    }
}

impl ResumeArgs {
    pub fn resume_point(&self) -> Option<ResumePoint> {
        if self.resume_offset == 0 {
            return None;
        }

        Some(ResumePoint {
            offset: self.resume_offset,
            file_id: FileId::new(self.resume_file_id),
            head: self
                .resume_head
                .as_ref()
                .map(|h| h.0.clone())
                .unwrap_or_default(),
            tail: self
                .resume_tail
                .as_ref()
                .map(|t| t.0.clone())
                .unwrap_or_default(),
        })
    }
}

impl CatcherArgs {
    pub fn capture_config(&self) -> CaptureConfig {
        let config = CaptureConfig::new(&self.capture_file)
            .with_encoding(self.encoding.into())
            .with_monitoring_delays(self.monitoring_delays.0.clone())
            .with_batch_size(self.batch_size);

        match self.resume.resume_point() {
            Some(resume) => config.with_resume(resume),
            None => config,
        }
    }
}
