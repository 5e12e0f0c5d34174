// SPDX-License-Identifier: Apache-2.0

//! Background loop that drains the capture file into the store.

use std::sync::Arc;

use tokio::select;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tower::BoxError;
use tracing::{Span, debug, error, info, warn};

use super::backoff::BackoffLadder;
use super::config::CaptureConfig;
use super::parser::LineParser;
use super::progress::TailProgress;
use super::store::PduStore;
use crate::tail::{TailError, TailingReader};

pub struct PollingDriver {
    reader: TailingReader,
    parser: Arc<dyn LineParser>,
    store: PduStore,
    progress: Arc<TailProgress>,
    backoff: BackoffLadder,
    batch_size: usize,
    span: Span,
}

/// Outcome of one drain on the blocking pool.
#[derive(Debug, Default)]
struct DrainStats {
    lines: usize,
    records: usize,
    skipped: usize,
    failed: usize,
    error: Option<TailError>,
}

impl PollingDriver {
    pub fn new(
        config: &CaptureConfig,
        parser: Arc<dyn LineParser>,
        store: PduStore,
        progress: Arc<TailProgress>,
    ) -> Result<Self, BoxError> {
        config.validate()?;

        let span = tracing::info_span!("capture", path = %config.path.display());
        let reader = match &config.resume {
            Some(resume) => TailingReader::resume(&config.path, config.encoding, resume.clone()),
            None => TailingReader::new(&config.path, config.encoding),
        }
        .with_span(span.clone());

        info!(
            parent: &span,
            encoding = %config.encoding,
            batch_size = config.batch_size,
            delays = ?config.monitoring_delays,
            resume_offset = config.resume.as_ref().map(|r| r.offset),
            "Capture driver initialized"
        );

        Ok(Self {
            reader,
            parser,
            store,
            progress,
            backoff: BackoffLadder::new(config.monitoring_delays.clone()),
            batch_size: config.batch_size,
            span,
        })
    }

    pub async fn start(
        self,
        task_set: &mut JoinSet<Result<(), BoxError>>,
        cancel: &CancellationToken,
    ) -> Result<(), BoxError> {
        let cancel = cancel.clone();
        task_set.spawn(async move {
            let result = self.run(cancel).await;
            if let Err(ref e) = result {
                error!("Capture driver error: {}", e);
            }
            result
        });
        Ok(())
    }

    /// Drain and back off until cancelled or the reader can no longer be used.
    pub async fn run(self, cancel: CancellationToken) -> Result<(), BoxError> {
        let PollingDriver {
            mut reader,
            parser,
            store,
            progress,
            mut backoff,
            batch_size,
            span,
        } = self;

        info!(parent: &span, "Capture driver started");

        let mut published = progress.snapshot();

        let result = loop {
            if cancel.is_cancelled() {
                break Ok(());
            }

            let drain_parser = parser.clone();
            let drain_store = store.clone();
            let drain_span = span.clone();
            let (returned, stats) = tokio::task::spawn_blocking(move || {
                let _entered = drain_span.enter();
                let stats = drain(&mut reader, drain_parser.as_ref(), &drain_store, batch_size);
                (reader, stats)
            })
            .await?;
            reader = returned;

            match stats.error {
                Some(e) if e.is_fatal() => break Err(e.into()),
                Some(ref e) => warn!(parent: &span, error = %e, "Error while reading capture file"),
                None => {}
            }

            // A rotation moves the resume point without producing a line
            let point = reader.resume_point();
            if point != published {
                progress.publish(&point);
                published = point;
            }

            if stats.lines > 0 {
                debug!(
                    parent: &span,
                    lines = stats.lines,
                    records = stats.records,
                    skipped = stats.skipped,
                    failed = stats.failed,
                    offset = reader.current_position(),
                    "Drained capture file"
                );
                backoff.reset();
                continue;
            }

            let delay = backoff.next_delay();
            select! {
                _ = cancel.cancelled() => break Ok(()),
                _ = tokio::time::sleep(delay) => {}
            }
        };

        reader.close();
        info!(
            parent: &span,
            records = store.len(),
            offset = reader.current_position(),
            "Capture driver stopped"
        );
        result
    }
}

fn drain(
    reader: &mut TailingReader,
    parser: &dyn LineParser,
    store: &PduStore,
    batch_size: usize,
) -> DrainStats {
    let mut stats = DrainStats::default();

    while stats.lines < batch_size {
        let line = match reader.read_line() {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                stats.error = Some(e);
                break;
            }
        };
        stats.lines += 1;

        match parser.parse(&line) {
            Ok(Some(pdu)) => {
                store.push(pdu);
                stats.records += 1;
            }
            Ok(None) => stats.skipped += 1,
            Err(e) => {
                error!(error = %e, line = line.trim_end(), "Unable to parse capture line");
                stats.failed += 1;
            }
        }
    }

    stats
}
