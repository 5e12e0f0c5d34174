// SPDX-License-Identifier: Apache-2.0

use crate::capture::{CaptureLineParser, PduStore, PollingDriver, TailProgress};
use crate::init::args::CatcherArgs;
use crate::init::wait::{self, TaskSet};
use crate::listener::Listener;
use crate::query::QueryServer;
use std::sync::Arc;
use std::time::Duration;
use tokio::select;
use tokio_util::sync::CancellationToken;
use tower::BoxError;
use tracing::{debug, info, warn};

pub struct Agent {
    config: CatcherArgs,
    listener: Listener,
    store: PduStore,
}

impl Agent {
    /// `listener` is bound ahead of time so that a taken port is reported
    /// before anything starts.
    pub fn new(config: CatcherArgs, listener: Listener) -> Self {
        Self {
            config,
            listener,
            store: PduStore::new(),
        }
    }

    /// Handle to the records the agent captures.
    pub fn store(&self) -> PduStore {
        self.store.clone()
    }

    pub async fn run(self, agent_cancel: CancellationToken) -> Result<(), BoxError> {
        let capture = self.config.capture_config();
        capture.validate()?;

        info!(
            capture_file = ?capture.path,
            query_endpoint = ?self.listener.bound_address().ok(),
            "Starting smppsim-catcher."
        );

        let store = self.store;
        let progress = Arc::new(TailProgress::new(&capture.path));

        let mut capture_task_set = TaskSet::new();
        let mut server_task_set = TaskSet::new();

        let capture_cancel = CancellationToken::new();
        let server_cancel = CancellationToken::new();

        let driver = PollingDriver::new(
            &capture,
            Arc::new(CaptureLineParser::new()),
            store.clone(),
            progress.clone(),
        )?;
        driver.start(&mut capture_task_set, &capture_cancel).await?;

        {
            let server = QueryServer::new(store.clone(), progress.clone());
            let listener = self.listener;
            let server_cancel = server_cancel.clone();
            server_task_set.spawn(async move { server.serve(listener, server_cancel).await });
        }

        let mut result = Ok(());
        select! {
            _ = agent_cancel.cancelled() => {
                debug!("Agent cancellation signaled.");
            },
            e = wait::wait_for_any_task(&mut capture_task_set) => {
                match e {
                    Ok(()) => warn!("Unexpected early exit of capture driver."),
                    Err(e) => result = Err(e),
                }
            },
            e = wait::wait_for_any_task(&mut server_task_set) => {
                match e {
                    Ok(()) => warn!("Unexpected early exit of query server."),
                    Err(e) => result = Err(e),
                }
            },
        }

        // Stop reading first so the query server can still answer while the
        // driver winds down.
        capture_cancel.cancel();
        let capture_res =
            wait::wait_for_tasks_with_timeout(&mut capture_task_set, Duration::from_secs(2)).await;

        server_cancel.cancel();
        let server_res =
            wait::wait_for_tasks_with_timeout(&mut server_task_set, Duration::from_secs(3)).await;

        info!(records = store.len(), "Shutdown complete.");
        store.clear();

        result?;
        if let Err(e) = capture_res {
            return Err(format!("capture driver did not stop cleanly: {}", e).into());
        }
        if let Err(e) = server_res {
            return Err(format!("query server did not stop cleanly: {}", e).into());
        }
        Ok(())
    }
}
