// SPDX-License-Identifier: Apache-2.0

use std::time::Duration;
use tokio::task::JoinSet;
use tokio::time::{Instant, timeout_at};
use tower::BoxError;
use tracing::error;

pub type TaskSet = JoinSet<Result<(), BoxError>>;

/// Resolve with the result of whichever task finishes first. An empty set
/// never resolves, so it can sit in a `select!` next to other branches.
pub async fn wait_for_any_task(tasks: &mut TaskSet) -> Result<(), BoxError> {
    match tasks.join_next().await {
        None => std::future::pending().await,
        Some(res) => res?,
    }
}

pub async fn wait_for_tasks_with_timeout(
    tasks: &mut TaskSet,
    timeout: Duration,
) -> Result<(), BoxError> {
    let stop_at = Instant::now() + timeout;
    let mut result = Ok(());

    loop {
        match timeout_at(stop_at, tasks.join_next()).await {
            Err(_) => {
                tasks.abort_all();
                return Err("timed out waiting for tasks to complete".into());
            }
            Ok(None) => return result,
            Ok(Some(Ok(Ok(())))) => {}
            Ok(Some(Ok(Err(e)))) => result = Err(e),
            Ok(Some(Err(e))) => error!("Failed to join with task: {:?}", e),
        }
    }
}
