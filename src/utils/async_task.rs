use std::future::Future;

use tokio::task::JoinHandle;
use tracing::error;

use crate::Result;

/// Spawns a fallible task and logs its error instead of dropping it.
pub(crate) fn spawn_task<Fut>(
    name: &'static str,
    client_id: &str,
    task: Fut,
) -> JoinHandle<()>
where
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    let client_id = client_id.to_string();
    tokio::spawn(async move {
        if let Err(e) = task.await {
            error!(%client_id, "{name} handler failed: {:?}", e);
        }
    })
}
