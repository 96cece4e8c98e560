use std::sync::Arc;

use tracing::debug;

use crate::config::ProcessModel;
use crate::context::GatewayContext;
use crate::error::Result;
use crate::session::run_session;
use crate::worker::{Accepted, WorkerGuard, WorkerSpawner};

/// Runs each session as a task on the gateway's runtime.
///
/// Sessions see shutdown through the shared quit token, so there is nothing
/// to signal at termination.
pub struct TaskSpawner {
    ctx: Arc<GatewayContext>,
}

impl TaskSpawner {
    pub fn new(ctx: Arc<GatewayContext>) -> Self {
        Self { ctx }
    }
}

impl WorkerSpawner for TaskSpawner {
    fn model(&self) -> ProcessModel {
        ProcessModel::Thread
    }

    fn spawn(&self, conn: Accepted, guard: WorkerGuard) -> Result<()> {
        let ctx = Arc::clone(&self.ctx);
        tokio::spawn(async move {
            let _guard = guard;
            let Accepted { stream, peer, service } = conn;
            let end = run_session(&ctx, stream, peer.to_string(), service).await;
            debug!(%peer, ?end, "worker finished");
        });
        Ok(())
    }
}
