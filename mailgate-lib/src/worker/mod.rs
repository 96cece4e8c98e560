mod counter;
pub mod process;
mod task;

use std::net::SocketAddr;
use std::time::Duration;

use tokio::net::TcpStream;
use tracing::{info, warn};

use crate::config::ProcessModel;
use crate::error::Result;
use crate::listener::ServiceKind;

pub use counter::{WorkerCounter, WorkerGuard};
pub use process::{run_worker, ProcessSpawner, WorkerLaunch};
pub use task::TaskSpawner;

/// A connection taken off a listening socket, ready for a worker
#[derive(Debug)]
pub struct Accepted {
    pub stream: TcpStream,
    pub peer: SocketAddr,
    pub service: ServiceKind,
}

/// Starts one worker per accepted connection.
///
/// The guard is held for as long as the worker lives. If starting the worker
/// fails the guard is dropped and the live count is corrected.
pub trait WorkerSpawner: Send + Sync {
    fn model(&self) -> ProcessModel;

    fn spawn(&self, conn: Accepted, guard: WorkerGuard) -> Result<()>;

    /// Collect finished workers without blocking; returns how many
    fn reap(&self) -> usize {
        0
    }

    /// Ask every live worker to end its session
    fn terminate_all(&self) {}
}

/// Result of waiting for workers at shutdown
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrainOutcome {
    Complete,
    Forced { remaining: usize },
}

/// Wait for the live count to reach zero, checking every `interval` up to
/// `polls` times.
pub async fn drain_workers(
    counter: &WorkerCounter,
    spawner: &dyn WorkerSpawner,
    interval: Duration,
    polls: u32,
) -> DrainOutcome {
    let mut idle = counter.subscribe_idle();
    let noun = match spawner.model() {
        ProcessModel::Thread => "threads",
        ProcessModel::Process => "processes",
    };
    for poll in 0..polls {
        idle.borrow_and_update();
        spawner.reap();
        let live = counter.live();
        if live == 0 {
            info!("POP3/IMAP Gateway shutdown complete");
            return DrainOutcome::Complete;
        }
        if poll % 5 == 0 {
            info!(workers = live, "Waiting for {live} {noun} to exit");
        }
        let _ = tokio::time::timeout(interval, idle.changed()).await;
    }

    spawner.reap();
    let remaining = counter.live();
    if remaining == 0 {
        info!("POP3/IMAP Gateway shutdown complete");
        return DrainOutcome::Complete;
    }
    warn!(workers = remaining, "Forced shutdown with {remaining} {noun} left");
    DrainOutcome::Forced { remaining }
}
