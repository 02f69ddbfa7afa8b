//! Hierarchical task supervision (spec §5): a parent cancellation propagates
//! to all children, the first child to fail cancels the rest, and `run`
//! returns the first non-cancellation error.

use crate::core::error::{IndexerError, IndexerResult};
use std::future::Future;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Spawns named, cancellation-aware tasks and waits on whichever finishes
/// first. A task returning `Err` triggers cancellation of its siblings; a
/// task returning `Ok` while the others are still running is treated as a
/// normal (if premature) exit and is not itself a failure.
pub struct Supervisor {
    shutdown: CancellationToken,
    tasks: JoinSet<(&'static str, IndexerResult<()>)>,
}

impl Supervisor {
    pub fn new(shutdown: CancellationToken) -> Self {
        Self {
            shutdown,
            tasks: JoinSet::new(),
        }
    }

    pub fn spawn<F>(&mut self, name: &'static str, fut: F)
    where
        F: Future<Output = IndexerResult<()>> + Send + 'static,
    {
        self.tasks.spawn(async move { (name, fut.await) });
    }

    /// Runs until `shutdown` is cancelled or a supervised task exits with a
    /// non-cancellation error, whichever comes first.
    pub async fn run(mut self) -> IndexerResult<()> {
        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => {
                    info!("shutdown requested, cancelling all supervised tasks");
                    break;
                }
                joined = self.tasks.join_next() => {
                    match joined {
                        None => break,
                        Some(Ok((name, Ok(())))) => {
                            warn!(task = name, "supervised task exited cleanly before shutdown");
                        }
                        Some(Ok((name, Err(IndexerError::Cancelled)))) => {
                            info!(task = name, "supervised task cancelled");
                        }
                        Some(Ok((name, Err(e)))) => {
                            error!(task = name, error = %e, "supervised task failed; cancelling siblings");
                            self.shutdown.cancel();
                            self.drain().await;
                            return Err(e);
                        }
                        Some(Err(join_err)) => {
                            error!(error = %join_err, "supervised task panicked; cancelling siblings");
                            self.shutdown.cancel();
                            self.drain().await;
                            return Err(IndexerError::Other(anyhow::anyhow!(join_err)));
                        }
                    }
                }
            }
        }

        self.shutdown.cancel();
        self.drain().await;
        Ok(())
    }

    async fn drain(&mut self) {
        while self.tasks.join_next().await.is_some() {}
    }
}
