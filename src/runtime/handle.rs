use std::sync::Arc;

use thiserror::Error;
use tokio::sync::{broadcast, mpsc, oneshot};
use tracing::{debug, error};

use crate::{
    config::BatchConfig,
    engine::{BatchEngine, BatchError, BatchReport},
    op::MutationRequest,
    query::StockCache,
};

use super::events::MarkEvent;

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error(transparent)]
    Batch(#[from] BatchError),
    #[error("runtime command channel closed")]
    ChannelClosed,
    /// A batch panicked on the blocking pool and took the engine with it.
    #[error("batch worker lost")]
    WorkerLost,
}

#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub command_queue_bound: usize,
    pub event_capacity: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            command_queue_bound: 64,
            event_capacity: 1024,
        }
    }
}

/// Cloneable front end of the runtime. Reads go straight to the cache;
/// batches are queued to the single writer.
#[derive(Clone)]
pub struct MarkHandle {
    cmd_tx: mpsc::Sender<Command>,
    events_tx: broadcast::Sender<MarkEvent>,
    cache: Arc<StockCache>,
}

enum Command {
    RunBatch {
        requests: Vec<MutationRequest>,
        config: Option<BatchConfig>,
        resp: oneshot::Sender<Result<BatchReport, RuntimeError>>,
    },
    Version {
        resp: oneshot::Sender<Result<u64, RuntimeError>>,
    },
    Shutdown {
        resp: oneshot::Sender<Result<(), RuntimeError>>,
    },
}

/// Moves `engine` into a command loop on the current tokio runtime.
pub fn spawn_marks(engine: BatchEngine, config: RuntimeConfig) -> MarkHandle {
    let (cmd_tx, mut cmd_rx) = mpsc::channel::<Command>(config.command_queue_bound.max(1));
    let (events_tx, _) = broadcast::channel::<MarkEvent>(config.event_capacity.max(1));
    let cache = engine.cache();
    let events_tx_loop = events_tx.clone();

    tokio::spawn(async move {
        let mut engine = Some(engine);
        let mut batches = 0u64;

        while let Some(cmd) = cmd_rx.recv().await {
            match cmd {
                Command::RunBatch {
                    requests,
                    config,
                    resp,
                } => {
                    let Some(current) = engine.take() else {
                        let _ = resp.send(Err(RuntimeError::WorkerLost));
                        continue;
                    };
                    batches += 1;
                    let (returned, res) =
                        run_batch_blocking(current, batches, requests, config, &events_tx_loop).await;
                    engine = returned;
                    let _ = resp.send(res);
                }
                Command::Version { resp } => {
                    let res = engine
                        .as_ref()
                        .map(BatchEngine::version)
                        .ok_or(RuntimeError::WorkerLost);
                    let _ = resp.send(res);
                }
                Command::Shutdown { resp } => {
                    debug!(batches, "runtime shutting down");
                    let _ = resp.send(Ok(()));
                    break;
                }
            }
        }
    });

    MarkHandle {
        cmd_tx,
        events_tx,
        cache,
    }
}

async fn run_batch_blocking(
    mut engine: BatchEngine,
    batch: u64,
    requests: Vec<MutationRequest>,
    config: Option<BatchConfig>,
    events_tx: &broadcast::Sender<MarkEvent>,
) -> (Option<BatchEngine>, Result<BatchReport, RuntimeError>) {
    let config = config.unwrap_or_else(|| engine.config());
    let _ = events_tx.send(MarkEvent::BatchStarted {
        batch,
        items: requests.len(),
    });

    let events = events_tx.clone();
    let joined = tokio::task::spawn_blocking(move || {
        let res = engine.run_with(&requests, &config, |chunk| {
            let _ = events.send(MarkEvent::for_chunk(batch, chunk));
        });
        (engine, res)
    })
    .await;

    match joined {
        Ok((engine, res)) => {
            if let Ok(report) = &res {
                let _ = events_tx.send(MarkEvent::finished(batch, report));
            }
            (Some(engine), res.map_err(RuntimeError::from))
        }
        Err(err) => {
            error!(batch, error = %err, "batch worker failed");
            (None, Err(RuntimeError::WorkerLost))
        }
    }
}

impl MarkHandle {
    pub fn subscribe(&self) -> broadcast::Receiver<MarkEvent> {
        self.events_tx.subscribe()
    }

    /// Read-side cache over the published store.
    pub fn cache(&self) -> &Arc<StockCache> {
        &self.cache
    }

    /// Runs `requests` with the engine's configured [`BatchConfig`].
    pub async fn run_batch(&self, requests: Vec<MutationRequest>) -> Result<BatchReport, RuntimeError> {
        self.submit(requests, None).await
    }

    pub async fn run_batch_with(
        &self,
        requests: Vec<MutationRequest>,
        config: BatchConfig,
    ) -> Result<BatchReport, RuntimeError> {
        self.submit(requests, Some(config)).await
    }

    /// Store version once every batch queued before this call has finished.
    pub async fn version(&self) -> Result<u64, RuntimeError> {
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(Command::Version { resp: tx })
            .await
            .map_err(|_| RuntimeError::ChannelClosed)?;
        rx.await.map_err(|_| RuntimeError::ChannelClosed)?
    }

    pub async fn shutdown(&self) -> Result<(), RuntimeError> {
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(Command::Shutdown { resp: tx })
            .await
            .map_err(|_| RuntimeError::ChannelClosed)?;
        rx.await.map_err(|_| RuntimeError::ChannelClosed)?
    }

    async fn submit(
        &self,
        requests: Vec<MutationRequest>,
        config: Option<BatchConfig>,
    ) -> Result<BatchReport, RuntimeError> {
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(Command::RunBatch {
                requests,
                config,
                resp: tx,
            })
            .await
            .map_err(|_| RuntimeError::ChannelClosed)?;
        rx.await.map_err(|_| RuntimeError::ChannelClosed)?
    }
}
