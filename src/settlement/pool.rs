//! Worker pool over a bounded mpsc queue

use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;

use crate::metrics::LedgerMetrics;

use super::{SettlementConfig, SettlementJob, SubmitError};

type SharedReceiver = Arc<tokio::sync::Mutex<mpsc::Receiver<SettlementJob>>>;

/// Fixed-size settlement worker pool
pub struct SettlementPool {
    sender: Mutex<Option<mpsc::Sender<SettlementJob>>>,
    workers: tokio::sync::Mutex<Vec<JoinHandle<()>>>,
    metrics: LedgerMetrics,
    config: SettlementConfig,
}

impl SettlementPool {
    /// Spawn the workers. Must be called inside a tokio runtime.
    pub fn start(config: SettlementConfig, metrics: LedgerMetrics) -> Self {
        let workers = config.workers.max(1);
        let capacity = config.queue_capacity.max(1);

        let (sender, receiver) = mpsc::channel(capacity);
        let receiver: SharedReceiver = Arc::new(tokio::sync::Mutex::new(receiver));

        let handles = (0..workers)
            .map(|worker_id| {
                tokio::spawn(worker_loop(worker_id, receiver.clone(), metrics.clone()))
            })
            .collect();

        tracing::info!(workers, capacity, "Settlement pool started");

        Self {
            sender: Mutex::new(Some(sender)),
            workers: tokio::sync::Mutex::new(handles),
            metrics,
            config: SettlementConfig {
                workers,
                queue_capacity: capacity,
            },
        }
    }

    pub fn config(&self) -> SettlementConfig {
        self.config
    }

    /// Enqueue a job without waiting for capacity
    pub fn try_submit(&self, job: SettlementJob) -> Result<(), SubmitError> {
        let guard = self.sender.lock().unwrap_or_else(PoisonError::into_inner);
        let sender = guard.as_ref().ok_or(SubmitError::Closed)?;

        let transaction_id = job.transaction().id;

        // Count before sending so a fast worker cannot decrement first
        self.metrics.job_enqueued();
        match sender.try_send(job) {
            Ok(()) => {
                tracing::debug!(transaction_id = %transaction_id, "Settlement job queued");
                Ok(())
            }
            Err(TrySendError::Full(_)) => {
                self.metrics.job_dequeued();
                Err(SubmitError::QueueFull)
            }
            Err(TrySendError::Closed(_)) => {
                self.metrics.job_dequeued();
                Err(SubmitError::Closed)
            }
        }
    }

    pub fn is_closed(&self) -> bool {
        self.sender
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_none()
    }

    /// Close submission and wait until every queued job has finished.
    /// Concurrent callers all return only once the drain is complete.
    pub async fn stop(&self) {
        let sender = self
            .sender
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if sender.is_some() {
            tracing::info!("Settlement pool stopping, draining queue");
        }
        drop(sender);

        // Held across the joins so later callers wait for the same drain
        let mut workers = self.workers.lock().await;
        if workers.is_empty() {
            return;
        }
        for handle in workers.drain(..) {
            if let Err(e) = handle.await {
                tracing::error!(error = %e, "Settlement worker terminated abnormally");
            }
        }

        tracing::info!("Settlement pool stopped");
    }
}

async fn worker_loop(worker_id: usize, receiver: SharedReceiver, metrics: LedgerMetrics) {
    loop {
        // Lock only while waiting; the job runs after the guard is released
        let job = receiver.lock().await.recv().await;
        let Some(job) = job else {
            break;
        };
        metrics.job_dequeued();

        let transaction_id = job.transaction().id;
        let effect = job.effect();
        let status = job.run().await;

        tracing::debug!(
            worker_id,
            transaction_id = %transaction_id,
            effect = ?effect,
            status = %status,
            "Settlement job finished"
        );
    }

    tracing::debug!(worker_id, "Settlement worker exiting");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::MemoryAuditLog;
    use crate::domain::{Amount, Transaction, TransactionStatus};
    use crate::journal::TransactionJournal;
    use crate::ledger::BalanceLedger;
    use crate::saga::TransferSaga;
    use crate::settlement::SettlementDeps;
    use crate::store::MemoryStore;
    use uuid::Uuid;

    fn deps() -> Arc<SettlementDeps> {
        let store = Arc::new(MemoryStore::new());
        let audit = Arc::new(MemoryAuditLog::new());
        let ledger = BalanceLedger::new(store.clone());
        let journal = TransactionJournal::new(store.clone(), audit);
        let saga = TransferSaga::new(store, ledger.clone(), journal.clone());
        Arc::new(SettlementDeps {
            ledger,
            journal,
            saga,
            metrics: LedgerMetrics::new().unwrap(),
        })
    }

    async fn pending_credit(deps: &SettlementDeps, account: Uuid) -> Transaction {
        let tx = Transaction::pending_credit(account, Amount::new(10).unwrap(), None);
        deps.journal.create(&tx).await.unwrap();
        tx
    }

    #[tokio::test]
    async fn test_stop_drains_queued_jobs() {
        let deps = deps();
        let pool = SettlementPool::start(
            SettlementConfig {
                workers: 2,
                queue_capacity: 64,
            },
            deps.metrics.clone(),
        );
        let account = Uuid::new_v4();

        let mut ids = Vec::new();
        for _ in 0..20 {
            let tx = pending_credit(&deps, account).await;
            ids.push(tx.id);
            pool.try_submit(SettlementJob::new(tx, deps.clone())).unwrap();
        }

        pool.stop().await;

        for id in ids {
            assert_eq!(
                deps.journal.get(id).await.unwrap().status,
                TransactionStatus::Completed
            );
        }
        assert_eq!(deps.ledger.balance(account).await.unwrap().amount, 200);
        assert_eq!(deps.metrics.queue_depth(), 0);
    }

    #[tokio::test]
    async fn test_submit_after_stop_is_closed() {
        let deps = deps();
        let pool = SettlementPool::start(SettlementConfig::default(), deps.metrics.clone());
        pool.stop().await;
        assert!(pool.is_closed());

        let tx = pending_credit(&deps, Uuid::new_v4()).await;
        assert_eq!(
            pool.try_submit(SettlementJob::new(tx, deps.clone())),
            Err(SubmitError::Closed)
        );

        // Stopping twice is harmless
        pool.stop().await;
    }

    #[tokio::test]
    async fn test_concurrent_stop_waits_for_drain() {
        let deps = deps();
        let pool = Arc::new(SettlementPool::start(
            SettlementConfig {
                workers: 1,
                queue_capacity: 64,
            },
            deps.metrics.clone(),
        ));
        let account = Uuid::new_v4();

        let mut ids = Vec::new();
        for _ in 0..20 {
            let tx = pending_credit(&deps, account).await;
            ids.push(tx.id);
            pool.try_submit(SettlementJob::new(tx, deps.clone())).unwrap();
        }

        let first = {
            let pool = pool.clone();
            tokio::spawn(async move { pool.stop().await })
        };
        // Let the first caller close the queue before the second arrives
        tokio::task::yield_now().await;
        pool.stop().await;

        for id in ids {
            assert_eq!(
                deps.journal.get(id).await.unwrap().status,
                TransactionStatus::Completed
            );
        }
        first.await.unwrap();
    }

    #[tokio::test(flavor = "current_thread")]
    async fn test_full_queue_is_reported() {
        let deps = deps();
        let pool = SettlementPool::start(
            SettlementConfig {
                workers: 1,
                queue_capacity: 1,
            },
            deps.metrics.clone(),
        );

        // On a current-thread runtime the worker cannot run until we yield
        let first = pending_credit(&deps, Uuid::new_v4()).await;
        let second = pending_credit(&deps, Uuid::new_v4()).await;
        pool.try_submit(SettlementJob::new(first, deps.clone())).unwrap();
        assert_eq!(
            pool.try_submit(SettlementJob::new(second, deps.clone())),
            Err(SubmitError::QueueFull)
        );
        assert_eq!(deps.metrics.queue_depth(), 1);

        pool.stop().await;
        assert_eq!(deps.metrics.queue_depth(), 0);
    }
}
