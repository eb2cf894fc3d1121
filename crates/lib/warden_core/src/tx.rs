//! Transaction orchestration.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use futures::future::BoxFuture;
use tracing::{error, warn};

use crate::error::{ServiceError, ServiceResult};
use crate::repo::Resources;
use crate::store::{Storage, StorageTx};

const SOURCE: &str = "tx";

/// Runs a unit of work inside one storage transaction.
#[derive(Clone)]
pub struct TxManager {
    storage: Arc<dyn Storage>,
}

impl TxManager {
    pub fn new(res: &Resources) -> Self {
        Self {
            storage: res.storage.clone(),
        }
    }

    /// Run `work` in a transaction.
    ///
    /// `Ok` commits. `Err` rolls back and returns the errors unchanged. A
    /// panic inside `work`, or a failure to begin or commit, rolls back and
    /// yields a single `TransactionFailed` error. Rollback runs at most once,
    /// and the transaction handle is released on every path.
    pub async fn with_transaction<T, F>(&self, work: F) -> ServiceResult<T>
    where
        T: Send,
        F: for<'t> FnOnce(&'t mut dyn StorageTx) -> BoxFuture<'t, ServiceResult<T>> + Send,
    {
        let mut tx = self.storage.begin().await.map_err(|e| {
            error!(error = %e, "failed to begin transaction");
            ServiceError::transaction_failed(SOURCE, "Could not start transaction")
        })?;

        let outcome = AssertUnwindSafe(async { work(tx.as_mut()).await })
            .catch_unwind()
            .await;

        match outcome {
            Ok(Ok(value)) => {
                tx.commit().await.map_err(|e| {
                    error!(error = %e, "failed to commit transaction");
                    ServiceError::transaction_failed(SOURCE, "Could not commit transaction")
                })?;
                Ok(value)
            }
            Ok(Err(errors)) => {
                rollback(tx).await;
                Err(errors)
            }
            Err(_) => {
                error!("transaction work panicked");
                rollback(tx).await;
                Err(ServiceError::transaction_failed(SOURCE, "Transaction aborted unexpectedly").into())
            }
        }
    }
}

async fn rollback(tx: Box<dyn StorageTx>) {
    if let Err(e) = tx.rollback().await {
        warn!(error = %e, "rollback failed");
    }
}
