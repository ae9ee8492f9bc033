//! Per-call unit of work: the collaborators one operation uses, its timeout and its cancellation token.

use crate::config::EngineSettings;
use crate::error::AppError;
use crate::sql::SqlExecutor;
use crate::store::MetadataStore;
use std::future::Future;
use tokio_util::sync::CancellationToken;

pub struct UnitOfWork<'a> {
    store: &'a dyn MetadataStore,
    executor: &'a dyn SqlExecutor,
    settings: &'a EngineSettings,
    cancel: &'a CancellationToken,
}

impl<'a> UnitOfWork<'a> {
    pub fn new(
        store: &'a dyn MetadataStore,
        executor: &'a dyn SqlExecutor,
        settings: &'a EngineSettings,
        cancel: &'a CancellationToken,
    ) -> Self {
        UnitOfWork {
            store,
            executor,
            settings,
            cancel,
        }
    }

    pub fn store(&self) -> &'a dyn MetadataStore {
        self.store
    }

    pub fn executor(&self) -> &'a dyn SqlExecutor {
        self.executor
    }

    pub fn settings(&self) -> &'a EngineSettings {
        self.settings
    }

    /// Fails with `Cancelled` once the token has fired.
    pub fn checkpoint(&self) -> Result<(), AppError> {
        if self.cancel.is_cancelled() {
            return Err(AppError::Cancelled);
        }
        Ok(())
    }

    /// Await one store or executor call, bounded by the operation timeout and raced against cancellation.
    pub async fn run<T, F>(&self, fut: F) -> Result<T, AppError>
    where
        F: Future<Output = Result<T, AppError>>,
    {
        self.checkpoint()?;
        let limit = self.settings.op_timeout;
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(AppError::Cancelled),
            res = tokio::time::timeout(limit, fut) => match res {
                Ok(r) => r,
                Err(_) => Err(AppError::Timeout(limit)),
            },
        }
    }
}
