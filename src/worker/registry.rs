//! In-process worker registry.

use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;

use crate::error::Result;

use super::{Worker, WorkerRegistry};

/// Registry over a plain list of workers registered at startup.
///
/// The full control plane discovers workers over its transport; for
/// single-machine deployments and tests a static set is enough. Workers may
/// still join or leave at runtime, which the dispatch loop picks up on its
/// next tick.
#[derive(Debug, Default)]
pub struct StaticWorkerRegistry {
    workers: Mutex<Vec<Arc<Worker>>>,
}

impl StaticWorkerRegistry {
    pub fn new() -> Self {
        Self {
            workers: Mutex::new(Vec::new()),
        }
    }

    pub fn register(&self, worker: Arc<Worker>) {
        tracing::info!(worker_id = worker.id(), "worker registered");
        self.guard().push(worker);
    }

    pub fn deregister(&self, id: &str) {
        self.guard().retain(|w| w.id() != id);
    }

    fn guard(&self) -> std::sync::MutexGuard<'_, Vec<Arc<Worker>>> {
        self.workers.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl WorkerRegistry for StaticWorkerRegistry {
    async fn list(&self) -> Result<Vec<Arc<Worker>>> {
        Ok(self.guard().clone())
    }
}
