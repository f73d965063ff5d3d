//! Per-template mutation locks.
//!
//! Every mutating call holds its template's lock from load to save, so two
//! operations on one template never interleave. Waiting is bounded; a caller
//! that cannot get the lock in time gets `ConcurrencyConflict` and retries.

use crate::error::ServiceError;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, OwnedMutexGuard};

#[derive(Debug)]
pub struct TemplateLocks {
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
    wait: Duration,
}

impl TemplateLocks {
    pub fn new(wait: Duration) -> Self {
        Self {
            locks: Mutex::new(HashMap::new()),
            wait,
        }
    }

    pub fn wait(&self) -> Duration {
        self.wait
    }

    pub async fn acquire(&self, template_id: &str) -> Result<OwnedMutexGuard<()>, ServiceError> {
        let lock = {
            let mut locks = self.locks.lock().await;
            locks
                .entry(template_id.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };

        if let Ok(guard) = lock.clone().try_lock_owned() {
            return Ok(guard);
        }

        tracing::debug!(template_id = %template_id, "Waiting for template lock");
        match tokio::time::timeout(self.wait, lock.lock_owned()).await {
            Ok(guard) => Ok(guard),
            Err(_) => {
                let waited_ms = self.wait.as_millis() as u64;
                tracing::warn!(template_id = %template_id, waited_ms, "Template lock timed out");
                Err(ServiceError::Busy {
                    template_id: template_id.to_string(),
                    waited_ms,
                })
            }
        }
    }
}
