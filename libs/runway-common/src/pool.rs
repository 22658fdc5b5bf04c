/// Admission / Capacity Layer
///
/// A fixed list of executor backends, each with a busy flag. `acquire`
/// scans in order and claims the first free backend; when none is free it
/// fails immediately with `CapacityExceeded`. There is no waiting, ordering
/// or preemption here: callers own their backpressure.
///
/// One job per backend at a time. The flag is claimed with a single
/// compare-exchange so two concurrent `acquire` calls can never both win the
/// same backend.
use crate::error::RunwayError;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

#[derive(Debug)]
pub struct Backend {
    address: String,
    busy: AtomicBool,
}

impl Backend {
    fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            busy: AtomicBool::new(false),
        }
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }

    fn try_claim(&self) -> bool {
        self.busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct BackendStatus {
    pub address: String,
    pub busy: bool,
}

#[derive(Debug, Clone)]
pub struct BackendPool {
    backends: Arc<Vec<Arc<Backend>>>,
}

impl BackendPool {
    pub fn new<I, S>(addresses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let backends = addresses
            .into_iter()
            .map(|a| Arc::new(Backend::new(a)))
            .collect();
        Self {
            backends: Arc::new(backends),
        }
    }

    /// Claim the first free backend
    pub fn acquire(&self) -> Result<BackendLease, RunwayError> {
        self.backends
            .iter()
            .find(|b| b.try_claim())
            .map(|backend| BackendLease {
                backend: backend.clone(),
            })
            .ok_or(RunwayError::CapacityExceeded)
    }

    /// Mark a backend free. Releasing a free backend is a no-op.
    pub fn release(&self, backend: &Backend) {
        backend.busy.store(false, Ordering::Release);
    }

    pub fn len(&self) -> usize {
        self.backends.len()
    }

    pub fn is_empty(&self) -> bool {
        self.backends.is_empty()
    }

    pub fn busy_count(&self) -> usize {
        self.backends.iter().filter(|b| b.is_busy()).count()
    }

    pub fn snapshot(&self) -> Vec<BackendStatus> {
        self.backends
            .iter()
            .map(|b| BackendStatus {
                address: b.address.clone(),
                busy: b.is_busy(),
            })
            .collect()
    }
}

/// A claimed backend. The busy flag is cleared when the lease drops, whatever
/// way the job ended.
#[derive(Debug)]
pub struct BackendLease {
    backend: Arc<Backend>,
}

impl BackendLease {
    pub fn address(&self) -> &str {
        self.backend.address()
    }

    pub fn backend(&self) -> &Backend {
        &self.backend
    }
}

impl Drop for BackendLease {
    fn drop(&mut self) {
        self.backend.busy.store(false, Ordering::Release);
    }
}
