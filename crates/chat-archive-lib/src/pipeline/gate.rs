//! Counting admission gate for one worker stage.

use std::sync::Arc;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::error::{ArchiveError, Result};

/// A slot granted by an `AdmissionGate`. Dropping it frees exactly one slot.
#[derive(Debug)]
pub struct AdmissionPermit {
    _permit: OwnedSemaphorePermit,
}

/// Caps how many acquisitions of one stage may be outstanding at once.
///
/// Waiters are not served in any promised order. Gates are independent of
/// each other: a saturated record gate never blocks page admission.
#[derive(Debug, Clone)]
pub struct AdmissionGate {
    name: &'static str,
    capacity: usize,
    semaphore: Arc<Semaphore>,
}

impl AdmissionGate {
    pub fn new(name: &'static str, capacity: usize) -> Result<Self> {
        if capacity == 0 {
            return Err(ArchiveError::Config(format!(
                "{name} gate needs a capacity of at least 1"
            )));
        }
        Ok(Self {
            name,
            capacity,
            semaphore: Arc::new(Semaphore::new(capacity)),
        })
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Slots currently free.
    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }

    /// Slots currently held.
    pub fn in_flight(&self) -> usize {
        self.capacity.saturating_sub(self.available())
    }

    /// Wait until a slot is free and take it.
    pub async fn acquire(&self) -> Result<AdmissionPermit> {
        let permit = Arc::clone(&self.semaphore)
            .acquire_owned()
            .await
            .map_err(|_| ArchiveError::Closed(self.name))?;
        Ok(AdmissionPermit { _permit: permit })
    }

    /// Refuse all future acquisitions; current holders keep their slots.
    #[cfg(test)]
    pub(crate) fn close(&self) {
        self.semaphore.close();
    }
}
